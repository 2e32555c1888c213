//! `subject.xml` — subject metadata fields.

use serde_json::json;

use super::Element;
use crate::error::{MffError, Result};

pub const NAMESPACE: &str = "http://www.egi.com/subject_mff";
pub const ROOT_TAG: &str = "patient";
pub const DEFAULT_FILENAME: &str = "subject.xml";

#[derive(Debug, Clone, PartialEq)]
pub struct Subject {
    pub fields: Vec<SubjectField>,
}

/// One `<field>`: a name and a typed data payload.  Only the `string` type
/// is interpreted; other declared types are preserved verbatim.
#[derive(Debug, Clone, PartialEq)]
pub struct SubjectField {
    pub name: String,
    pub value: String,
    pub data_type: String,
}

impl Subject {
    pub fn new(fields: Vec<SubjectField>) -> Self {
        Self { fields }
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.value.as_str())
    }

    pub fn parse(root: &Element) -> Result<Self> {
        let mut fields = Vec::new();
        for field in root.require("fields")?.children.iter() {
            if field.name != "field" {
                return Err(MffError::format(format!(
                    "unknown subject field with tag '{}'",
                    field.name
                )));
            }
            let data = field.require("data")?;
            fields.push(SubjectField {
                name: field.require_text("name")?.to_owned(),
                value: data.text.clone(),
                data_type: data.get_attr("dataType").unwrap_or("string").to_owned(),
            });
        }
        Ok(Self { fields })
    }

    pub fn to_element(&self) -> Element {
        Element::new(ROOT_TAG).child(Element::new("fields").children(self.fields.iter().map(
            |f| {
                Element::new("field")
                    .child(Element::with_text("name", &f.name))
                    .child(Element::with_text("data", &f.value).attr("dataType", &f.data_type))
            },
        )))
    }

    pub fn serializable(&self) -> serde_json::Value {
        json!({
            "fields": self.fields.iter()
                .map(|f| (f.name.clone(), json!(f.value)))
                .collect::<serde_json::Map<_, _>>(),
        })
    }
}
