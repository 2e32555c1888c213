//! `epochs.xml` — the recording's epoch table.

use serde_json::json;

use super::Element;
use crate::epoch::Epoch;
use crate::error::{MffError, Result};

pub const NAMESPACE: &str = "http://www.egi.com/epochs_mff";
pub const ROOT_TAG: &str = "epochs";
pub const DEFAULT_FILENAME: &str = "epochs.xml";

#[derive(Debug, Clone, PartialEq)]
pub struct Epochs {
    pub epochs: Vec<Epoch>,
}

impl Epochs {
    pub fn new(epochs: Vec<Epoch>) -> Self {
        Self { epochs }
    }

    pub fn len(&self) -> usize {
        self.epochs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.epochs.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Epoch> {
        self.epochs.get(index)
    }

    /// All epochs carrying the given display name.
    pub fn by_name<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Epoch> {
        self.epochs.iter().filter(move |e| e.name() == name)
    }

    pub fn parse(root: &Element) -> Result<Self> {
        let mut epochs = Vec::new();
        for el in root.children.iter() {
            if el.name != "epoch" {
                return Err(MffError::format(format!(
                    "unknown epoch with tag '{}'",
                    el.name
                )));
            }
            epochs.push(Epoch::new(
                el.parse_text("beginTime")?,
                el.parse_text("endTime")?,
                el.parse_text("firstBlock")?,
                el.parse_text("lastBlock")?,
            ));
        }
        Ok(Self { epochs })
    }

    pub fn to_element(&self) -> Element {
        Element::new(ROOT_TAG).children(self.epochs.iter().map(|e| {
            Element::new("epoch")
                .child(Element::with_text("beginTime", e.begin_time))
                .child(Element::with_text("endTime", e.end_time))
                .child(Element::with_text("firstBlock", e.first_block))
                .child(Element::with_text("lastBlock", e.last_block))
        }))
    }

    pub fn serializable(&self) -> serde_json::Value {
        json!(self.epochs)
    }
}
