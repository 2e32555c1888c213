//! `info.xml` — recording-level file info.

use chrono::{DateTime, FixedOffset};
use serde_json::json;

use super::{format_timestamp, parse_timestamp, Element};
use crate::error::{MffError, Result};

pub const NAMESPACE: &str = "http://www.egi.com/info_mff";
pub const ROOT_TAG: &str = "fileInfo";
pub const DEFAULT_FILENAME: &str = "info.xml";

/// The only format version this crate reads and writes.
pub const SUPPORTED_VERSION: &str = "3";

#[derive(Debug, Clone, PartialEq)]
pub struct FileInfo {
    pub version: String,
    pub record_time: DateTime<FixedOffset>,
}

impl FileInfo {
    /// Build an emit-ready document; the version is pinned to `"3"`.
    pub fn new(record_time: DateTime<FixedOffset>) -> Self {
        Self {
            version: SUPPORTED_VERSION.to_owned(),
            record_time,
        }
    }

    pub fn parse(root: &Element) -> Result<Self> {
        let version = root.require_text("mffVersion")?.to_owned();
        if version != SUPPORTED_VERSION {
            return Err(MffError::format(format!(
                "unsupported recording version '{version}' (this build handles {SUPPORTED_VERSION})"
            )));
        }
        let record_time = parse_timestamp(root.require_text("recordTime")?)?;
        Ok(Self {
            version,
            record_time,
        })
    }

    pub fn to_element(&self) -> Element {
        Element::new(ROOT_TAG)
            .child(Element::with_text("mffVersion", &self.version))
            .child(Element::with_text(
                "recordTime",
                format_timestamp(&self.record_time),
            ))
    }

    pub fn serializable(&self) -> serde_json::Value {
        json!({
            "mffVersion": self.version,
            "recordTime": format_timestamp(&self.record_time),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::{write_document, XmlDocument};

    #[test]
    fn round_trip() {
        let info = FileInfo::new(parse_timestamp("2003-04-17T13:35:22.000000-08:00").unwrap());
        let mut out = Vec::new();
        write_document(&mut out, NAMESPACE, &info.to_element()).unwrap();
        match XmlDocument::from_stream(&out[..]).unwrap() {
            XmlDocument::FileInfo(reparsed) => assert_eq!(reparsed, info),
            other => panic!("wrong document kind: {other:?}"),
        }
    }

    #[test]
    fn rejects_other_versions() {
        let root = Element::new(ROOT_TAG)
            .child(Element::with_text("mffVersion", "2"))
            .child(Element::with_text(
                "recordTime",
                "2003-04-17T13:35:22.000000-08:00",
            ));
        assert!(FileInfo::parse(&root).is_err());
    }

    #[test]
    fn rejects_naive_record_time() {
        let root = Element::new(ROOT_TAG)
            .child(Element::with_text("mffVersion", "3"))
            .child(Element::with_text(
                "recordTime",
                "2003-04-17T13:35:22.000000",
            ));
        assert!(FileInfo::parse(&root).is_err());
    }
}
