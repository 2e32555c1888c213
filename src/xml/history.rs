//! `history.xml` — the processing pipeline applied to the recording.
//!
//! The entry methods drive flavor inference: an averaging step makes the
//! recording `averaged`, else a segmentation step makes it `segmented`,
//! else it is `continuous`.

use std::fmt;

use chrono::{DateTime, FixedOffset};
use serde_json::json;

use super::{format_timestamp, parse_timestamp, Element};
use crate::error::{MffError, Result};

pub const NAMESPACE: &str = "http://www.egi.com/history_mff";
pub const ROOT_TAG: &str = "historyEntries";
pub const DEFAULT_FILENAME: &str = "history.xml";

/// High-level recording classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MffFlavor {
    #[default]
    Continuous,
    Segmented,
    Averaged,
}

impl fmt::Display for MffFlavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MffFlavor::Continuous => "continuous",
            MffFlavor::Segmented => "segmented",
            MffFlavor::Averaged => "averaged",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct History {
    pub entries: Vec<HistoryEntry>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub name: String,
    pub method: String,
    pub version: String,
    pub begin_time: DateTime<FixedOffset>,
    pub end_time: DateTime<FixedOffset>,
    pub source_files: Vec<String>,
    pub settings: Vec<String>,
    pub results: Vec<String>,
}

impl History {
    pub fn new(entries: Vec<HistoryEntry>) -> Self {
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Flavor inferred from the pipeline methods; averaging takes precedence
    /// over segmentation.
    pub fn mff_flavor(&self) -> MffFlavor {
        let has = |needle: &str| {
            self.entries
                .iter()
                .any(|e| e.method.to_lowercase().contains(needle))
        };
        if has("averaging") {
            MffFlavor::Averaged
        } else if has("segmentation") {
            MffFlavor::Segmented
        } else {
            MffFlavor::Continuous
        }
    }

    pub fn parse(root: &Element) -> Result<Self> {
        let mut entries = Vec::new();
        for el in root.children.iter() {
            if el.name != "entry" {
                return Err(MffError::format(format!(
                    "unknown history entry with tag '{}'",
                    el.name
                )));
            }
            entries.push(HistoryEntry::parse(el)?);
        }
        Ok(Self { entries })
    }

    pub fn to_element(&self) -> Element {
        Element::new(ROOT_TAG).children(self.entries.iter().map(HistoryEntry::to_element))
    }

    pub fn serializable(&self) -> serde_json::Value {
        json!(self
            .entries
            .iter()
            .map(HistoryEntry::serializable)
            .collect::<Vec<_>>())
    }
}

impl HistoryEntry {
    fn parse(el: &Element) -> Result<Self> {
        let list = |tag: &str, item: &str| -> Vec<String> {
            el.find(tag)
                .map(|parent| parent.findall(item).map(|e| e.text.clone()).collect())
                .unwrap_or_default()
        };
        Ok(Self {
            name: el.require_text("name")?.to_owned(),
            method: el.require_text("method")?.to_owned(),
            version: el.require_text("version")?.to_owned(),
            begin_time: parse_timestamp(el.require_text("beginTime")?)?,
            end_time: parse_timestamp(el.require_text("endTime")?)?,
            source_files: list("sourceFiles", "filePath"),
            settings: list("settings", "setting"),
            results: list("results", "result"),
        })
    }

    fn to_element(&self) -> Element {
        Element::new("entry")
            .child(Element::with_text("name", &self.name))
            .child(Element::with_text("method", &self.method))
            .child(Element::with_text("version", &self.version))
            .child(Element::with_text(
                "beginTime",
                format_timestamp(&self.begin_time),
            ))
            .child(Element::with_text(
                "endTime",
                format_timestamp(&self.end_time),
            ))
            .child(Element::new("sourceFiles").children(
                self.source_files
                    .iter()
                    .map(|f| Element::with_text("filePath", f)),
            ))
            .child(Element::new("settings").children(
                self.settings.iter().map(|s| Element::with_text("setting", s)),
            ))
            .child(Element::new("results").children(
                self.results.iter().map(|r| Element::with_text("result", r)),
            ))
    }

    fn serializable(&self) -> serde_json::Value {
        json!({
            "name": self.name,
            "method": self.method,
            "version": self.version,
            "beginTime": format_timestamp(&self.begin_time),
            "endTime": format_timestamp(&self.end_time),
            "sourceFiles": self.source_files,
            "settings": self.settings,
            "results": self.results,
        })
    }
}
