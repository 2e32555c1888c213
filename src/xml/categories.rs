//! `categories.xml` — categorized segments marking experimental conditions.

use std::collections::BTreeMap;

use serde_json::json;

use super::{parse_value, Element};
use crate::error::{MffError, Result};

pub const NAMESPACE: &str = "http://www.egi.com/categories_mff";
pub const ROOT_TAG: &str = "categories";
pub const DEFAULT_FILENAME: &str = "categories.xml";

/// Category name to its ordered segments.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Categories {
    pub categories: BTreeMap<String, Vec<Segment>>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Segment {
    /// `"good"` or `"bad"`.
    pub status: Option<String>,
    pub name: Option<String>,
    /// Microseconds from recording start.
    pub begin_time: u64,
    pub end_time: u64,
    pub evt_begin: u64,
    pub evt_end: u64,
    pub channel_status: Vec<ChannelStatus>,
    pub keys: BTreeMap<String, SegmentKey>,
    pub faults: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChannelStatus {
    pub signal_bin: u32,
    pub exclusion: String,
    pub channels: Vec<u32>,
}

/// Typed key payload; the declared type is preserved verbatim.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentKey {
    pub kind: String,
    pub data: String,
}

/// One entry of the begin-time ordering used for epoch association.
#[derive(Debug, Clone, PartialEq)]
pub struct SortedSegment {
    pub category: String,
    pub begin_time: u64,
}

impl Categories {
    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.categories.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&[Segment]> {
        self.categories.get(name).map(Vec::as_slice)
    }

    /// All segments tagged with their category, ordered by begin time.
    pub fn sort_by_begin_time(&self) -> Vec<SortedSegment> {
        let mut sorted: Vec<SortedSegment> = self
            .categories
            .iter()
            .flat_map(|(name, segments)| {
                segments.iter().map(move |s| SortedSegment {
                    category: name.clone(),
                    begin_time: s.begin_time,
                })
            })
            .collect();
        sorted.sort_by_key(|s| s.begin_time);
        sorted
    }

    pub fn parse(root: &Element) -> Result<Self> {
        let mut categories = BTreeMap::new();
        for cat in root.children.iter() {
            if cat.name != "cat" {
                return Err(MffError::format(format!(
                    "unknown cat with tag '{}'",
                    cat.name
                )));
            }
            let name = cat.require_text("name")?.to_owned();
            let mut segments = Vec::new();
            for seg in cat.require("segments")?.findall("seg") {
                segments.push(Segment::parse(seg)?);
            }
            categories.insert(name, segments);
        }
        Ok(Self { categories })
    }

    pub fn to_element(&self) -> Element {
        Element::new(ROOT_TAG).children(self.categories.iter().map(|(name, segments)| {
            Element::new("cat")
                .child(Element::with_text("name", name))
                .child(
                    Element::new("segments")
                        .children(segments.iter().map(Segment::to_element)),
                )
        }))
    }

    pub fn serializable(&self) -> serde_json::Value {
        json!({
            "categories": self.categories.iter()
                .map(|(name, segments)| {
                    let segs: Vec<_> = segments.iter().map(Segment::serializable).collect();
                    (name.clone(), json!(segs))
                })
                .collect::<serde_json::Map<_, _>>(),
        })
    }
}

impl Segment {
    fn parse(el: &Element) -> Result<Self> {
        let mut channel_status = Vec::new();
        if let Some(status_el) = el.find("channelStatus") {
            for channels_el in status_el.findall("channels") {
                channel_status.push(ChannelStatus::parse(channels_el)?);
            }
        }

        let mut keys = BTreeMap::new();
        if let Some(keys_el) = el.find("keys") {
            for key in keys_el.findall("key") {
                let code = key.require_text("keyCode")?.to_owned();
                let data = key.require("data")?;
                keys.insert(
                    code,
                    SegmentKey {
                        kind: data.get_attr("dataType").unwrap_or("string").to_owned(),
                        data: data.text.clone(),
                    },
                );
            }
        }

        let mut faults = Vec::new();
        if let Some(faults_el) = el.find("faults") {
            for fault in faults_el.findall("fault") {
                faults.push(fault.text.clone());
            }
        }

        Ok(Self {
            status: el.get_attr("status").map(str::to_owned),
            name: el.find("name").map(|e| e.text.clone()),
            begin_time: el.parse_text("beginTime")?,
            end_time: el.parse_text("endTime")?,
            evt_begin: el.parse_text("evtBegin")?,
            evt_end: el.parse_text("evtEnd")?,
            channel_status,
            keys,
            faults,
        })
    }

    fn to_element(&self) -> Element {
        let mut el = Element::new("seg");
        if let Some(status) = &self.status {
            el = el.attr("status", status);
        }
        if let Some(name) = &self.name {
            el = el.child(Element::with_text("name", name));
        }
        if !self.faults.is_empty() {
            el = el.child(
                Element::new("faults")
                    .children(self.faults.iter().map(|f| Element::with_text("fault", f))),
            );
        }
        el = el
            .child(Element::with_text("beginTime", self.begin_time))
            .child(Element::with_text("endTime", self.end_time))
            .child(Element::with_text("evtBegin", self.evt_begin))
            .child(Element::with_text("evtEnd", self.evt_end));
        if !self.channel_status.is_empty() {
            el = el.child(
                Element::new("channelStatus")
                    .children(self.channel_status.iter().map(ChannelStatus::to_element)),
            );
        }
        if !self.keys.is_empty() {
            el = el.child(Element::new("keys").children(self.keys.iter().map(
                |(code, key)| {
                    Element::new("key")
                        .child(Element::with_text("keyCode", code))
                        .child(Element::with_text("data", &key.data).attr("dataType", &key.kind))
                },
            )));
        }
        el
    }

    fn serializable(&self) -> serde_json::Value {
        let mut value = json!({
            "status": self.status,
            "beginTime": self.begin_time,
            "endTime": self.end_time,
            "evtBegin": self.evt_begin,
            "evtEnd": self.evt_end,
        });
        if let Some(name) = &self.name {
            value["name"] = json!(name);
        }
        if !self.channel_status.is_empty() {
            value["channelStatus"] = json!(self
                .channel_status
                .iter()
                .map(|c| json!({
                    "signalBin": c.signal_bin,
                    "exclusion": c.exclusion,
                    "channels": c.channels,
                }))
                .collect::<Vec<_>>());
        }
        if !self.keys.is_empty() {
            value["keys"] = self
                .keys
                .iter()
                .map(|(code, key)| {
                    (
                        code.clone(),
                        json!({"type": key.kind, "data": key.data}),
                    )
                })
                .collect::<serde_json::Map<_, _>>()
                .into();
        }
        if !self.faults.is_empty() {
            value["faults"] = json!(self.faults);
        }
        value
    }
}

impl ChannelStatus {
    fn parse(el: &Element) -> Result<Self> {
        let signal_bin = parse_value(el.get_attr("signalBin").ok_or_else(|| {
            MffError::format("<channels> is missing its signalBin attribute")
        })?)?;
        let channels = el
            .text
            .split_whitespace()
            .map(parse_value)
            .collect::<Result<_>>()?;
        Ok(Self {
            signal_bin,
            exclusion: el.get_attr("exclusion").unwrap_or_default().to_owned(),
            channels,
        })
    }

    fn to_element(&self) -> Element {
        let text = self
            .channels
            .iter()
            .map(|c| c.to_string())
            .collect::<Vec<_>>()
            .join(" ");
        Element::with_text("channels", text)
            .attr("signalBin", self.signal_bin)
            .attr("exclusion", &self.exclusion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::{write_document, XmlDocument};

    fn sample() -> Categories {
        let mut categories = BTreeMap::new();
        categories.insert(
            "ULRN".to_owned(),
            vec![Segment {
                status: Some("bad".into()),
                name: None,
                begin_time: 0,
                end_time: 1_200_000,
                evt_begin: 201_981,
                evt_end: 201_981,
                channel_status: vec![ChannelStatus {
                    signal_bin: 1,
                    exclusion: "badChannels".into(),
                    channels: vec![1, 12, 15, 50, 251, 253],
                }],
                keys: BTreeMap::new(),
                faults: vec!["eyeb".into(), "eyem".into(), "badc".into()],
            }],
        );
        categories.insert(
            "LRND".to_owned(),
            vec![Segment {
                status: Some("good".into()),
                name: Some("Average".into()),
                begin_time: 3_655_704_000,
                end_time: 3_656_904_000,
                evt_begin: 3_655_907_981,
                evt_end: 3_655_907_981,
                channel_status: vec![ChannelStatus {
                    signal_bin: 1,
                    exclusion: "badChannels".into(),
                    channels: vec![],
                }],
                keys: {
                    let mut keys = BTreeMap::new();
                    keys.insert(
                        "#seg".to_owned(),
                        SegmentKey {
                            kind: "long".into(),
                            data: "3".into(),
                        },
                    );
                    keys
                },
                faults: vec![],
            }],
        );
        Categories { categories }
    }

    #[test]
    fn round_trip() {
        let categories = sample();
        let mut out = Vec::new();
        write_document(&mut out, NAMESPACE, &categories.to_element()).unwrap();
        match XmlDocument::from_stream(&out[..]).unwrap() {
            XmlDocument::Categories(reparsed) => assert_eq!(reparsed, categories),
            other => panic!("wrong document kind: {other:?}"),
        }
    }

    #[test]
    fn sorts_segments_across_categories() {
        let sorted = sample().sort_by_begin_time();
        assert_eq!(sorted.len(), 2);
        assert_eq!(sorted[0].category, "ULRN");
        assert_eq!(sorted[0].begin_time, 0);
        assert_eq!(sorted[1].category, "LRND");
    }

    #[test]
    fn empty_channel_list_parses() {
        let el = Element::with_text("channels", "")
            .attr("signalBin", 1)
            .attr("exclusion", "badChannels");
        let status = ChannelStatus::parse(&el).unwrap();
        assert!(status.channels.is_empty());
    }
}
