//! `Events*.xml` — event tracks.
//!
//! Read matches any `Events*` basename; the default emit filename is
//! `Events.xml` and callers may override it per track.

use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset};
use serde_json::json;

use super::{format_timestamp, parse_timestamp, parse_value, Element};
use crate::error::{MffError, Result};

pub const NAMESPACE: &str = "http://www.egi.com/event_mff";
pub const ROOT_TAG: &str = "eventTrack";
pub const DEFAULT_FILENAME: &str = "Events.xml";

#[derive(Debug, Clone, PartialEq)]
pub struct EventTrack {
    pub name: String,
    pub track_type: String,
    pub events: Vec<Event>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub begin_time: DateTime<FixedOffset>,
    /// Microseconds.
    pub duration: u64,
    pub relative_begin_time: Option<i64>,
    pub segmentation_event: Option<bool>,
    pub code: String,
    pub label: Option<String>,
    pub description: Option<String>,
    pub source_device: Option<String>,
    pub keys: BTreeMap<String, KeyValue>,
}

/// Typed key payload, dispatched on the `dataType` attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum KeyValue {
    Short(i16),
    Long(i64),
    Text(String),
    /// Unrecognised type, preserved verbatim.
    Other { kind: String, value: String },
}

impl KeyValue {
    fn parse(data_type: &str, text: &str) -> Result<Self> {
        Ok(match data_type {
            "short" => KeyValue::Short(parse_value(text)?),
            "long" => KeyValue::Long(parse_value(text)?),
            "string" => KeyValue::Text(text.to_owned()),
            other => KeyValue::Other {
                kind: other.to_owned(),
                value: text.to_owned(),
            },
        })
    }

    fn data_type(&self) -> &str {
        match self {
            KeyValue::Short(_) => "short",
            KeyValue::Long(_) => "long",
            KeyValue::Text(_) => "string",
            KeyValue::Other { kind, .. } => kind,
        }
    }

    fn text(&self) -> String {
        match self {
            KeyValue::Short(v) => v.to_string(),
            KeyValue::Long(v) => v.to_string(),
            KeyValue::Text(v) => v.clone(),
            KeyValue::Other { value, .. } => value.clone(),
        }
    }

    pub fn serializable(&self) -> serde_json::Value {
        match self {
            KeyValue::Short(v) => json!(v),
            KeyValue::Long(v) => json!(v),
            KeyValue::Text(v) => json!(v),
            KeyValue::Other { value, .. } => json!(value),
        }
    }
}

impl EventTrack {
    pub fn new(name: impl Into<String>, track_type: impl Into<String>, events: Vec<Event>) -> Self {
        Self {
            name: name.into(),
            track_type: track_type.into(),
            events,
        }
    }

    pub fn parse(root: &Element) -> Result<Self> {
        let mut events = Vec::new();
        for el in root.findall("event") {
            events.push(Event::parse(el)?);
        }
        Ok(Self {
            name: root.require_text("name")?.to_owned(),
            track_type: root.require_text("trackType")?.to_owned(),
            events,
        })
    }

    pub fn to_element(&self) -> Element {
        Element::new(ROOT_TAG)
            .child(Element::with_text("name", &self.name))
            .child(Element::with_text("trackType", &self.track_type))
            .children(self.events.iter().map(Event::to_element))
    }

    pub fn serializable(&self) -> serde_json::Value {
        json!({
            "name": self.name,
            "trackType": self.track_type,
            "event": self.events.iter().map(Event::serializable).collect::<Vec<_>>(),
        })
    }
}

impl Event {
    pub fn parse(el: &Element) -> Result<Self> {
        let mut keys = BTreeMap::new();
        if let Some(keys_el) = el.find("keys") {
            for key in keys_el.findall("key") {
                let code = key.require_text("keyCode")?.to_owned();
                let data = key.require("data")?;
                let data_type = data.get_attr("dataType").ok_or_else(|| {
                    MffError::format("event key <data> is missing its dataType")
                })?;
                keys.insert(code, KeyValue::parse(data_type, &data.text)?);
            }
        }
        Ok(Self {
            begin_time: parse_timestamp(el.require_text("beginTime")?)?,
            duration: el.parse_text("duration")?,
            relative_begin_time: el
                .find("relativeBeginTime")
                .map(|e| parse_value(&e.text))
                .transpose()?,
            segmentation_event: el
                .find("segmentationEvent")
                .map(|e| e.text == "true"),
            code: el.require_text("code")?.to_owned(),
            label: el.find("label").map(|e| e.text.clone()),
            description: el.find("description").map(|e| e.text.clone()),
            source_device: el.find("sourceDevice").map(|e| e.text.clone()),
            keys,
        })
    }

    pub fn to_element(&self) -> Element {
        let mut el = Element::new("event")
            .child(Element::with_text(
                "beginTime",
                format_timestamp(&self.begin_time),
            ))
            .child(Element::with_text("duration", self.duration));
        if let Some(relative) = self.relative_begin_time {
            el = el.child(Element::with_text("relativeBeginTime", relative));
        }
        if let Some(segmentation) = self.segmentation_event {
            el = el.child(Element::with_text("segmentationEvent", segmentation));
        }
        el = el.child(Element::with_text("code", &self.code));
        if let Some(label) = &self.label {
            el = el.child(Element::with_text("label", label));
        }
        if let Some(description) = &self.description {
            el = el.child(Element::with_text("description", description));
        }
        if let Some(device) = &self.source_device {
            el = el.child(Element::with_text("sourceDevice", device));
        }
        if !self.keys.is_empty() {
            el = el.child(Element::new("keys").children(self.keys.iter().map(
                |(code, value)| {
                    Element::new("key")
                        .child(Element::with_text("keyCode", code))
                        .child(
                            Element::with_text("data", value.text())
                                .attr("dataType", value.data_type()),
                        )
                },
            )));
        }
        el
    }

    pub fn serializable(&self) -> serde_json::Value {
        let mut value = json!({
            "beginTime": format_timestamp(&self.begin_time),
            "duration": self.duration,
            "code": self.code,
        });
        if let Some(relative) = self.relative_begin_time {
            value["relativeBeginTime"] = json!(relative);
        }
        if let Some(segmentation) = self.segmentation_event {
            value["segmentationEvent"] = json!(segmentation);
        }
        if let Some(label) = &self.label {
            value["label"] = json!(label);
        }
        if let Some(description) = &self.description {
            value["description"] = json!(description);
        }
        if let Some(device) = &self.source_device {
            value["sourceDevice"] = json!(device);
        }
        if !self.keys.is_empty() {
            value["keys"] = self
                .keys
                .iter()
                .map(|(code, v)| (code.clone(), v.serializable()))
                .collect::<serde_json::Map<_, _>>()
                .into();
        }
        value
    }
}

/// Whether a container entry holds an event track, by naming convention.
pub fn is_event_track_basename(basename: &str) -> bool {
    basename.starts_with("Events")
}
