//! `coordinates.xml` — electrode coordinates from one acquisition.

use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset};
use serde_json::json;

use super::sensor_layout::{parse_sensors, sensors_element, sensors_serializable, Sensor};
use super::{format_timestamp, parse_timestamp, Element};
use crate::error::Result;

pub const NAMESPACE: &str = "http://www.egi.com/coordinates_mff";
pub const ROOT_TAG: &str = "coordinates";
pub const DEFAULT_FILENAME: &str = "coordinates.xml";

#[derive(Debug, Clone, PartialEq)]
pub struct Coordinates {
    pub acq_time: DateTime<FixedOffset>,
    pub acq_method: String,
    /// Sensor net name, nested under the embedded sensor layout.
    pub name: String,
    pub default_subject: bool,
    pub sensors: BTreeMap<u32, Sensor>,
}

impl Coordinates {
    pub fn parse(root: &Element) -> Result<Self> {
        let layout = root.require("sensorLayout")?;
        let name = layout
            .find("name")
            .map(|e| e.text.clone())
            .unwrap_or_else(|| "UNK".to_owned());
        Ok(Self {
            acq_time: parse_timestamp(root.require_text("acqTime")?)?,
            acq_method: root.require_text("acqMethod")?.to_owned(),
            name,
            default_subject: root.require_text("defaultSubject")? == "true",
            sensors: parse_sensors(layout.require("sensors")?)?,
        })
    }

    pub fn to_element(&self) -> Element {
        Element::new(ROOT_TAG)
            .child(Element::with_text(
                "acqTime",
                format_timestamp(&self.acq_time),
            ))
            .child(Element::with_text("acqMethod", &self.acq_method))
            .child(Element::with_text("defaultSubject", self.default_subject))
            .child(
                Element::new("sensorLayout")
                    .child(Element::with_text("name", &self.name))
                    .child(sensors_element(&self.sensors)),
            )
    }

    pub fn serializable(&self) -> serde_json::Value {
        json!({
            "acqTime": format_timestamp(&self.acq_time),
            "acqMethod": self.acq_method,
            "name": self.name,
            "defaultSubject": self.default_subject,
            "sensors": sensors_serializable(&self.sensors),
        })
    }
}
