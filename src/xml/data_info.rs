//! `info<N>.xml` — per-stream data info: channel type, device properties,
//! filters, and calibrations.

use std::collections::BTreeMap;

use serde_json::json;

use super::{parse_value, Element};
use crate::error::{MffError, Result};

pub const NAMESPACE: &str = "http://www.egi.com/info_n_mff";
pub const ROOT_TAG: &str = "dataInfo";
pub const DEFAULT_FILENAME: &str = "info1.xml";

/// Calibration kind applied by default when present.
pub const GCAL: &str = "GCAL";

#[derive(Debug, Clone, PartialEq)]
pub struct DataInfo {
    pub general: GeneralInformation,
    pub filters: Vec<Filter>,
    pub calibrations: BTreeMap<String, Calibration>,
}

/// The `<fileDataType>` payload: one element named after the channel type
/// (`EEG`, `PNSData`, ...) holding device properties.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneralInformation {
    pub channel_type: String,
    /// Device properties in document order (e.g. `sensorLayoutName`).
    pub properties: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub begin_time: f64,
    pub method: String,
    pub kind: String,
    /// Value and unit, e.g. `(0.1, "Hz")`.
    pub cutoff_frequency: (f64, String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Calibration {
    pub begin_time: f64,
    /// 1-based channel index to factor.
    pub channels: BTreeMap<u32, f32>,
}

impl DataInfo {
    /// Minimal document for a freshly written stream.
    pub fn new(channel_type: impl Into<String>) -> Self {
        Self {
            general: GeneralInformation {
                channel_type: channel_type.into(),
                properties: Vec::new(),
            },
            filters: Vec::new(),
            calibrations: BTreeMap::new(),
        }
    }

    pub fn parse(root: &Element) -> Result<Self> {
        let file_data_type = root.require("generalInformation")?.require("fileDataType")?;
        let type_el = file_data_type.children.first().ok_or_else(|| {
            MffError::format("<fileDataType> declares no channel type")
        })?;
        let general = GeneralInformation {
            channel_type: type_el.name.clone(),
            properties: type_el
                .children
                .iter()
                .map(|c| (c.name.clone(), c.text.clone()))
                .collect(),
        };

        let mut filters = Vec::new();
        if let Some(filters_el) = root.find("filters") {
            for f in filters_el.findall("filter") {
                filters.push(Filter::parse(f)?);
            }
        }

        let mut calibrations = BTreeMap::new();
        if let Some(cals_el) = root.find("calibrations") {
            for cal in cals_el.findall("calibration") {
                let name = cal.require_text("type")?.to_owned();
                calibrations.insert(name, Calibration::parse(cal)?);
            }
        }

        Ok(Self {
            general,
            filters,
            calibrations,
        })
    }

    pub fn to_element(&self) -> Element {
        let type_el = Element::new(&self.general.channel_type).children(
            self.general
                .properties
                .iter()
                .map(|(tag, value)| Element::with_text(tag, value)),
        );
        let mut root = Element::new(ROOT_TAG).child(
            Element::new("generalInformation")
                .child(Element::new("fileDataType").child(type_el)),
        );
        root = root.child(
            Element::new("filters").children(self.filters.iter().map(Filter::to_element)),
        );
        root.child(Element::new("calibrations").children(
            self.calibrations.iter().map(|(name, cal)| {
                cal.to_element(name)
            }),
        ))
    }

    pub fn serializable(&self) -> serde_json::Value {
        json!({
            "generalInformation": {
                "channel_type": self.general.channel_type,
                "properties": self.general.properties
                    .iter()
                    .cloned()
                    .collect::<BTreeMap<String, String>>(),
            },
            "filters": self.filters.iter().map(|f| json!({
                "beginTime": f.begin_time,
                "method": f.method,
                "type": f.kind,
                "cutoffFrequency": [f.cutoff_frequency.0, f.cutoff_frequency.1],
            })).collect::<Vec<_>>(),
            "calibrations": self.calibrations.iter().map(|(name, cal)| (name.clone(), json!({
                "beginTime": cal.begin_time,
                "channels": cal.channels.iter()
                    .map(|(n, v)| (n.to_string(), json!(v)))
                    .collect::<serde_json::Map<_, _>>(),
            }))).collect::<serde_json::Map<_, _>>(),
        })
    }
}

impl Filter {
    fn parse(el: &Element) -> Result<Self> {
        let cutoff = el.require("cutoffFrequency")?;
        let units = cutoff.get_attr("units").unwrap_or("Hz").to_owned();
        Ok(Self {
            begin_time: el.parse_text("beginTime")?,
            method: el.require_text("method")?.to_owned(),
            kind: el.require_text("type")?.to_owned(),
            cutoff_frequency: (parse_value(&cutoff.text)?, units),
        })
    }

    fn to_element(&self) -> Element {
        Element::new("filter")
            .child(Element::with_text("beginTime", self.begin_time))
            .child(Element::with_text("method", &self.method))
            .child(Element::with_text("type", &self.kind))
            .child(
                Element::with_text("cutoffFrequency", self.cutoff_frequency.0)
                    .attr("units", &self.cutoff_frequency.1),
            )
    }
}

impl Calibration {
    fn parse(el: &Element) -> Result<Self> {
        let mut channels = BTreeMap::new();
        for ch in el.require("channels")?.findall("ch") {
            let n: u32 = parse_value(ch.get_attr("n").ok_or_else(|| {
                MffError::format("<ch> is missing its channel number attribute")
            })?)?;
            channels.insert(n, parse_value(&ch.text)?);
        }
        Ok(Self {
            begin_time: el.parse_text("beginTime")?,
            channels,
        })
    }

    fn to_element(&self, name: &str) -> Element {
        Element::new("calibration")
            .child(Element::with_text("beginTime", self.begin_time))
            .child(Element::with_text("type", name))
            .child(Element::new("channels").children(
                self.channels
                    .iter()
                    .map(|(n, v)| Element::with_text("ch", v).attr("n", n)),
            ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::{write_document, XmlDocument};

    fn sample() -> DataInfo {
        let mut info = DataInfo::new("EEG");
        info.general.properties = vec![
            ("sensorLayoutName".into(), "Geodesic Sensor Net 256 2.1".into()),
            ("montageName".into(), "Geodesic Sensor Net 256 2.1".into()),
        ];
        info.filters.push(Filter {
            begin_time: 0.0,
            method: "Hardware".into(),
            kind: "highpass".into(),
            cutoff_frequency: (0.1, "Hz".into()),
        });
        let mut channels = BTreeMap::new();
        channels.insert(1, 0.990_157);
        channels.insert(10, 1.007_665);
        channels.insert(249, 0.999_596);
        info.calibrations.insert(
            GCAL.to_owned(),
            Calibration {
                begin_time: 0.0,
                channels,
            },
        );
        info
    }

    #[test]
    fn round_trip() {
        let info = sample();
        let mut out = Vec::new();
        write_document(&mut out, NAMESPACE, &info.to_element()).unwrap();
        match XmlDocument::from_stream(&out[..]).unwrap() {
            XmlDocument::DataInfo(reparsed) => assert_eq!(reparsed, info),
            other => panic!("wrong document kind: {other:?}"),
        }
    }

    #[test]
    fn channel_type_is_the_payload_tag() {
        let info = sample();
        let mut out = Vec::new();
        write_document(&mut out, NAMESPACE, &info.to_element()).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("<EEG>"));
        assert_eq!(info.general.channel_type, "EEG");
    }

    #[test]
    fn empty_sections_parse_as_empty() {
        let root = Element::new(ROOT_TAG).child(
            Element::new("generalInformation")
                .child(Element::new("fileDataType").child(Element::new("PNSData"))),
        );
        let info = DataInfo::parse(&root).unwrap();
        assert_eq!(info.general.channel_type, "PNSData");
        assert!(info.filters.is_empty());
        assert!(info.calibrations.is_empty());
    }
}
