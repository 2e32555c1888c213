//! `sensorLayout.xml` — sensor net geometry.

use std::collections::BTreeMap;

use serde_json::json;

use super::{parse_value, Element};
use crate::error::{MffError, Result};

pub const NAMESPACE: &str = "http://www.egi.com/sensorLayout_mff";
pub const ROOT_TAG: &str = "sensorLayout";
pub const DEFAULT_FILENAME: &str = "sensorLayout.xml";

/// One `<sensor>`, shared between the layout and coordinates documents.
#[derive(Debug, Clone, PartialEq)]
pub struct Sensor {
    pub name: String,
    pub number: u32,
    pub kind: u32,
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub identifier: Option<u32>,
    pub original_number: Option<u32>,
}

impl Sensor {
    pub fn parse(el: &Element) -> Result<Self> {
        if el.name != "sensor" {
            return Err(MffError::format(format!(
                "unknown sensor with tag '{}'",
                el.name
            )));
        }
        Ok(Self {
            name: el.find("name").map(|e| e.text.clone()).unwrap_or_default(),
            number: el.parse_text("number")?,
            kind: el.parse_text("type")?,
            x: el.parse_text("x")?,
            y: el.parse_text("y")?,
            z: el.parse_text("z")?,
            identifier: el
                .find("identifier")
                .map(|e| parse_value(&e.text))
                .transpose()?,
            original_number: el
                .find("originalNumber")
                .map(|e| parse_value(&e.text))
                .transpose()?,
        })
    }

    pub fn to_element(&self) -> Element {
        let mut el = Element::new("sensor")
            .child(Element::with_text("name", &self.name))
            .child(Element::with_text("number", self.number))
            .child(Element::with_text("type", self.kind))
            .child(Element::with_text("x", self.x))
            .child(Element::with_text("y", self.y))
            .child(Element::with_text("z", self.z));
        if let Some(identifier) = self.identifier {
            el = el.child(Element::with_text("identifier", identifier));
        }
        if let Some(original) = self.original_number {
            el = el.child(Element::with_text("originalNumber", original));
        }
        el
    }

    pub fn serializable(&self) -> serde_json::Value {
        let mut value = json!({
            "name": self.name,
            "number": self.number,
            "type": self.kind,
            "x": self.x,
            "y": self.y,
            "z": self.z,
        });
        if let Some(identifier) = self.identifier {
            value["identifier"] = json!(identifier);
        }
        if let Some(original) = self.original_number {
            value["originalNumber"] = json!(original);
        }
        value
    }
}

/// Parse a `<sensors>` element into a number-keyed map.
pub(super) fn parse_sensors(sensors_el: &Element) -> Result<BTreeMap<u32, Sensor>> {
    let mut sensors = BTreeMap::new();
    for el in sensors_el.children.iter() {
        let sensor = Sensor::parse(el)?;
        sensors.insert(sensor.number, sensor);
    }
    Ok(sensors)
}

pub(super) fn sensors_element(sensors: &BTreeMap<u32, Sensor>) -> Element {
    Element::new("sensors").children(sensors.values().map(Sensor::to_element))
}

pub(super) fn sensors_serializable(sensors: &BTreeMap<u32, Sensor>) -> serde_json::Value {
    sensors
        .iter()
        .map(|(n, s)| (n.to_string(), s.serializable()))
        .collect::<serde_json::Map<_, _>>()
        .into()
}

#[derive(Debug, Clone, PartialEq)]
pub struct SensorLayout {
    pub name: String,
    pub sensors: BTreeMap<u32, Sensor>,
    /// Wired sensor pairs.
    pub threads: Vec<(u32, u32)>,
    pub tiling_sets: Vec<Vec<u32>>,
    pub neighbors: BTreeMap<u32, Vec<u32>>,
}

impl SensorLayout {
    pub fn parse(root: &Element) -> Result<Self> {
        let name = root
            .find("name")
            .map(|e| e.text.clone())
            .unwrap_or_else(|| "UNK".to_owned());
        let sensors = match root.find("sensors") {
            Some(el) => parse_sensors(el)?,
            None => BTreeMap::new(),
        };

        let mut threads = Vec::new();
        if let Some(threads_el) = root.find("threads") {
            for thread in threads_el.children.iter() {
                if thread.name != "thread" {
                    return Err(MffError::format(format!(
                        "unknown thread with tag '{}'",
                        thread.name
                    )));
                }
                let pair: Vec<u32> = thread
                    .text
                    .split(',')
                    .map(|t| parse_value(t.trim()))
                    .collect::<Result<_>>()?;
                if pair.len() != 2 {
                    return Err(MffError::format(format!(
                        "thread '{}' is not a sensor pair",
                        thread.text
                    )));
                }
                threads.push((pair[0], pair[1]));
            }
        }

        let mut tiling_sets = Vec::new();
        if let Some(sets_el) = root.find("tilingSets") {
            for set in sets_el.children.iter() {
                if set.name != "tilingSet" {
                    return Err(MffError::format(format!(
                        "unknown tilingSet with tag '{}'",
                        set.name
                    )));
                }
                tiling_sets.push(split_numbers(&set.text)?);
            }
        }

        let mut neighbors = BTreeMap::new();
        if let Some(neighbors_el) = root.find("neighbors") {
            for ch in neighbors_el.children.iter() {
                if ch.name != "ch" {
                    return Err(MffError::format(format!(
                        "unknown ch with tag '{}'",
                        ch.name
                    )));
                }
                let n: u32 = parse_value(ch.get_attr("n").ok_or_else(|| {
                    MffError::format("<ch> is missing its channel number attribute")
                })?)?;
                neighbors.insert(n, split_numbers(&ch.text)?);
            }
        }

        Ok(Self {
            name,
            sensors,
            threads,
            tiling_sets,
            neighbors,
        })
    }

    pub fn to_element(&self) -> Element {
        Element::new(ROOT_TAG)
            .child(Element::with_text("name", &self.name))
            .child(sensors_element(&self.sensors))
            .child(
                Element::new("threads").children(
                    self.threads
                        .iter()
                        .map(|(a, b)| Element::with_text("thread", format!("{a},{b}"))),
                ),
            )
            .child(
                Element::new("tilingSets").children(
                    self.tiling_sets
                        .iter()
                        .map(|set| Element::with_text("tilingSet", join_numbers(set))),
                ),
            )
            .child(
                Element::new("neighbors").children(self.neighbors.iter().map(|(n, list)| {
                    Element::with_text("ch", join_numbers(list)).attr("n", n)
                })),
            )
    }

    pub fn serializable(&self) -> serde_json::Value {
        json!({
            "name": self.name,
            "sensors": sensors_serializable(&self.sensors),
            "threads": self.threads.iter().map(|(a, b)| json!([a, b])).collect::<Vec<_>>(),
            "tilingSets": self.tiling_sets,
            "neighbors": self.neighbors.iter()
                .map(|(n, list)| (n.to_string(), json!(list)))
                .collect::<serde_json::Map<_, _>>(),
        })
    }
}

fn split_numbers(text: &str) -> Result<Vec<u32>> {
    text.split_whitespace().map(parse_value).collect()
}

fn join_numbers(numbers: &[u32]) -> String {
    numbers
        .iter()
        .map(|n| n.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::{write_document, XmlDocument};

    fn sample() -> SensorLayout {
        let mut sensors = BTreeMap::new();
        sensors.insert(
            1,
            Sensor {
                name: "None".into(),
                number: 1,
                kind: 0,
                x: 415.0,
                y: 147.0,
                z: 0.0,
                identifier: None,
                original_number: None,
            },
        );
        sensors.insert(
            258,
            Sensor {
                name: "None".into(),
                number: 258,
                kind: 2,
                x: 270.0,
                y: 93.0,
                z: 0.0,
                identifier: Some(1002),
                original_number: None,
            },
        );
        let mut neighbors = BTreeMap::new();
        neighbors.insert(4, vec![3, 5, 11, 12, 13, 226]);
        SensorLayout {
            name: "Geodesic Sensor Net 256 2.1".into(),
            sensors,
            threads: vec![(1, 2), (253, 254)],
            tiling_sets: vec![vec![4, 7, 10, 14]],
            neighbors,
        }
    }

    #[test]
    fn round_trip() {
        let layout = sample();
        let mut out = Vec::new();
        write_document(&mut out, NAMESPACE, &layout.to_element()).unwrap();
        match XmlDocument::from_stream(&out[..]).unwrap() {
            XmlDocument::SensorLayout(reparsed) => assert_eq!(reparsed, layout),
            other => panic!("wrong document kind: {other:?}"),
        }
    }

    #[test]
    fn name_defaults_when_absent() {
        let root = Element::new(ROOT_TAG);
        assert_eq!(SensorLayout::parse(&root).unwrap().name, "UNK");
    }

    #[test]
    fn malformed_thread_is_rejected() {
        let root = Element::new(ROOT_TAG)
            .child(Element::new("threads").child(Element::with_text("thread", "1,2,3")));
        assert!(SensorLayout::parse(&root).is_err());
    }
}
