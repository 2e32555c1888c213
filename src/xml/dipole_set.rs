//! `dipoleSet.xml` — dipole positions and orientations.

use serde_json::json;

use super::{parse_value, Element};
use crate::error::{MffError, Result};

pub const NAMESPACE: &str = "http://www.egi.com/dipoleSet_mff";
pub const ROOT_TAG: &str = "dipoleSet";
pub const DEFAULT_FILENAME: &str = "dipoleSet.xml";

/// Each dipole carries three 3-vectors; the three arrays always share the
/// same length.
#[derive(Debug, Clone, PartialEq)]
pub struct DipoleSet {
    pub name: String,
    pub kind: String,
    pub computation_coordinate: Vec<[f32; 3]>,
    pub visualization_coordinate: Vec<[f32; 3]>,
    pub orientation_vector: Vec<[f32; 3]>,
}

impl DipoleSet {
    pub fn len(&self) -> usize {
        self.computation_coordinate.len()
    }

    pub fn is_empty(&self) -> bool {
        self.computation_coordinate.is_empty()
    }

    pub fn parse(root: &Element) -> Result<Self> {
        let mut computation = Vec::new();
        let mut visualization = Vec::new();
        let mut orientation = Vec::new();
        let dipoles = root.require("dipoles")?;
        for dipole in dipoles.findall("dipole") {
            for attr in dipole.children.iter() {
                let v3 = parse_vector3(&attr.text)?;
                match attr.name.as_str() {
                    "computationCoordinate" => computation.push(v3),
                    "visualizationCoordinate" => visualization.push(v3),
                    "orientationVector" => orientation.push(v3),
                    other => {
                        return Err(MffError::format(format!(
                            "unknown dipole coordinate '{other}'"
                        )))
                    }
                }
            }
        }

        let n = dipoles.findall("dipole").count();
        if computation.len() != n || visualization.len() != n || orientation.len() != n {
            return Err(MffError::format(format!(
                "dipole arrays have broken shape: {} computation, {} visualization, \
                 {} orientation (expected {n} each)",
                computation.len(),
                visualization.len(),
                orientation.len(),
            )));
        }

        Ok(Self {
            name: root.require_text("name")?.to_owned(),
            kind: root.require_text("type")?.to_owned(),
            computation_coordinate: computation,
            visualization_coordinate: visualization,
            orientation_vector: orientation,
        })
    }

    pub fn to_element(&self) -> Element {
        let dipoles = self
            .computation_coordinate
            .iter()
            .zip(&self.visualization_coordinate)
            .zip(&self.orientation_vector)
            .map(|((c, v), o)| {
                Element::new("dipole")
                    .child(Element::with_text("computationCoordinate", join_vector3(c)))
                    .child(Element::with_text(
                        "visualizationCoordinate",
                        join_vector3(v),
                    ))
                    .child(Element::with_text("orientationVector", join_vector3(o)))
            });
        Element::new(ROOT_TAG)
            .child(Element::with_text("name", &self.name))
            .child(Element::with_text("type", &self.kind))
            .child(Element::new("dipoles").children(dipoles))
    }

    pub fn serializable(&self) -> serde_json::Value {
        json!({
            "name": self.name,
            "type": self.kind,
            "dipoles": {
                "computationCoordinate": self.computation_coordinate,
                "visualizationCoordinate": self.visualization_coordinate,
                "orientationVector": self.orientation_vector,
            },
        })
    }
}

fn parse_vector3(text: &str) -> Result<[f32; 3]> {
    let parts: Vec<f32> = text
        .split(',')
        .map(|t| parse_value(t.trim()))
        .collect::<Result<_>>()?;
    if parts.len() != 3 {
        return Err(MffError::format(format!(
            "'{text}' is not a 3-component coordinate"
        )));
    }
    Ok([parts[0], parts[1], parts[2]])
}

fn join_vector3(v: &[f32; 3]) -> String {
    format!("{},{},{}", v[0], v[1], v[2])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::{write_document, XmlDocument};

    fn sample() -> DipoleSet {
        DipoleSet {
            name: "SWS_003_IHM".into(),
            kind: "Dense".into(),
            computation_coordinate: vec![[64.0, 120.0, 150.0], [68.0, 120.0, 150.0]],
            visualization_coordinate: vec![[61.0, 140.0, 150.0], [65.0, 140.0, 160.0]],
            orientation_vector: vec![[0.25, 0.35, 0.9], [-0.05, 0.91, 0.4]],
        }
    }

    #[test]
    fn round_trip() {
        let dipoles = sample();
        let mut out = Vec::new();
        write_document(&mut out, NAMESPACE, &dipoles.to_element()).unwrap();
        match XmlDocument::from_stream(&out[..]).unwrap() {
            XmlDocument::DipoleSet(reparsed) => {
                assert_eq!(reparsed, dipoles);
                assert_eq!(reparsed.len(), 2);
            }
            other => panic!("wrong document kind: {other:?}"),
        }
    }

    #[test]
    fn scientific_notation_parses() {
        assert_eq!(
            parse_vector3("64,1.2e+02,1.5e+02").unwrap(),
            [64.0, 120.0, 150.0]
        );
    }

    #[test]
    fn mismatched_shapes_are_rejected() {
        let root = Element::new(ROOT_TAG)
            .child(Element::with_text("name", "x"))
            .child(Element::with_text("type", "Dense"))
            .child(
                Element::new("dipoles").child(
                    Element::new("dipole")
                        .child(Element::with_text("computationCoordinate", "1,2,3")),
                ),
            );
        assert!(DipoleSet::parse(&root).is_err());
    }
}
