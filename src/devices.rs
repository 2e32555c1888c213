//! Device resource lookup.
//!
//! Sensor-net devices ship as paired `coordinates/<device>.xml` and
//! `sensorLayout/<device>.xml` documents in a resource directory supplied
//! by the caller; the resource bundles themselves are not part of this
//! crate.

use std::fs::File;
use std::path::Path;

use crate::error::{MffError, Result};
use crate::xml::{Coordinates, SensorLayout, XmlDocument};

/// Load the coordinates and sensor-layout documents of `device`.
pub fn coordinates_and_sensor_layout(
    resources_dir: impl AsRef<Path>,
    device: &str,
) -> Result<(Coordinates, SensorLayout)> {
    let resources_dir = resources_dir.as_ref();

    let coordinates_path = resources_dir.join("coordinates").join(format!("{device}.xml"));
    let coordinates = match open_document(&coordinates_path, device)? {
        XmlDocument::Coordinates(doc) => doc,
        other => {
            return Err(MffError::format(format!(
                "'{}' holds a {} document",
                coordinates_path.display(),
                other.root_tag()
            )))
        }
    };

    let layout_path = resources_dir.join("sensorLayout").join(format!("{device}.xml"));
    let layout = match open_document(&layout_path, device)? {
        XmlDocument::SensorLayout(doc) => doc,
        other => {
            return Err(MffError::format(format!(
                "'{}' holds a {} document",
                layout_path.display(),
                other.root_tag()
            )))
        }
    };

    Ok((coordinates, layout))
}

fn open_document(path: &Path, device: &str) -> Result<XmlDocument> {
    if !path.exists() {
        return Err(MffError::not_found(format!(
            "device '{device}' has no resource at '{}'",
            path.display()
        )));
    }
    XmlDocument::from_stream(File::open(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::sensor_layout::Sensor;
    use crate::xml::{coordinates, parse_timestamp, sensor_layout, write_document};
    use std::collections::BTreeMap;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn loads_paired_documents() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir(tmp.path().join("coordinates")).unwrap();
        fs::create_dir(tmp.path().join("sensorLayout")).unwrap();

        let mut sensors = BTreeMap::new();
        sensors.insert(
            1,
            Sensor {
                name: "None".into(),
                number: 1,
                kind: 0,
                x: 1.0,
                y: 2.0,
                z: 3.0,
                identifier: None,
                original_number: None,
            },
        );
        let coords = Coordinates {
            acq_time: parse_timestamp("2006-04-13T16:00:00.000000-08:00").unwrap(),
            acq_method: "Average".into(),
            name: "HydroCel GSN 256 1.0".into(),
            default_subject: true,
            sensors: sensors.clone(),
        };
        let layout = SensorLayout {
            name: "HydroCel GSN 256 1.0".into(),
            sensors,
            threads: vec![],
            tiling_sets: vec![],
            neighbors: BTreeMap::new(),
        };

        let device = "HydroCel GSN 256 1.0";
        let mut out = Vec::new();
        write_document(&mut out, coordinates::NAMESPACE, &coords.to_element()).unwrap();
        fs::write(
            tmp.path().join("coordinates").join(format!("{device}.xml")),
            &out,
        )
        .unwrap();
        out.clear();
        write_document(&mut out, sensor_layout::NAMESPACE, &layout.to_element()).unwrap();
        fs::write(
            tmp.path().join("sensorLayout").join(format!("{device}.xml")),
            &out,
        )
        .unwrap();

        let (c, l) = coordinates_and_sensor_layout(tmp.path(), device).unwrap();
        assert_eq!(c, coords);
        assert_eq!(l, layout);
    }

    #[test]
    fn unknown_device_is_not_found() {
        let tmp = TempDir::new().unwrap();
        assert!(matches!(
            coordinates_and_sensor_layout(tmp.path(), "NoSuchNet").unwrap_err(),
            MffError::NotFound(_)
        ));
    }
}
