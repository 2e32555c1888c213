//! Typed parsers and emitters for the recording's XML documents.
//!
//! Every document kind is identified by its namespace URI plus root tag;
//! [`XmlDocument::from_stream`] dispatches on that pair and returns a tagged
//! variant carrying the typed content.  Emission registers the document's
//! namespace as the default namespace so tag names appear unprefixed, and
//! always writes the `xsi` helper namespace, matching the dialect of the
//! acquisition software.
//!
//! Timestamps are `YYYY-MM-DDThh:mm:ss.ffffff±HH:MM`.  The colon in the
//! timezone is optional on read and always emitted on write; a timestamp
//! without a timezone cannot be represented (`DateTime<FixedOffset>`).

pub mod categories;
pub mod coordinates;
pub mod data_info;
pub mod dipole_set;
pub mod epochs;
pub mod event_track;
pub mod file_info;
pub mod history;
pub mod sensor_layout;
pub mod subject;

use std::io::{BufRead, BufReader, Read, Write};
use std::str::FromStr;

use chrono::{DateTime, FixedOffset};
use quick_xml::escape::escape;
use quick_xml::events::Event;
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::reader::NsReader;

use crate::error::{MffError, Result};

pub use categories::Categories;
pub use coordinates::Coordinates;
pub use data_info::DataInfo;
pub use dipole_set::DipoleSet;
pub use epochs::Epochs;
pub use event_track::EventTrack;
pub use file_info::FileInfo;
pub use history::History;
pub use sensor_layout::SensorLayout;
pub use subject::Subject;

const XSI_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema-instance";

// ── Element tree ─────────────────────────────────────────────────────────────

/// Namespace-stripped XML element.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Element {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub text: String,
    pub children: Vec<Element>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Element {
            name: name.into(),
            ..Element::default()
        }
    }

    pub fn with_text(name: impl Into<String>, text: impl ToString) -> Self {
        let mut el = Element::new(name);
        el.text = text.to_string();
        el
    }

    // Builder helpers for emission.

    pub fn attr(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.attrs.push((key.into(), value.to_string()));
        self
    }

    pub fn child(mut self, child: Element) -> Self {
        self.children.push(child);
        self
    }

    pub fn children(mut self, children: impl IntoIterator<Item = Element>) -> Self {
        self.children.extend(children);
        self
    }

    // Accessors for parsing.

    pub fn get_attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn find(&self, tag: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == tag)
    }

    pub fn findall<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = &'a Element> {
        self.children.iter().filter(move |c| c.name == tag)
    }

    pub fn require(&self, tag: &str) -> Result<&Element> {
        self.find(tag).ok_or_else(|| {
            MffError::format(format!("<{}> is missing a <{tag}> child", self.name))
        })
    }

    pub fn require_text(&self, tag: &str) -> Result<&str> {
        Ok(self.require(tag)?.text.as_str())
    }

    /// Text of child `tag` parsed as `T`.
    pub fn parse_text<T: FromStr>(&self, tag: &str) -> Result<T> {
        parse_value(self.require_text(tag)?)
    }
}

/// Parse a text payload into `T`, reporting `InvalidFormat` on failure.
pub fn parse_value<T: FromStr>(text: &str) -> Result<T> {
    text.parse().map_err(|_| {
        MffError::format(format!(
            "cannot parse '{text}' as {}",
            std::any::type_name::<T>()
        ))
    })
}

// ── Parsing ──────────────────────────────────────────────────────────────────

/// Parse a whole document; returns the root namespace URI and element tree.
pub fn parse_document<R: Read>(reader: R) -> Result<(String, Element)> {
    parse_buffered(BufReader::new(reader))
}

fn parse_buffered<R: BufRead>(reader: R) -> Result<(String, Element)> {
    let mut reader = NsReader::from_reader(reader);
    let mut buf = Vec::new();
    let mut stack: Vec<Element> = Vec::new();
    let mut namespace: Option<String> = None;
    let mut root: Option<Element> = None;

    loop {
        let (resolved, event) = reader
            .read_resolved_event_into(&mut buf)
            .map_err(|e| MffError::format(format!("malformed XML: {e}")))?;
        match event {
            Event::Start(ref e) => {
                if namespace.is_none() {
                    namespace = Some(resolved_namespace(&resolved));
                }
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                let mut element = Element::new(name);
                collect_attrs(e, &mut element)?;
                stack.push(element);
            }
            Event::Empty(ref e) => {
                if namespace.is_none() {
                    namespace = Some(resolved_namespace(&resolved));
                }
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                let mut element = Element::new(name);
                collect_attrs(e, &mut element)?;
                attach(&mut stack, &mut root, element);
            }
            Event::Text(ref t) => {
                let text = t
                    .unescape()
                    .map_err(|e| MffError::format(format!("malformed XML text: {e}")))?;
                let trimmed = text.trim();
                if !trimmed.is_empty() {
                    if let Some(top) = stack.last_mut() {
                        top.text.push_str(trimmed);
                    }
                }
            }
            Event::End(_) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| MffError::format("unbalanced XML end tag"))?;
                attach(&mut stack, &mut root, element);
            }
            Event::Eof => break,
            _ => {} // declaration, comments, processing instructions
        }
        buf.clear();
    }

    match root {
        Some(root) => Ok((namespace.unwrap_or_default(), root)),
        None => Err(MffError::format("document holds no root element")),
    }
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, element: Element) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None => {
            if root.is_none() {
                *root = Some(element);
            }
        }
    }
}

fn resolved_namespace(resolved: &ResolveResult) -> String {
    match resolved {
        ResolveResult::Bound(Namespace(ns)) => String::from_utf8_lossy(ns).into_owned(),
        _ => String::new(),
    }
}

fn collect_attrs(start: &quick_xml::events::BytesStart, element: &mut Element) -> Result<()> {
    for attr in start.attributes() {
        let attr = attr.map_err(|e| MffError::format(format!("malformed XML attribute: {e}")))?;
        // Namespace declarations and prefixed helper attributes carry no
        // document content.
        if attr.key.as_ref() == b"xmlns" || attr.key.prefix().is_some() {
            continue;
        }
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| MffError::format(format!("malformed XML attribute: {e}")))?
            .into_owned();
        element.attrs.push((key, value));
    }
    Ok(())
}

// ── Emission ─────────────────────────────────────────────────────────────────

/// Serialize a document with `namespace` as the default namespace.
pub fn write_document<W: Write>(mut w: W, namespace: &str, root: &Element) -> Result<()> {
    w.write_all(b"<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\" ?>")?;
    write_element(&mut w, root, Some(namespace))?;
    Ok(())
}

fn write_element<W: Write>(w: &mut W, el: &Element, namespace: Option<&str>) -> Result<()> {
    w.write_all(b"<")?;
    w.write_all(el.name.as_bytes())?;
    if let Some(ns) = namespace {
        write!(w, " xmlns=\"{}\" xmlns:xsi=\"{}\"", escape(ns), XSI_NAMESPACE)?;
    }
    for (key, value) in &el.attrs {
        write!(w, " {key}=\"{}\"", escape(value))?;
    }
    if el.text.is_empty() && el.children.is_empty() {
        w.write_all(b" />")?;
        return Ok(());
    }
    w.write_all(b">")?;
    if !el.text.is_empty() {
        w.write_all(escape(&el.text).as_bytes())?;
    }
    for child in &el.children {
        write_element(w, child, None)?;
    }
    write!(w, "</{}>", el.name)?;
    Ok(())
}

// ── Timestamps ───────────────────────────────────────────────────────────────

const TIME_FORMAT_READ: &str = "%Y-%m-%dT%H:%M:%S%.f%z";
const TIME_FORMAT_EMIT: &str = "%Y-%m-%dT%H:%M:%S%.6f%:z";

/// Parse a recording timestamp; the timezone colon is optional.
pub fn parse_timestamp(text: &str) -> Result<DateTime<FixedOffset>> {
    DateTime::parse_from_str(text, TIME_FORMAT_READ)
        .map_err(|e| MffError::format(format!("bad timestamp '{text}': {e}")))
}

/// Format a recording timestamp, microsecond precision, colonized timezone.
pub fn format_timestamp(timestamp: &DateTime<FixedOffset>) -> String {
    timestamp.format(TIME_FORMAT_EMIT).to_string()
}

// ── Document dispatch ────────────────────────────────────────────────────────

/// A parsed recording document, tagged by kind.
#[derive(Debug, Clone, PartialEq)]
pub enum XmlDocument {
    FileInfo(FileInfo),
    DataInfo(DataInfo),
    Subject(Subject),
    SensorLayout(SensorLayout),
    Coordinates(Coordinates),
    Epochs(Epochs),
    EventTrack(EventTrack),
    Categories(Categories),
    History(History),
    DipoleSet(DipoleSet),
}

impl XmlDocument {
    /// Parse any supported document, dispatching on namespace + root tag.
    pub fn from_stream<R: Read>(reader: R) -> Result<Self> {
        let (namespace, root) = parse_document(reader)?;
        match (namespace.as_str(), root.name.as_str()) {
            (file_info::NAMESPACE, file_info::ROOT_TAG) => {
                Ok(XmlDocument::FileInfo(FileInfo::parse(&root)?))
            }
            (data_info::NAMESPACE, data_info::ROOT_TAG) => {
                Ok(XmlDocument::DataInfo(DataInfo::parse(&root)?))
            }
            (subject::NAMESPACE, subject::ROOT_TAG) => {
                Ok(XmlDocument::Subject(Subject::parse(&root)?))
            }
            (sensor_layout::NAMESPACE, sensor_layout::ROOT_TAG) => {
                Ok(XmlDocument::SensorLayout(SensorLayout::parse(&root)?))
            }
            (coordinates::NAMESPACE, coordinates::ROOT_TAG) => {
                Ok(XmlDocument::Coordinates(Coordinates::parse(&root)?))
            }
            (epochs::NAMESPACE, epochs::ROOT_TAG) => {
                Ok(XmlDocument::Epochs(Epochs::parse(&root)?))
            }
            (event_track::NAMESPACE, event_track::ROOT_TAG) => {
                Ok(XmlDocument::EventTrack(EventTrack::parse(&root)?))
            }
            (categories::NAMESPACE, categories::ROOT_TAG) => {
                Ok(XmlDocument::Categories(Categories::parse(&root)?))
            }
            (history::NAMESPACE, history::ROOT_TAG) => {
                Ok(XmlDocument::History(History::parse(&root)?))
            }
            (dipole_set::NAMESPACE, dipole_set::ROOT_TAG) => {
                Ok(XmlDocument::DipoleSet(DipoleSet::parse(&root)?))
            }
            (ns, tag) => Err(MffError::format(format!(
                "unknown document kind: namespace '{ns}', root tag '{tag}'"
            ))),
        }
    }

    pub fn namespace(&self) -> &'static str {
        match self {
            XmlDocument::FileInfo(_) => file_info::NAMESPACE,
            XmlDocument::DataInfo(_) => data_info::NAMESPACE,
            XmlDocument::Subject(_) => subject::NAMESPACE,
            XmlDocument::SensorLayout(_) => sensor_layout::NAMESPACE,
            XmlDocument::Coordinates(_) => coordinates::NAMESPACE,
            XmlDocument::Epochs(_) => epochs::NAMESPACE,
            XmlDocument::EventTrack(_) => event_track::NAMESPACE,
            XmlDocument::Categories(_) => categories::NAMESPACE,
            XmlDocument::History(_) => history::NAMESPACE,
            XmlDocument::DipoleSet(_) => dipole_set::NAMESPACE,
        }
    }

    pub fn root_tag(&self) -> &'static str {
        match self {
            XmlDocument::FileInfo(_) => file_info::ROOT_TAG,
            XmlDocument::DataInfo(_) => data_info::ROOT_TAG,
            XmlDocument::Subject(_) => subject::ROOT_TAG,
            XmlDocument::SensorLayout(_) => sensor_layout::ROOT_TAG,
            XmlDocument::Coordinates(_) => coordinates::ROOT_TAG,
            XmlDocument::Epochs(_) => epochs::ROOT_TAG,
            XmlDocument::EventTrack(_) => event_track::ROOT_TAG,
            XmlDocument::Categories(_) => categories::ROOT_TAG,
            XmlDocument::History(_) => history::ROOT_TAG,
            XmlDocument::DipoleSet(_) => dipole_set::ROOT_TAG,
        }
    }

    pub fn default_filename(&self) -> &'static str {
        match self {
            XmlDocument::FileInfo(_) => file_info::DEFAULT_FILENAME,
            XmlDocument::DataInfo(_) => data_info::DEFAULT_FILENAME,
            XmlDocument::Subject(_) => subject::DEFAULT_FILENAME,
            XmlDocument::SensorLayout(_) => sensor_layout::DEFAULT_FILENAME,
            XmlDocument::Coordinates(_) => coordinates::DEFAULT_FILENAME,
            XmlDocument::Epochs(_) => epochs::DEFAULT_FILENAME,
            XmlDocument::EventTrack(_) => event_track::DEFAULT_FILENAME,
            XmlDocument::Categories(_) => categories::DEFAULT_FILENAME,
            XmlDocument::History(_) => history::DEFAULT_FILENAME,
            XmlDocument::DipoleSet(_) => dipole_set::DEFAULT_FILENAME,
        }
    }

    pub fn to_element(&self) -> Element {
        match self {
            XmlDocument::FileInfo(d) => d.to_element(),
            XmlDocument::DataInfo(d) => d.to_element(),
            XmlDocument::Subject(d) => d.to_element(),
            XmlDocument::SensorLayout(d) => d.to_element(),
            XmlDocument::Coordinates(d) => d.to_element(),
            XmlDocument::Epochs(d) => d.to_element(),
            XmlDocument::EventTrack(d) => d.to_element(),
            XmlDocument::Categories(d) => d.to_element(),
            XmlDocument::History(d) => d.to_element(),
            XmlDocument::DipoleSet(d) => d.to_element(),
        }
    }

    /// Serialize with the kind's namespace registered as default.
    pub fn write_to<W: Write>(&self, writer: W) -> Result<()> {
        write_document(writer, self.namespace(), &self.to_element())
    }

    /// Content reduced to basic types, for the JSON export surface.
    pub fn serializable(&self) -> serde_json::Value {
        match self {
            XmlDocument::FileInfo(d) => d.serializable(),
            XmlDocument::DataInfo(d) => d.serializable(),
            XmlDocument::Subject(d) => d.serializable(),
            XmlDocument::SensorLayout(d) => d.serializable(),
            XmlDocument::Coordinates(d) => d.serializable(),
            XmlDocument::Epochs(d) => d.serializable(),
            XmlDocument::EventTrack(d) => d.serializable(),
            XmlDocument::Categories(d) => d.serializable(),
            XmlDocument::History(d) => d.serializable(),
            XmlDocument::DipoleSet(d) => d.serializable(),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_namespace_and_tree() {
        let doc = br#"<?xml version="1.0"?>
            <root xmlns="http://example.org/ns" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">
              <a n="1">hello</a>
              <a n="2">world</a>
              <empty />
            </root>"#;
        let (ns, root) = parse_document(&doc[..]).unwrap();
        assert_eq!(ns, "http://example.org/ns");
        assert_eq!(root.name, "root");
        assert_eq!(root.children.len(), 3);
        assert_eq!(root.findall("a").count(), 2);
        assert_eq!(root.find("a").unwrap().text, "hello");
        assert_eq!(root.find("a").unwrap().get_attr("n"), Some("1"));
        assert!(root.find("empty").unwrap().children.is_empty());
    }

    #[test]
    fn emits_default_namespace_without_prefix() {
        let root = Element::new("root")
            .child(Element::with_text("value", "5 < 6"))
            .child(Element::new("empty"));
        let mut out = Vec::new();
        write_document(&mut out, "http://example.org/ns", &root).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("<?xml"));
        assert!(text.contains(r#"<root xmlns="http://example.org/ns""#));
        assert!(text.contains("<value>5 &lt; 6</value>"));
        assert!(text.contains("<empty />"));
        assert!(!text.contains("ns0:"));
    }

    #[test]
    fn round_trips_through_emission() {
        let root = Element::new("root")
            .child(Element::with_text("a", "x").attr("n", 1))
            .child(Element::new("nested").child(Element::with_text("b", 3.5)));
        let mut out = Vec::new();
        write_document(&mut out, "http://example.org/ns", &root).unwrap();
        let (ns, reparsed) = parse_document(&out[..]).unwrap();
        assert_eq!(ns, "http://example.org/ns");
        assert_eq!(reparsed, root);
    }

    #[test]
    fn timestamp_accepts_both_timezone_forms() {
        let with_colon = parse_timestamp("2003-04-17T13:35:22.000000-08:00").unwrap();
        let without = parse_timestamp("2003-04-17T13:35:22.000000-0800").unwrap();
        assert_eq!(with_colon, without);
        assert_eq!(
            format_timestamp(&with_colon),
            "2003-04-17T13:35:22.000000-08:00"
        );
    }

    #[test]
    fn naive_timestamp_is_rejected() {
        assert!(parse_timestamp("2003-04-17T13:35:22.000000").is_err());
    }

    #[test]
    fn timestamp_survives_round_trip() {
        let t = parse_timestamp("2019-10-25T12:09:57.639365-07:00").unwrap();
        assert_eq!(parse_timestamp(&format_timestamp(&t)).unwrap(), t);
    }
}
