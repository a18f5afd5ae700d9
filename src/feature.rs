//! Feature records, their schema, and the one-shot sources they are read from.

use geo::{Euclidean, Length};
use geo_types::{Geometry, LineString, Polygon};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl AttributeValue {
    /// Integer view of the value. Strings are parsed, floats are only accepted
    /// when they carry no fractional part.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            AttributeValue::Int(i) => Some(*i),
            AttributeValue::Float(f) if f.fract() == 0.0 && f.is_finite() => Some(*f as i64),
            AttributeValue::Float(_) => None,
            AttributeValue::Bool(_) => None,
            AttributeValue::String(s) => s.trim().parse().ok(),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttributeValue::Int(i) => Some(*i as f64),
            AttributeValue::Float(f) => Some(*f),
            AttributeValue::Bool(_) => None,
            AttributeValue::String(s) => s.trim().parse().ok(),
        }
    }

    /// `true`, `1`, `t` and `T` are truthy, everything else is not.
    pub fn as_bool(&self) -> bool {
        match self {
            AttributeValue::Bool(b) => *b,
            other => {
                let s = other.to_string();
                s.eq_ignore_ascii_case("true") || s == "1" || s == "t" || s == "T"
            }
        }
    }

    pub fn kind(&self) -> AttributeKind {
        match self {
            AttributeValue::Bool(_) => AttributeKind::Bool,
            AttributeValue::Int(_) => AttributeKind::Int,
            AttributeValue::Float(_) => AttributeKind::Float,
            AttributeValue::String(_) => AttributeKind::String,
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Bool(b) => write!(f, "{}", b),
            AttributeValue::Int(i) => write!(f, "{}", i),
            AttributeValue::Float(v) => write!(f, "{}", v),
            AttributeValue::String(s) => f.write_str(s),
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::String(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::String(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        AttributeValue::Int(value)
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        AttributeValue::Float(value)
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        AttributeValue::Bool(value)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttributeKind {
    Bool,
    Int,
    Float,
    String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GeometryType {
    LineString,
    Polygon,
}

impl fmt::Display for GeometryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GeometryType::LineString => f.write_str("LineString"),
            GeometryType::Polygon => f.write_str("Polygon"),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum FeatureGeometry {
    Line(LineString<f64>),
    Polygon(Polygon<f64>),
}

impl FeatureGeometry {
    pub fn geometry_type(&self) -> GeometryType {
        match self {
            FeatureGeometry::Line(_) => GeometryType::LineString,
            FeatureGeometry::Polygon(_) => GeometryType::Polygon,
        }
    }

    pub fn as_line(&self) -> Option<&LineString<f64>> {
        match self {
            FeatureGeometry::Line(line) => Some(line),
            FeatureGeometry::Polygon(_) => None,
        }
    }

    /// Euclidean length in map units; the exterior perimeter for polygons.
    pub fn length(&self) -> f64 {
        match self {
            FeatureGeometry::Line(line) => Euclidean.length(line),
            FeatureGeometry::Polygon(polygon) => Euclidean.length(polygon.exterior()),
        }
    }

    pub fn to_geo(&self) -> Geometry<f64> {
        match self {
            FeatureGeometry::Line(line) => Geometry::LineString(line.clone()),
            FeatureGeometry::Polygon(polygon) => Geometry::Polygon(polygon.clone()),
        }
    }
}

impl From<LineString<f64>> for FeatureGeometry {
    fn from(line: LineString<f64>) -> Self {
        FeatureGeometry::Line(line)
    }
}

impl From<Polygon<f64>> for FeatureGeometry {
    fn from(polygon: Polygon<f64>) -> Self {
        FeatureGeometry::Polygon(polygon)
    }
}

/// A geometry plus named attributes. Output features are always built whole
/// from a finished attribute map.
#[derive(Clone, Debug, PartialEq)]
pub struct Feature {
    pub id: String,
    pub geometry: Option<FeatureGeometry>,
    pub attributes: BTreeMap<String, AttributeValue>,
}

impl Feature {
    pub fn new(
        id: impl Into<String>,
        geometry: Option<FeatureGeometry>,
        attributes: BTreeMap<String, AttributeValue>,
    ) -> Self {
        Self {
            id: id.into(),
            geometry,
            attributes,
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(name)
    }

    /// Integer attribute, `default` when the name is empty, the value is absent
    /// or it does not parse.
    pub fn int_attribute_or(&self, name: Option<&str>, default: i64) -> i64 {
        match name {
            Some(name) if !name.is_empty() => self
                .attribute(name)
                .and_then(AttributeValue::as_i64)
                .unwrap_or(default),
            _ => default,
        }
    }

    pub fn bool_attribute_or(&self, name: Option<&str>, default: bool) -> bool {
        match name {
            Some(name) if !name.is_empty() => {
                self.attribute(name).is_some_and(AttributeValue::as_bool)
            }
            _ => default,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeDescriptor {
    pub name: String,
    pub kind: AttributeKind,
}

impl AttributeDescriptor {
    pub fn new(name: impl Into<String>, kind: AttributeKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Schema {
    pub geometry_type: GeometryType,
    pub attributes: Vec<AttributeDescriptor>,
}

impl Schema {
    pub fn new(geometry_type: GeometryType, attributes: Vec<AttributeDescriptor>) -> Self {
        Self {
            geometry_type,
            attributes,
        }
    }

    pub fn descriptor(&self, name: &str) -> Option<&AttributeDescriptor> {
        self.attributes.iter().find(|d| d.name == name)
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.descriptor(name).is_some()
    }

    /// Same attributes, different geometry binding.
    pub fn with_geometry_type(&self, geometry_type: GeometryType) -> Self {
        Self {
            geometry_type,
            attributes: self.attributes.clone(),
        }
    }

    /// Appends an attribute, replacing an existing descriptor of the same name.
    pub fn with_attribute(mut self, descriptor: AttributeDescriptor) -> Self {
        self.attributes.retain(|d| d.name != descriptor.name);
        self.attributes.push(descriptor);
        self
    }
}

/// A one-shot, forward-only stream of features with a known schema.
///
/// Sources release whatever they hold (cursors, file handles) when dropped.
/// Every consumer in this crate takes the source by value, so that happens on
/// all exit paths.
pub trait FeatureSource: Iterator<Item = Feature> {
    fn schema(&self) -> &Schema;
}

/// In-memory features with their schema. Serves as both source and result.
#[derive(Clone, Debug, PartialEq)]
pub struct FeatureCollection {
    pub schema: Schema,
    pub features: Vec<Feature>,
}

impl FeatureCollection {
    pub fn new(schema: Schema, features: Vec<Feature>) -> Self {
        Self { schema, features }
    }

    pub fn empty(schema: Schema) -> Self {
        Self {
            schema,
            features: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn into_source(self) -> CollectionSource {
        CollectionSource {
            schema: self.schema,
            features: self.features.into_iter(),
        }
    }
}

pub struct CollectionSource {
    schema: Schema,
    features: std::vec::IntoIter<Feature>,
}

impl Iterator for CollectionSource {
    type Item = Feature;

    fn next(&mut self) -> Option<Feature> {
        self.features.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.features.size_hint()
    }
}

impl FeatureSource for CollectionSource {
    fn schema(&self) -> &Schema {
        &self.schema
    }
}
