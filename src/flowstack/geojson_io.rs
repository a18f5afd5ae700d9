use anyhow::{Context, bail};
use flowstack::{
    AttributeDescriptor, AttributeKind, AttributeValue, Feature, FeatureCollection,
    FeatureGeometry, FeatureSource, GeometryType, Schema,
};
use geojson::{GeoJson, JsonObject, JsonValue};
use log::{debug, warn};
use std::collections::BTreeMap;
use std::path::Path;

/// Lazily converts parsed GeoJSON features. Features whose geometry does not
/// match the collection's geometry type are skipped with a warning.
pub struct GeoJsonSource {
    schema: Schema,
    features: std::vec::IntoIter<geojson::Feature>,
    position: usize,
}

impl GeoJsonSource {
    pub fn read(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("Failed to parse {}", path.display()))
    }

    pub fn parse(text: &str) -> anyhow::Result<Self> {
        let features = match text.parse::<GeoJson>()? {
            GeoJson::FeatureCollection(collection) => collection.features,
            GeoJson::Feature(feature) => vec![feature],
            GeoJson::Geometry(_) => bail!("expected a Feature or FeatureCollection, found a bare geometry"),
        };
        let schema = infer_schema(&features);
        debug!(
            "Read {} features of type {} with {} attributes",
            features.len(),
            schema.geometry_type,
            schema.attributes.len()
        );
        Ok(Self {
            schema,
            features: features.into_iter(),
            position: 0,
        })
    }
}

impl Iterator for GeoJsonSource {
    type Item = Feature;

    fn next(&mut self) -> Option<Feature> {
        for raw in self.features.by_ref() {
            self.position += 1;
            let id = feature_id(&raw, self.position);

            let geometry = match raw.geometry.map(|g| convert_geometry(g.value)) {
                Some(Some(geometry)) if geometry.geometry_type() == self.schema.geometry_type => {
                    Some(geometry)
                }
                Some(_) => {
                    warn!(
                        "Skipping feature {}: geometry is not a {}",
                        id, self.schema.geometry_type
                    );
                    continue;
                }
                None => None,
            };

            let attributes = raw
                .properties
                .map(convert_properties)
                .unwrap_or_default();
            return Some(Feature::new(id, geometry, attributes));
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, self.features.size_hint().1)
    }
}

impl FeatureSource for GeoJsonSource {
    fn schema(&self) -> &Schema {
        &self.schema
    }
}

pub fn write(collection: &FeatureCollection, output: Option<&Path>) -> anyhow::Result<()> {
    let features = collection
        .features
        .iter()
        .map(to_geojson_feature)
        .collect::<anyhow::Result<Vec<geojson::Feature>>>()?;

    let serialized = GeoJson::from(geojson::FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    })
    .to_string();

    match output {
        Some(path) => std::fs::write(path, serialized)
            .with_context(|| format!("Failed to write {}", path.display())),
        None => {
            println!("{}", serialized);
            Ok(())
        }
    }
}

fn to_geojson_feature(feature: &Feature) -> anyhow::Result<geojson::Feature> {
    let geometry = feature.geometry.as_ref().map(|geometry| {
        let value = match geometry {
            FeatureGeometry::Line(line) => geojson::Value::from(line),
            FeatureGeometry::Polygon(polygon) => geojson::Value::from(polygon),
        };
        geojson::Geometry::new(value)
    });

    let mut properties = JsonObject::new();
    for (name, value) in &feature.attributes {
        properties.insert(name.clone(), serde_json::to_value(value)?);
    }

    Ok(geojson::Feature {
        bbox: None,
        geometry,
        id: Some(geojson::feature::Id::String(feature.id.clone())),
        properties: Some(properties),
        foreign_members: None,
    })
}

/// Geometry type of the first convertible geometry, attribute kinds from the
/// first non-null value of each property.
fn infer_schema(features: &[geojson::Feature]) -> Schema {
    let geometry_type = features
        .iter()
        .filter_map(|f| f.geometry.as_ref())
        .find_map(|g| convert_geometry(g.value.clone()))
        .map(|g| g.geometry_type())
        .unwrap_or(GeometryType::LineString);

    let mut attributes: Vec<AttributeDescriptor> = Vec::new();
    for properties in features.iter().filter_map(|f| f.properties.as_ref()) {
        for (name, value) in properties {
            if attributes.iter().any(|d| &d.name == name) {
                continue;
            }
            if let Some(value) = convert_value(value) {
                attributes.push(AttributeDescriptor::new(name.clone(), value.kind()));
            }
        }
    }
    Schema::new(geometry_type, attributes)
}

fn convert_geometry(value: geojson::Value) -> Option<FeatureGeometry> {
    match geo_types::Geometry::<f64>::try_from(value).ok()? {
        geo_types::Geometry::LineString(line) => Some(line.into()),
        geo_types::Geometry::Polygon(polygon) => Some(polygon.into()),
        // single part multi lines turn up in exports of simple line tables
        geo_types::Geometry::MultiLineString(mut lines) if lines.0.len() == 1 => {
            lines.0.pop().map(Into::into)
        }
        _ => None,
    }
}

fn convert_properties(properties: JsonObject) -> BTreeMap<String, AttributeValue> {
    properties
        .into_iter()
        .filter_map(|(name, value)| convert_value(&value).map(|v| (name, v)))
        .collect()
}

fn convert_value(value: &JsonValue) -> Option<AttributeValue> {
    match value {
        JsonValue::Null => None,
        JsonValue::Bool(b) => Some(AttributeValue::Bool(*b)),
        JsonValue::Number(n) => match n.as_i64() {
            Some(i) => Some(AttributeValue::Int(i)),
            None => n.as_f64().map(AttributeValue::Float),
        },
        JsonValue::String(s) => Some(AttributeValue::String(s.clone())),
        other => Some(AttributeValue::String(other.to_string())),
    }
}

fn feature_id(feature: &geojson::Feature, position: usize) -> String {
    match &feature.id {
        Some(geojson::feature::Id::String(id)) => id.clone(),
        Some(geojson::feature::Id::Number(id)) => id.to_string(),
        None => format!("feature.{}", position),
    }
}

/// Kind names for log output.
pub fn kind_name(kind: AttributeKind) -> &'static str {
    match kind {
        AttributeKind::Bool => "bool",
        AttributeKind::Int => "int",
        AttributeKind::Float => "float",
        AttributeKind::String => "string",
    }
}
