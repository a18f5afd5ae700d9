use crate::error::ProcessError;
use crate::width_scaling::WidthScalingPolicy;
use itertools::Itertools;
use serde::{Deserialize, Deserializer, Serialize};

pub const COUNT_ATTRIBUTE: &str = "agg_count";
pub const POLYGON_WIDTH_ATTRIBUTE: &str = "polygon_width";
pub const LINE_WIDTH_ATTRIBUTE: &str = "line_width";

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct AggregateConfig {
    #[serde(deserialize_with = "attribute_list")]
    pub attributes: Vec<String>,
    pub count_attribute: String,
    pub enable_duration_measurement: bool,
}

impl Default for AggregateConfig {
    fn default() -> Self {
        Self {
            attributes: Vec::new(),
            count_attribute: COUNT_ATTRIBUTE.to_string(),
            enable_duration_measurement: false,
        }
    }
}

impl AggregateConfig {
    pub fn validate(&self) -> Result<(), ProcessError> {
        if self.count_attribute.trim().is_empty() {
            return Err(ProcessError::configuration(
                "count_attribute must not be empty",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct PolygonConfig {
    #[serde(deserialize_with = "attribute_list")]
    pub attributes: Vec<String>,
    /// Integer attribute with the offset in pixels. Polygons are centered on
    /// their line when this is unset.
    pub offset_attribute: Option<String>,
    pub width_scaling: WidthScalingPolicy,
    /// Width in pixels of the polygon with the highest count.
    pub max_polygon_width: i32,
    /// Count that reaches the maximum width; 0 uses the largest aggregate.
    pub max_polygon_width_feature_count: i64,
    pub enable_artifact_removal: bool,
    pub abort_on_offset_failure: bool,
    pub enable_duration_measurement: bool,
}

impl Default for PolygonConfig {
    fn default() -> Self {
        Self {
            attributes: Vec::new(),
            offset_attribute: None,
            width_scaling: WidthScalingPolicy::Linear,
            max_polygon_width: 20,
            max_polygon_width_feature_count: 0,
            enable_artifact_removal: false,
            abort_on_offset_failure: false,
            enable_duration_measurement: false,
        }
    }
}

impl PolygonConfig {
    pub fn validate(&self) -> Result<(), ProcessError> {
        at_least("max_polygon_width", self.max_polygon_width as i64, 1)?;
        at_least(
            "max_polygon_width_feature_count",
            self.max_polygon_width_feature_count,
            0,
        )
    }

    pub fn center_on_line(&self) -> bool {
        self.offset_attribute
            .as_deref()
            .is_none_or(|name| name.trim().is_empty())
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct AggregateStacksConfig {
    #[serde(deserialize_with = "attribute_list")]
    pub attributes: Vec<String>,
    pub order_attribute: Option<String>,
    pub invert_sides_attribute: Option<String>,
    pub min_line_width: i32,
    pub max_line_width: i32,
    pub draw_on_both_sides: bool,
    pub spacing_between_stack_entries: i32,
    pub enable_duration_measurement: bool,
}

impl Default for AggregateStacksConfig {
    fn default() -> Self {
        Self {
            attributes: Vec::new(),
            order_attribute: None,
            invert_sides_attribute: None,
            min_line_width: 8,
            max_line_width: 80,
            draw_on_both_sides: true,
            spacing_between_stack_entries: 0,
            enable_duration_measurement: false,
        }
    }
}

impl AggregateStacksConfig {
    pub fn validate(&self) -> Result<(), ProcessError> {
        at_least("min_line_width", self.min_line_width as i64, 1)?;
        at_least("max_line_width", self.max_line_width as i64, 1)?;
        at_least(
            "spacing_between_stack_entries",
            self.spacing_between_stack_entries as i64,
            0,
        )
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct LineStacksConfig {
    pub order_attribute: Option<String>,
    pub invert_sides_attribute: Option<String>,
    pub line_width: i32,
    pub draw_on_both_sides: bool,
    pub spacing_between_stack_entries: i32,
    pub enable_duration_measurement: bool,
}

impl Default for LineStacksConfig {
    fn default() -> Self {
        Self {
            order_attribute: None,
            invert_sides_attribute: None,
            line_width: 8,
            draw_on_both_sides: true,
            spacing_between_stack_entries: 0,
            enable_duration_measurement: false,
        }
    }
}

impl LineStacksConfig {
    pub fn validate(&self) -> Result<(), ProcessError> {
        at_least("line_width", self.line_width as i64, 1)?;
        at_least(
            "spacing_between_stack_entries",
            self.spacing_between_stack_entries as i64,
            0,
        )
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
#[serde(default)]
pub struct OffsetLinesConfig {
    pub offset_in_pixels: f64,
    pub enable_duration_measurement: bool,
}

impl OffsetLinesConfig {
    pub fn validate(&self) -> Result<(), ProcessError> {
        if !self.offset_in_pixels.is_finite() {
            return Err(ProcessError::configuration(format!(
                "offset_in_pixels has to be a finite number, but currently is {}",
                self.offset_in_pixels
            )));
        }
        Ok(())
    }
}

fn at_least(name: &str, value: i64, minimum: i64) -> Result<(), ProcessError> {
    if value < minimum {
        return Err(ProcessError::configuration(format!(
            "{} has to be at least {}, but currently is {}",
            name, minimum, value
        )));
    }
    Ok(())
}

/// Splits a comma-separated attribute list. Entries are trimmed, empty ones
/// dropped and repeated ones kept only at their first position.
pub fn split_attribute_list(list: &str) -> Vec<String> {
    dedup_names(list.split(','))
}

fn dedup_names<'a>(names: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    names
        .into_iter()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .unique()
        .map(str::to_string)
        .collect()
}

/// Accepts `"a, b"` as well as `["a", "b"]`.
fn attribute_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Names {
        Joined(String),
        List(Vec<String>),
    }

    Ok(match Names::deserialize(deserializer)? {
        Names::Joined(list) => split_attribute_list(&list),
        Names::List(names) => dedup_names(names.iter().map(String::as_str)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_attribute_list() {
        assert_eq!(
            split_attribute_list(" class, name,,class ,  "),
            vec!["class".to_string(), "name".to_string()]
        );
        assert!(split_attribute_list("").is_empty());
    }

    #[test]
    fn test_defaults() {
        let stacks = AggregateStacksConfig::default();
        assert_eq!(stacks.min_line_width, 8);
        assert_eq!(stacks.max_line_width, 80);
        assert!(stacks.draw_on_both_sides);
        assert!(stacks.validate().is_ok());

        let polygons = PolygonConfig::default();
        assert_eq!(polygons.max_polygon_width, 20);
        assert!(polygons.center_on_line());
        assert!(polygons.validate().is_ok());

        assert_eq!(AggregateConfig::default().count_attribute, "agg_count");
        assert_eq!(LineStacksConfig::default().line_width, 8);
    }

    #[test]
    fn test_json_with_partial_fields() {
        let config: PolygonConfig = serde_json::from_str(
            r#"{"attributes": "class, name", "width_scaling": "log", "offset_attribute": "shift"}"#,
        )
        .unwrap();
        assert_eq!(config.attributes, vec!["class", "name"]);
        assert_eq!(config.width_scaling, WidthScalingPolicy::Logarithmic);
        assert!(!config.center_on_line());
        assert_eq!(config.max_polygon_width, 20);

        let config: AggregateConfig =
            serde_json::from_str(r#"{"attributes": ["a", " b", "a"]}"#).unwrap();
        assert_eq!(config.attributes, vec!["a", "b"]);
    }

    #[test]
    fn test_blank_offset_attribute_centers() {
        let config = PolygonConfig {
            offset_attribute: Some("  ".to_string()),
            ..Default::default()
        };
        assert!(config.center_on_line());
    }

    #[test]
    fn test_validation() {
        let stacks = AggregateStacksConfig {
            min_line_width: 0,
            ..Default::default()
        };
        assert!(matches!(stacks.validate(), Err(ProcessError::Configuration(_))));

        let stacks = AggregateStacksConfig {
            spacing_between_stack_entries: -1,
            ..Default::default()
        };
        assert!(stacks.validate().is_err());

        let polygons = PolygonConfig {
            max_polygon_width_feature_count: -3,
            ..Default::default()
        };
        assert!(polygons.validate().is_err());

        let aggregate = AggregateConfig {
            count_attribute: " ".to_string(),
            ..Default::default()
        };
        assert!(aggregate.validate().is_err());

        let offsets = OffsetLinesConfig {
            offset_in_pixels: f64::NAN,
            ..Default::default()
        };
        assert!(offsets.validate().is_err());
    }
}
