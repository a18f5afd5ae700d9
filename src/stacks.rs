//! Side-by-side layout of lines that share the same geometry.
//!
//! Every group of features with identical geometry forms a stack. Members are
//! drawn as parallel copies of the shared line, nearest first by their order
//! attribute, each pushed out by the widths of the members before it.

use crate::error::{GeometryError, ProcessError, WidthCallbackError};
use crate::feature::{
    AttributeDescriptor, AttributeKind, AttributeValue, Feature, FeatureCollection,
    FeatureGeometry, FeatureSource,
};
use crate::hasher::FeatureHasher;
use crate::map_units::MapContext;
use crate::monitor::{ProcessMonitor, Stopwatch, check_cancelled};
use crate::offset_curve::OffsetCurveBuilder;
use ahash::AHashMap;
use log::{debug, info, warn};

/// Caller supplied width in pixels from `(line length in map units, aggregate count)`.
pub type WidthCallback = Box<dyn Fn(f64, i64) -> Result<i32, WidthCallbackError>>;

/// Where the pixel width of a stack member comes from.
pub enum WidthSource {
    /// The member's count, clamped to `min..=max`.
    Clamp { min: i32, max: i32 },
    Fixed(i32),
    Callback(WidthCallback),
}

impl WidthSource {
    fn width_pixels(&self, feature: &Feature, count: i64) -> Result<f64, ProcessError> {
        match self {
            WidthSource::Clamp { min, max } => {
                Ok(count.max(*min as i64).min(*max as i64) as f64)
            }
            WidthSource::Fixed(width) => Ok(*width as f64),
            WidthSource::Callback(callback) => {
                let length = feature
                    .geometry
                    .as_ref()
                    .map(FeatureGeometry::length)
                    .unwrap_or(0.0);
                callback(length, count)
                    .map(|width| width as f64)
                    .map_err(|source| ProcessError::WidthCallback {
                        feature: feature.id.clone(),
                        source,
                    })
            }
        }
    }
}

impl std::fmt::Debug for WidthSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WidthSource::Clamp { min, max } => write!(f, "Clamp({}..={})", min, max),
            WidthSource::Fixed(width) => write!(f, "Fixed({})", width),
            WidthSource::Callback(_) => f.write_str("Callback"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StackLayout {
    pub collection: FeatureCollection,
    pub stack_count: usize,
    pub skipped_features: usize,
}

#[derive(Debug, Clone)]
pub struct StackLayoutEngine {
    width_attribute: String,
    count_attribute: Option<String>,
    order_attribute: Option<String>,
    invert_sides_attribute: Option<String>,
    draw_on_both_sides: bool,
    spacing: i32,
    measure_durations: bool,
    curve_builder: OffsetCurveBuilder,
}

impl StackLayoutEngine {
    pub fn new(width_attribute: impl Into<String>) -> Self {
        Self {
            width_attribute: width_attribute.into(),
            count_attribute: None,
            order_attribute: None,
            invert_sides_attribute: None,
            draw_on_both_sides: true,
            spacing: 0,
            measure_durations: false,
            curve_builder: OffsetCurveBuilder::new(),
        }
    }

    /// Attribute holding the aggregate count handed to the width source; 1 when unset.
    pub fn count_attribute(mut self, name: Option<String>) -> Self {
        self.count_attribute = non_empty(name);
        self
    }

    pub fn order_attribute(mut self, name: Option<String>) -> Self {
        self.order_attribute = non_empty(name);
        self
    }

    pub fn invert_sides_attribute(mut self, name: Option<String>) -> Self {
        self.invert_sides_attribute = non_empty(name);
        self
    }

    pub fn draw_on_both_sides(mut self, enabled: bool) -> Self {
        self.draw_on_both_sides = enabled;
        self
    }

    /// Pixels between stack members, and between the line and the first member.
    pub fn spacing(mut self, pixels: i32) -> Self {
        self.spacing = pixels;
        self
    }

    pub fn with_duration_measurement(mut self, enabled: bool) -> Self {
        self.measure_durations = enabled;
        self
    }

    pub fn layout<S: FeatureSource>(
        &self,
        source: S,
        context: &MapContext,
        widths: &WidthSource,
        monitor: &mut dyn ProcessMonitor,
    ) -> Result<StackLayout, ProcessError> {
        let schema = source.schema().clone().with_attribute(AttributeDescriptor::new(
            self.width_attribute.clone(),
            AttributeKind::Float,
        ));

        let (stacks, mut skipped_features) = self.collect_stacks(source, &*monitor)?;
        let stack_count = stacks.len();
        let mut offset_time = Stopwatch::new(self.measure_durations);
        let mut features = Vec::new();

        for (done, mut stack) in stacks.into_iter().enumerate() {
            // stable, so equal orders keep their input order
            stack.sort_by_key(|f| f.int_attribute_or(self.order_attribute.as_deref(), 0));

            // running pixel offsets of the regular and the inverted side
            let mut side_offsets = [self.spacing as f64; 2];

            for feature in stack {
                check_cancelled(&*monitor)?;

                let inverted =
                    feature.bool_attribute_or(self.invert_sides_attribute.as_deref(), false);
                let side = if inverted { -1.0 } else { 1.0 };
                let count = feature.int_attribute_or(self.count_attribute.as_deref(), 1);
                let width = widths.width_pixels(&feature, count)?;

                let running = &mut side_offsets[inverted as usize];
                let base_offset = context.pixels_to_map_units(*running);
                let width_in_map_units = context.pixels_to_map_units(width);

                let drawn = offset_time.measure(|| {
                    self.draw(&feature, side, base_offset, width_in_map_units, width)
                });
                match drawn {
                    Ok(lines) => {
                        features.extend(lines);
                        let used = if self.draw_on_both_sides {
                            width / 2.0
                        } else {
                            width
                        };
                        *running += used + self.spacing as f64;
                    }
                    Err(e) => {
                        warn!("Skipping feature {} in line stack: {}", feature.id, e);
                        skipped_features += 1;
                    }
                }
            }

            monitor.progress((done + 1) as f32 / stack_count as f32);
        }

        if offset_time.is_enabled() {
            info!(
                "Spent {} seconds on building offset lines for {} stacks",
                offset_time.seconds(),
                stack_count
            );
        }
        info!(
            "Laid out {} stacks as {} lines, skipped {} features",
            stack_count,
            features.len(),
            skipped_features
        );

        Ok(StackLayout {
            collection: FeatureCollection::new(schema, features),
            stack_count,
            skipped_features,
        })
    }

    /// Groups line features by geometry, stacks in first-seen order. Features
    /// without a line are skipped and counted.
    fn collect_stacks<S: FeatureSource>(
        &self,
        source: S,
        monitor: &dyn ProcessMonitor,
    ) -> Result<(Vec<Vec<Feature>>, usize), ProcessError> {
        let hasher = FeatureHasher::geometry_only();
        let mut hash_time = Stopwatch::new(self.measure_durations);
        let mut index: AHashMap<u32, usize> = AHashMap::new();
        let mut stacks: Vec<Vec<Feature>> = Vec::new();
        let mut skipped = 0;

        for feature in source {
            check_cancelled(monitor)?;
            if feature.geometry.as_ref().and_then(FeatureGeometry::as_line).is_none() {
                warn!("Skipping feature {} in line stack: no line geometry", feature.id);
                skipped += 1;
                continue;
            }

            let key = hash_time.measure(|| hasher.hash(&feature));
            let slot = *index.entry(key).or_insert_with(|| {
                stacks.push(Vec::new());
                stacks.len() - 1
            });
            stacks[slot].push(feature);
        }

        if hash_time.is_enabled() {
            info!(
                "Spent {} seconds on hashing geometries to build line stacks",
                hash_time.seconds()
            );
        }
        Ok((stacks, skipped))
    }

    /// All output lines for one member, or nothing if any of them fails.
    fn draw(
        &self,
        feature: &Feature,
        side: f64,
        base_offset: f64,
        width_in_map_units: f64,
        width_in_pixels: f64,
    ) -> Result<Vec<Feature>, GeometryError> {
        let line = feature
            .geometry
            .as_ref()
            .and_then(FeatureGeometry::as_line)
            .ok_or(GeometryError::DegenerateGeometry { points: 0 })?;

        let placements = if self.draw_on_both_sides {
            // half the width on each side, drawn around the middle of that half
            let offset = base_offset + width_in_map_units / 4.0;
            vec![
                (offset * side, width_in_pixels / 2.0),
                (-offset * side, width_in_pixels / 2.0),
            ]
        } else {
            let offset = base_offset + width_in_map_units / 2.0;
            vec![(offset * side, width_in_pixels)]
        };

        placements
            .into_iter()
            .enumerate()
            .map(|(n, (offset, width))| {
                debug!(
                    "Stacking feature {} at offset {} with width {}px",
                    feature.id, offset, width
                );
                let offset_line = self.curve_builder.build_offset_line(line, offset)?;
                let mut attributes = feature.attributes.clone();
                attributes.insert(self.width_attribute.clone(), AttributeValue::Float(width));
                Ok(Feature::new(
                    format!("{}.{}", feature.id, n),
                    Some(offset_line.into()),
                    attributes,
                ))
            })
            .collect()
    }
}

fn non_empty(name: Option<String>) -> Option<String> {
    name.filter(|n| !n.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::{GeometryType, Schema};
    use crate::monitor::NoopMonitor;
    use geo_types::{LineString, line_string};
    use std::collections::BTreeMap;

    // 100 map units over 100 pixels, one unit per pixel
    fn context() -> MapContext {
        MapContext::from_bounds(0.0, 0.0, 100.0, 100.0, 100, 100).unwrap()
    }

    fn schema() -> Schema {
        Schema::new(
            GeometryType::LineString,
            vec![
                AttributeDescriptor::new("agg_count", AttributeKind::Int),
                AttributeDescriptor::new("order", AttributeKind::Int),
                AttributeDescriptor::new("invert", AttributeKind::Bool),
            ],
        )
    }

    fn member(id: &str, line: LineString<f64>, count: i64, order: i64, invert: bool) -> Feature {
        let mut attributes = BTreeMap::new();
        attributes.insert("agg_count".to_string(), AttributeValue::Int(count));
        attributes.insert("order".to_string(), AttributeValue::Int(order));
        attributes.insert("invert".to_string(), AttributeValue::Bool(invert));
        Feature::new(id, Some(line.into()), attributes)
    }

    fn base_line() -> LineString<f64> {
        line_string![(x: 0.0, y: 0.0), (x: 10.0, y: 0.0)]
    }

    fn engine() -> StackLayoutEngine {
        StackLayoutEngine::new("line_width")
            .count_attribute(Some("agg_count".to_string()))
            .order_attribute(Some("order".to_string()))
            .invert_sides_attribute(Some("invert".to_string()))
    }

    fn y_of(feature: &Feature) -> f64 {
        feature.geometry.as_ref().and_then(FeatureGeometry::as_line).unwrap().0[0].y
    }

    fn width_of(feature: &Feature) -> f64 {
        feature.attribute("line_width").and_then(AttributeValue::as_f64).unwrap()
    }

    #[test]
    fn test_three_aggregates_on_both_sides() {
        let input = FeatureCollection::new(
            schema(),
            vec![
                member("a", base_line(), 1, 0, false),
                member("b", base_line(), 5, 0, false),
                member("c", base_line(), 12, 0, false),
            ],
        );
        let layout = engine()
            .layout(
                input.into_source(),
                &context(),
                &WidthSource::Clamp { min: 8, max: 80 },
                &mut NoopMonitor,
            )
            .unwrap();

        let lines = &layout.collection.features;
        assert_eq!(layout.stack_count, 1);
        assert_eq!(lines.len(), 6);

        let ys: Vec<f64> = lines.iter().map(y_of).collect();
        let expected = [2.0, -2.0, 6.0, -6.0, 11.0, -11.0];
        for (y, e) in ys.iter().zip(expected) {
            assert!((y - e).abs() < 1e-9, "{y} != {e}");
        }

        let widths: Vec<f64> = lines.iter().map(width_of).collect();
        assert_eq!(widths, vec![4.0, 4.0, 4.0, 4.0, 6.0, 6.0]);

        // source attributes are carried over
        assert_eq!(lines[4].attribute("agg_count"), Some(&AttributeValue::Int(12)));
        assert!(layout.collection.schema.has_attribute("line_width"));
    }

    #[test]
    fn test_lower_order_is_drawn_closer() {
        let input = FeatureCollection::new(
            schema(),
            vec![
                member("far", base_line(), 1, 5, false),
                member("near", base_line(), 1, 1, false),
            ],
        );
        let layout = engine()
            .draw_on_both_sides(false)
            .layout(input.into_source(), &context(), &WidthSource::Fixed(2), &mut NoopMonitor)
            .unwrap();

        let lines = &layout.collection.features;
        assert_eq!(lines[0].id, "near.0");
        assert!((y_of(&lines[0]) - 1.0).abs() < 1e-9);
        assert_eq!(lines[1].id, "far.0");
        assert!((y_of(&lines[1]) - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_inverted_members_use_their_own_side() {
        let input = FeatureCollection::new(
            schema(),
            vec![
                member("regular", base_line(), 1, 0, false),
                member("inverted", base_line(), 1, 0, true),
            ],
        );
        let layout = engine()
            .draw_on_both_sides(false)
            .spacing(1)
            .layout(input.into_source(), &context(), &WidthSource::Fixed(2), &mut NoopMonitor)
            .unwrap();

        let lines = &layout.collection.features;
        assert!((y_of(&lines[0]) - 2.0).abs() < 1e-9);
        assert!((y_of(&lines[1]) + 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_stacks_are_independent() {
        let other = line_string![(x: 0.0, y: 50.0), (x: 10.0, y: 50.0)];
        let input = FeatureCollection::new(
            schema(),
            vec![
                member("a", base_line(), 1, 0, false),
                member("b", other, 1, 0, false),
            ],
        );
        let layout = engine()
            .draw_on_both_sides(false)
            .layout(input.into_source(), &context(), &WidthSource::Fixed(2), &mut NoopMonitor)
            .unwrap();

        assert_eq!(layout.stack_count, 2);
        let lines = &layout.collection.features;
        assert!((y_of(&lines[0]) - 1.0).abs() < 1e-9);
        assert!((y_of(&lines[1]) - 51.0).abs() < 1e-9);
    }

    #[test]
    fn test_degenerate_member_is_skipped() {
        let point_like = line_string![(x: 3.0, y: 3.0)];
        let input = FeatureCollection::new(
            schema(),
            vec![
                member("broken", point_like, 1, 0, false),
                member("fine", base_line(), 1, 0, false),
            ],
        );
        let layout = engine()
            .layout(input.into_source(), &context(), &WidthSource::Fixed(8), &mut NoopMonitor)
            .unwrap();

        assert_eq!(layout.skipped_features, 1);
        assert_eq!(layout.collection.len(), 2);
        assert!(layout.collection.features.iter().all(|f| f.id.starts_with("fine")));
    }

    #[test]
    fn test_callback_gets_length_and_count() {
        let input = FeatureCollection::new(schema(), vec![member("a", base_line(), 7, 0, false)]);
        let widths = WidthSource::Callback(Box::new(|length: f64, count: i64| {
            assert!((length - 10.0).abs() < 1e-12);
            assert_eq!(count, 7);
            Ok(6)
        }));
        let layout = engine()
            .draw_on_both_sides(false)
            .layout(input.into_source(), &context(), &widths, &mut NoopMonitor)
            .unwrap();
        assert_eq!(width_of(&layout.collection.features[0]), 6.0);
    }

    #[test]
    fn test_callback_failure_is_fatal() {
        let input = FeatureCollection::new(schema(), vec![member("a", base_line(), 7, 0, false)]);
        let widths = WidthSource::Callback(Box::new(|_: f64, _: i64| -> Result<i32, WidthCallbackError> {
            Err("no width for you".into())
        }));
        let result = engine().layout(input.into_source(), &context(), &widths, &mut NoopMonitor);
        assert!(matches!(
            result,
            Err(ProcessError::WidthCallback { ref feature, .. }) if feature == "a"
        ));
    }
}
