//! The end-to-end operations: each takes a feature source plus its
//! configuration and returns the finished output collection.

use crate::aggregator::{Aggregation, FeatureAggregator};
use crate::config::{
    AggregateConfig, AggregateStacksConfig, COUNT_ATTRIBUTE, LINE_WIDTH_ATTRIBUTE,
    LineStacksConfig, OffsetLinesConfig, POLYGON_WIDTH_ATTRIBUTE, PolygonConfig,
};
use crate::error::{GeometryError, ProcessError};
use crate::feature::{
    AttributeDescriptor, AttributeKind, AttributeValue, Feature, FeatureCollection,
    FeatureGeometry, FeatureSource, GeometryType, Schema,
};
use crate::map_units::MapContext;
use crate::monitor::{ProcessMonitor, Stopwatch, check_cancelled};
use crate::offset_curve::OffsetCurveBuilder;
use crate::polygon::PolygonAssembler;
use crate::stacks::{StackLayoutEngine, WidthCallback, WidthSource};
use log::{info, warn};

fn assert_input_geometry(schema: &Schema, expected: GeometryType) -> Result<(), ProcessError> {
    if schema.geometry_type != expected {
        return Err(ProcessError::configuration(format!(
            "input geometries must be of type {}, found {}",
            expected, schema.geometry_type
        )));
    }
    Ok(())
}

/// Appends the names that are set and not yet in `attributes`.
fn with_extra_attributes(attributes: &[String], extra: &[&Option<String>]) -> Vec<String> {
    let mut all = attributes.to_vec();
    for name in extra.iter().filter_map(|n| n.as_deref()) {
        let name = name.trim();
        if !name.is_empty() && !all.iter().any(|a| a == name) {
            all.push(name.to_string());
        }
    }
    all
}

pub fn aggregate_similar_features<S: FeatureSource>(
    source: S,
    config: &AggregateConfig,
    monitor: &mut dyn ProcessMonitor,
) -> Result<Aggregation, ProcessError> {
    config.validate()?;
    monitor.started();

    let aggregation = FeatureAggregator::new(config.attributes.iter().cloned(), &config.count_attribute)
        .with_duration_measurement(config.enable_duration_measurement)
        .aggregate(source, monitor)?;

    monitor.complete();
    Ok(aggregation)
}

/// Aggregates lines and draws every aggregate as a polygon whose width grows
/// with its count. Widest first, so narrower polygons stay visible on top.
pub fn aggregate_lines_as_polygons<S: FeatureSource>(
    source: S,
    config: &PolygonConfig,
    context: &MapContext,
    monitor: &mut dyn ProcessMonitor,
) -> Result<FeatureCollection, ProcessError> {
    config.validate()?;
    assert_input_geometry(source.schema(), GeometryType::LineString)?;
    monitor.started();

    let center_on_line = config.center_on_line();
    let offset_attribute = if center_on_line {
        None
    } else {
        config.offset_attribute.as_deref().map(str::trim)
    };
    let attributes = with_extra_attributes(&config.attributes, &[&config.offset_attribute]);

    let aggregation = FeatureAggregator::new(attributes, COUNT_ATTRIBUTE)
        .with_duration_measurement(config.enable_duration_measurement)
        .aggregate(source, monitor)?;

    let count_reference = if config.max_polygon_width_feature_count > 0 {
        config.max_polygon_width_feature_count
    } else {
        aggregation.statistics.max_count_in_any_aggregate as i64
    };
    info!(
        "Scaling polygon widths {} up to {}px, reached at a count of {}",
        config.width_scaling, config.max_polygon_width, count_reference
    );

    let schema = aggregation
        .collection
        .schema
        .with_geometry_type(GeometryType::Polygon)
        .with_attribute(AttributeDescriptor::new(
            POLYGON_WIDTH_ATTRIBUTE,
            AttributeKind::Float,
        ));

    let assembler = PolygonAssembler::new(center_on_line, config.enable_artifact_removal);
    let mut convert_time = Stopwatch::new(config.enable_duration_measurement);
    let total = aggregation.collection.len();
    let mut polygons: Vec<(i64, Feature)> = Vec::with_capacity(total);
    let mut skipped = 0;

    for (done, feature) in aggregation.collection.features.into_iter().enumerate() {
        check_cancelled(&*monitor)?;

        let count = feature.int_attribute_or(Some(COUNT_ATTRIBUTE), 0);
        let width = config
            .width_scaling
            .width(count, config.max_polygon_width, count_reference);
        let offset = config
            .width_scaling
            .offset(&feature, offset_attribute, center_on_line, width);

        let converted = feature
            .geometry
            .as_ref()
            .and_then(FeatureGeometry::as_line)
            .map(|line| {
                convert_time.measure(|| {
                    assembler.convert(
                        line,
                        context.pixels_to_map_units(width),
                        context.pixels_to_map_units(offset),
                    )
                })
            });
        match converted {
            Some(Ok(polygon)) => {
                let mut attributes = feature.attributes.clone();
                attributes.insert(
                    POLYGON_WIDTH_ATTRIBUTE.to_string(),
                    AttributeValue::Float(width),
                );
                polygons.push((
                    count,
                    Feature::new(feature.id.clone(), Some(polygon.into()), attributes),
                ));
            }
            Some(Err(GeometryError::UndefinedWidthDirection)) => {
                return Err(ProcessError::configuration(format!(
                    "feature '{}' has an offset of 0 in attribute '{}', polygons not centered on their line need a non-zero offset",
                    feature.id,
                    offset_attribute.unwrap_or_default()
                )));
            }
            Some(Err(e)) if config.abort_on_offset_failure => {
                return Err(ProcessError::Geometry {
                    feature: feature.id,
                    source: e,
                });
            }
            Some(Err(e)) => {
                warn!("Skipping feature {}: {}", feature.id, e);
                skipped += 1;
            }
            None => {
                warn!("Skipping feature {}: no line geometry", feature.id);
                skipped += 1;
            }
        }

        monitor.progress((done + 1) as f32 / total as f32);
    }

    // stable, equal counts keep the aggregation order
    polygons.sort_by(|a, b| b.0.cmp(&a.0));
    let features: Vec<Feature> = polygons.into_iter().map(|(_, f)| f).collect();

    if convert_time.is_enabled() {
        info!(
            "Spent {} seconds on converting {} lines to polygons",
            convert_time.seconds(),
            total
        );
    }
    info!(
        "Returning {} polygons, skipped {} features",
        features.len(),
        skipped
    );

    monitor.complete();
    Ok(FeatureCollection::new(schema, features))
}

/// Aggregates lines, then draws aggregates that share a geometry side by side
/// with a width taken from their count or from `width_callback`.
pub fn aggregate_as_line_stacks<S: FeatureSource>(
    source: S,
    config: &AggregateStacksConfig,
    context: &MapContext,
    width_callback: Option<WidthCallback>,
    monitor: &mut dyn ProcessMonitor,
) -> Result<FeatureCollection, ProcessError> {
    config.validate()?;
    assert_input_geometry(source.schema(), GeometryType::LineString)?;
    monitor.started();

    let attributes = with_extra_attributes(
        &config.attributes,
        &[&config.order_attribute, &config.invert_sides_attribute],
    );
    let aggregation = FeatureAggregator::new(attributes, COUNT_ATTRIBUTE)
        .with_duration_measurement(config.enable_duration_measurement)
        .aggregate(source, monitor)?;

    let widths = match width_callback {
        Some(callback) => WidthSource::Callback(callback),
        None => WidthSource::Clamp {
            min: config.min_line_width,
            max: config.max_line_width,
        },
    };

    let layout = StackLayoutEngine::new(LINE_WIDTH_ATTRIBUTE)
        .count_attribute(Some(COUNT_ATTRIBUTE.to_string()))
        .order_attribute(config.order_attribute.clone())
        .invert_sides_attribute(config.invert_sides_attribute.clone())
        .draw_on_both_sides(config.draw_on_both_sides)
        .spacing(config.spacing_between_stack_entries)
        .with_duration_measurement(config.enable_duration_measurement)
        .layout(aggregation.collection.into_source(), context, &widths, monitor)?;

    monitor.complete();
    Ok(layout.collection)
}

/// Stacks lines with identical geometry without aggregating them first.
pub fn line_stacks<S: FeatureSource>(
    source: S,
    config: &LineStacksConfig,
    context: &MapContext,
    width_callback: Option<WidthCallback>,
    monitor: &mut dyn ProcessMonitor,
) -> Result<FeatureCollection, ProcessError> {
    config.validate()?;
    assert_input_geometry(source.schema(), GeometryType::LineString)?;
    monitor.started();

    let widths = match width_callback {
        Some(callback) => WidthSource::Callback(callback),
        None => WidthSource::Fixed(config.line_width),
    };

    let layout = StackLayoutEngine::new(LINE_WIDTH_ATTRIBUTE)
        .order_attribute(config.order_attribute.clone())
        .invert_sides_attribute(config.invert_sides_attribute.clone())
        .draw_on_both_sides(config.draw_on_both_sides)
        .spacing(config.spacing_between_stack_entries)
        .with_duration_measurement(config.enable_duration_measurement)
        .layout(source, context, &widths, monitor)?;

    monitor.complete();
    Ok(layout.collection)
}

/// Moves every line sideways by a fixed pixel distance.
pub fn make_offset_lines<S: FeatureSource>(
    source: S,
    config: &OffsetLinesConfig,
    context: &MapContext,
    monitor: &mut dyn ProcessMonitor,
) -> Result<FeatureCollection, ProcessError> {
    config.validate()?;
    assert_input_geometry(source.schema(), GeometryType::LineString)?;
    monitor.started();

    let schema = source.schema().clone();
    let offset = context.pixels_to_map_units(config.offset_in_pixels);
    let builder = OffsetCurveBuilder::new();
    let mut offset_time = Stopwatch::new(config.enable_duration_measurement);
    let total = source.size_hint().1;
    let mut features = Vec::new();
    let mut skipped = 0;

    for (done, mut feature) in source.enumerate() {
        check_cancelled(&*monitor)?;

        if offset == 0.0 {
            features.push(feature);
        } else {
            let moved = feature
                .geometry
                .as_ref()
                .and_then(FeatureGeometry::as_line)
                .map(|line| offset_time.measure(|| builder.build_offset_line(line, offset)));
            match moved {
                Some(Ok(offset_line)) => {
                    feature.geometry = Some(offset_line.into());
                    features.push(feature);
                }
                Some(Err(e)) => {
                    warn!("Skipping feature {}: {}", feature.id, e);
                    skipped += 1;
                }
                None => {
                    warn!("Skipping feature {}: no line geometry", feature.id);
                    skipped += 1;
                }
            }
        }

        if let Some(total) = total.filter(|t| *t > 0) {
            monitor.progress((done + 1) as f32 / total as f32);
        }
    }

    if offset_time.is_enabled() {
        info!(
            "Spent {} seconds on offsetting {} lines",
            offset_time.seconds(),
            features.len()
        );
    }
    info!(
        "Returning {} offset lines, skipped {} features",
        features.len(),
        skipped
    );

    monitor.complete();
    Ok(FeatureCollection::new(schema, features))
}
