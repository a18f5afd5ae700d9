// cargo run --bin flowstack -- stacks --input lines.geojson --bbox 0,0,1000,1000 --width 512 --height 512 --attributes class

use anyhow::Context;
use clap::Parser;
use flowstack::config::{
    AggregateConfig, AggregateStacksConfig, LineStacksConfig, OffsetLinesConfig, PolygonConfig,
    split_attribute_list,
};
use flowstack::processes;
use flowstack::{FeatureCollection, FeatureSource, MapContext, ProcessMonitor};
use log::{debug, info};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};

mod geojson_io;

use geojson_io::GeoJsonSource;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(clap::Args, Debug)]
struct Io {
    /// GeoJSON file with the input features
    #[arg(short, long)]
    input: PathBuf,

    /// Where to write the resulting GeoJSON, stdout if not given
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// JSON file with the process configuration, flags override its fields
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log time spent in the expensive parts of the process
    #[arg(long)]
    measure_durations: bool,
}

#[derive(clap::Args, Debug)]
struct Map {
    /// Extent of the rendered image in map units: minx,miny,maxx,maxy
    #[arg(long, value_parser = parse_bbox, allow_hyphen_values = true)]
    bbox: Bbox,

    /// Image width in pixels
    #[arg(long)]
    width: u32,

    /// Image height in pixels
    #[arg(long)]
    height: u32,
}

#[derive(Debug, Clone, Copy)]
struct Bbox {
    min_x: f64,
    min_y: f64,
    max_x: f64,
    max_y: f64,
}

fn parse_bbox(value: &str) -> Result<Bbox, String> {
    let parts = value
        .split(',')
        .map(|p| p.trim().parse::<f64>().map_err(|e| format!("'{}': {}", p.trim(), e)))
        .collect::<Result<Vec<f64>, String>>()?;
    match parts[..] {
        [min_x, min_y, max_x, max_y] if min_x < max_x && min_y < max_y => Ok(Bbox {
            min_x,
            min_y,
            max_x,
            max_y,
        }),
        [_, _, _, _] => Err("the minimum has to be below the maximum on both axes".to_string()),
        _ => Err(format!("expected 4 comma separated numbers, got {}", parts.len())),
    }
}

impl Map {
    fn context(&self) -> anyhow::Result<MapContext> {
        let b = self.bbox;
        Ok(MapContext::from_bounds(
            b.min_x, b.min_y, b.max_x, b.max_y, self.width, self.height,
        )?)
    }
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Collapse features with equal geometry and attributes into counted aggregates
    Aggregate {
        #[command(flatten)]
        io: Io,
        /// Comma separated attributes to aggregate by
        #[arg(long)]
        attributes: Option<String>,
        #[arg(long)]
        count_attribute: Option<String>,
    },
    /// Aggregate lines and draw them as polygons scaled by their count
    Polygons {
        #[command(flatten)]
        io: Io,
        #[command(flatten)]
        map: Map,
        #[arg(long)]
        attributes: Option<String>,
        /// Integer attribute with the offset in pixels, polygons are centered when unset
        #[arg(long)]
        offset_attribute: Option<String>,
        /// linear or logarithmic
        #[arg(long)]
        width_scaling: Option<String>,
        #[arg(long)]
        max_polygon_width: Option<i32>,
        #[arg(long)]
        max_polygon_width_feature_count: Option<i64>,
        #[arg(long)]
        remove_artifacts: bool,
        #[arg(long)]
        abort_on_offset_failure: bool,
    },
    /// Aggregate lines and draw aggregates sharing a geometry side by side
    Stacks {
        #[command(flatten)]
        io: Io,
        #[command(flatten)]
        map: Map,
        #[arg(long)]
        attributes: Option<String>,
        #[arg(long)]
        order_attribute: Option<String>,
        #[arg(long)]
        invert_sides_attribute: Option<String>,
        #[arg(long)]
        min_line_width: Option<i32>,
        #[arg(long)]
        max_line_width: Option<i32>,
        /// Draw each stack on one side of the line only
        #[arg(long)]
        one_side: bool,
        #[arg(long)]
        spacing: Option<i32>,
    },
    /// Draw lines sharing a geometry side by side without aggregating them
    LineStacks {
        #[command(flatten)]
        io: Io,
        #[command(flatten)]
        map: Map,
        #[arg(long)]
        order_attribute: Option<String>,
        #[arg(long)]
        invert_sides_attribute: Option<String>,
        #[arg(long)]
        line_width: Option<i32>,
        #[arg(long)]
        one_side: bool,
        #[arg(long)]
        spacing: Option<i32>,
    },
    /// Move every line sideways by a distance in pixels
    OffsetLines {
        #[command(flatten)]
        io: Io,
        #[command(flatten)]
        map: Map,
        /// Positive moves left of the line direction, negative right
        #[arg(long, allow_negative_numbers = true)]
        offset: Option<f64>,
    },
}

/// Logs progress in steps of 10%.
#[derive(Default)]
struct LogMonitor {
    reported: u32,
}

impl ProcessMonitor for LogMonitor {
    fn started(&mut self) {
        debug!("Process started");
    }

    fn progress(&mut self, fraction: f32) {
        let step = (fraction * 10.0).floor() as u32;
        if step > self.reported {
            self.reported = step;
            info!("{}% done", step * 10);
        }
    }

    fn complete(&mut self) {
        debug!("Process complete");
    }
}

fn load_config<T: DeserializeOwned + Default>(path: Option<&Path>) -> anyhow::Result<T> {
    match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("Failed to parse config {}", path.display()))
        }
        None => Ok(T::default()),
    }
}

fn open_input(io: &Io) -> anyhow::Result<GeoJsonSource> {
    let source = GeoJsonSource::read(&io.input)?;
    for descriptor in &source.schema().attributes {
        debug!(
            "Input attribute {} ({})",
            descriptor.name,
            geojson_io::kind_name(descriptor.kind)
        );
    }
    Ok(source)
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::init();

    let args = Args::parse();
    let mut monitor = LogMonitor::default();

    let (result, output): (FeatureCollection, Option<PathBuf>) = match args.cmd {
        Command::Aggregate {
            io,
            attributes,
            count_attribute,
        } => {
            let mut config: AggregateConfig = load_config(io.config.as_deref())?;
            if let Some(attributes) = attributes {
                config.attributes = split_attribute_list(&attributes);
            }
            if let Some(count_attribute) = count_attribute {
                config.count_attribute = count_attribute;
            }
            config.enable_duration_measurement |= io.measure_durations;

            let aggregation =
                processes::aggregate_similar_features(open_input(&io)?, &config, &mut monitor)?;
            info!(
                "{} features in, {} aggregates out, largest aggregate holds {}",
                aggregation.statistics.input_feature_count,
                aggregation.statistics.output_aggregate_count,
                aggregation.statistics.max_count_in_any_aggregate
            );
            (aggregation.collection, io.output)
        }
        Command::Polygons {
            io,
            map,
            attributes,
            offset_attribute,
            width_scaling,
            max_polygon_width,
            max_polygon_width_feature_count,
            remove_artifacts,
            abort_on_offset_failure,
        } => {
            let mut config: PolygonConfig = load_config(io.config.as_deref())?;
            if let Some(attributes) = attributes {
                config.attributes = split_attribute_list(&attributes);
            }
            if offset_attribute.is_some() {
                config.offset_attribute = offset_attribute;
            }
            if let Some(width_scaling) = width_scaling {
                config.width_scaling = width_scaling.parse()?;
            }
            if let Some(width) = max_polygon_width {
                config.max_polygon_width = width;
            }
            if let Some(count) = max_polygon_width_feature_count {
                config.max_polygon_width_feature_count = count;
            }
            config.enable_artifact_removal |= remove_artifacts;
            config.abort_on_offset_failure |= abort_on_offset_failure;
            config.enable_duration_measurement |= io.measure_durations;

            let collection = processes::aggregate_lines_as_polygons(
                open_input(&io)?,
                &config,
                &map.context()?,
                &mut monitor,
            )?;
            (collection, io.output)
        }
        Command::Stacks {
            io,
            map,
            attributes,
            order_attribute,
            invert_sides_attribute,
            min_line_width,
            max_line_width,
            one_side,
            spacing,
        } => {
            let mut config: AggregateStacksConfig = load_config(io.config.as_deref())?;
            if let Some(attributes) = attributes {
                config.attributes = split_attribute_list(&attributes);
            }
            if order_attribute.is_some() {
                config.order_attribute = order_attribute;
            }
            if invert_sides_attribute.is_some() {
                config.invert_sides_attribute = invert_sides_attribute;
            }
            if let Some(width) = min_line_width {
                config.min_line_width = width;
            }
            if let Some(width) = max_line_width {
                config.max_line_width = width;
            }
            if one_side {
                config.draw_on_both_sides = false;
            }
            if let Some(spacing) = spacing {
                config.spacing_between_stack_entries = spacing;
            }
            config.enable_duration_measurement |= io.measure_durations;

            let collection = processes::aggregate_as_line_stacks(
                open_input(&io)?,
                &config,
                &map.context()?,
                None,
                &mut monitor,
            )?;
            (collection, io.output)
        }
        Command::LineStacks {
            io,
            map,
            order_attribute,
            invert_sides_attribute,
            line_width,
            one_side,
            spacing,
        } => {
            let mut config: LineStacksConfig = load_config(io.config.as_deref())?;
            if order_attribute.is_some() {
                config.order_attribute = order_attribute;
            }
            if invert_sides_attribute.is_some() {
                config.invert_sides_attribute = invert_sides_attribute;
            }
            if let Some(width) = line_width {
                config.line_width = width;
            }
            if one_side {
                config.draw_on_both_sides = false;
            }
            if let Some(spacing) = spacing {
                config.spacing_between_stack_entries = spacing;
            }
            config.enable_duration_measurement |= io.measure_durations;

            let collection = processes::line_stacks(
                open_input(&io)?,
                &config,
                &map.context()?,
                None,
                &mut monitor,
            )?;
            (collection, io.output)
        }
        Command::OffsetLines { io, map, offset } => {
            let mut config: OffsetLinesConfig = load_config(io.config.as_deref())?;
            if let Some(offset) = offset {
                config.offset_in_pixels = offset;
            }
            config.enable_duration_measurement |= io.measure_durations;

            let collection = processes::make_offset_lines(
                open_input(&io)?,
                &config,
                &map.context()?,
                &mut monitor,
            )?;
            (collection, io.output)
        }
    };

    info!("Writing {} features", result.len());
    geojson_io::write(&result, output.as_deref())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bbox() {
        let bbox = parse_bbox("-10, 0,10,5.5").unwrap();
        assert_eq!(bbox.min_x, -10.0);
        assert_eq!(bbox.max_y, 5.5);
        assert!(parse_bbox("0,0,10").is_err());
        assert!(parse_bbox("10,0,0,10").is_err());
        assert!(parse_bbox("a,b,c,d").is_err());
    }

    #[test]
    fn test_cli_parses_subcommands() {
        let args = Args::try_parse_from([
            "flowstack",
            "offset-lines",
            "--input",
            "in.geojson",
            "--bbox",
            "-5,-5,5,5",
            "--width",
            "100",
            "--height",
            "100",
            "--offset",
            "-3",
        ])
        .unwrap();
        match args.cmd {
            Command::OffsetLines { map, offset, .. } => {
                assert_eq!(offset, Some(-3.0));
                assert_eq!(map.bbox.min_x, -5.0);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
