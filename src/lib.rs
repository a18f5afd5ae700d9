//! Cartographic symbology for line data: aggregation of duplicate features,
//! count-scaled ribbon polygons and side-by-side line stacks, all sized in
//! screen pixels and drawn in map units.

#![deny(
    clippy::mutable_key_type,
    clippy::map_entry,
    clippy::boxed_local,
    clippy::let_unit_value,
    clippy::redundant_allocation,
    clippy::bool_comparison,
    clippy::bind_instead_of_map,
    clippy::vec_box,
    clippy::while_let_loop,
    clippy::useless_asref,
    clippy::suspicious_map,
    clippy::single_char_pattern,
    clippy::let_and_return,
    clippy::iter_cloned_collect,
    clippy::match_result_ok,
    clippy::cmp_owned,
    clippy::op_ref
)]

pub mod aggregator;
pub mod config;
pub mod error;
pub mod feature;
pub mod hasher;
pub mod map_units;
pub mod monitor;
pub mod offset_curve;
pub mod polygon;
pub mod processes;
pub mod stacks;
pub mod width_scaling;

pub use aggregator::{Aggregation, AggregationStatistics, FeatureAggregator};
pub use error::{GeometryError, ProcessError};
pub use feature::{
    AttributeDescriptor, AttributeKind, AttributeValue, Feature, FeatureCollection,
    FeatureGeometry, FeatureSource, GeometryType, Schema,
};
pub use map_units::MapContext;
pub use monitor::{NoopMonitor, ProcessMonitor};
