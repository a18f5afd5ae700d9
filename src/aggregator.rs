use crate::error::ProcessError;
use crate::feature::{
    AttributeDescriptor, AttributeKind, AttributeValue, Feature, FeatureCollection, FeatureSource,
    Schema,
};
use crate::hasher::FeatureHasher;
use crate::monitor::{ProcessMonitor, Stopwatch, check_cancelled};
use ahash::AHashMap;
use itertools::Itertools;
use log::{debug, info};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AggregationStatistics {
    pub input_feature_count: usize,
    pub output_aggregate_count: usize,
    pub max_count_in_any_aggregate: usize,
}

#[derive(Debug, Clone)]
pub struct Aggregation {
    pub collection: FeatureCollection,
    pub statistics: AggregationStatistics,
}

/// Collapses features with equal geometry and equal values for the configured
/// attributes into one representative carrying a count.
#[derive(Debug, Clone)]
pub struct FeatureAggregator {
    attributes: Vec<String>,
    count_attribute: String,
    measure_durations: bool,
}

struct Group {
    representative: Feature,
    count: usize,
}

impl FeatureAggregator {
    pub fn new<I, S>(attributes: I, count_attribute: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            attributes: attributes
                .into_iter()
                .map(Into::<String>::into)
                .unique()
                .collect(),
            count_attribute: count_attribute.into(),
            measure_durations: false,
        }
    }

    pub fn with_duration_measurement(mut self, enabled: bool) -> Self {
        self.measure_durations = enabled;
        self
    }

    pub fn count_attribute(&self) -> &str {
        &self.count_attribute
    }

    /// Output schema for an input schema: geometry, every configured attribute
    /// the input knows about, then the count.
    pub fn output_schema(&self, input: &Schema) -> Schema {
        let mut attributes: Vec<AttributeDescriptor> = self
            .attributes
            .iter()
            .filter_map(|name| input.descriptor(name).cloned())
            .collect();
        attributes.push(AttributeDescriptor::new(
            self.count_attribute.clone(),
            AttributeKind::Int,
        ));
        Schema::new(input.geometry_type, attributes)
    }

    pub fn aggregate<S: FeatureSource>(
        &self,
        source: S,
        monitor: &mut dyn ProcessMonitor,
    ) -> Result<Aggregation, ProcessError> {
        if self.count_attribute.trim().is_empty() {
            return Err(ProcessError::configuration(
                "the count attribute needs a name",
            ));
        }
        if self.attributes.contains(&self.count_attribute) {
            return Err(ProcessError::configuration(format!(
                "count attribute '{}' is also an aggregation attribute",
                self.count_attribute
            )));
        }

        let input_schema = source.schema().clone();
        let output_schema = self.output_schema(&input_schema);

        let known: Vec<String> = self
            .attributes
            .iter()
            .filter(|name| input_schema.has_attribute(name))
            .cloned()
            .collect();
        for name in self.attributes.iter().filter(|n| !known.contains(n)) {
            debug!("Ignoring unknown aggregation attribute {}", name);
        }

        let hasher = FeatureHasher::new(true, known.iter().cloned());
        let mut hash_time = Stopwatch::new(self.measure_durations);

        let mut index: AHashMap<u32, usize> = AHashMap::new();
        let mut groups: Vec<Group> = Vec::new();
        let mut statistics = AggregationStatistics::default();

        for feature in source {
            check_cancelled(&*monitor)?;
            statistics.input_feature_count += 1;

            let key = hash_time.measure(|| hasher.hash(&feature));
            let slot = *index.entry(key).or_insert_with(|| {
                groups.push(Group {
                    representative: self.representative(&feature, &known),
                    count: 0,
                });
                groups.len() - 1
            });

            let group = &mut groups[slot];
            group.count += 1;
            statistics.max_count_in_any_aggregate =
                statistics.max_count_in_any_aggregate.max(group.count);
        }

        let features: Vec<Feature> = groups
            .into_iter()
            .map(|group| {
                let mut representative = group.representative;
                representative.attributes.insert(
                    self.count_attribute.clone(),
                    AttributeValue::Int(group.count as i64),
                );
                representative
            })
            .collect();
        statistics.output_aggregate_count = features.len();

        if hash_time.is_enabled() {
            info!(
                "Spent {} seconds on hashing {} features for aggregation",
                hash_time.seconds(),
                statistics.input_feature_count
            );
        }
        info!(
            "Aggregated {} incoming features to {} outgoing features",
            statistics.input_feature_count, statistics.output_aggregate_count
        );

        Ok(Aggregation {
            collection: FeatureCollection::new(output_schema, features),
            statistics,
        })
    }

    fn representative(&self, feature: &Feature, attributes: &[String]) -> Feature {
        let copied: BTreeMap<String, AttributeValue> = attributes
            .iter()
            .filter_map(|name| {
                feature
                    .attribute(name)
                    .map(|value| (name.clone(), value.clone()))
            })
            .collect();
        Feature::new(feature.id.clone(), feature.geometry.clone(), copied)
    }
}
