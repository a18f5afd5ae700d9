use crate::error::ProcessError;
use crate::feature::Feature;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How an aggregate's count maps to a polygon width in pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum WidthScalingPolicy {
    #[default]
    Linear,
    Logarithmic,
}

impl WidthScalingPolicy {
    /// Width in pixels for an aggregate of `count` features. `count_reference`
    /// is the count that reaches `max_width_pixels`; values below 1 are treated as 1.
    pub fn width(&self, count: i64, max_width_pixels: i32, count_reference: i64) -> f64 {
        let reference = count_reference.max(1) as f64;
        let count = count.max(0) as f64;
        let max_width = max_width_pixels as f64;

        match self {
            WidthScalingPolicy::Linear => max_width * (count / reference).min(1.0),
            WidthScalingPolicy::Logarithmic => {
                max_width * (count.min(reference) + 1.0).ln() / (reference + 1.0).ln()
            }
        }
    }

    /// Offset of the polygon from its line in pixels. Centered polygons start
    /// half their width to the right; otherwise the integer value of
    /// `offset_attribute` is used, 0 when it is missing or does not parse.
    pub fn offset(
        &self,
        feature: &Feature,
        offset_attribute: Option<&str>,
        center_on_line: bool,
        width: f64,
    ) -> f64 {
        if center_on_line {
            -width / 2.0
        } else {
            feature.int_attribute_or(offset_attribute, 0) as f64
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            WidthScalingPolicy::Linear => "linear",
            WidthScalingPolicy::Logarithmic => "logarithmic",
        }
    }
}

impl fmt::Display for WidthScalingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for WidthScalingPolicy {
    type Err = ProcessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "linear" | "lin" => Ok(WidthScalingPolicy::Linear),
            "logarithmic" | "log" => Ok(WidthScalingPolicy::Logarithmic),
            other => Err(ProcessError::configuration(format!(
                "unknown width scaling '{}', expected 'linear' or 'logarithmic'",
                other
            ))),
        }
    }
}

impl TryFrom<String> for WidthScalingPolicy {
    type Error = ProcessError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<WidthScalingPolicy> for String {
    fn from(policy: WidthScalingPolicy) -> Self {
        policy.name().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::AttributeValue;
    use proptest::prelude::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_linear_bounds() {
        let policy = WidthScalingPolicy::Linear;
        assert_eq!(policy.width(40, 20, 40), 20.0);
        assert_eq!(policy.width(0, 20, 40), 0.0);
        assert_eq!(policy.width(10, 20, 40), 5.0);
        // counts above the reference are capped
        assert_eq!(policy.width(400, 20, 40), 20.0);
    }

    #[test]
    fn test_logarithmic_bounds() {
        let policy = WidthScalingPolicy::Logarithmic;
        assert!((policy.width(40, 20, 40) - 20.0).abs() < 1e-12);
        assert_eq!(policy.width(0, 20, 40), 0.0);
        assert!(policy.width(10, 20, 40) > WidthScalingPolicy::Linear.width(10, 20, 40));
    }

    #[test]
    fn test_zero_reference_does_not_divide_by_zero() {
        assert!(WidthScalingPolicy::Linear.width(1, 20, 0).is_finite());
        assert!(WidthScalingPolicy::Logarithmic.width(1, 20, 0).is_finite());
    }

    #[test]
    fn test_names() {
        for name in ["lin", "linear", " Linear "] {
            assert_eq!(name.parse::<WidthScalingPolicy>().unwrap(), WidthScalingPolicy::Linear);
        }
        for name in ["log", "logarithmic", "LOG"] {
            assert_eq!(
                name.parse::<WidthScalingPolicy>().unwrap(),
                WidthScalingPolicy::Logarithmic
            );
        }
        assert!(matches!(
            "cubic".parse::<WidthScalingPolicy>(),
            Err(ProcessError::Configuration(_))
        ));
    }

    #[test]
    fn test_serde_by_name() {
        let policy: WidthScalingPolicy = serde_json::from_str("\"log\"").unwrap();
        assert_eq!(policy, WidthScalingPolicy::Logarithmic);
        assert_eq!(serde_json::to_string(&policy).unwrap(), "\"logarithmic\"");
        assert!(serde_json::from_str::<WidthScalingPolicy>("\"sqrt\"").is_err());
    }

    #[test]
    fn test_offset_from_attribute_or_center() {
        let mut attributes = BTreeMap::new();
        attributes.insert("shift".to_string(), AttributeValue::Int(6));
        attributes.insert("broken".to_string(), AttributeValue::from("six"));
        let feature = Feature::new("f", None, attributes);
        let policy = WidthScalingPolicy::Linear;

        assert_eq!(policy.offset(&feature, Some("shift"), true, 10.0), -5.0);
        assert_eq!(policy.offset(&feature, Some("shift"), false, 10.0), 6.0);
        assert_eq!(policy.offset(&feature, Some("broken"), false, 10.0), 0.0);
        assert_eq!(policy.offset(&feature, None, false, 10.0), 0.0);
    }

    proptest! {
        #[test]
        fn logarithmic_width_is_monotone(
            reference in 1i64..10_000,
            max_width in 1i32..200,
            a in 0i64..20_000,
            b in 0i64..20_000,
        ) {
            let (low, high) = if a <= b { (a, b) } else { (b, a) };
            let policy = WidthScalingPolicy::Logarithmic;
            prop_assert!(policy.width(low, max_width, reference) <= policy.width(high, max_width, reference));
        }
    }
}
