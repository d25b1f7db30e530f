use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Aggregation applied to a metric's raw samples over the query window.
/// Serialized names match the monitor API's casing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Aggregation {
    Maximum,
    Minimum,
    Average,
    Count,
    Total,
}

impl Aggregation {
    pub fn from_id(id: &str) -> Option<Self> {
        match id.to_lowercase().as_str() {
            "maximum" | "max" => Some(Self::Maximum),
            "minimum" | "min" => Some(Self::Minimum),
            "average" | "avg" => Some(Self::Average),
            "count" => Some(Self::Count),
            "total" => Some(Self::Total),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Maximum => "Maximum",
            Self::Minimum => "Minimum",
            Self::Average => "Average",
            Self::Count => "Count",
            Self::Total => "Total",
        }
    }
}

/// One timestamped data point; only the requested aggregate field is
/// populated by the provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricSample {
    #[serde(default)]
    pub time_stamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub maximum: Option<f64>,
    #[serde(default)]
    pub minimum: Option<f64>,
    #[serde(default)]
    pub average: Option<f64>,
    #[serde(default)]
    pub count: Option<f64>,
    #[serde(default)]
    pub total: Option<f64>,
}

impl MetricSample {
    pub fn value(&self, aggregation: Aggregation) -> Option<f64> {
        match aggregation {
            Aggregation::Maximum => self.maximum,
            Aggregation::Minimum => self.minimum,
            Aggregation::Average => self.average,
            Aggregation::Count => self.count,
            Aggregation::Total => self.total,
        }
    }
}

/// Most recent sample that actually carries a value for the requested
/// aggregation; trailing points of a window are often still empty.
pub fn latest_sample(
    samples: impl IntoIterator<Item = MetricSample>,
    aggregation: Aggregation,
) -> Option<MetricSample> {
    samples
        .into_iter()
        .filter(|s| s.value(aggregation).is_some())
        .max_by_key(|s| s.time_stamp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(minute: u32, maximum: Option<f64>) -> MetricSample {
        MetricSample {
            time_stamp: Some(Utc.with_ymd_and_hms(2021, 3, 1, 12, minute, 0).unwrap()),
            maximum,
            ..Default::default()
        }
    }

    #[test]
    fn from_id_accepts_short_forms() {
        assert_eq!(Aggregation::from_id("max"), Some(Aggregation::Maximum));
        assert_eq!(Aggregation::from_id("Average"), Some(Aggregation::Average));
        assert_eq!(Aggregation::from_id("TOTAL"), Some(Aggregation::Total));
        assert_eq!(Aggregation::from_id("p99"), None);
    }

    #[test]
    fn serialized_names_match_api_casing() {
        assert_eq!(
            serde_json::to_string(&Aggregation::Maximum).unwrap(),
            "\"Maximum\""
        );
    }

    #[test]
    fn value_selects_the_requested_field() {
        let sample = MetricSample {
            maximum: Some(3.0),
            average: Some(1.5),
            ..Default::default()
        };
        assert_eq!(sample.value(Aggregation::Maximum), Some(3.0));
        assert_eq!(sample.value(Aggregation::Average), Some(1.5));
        assert_eq!(sample.value(Aggregation::Count), None);
    }

    #[test]
    fn latest_sample_picks_newest_valued_point() {
        let samples = vec![
            at(1, Some(1.0)),
            at(4, None), // newest, but empty
            at(3, Some(3.0)),
        ];
        let latest = latest_sample(samples, Aggregation::Maximum).unwrap();
        assert_eq!(latest.maximum, Some(3.0));
    }

    #[test]
    fn latest_sample_empty_window_is_none() {
        assert!(latest_sample(Vec::new(), Aggregation::Total).is_none());
        let samples = vec![at(1, None), at(2, None)];
        assert!(latest_sample(samples, Aggregation::Maximum).is_none());
    }

    #[test]
    fn deserialize_monitor_data_point() {
        let json = r#"{
            "timeStamp": "2021-03-01T12:04:00Z",
            "maximum": 1.0
        }"#;
        let sample: MetricSample = serde_json::from_str(json).unwrap();
        assert_eq!(sample.maximum, Some(1.0));
        assert!(sample.time_stamp.is_some());
        assert!(sample.average.is_none());
    }
}
