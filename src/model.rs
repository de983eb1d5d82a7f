use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Maximum number of records kept in history.
pub const HISTORY_CAPACITY: usize = 1000;

/// Substring producers use to tag forecast-driven alerts.
pub const FORECAST_TAG: &str = "FORECAST";

/// One telemetry observation from a well.
///
/// Envelope keys are named but held as raw JSON: whatever type the producer
/// used (a numeric timestamp, a string status, an empty alert list, `null`)
/// is kept and written back unchanged. Every other top-level key is a metric
/// (e.g. `"Oil volume"`, `"Water cut"`). The typed views live in the accessors.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct Record {
    /// Producer-supplied, timezone-bearing. Never validated here.
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Value>,

    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub client: Option<Value>,

    /// Metric key -> classification ("Critical", "Normal", ...), as assigned by the producer.
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub status: Option<Value>,

    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub alerts: Option<Value>,

    /// Next-day block: `forecast_date`, `generated_at`, `predictions`.
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub forecast: Option<Value>,

    #[serde(flatten)]
    pub metrics: Map<String, Value>,
}

impl Record {
    pub fn client_id(&self) -> Option<&str> {
        self.client.as_ref().and_then(Value::as_str)
    }

    pub fn client_or_unknown(&self) -> &str {
        self.client_id().unwrap_or("Unknown")
    }

    pub fn timestamp_str(&self) -> Option<&str> {
        self.timestamp.as_ref().and_then(Value::as_str)
    }

    /// Numeric value of a metric, `None` when absent, null or non-numeric.
    pub fn metric(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).and_then(Value::as_f64)
    }

    pub fn parsed_timestamp(&self) -> Option<DateTime<FixedOffset>> {
        self.timestamp_str()
            .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
    }

    /// Producer's classification for one metric.
    pub fn status_of(&self, metric: &str) -> Option<&str> {
        self.status.as_ref()?.get(metric)?.as_str()
    }

    /// Alert strings; non-string entries are skipped.
    pub fn alerts(&self) -> impl Iterator<Item = &str> {
        self.alerts
            .as_ref()
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(Value::as_str)
    }

    pub fn forecast_alerts(&self) -> impl Iterator<Item = &str> {
        self.alerts().filter(|a| a.contains(FORECAST_TAG))
    }

    pub fn has_forecast(&self) -> bool {
        matches!(&self.forecast, Some(f) if !f.is_null())
    }

    pub fn forecast_date(&self) -> Option<&str> {
        self.forecast.as_ref()?.get("forecast_date")?.as_str()
    }

    /// Predicted value of a metric for the forecast date.
    pub fn prediction(&self, metric: &str) -> Option<f64> {
        self.forecast.as_ref()?.get("predictions")?.get(metric)?.as_f64()
    }
}

// Keeps an explicit `null` as `Some(Value::Null)`; only a missing key is `None`.
fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}
