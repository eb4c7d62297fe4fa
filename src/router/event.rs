//! Metric events extracted from `perf` payload elements.

use thiserror::Error;

use crate::ingress::Element;
use crate::storage::escape;

/// Payload element name carrying a metric sample.
pub const PERF_ELEMENT: &str = "perf";

/// Fields every metric must carry, in the order they are reported.
pub const REQUIRED_FIELDS: [&str; 4] = ["timestamp", "value", "host", "datasource"];

/// Why an element was not turned into a [`MetricEvent`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("'{0}' is not a valid message type")]
    WrongType(String),

    #[error("missing fields: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),

    #[error("timestamp '{0}' is not an integer")]
    BadTimestamp(String),
}

/// A validated sample. String fields are already escaped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricEvent {
    pub timestamp: i64,
    pub value: String,
    pub host: String,
    pub datasource: String,
}

impl MetricEvent {
    /// Extract and escape the four required fields of a `perf` element.
    ///
    /// Absent and empty fields are both reported as missing.
    pub fn from_element(element: &Element) -> Result<Self, Rejection> {
        if element.name != PERF_ELEMENT {
            return Err(Rejection::WrongType(element.name.clone()));
        }

        let fields = REQUIRED_FIELDS.map(|name| {
            element
                .text_of(name)
                .filter(|text| !text.is_empty())
                .map(|text| escape(text).into_owned())
        });

        let missing: Vec<&'static str> = REQUIRED_FIELDS
            .iter()
            .zip(&fields)
            .filter(|(_, value)| value.is_none())
            .map(|(name, _)| *name)
            .collect();

        let [Some(timestamp), Some(value), Some(host), Some(datasource)] = fields else {
            return Err(Rejection::MissingFields(missing));
        };

        let timestamp = timestamp
            .parse::<i64>()
            .map_err(|_| Rejection::BadTimestamp(timestamp.clone()))?;

        Ok(Self {
            timestamp,
            value,
            host,
            datasource,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn perf() -> Element {
        Element::new("perf")
            .child("timestamp", "1000")
            .child("value", "42")
            .child("host", "srv1")
            .child("datasource", "Load 5")
    }

    #[test]
    fn test_extracts_and_escapes() {
        let event = MetricEvent::from_element(&perf()).unwrap();
        assert_eq!(
            event,
            MetricEvent {
                timestamp: 1000,
                value: "42".to_string(),
                host: "srv1".to_string(),
                datasource: "Load%205".to_string(),
            }
        );
    }

    #[test]
    fn test_wrong_element_type() {
        let element = Element::new("event").child("host", "srv1");
        assert_eq!(
            MetricEvent::from_element(&element),
            Err(Rejection::WrongType("event".to_string()))
        );
    }

    #[test]
    fn test_missing_and_empty_fields() {
        let element = Element::new("perf")
            .child("timestamp", "1000")
            .child("host", "");
        assert_eq!(
            MetricEvent::from_element(&element),
            Err(Rejection::MissingFields(vec!["value", "host", "datasource"]))
        );
    }

    #[test]
    fn test_bad_timestamp() {
        let element = Element::new("perf")
            .child("timestamp", "10.5")
            .child("value", "1")
            .child("host", "h")
            .child("datasource", "d");
        assert_eq!(
            MetricEvent::from_element(&element),
            Err(Rejection::BadTimestamp("10.5".to_string()))
        );
    }
}
