//! Metric samples and their Prometheus text exposition.
//!
//! Each collector's samples go into a fresh `prometheus::Registry` per
//! scrape, one `GaugeVec` per metric name, and are rendered with the
//! `TextEncoder`. Nothing is kept between scrapes.

use prometheus::{Encoder, GaugeVec, Opts, Registry, TextEncoder};

/// Content type for `/metrics` responses.
pub const CONTENT_TYPE: &str = prometheus::TEXT_FORMAT;

/// One (name, labels, value) observation.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSample {
    pub name: String,
    pub help: String,
    pub labels: Vec<(String, String)>,
    pub value: f64,
}

impl MetricSample {
    pub fn gauge(name: impl Into<String>, help: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            help: help.into(),
            labels: Vec::new(),
            value,
        }
    }

    pub fn with_label(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.push((name.into(), value.into()));
        self
    }

    /// Value of the label called `name`, if set.
    pub fn label(&self, name: &str) -> Option<&str> {
        self.labels
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Render samples in the Prometheus text format.
///
/// Samples sharing a name must share label names; the first sample of a
/// name fixes its help text and label set.
pub fn encode(samples: &[MetricSample]) -> prometheus::Result<String> {
    let registry = Registry::new();
    let mut families: Vec<(&str, GaugeVec)> = Vec::new();

    for sample in samples {
        let gauge = match families.iter().find(|(name, _)| *name == sample.name) {
            Some((_, gauge)) => gauge.clone(),
            None => {
                let label_names: Vec<&str> = sample.labels.iter().map(|(k, _)| k.as_str()).collect();
                let gauge = GaugeVec::new(
                    Opts::new(sample.name.as_str(), sample.help.as_str()),
                    &label_names,
                )?;
                registry.register(Box::new(gauge.clone()))?;
                families.push((sample.name.as_str(), gauge.clone()));
                gauge
            }
        };

        let label_values: Vec<&str> = sample.labels.iter().map(|(_, v)| v.as_str()).collect();
        gauge
            .get_metric_with_label_values(&label_values)?
            .set(sample.value);
    }

    let mut buffer = Vec::new();
    TextEncoder::new().encode(&registry.gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}

/// Make an arbitrary backend field name usable as a metric name.
///
/// Characters outside `[a-zA-Z0-9_:]` become `_`; a leading digit gets a
/// `_` prefix.
pub fn sanitize_metric_name(raw: &str) -> String {
    let mut name: String = raw
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == ':' { c } else { '_' })
        .collect();
    if name.is_empty() || name.starts_with(|c: char| c.is_ascii_digit()) {
        name.insert(0, '_');
    }
    name
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_empty_is_empty() {
        assert_eq!(encode(&[]).unwrap(), "");
    }

    #[test]
    fn encode_groups_by_name() {
        let samples = vec![
            MetricSample::gauge("disk_used", "Disk used.", 10.0).with_label("host", "hostA"),
            MetricSample::gauge("disk_used", "Disk used.", 20.0).with_label("host", "hostB"),
            MetricSample::gauge("disk_total", "Disk total.", 100.0).with_label("host", "hostA"),
        ];
        let text = encode(&samples).unwrap();

        assert_eq!(text.matches("# TYPE disk_used gauge").count(), 1);
        assert!(text.contains("# HELP disk_used Disk used.\n"));
        assert!(text.contains("disk_used{host=\"hostA\"} 10\n"));
        assert!(text.contains("disk_used{host=\"hostB\"} 20\n"));
        assert!(text.contains("disk_total{host=\"hostA\"} 100\n"));
    }

    #[test]
    fn encode_fractional_values() {
        let samples =
            vec![MetricSample::gauge("cache_age_seconds", "Age.", 0.5).with_label("cloud", "zvm")];
        let text = encode(&samples).unwrap();
        assert!(text.contains("cache_age_seconds{cloud=\"zvm\"} 0.5\n"));
    }

    #[test]
    fn encode_rejects_label_cardinality_mismatch() {
        let samples = vec![
            MetricSample::gauge("disk_used", "Disk used.", 10.0).with_label("host", "hostA"),
            MetricSample::gauge("disk_used", "Disk used.", 10.0),
        ];
        assert!(encode(&samples).is_err());
    }

    #[test]
    fn encode_rejects_invalid_names() {
        let samples = vec![MetricSample::gauge("disk-used", "Disk used.", 1.0)];
        assert!(encode(&samples).is_err());
    }

    #[test]
    fn sanitize_replaces_bad_characters() {
        assert_eq!(sanitize_metric_name("disk_used"), "disk_used");
        assert_eq!(sanitize_metric_name("lpar.cpu-used"), "lpar_cpu_used");
        assert_eq!(sanitize_metric_name("9lives"), "_9lives");
        assert_eq!(sanitize_metric_name(""), "_");
    }

    #[test]
    fn label_lookup() {
        let sample = MetricSample::gauge("x", "X.", 1.0).with_label("host", "a");
        assert_eq!(sample.label("host"), Some("a"));
        assert_eq!(sample.label("cloud"), None);
    }

    #[test]
    fn content_type_is_text_format() {
        assert!(CONTENT_TYPE.starts_with("text/plain"));
    }
}
