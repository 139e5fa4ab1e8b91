//! Prometheus metrics for the sync API.

use prometheus_client::encoding::text::encode;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::registry::Registry;
use std::sync::Arc;

#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct OutcomeLabel(pub String);

impl prometheus_client::encoding::EncodeLabelSet for OutcomeLabel {
    fn encode(
        &self,
        mut encoder: prometheus_client::encoding::LabelSetEncoder,
    ) -> Result<(), std::fmt::Error> {
        use prometheus_client::encoding::EncodeLabel;
        ("outcome", self.0.as_str()).encode(encoder.encode_label())?;
        Ok(())
    }
}

#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct EventLabel(pub String);

impl prometheus_client::encoding::EncodeLabelSet for EventLabel {
    fn encode(
        &self,
        mut encoder: prometheus_client::encoding::LabelSetEncoder,
    ) -> Result<(), std::fmt::Error> {
        use prometheus_client::encoding::EncodeLabel;
        ("event", self.0.as_str()).encode(encoder.encode_label())?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct ServerMetrics {
    pub sync_runs: Family<OutcomeLabel, Counter>,
    pub records_synced: Counter,
    pub webhook_events: Family<EventLabel, Counter>,
    pub registry: Arc<Registry>,
}

impl ServerMetrics {
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let sync_runs = Family::<OutcomeLabel, Counter>::default();
        registry.register(
            "basemirror_sync_runs",
            "Total sync runs by outcome",
            sync_runs.clone(),
        );

        let records_synced = Counter::default();
        registry.register(
            "basemirror_records_synced",
            "Total records upserted across all sync runs",
            records_synced.clone(),
        );

        let webhook_events = Family::<EventLabel, Counter>::default();
        registry.register(
            "basemirror_webhook_events",
            "Webhook notifications processed by event type",
            webhook_events.clone(),
        );

        Self {
            sync_runs,
            records_synced,
            webhook_events,
            registry: Arc::new(registry),
        }
    }

    /// Encode all metrics as Prometheus text format.
    pub fn encode(&self) -> String {
        let mut buf = String::new();
        encode(&mut buf, &self.registry).unwrap();
        buf
    }
}

impl Default for ServerMetrics {
    fn default() -> Self {
        Self::new()
    }
}
