use crate::chain_id::ChainId;
use prometheus::{IntCounterVec, Opts, Registry};

/// Counters emitted by the processing pipeline. Implementations must not block.
pub trait Metrics: Send + Sync {
    /// An unexpired event was taken from the queue.
    fn inc_vaa_consumed(&self, chain_id: ChainId);
    /// An event passed the chain filter and will be resolved.
    fn inc_vaa_unfiltered(&self, chain_id: ChainId);
    fn inc_origin_tx_inserted(&self, chain_id: ChainId);
    fn inc_origin_tx_failed(&self, chain_id: ChainId);
}

#[derive(Clone)]
pub struct PrometheusMetrics {
    vaa_consumed: IntCounterVec,
    vaa_unfiltered: IntCounterVec,
    origin_tx_inserted: IntCounterVec,
    origin_tx_failed: IntCounterVec,
}

fn register_counter(
    registry: &Registry,
    name: &str,
    help: &str,
) -> Result<IntCounterVec, prometheus::Error> {
    let counter = IntCounterVec::new(Opts::new(name, help), &["chain"])?;
    registry.register(Box::new(counter.clone()))?;
    Ok(counter)
}

impl PrometheusMetrics {
    pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        Ok(Self {
            vaa_consumed: register_counter(
                registry,
                "tx_tracker_vaa_consumed_total",
                "unexpired messages taken from the queue",
            )?,
            vaa_unfiltered: register_counter(
                registry,
                "tx_tracker_vaa_unfiltered_total",
                "messages passed to origin transaction resolution",
            )?,
            origin_tx_inserted: register_counter(
                registry,
                "tx_tracker_origin_tx_inserted_total",
                "origin transactions resolved and stored",
            )?,
            origin_tx_failed: register_counter(
                registry,
                "tx_tracker_origin_tx_failed_total",
                "origin transaction resolution errors",
            )?,
        })
    }
}

impl Metrics for PrometheusMetrics {
    fn inc_vaa_consumed(&self, chain_id: ChainId) {
        self.vaa_consumed.with_label_values(&[chain_id.name()]).inc();
    }

    fn inc_vaa_unfiltered(&self, chain_id: ChainId) {
        self.vaa_unfiltered
            .with_label_values(&[chain_id.name()])
            .inc();
    }

    fn inc_origin_tx_inserted(&self, chain_id: ChainId) {
        self.origin_tx_inserted
            .with_label_values(&[chain_id.name()])
            .inc();
    }

    fn inc_origin_tx_failed(&self, chain_id: ChainId) {
        self.origin_tx_failed
            .with_label_values(&[chain_id.name()])
            .inc();
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl Metrics for NoopMetrics {
    fn inc_vaa_consumed(&self, _chain_id: ChainId) {}
    fn inc_vaa_unfiltered(&self, _chain_id: ChainId) {}
    fn inc_origin_tx_inserted(&self, _chain_id: ChainId) {}
    fn inc_origin_tx_failed(&self, _chain_id: ChainId) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_are_labelled_by_chain_name() {
        let registry = Registry::new();
        let metrics = PrometheusMetrics::new(&registry).unwrap();
        metrics.inc_origin_tx_inserted(ChainId::ETHEREUM);
        metrics.inc_origin_tx_inserted(ChainId::ETHEREUM);
        metrics.inc_origin_tx_failed(ChainId::APTOS);

        assert_eq!(
            metrics
                .origin_tx_inserted
                .with_label_values(&["ethereum"])
                .get(),
            2
        );
        assert_eq!(
            metrics.origin_tx_failed.with_label_values(&["aptos"]).get(),
            1
        );
    }

    #[test]
    fn registering_twice_fails() {
        let registry = Registry::new();
        PrometheusMetrics::new(&registry).unwrap();
        assert!(PrometheusMetrics::new(&registry).is_err());
    }
}
