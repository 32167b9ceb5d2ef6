//! Decision telemetry side channel
//!
//! Every decision the scheduler commits to can be described as a set of
//! categorical [`Feature`]s naming the selection rules that fired. Events
//! are handed to a [`DecisionSink`], which must never block the scheduling
//! path. [`ChannelSink`] queues them for a [`ScorerWorker`] that forwards
//! them to an external scorer and logs whether its prediction agreed.

mod scorer;

pub use scorer::{parse_prediction, parse_step_stores, Prediction, ScorerWorker, Verdict};

use crate::cluster::StoreId;
use crate::selector::SelectionReason;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

/// Feature type understood by the scorer
pub const CATEGORY: &str = "Category";

/// One categorical feature of a decision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feature {
    pub feature_type: String,
    pub name: String,
    pub value: String,
}

impl Feature {
    pub fn category(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            feature_type: CATEGORY.to_string(),
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Features describing a destination selection from `src_store`.
///
/// Selection ending on a store with no hot region carries no source
/// feature.
pub fn features_for(reasons: &[SelectionReason], src_store: StoreId) -> Vec<Feature> {
    let mut features = Vec::with_capacity(reasons.len() * 2 + 1);
    for reason in reasons {
        match reason {
            SelectionReason::FewerRegions(id) => {
                features.push(Feature::category(format!("hotRegionsCount{}", id), "true"));
                features.push(Feature::category(format!("minRegionsCount{}", id), "true"));
            }
            SelectionReason::LowerFlow(id) => {
                features.push(Feature::category(format!("minFlowBytes{}", id), "true"));
                features.push(Feature::category(format!("srcFlowBytes{}", id), "true"));
            }
            SelectionReason::EmptyStore(_) => return features,
        }
    }
    features.push(Feature::category("srcRegion", src_store.to_string()));
    features
}

/// A committed decision, described for the scorer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionEvent {
    /// Human-readable step, e.g. `move peer 7 from store 1 to store 4 as peer 90`
    pub step: String,
    pub features: Vec<Feature>,
    pub source_store: StoreId,
    pub dest_store: StoreId,
}

/// Receiver of decision events; implementations must not block
pub trait DecisionSink: Send + Sync {
    fn emit(&self, event: DecisionEvent);
}

/// Discards every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl DecisionSink for NoopSink {
    fn emit(&self, _event: DecisionEvent) {}
}

/// Queues events on a bounded channel, dropping them when it is full
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<DecisionEvent>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<DecisionEvent>) -> Self {
        Self { tx }
    }
}

impl DecisionSink for ChannelSink {
    fn emit(&self, event: DecisionEvent) {
        if let Err(e) = self.tx.try_send(event) {
            debug!("Dropping decision event: {}", e);
        }
    }
}

/// A sink and the receiving end of its queue
pub fn channel(capacity: usize) -> (ChannelSink, mpsc::Receiver<DecisionEvent>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (ChannelSink::new(tx), rx)
}
