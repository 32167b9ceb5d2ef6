//! Migration decisions produced by the scheduler
//!
//! An [`Operator`] is handed to the operation-execution collaborator, which
//! turns its [`OperatorStep`] into an executable command and tracks it
//! against the budgets named in [`Operator::kinds`].

use crate::cluster::{Peer, RegionEpoch, RegionId, RegionInfo, StoreId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Concurrency budget an operator counts against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpKind {
    /// Any operator issued by a hot-region scheduler
    HotRegion,
    /// Operators that move replicas
    Region,
    /// Operators that transfer leadership
    Leader,
}

impl OpKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OpKind::HotRegion => "hot_region",
            OpKind::Region => "region",
            OpKind::Leader => "leader",
        }
    }
}

/// The single step of a hot-region operator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OperatorStep {
    /// Add `dest_peer` and remove `source_peer`
    MovePeer { source_peer: Peer, dest_peer: Peer },
    /// Hand leadership from one store to another
    TransferLeader { from_store: StoreId, to_store: StoreId },
}

impl OperatorStep {
    pub fn source_store(&self) -> StoreId {
        match self {
            OperatorStep::MovePeer { source_peer, .. } => source_peer.store_id,
            OperatorStep::TransferLeader { from_store, .. } => *from_store,
        }
    }

    pub fn dest_store(&self) -> StoreId {
        match self {
            OperatorStep::MovePeer { dest_peer, .. } => dest_peer.store_id,
            OperatorStep::TransferLeader { to_store, .. } => *to_store,
        }
    }
}

impl fmt::Display for OperatorStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperatorStep::MovePeer {
                source_peer,
                dest_peer,
            } => write!(
                f,
                "move peer {} from store {} to store {} as peer {}",
                source_peer.id, source_peer.store_id, dest_peer.store_id, dest_peer.id
            ),
            OperatorStep::TransferLeader {
                from_store,
                to_store,
            } => write!(
                f,
                "transfer leader from store {} to store {}",
                from_store, to_store
            ),
        }
    }
}

/// A migration decision for one region
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operator {
    /// Short description, e.g. `move-hot-write-region`
    pub desc: String,
    pub region_id: RegionId,
    /// Epoch observed when the decision was made
    pub region_epoch: RegionEpoch,
    /// Budgets this operator counts against while in flight
    pub kinds: Vec<OpKind>,
    pub step: OperatorStep,
}

impl Operator {
    /// Move the region's peer on `source_peer.store_id` to `dest_peer`
    pub fn move_peer(desc: &str, region: &RegionInfo, source_peer: Peer, dest_peer: Peer) -> Self {
        Self {
            desc: desc.to_string(),
            region_id: region.id,
            region_epoch: region.epoch,
            kinds: vec![OpKind::HotRegion, OpKind::Region],
            step: OperatorStep::MovePeer {
                source_peer,
                dest_peer,
            },
        }
    }

    /// Transfer the region's leadership between two stores
    pub fn transfer_leader(
        desc: &str,
        region: &RegionInfo,
        from_store: StoreId,
        to_store: StoreId,
    ) -> Self {
        Self {
            desc: desc.to_string(),
            region_id: region.id,
            region_epoch: region.epoch,
            kinds: vec![OpKind::HotRegion, OpKind::Leader],
            step: OperatorStep::TransferLeader {
                from_store,
                to_store,
            },
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (region {}): {}", self.desc, self.region_id, self.step)
    }
}
