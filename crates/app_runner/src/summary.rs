//! Copy-on-read monitoring snapshot. The round loop publishes an immutable
//! summary after every round; readers swap out the `Arc` under a short
//! lock and never contend with the writer for long.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use core_types::{ClassVec, GameHour, PenaltyNotice};

const HISTORY_CAP: usize = 720;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusSummary {
    pub state: String,
    pub round: i64,
    pub day: i64,
    pub hour: i64,
    pub total_cost: f64,
    pub cumulative_loads: i64,
    pub cumulative_purchases: i64,
    pub anomalies_total: usize,
    pub recent_penalties: Vec<PenaltyNotice>,
    pub inventory: BTreeMap<String, ClassVec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundRecord {
    pub round: i64,
    pub at: GameHour,
    pub wall_clock: chrono::DateTime<chrono::Utc>,
    pub loads_submitted: usize,
    pub kits_loaded: i64,
    pub purchases: ClassVec,
    pub round_cost: f64,
    pub penalties: Vec<PenaltyNotice>,
}

#[derive(Default)]
pub struct SummarySlot {
    current: RwLock<Arc<StatusSummary>>,
    history: RwLock<VecDeque<RoundRecord>>,
}

impl SummarySlot {
    pub fn publish(&self, summary: StatusSummary) {
        *self.current.write() = Arc::new(summary);
    }

    pub fn snapshot(&self) -> Arc<StatusSummary> {
        self.current.read().clone()
    }

    pub fn push_round(&self, record: RoundRecord) {
        let mut history = self.history.write();
        if history.len() == HISTORY_CAP {
            history.pop_front();
        }
        history.push_back(record);
    }

    /// Last `limit` rounds, newest first.
    pub fn recent_rounds(&self, limit: usize) -> Vec<RoundRecord> {
        let history = self.history.read();
        history.iter().rev().take(limit).cloned().collect()
    }
}
