//! Per-sender failure tracking and bans.
//!
//! The ledger outlives individual bundles: it is a cloneable handle over shared state
//! that is handed to the controller and may be queried concurrently by admission.
use std::{collections::HashMap, sync::Arc};

use alloy_primitives::{Address, U256};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Consecutive failures after which a sender is banned.
pub const DEFAULT_BAN_THRESHOLD: u32 = 3;

/// Length of a ban, in the same unit as the timestamps passed in (seconds).
pub const DEFAULT_BAN_DURATION: u64 = 3_600;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThrottleConfig {
    /// Consecutive failures that trigger a ban. `0` disables bans.
    pub ban_threshold: u32,
    pub ban_duration: u64,
    /// Whether a ban marks the sender's stake for slashing.
    pub slash_on_ban: bool,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            ban_threshold: DEFAULT_BAN_THRESHOLD,
            ban_duration: DEFAULT_BAN_DURATION,
            slash_on_ban: true,
        }
    }
}

/// Everything the ledger knows about one sender.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThrottleRecord {
    pub consecutive_failures: u32,
    pub total_failures: u64,
    pub banned_until: Option<u64>,
    pub stake_held: U256,
    pub slash_pending: bool,
}

impl ThrottleRecord {
    /// Whether a ban is in force at `at`. The ban ends at `banned_until`, exclusive.
    pub fn is_banned(&self, at: u64) -> bool {
        self.banned_until.is_some_and(|until| at < until)
    }
}

/// Reputation of a sender at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ReputationStatus {
    Ok,
    /// Has failed recently but is still admitted.
    Throttled,
    Banned,
}

#[derive(Debug, Clone, Default)]
pub struct ThrottleLedger {
    records: Arc<RwLock<HashMap<Address, ThrottleRecord>>>,
    config: ThrottleConfig,
}

impl ThrottleLedger {
    pub fn new(config: ThrottleConfig) -> Self {
        Self {
            records: Default::default(),
            config,
        }
    }

    pub const fn config(&self) -> &ThrottleConfig {
        &self.config
    }

    /// Counts a failed post-execution validation against `sender`.
    ///
    /// Returns the updated record. Reaching the threshold bans the sender from `now` for
    /// the configured duration; failing again while banned extends the ban.
    pub fn record_failure(&self, sender: Address, now: u64) -> ThrottleRecord {
        let mut records = self.records.write();
        let record = records.entry(sender).or_default();
        record.consecutive_failures = record.consecutive_failures.saturating_add(1);
        record.total_failures = record.total_failures.saturating_add(1);

        let threshold = self.config.ban_threshold;
        if threshold > 0 && record.consecutive_failures >= threshold {
            let until = now.saturating_add(self.config.ban_duration);
            record.banned_until = Some(until);
            if self.config.slash_on_ban {
                record.slash_pending = true;
            }
            warn!(
                target: "entrypoint::throttle",
                %sender,
                failures = record.consecutive_failures,
                until,
                slash = record.slash_pending,
                "banning sender"
            );
        } else {
            debug!(
                target: "entrypoint::throttle",
                %sender,
                failures = record.consecutive_failures,
                "recorded validation failure"
            );
        }

        record.clone()
    }

    /// Resets the failure streak of `sender`. An active ban is left to expire.
    ///
    /// Returns the updated record, or `None` for a sender that has neither failed nor staked.
    pub fn record_success(&self, sender: Address) -> Option<ThrottleRecord> {
        let mut records = self.records.write();
        let record = records.get_mut(&sender)?;
        record.consecutive_failures = 0;
        Some(record.clone())
    }

    pub fn is_banned(&self, sender: &Address, at: u64) -> bool {
        self.records
            .read()
            .get(sender)
            .is_some_and(|record| record.is_banned(at))
    }

    pub fn banned_until(&self, sender: &Address) -> Option<u64> {
        self.records.read().get(sender).and_then(|r| r.banned_until)
    }

    pub fn status(&self, sender: &Address, at: u64) -> ReputationStatus {
        match self.records.read().get(sender) {
            Some(record) if record.is_banned(at) => ReputationStatus::Banned,
            Some(record) if record.consecutive_failures > 0 => ReputationStatus::Throttled,
            _ => ReputationStatus::Ok,
        }
    }

    /// Snapshot of the record held for `sender`, if any.
    pub fn record(&self, sender: &Address) -> Option<ThrottleRecord> {
        self.records.read().get(sender).cloned()
    }

    pub fn deposit_stake(&self, sender: Address, amount: U256) -> U256 {
        let mut records = self.records.write();
        let record = records.entry(sender).or_default();
        record.stake_held = record.stake_held.saturating_add(amount);
        record.stake_held
    }

    /// Takes the stake of a sender marked for slashing. Returns the amount slashed.
    pub fn slash(&self, sender: &Address) -> U256 {
        let mut records = self.records.write();
        let Some(record) = records.get_mut(sender).filter(|r| r.slash_pending) else {
            return U256::ZERO;
        };
        record.slash_pending = false;
        let slashed = std::mem::take(&mut record.stake_held);
        warn!(target: "entrypoint::throttle", %sender, %slashed, "slashed stake");
        slashed
    }

    /// Snapshot of every record, ordered by sender.
    pub fn records(&self) -> Vec<(Address, ThrottleRecord)> {
        let mut records = self
            .records
            .read()
            .iter()
            .map(|(sender, record)| (*sender, record.clone()))
            .collect::<Vec<_>>();
        records.sort_unstable_by_key(|(sender, _)| *sender);
        records
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}
