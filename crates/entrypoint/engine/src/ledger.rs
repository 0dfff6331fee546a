//! The ledger state the entrypoint executes against.
//!
//! The storage engine itself is a collaborator: the entrypoint only relies on the
//! [`LedgerRead`] and [`Ledger`] contracts. [`InMemoryLedger`] is a journaled reference
//! implementation used by the simulator and the tests.
use std::collections::BTreeMap;

use alloy_primitives::{Address, U256};
use auto_impl::auto_impl;
use entrypoint_primitives::SnapshotId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Address of a single ledger value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StateKey {
    /// A storage slot owned by `address`.
    Storage { address: Address, slot: U256 },
    /// The native balance of `address`.
    Balance { address: Address },
}

impl StateKey {
    pub const fn storage(address: Address, slot: U256) -> Self {
        Self::Storage { address, slot }
    }

    pub const fn balance(address: Address) -> Self {
        Self::Balance { address }
    }

    pub const fn address(&self) -> Address {
        match self {
            Self::Storage { address, .. } | Self::Balance { address } => *address,
        }
    }
}

/// Ledger failures. Every variant is fatal to the bundle that hits it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("unknown {0}")]
    UnknownSnapshot(SnapshotId),
    #[error("storage corruption: {0}")]
    Corruption(String),
}

/// Read access to ledger state.
#[auto_impl(&, &mut, Box, Arc)]
pub trait LedgerRead {
    /// Reads a value. Keys that were never written read as zero.
    fn read(&self, key: &StateKey) -> Result<U256, LedgerError>;
}

/// Transactional write access to ledger state.
#[auto_impl(&mut, Box)]
pub trait Ledger: LedgerRead {
    fn write(&mut self, key: StateKey, value: U256) -> Result<(), LedgerError>;

    /// Records the current state so it can be restored with [`Ledger::revert_to`].
    fn snapshot(&mut self) -> SnapshotId;

    /// Restores the state recorded by `snapshot`.
    ///
    /// Snapshots taken after `snapshot` are invalidated; `snapshot` itself stays usable.
    fn revert_to(&mut self, snapshot: SnapshotId) -> Result<(), LedgerError>;

    /// Makes all pending writes durable and invalidates every snapshot.
    fn commit(&mut self) -> Result<(), LedgerError>;
}

#[derive(Debug, Clone)]
struct JournalEntry {
    key: StateKey,
    previous: Option<U256>,
}

/// In-memory ledger with a write journal for snapshots.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLedger {
    /// Durable state.
    committed: BTreeMap<StateKey, U256>,
    /// Uncommitted writes layered over `committed`.
    pending: BTreeMap<StateKey, U256>,
    journal: Vec<JournalEntry>,
    /// Live snapshots with the journal length they were taken at, ordered by id.
    checkpoints: Vec<(SnapshotId, usize)>,
    next_snapshot: u64,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds committed state.
    pub fn with_state(state: impl IntoIterator<Item = (StateKey, U256)>) -> Self {
        Self {
            committed: state.into_iter().collect(),
            ..Default::default()
        }
    }

    /// Whether there are uncommitted writes.
    pub fn is_dirty(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Value as of the last commit, ignoring pending writes.
    pub fn committed(&self, key: &StateKey) -> U256 {
        self.committed.get(key).copied().unwrap_or_default()
    }

    /// Iterates the current view of state, pending writes included.
    pub fn entries(&self) -> impl Iterator<Item = (StateKey, U256)> + '_ {
        let mut merged = self.committed.clone();
        merged.extend(self.pending.iter().map(|(k, v)| (*k, *v)));
        merged.into_iter()
    }
}

impl LedgerRead for InMemoryLedger {
    fn read(&self, key: &StateKey) -> Result<U256, LedgerError> {
        Ok(self
            .pending
            .get(key)
            .or_else(|| self.committed.get(key))
            .copied()
            .unwrap_or_default())
    }
}

impl Ledger for InMemoryLedger {
    fn write(&mut self, key: StateKey, value: U256) -> Result<(), LedgerError> {
        let previous = self.pending.insert(key, value);
        self.journal.push(JournalEntry { key, previous });
        Ok(())
    }

    fn snapshot(&mut self) -> SnapshotId {
        let id = SnapshotId(self.next_snapshot);
        self.next_snapshot += 1;
        self.checkpoints.push((id, self.journal.len()));
        id
    }

    fn revert_to(&mut self, snapshot: SnapshotId) -> Result<(), LedgerError> {
        let position = self
            .checkpoints
            .iter()
            .rposition(|(id, _)| *id == snapshot)
            .ok_or(LedgerError::UnknownSnapshot(snapshot))?;
        let (_, journal_len) = self.checkpoints[position];

        while self.journal.len() > journal_len {
            let Some(entry) = self.journal.pop() else {
                break;
            };
            match entry.previous {
                Some(value) => self.pending.insert(entry.key, value),
                None => self.pending.remove(&entry.key),
            };
        }

        self.checkpoints.truncate(position + 1);
        Ok(())
    }

    fn commit(&mut self) -> Result<(), LedgerError> {
        self.committed.append(&mut self.pending);
        self.journal.clear();
        self.checkpoints.clear();
        Ok(())
    }
}
