use thiserror::Error;

use crate::model::completion::CompletionRecord;
use crate::model::ids::{CompletionId, SessionId};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum LedgerError {
    #[error("completion belongs to session {found}, not {expected}")]
    WrongSession { expected: SessionId, found: SessionId },

    #[error("completion {0} is already in the ledger")]
    Duplicate(CompletionId),

    #[error("completion {0} is not in the ledger")]
    Missing(CompletionId),

    #[error("completion {id} is at revision {found}, expected {expected}")]
    StaleRevision {
        id: CompletionId,
        expected: u64,
        found: u64,
    },
}

/// Completion history of one session, ordered by `completed_at` then id.
///
/// The ledger is independent of the session's visibility: soft-deleting a
/// session never truncates it.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionLedger {
    session_id: SessionId,
    records: Vec<CompletionRecord>,
}

impl CompletionLedger {
    #[must_use]
    pub fn new(session_id: SessionId) -> Self {
        Self {
            session_id,
            records: Vec::new(),
        }
    }

    /// Build a ledger from records in any order.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::WrongSession` if a record belongs elsewhere, or
    /// `LedgerError::Duplicate` if an id repeats.
    pub fn from_records(
        session_id: SessionId,
        records: Vec<CompletionRecord>,
    ) -> Result<Self, LedgerError> {
        let mut ledger = Self::new(session_id);
        for record in records {
            ledger.append(record)?;
        }
        Ok(ledger)
    }

    #[must_use]
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    #[must_use]
    pub fn records(&self) -> &[CompletionRecord] {
        &self.records
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[must_use]
    pub fn get(&self, id: CompletionId) -> Option<&CompletionRecord> {
        self.records.iter().find(|r| r.id() == id)
    }

    /// Insert a record at its chronological position.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::WrongSession` or `LedgerError::Duplicate`.
    pub fn append(&mut self, record: CompletionRecord) -> Result<(), LedgerError> {
        if record.session_id() != self.session_id {
            return Err(LedgerError::WrongSession {
                expected: self.session_id,
                found: record.session_id(),
            });
        }
        if self.get(record.id()).is_some() {
            return Err(LedgerError::Duplicate(record.id()));
        }

        let key = (record.completed_at(), record.id());
        let at = self
            .records
            .partition_point(|r| (r.completed_at(), r.id()) <= key);
        self.records.insert(at, record);
        Ok(())
    }

    /// Swap in corrected content, provided nobody else revised it first.
    ///
    /// Returns the record as it was before the replacement.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::Missing` if the id is unknown, or
    /// `LedgerError::StaleRevision` if the stored revision is not `expected_revision`.
    pub fn replace(
        &mut self,
        updated: CompletionRecord,
        expected_revision: u64,
    ) -> Result<CompletionRecord, LedgerError> {
        let slot = self.position_at_revision(updated.id(), expected_revision)?;
        Ok(std::mem::replace(&mut self.records[slot], updated))
    }

    /// Remove a record permanently.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::Missing` if the id is unknown, or
    /// `LedgerError::StaleRevision` if the stored revision is not `expected_revision`.
    pub fn remove(
        &mut self,
        id: CompletionId,
        expected_revision: u64,
    ) -> Result<CompletionRecord, LedgerError> {
        let slot = self.position_at_revision(id, expected_revision)?;
        Ok(self.records.remove(slot))
    }

    fn position_at_revision(
        &self,
        id: CompletionId,
        expected_revision: u64,
    ) -> Result<usize, LedgerError> {
        let slot = self
            .records
            .iter()
            .position(|r| r.id() == id)
            .ok_or(LedgerError::Missing(id))?;
        let found = self.records[slot].revision();
        if found != expected_revision {
            return Err(LedgerError::StaleRevision {
                id,
                expected: expected_revision,
                found,
            });
        }
        Ok(slot)
    }
}
