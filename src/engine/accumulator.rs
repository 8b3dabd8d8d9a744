//! PV accumulation: turns one activation into a credit for every ancestor.

use crate::domain::{AncestorStep, MemberId, PvLedgerEntry, TimeMs};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccumulationError {
    #[error("activation pv must be positive, got {0}")]
    NonPositivePv(i64),
    #[error("activation event key must not be empty")]
    EmptyEventKey,
}

/// Ledger entries for an activation of `pv` by `source`, one per step of `path`.
///
/// `path` is the upward walk from `source` to the root; each ancestor is
/// credited on the side through which `source` descends from it.
pub fn plan_credits(
    source: MemberId,
    pv: i64,
    event_key: &str,
    path: &[AncestorStep],
    time_ms: TimeMs,
) -> Result<Vec<PvLedgerEntry>, AccumulationError> {
    if pv <= 0 {
        return Err(AccumulationError::NonPositivePv(pv));
    }
    if event_key.trim().is_empty() {
        return Err(AccumulationError::EmptyEventKey);
    }

    Ok(path
        .iter()
        .map(|step| PvLedgerEntry {
            member_id: step.ancestor,
            side: step.side,
            amount: pv,
            source_event: event_key.to_string(),
            source_member_id: source,
            time_ms,
        })
        .collect())
}
