//! Binary matching: pays `min(left, right) × rate` and carries the remainder forward.

use crate::domain::{CarryBalance, Decimal};
use thiserror::Error;

/// The effect of one matching run on a node, computed from a carry snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchOutcome {
    pub matched_pv: i64,
    pub rate: Decimal,
    pub payout: Decimal,
    pub left_after: i64,
    pub right_after: i64,
    /// Carry version the snapshot was read at; the write must compare-and-swap on it.
    pub expected_version: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MatchingError {
    #[error("matching rate must not be negative, got {0}")]
    NegativeRate(Decimal),
    #[error("carry balance is negative: left {left}, right {right}")]
    NegativeCarry { left: i64, right: i64 },
    #[error("payout overflows for {matched_pv} pv at rate {rate}")]
    PayoutOverflow { matched_pv: i64, rate: Decimal },
}

/// Compute the match for `carry` at `rate`. None when either leg is empty.
pub fn compute_match(
    carry: &CarryBalance,
    rate: Decimal,
) -> Result<Option<MatchOutcome>, MatchingError> {
    if rate.is_negative() {
        return Err(MatchingError::NegativeRate(rate));
    }
    if carry.left < 0 || carry.right < 0 {
        return Err(MatchingError::NegativeCarry {
            left: carry.left,
            right: carry.right,
        });
    }

    let matched_pv = carry.left.min(carry.right);
    if matched_pv == 0 {
        return Ok(None);
    }

    let payout = rate
        .checked_mul_pv(matched_pv)
        .ok_or(MatchingError::PayoutOverflow { matched_pv, rate })?;

    Ok(Some(MatchOutcome {
        matched_pv,
        rate,
        payout,
        left_after: carry.left - matched_pv,
        right_after: carry.right - matched_pv,
        expected_version: carry.version,
    }))
}
