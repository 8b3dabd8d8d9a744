//! PV ledger, carry balances, matching payouts, and the wallet ledger.

use crate::domain::{Decimal, LegSide, MemberId, TimeMs};
use serde::{Deserialize, Serialize};

/// Append-only record of PV credited to one ancestor's leg.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PvLedgerEntry {
    pub member_id: MemberId,
    pub side: LegSide,
    pub amount: i64,
    /// Activation event key; `(source_event, member_id)` is unique.
    pub source_event: String,
    pub source_member_id: MemberId,
    pub time_ms: TimeMs,
}

/// Unmatched PV per leg. `version` increases on every credit and every match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CarryBalance {
    pub left: i64,
    pub right: i64,
    pub version: i64,
}

impl CarryBalance {
    pub fn get(&self, side: LegSide) -> i64 {
        match side {
            LegSide::Left => self.left,
            LegSide::Right => self.right,
        }
    }
}

/// One binary matching run that paid out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchingPayout {
    pub member_id: MemberId,
    pub matched_pv: i64,
    pub rate: Decimal,
    pub amount: Decimal,
    pub left_after: i64,
    pub right_after: i64,
    /// Carry version this payout consumed.
    pub carry_version: i64,
    pub time_ms: TimeMs,
}

/// Wallet balances. Spendable = `available`; `held` backs pending withdrawals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WalletBalance {
    pub available: Decimal,
    pub held: Decimal,
    pub total_earned: Decimal,
    pub version: i64,
}

impl WalletBalance {
    /// Total balance owned by the member, including held funds.
    pub fn total(&self) -> Decimal {
        self.available + self.held
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    MatchingIncome,
    WithdrawalHold,
    WithdrawalRelease,
    WithdrawalPaid,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::MatchingIncome => "matching_income",
            TransactionKind::WithdrawalHold => "withdrawal_hold",
            TransactionKind::WithdrawalRelease => "withdrawal_release",
            TransactionKind::WithdrawalPaid => "withdrawal_paid",
        }
    }

    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "matching_income" => Some(TransactionKind::MatchingIncome),
            "withdrawal_hold" => Some(TransactionKind::WithdrawalHold),
            "withdrawal_release" => Some(TransactionKind::WithdrawalRelease),
            "withdrawal_paid" => Some(TransactionKind::WithdrawalPaid),
            _ => None,
        }
    }
}

/// Append-only wallet ledger row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletTransaction {
    pub id: i64,
    pub member_id: MemberId,
    pub kind: TransactionKind,
    pub amount: Decimal,
    pub reference: String,
    pub time_ms: TimeMs,
}
