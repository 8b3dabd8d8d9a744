//! Admin-reviewed requests: withdrawals, top-ups, and KYC records.

use crate::domain::{Decimal, MemberId, TimeMs};
use serde::{Deserialize, Serialize};

/// Status of a request awaiting admin review. APPROVED and REJECTED are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewStatus {
    Pending,
    Approved,
    Rejected,
}

impl ReviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewStatus::Pending => "pending",
            ReviewStatus::Approved => "approved",
            ReviewStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Some(ReviewStatus::Pending),
            "approved" => Some(ReviewStatus::Approved),
            "rejected" => Some(ReviewStatus::Rejected),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ReviewStatus::Pending)
    }
}

impl std::fmt::Display for ReviewStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bank details copied from the member's KYC record when a withdrawal is created.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BankDetails {
    pub account_holder: String,
    pub account_number: String,
    pub ifsc: String,
    pub bank_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithdrawalRequest {
    pub id: i64,
    pub member_id: MemberId,
    pub amount: Decimal,
    pub bank: BankDetails,
    pub status: ReviewStatus,
    pub reason: Option<String>,
    pub approver_id: Option<MemberId>,
    pub requested_at: TimeMs,
    pub processed_at: Option<TimeMs>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopUpRequest {
    pub id: i64,
    pub member_id: MemberId,
    pub plan_id: i64,
    pub amount: Decimal,
    pub payment_reference: Option<String>,
    pub status: ReviewStatus,
    pub reason: Option<String>,
    pub reviewer_id: Option<MemberId>,
    pub requested_at: TimeMs,
    pub processed_at: Option<TimeMs>,
}

impl TopUpRequest {
    /// Idempotency key of the PV activation this top-up triggers.
    pub fn activation_event_key(&self) -> String {
        format!("topup:{}", self.id)
    }
}

/// An activation plan a member can buy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub id: i64,
    pub name: String,
    pub price: Decimal,
    pub pv: i64,
    /// Payout per matched PV.
    pub matching_rate: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KycStatus {
    NotSubmitted,
    Pending,
    Active,
    Rejected,
}

impl KycStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            KycStatus::NotSubmitted => "not_submitted",
            KycStatus::Pending => "pending",
            KycStatus::Active => "active",
            KycStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "not_submitted" => Some(KycStatus::NotSubmitted),
            "pending" => Some(KycStatus::Pending),
            "active" => Some(KycStatus::Active),
            "rejected" => Some(KycStatus::Rejected),
            _ => None,
        }
    }

    /// Whether a (re)submission is accepted from this status.
    pub fn accepts_submission(&self) -> bool {
        matches!(self, KycStatus::NotSubmitted | KycStatus::Rejected)
    }
}

/// Identity documents submitted for review.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KycDocuments {
    pub pan_number: String,
    pub aadhaar_number: String,
    pub bank: BankDetails,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KycRecord {
    pub member_id: MemberId,
    pub status: KycStatus,
    pub documents: Option<KycDocuments>,
    pub remarks: Option<String>,
    pub reviewer_id: Option<MemberId>,
    pub submitted_at: Option<TimeMs>,
    pub reviewed_at: Option<TimeMs>,
}
