//! JSON shapes returned by the API. Money is rendered as canonical decimal strings.

use crate::domain::{
    BankDetails, KycRecord, KycStatus, MatchingPayout, Member, Plan, TeamNode, TopUpRequest,
    WalletBalance, WalletTransaction, WithdrawalRequest,
};
use serde::{Deserialize, Serialize};

const DEFAULT_PAGE_SIZE: i64 = 50;
const MAX_PAGE_SIZE: i64 = 200;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl PageQuery {
    /// `(limit, offset)` clamped to sane bounds.
    pub fn bounds(&self) -> (i64, i64) {
        let limit = self
            .limit
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);
        (limit, self.offset.unwrap_or(0).max(0))
    }
}

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    pub status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReasonBody {
    pub reason: Option<String>,
    pub remarks: Option<String>,
}

impl ReasonBody {
    pub fn text(&self) -> Option<&str> {
        self.reason.as_deref().or(self.remarks.as_deref())
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberDto {
    pub id: i64,
    pub referral_code: String,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub role: &'static str,
    pub sponsor_id: Option<i64>,
    pub parent_id: Option<i64>,
    pub side: Option<&'static str>,
    pub depth: i64,
    pub plan_id: Option<i64>,
    pub is_active: bool,
    pub activated_at: Option<i64>,
    pub joined_at: i64,
}

impl From<&Member> for MemberDto {
    fn from(m: &Member) -> Self {
        MemberDto {
            id: m.id.as_i64(),
            referral_code: m.referral_code.clone(),
            name: m.name.clone(),
            email: m.email.clone(),
            phone: m.phone.clone(),
            role: m.role.as_str(),
            sponsor_id: m.sponsor_id.map(|id| id.as_i64()),
            parent_id: m.parent_id.map(|id| id.as_i64()),
            side: m.side.map(|s| s.as_str()),
            depth: m.depth,
            plan_id: m.plan_id,
            is_active: m.is_active(),
            activated_at: m.activated_at.map(|t| t.as_ms()),
            joined_at: m.joined_at.as_ms(),
        }
    }
}

/// A tree node. `children` is empty at the depth cut; `has_children` tells the
/// client whether to fetch more.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeNodeDto {
    pub id: i64,
    pub referral_code: String,
    pub name: String,
    pub side: Option<&'static str>,
    pub plan_id: Option<i64>,
    pub is_active: bool,
    pub joined_at: i64,
    pub has_children: bool,
    pub children: Vec<TreeNodeDto>,
}

impl TreeNodeDto {
    pub fn leaf(node: &TeamNode) -> Self {
        TreeNodeDto {
            id: node.id.as_i64(),
            referral_code: node.referral_code.clone(),
            name: node.name.clone(),
            side: node.side.map(|s| s.as_str()),
            plan_id: node.plan_id,
            is_active: node.plan_id.is_some(),
            joined_at: node.joined_at.as_ms(),
            has_children: node.child_count > 0,
            children: Vec::new(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanDto {
    pub id: i64,
    pub name: String,
    pub price: String,
    pub pv: i64,
    pub matching_rate: String,
}

impl From<&Plan> for PlanDto {
    fn from(p: &Plan) -> Self {
        PlanDto {
            id: p.id,
            name: p.name.clone(),
            price: p.price.to_canonical_string(),
            pv: p.pv,
            matching_rate: p.matching_rate.to_canonical_string(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PayoutDto {
    pub matched_pv: i64,
    pub rate: String,
    pub amount: String,
    pub left_carry_after: i64,
    pub right_carry_after: i64,
    pub time_ms: i64,
}

impl From<&MatchingPayout> for PayoutDto {
    fn from(p: &MatchingPayout) -> Self {
        PayoutDto {
            matched_pv: p.matched_pv,
            rate: p.rate.to_canonical_string(),
            amount: p.amount.to_canonical_string(),
            left_carry_after: p.left_after,
            right_carry_after: p.right_after,
            time_ms: p.time_ms.as_ms(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletDto {
    pub available: String,
    pub held: String,
    pub total: String,
    pub total_earned: String,
}

impl From<&WalletBalance> for WalletDto {
    fn from(w: &WalletBalance) -> Self {
        WalletDto {
            available: w.available.to_canonical_string(),
            held: w.held.to_canonical_string(),
            total: w.total().to_canonical_string(),
            total_earned: w.total_earned.to_canonical_string(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionDto {
    pub id: i64,
    pub kind: &'static str,
    pub amount: String,
    pub reference: String,
    pub time_ms: i64,
}

impl From<&WalletTransaction> for TransactionDto {
    fn from(t: &WalletTransaction) -> Self {
        TransactionDto {
            id: t.id,
            kind: t.kind.as_str(),
            amount: t.amount.to_canonical_string(),
            reference: t.reference.clone(),
            time_ms: t.time_ms.as_ms(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopUpDto {
    pub id: i64,
    pub member_id: i64,
    pub plan_id: i64,
    pub amount: String,
    pub payment_reference: Option<String>,
    pub status: &'static str,
    pub reason: Option<String>,
    pub reviewer_id: Option<i64>,
    pub requested_at: i64,
    pub processed_at: Option<i64>,
}

impl From<&TopUpRequest> for TopUpDto {
    fn from(t: &TopUpRequest) -> Self {
        TopUpDto {
            id: t.id,
            member_id: t.member_id.as_i64(),
            plan_id: t.plan_id,
            amount: t.amount.to_canonical_string(),
            payment_reference: t.payment_reference.clone(),
            status: t.status.as_str(),
            reason: t.reason.clone(),
            reviewer_id: t.reviewer_id.map(|id| id.as_i64()),
            requested_at: t.requested_at.as_ms(),
            processed_at: t.processed_at.map(|t| t.as_ms()),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawalDto {
    pub id: i64,
    pub member_id: i64,
    pub amount: String,
    pub status: &'static str,
    pub bank_details: BankDetails,
    pub reason: Option<String>,
    pub approver_id: Option<i64>,
    pub requested_at: i64,
    pub processed_at: Option<i64>,
}

impl From<&WithdrawalRequest> for WithdrawalDto {
    fn from(w: &WithdrawalRequest) -> Self {
        WithdrawalDto {
            id: w.id,
            member_id: w.member_id.as_i64(),
            amount: w.amount.to_canonical_string(),
            status: w.status.as_str(),
            bank_details: w.bank.clone(),
            reason: w.reason.clone(),
            approver_id: w.approver_id.map(|id| id.as_i64()),
            requested_at: w.requested_at.as_ms(),
            processed_at: w.processed_at.map(|t| t.as_ms()),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KycDto {
    pub member_id: i64,
    pub status: KycStatus,
    pub pan_number: Option<String>,
    pub aadhaar_number: Option<String>,
    pub bank_details: Option<BankDetails>,
    pub remarks: Option<String>,
    pub reviewer_id: Option<i64>,
    pub submitted_at: Option<i64>,
    pub reviewed_at: Option<i64>,
}

impl From<&KycRecord> for KycDto {
    fn from(k: &KycRecord) -> Self {
        KycDto {
            member_id: k.member_id.as_i64(),
            status: k.status,
            pan_number: k.documents.as_ref().map(|d| d.pan_number.clone()),
            aadhaar_number: k.documents.as_ref().map(|d| d.aadhaar_number.clone()),
            bank_details: k.documents.as_ref().map(|d| d.bank.clone()),
            remarks: k.remarks.clone(),
            reviewer_id: k.reviewer_id.map(|id| id.as_i64()),
            submitted_at: k.submitted_at.map(|t| t.as_ms()),
            reviewed_at: k.reviewed_at.map(|t| t.as_ms()),
        }
    }
}
