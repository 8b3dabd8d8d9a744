//! KYC submission and review.

use crate::db::repo::ReviewTransition;
use crate::db::Repository;
use crate::domain::{KycDocuments, KycRecord, MemberId, TimeMs};
use crate::error::ServiceError;
use crate::notify::{Dispatcher, Notification};
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub struct KycDesk {
    repo: Arc<Repository>,
    notifications: Dispatcher,
}

fn require(field: &str, value: &str) -> Result<(), ServiceError> {
    if value.trim().is_empty() {
        return Err(ServiceError::Validation(format!("{} is required", field)));
    }
    Ok(())
}

fn validate(documents: &KycDocuments) -> Result<(), ServiceError> {
    require("panNumber", &documents.pan_number)?;
    require("aadhaarNumber", &documents.aadhaar_number)?;
    require("accountHolder", &documents.bank.account_holder)?;
    require("accountNumber", &documents.bank.account_number)?;
    require("ifsc", &documents.bank.ifsc)?;
    require("bankName", &documents.bank.bank_name)
}

fn trimmed(documents: &KycDocuments) -> KycDocuments {
    let mut out = documents.clone();
    for field in [
        &mut out.pan_number,
        &mut out.aadhaar_number,
        &mut out.bank.account_holder,
        &mut out.bank.account_number,
        &mut out.bank.ifsc,
        &mut out.bank.bank_name,
    ] {
        *field = field.trim().to_string();
    }
    out.pan_number = out.pan_number.to_uppercase();
    out.bank.ifsc = out.bank.ifsc.to_uppercase();
    out
}

impl KycDesk {
    pub fn new(repo: Arc<Repository>, notifications: Dispatcher) -> Self {
        Self { repo, notifications }
    }

    pub async fn status(&self, member: MemberId) -> Result<KycRecord, ServiceError> {
        self.repo
            .get_kyc(member)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("KYC record of member {}", member)))
    }

    pub async fn submit(
        &self,
        member: MemberId,
        documents: &KycDocuments,
        now: TimeMs,
    ) -> Result<KycRecord, ServiceError> {
        validate(documents)?;
        let documents = trimmed(documents);

        match self.repo.submit_kyc(member, &documents, now).await? {
            ReviewTransition::Applied(record) => {
                info!(member_id = %member, "KYC submitted");
                Ok(record)
            }
            ReviewTransition::NotFound => {
                Err(ServiceError::NotFound(format!("KYC record of member {}", member)))
            }
            ReviewTransition::AlreadyProcessed | ReviewTransition::Inconsistent(_) => Err(
                ServiceError::State("KYC is already pending review or active".to_string()),
            ),
        }
    }

    /// Approve (`approve = true`) or reject a pending KYC record.
    pub async fn review(
        &self,
        member: MemberId,
        reviewer: MemberId,
        approve: bool,
        remarks: Option<&str>,
        now: TimeMs,
    ) -> Result<KycRecord, ServiceError> {
        let remarks = remarks.map(str::trim).filter(|r| !r.is_empty());
        let record = match self
            .repo
            .review_kyc(member, reviewer, approve, remarks, now)
            .await?
        {
            ReviewTransition::Applied(record) => record,
            ReviewTransition::NotFound => {
                return Err(ServiceError::NotFound(format!(
                    "KYC record of member {}",
                    member
                )))
            }
            ReviewTransition::AlreadyProcessed | ReviewTransition::Inconsistent(_) => {
                return Err(ServiceError::already_processed(&format!(
                    "KYC of member {}",
                    member
                )))
            }
        };

        info!(
            member_id = %member,
            reviewer_id = %reviewer,
            status = record.status.as_str(),
            "KYC reviewed"
        );
        self.notifications.send(Notification::KycReviewed {
            member_id: member,
            approved: approve,
        });
        Ok(record)
    }
}
