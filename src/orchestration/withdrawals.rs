//! Withdrawal requests and their admin review.
//!
//! A request moves funds from `available` to `held`. Approval pays the hold out;
//! rejection returns it to `available`. Both transitions are terminal.

use crate::db::repo::ReviewTransition;
use crate::db::Repository;
use crate::domain::{Decimal, KycStatus, MemberId, TimeMs, WithdrawalRequest};
use crate::error::{Policy, ServiceError};
use crate::notify::{Dispatcher, Notification};
use crate::orchestration::CAS_RETRIES;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Clone)]
pub struct WithdrawalDesk {
    repo: Arc<Repository>,
    notifications: Dispatcher,
    min_withdrawal: Decimal,
}

impl WithdrawalDesk {
    pub fn new(repo: Arc<Repository>, notifications: Dispatcher, min_withdrawal: Decimal) -> Self {
        Self {
            repo,
            notifications,
            min_withdrawal,
        }
    }

    /// Create a pending withdrawal of `amount` for `member`.
    ///
    /// Checks, in order: amount shape, configured minimum, KYC status, available
    /// balance. Nothing is written unless all pass.
    pub async fn request(
        &self,
        member: MemberId,
        amount: Decimal,
        now: TimeMs,
    ) -> Result<WithdrawalRequest, ServiceError> {
        if !amount.is_positive() {
            return Err(ServiceError::Validation(
                "withdrawal amount must be positive".to_string(),
            ));
        }
        if !amount.fits_money_scale() {
            return Err(ServiceError::Validation(
                "withdrawal amount may have at most two decimal places".to_string(),
            ));
        }
        if amount < self.min_withdrawal {
            return Err(ServiceError::PolicyViolation {
                policy: Policy::BelowMinimum,
                message: format!("minimum withdrawal is {}", self.min_withdrawal),
            });
        }

        let kyc = self
            .repo
            .get_kyc(member)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Member {}", member)))?;
        let bank = match (kyc.status, kyc.documents) {
            (KycStatus::Active, Some(documents)) => documents.bank,
            (status, _) => {
                return Err(ServiceError::PolicyViolation {
                    policy: Policy::KycNotActive,
                    message: format!("KYC must be active to withdraw (current: {})", status.as_str()),
                })
            }
        };

        for attempt in 1..=CAS_RETRIES {
            let wallet = self
                .repo
                .get_wallet(member)
                .await?
                .ok_or_else(|| ServiceError::NotFound(format!("Wallet of member {}", member)))?;
            if amount > wallet.available {
                return Err(ServiceError::InsufficientBalance {
                    requested: amount.to_canonical_string(),
                    available: wallet.available.to_canonical_string(),
                });
            }

            if let Some(withdrawal) = self
                .repo
                .hold_for_withdrawal_atomic(member, amount, &bank, &wallet, now)
                .await?
            {
                info!(
                    member_id = %member,
                    withdrawal_id = withdrawal.id,
                    amount = %amount,
                    "Withdrawal requested, funds held"
                );
                self.notifications.send(Notification::WithdrawalRequested {
                    member_id: member,
                    withdrawal_id: withdrawal.id,
                    amount,
                });
                return Ok(withdrawal);
            }

            debug!(member_id = %member, attempt, "Wallet changed during withdrawal request, retrying");
        }

        Err(ServiceError::Conflict(format!(
            "wallet of member {} kept changing during withdrawal request",
            member
        )))
    }

    pub async fn approve(
        &self,
        id: i64,
        approver: MemberId,
        now: TimeMs,
    ) -> Result<WithdrawalRequest, ServiceError> {
        let transition = self.repo.approve_withdrawal_atomic(id, approver, now).await?;
        let withdrawal = settle(id, transition)?;

        info!(
            withdrawal_id = id,
            member_id = %withdrawal.member_id,
            amount = %withdrawal.amount,
            approver_id = %approver,
            "Withdrawal approved"
        );
        self.notifications.send(Notification::WithdrawalApproved {
            member_id: withdrawal.member_id,
            withdrawal_id: id,
            amount: withdrawal.amount,
        });
        Ok(withdrawal)
    }

    pub async fn reject(
        &self,
        id: i64,
        approver: MemberId,
        reason: Option<&str>,
        now: TimeMs,
    ) -> Result<WithdrawalRequest, ServiceError> {
        let reason = reason.map(str::trim).filter(|r| !r.is_empty());
        let transition = self
            .repo
            .reject_withdrawal_atomic(id, approver, reason, now)
            .await?;
        let withdrawal = settle(id, transition)?;

        info!(
            withdrawal_id = id,
            member_id = %withdrawal.member_id,
            amount = %withdrawal.amount,
            approver_id = %approver,
            "Withdrawal rejected, hold released"
        );
        self.notifications.send(Notification::WithdrawalRejected {
            member_id: withdrawal.member_id,
            withdrawal_id: id,
            reason: withdrawal.reason.clone(),
        });
        Ok(withdrawal)
    }
}

fn settle(
    id: i64,
    transition: ReviewTransition<WithdrawalRequest>,
) -> Result<WithdrawalRequest, ServiceError> {
    match transition {
        ReviewTransition::Applied(withdrawal) => Ok(withdrawal),
        ReviewTransition::NotFound => Err(ServiceError::NotFound(format!("Withdrawal {}", id))),
        ReviewTransition::AlreadyProcessed => {
            Err(ServiceError::already_processed(&format!("withdrawal {}", id)))
        }
        ReviewTransition::Inconsistent(msg) => Err(ServiceError::State(msg)),
    }
}
