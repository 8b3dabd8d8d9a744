//! Plan activation, PV propagation, and binary matching runs.

use crate::db::repo::{ActivationOutcome, ReviewTransition};
use crate::db::Repository;
use crate::domain::{
    AncestorStep, Decimal, MatchingPayout, MemberId, Plan, TimeMs, TopUpRequest,
};
use crate::engine::compute_match;
use crate::error::ServiceError;
use crate::notify::{Dispatcher, Notification};
use crate::orchestration::CAS_RETRIES;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Runs matching for single nodes and sweeps over the whole tree.
#[derive(Clone)]
pub struct MatchingEngine {
    repo: Arc<Repository>,
    notifications: Dispatcher,
    sweep_concurrency: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    pub scanned: usize,
    pub matched: usize,
    pub failed: usize,
    pub total_paid: Decimal,
}

/// What one applied activation did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivationReport {
    /// False when the event key had been applied before.
    pub applied: bool,
    pub credited: Vec<AncestorStep>,
    pub payouts: Vec<MatchingPayout>,
}

impl MatchingEngine {
    pub fn new(repo: Arc<Repository>, notifications: Dispatcher, sweep_concurrency: usize) -> Self {
        Self {
            repo,
            notifications,
            sweep_concurrency: sweep_concurrency.max(1),
        }
    }

    /// Match `member`'s carries once. None when nothing matched or the member
    /// has no active plan.
    ///
    /// The write compares-and-swaps on the carry version; a concurrent credit or
    /// match forces a re-read.
    pub async fn run_matching(
        &self,
        member: MemberId,
        now: TimeMs,
    ) -> Result<Option<MatchingPayout>, ServiceError> {
        for attempt in 1..=CAS_RETRIES {
            let Some(rate) = self.repo.get_matching_rate(member).await? else {
                debug!(member_id = %member, "Skipping matching for inactive member");
                return Ok(None);
            };
            let carry = self
                .repo
                .get_carry(member)
                .await?
                .ok_or_else(|| ServiceError::NotFound(format!("Member {}", member)))?;

            let Some(outcome) =
                compute_match(&carry, rate).map_err(|e| ServiceError::State(e.to_string()))?
            else {
                return Ok(None);
            };

            if self.repo.commit_match_atomic(member, &outcome, now).await? {
                info!(
                    member_id = %member,
                    matched_pv = outcome.matched_pv,
                    payout = %outcome.payout,
                    left_after = outcome.left_after,
                    right_after = outcome.right_after,
                    "Binary match paid"
                );
                if outcome.payout.is_positive() {
                    self.notifications.send(Notification::MatchingPaid {
                        member_id: member,
                        matched_pv: outcome.matched_pv,
                        amount: outcome.payout,
                    });
                }
                return Ok(Some(MatchingPayout {
                    member_id: member,
                    matched_pv: outcome.matched_pv,
                    rate: outcome.rate,
                    amount: outcome.payout,
                    left_after: outcome.left_after,
                    right_after: outcome.right_after,
                    carry_version: outcome.expected_version,
                    time_ms: now,
                }));
            }

            debug!(member_id = %member, attempt, "Carry changed during matching, retrying");
        }

        Err(ServiceError::Conflict(format!(
            "carry of member {} kept changing during matching",
            member
        )))
    }

    /// Run matching for `members` in order, logging failures.
    ///
    /// Used after an activation has committed; a failed run leaves the carry
    /// intact for the next activation or sweep.
    async fn match_after_activation(&self, members: &[MemberId], now: TimeMs) -> Vec<MatchingPayout> {
        let mut payouts = Vec::new();
        for member in members {
            match self.run_matching(*member, now).await {
                Ok(Some(payout)) => payouts.push(payout),
                Ok(None) => {}
                Err(e) => {
                    warn!(member_id = %member, error = %e, "Matching after activation failed");
                }
            }
        }
        payouts
    }

    /// Apply an activation of `pv` by `member`, then match the member and every
    /// credited ancestor.
    pub async fn apply_activation(
        &self,
        member: MemberId,
        pv: i64,
        event_key: &str,
        now: TimeMs,
    ) -> Result<ActivationReport, ServiceError> {
        if pv <= 0 {
            return Err(ServiceError::Validation(format!(
                "activation pv must be positive, got {}",
                pv
            )));
        }
        if event_key.trim().is_empty() {
            return Err(ServiceError::Validation(
                "activation event key must not be empty".to_string(),
            ));
        }
        if self.repo.get_member(member).await?.is_none() {
            return Err(ServiceError::NotFound(format!("Member {}", member)));
        }

        match self
            .repo
            .apply_activation_atomic(member, pv, event_key, now)
            .await?
        {
            ActivationOutcome::AlreadyApplied => {
                debug!(member_id = %member, event_key, "Activation already applied");
                Ok(ActivationReport {
                    applied: false,
                    credited: Vec::new(),
                    payouts: Vec::new(),
                })
            }
            ActivationOutcome::Applied { credited } => {
                info!(
                    member_id = %member,
                    pv,
                    event_key,
                    ancestors = credited.len(),
                    "PV propagated"
                );
                let payouts = self
                    .match_after_activation(&matching_targets(member, &credited), now)
                    .await;
                Ok(ActivationReport {
                    applied: true,
                    credited,
                    payouts,
                })
            }
        }
    }

    /// Match every node whose legs both hold unmatched PV.
    pub async fn sweep(&self, now: TimeMs) -> Result<SweepReport, ServiceError> {
        let members = self.repo.query_matchable_members().await?;
        let scanned = members.len();

        let results: Vec<_> = stream::iter(members)
            .map(|member| async move { (member, self.run_matching(member, now).await) })
            .buffer_unordered(self.sweep_concurrency)
            .collect()
            .await;

        let mut report = SweepReport {
            scanned,
            ..Default::default()
        };
        for (member, result) in results {
            match result {
                Ok(Some(payout)) => {
                    report.matched += 1;
                    report.total_paid = report.total_paid + payout.amount;
                }
                Ok(None) => {}
                Err(e) => {
                    report.failed += 1;
                    warn!(member_id = %member, error = %e, "Matching sweep failed for member");
                }
            }
        }

        info!(
            scanned = report.scanned,
            matched = report.matched,
            failed = report.failed,
            total_paid = %report.total_paid,
            "Matching sweep finished"
        );
        Ok(report)
    }
}

/// The activating member first, then credited ancestors nearest first.
fn matching_targets(member: MemberId, credited: &[AncestorStep]) -> Vec<MemberId> {
    std::iter::once(member)
        .chain(credited.iter().map(|step| step.ancestor))
        .collect()
}

/// Top-up requests and their admin review.
#[derive(Clone)]
pub struct TopUpDesk {
    repo: Arc<Repository>,
    notifications: Dispatcher,
    matching: MatchingEngine,
}

/// A top-up approval and the activation it caused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopUpApproval {
    pub topup: TopUpRequest,
    pub plan: Plan,
    pub activation: ActivationReport,
}

impl TopUpDesk {
    pub fn new(repo: Arc<Repository>, notifications: Dispatcher, matching: MatchingEngine) -> Self {
        Self {
            repo,
            notifications,
            matching,
        }
    }

    /// Record a pending request to activate `plan_id`. One pending request per member.
    pub async fn request(
        &self,
        member: MemberId,
        plan_id: i64,
        payment_reference: Option<&str>,
        now: TimeMs,
    ) -> Result<TopUpRequest, ServiceError> {
        let plan = self
            .repo
            .get_plan(plan_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Plan {}", plan_id)))?;
        let reference = payment_reference.map(str::trim).filter(|r| !r.is_empty());
        let topup = self
            .repo
            .insert_topup(member, plan.id, plan.price, reference, now)
            .await?
            .ok_or_else(|| {
                ServiceError::Conflict("a top-up request is already pending review".to_string())
            })?;
        info!(member_id = %member, topup_id = topup.id, plan_id = plan.id, "Top-up requested");
        Ok(topup)
    }

    /// Approve a pending top-up: activates the plan, propagates its PV, and runs
    /// matching for the member and every credited ancestor.
    pub async fn approve(
        &self,
        topup_id: i64,
        reviewer: MemberId,
        now: TimeMs,
    ) -> Result<TopUpApproval, ServiceError> {
        let (topup, plan, outcome) = match self
            .repo
            .activate_topup_atomic(topup_id, reviewer, now)
            .await?
        {
            ReviewTransition::Applied(applied) => applied,
            ReviewTransition::NotFound => {
                return Err(ServiceError::NotFound(format!("Top-up {}", topup_id)))
            }
            ReviewTransition::AlreadyProcessed => {
                return Err(ServiceError::already_processed(&format!("top-up {}", topup_id)))
            }
            ReviewTransition::Inconsistent(msg) => return Err(ServiceError::State(msg)),
        };

        info!(
            topup_id,
            member_id = %topup.member_id,
            plan_id = plan.id,
            pv = plan.pv,
            reviewer_id = %reviewer,
            "Top-up approved, plan activated"
        );

        let activation = match outcome {
            ActivationOutcome::Applied { credited } => {
                let payouts = self
                    .matching
                    .match_after_activation(&matching_targets(topup.member_id, &credited), now)
                    .await;
                ActivationReport {
                    applied: true,
                    credited,
                    payouts,
                }
            }
            ActivationOutcome::AlreadyApplied => ActivationReport {
                applied: false,
                credited: Vec::new(),
                payouts: Vec::new(),
            },
        };

        self.notifications.send(Notification::TopUpApproved {
            member_id: topup.member_id,
            topup_id,
            plan_id: plan.id,
        });

        Ok(TopUpApproval {
            topup,
            plan,
            activation,
        })
    }

    pub async fn reject(
        &self,
        topup_id: i64,
        reviewer: MemberId,
        reason: Option<&str>,
        now: TimeMs,
    ) -> Result<TopUpRequest, ServiceError> {
        let reason = reason.map(str::trim).filter(|r| !r.is_empty());
        let topup = match self.repo.reject_topup(topup_id, reviewer, reason, now).await? {
            ReviewTransition::Applied(topup) => topup,
            ReviewTransition::NotFound => {
                return Err(ServiceError::NotFound(format!("Top-up {}", topup_id)))
            }
            ReviewTransition::AlreadyProcessed => {
                return Err(ServiceError::already_processed(&format!("top-up {}", topup_id)))
            }
            ReviewTransition::Inconsistent(msg) => return Err(ServiceError::State(msg)),
        };

        info!(topup_id, member_id = %topup.member_id, reviewer_id = %reviewer, "Top-up rejected");
        self.notifications.send(Notification::TopUpRejected {
            member_id: topup.member_id,
            topup_id,
            reason: topup.reason.clone(),
        });
        Ok(topup)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matching_targets_start_with_activating_member() {
        let credited = vec![
            AncestorStep {
                ancestor: MemberId::new(4),
                side: crate::domain::LegSide::Right,
            },
            AncestorStep {
                ancestor: MemberId::new(1),
                side: crate::domain::LegSide::Left,
            },
        ];
        assert_eq!(
            matching_targets(MemberId::new(9), &credited),
            vec![MemberId::new(9), MemberId::new(4), MemberId::new(1)]
        );
    }
}
