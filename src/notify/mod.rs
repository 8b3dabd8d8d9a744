//! Out-of-band notifications for member-facing events.

use crate::domain::{Decimal, MemberId};
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

pub mod dispatch;
pub mod mock;
pub mod webhook;

pub use dispatch::Dispatcher;
pub use mock::MockNotifier;
pub use webhook::WebhookNotifier;

/// An event worth telling a member (or an operator) about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Notification {
    MemberRegistered {
        member_id: MemberId,
        sponsor_id: Option<MemberId>,
    },
    TopUpApproved {
        member_id: MemberId,
        topup_id: i64,
        plan_id: i64,
    },
    TopUpRejected {
        member_id: MemberId,
        topup_id: i64,
        reason: Option<String>,
    },
    MatchingPaid {
        member_id: MemberId,
        matched_pv: i64,
        amount: Decimal,
    },
    WithdrawalRequested {
        member_id: MemberId,
        withdrawal_id: i64,
        amount: Decimal,
    },
    WithdrawalApproved {
        member_id: MemberId,
        withdrawal_id: i64,
        amount: Decimal,
    },
    WithdrawalRejected {
        member_id: MemberId,
        withdrawal_id: i64,
        reason: Option<String>,
    },
    KycReviewed {
        member_id: MemberId,
        approved: bool,
    },
}

impl Notification {
    pub fn member_id(&self) -> MemberId {
        match self {
            Notification::MemberRegistered { member_id, .. }
            | Notification::TopUpApproved { member_id, .. }
            | Notification::TopUpRejected { member_id, .. }
            | Notification::MatchingPaid { member_id, .. }
            | Notification::WithdrawalRequested { member_id, .. }
            | Notification::WithdrawalApproved { member_id, .. }
            | Notification::WithdrawalRejected { member_id, .. }
            | Notification::KycReviewed { member_id, .. } => *member_id,
        }
    }
}

/// Delivery channel for notifications.
///
/// Delivery is best-effort. [`Dispatcher`] calls this off the request path
/// and logs failures.
#[async_trait]
pub trait Notifier: Send + Sync + fmt::Debug {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError>;
}

#[derive(Debug, Clone, Error)]
pub enum NotifyError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("HTTP error {status}")]
    Http { status: u16 },
    #[error("Rate limited")]
    RateLimited,
}

/// Notifier used when no webhook is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn notify(&self, _notification: &Notification) -> Result<(), NotifyError> {
        Ok(())
    }
}
