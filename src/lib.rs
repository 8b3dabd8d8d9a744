pub mod api;
pub mod config;
pub mod db;
pub mod domain;
pub mod engine;
pub mod error;
pub mod notify;
pub mod orchestration;

pub use config::Config;
pub use db::{init_db, Repository};
pub use domain::{
    Decimal, KycStatus, LegSide, Member, MemberId, Plan, ReviewStatus, Role, TimeMs,
};
pub use error::{AppError, ServiceError};
pub use notify::{Dispatcher, MockNotifier, Notification, Notifier, NoopNotifier, WebhookNotifier};
