//! Services that drive the repository and engine for each member-facing workflow.

pub mod activation;
pub mod auth;
pub mod kyc;
pub mod registration;
pub mod withdrawals;

pub use activation::{ActivationReport, MatchingEngine, SweepReport, TopUpApproval, TopUpDesk};
pub use auth::{AuthError, Authenticator, Session};
pub use kyc::KycDesk;
pub use registration::{RegisterInput, Registrar};
pub use withdrawals::WithdrawalDesk;

/// Attempts made by compare-and-swap loops before reporting a conflict.
pub const CAS_RETRIES: u32 = 8;
