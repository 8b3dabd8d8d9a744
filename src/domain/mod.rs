//! Domain types for the binary tree, PV ledger, wallet, and review workflows.
//!
//! This module provides:
//! - Lossless money handling via the Decimal wrapper
//! - Domain primitives: TimeMs, MemberId, LegSide, Role
//! - Tree, ledger, and admin-reviewed request types

pub mod decimal;
pub mod ledger;
pub mod member;
pub mod primitives;
pub mod review;

pub use decimal::Decimal;
pub use ledger::{
    CarryBalance, MatchingPayout, PvLedgerEntry, TransactionKind, WalletBalance,
    WalletTransaction,
};
pub use member::{AncestorStep, Member, NewMember, NodeSlots, Placement, TeamNode};
pub use primitives::{LegSide, LegSideParseError, MemberId, Role, TimeMs};
pub use review::{
    BankDetails, KycDocuments, KycRecord, KycStatus, Plan, ReviewStatus, TopUpRequest,
    WithdrawalRequest,
};
