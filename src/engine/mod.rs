//! Pure computation for tree placement, PV accumulation, and binary matching.

pub mod accumulator;
pub mod matching;
pub mod placement;

pub use accumulator::{plan_credits, AccumulationError};
pub use matching::{compute_match, MatchOutcome, MatchingError};
pub use placement::{PlacementError, PlacementResolver, SlotLookup};
