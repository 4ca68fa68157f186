//! Savings group core.
//!
//! Every operation here is a synchronous function over one [`GroupState`]:
//! validate first, then mutate. The service layer serializes calls per
//! group and persists the resulting state, so nothing in this module does
//! I/O or locking.
//!
//! - [`lifecycle`]: pending -> approved -> active -> completed
//! - [`membership`]: invitations, join requests, approvals
//! - [`nomination`]: admin promotion by distinct-nominator quorum
//! - [`rounds`]: per-round contribution tracking
//! - [`payout`]: payout requests and admin voting
//! - [`schedule`]: rotation due dates and order proposals

pub mod capability;
pub mod lifecycle;
pub mod membership;
pub mod nomination;
pub mod payout;
pub mod rounds;
pub mod rules;
pub mod schedule;
pub mod state;
pub mod types;

#[cfg(test)]
mod proptests;

pub use capability::{has_role, require_approved, require_privileged, PRIVILEGED};
pub use lifecycle::{ActivationTerms, NewGroup};
pub use nomination::NominationOutcome;
pub use payout::PayoutCompletion;
pub use rounds::{ContributionReceipt, RoundSummary};
pub use rules::GroupRules;
pub use schedule::{JoinOrder, PayoutOrderStrategy, SeededShuffle};
pub use state::GroupState;
pub use types::*;
