//! Contribution round tracker.
//!
//! An active group collects one round at a time. Every approved member pays
//! the fixed contribution once per round; when all have paid the round is
//! ready for payout, and once its payout request completes the next round
//! opens.
//!
//! Round status is derived, never stored:
//! `collecting` until `paid_count == required_count`, then
//! `ready_for_payout`, then `completed` after the payout.

use crate::error::{ChamaError, ChamaResult};
use crate::group::capability::require_approved;
use crate::group::schedule::{due_date, pool_amount};
use crate::group::state::GroupState;
use crate::group::types::{
    Amount, ContributionRound, ContributionStatus, MemberId, RoundContribution, RoundStatus,
    Timestamp,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Snapshot of one round's collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundSummary {
    pub round: u32,
    pub required_count: u32,
    pub paid_count: u32,
    pub required_amount: Amount,
    pub total_received: Amount,
    pub status: RoundStatus,
    /// Members who paid, in payment order.
    pub contributors: Vec<MemberId>,
    /// Members still owing, in payout order.
    pub outstanding: Vec<MemberId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContributionReceipt {
    pub contribution: RoundContribution,
    pub round: RoundSummary,
}

/// Open `round` and make it current.
pub(crate) fn open_round(state: &mut GroupState, round: u32) -> ChamaResult<()> {
    let required_count = state.group.total_rounds();
    let required_amount = pool_amount(state.group.contribution_amount, required_count)?;

    state.rounds.insert(
        round,
        ContributionRound {
            group: state.id(),
            round,
            required_amount,
            required_count,
            paid_count: 0,
            total_received: 0,
            payout_completed: false,
        },
    );
    state.group.current_round = round;

    debug!(group = %state.id(), round, required_count, "round opened");
    Ok(())
}

/// Record `member`'s contribution to `round`.
///
/// Only the current round accepts contributions and the amount must match
/// the group's fixed contribution. A member's second contribution to the
/// same round is a `Conflict` and credits nothing.
pub fn record_contribution(
    state: &mut GroupState,
    member: MemberId,
    round: u32,
    amount: Amount,
    now: Timestamp,
) -> ChamaResult<ContributionReceipt> {
    state.ensure_active()?;
    require_approved(state.member(&member)?)?;

    let current = state.group.current_round;
    if round != current {
        return Err(ChamaError::WrongRound {
            expected: current,
            got: round,
        });
    }
    if !state.rounds.contains_key(&round) {
        return Err(ChamaError::RoundNotFound(round));
    }
    if has_confirmed(state, member, round) {
        return Err(ChamaError::DuplicateContribution { member, round });
    }
    let expected = state.group.contribution_amount;
    if amount != expected {
        return Err(ChamaError::WrongAmount {
            expected,
            got: amount,
        });
    }

    let entry = state
        .rounds
        .get_mut(&round)
        .ok_or(ChamaError::RoundNotFound(round))?;
    let total_received = entry
        .total_received
        .checked_add(amount)
        .ok_or(ChamaError::AmountOverflow)?;
    entry.total_received = total_received;
    entry.paid_count += 1;
    let ready = entry.status() == RoundStatus::ReadyForPayout;

    let contribution = RoundContribution {
        group: state.id(),
        member,
        round,
        amount,
        status: ContributionStatus::Confirmed,
        created_at: now,
    };
    state.contributions.push(contribution.clone());

    if ready {
        info!(group = %state.id(), round, total_received, "round fully collected");
    } else {
        debug!(group = %state.id(), round, member = %member, "contribution recorded");
    }

    Ok(ContributionReceipt {
        contribution,
        round: round_status(state, round)?,
    })
}

/// Collection status of an opened round.
pub fn round_status(state: &GroupState, round: u32) -> ChamaResult<RoundSummary> {
    let entry = state
        .rounds
        .get(&round)
        .ok_or(ChamaError::RoundNotFound(round))?;

    let contributors: Vec<MemberId> = state
        .contributions
        .iter()
        .filter(|c| c.round == round && c.status == ContributionStatus::Confirmed)
        .map(|c| c.member)
        .collect();
    let outstanding = state
        .group
        .payout_order
        .iter()
        .filter(|m| !contributors.contains(m))
        .copied()
        .collect();

    Ok(RoundSummary {
        round,
        required_count: entry.required_count,
        paid_count: entry.paid_count,
        required_amount: entry.required_amount,
        total_received: entry.total_received,
        status: entry.status(),
        contributors,
        outstanding,
    })
}

/// Mark `round` as paid out.
pub(crate) fn mark_round_completed(state: &mut GroupState, round: u32) -> ChamaResult<()> {
    let entry = state
        .rounds
        .get_mut(&round)
        .ok_or(ChamaError::RoundNotFound(round))?;
    entry.payout_completed = true;
    Ok(())
}

/// Open the round after the current one.
///
/// Returns the new round number, or `None` when the current round was the
/// last one in the rotation.
pub(crate) fn advance_round(state: &mut GroupState) -> ChamaResult<Option<u32>> {
    let current = state.group.current_round;
    if current >= state.group.total_rounds() {
        return Ok(None);
    }

    let next = current + 1;
    open_round(state, next)?;
    let total_rounds = state.group.total_rounds();
    state.group.next_contribution_date = match state.group.activated_at {
        Some(activation) if next < total_rounds => Some(due_date(
            activation,
            state.group.contribution_period_days,
            next + 1,
        )),
        _ => None,
    };

    info!(group = %state.id(), round = next, "round advanced");
    Ok(Some(next))
}

fn has_confirmed(state: &GroupState, member: MemberId, round: u32) -> bool {
    state.contributions.iter().any(|c| {
        c.member == member && c.round == round && c.status == ContributionStatus::Confirmed
    })
}
