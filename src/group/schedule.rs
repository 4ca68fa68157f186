//! Payout scheduler.
//!
//! Derives the due-date schedule for a whole rotation from the frozen payout
//! order. Round `r` pays `payout_order[r - 1]` the full pool
//! (`contribution_amount * member_count`), due
//! `activation + (r - 1) * period_days` days.
//!
//! Ordering strategies only *propose* an order. Activation always takes an
//! explicit caller-supplied order, so a shuffled proposal has to be shown to
//! and confirmed by an admin before it can take effect.

use crate::error::{ChamaError, ChamaResult};
use crate::group::types::{
    Amount, GroupId, Member, MemberId, ScheduleEntry, ScheduleStatus, Timestamp, SECS_PER_DAY,
};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Due date of `round` (1-based).
pub fn due_date(activation: Timestamp, period_days: u32, round: u32) -> Timestamp {
    let offset = u64::from(round.saturating_sub(1))
        .saturating_mul(u64::from(period_days))
        .saturating_mul(SECS_PER_DAY);
    activation.saturating_add(offset)
}

/// Length of the whole rotation in days.
pub fn cycle_length_days(member_count: u32, period_days: u32) -> u64 {
    u64::from(member_count) * u64::from(period_days)
}

/// Pool paid to each round's recipient.
pub fn pool_amount(contribution_amount: Amount, member_count: u32) -> ChamaResult<Amount> {
    contribution_amount
        .checked_mul(u64::from(member_count))
        .ok_or(ChamaError::AmountOverflow)
}

/// Build one schedule row per round.
///
/// Pure: the same inputs always produce the same rows.
pub fn build_schedule(
    group: GroupId,
    payout_order: &[MemberId],
    contribution_amount: Amount,
    period_days: u32,
    activation: Timestamp,
) -> ChamaResult<Vec<ScheduleEntry>> {
    let member_count = payout_order.len() as u32;
    let amount = pool_amount(contribution_amount, member_count)?;

    Ok(payout_order
        .iter()
        .enumerate()
        .map(|(index, member)| {
            let round = index as u32 + 1;
            ScheduleEntry {
                group,
                round,
                member: *member,
                amount,
                due_date: due_date(activation, period_days, round),
                status: ScheduleStatus::Scheduled,
                paid_at: None,
            }
        })
        .collect())
}

/// Proposes a payout order from the approved members.
pub trait PayoutOrderStrategy {
    /// `members` arrive in join order.
    fn propose(&self, members: &[&Member]) -> Vec<MemberId>;
}

/// Earliest joiner is paid first.
#[derive(Debug, Clone, Copy, Default)]
pub struct JoinOrder;

impl PayoutOrderStrategy for JoinOrder {
    fn propose(&self, members: &[&Member]) -> Vec<MemberId> {
        members.iter().map(|m| m.id).collect()
    }
}

/// Shuffle driven by an explicit seed so a proposal can be reproduced.
#[derive(Debug, Clone, Copy)]
pub struct SeededShuffle {
    pub seed: u64,
}

impl SeededShuffle {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }
}

impl PayoutOrderStrategy for SeededShuffle {
    fn propose(&self, members: &[&Member]) -> Vec<MemberId> {
        let mut order: Vec<MemberId> = members.iter().map(|m| m.id).collect();
        let mut rng = StdRng::seed_from_u64(self.seed);
        order.shuffle(&mut rng);
        order
    }
}
