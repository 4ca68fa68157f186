//! Property-based tests for the group core
//!
//! Tests for:
//! - Nomination: promotion iff distinct nominators reach the threshold
//! - Activation: only exact permutations of approved members are accepted
//! - Schedule: determinism, spacing and pool amounts
//! - Payout: a single veto always rejects

use super::fixtures;
use super::lifecycle::{activate_group, ActivationTerms};
use super::nomination::{distinct_nominators, nominate};
use super::payout::{create_scheduled_request, vote};
use super::rules::GroupRules;
use super::schedule::{build_schedule, PayoutOrderStrategy, SeededShuffle};
use super::types::{GroupId, MemberId, PayoutStatus, Role, SECS_PER_DAY};
use proptest::prelude::*;
use std::collections::BTreeSet;

// ============================================================================
// NOMINATION
// ============================================================================

proptest! {
    /// Property: role becomes admin iff distinct nominators >= threshold
    /// Repeated pairs are rejected and never advance the count.
    #[test]
    fn nomination_promotes_on_distinct_quorum(
        pairs in prop::collection::vec((0usize..6, 0usize..6), 0..40),
        threshold in 1usize..4,
    ) {
        let rules = GroupRules { promotion_threshold: threshold, ..GroupRules::default() };
        let mut state = fixtures::pending_group(5);
        let ids = fixtures::approved_member_ids(&state);
        let creator = ids[0];

        for (from, to) in pairs {
            let (nominator, nominee) = (ids[from], ids[to]);
            let before = state.nominations.len();
            let was_admin = state.member(&nominee).unwrap().role != Role::Member;
            match nominate(&mut state, &rules, nominator, nominee, 0) {
                Ok(outcome) => {
                    prop_assert_eq!(outcome.role, state.member(&nominee).unwrap().role);
                    if was_admin {
                        prop_assert_eq!(state.nominations.len(), before);
                    }
                }
                Err(_) => prop_assert_eq!(state.nominations.len(), before),
            }
        }

        for id in ids.iter().filter(|id| **id != creator) {
            let count = distinct_nominators(&state, *id);
            let role = state.member(id).unwrap().role;
            prop_assert_eq!(role == Role::Admin, count >= threshold);
        }

        let pairs: BTreeSet<_> = state.nominations.iter().map(|n| (n.nominator, n.nominee)).collect();
        prop_assert_eq!(pairs.len(), state.nominations.len(), "No pair is ever recorded twice");
    }
}

// ============================================================================
// ACTIVATION
// ============================================================================

proptest! {
    /// Property: activation accepts exactly the permutations of the approved set
    #[test]
    fn activation_requires_exact_permutation(
        picks in prop::collection::vec(0usize..6, 0..8),
        seed in any::<u64>(),
    ) {
        let mut state = fixtures::approved_group(4);
        let creator = fixtures::creator_id(&state);
        let approved = fixtures::approved_member_ids(&state);
        let foreign = MemberId::new();

        let mut pool = approved.clone();
        pool.push(foreign);
        pool.push(approved[0]);
        let order: Vec<MemberId> = picks.into_iter().map(|i| pool[i]).collect();

        let mut sorted = order.clone();
        sorted.sort();
        let mut expected = approved.clone();
        expected.sort();
        let is_permutation = sorted == expected;

        let result = activate_group(&mut state, creator, ActivationTerms {
            contribution_amount: 10,
            contribution_period_days: 7,
            payout_order: order,
        }, seed % 1_000_000);

        prop_assert_eq!(result.is_ok(), is_permutation);
    }

    /// Property: a seeded shuffle always proposes an acceptable order
    #[test]
    fn seeded_shuffle_proposes_valid_order(seed in any::<u64>(), members in 1u32..8) {
        let mut state = fixtures::approved_group(members.max(3));
        let creator = fixtures::creator_id(&state);
        let proposed = SeededShuffle::new(seed).propose(&state.members_by_join_order());

        let result = activate_group(&mut state, creator, ActivationTerms {
            contribution_amount: 5,
            contribution_period_days: 30,
            payout_order: proposed,
        }, 0);
        prop_assert!(result.is_ok());
    }
}

// ============================================================================
// SCHEDULE
// ============================================================================

proptest! {
    /// Property: schedule is deterministic and evenly spaced
    #[test]
    fn schedule_is_deterministic(
        members in 1usize..30,
        amount in 1u64..1_000_000,
        period in 1u32..90,
        activation in 0u64..2_000_000_000,
    ) {
        let group = GroupId::new();
        let order: Vec<MemberId> = (0..members).map(|_| MemberId::new()).collect();

        let first = build_schedule(group, &order, amount, period, activation).unwrap();
        let second = build_schedule(group, &order, amount, period, activation).unwrap();
        prop_assert_eq!(&first, &second);

        prop_assert_eq!(first.len(), members);
        for (i, entry) in first.iter().enumerate() {
            prop_assert_eq!(entry.round as usize, i + 1);
            prop_assert_eq!(entry.member, order[i]);
            prop_assert_eq!(entry.amount, amount * members as u64);
            prop_assert_eq!(
                entry.due_date,
                activation + i as u64 * u64::from(period) * SECS_PER_DAY
            );
        }
    }
}

// ============================================================================
// PAYOUT
// ============================================================================

proptest! {
    /// Property: one false vote rejects regardless of approvals before it
    #[test]
    fn single_veto_always_rejects(quorum in 1usize..4, approvals_first in 0usize..3) {
        let rules = GroupRules::default().with_payout_quorum(quorum.max(approvals_first + 1));
        let mut state = fixtures::active_group(6, 10, 7);
        let ids = state.group.payout_order.clone();

        // ids[0] is the creator; promote ids[1..4] to admin.
        for nominee in 1..4 {
            let nominators: Vec<MemberId> =
                ids.iter().copied().filter(|m| *m != ids[nominee]).take(2).collect();
            for nominator in nominators {
                nominate(&mut state, &rules, nominator, ids[nominee], 0).unwrap();
            }
        }
        fixtures::fill_round(&mut state, 1);
        let request = create_scheduled_request(&mut state, ids[0], 0).unwrap();

        for admin in ids.iter().take(approvals_first) {
            vote(&mut state, &rules, request.id, *admin, true, 0).unwrap();
        }
        let decided = vote(&mut state, &rules, request.id, ids[3], false, 0).unwrap();
        prop_assert_eq!(decided.status, PayoutStatus::Rejected);
    }
}
