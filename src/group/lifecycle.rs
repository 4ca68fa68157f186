//! Group lifecycle.
//!
//! ```text
//! pending -> approved -> active -> completed
//! ```
//!
//! - `pending -> approved`: creator only, once enough members are approved.
//! - `approved -> active`: admin or creator, with contribution terms and an
//!   explicit payout order covering exactly the approved members. Activation
//!   freezes the order, builds the schedule and opens round 1.
//! - `active -> completed`: driven by the final round's payout completing.
//!
//! There is no way back and no skipping ahead.

use crate::error::{ChamaError, ChamaResult};
use crate::group::capability::require_privileged;
use crate::group::rounds;
use crate::group::rules::GroupRules;
use crate::group::schedule::build_schedule;
use crate::group::state::GroupState;
use crate::group::types::{
    Amount, Group, GroupId, GroupStatus, Member, MemberId, MemberStatus, Role, Timestamp, UserId,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::info;

/// Parameters for a new group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewGroup {
    pub creator: UserId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Pooled wallet address provisioned by the wallet collaborator.
    #[serde(default)]
    pub wallet: String,
    /// Creator's personal wallet.
    #[serde(default)]
    pub creator_wallet: String,
    #[serde(default)]
    pub min_members: Option<u32>,
    #[serde(default)]
    pub max_members: Option<u32>,
}

/// Terms fixed at activation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivationTerms {
    pub contribution_amount: Amount,
    pub contribution_period_days: u32,
    pub payout_order: Vec<MemberId>,
}

/// Create a pending group whose creator is its first approved member.
pub fn create_group(rules: &GroupRules, new: NewGroup, now: Timestamp) -> ChamaResult<GroupState> {
    let name = new.name.trim();
    if name.is_empty() {
        return Err(ChamaError::InvalidGroupDefinition(
            "name must not be empty".to_string(),
        ));
    }
    let min_members = new.min_members.unwrap_or(rules.default_min_members);
    let max_members = new.max_members.unwrap_or(rules.default_max_members);
    if min_members == 0 {
        return Err(ChamaError::InvalidGroupDefinition(
            "min_members must be at least 1".to_string(),
        ));
    }
    if min_members > max_members {
        return Err(ChamaError::InvalidGroupDefinition(format!(
            "min_members ({}) exceeds max_members ({})",
            min_members, max_members
        )));
    }

    let group = Group {
        id: GroupId::new(),
        name: name.to_string(),
        description: new.description,
        wallet: new.wallet,
        creator: new.creator,
        status: GroupStatus::Pending,
        is_approved: false,
        contribution_amount: 0,
        contribution_period_days: 0,
        min_members,
        max_members,
        payout_order: Vec::new(),
        current_round: 0,
        activated_at: None,
        next_contribution_date: None,
        created_at: now,
    };
    let creator = Member {
        id: MemberId::new(),
        group: group.id,
        user: new.creator,
        wallet: new.creator_wallet,
        role: Role::Creator,
        status: MemberStatus::Approved,
        joined_at: now,
    };

    info!(group = %group.id, name = %group.name, min_members, max_members, "group created");
    Ok(GroupState::new(group, creator))
}

/// `pending -> approved`.
///
/// Only the creator may approve, and only once `min_members` members are
/// approved (the creator counts). Approving twice fails with
/// `AlreadyApproved`.
pub fn approve_group(state: &mut GroupState, actor: MemberId) -> ChamaResult<Group> {
    let member = state.member(&actor)?;
    if member.role != Role::Creator || member.user != state.group.creator {
        return Err(ChamaError::NotCreator(actor));
    }
    if state.group.is_approved || state.group.status != GroupStatus::Pending {
        return Err(ChamaError::AlreadyApproved);
    }

    let approved = state.approved_count();
    let required = state.group.min_members;
    if approved < required {
        return Err(ChamaError::NotEnoughMembers { required, approved });
    }

    transition(&mut state.group, GroupStatus::Approved)?;
    state.group.is_approved = true;

    info!(group = %state.id(), approved_members = approved, "group approved");
    Ok(state.group.clone())
}

/// `approved -> active`.
pub fn activate_group(
    state: &mut GroupState,
    actor: MemberId,
    terms: ActivationTerms,
    now: Timestamp,
) -> ChamaResult<Group> {
    require_privileged(state.member(&actor)?, "activate the group")?;
    if state.group.status != GroupStatus::Approved {
        return Err(ChamaError::InvalidTransition {
            from: state.group.status,
            to: GroupStatus::Active,
        });
    }
    if terms.contribution_amount == 0 {
        return Err(ChamaError::InvalidContributionTerms(
            "contribution_amount must be greater than zero".to_string(),
        ));
    }
    if terms.contribution_period_days == 0 {
        return Err(ChamaError::InvalidContributionTerms(
            "contribution_period_days must be greater than zero".to_string(),
        ));
    }
    validate_payout_order(state, &terms.payout_order)?;

    let schedule = build_schedule(
        state.id(),
        &terms.payout_order,
        terms.contribution_amount,
        terms.contribution_period_days,
        now,
    )?;
    let next_due = schedule.get(1).map(|entry| entry.due_date);

    transition(&mut state.group, GroupStatus::Active)?;
    state.group.contribution_amount = terms.contribution_amount;
    state.group.contribution_period_days = terms.contribution_period_days;
    state.group.payout_order = terms.payout_order;
    state.group.activated_at = Some(now);
    state.group.next_contribution_date = next_due;
    state.schedule = schedule;
    rounds::open_round(state, 1)?;

    info!(
        group = %state.id(),
        rounds = state.group.total_rounds(),
        contribution_amount = state.group.contribution_amount,
        period_days = state.group.contribution_period_days,
        "group activated"
    );
    Ok(state.group.clone())
}

/// `active -> completed`, once every round has paid out.
pub fn complete_group(state: &mut GroupState) -> ChamaResult<Group> {
    transition(&mut state.group, GroupStatus::Completed)?;
    state.group.next_contribution_date = None;

    info!(group = %state.id(), rounds = state.group.total_rounds(), "group completed");
    Ok(state.group.clone())
}

/// Check that `order` is an exact permutation of the approved members.
pub fn validate_payout_order(state: &GroupState, order: &[MemberId]) -> ChamaResult<()> {
    if order.is_empty() {
        return Err(ChamaError::InvalidPayoutOrder(
            "payout order is empty".to_string(),
        ));
    }

    let mut seen = BTreeSet::new();
    for id in order {
        if !seen.insert(*id) {
            return Err(ChamaError::InvalidPayoutOrder(format!(
                "member {} appears more than once",
                id
            )));
        }
        match state.members.get(id) {
            Some(member) if member.status == MemberStatus::Approved => {}
            _ => {
                return Err(ChamaError::InvalidPayoutOrder(format!(
                    "{} is not an approved member",
                    id
                )))
            }
        }
    }

    let approved = state.approved_count() as usize;
    if order.len() != approved {
        return Err(ChamaError::InvalidPayoutOrder(format!(
            "order lists {} members but {} are approved",
            order.len(),
            approved
        )));
    }
    Ok(())
}

fn transition(group: &mut Group, next: GroupStatus) -> ChamaResult<()> {
    if !group.status.can_transition_to(next) {
        return Err(ChamaError::InvalidTransition {
            from: group.status,
            to: next,
        });
    }
    group.status = next;
    Ok(())
}
