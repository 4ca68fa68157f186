//! Membership registry.
//!
//! Tracks invitations, self-service join requests, and admin approval of
//! memberships. Roles are never changed here; the creator role is assigned
//! once at group creation and admin promotion belongs to the nomination
//! tally.
//!
//! Enrollment closes when the group activates: the payout order is frozen
//! at that point and must keep matching the approved member set.

use crate::error::{ChamaError, ChamaResult};
use crate::group::capability::require_privileged;
use crate::group::rules::GroupRules;
use crate::group::state::GroupState;
use crate::group::types::{
    GroupStatus, Invitation, InvitationId, InvitationStatus, Member, MemberId, MemberStatus,
    Role, Timestamp, UserId,
};
use tracing::{debug, info};

/// Invite an email address to the group (admin/creator only).
pub fn invite(
    state: &mut GroupState,
    rules: &GroupRules,
    inviter: MemberId,
    email: &str,
    now: Timestamp,
) -> ChamaResult<Invitation> {
    ensure_enrollment_open(state)?;
    require_privileged(state.member(&inviter)?, "invite members")?;
    let email = normalize_email(email)?;
    ensure_capacity(state)?;

    let duplicate = state.invitations.values().any(|inv| {
        inv.email == email && inv.status == InvitationStatus::Pending && !inv.is_expired(now)
    });
    if duplicate {
        return Err(ChamaError::DuplicateInvitation(email));
    }

    let invitation = Invitation {
        id: InvitationId::new(),
        group: state.id(),
        inviter,
        email,
        status: InvitationStatus::Pending,
        accepted_by: None,
        created_at: now,
        expires_at: now.saturating_add(rules.invitation_ttl_secs),
    };
    state.invitations.insert(invitation.id, invitation.clone());

    info!(group = %state.id(), invitation = %invitation.id, "invitation issued");
    Ok(invitation)
}

/// Accept an invitation, creating a pending membership for `user`.
pub fn accept_invitation(
    state: &mut GroupState,
    invitation_id: InvitationId,
    user: UserId,
    email: &str,
    wallet: &str,
    now: Timestamp,
) -> ChamaResult<Member> {
    ensure_enrollment_open(state)?;
    let email = normalize_email(email)?;

    let invitation = state
        .invitations
        .get(&invitation_id)
        .ok_or(ChamaError::InvitationNotFound(invitation_id))?;
    if invitation.status != InvitationStatus::Pending {
        return Err(ChamaError::InvitationClosed(invitation_id));
    }
    if invitation.is_expired(now) {
        return Err(ChamaError::InvitationExpired(invitation_id));
    }
    if invitation.email != email {
        return Err(ChamaError::InvitationEmailMismatch(invitation_id));
    }
    if state.member_by_user(&user).is_some() {
        return Err(ChamaError::AlreadyMember(user));
    }
    ensure_capacity(state)?;

    if let Some(invitation) = state.invitations.get_mut(&invitation_id) {
        invitation.status = InvitationStatus::Accepted;
        invitation.accepted_by = Some(user);
    }
    Ok(insert_pending_member(state, user, wallet, now))
}

/// Decline a pending invitation. Only the invited address may decline.
pub fn decline_invitation(
    state: &mut GroupState,
    invitation_id: InvitationId,
    email: &str,
) -> ChamaResult<Invitation> {
    let email = normalize_email(email)?;
    let invitation = state
        .invitations
        .get_mut(&invitation_id)
        .ok_or(ChamaError::InvitationNotFound(invitation_id))?;
    if invitation.status != InvitationStatus::Pending {
        return Err(ChamaError::InvitationClosed(invitation_id));
    }
    if invitation.email != email {
        return Err(ChamaError::InvitationEmailMismatch(invitation_id));
    }
    invitation.status = InvitationStatus::Declined;
    Ok(invitation.clone())
}

/// Self-service join request. The membership starts pending.
pub fn join(
    state: &mut GroupState,
    user: UserId,
    wallet: &str,
    now: Timestamp,
) -> ChamaResult<Member> {
    ensure_enrollment_open(state)?;
    ensure_capacity(state)?;
    if state.member_by_user(&user).is_some() {
        return Err(ChamaError::AlreadyMember(user));
    }
    Ok(insert_pending_member(state, user, wallet, now))
}

/// Approve a pending membership (admin/creator only).
///
/// Fails with `GroupFull` when approved members already equal capacity;
/// nothing is changed in that case.
pub fn approve(state: &mut GroupState, actor: MemberId, member: MemberId) -> ChamaResult<Member> {
    decide(state, actor, member, MemberStatus::Approved)
}

/// Reject a pending membership (admin/creator only).
pub fn reject(state: &mut GroupState, actor: MemberId, member: MemberId) -> ChamaResult<Member> {
    decide(state, actor, member, MemberStatus::Rejected)
}

fn decide(
    state: &mut GroupState,
    actor: MemberId,
    member: MemberId,
    decision: MemberStatus,
) -> ChamaResult<Member> {
    ensure_enrollment_open(state)?;
    require_privileged(state.member(&actor)?, "decide memberships")?;

    let current = state.member(&member)?.status;
    if current != MemberStatus::Pending {
        return Err(ChamaError::MembershipNotPending {
            member,
            status: current,
        });
    }
    if decision == MemberStatus::Approved {
        ensure_capacity(state)?;
    }

    let target = state.member_mut(&member)?;
    target.status = decision;
    let decided = target.clone();

    info!(
        group = %decided.group,
        member = %decided.id,
        status = %decided.status,
        "membership decided"
    );
    Ok(decided)
}

fn insert_pending_member(
    state: &mut GroupState,
    user: UserId,
    wallet: &str,
    now: Timestamp,
) -> Member {
    let member = Member {
        id: MemberId::new(),
        group: state.id(),
        user,
        wallet: wallet.to_string(),
        role: Role::Member,
        status: MemberStatus::Pending,
        joined_at: now,
    };
    state.members.insert(member.id, member.clone());
    debug!(group = %member.group, member = %member.id, "pending membership created");
    member
}

fn ensure_enrollment_open(state: &GroupState) -> ChamaResult<()> {
    match state.group.status {
        GroupStatus::Pending | GroupStatus::Approved => Ok(()),
        frozen => Err(ChamaError::MembershipFrozen(frozen)),
    }
}

fn ensure_capacity(state: &GroupState) -> ChamaResult<()> {
    if state.approved_count() >= state.group.max_members {
        Err(ChamaError::GroupFull {
            max: state.group.max_members,
        })
    } else {
        Ok(())
    }
}

fn normalize_email(email: &str) -> ChamaResult<String> {
    let email = email.trim().to_lowercase();
    let valid = match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.'),
        None => false,
    };
    if valid {
        Ok(email)
    } else {
        Err(ChamaError::InvalidEmail(email))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::group::fixtures;

    #[test]
    fn test_join_creates_pending_member() {
        let mut state = fixtures::pending_group(0);
        let member = join(&mut state, UserId::new(), "GWALLET", 5).unwrap();

        assert_eq!(member.status, MemberStatus::Pending);
        assert_eq!(member.role, Role::Member);
        assert_eq!(member.joined_at, 5);
        assert_eq!(state.approved_count(), 1);
    }

    #[test]
    fn test_join_twice_conflicts() {
        let mut state = fixtures::pending_group(0);
        let user = UserId::new();
        join(&mut state, user, "", 0).unwrap();

        let err = join(&mut state, user, "", 0).unwrap_err();
        assert_eq!(err, ChamaError::AlreadyMember(user));
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[test]
    fn test_approve_and_reject_require_privilege() {
        let mut state = fixtures::pending_group(1);
        let plain = fixtures::approved_member_ids(&state)[1];
        let pending = join(&mut state, UserId::new(), "", 0).unwrap();

        let err = approve(&mut state, plain, pending.id).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);

        let creator = fixtures::creator_id(&state);
        let rejected = reject(&mut state, creator, pending.id).unwrap();
        assert_eq!(rejected.status, MemberStatus::Rejected);
        // Rejected members are kept, never deleted.
        assert!(state.members.contains_key(&pending.id));
    }

    #[test]
    fn test_only_pending_members_can_be_decided() {
        let mut state = fixtures::pending_group(1);
        let creator = fixtures::creator_id(&state);
        let approved = fixtures::approved_member_ids(&state)[1];

        let err = approve(&mut state, creator, approved).unwrap_err();
        assert!(matches!(err, ChamaError::MembershipNotPending { .. }));
    }

    #[test]
    fn test_approve_at_capacity_fails_and_changes_nothing() {
        let mut state = fixtures::pending_group(0);
        state.group.max_members = 3;
        let creator = fixtures::creator_id(&state);
        for _ in 0..2 {
            let m = join(&mut state, UserId::new(), "", 0).unwrap();
            approve(&mut state, creator, m.id).unwrap();
        }
        assert_eq!(state.approved_count(), 3);

        // A pending request slipped in before the group filled up.
        state.group.max_members = 4;
        let late = join(&mut state, UserId::new(), "", 0).unwrap();
        state.group.max_members = 3;

        let before = state.clone();
        let err = approve(&mut state, creator, late.id).unwrap_err();
        assert_eq!(err, ChamaError::GroupFull { max: 3 });
        assert_eq!(err.kind(), ErrorKind::CapacityExceeded);
        assert_eq!(state, before);
    }

    #[test]
    fn test_join_and_invite_refused_when_full() {
        let mut state = fixtures::pending_group(2);
        state.group.max_members = 3;
        let creator = fixtures::creator_id(&state);

        assert_eq!(
            join(&mut state, UserId::new(), "", 0).unwrap_err(),
            ChamaError::GroupFull { max: 3 }
        );
        assert_eq!(
            invite(&mut state, &GroupRules::default(), creator, "a@b.io", 0).unwrap_err(),
            ChamaError::GroupFull { max: 3 }
        );
    }

    #[test]
    fn test_invitation_accept_flow() {
        let rules = GroupRules::default();
        let mut state = fixtures::pending_group(0);
        let creator = fixtures::creator_id(&state);

        let invitation = invite(&mut state, &rules, creator, " Wanjiku@Example.com ", 100).unwrap();
        assert_eq!(invitation.email, "wanjiku@example.com");
        assert_eq!(invitation.expires_at, 100 + rules.invitation_ttl_secs);

        let user = UserId::new();
        let member = accept_invitation(
            &mut state,
            invitation.id,
            user,
            "wanjiku@example.com",
            "GW",
            200,
        )
        .unwrap();
        assert_eq!(member.status, MemberStatus::Pending);
        assert_eq!(
            state.invitations[&invitation.id].status,
            InvitationStatus::Accepted
        );
        assert_eq!(state.invitations[&invitation.id].accepted_by, Some(user));

        let err = accept_invitation(
            &mut state,
            invitation.id,
            UserId::new(),
            "wanjiku@example.com",
            "",
            200,
        )
        .unwrap_err();
        assert_eq!(err, ChamaError::InvitationClosed(invitation.id));
    }

    #[test]
    fn test_invitation_expiry_and_email_mismatch() {
        let rules = GroupRules::default();
        let mut state = fixtures::pending_group(0);
        let creator = fixtures::creator_id(&state);
        let invitation = invite(&mut state, &rules, creator, "a@b.io", 0).unwrap();

        let err =
            accept_invitation(&mut state, invitation.id, UserId::new(), "x@b.io", "", 1).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);

        let late = rules.invitation_ttl_secs + 1;
        let err = accept_invitation(&mut state, invitation.id, UserId::new(), "a@b.io", "", late)
            .unwrap_err();
        assert_eq!(err, ChamaError::InvitationExpired(invitation.id));
    }

    #[test]
    fn test_duplicate_pending_invitation_conflicts() {
        let rules = GroupRules::default();
        let mut state = fixtures::pending_group(0);
        let creator = fixtures::creator_id(&state);
        invite(&mut state, &rules, creator, "a@b.io", 0).unwrap();

        let err = invite(&mut state, &rules, creator, "A@B.io", 10).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        // Once the first one lapses a fresh invitation is allowed.
        let later = rules.invitation_ttl_secs + 10;
        assert!(invite(&mut state, &rules, creator, "a@b.io", later).is_ok());
    }

    #[test]
    fn test_decline_invitation() {
        let rules = GroupRules::default();
        let mut state = fixtures::pending_group(0);
        let creator = fixtures::creator_id(&state);
        let invitation = invite(&mut state, &rules, creator, "a@b.io", 0).unwrap();

        let declined = decline_invitation(&mut state, invitation.id, " A@B.io").unwrap();
        assert_eq!(declined.status, InvitationStatus::Declined);
        assert!(decline_invitation(&mut state, invitation.id, "a@b.io").is_err());
    }

    #[test]
    fn test_decline_requires_invited_email() {
        let rules = GroupRules::default();
        let mut state = fixtures::pending_group(0);
        let creator = fixtures::creator_id(&state);
        let invitation = invite(&mut state, &rules, creator, "invitee@example.org", 0).unwrap();

        let err = decline_invitation(&mut state, invitation.id, "someone@example.org").unwrap_err();
        assert_eq!(err, ChamaError::InvitationEmailMismatch(invitation.id));
        assert_eq!(err.kind(), ErrorKind::Forbidden);
        assert_eq!(
            state.invitations[&invitation.id].status,
            InvitationStatus::Pending
        );
    }

    #[test]
    fn test_invalid_email_rejected() {
        let mut state = fixtures::pending_group(0);
        let creator = fixtures::creator_id(&state);
        let err = invite(&mut state, &GroupRules::default(), creator, "nobody", 0).unwrap_err();
        assert!(matches!(err, ChamaError::InvalidEmail(_)));
    }

    #[test]
    fn test_enrollment_frozen_after_activation() {
        let mut state = fixtures::active_group(3, 10, 7);
        let err = join(&mut state, UserId::new(), "", 0).unwrap_err();
        assert_eq!(err, ChamaError::MembershipFrozen(GroupStatus::Active));
        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }
}
