//! Error kinds surfaced by every group operation.
//!
//! Each failure has its own variant so callers can render a specific
//! message ("group already approved" vs "not enough members yet"), and
//! every variant maps to exactly one coarse [`ErrorKind`].
//!
//! Validation always runs before mutation: an `Err` means nothing was
//! persisted.

use crate::group::types::{
    Amount, GroupId, GroupStatus, InvitationId, MemberId, MemberStatus, PayoutRequestId,
    PayoutStatus, UserId,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse classification of a [`ChamaError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Unknown group, member, invitation, round or request.
    NotFound,
    /// Role or eligibility check failed.
    Forbidden,
    /// Transition preconditions unmet.
    InvalidState,
    /// Duplicate nomination, contribution, vote, membership or request.
    Conflict,
    /// Group is at its member capacity.
    CapacityExceeded,
    /// The durable store failed. Not produced by the core rules.
    Storage,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::InvalidState => "invalid_state",
            ErrorKind::Conflict => "conflict",
            ErrorKind::CapacityExceeded => "capacity_exceeded",
            ErrorKind::Storage => "storage",
        })
    }
}

/// Result type for group operations.
pub type ChamaResult<T> = Result<T, ChamaError>;

/// Group operation errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChamaError {
    // --- NotFound ---
    #[error("Group not found: {0}")]
    GroupNotFound(GroupId),

    #[error("Member not found: {0}")]
    MemberNotFound(MemberId),

    #[error("Invitation not found: {0}")]
    InvitationNotFound(InvitationId),

    #[error("Payout request not found: {0}")]
    PayoutRequestNotFound(PayoutRequestId),

    #[error("Round {0} has not been opened")]
    RoundNotFound(u32),

    // --- Forbidden ---
    #[error("Member {member} may not {action}: admin or creator role required")]
    InsufficientRole {
        member: MemberId,
        action: &'static str,
    },

    #[error("Only the group creator may approve the group")]
    NotCreator(MemberId),

    #[error("Member {0} is not an approved member of this group")]
    NotEligible(MemberId),

    #[error("Members cannot nominate themselves")]
    SelfNomination,

    #[error("Invitation {0} was issued to a different email address")]
    InvitationEmailMismatch(InvitationId),

    // --- InvalidState ---
    #[error("Group is already approved")]
    AlreadyApproved,

    #[error("Group needs at least {required} approved members (currently has {approved})")]
    NotEnoughMembers { required: u32, approved: u32 },

    #[error("Group cannot move from {from} to {to}")]
    InvalidTransition { from: GroupStatus, to: GroupStatus },

    #[error("Group is {0}: membership is frozen")]
    MembershipFrozen(GroupStatus),

    #[error("Group is {0}, expected active")]
    GroupNotActive(GroupStatus),

    #[error("Invalid group definition: {0}")]
    InvalidGroupDefinition(String),

    #[error("Invalid contribution terms: {0}")]
    InvalidContributionTerms(String),

    #[error("Invalid payout order: {0}")]
    InvalidPayoutOrder(String),

    #[error("Membership {member} is {status}, expected pending")]
    MembershipNotPending {
        member: MemberId,
        status: MemberStatus,
    },

    #[error("Invitation {0} has already been processed")]
    InvitationClosed(InvitationId),

    #[error("Invitation {0} has expired")]
    InvitationExpired(InvitationId),

    #[error("Invalid email address: {0:?}")]
    InvalidEmail(String),

    #[error("Round {got} is not the current round ({expected})")]
    WrongRound { expected: u32, got: u32 },

    #[error("Contribution must be exactly {expected}, got {got}")]
    WrongAmount { expected: Amount, got: Amount },

    #[error("Round {round} is still collecting ({paid}/{required} paid)")]
    RoundNotReady { round: u32, paid: u32, required: u32 },

    #[error("Round {round} pays {scheduled}, not {requested}")]
    RecipientOutOfTurn {
        round: u32,
        scheduled: MemberId,
        requested: MemberId,
    },

    #[error("Payout of {requested} exceeds the {available} collected for round {round}")]
    InsufficientPool {
        round: u32,
        requested: Amount,
        available: Amount,
    },

    #[error("Payout request {id} is {status}")]
    PayoutNotActionable {
        id: PayoutRequestId,
        status: PayoutStatus,
    },

    #[error("Payout amount must be greater than zero")]
    InvalidPayoutAmount,

    #[error("Amount overflow")]
    AmountOverflow,

    // --- Conflict ---
    #[error("User {0} already has a membership in this group")]
    AlreadyMember(UserId),

    #[error("A pending invitation for {0} already exists")]
    DuplicateInvitation(String),

    #[error("Member {nominator} has already nominated {nominee}")]
    DuplicateNomination {
        nominator: MemberId,
        nominee: MemberId,
    },

    #[error("Member {member} already contributed to round {round}")]
    DuplicateContribution { member: MemberId, round: u32 },

    #[error("Admin {admin} has already voted on payout request {request}")]
    DuplicateVote {
        request: PayoutRequestId,
        admin: MemberId,
    },

    #[error("Round {0} already has an open payout request")]
    OpenRequestExists(u32),

    #[error("Round {0} has already been paid out")]
    RoundAlreadyPaid(u32),

    // --- CapacityExceeded ---
    #[error("Group is full ({max} approved members)")]
    GroupFull { max: u32 },

    // --- Storage ---
    #[error("Storage error: {0}")]
    Storage(String),
}

impl ChamaError {
    /// Coarse kind for this error.
    pub fn kind(&self) -> ErrorKind {
        use ChamaError::*;
        match self {
            GroupNotFound(_)
            | MemberNotFound(_)
            | InvitationNotFound(_)
            | PayoutRequestNotFound(_)
            | RoundNotFound(_) => ErrorKind::NotFound,

            InsufficientRole { .. }
            | NotCreator(_)
            | NotEligible(_)
            | SelfNomination
            | InvitationEmailMismatch(_) => ErrorKind::Forbidden,

            AlreadyApproved
            | NotEnoughMembers { .. }
            | InvalidTransition { .. }
            | MembershipFrozen(_)
            | GroupNotActive(_)
            | InvalidGroupDefinition(_)
            | InvalidContributionTerms(_)
            | InvalidPayoutOrder(_)
            | MembershipNotPending { .. }
            | InvitationClosed(_)
            | InvitationExpired(_)
            | InvalidEmail(_)
            | WrongRound { .. }
            | WrongAmount { .. }
            | RoundNotReady { .. }
            | RecipientOutOfTurn { .. }
            | InsufficientPool { .. }
            | PayoutNotActionable { .. }
            | InvalidPayoutAmount
            | AmountOverflow => ErrorKind::InvalidState,

            AlreadyMember(_)
            | DuplicateInvitation(_)
            | DuplicateNomination { .. }
            | DuplicateContribution { .. }
            | DuplicateVote { .. }
            | OpenRequestExists(_)
            | RoundAlreadyPaid(_) => ErrorKind::Conflict,

            GroupFull { .. } => ErrorKind::CapacityExceeded,

            Storage(_) => ErrorKind::Storage,
        }
    }

    /// Stable machine-readable code for the wire protocol.
    pub fn code(&self) -> &'static str {
        use ChamaError::*;
        match self {
            GroupNotFound(_) => "group_not_found",
            MemberNotFound(_) => "member_not_found",
            InvitationNotFound(_) => "invitation_not_found",
            PayoutRequestNotFound(_) => "payout_request_not_found",
            RoundNotFound(_) => "round_not_found",
            InsufficientRole { .. } => "insufficient_role",
            NotCreator(_) => "not_creator",
            NotEligible(_) => "not_eligible",
            SelfNomination => "self_nomination",
            InvitationEmailMismatch(_) => "invitation_email_mismatch",
            AlreadyApproved => "already_approved",
            NotEnoughMembers { .. } => "not_enough_members",
            InvalidTransition { .. } => "invalid_transition",
            MembershipFrozen(_) => "membership_frozen",
            GroupNotActive(_) => "group_not_active",
            InvalidGroupDefinition(_) => "invalid_group_definition",
            InvalidContributionTerms(_) => "invalid_contribution_terms",
            InvalidPayoutOrder(_) => "invalid_payout_order",
            MembershipNotPending { .. } => "membership_not_pending",
            InvitationClosed(_) => "invitation_closed",
            InvitationExpired(_) => "invitation_expired",
            InvalidEmail(_) => "invalid_email",
            WrongRound { .. } => "wrong_round",
            WrongAmount { .. } => "wrong_amount",
            RoundNotReady { .. } => "round_not_ready",
            RecipientOutOfTurn { .. } => "recipient_out_of_turn",
            InsufficientPool { .. } => "insufficient_pool",
            PayoutNotActionable { .. } => "payout_not_actionable",
            InvalidPayoutAmount => "invalid_payout_amount",
            AmountOverflow => "amount_overflow",
            AlreadyMember(_) => "already_member",
            DuplicateInvitation(_) => "duplicate_invitation",
            DuplicateNomination { .. } => "duplicate_nomination",
            DuplicateContribution { .. } => "duplicate_contribution",
            DuplicateVote { .. } => "duplicate_vote",
            OpenRequestExists(_) => "open_request_exists",
            RoundAlreadyPaid(_) => "round_already_paid",
            GroupFull { .. } => "group_full",
            Storage(_) => "storage",
        }
    }
}

impl From<crate::persistence::StoreError> for ChamaError {
    fn from(err: crate::persistence::StoreError) -> Self {
        ChamaError::Storage(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            ChamaError::GroupNotFound(GroupId::new()).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(ChamaError::SelfNomination.kind(), ErrorKind::Forbidden);
        assert_eq!(ChamaError::AlreadyApproved.kind(), ErrorKind::InvalidState);
        assert_eq!(
            ChamaError::NotEnoughMembers {
                required: 3,
                approved: 2
            }
            .kind(),
            ErrorKind::InvalidState
        );
        assert_eq!(
            ChamaError::DuplicateContribution {
                member: MemberId::new(),
                round: 1
            }
            .kind(),
            ErrorKind::Conflict
        );
        assert_eq!(
            ChamaError::GroupFull { max: 20 }.kind(),
            ErrorKind::CapacityExceeded
        );
    }

    #[test]
    fn test_error_messages_are_specific() {
        let already = ChamaError::AlreadyApproved.to_string();
        let short = ChamaError::NotEnoughMembers {
            required: 3,
            approved: 1,
        }
        .to_string();

        assert_eq!(already, "Group is already approved");
        assert_eq!(
            short,
            "Group needs at least 3 approved members (currently has 1)"
        );
    }

    #[test]
    fn test_codes_and_kinds_serialize_snake_case() {
        assert_eq!(ChamaError::GroupFull { max: 2 }.code(), "group_full");
        assert_eq!(
            serde_json::to_string(&ErrorKind::CapacityExceeded).unwrap(),
            "\"capacity_exceeded\""
        );
        assert_eq!(ErrorKind::InvalidState.to_string(), "invalid_state");
    }
}
