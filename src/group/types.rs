//! Records and identifiers for a savings group.
//!
//! Every record is keyed by a stable UUID identifier and carries its owning
//! group id, which is the partition key for storage and per-group locking.
//!
//! Amounts are in the ledger's smallest unit (e.g. stroops). Timestamps are
//! Unix seconds.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Amount in the ledger's smallest unit.
pub type Amount = u64;

/// Unix timestamp in seconds.
pub type Timestamp = u64;

/// Seconds in one contribution-period day.
pub const SECS_PER_DAY: u64 = 86_400;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Generate a fresh random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }
    };
}

uuid_id!(
    /// Savings group identifier (partition key).
    GroupId
);
uuid_id!(
    /// Membership identifier (one per user per group).
    MemberId
);
uuid_id!(
    /// Platform user identifier, owned by the external auth layer.
    UserId
);
uuid_id!(
    /// Group invitation identifier.
    InvitationId
);
uuid_id!(
    /// Payout request identifier.
    PayoutRequestId
);

/// Top-level group state. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupStatus {
    Pending,
    Approved,
    Active,
    Completed,
}

impl GroupStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupStatus::Pending => "pending",
            GroupStatus::Approved => "approved",
            GroupStatus::Active => "active",
            GroupStatus::Completed => "completed",
        }
    }

    /// Whether `self -> next` is one of the permitted forward edges.
    pub fn can_transition_to(&self, next: GroupStatus) -> bool {
        matches!(
            (self, next),
            (GroupStatus::Pending, GroupStatus::Approved)
                | (GroupStatus::Approved, GroupStatus::Active)
                | (GroupStatus::Active, GroupStatus::Completed)
        )
    }
}

impl fmt::Display for GroupStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Member role within a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Member,
    Admin,
    Creator,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Role::Member => "member",
            Role::Admin => "admin",
            Role::Creator => "creator",
        })
    }
}

/// Membership approval status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberStatus {
    Pending,
    Approved,
    Rejected,
}

impl fmt::Display for MemberStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MemberStatus::Pending => "pending",
            MemberStatus::Approved => "approved",
            MemberStatus::Rejected => "rejected",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvitationStatus {
    Pending,
    Accepted,
    Declined,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContributionStatus {
    Pending,
    Confirmed,
    Failed,
}

/// Derived status of a contribution round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundStatus {
    Collecting,
    ReadyForPayout,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayoutStatus {
    Pending,
    Approved,
    Rejected,
    Completed,
}

impl PayoutStatus {
    /// Pending and approved requests still occupy their round.
    pub fn is_open(&self) -> bool {
        matches!(self, PayoutStatus::Pending | PayoutStatus::Approved)
    }
}

impl fmt::Display for PayoutStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PayoutStatus::Pending => "pending",
            PayoutStatus::Approved => "approved",
            PayoutStatus::Rejected => "rejected",
            PayoutStatus::Completed => "completed",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleStatus {
    Scheduled,
    Pending,
    Paid,
}

/// Savings group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    pub description: String,
    /// Pooled wallet address. Key material lives with the wallet collaborator.
    pub wallet: String,
    pub creator: UserId,
    pub status: GroupStatus,
    pub is_approved: bool,
    pub contribution_amount: Amount,
    pub contribution_period_days: u32,
    pub min_members: u32,
    pub max_members: u32,
    /// Frozen at activation. Round `r` pays `payout_order[r - 1]`.
    pub payout_order: Vec<MemberId>,
    /// 0 until activation, then the round currently collecting.
    pub current_round: u32,
    pub activated_at: Option<Timestamp>,
    pub next_contribution_date: Option<Timestamp>,
    pub created_at: Timestamp,
}

impl Group {
    /// Number of rounds in the rotation (one per member in the payout order).
    pub fn total_rounds(&self) -> u32 {
        self.payout_order.len() as u32
    }
}

/// A user's membership in one group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: MemberId,
    pub group: GroupId,
    pub user: UserId,
    pub wallet: String,
    pub role: Role,
    pub status: MemberStatus,
    pub joined_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invitation {
    pub id: InvitationId,
    pub group: GroupId,
    pub inviter: MemberId,
    /// Normalized (trimmed, lowercase).
    pub email: String,
    pub status: InvitationStatus,
    pub accepted_by: Option<UserId>,
    pub created_at: Timestamp,
    pub expires_at: Timestamp,
}

impl Invitation {
    pub fn is_expired(&self, now: Timestamp) -> bool {
        now > self.expires_at
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminNomination {
    pub group: GroupId,
    pub nominator: MemberId,
    pub nominee: MemberId,
    pub created_at: Timestamp,
}

/// Collection state of one round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContributionRound {
    pub group: GroupId,
    pub round: u32,
    /// Total the round must collect (`contribution_amount * required_count`).
    pub required_amount: Amount,
    pub required_count: u32,
    pub paid_count: u32,
    pub total_received: Amount,
    /// Set once this round's payout request completes.
    pub payout_completed: bool,
}

impl ContributionRound {
    pub fn status(&self) -> RoundStatus {
        if self.payout_completed {
            RoundStatus::Completed
        } else if self.paid_count == self.required_count {
            RoundStatus::ReadyForPayout
        } else {
            RoundStatus::Collecting
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundContribution {
    pub group: GroupId,
    pub member: MemberId,
    pub round: u32,
    pub amount: Amount,
    pub status: ContributionStatus,
    pub created_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutApproval {
    pub request: PayoutRequestId,
    pub admin: MemberId,
    pub approved: bool,
    pub cast_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutRequest {
    pub id: PayoutRequestId,
    pub group: GroupId,
    pub recipient: MemberId,
    pub amount: Amount,
    pub round: u32,
    pub status: PayoutStatus,
    pub created_by: MemberId,
    pub created_at: Timestamp,
    /// One vote per admin; a revote replaces the earlier entry in place.
    pub approvals: Vec<PayoutApproval>,
    pub completed_at: Option<Timestamp>,
    /// Transaction reference handed back by the ledger collaborator.
    pub ledger_reference: Option<String>,
}

/// Approve/reject counts over the current votes of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteTally {
    pub approvals: usize,
    pub rejections: usize,
}

impl PayoutRequest {
    pub fn tally(&self) -> VoteTally {
        let approvals = self.approvals.iter().filter(|a| a.approved).count();
        VoteTally {
            approvals,
            rejections: self.approvals.len() - approvals,
        }
    }
}

/// One row of the payout rotation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub group: GroupId,
    pub round: u32,
    pub member: MemberId,
    pub amount: Amount,
    pub due_date: Timestamp,
    pub status: ScheduleStatus,
    pub paid_at: Option<Timestamp>,
}
