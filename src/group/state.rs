//! Group state aggregate.
//!
//! One `GroupState` holds every record belonging to a single group: the
//! group itself, its members, invitations, nominations, rounds,
//! contributions, payout requests with their votes, and the payout schedule.
//! It is the unit of locking and the unit of persistence.
//!
//! Schema evolution follows the usual rule: new fields get
//! `#[serde(default)]` so older snapshots still decode.

use crate::error::{ChamaError, ChamaResult};
use crate::group::types::{
    AdminNomination, ContributionRound, Group, GroupId, GroupStatus, Invitation, InvitationId,
    Member, MemberId, MemberStatus, PayoutRequest, PayoutRequestId, RoundContribution,
    ScheduleEntry, UserId,
};
use crate::serialization::{from_cbor, to_cbor, SerializationError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Current snapshot schema.
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupState {
    pub group: Group,

    pub members: BTreeMap<MemberId, Member>,

    #[serde(default)]
    pub invitations: BTreeMap<InvitationId, Invitation>,

    /// Append-only; never retracted.
    #[serde(default)]
    pub nominations: Vec<AdminNomination>,

    #[serde(default)]
    pub rounds: BTreeMap<u32, ContributionRound>,

    #[serde(default)]
    pub contributions: Vec<RoundContribution>,

    #[serde(default)]
    pub payout_requests: BTreeMap<PayoutRequestId, PayoutRequest>,

    /// Ordered by round.
    #[serde(default)]
    pub schedule: Vec<ScheduleEntry>,

    /// Bumped on every committed mutation.
    pub version: u64,

    pub schema_version: u32,
}

impl GroupState {
    /// Fresh state for a just-created group and its creator.
    pub fn new(group: Group, creator: Member) -> Self {
        let mut members = BTreeMap::new();
        members.insert(creator.id, creator);
        Self {
            group,
            members,
            invitations: BTreeMap::new(),
            nominations: Vec::new(),
            rounds: BTreeMap::new(),
            contributions: Vec::new(),
            payout_requests: BTreeMap::new(),
            schedule: Vec::new(),
            version: 0,
            schema_version: SCHEMA_VERSION,
        }
    }

    pub fn id(&self) -> GroupId {
        self.group.id
    }

    pub fn member(&self, id: &MemberId) -> ChamaResult<&Member> {
        self.members
            .get(id)
            .ok_or(ChamaError::MemberNotFound(*id))
    }

    pub fn member_mut(&mut self, id: &MemberId) -> ChamaResult<&mut Member> {
        self.members
            .get_mut(id)
            .ok_or(ChamaError::MemberNotFound(*id))
    }

    pub fn member_by_user(&self, user: &UserId) -> Option<&Member> {
        self.members.values().find(|m| &m.user == user)
    }

    pub fn approved_members(&self) -> impl Iterator<Item = &Member> {
        self.members
            .values()
            .filter(|m| m.status == MemberStatus::Approved)
    }

    pub fn approved_count(&self) -> u32 {
        self.approved_members().count() as u32
    }

    /// Members in join order, ties broken by id.
    pub fn members_by_join_order(&self) -> Vec<&Member> {
        let mut members: Vec<&Member> = self.members.values().collect();
        members.sort_by_key(|m| (m.joined_at, m.id));
        members
    }

    pub fn ensure_active(&self) -> ChamaResult<()> {
        if self.group.status == GroupStatus::Active {
            Ok(())
        } else {
            Err(ChamaError::GroupNotActive(self.group.status))
        }
    }

    pub fn payout_request(&self, id: &PayoutRequestId) -> ChamaResult<&PayoutRequest> {
        self.payout_requests
            .get(id)
            .ok_or(ChamaError::PayoutRequestNotFound(*id))
    }

    /// Serialize to CBOR bytes for the store.
    pub fn to_bytes(&self) -> Result<Vec<u8>, SerializationError> {
        to_cbor(self)
    }

    /// Deserialize from CBOR bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SerializationError> {
        from_cbor(bytes)
    }
}
