//! Group service.
//!
//! Async front door to the group core. Every call is routed to one group
//! and runs under that group's lock:
//!
//! 1. clone the current state
//! 2. validate and apply the operation on the clone
//! 3. persist the clone with a bumped version
//! 4. swap it in
//! 5. publish events, then release the lock
//!
//! Any failure before step 4 leaves the live state and the store untouched.
//! Different groups never share a lock.

use crate::clock::Clock;
use crate::error::{ChamaError, ChamaResult};
use crate::group::{
    lifecycle, membership, nomination, payout, rounds, ActivationTerms, Amount,
    ContributionReceipt, Group, GroupId, GroupRules, GroupState, Invitation,
    InvitationId, JoinOrder, Member, MemberId, MemberStatus, NewGroup, NominationOutcome,
    PayoutCompletion, PayoutOrderStrategy, PayoutRequest, PayoutRequestId, PayoutStatus,
    RoundStatus, RoundSummary, ScheduleEntry, SeededShuffle, UserId,
};
use crate::notify::{ChamaEvent, EventDispatcher, Notifier};
use crate::persistence::GroupStore;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

/// A freshly created group and its creator's membership.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedGroup {
    pub group: Group,
    pub creator: Member,
}

type Slot = Arc<Mutex<GroupState>>;

pub struct ChamaService {
    rules: GroupRules,
    store: Arc<dyn GroupStore>,
    clock: Arc<dyn Clock>,
    events: EventDispatcher,
    groups: RwLock<HashMap<GroupId, Slot>>,
    invitations: RwLock<HashMap<InvitationId, GroupId>>,
    payouts: RwLock<HashMap<PayoutRequestId, GroupId>>,
}

impl ChamaService {
    /// Must be called inside a tokio runtime (starts the event task).
    pub fn new(
        rules: GroupRules,
        store: Arc<dyn GroupStore>,
        clock: Arc<dyn Clock>,
        notifiers: Vec<Arc<dyn Notifier>>,
    ) -> Self {
        Self {
            rules,
            store,
            clock,
            events: EventDispatcher::new(notifiers),
            groups: RwLock::new(HashMap::new()),
            invitations: RwLock::new(HashMap::new()),
            payouts: RwLock::new(HashMap::new()),
        }
    }

    pub fn rules(&self) -> &GroupRules {
        &self.rules
    }

    /// Load every stored group. Returns how many were loaded.
    ///
    /// Groups already live keep their slot; the stored copy is ignored.
    pub async fn restore(&self) -> ChamaResult<usize> {
        let states = self.store.load_all().await?;
        let count = states.len();
        for state in states {
            self.index(&state).await;
            self.groups
                .write()
                .await
                .entry(state.id())
                .or_insert_with(|| Arc::new(Mutex::new(state)));
        }
        info!(groups = count, "group states restored");
        Ok(count)
    }

    /// Committed events, optionally for one group only.
    pub fn subscribe(
        &self,
        group: Option<GroupId>,
    ) -> Box<dyn futures::Stream<Item = ChamaEvent> + Send + Unpin> {
        self.events.subscribe(group)
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    pub async fn create_group(&self, new: NewGroup) -> ChamaResult<CreatedGroup> {
        let mut state = lifecycle::create_group(&self.rules, new, self.clock.now_secs())?;
        state.version = 1;
        self.store.save(&state).await?;

        let creator = state
            .member_by_user(&state.group.creator)
            .cloned()
            .ok_or_else(|| ChamaError::Storage("creator membership missing".to_string()))?;
        let created = CreatedGroup {
            group: state.group.clone(),
            creator,
        };
        self.groups
            .write()
            .await
            .insert(state.id(), Arc::new(Mutex::new(state)));

        self.events.publish(vec![ChamaEvent::GroupCreated {
            group: created.group.id,
            name: created.group.name.clone(),
        }]);
        Ok(created)
    }

    pub async fn approve_group(&self, group: GroupId, actor: MemberId) -> ChamaResult<Group> {
        self.mutate(group, |state, _| {
            let group = lifecycle::approve_group(state, actor)?;
            let event = status_event(&group);
            Ok((group, vec![event]))
        })
        .await
    }

    pub async fn activate_group(
        &self,
        group: GroupId,
        actor: MemberId,
        terms: ActivationTerms,
    ) -> ChamaResult<Group> {
        self.mutate(group, |state, now| {
            let group = lifecycle::activate_group(state, actor, terms, now)?;
            let events = vec![
                status_event(&group),
                ChamaEvent::RoundOpened {
                    group: group.id,
                    round: group.current_round,
                },
            ];
            Ok((group, events))
        })
        .await
    }

    /// Suggest a payout order: join order, or a reproducible shuffle when a
    /// seed is given. Activation still needs the order passed explicitly.
    pub async fn propose_payout_order(
        &self,
        group: GroupId,
        seed: Option<u64>,
    ) -> ChamaResult<Vec<MemberId>> {
        self.read(group, |state| {
            let approved: Vec<&Member> = state
                .members_by_join_order()
                .into_iter()
                .filter(|m| m.status == MemberStatus::Approved)
                .collect();
            Ok(match seed {
                Some(seed) => SeededShuffle::new(seed).propose(&approved),
                None => JoinOrder.propose(&approved),
            })
        })
        .await
    }

    pub async fn get_group(&self, group: GroupId) -> ChamaResult<Group> {
        self.read(group, |state| Ok(state.group.clone())).await
    }

    /// Members in join order.
    pub async fn list_members(&self, group: GroupId) -> ChamaResult<Vec<Member>> {
        self.read(group, |state| {
            Ok(state
                .members_by_join_order()
                .into_iter()
                .cloned()
                .collect())
        })
        .await
    }

    pub async fn group_ids(&self) -> Vec<GroupId> {
        let mut ids: Vec<GroupId> = self.groups.read().await.keys().copied().collect();
        ids.sort();
        ids
    }

    // ------------------------------------------------------------------
    // Membership
    // ------------------------------------------------------------------

    pub async fn invite(
        &self,
        group: GroupId,
        inviter: MemberId,
        email: &str,
    ) -> ChamaResult<Invitation> {
        let rules = &self.rules;
        let invitation = self
            .mutate(group, |state, now| {
                let invitation = membership::invite(state, rules, inviter, email, now)?;
                let event = ChamaEvent::InvitationIssued {
                    group: invitation.group,
                    invitation: invitation.id,
                    email: invitation.email.clone(),
                };
                Ok((invitation, vec![event]))
            })
            .await?;
        self.invitations
            .write()
            .await
            .insert(invitation.id, invitation.group);
        Ok(invitation)
    }

    pub async fn accept_invitation(
        &self,
        invitation: InvitationId,
        user: UserId,
        email: &str,
        wallet: &str,
    ) -> ChamaResult<Member> {
        let group = self.invitation_group(invitation).await?;
        self.mutate(group, |state, now| {
            let member = membership::accept_invitation(state, invitation, user, email, wallet, now)?;
            let event = ChamaEvent::MemberJoined {
                group: member.group,
                member: member.id,
            };
            Ok((member, vec![event]))
        })
        .await
    }

    pub async fn decline_invitation(
        &self,
        invitation: InvitationId,
        email: &str,
    ) -> ChamaResult<Invitation> {
        let group = self.invitation_group(invitation).await?;
        self.mutate(group, |state, _| {
            Ok((membership::decline_invitation(state, invitation, email)?, Vec::new()))
        })
        .await
    }

    pub async fn join(&self, group: GroupId, user: UserId, wallet: &str) -> ChamaResult<Member> {
        self.mutate(group, |state, now| {
            let member = membership::join(state, user, wallet, now)?;
            let event = ChamaEvent::MemberJoined {
                group: member.group,
                member: member.id,
            };
            Ok((member, vec![event]))
        })
        .await
    }

    pub async fn approve_member(
        &self,
        group: GroupId,
        actor: MemberId,
        member: MemberId,
    ) -> ChamaResult<Member> {
        self.mutate(group, |state, _| {
            let member = membership::approve(state, actor, member)?;
            Ok((member.clone(), vec![decided_event(&member)]))
        })
        .await
    }

    pub async fn reject_member(
        &self,
        group: GroupId,
        actor: MemberId,
        member: MemberId,
    ) -> ChamaResult<Member> {
        self.mutate(group, |state, _| {
            let member = membership::reject(state, actor, member)?;
            Ok((member.clone(), vec![decided_event(&member)]))
        })
        .await
    }

    pub async fn nominate_admin(
        &self,
        group: GroupId,
        nominator: MemberId,
        nominee: MemberId,
    ) -> ChamaResult<NominationOutcome> {
        let rules = &self.rules;
        self.mutate(group, |state, now| {
            let outcome = nomination::nominate(state, rules, nominator, nominee, now)?;
            let mut events = Vec::new();
            if outcome.promoted {
                events.push(ChamaEvent::AdminPromoted {
                    group: state.id(),
                    member: nominee,
                });
            }
            Ok((outcome, events))
        })
        .await
    }

    // ------------------------------------------------------------------
    // Rounds
    // ------------------------------------------------------------------

    pub async fn contribute(
        &self,
        group: GroupId,
        member: MemberId,
        round: u32,
        amount: Amount,
    ) -> ChamaResult<ContributionReceipt> {
        self.mutate(group, |state, now| {
            let receipt = rounds::record_contribution(state, member, round, amount, now)?;
            let mut events = vec![ChamaEvent::ContributionRecorded {
                group: state.id(),
                member,
                round,
                amount,
            }];
            if receipt.round.status == RoundStatus::ReadyForPayout {
                events.push(ChamaEvent::RoundReady {
                    group: state.id(),
                    round,
                    total: receipt.round.total_received,
                });
            }
            Ok((receipt, events))
        })
        .await
    }

    pub async fn round_status(&self, group: GroupId, round: u32) -> ChamaResult<RoundSummary> {
        self.read(group, |state| rounds::round_status(state, round))
            .await
    }

    // ------------------------------------------------------------------
    // Payouts
    // ------------------------------------------------------------------

    pub async fn create_payout_request(
        &self,
        group: GroupId,
        actor: MemberId,
        recipient: MemberId,
        amount: Amount,
        round: u32,
    ) -> ChamaResult<PayoutRequest> {
        let request = self
            .mutate(group, |state, now| {
                let request = payout::create_request(state, actor, recipient, amount, round, now)?;
                let event = requested_event(&request);
                Ok((request, vec![event]))
            })
            .await?;
        self.payouts.write().await.insert(request.id, request.group);
        Ok(request)
    }

    /// Request the current round's pool for its scheduled recipient.
    pub async fn create_scheduled_payout(
        &self,
        group: GroupId,
        actor: MemberId,
    ) -> ChamaResult<PayoutRequest> {
        let request = self
            .mutate(group, |state, now| {
                let request = payout::create_scheduled_request(state, actor, now)?;
                let event = requested_event(&request);
                Ok((request, vec![event]))
            })
            .await?;
        self.payouts.write().await.insert(request.id, request.group);
        Ok(request)
    }

    pub async fn vote_payout(
        &self,
        request: PayoutRequestId,
        admin: MemberId,
        approved: bool,
    ) -> ChamaResult<PayoutRequest> {
        let group = self.payout_group(request).await?;
        let rules = &self.rules;
        self.mutate(group, |state, now| {
            let decided = payout::vote(state, rules, request, admin, approved, now)?;
            let mut events = Vec::new();
            if decided.status != PayoutStatus::Pending {
                events.push(ChamaEvent::PayoutDecided {
                    group: decided.group,
                    request: decided.id,
                    status: decided.status,
                });
            }
            Ok((decided, events))
        })
        .await
    }

    /// Called by the ledger layer once an approved payout was submitted.
    pub async fn complete_payout(
        &self,
        request: PayoutRequestId,
        ledger_reference: Option<String>,
    ) -> ChamaResult<PayoutCompletion> {
        let group = self.payout_group(request).await?;
        self.mutate(group, |state, now| {
            let done = payout::complete(state, request, ledger_reference, now)?;
            let mut events = vec![ChamaEvent::PayoutCompleted {
                group: done.group.id,
                request: done.request.id,
                round: done.request.round,
            }];
            match done.next_round {
                Some(round) => events.push(ChamaEvent::RoundOpened {
                    group: done.group.id,
                    round,
                }),
                None => events.push(status_event(&done.group)),
            }
            Ok((done, events))
        })
        .await
    }

    /// Payout requests, newest first. Approved members only.
    pub async fn list_payout_requests(
        &self,
        group: GroupId,
        actor: MemberId,
    ) -> ChamaResult<Vec<PayoutRequest>> {
        self.read(group, |state| payout::list_requests(state, actor))
            .await
    }

    pub async fn payout_schedule(&self, group: GroupId) -> ChamaResult<Vec<ScheduleEntry>> {
        self.read(group, |state| Ok(state.schedule.clone())).await
    }

    // ------------------------------------------------------------------
    // Plumbing
    // ------------------------------------------------------------------

    async fn slot(&self, group: GroupId) -> ChamaResult<Slot> {
        if let Some(slot) = self.groups.read().await.get(&group) {
            return Ok(slot.clone());
        }

        let state = self
            .store
            .load(group)
            .await?
            .ok_or(ChamaError::GroupNotFound(group))?;
        self.index(&state).await;
        debug!(group = %group, version = state.version, "group loaded from store");

        let mut groups = self.groups.write().await;
        Ok(groups
            .entry(group)
            .or_insert_with(|| Arc::new(Mutex::new(state)))
            .clone())
    }

    async fn read<T, F>(&self, group: GroupId, op: F) -> ChamaResult<T>
    where
        F: FnOnce(&GroupState) -> ChamaResult<T>,
    {
        let slot = self.slot(group).await?;
        let state = slot.lock().await;
        op(&state)
    }

    async fn mutate<T, F>(&self, group: GroupId, op: F) -> ChamaResult<T>
    where
        F: FnOnce(&mut GroupState, u64) -> ChamaResult<(T, Vec<ChamaEvent>)>,
    {
        let slot = self.slot(group).await?;
        let mut live = slot.lock().await;

        let mut draft = live.clone();
        let (value, events) = op(&mut draft, self.clock.now_secs())?;
        draft.version = live.version + 1;
        if let Err(e) = self.store.save(&draft).await {
            warn!(group = %group, error = %e, "failed to persist group state");
            return Err(e.into());
        }
        *live = draft;

        // Still under the group lock so events leave in commit order.
        self.events.publish(events);
        Ok(value)
    }

    async fn index(&self, state: &GroupState) {
        let mut invitations = self.invitations.write().await;
        for id in state.invitations.keys() {
            invitations.insert(*id, state.id());
        }
        drop(invitations);

        let mut payouts = self.payouts.write().await;
        for id in state.payout_requests.keys() {
            payouts.insert(*id, state.id());
        }
    }

    async fn invitation_group(&self, invitation: InvitationId) -> ChamaResult<GroupId> {
        if let Some(group) = self.invitations.read().await.get(&invitation).copied() {
            return Ok(group);
        }
        self.load_unindexed().await?;
        self.invitations
            .read()
            .await
            .get(&invitation)
            .copied()
            .ok_or(ChamaError::InvitationNotFound(invitation))
    }

    async fn payout_group(&self, request: PayoutRequestId) -> ChamaResult<GroupId> {
        if let Some(group) = self.payouts.read().await.get(&request).copied() {
            return Ok(group);
        }
        self.load_unindexed().await?;
        self.payouts
            .read()
            .await
            .get(&request)
            .copied()
            .ok_or(ChamaError::PayoutRequestNotFound(request))
    }

    /// Load and index every stored group this service has not seen yet.
    async fn load_unindexed(&self) -> ChamaResult<()> {
        for id in self.store.list_ids().await? {
            let known = self.groups.read().await.contains_key(&id);
            if !known {
                self.slot(id).await?;
            }
        }
        Ok(())
    }
}

fn status_event(group: &Group) -> ChamaEvent {
    ChamaEvent::GroupStatusChanged {
        group: group.id,
        status: group.status,
    }
}

fn decided_event(member: &Member) -> ChamaEvent {
    ChamaEvent::MembershipDecided {
        group: member.group,
        member: member.id,
        status: member.status,
    }
}

fn requested_event(request: &PayoutRequest) -> ChamaEvent {
    ChamaEvent::PayoutRequested {
        group: request.group,
        request: request.id,
        recipient: request.recipient,
        round: request.round,
        amount: request.amount,
    }
}
