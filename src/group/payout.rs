//! Payout authorization.
//!
//! A payout request releases one round's pool to that round's scheduled
//! recipient. Admins vote on it:
//!
//! - any `approved = false` vote rejects the request outright (veto);
//! - otherwise it becomes `approved` once `payout_approval_quorum` admins
//!   have approved.
//!
//! An approved request is handed to the ledger layer, which reports back
//! through [`complete`]. Completion closes the round and either opens the
//! next one or finishes the group.
//!
//! Only one request per round may be open (pending or approved) at a time.

use crate::error::{ChamaError, ChamaResult};
use crate::group::capability::{require_approved, require_privileged};
use crate::group::lifecycle::complete_group;
use crate::group::rounds::{advance_round, mark_round_completed};
use crate::group::rules::GroupRules;
use crate::group::state::GroupState;
use crate::group::types::{
    Amount, Group, MemberId, PayoutApproval, PayoutRequest, PayoutRequestId, PayoutStatus,
    RoundStatus, ScheduleStatus, Timestamp,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Result of a completed payout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutCompletion {
    pub request: PayoutRequest,
    pub group: Group,
    /// Round opened by this completion; `None` when the group finished.
    pub next_round: Option<u32>,
}

/// Open a payout request for `round` (admin/creator only).
///
/// The round must be fully collected, `recipient` must be the member the
/// schedule names for it, and `amount` may not exceed what was collected.
pub fn create_request(
    state: &mut GroupState,
    actor: MemberId,
    recipient: MemberId,
    amount: Amount,
    round: u32,
    now: Timestamp,
) -> ChamaResult<PayoutRequest> {
    state.ensure_active()?;
    require_privileged(state.member(&actor)?, "create payout requests")?;
    require_approved(state.member(&recipient)?)?;
    if amount == 0 {
        return Err(ChamaError::InvalidPayoutAmount);
    }

    let current = state.group.current_round;
    if round == 0 || round > current {
        return Err(ChamaError::WrongRound {
            expected: current,
            got: round,
        });
    }
    if state
        .payout_requests
        .values()
        .any(|r| r.round == round && r.status.is_open())
    {
        return Err(ChamaError::OpenRequestExists(round));
    }

    let collected = state
        .rounds
        .get(&round)
        .ok_or(ChamaError::RoundNotFound(round))?;
    match collected.status() {
        RoundStatus::Collecting => {
            return Err(ChamaError::RoundNotReady {
                round,
                paid: collected.paid_count,
                required: collected.required_count,
            })
        }
        RoundStatus::Completed => return Err(ChamaError::RoundAlreadyPaid(round)),
        RoundStatus::ReadyForPayout => {}
    }
    let available = collected.total_received;

    let scheduled = scheduled_recipient(state, round)?;
    if scheduled != recipient {
        return Err(ChamaError::RecipientOutOfTurn {
            round,
            scheduled,
            requested: recipient,
        });
    }
    if amount > available {
        return Err(ChamaError::InsufficientPool {
            round,
            requested: amount,
            available,
        });
    }

    let request = PayoutRequest {
        id: PayoutRequestId::new(),
        group: state.id(),
        recipient,
        amount,
        round,
        status: PayoutStatus::Pending,
        created_by: actor,
        created_at: now,
        approvals: Vec::new(),
        completed_at: None,
        ledger_reference: None,
    };
    state.payout_requests.insert(request.id, request.clone());
    set_schedule_status(state, round, ScheduleStatus::Pending, None);

    info!(
        group = %state.id(),
        request = %request.id,
        round,
        amount,
        "payout request created"
    );
    Ok(request)
}

/// Open a request for the current round paying its scheduled recipient the
/// whole collected pool.
pub fn create_scheduled_request(
    state: &mut GroupState,
    actor: MemberId,
    now: Timestamp,
) -> ChamaResult<PayoutRequest> {
    state.ensure_active()?;
    let round = state.group.current_round;
    let recipient = scheduled_recipient(state, round)?;
    let pool = state
        .rounds
        .get(&round)
        .map(|r| r.total_received)
        .ok_or(ChamaError::RoundNotFound(round))?;
    create_request(state, actor, recipient, pool, round, now)
}

/// Cast or replace `admin`'s vote on a pending request.
pub fn vote(
    state: &mut GroupState,
    rules: &GroupRules,
    request_id: PayoutRequestId,
    admin: MemberId,
    approved: bool,
    now: Timestamp,
) -> ChamaResult<PayoutRequest> {
    state.ensure_active()?;
    let status = state.payout_request(&request_id)?.status;
    require_privileged(state.member(&admin)?, "vote on payouts")?;
    if status != PayoutStatus::Pending {
        return Err(ChamaError::PayoutNotActionable {
            id: request_id,
            status,
        });
    }

    let request = state
        .payout_requests
        .get_mut(&request_id)
        .ok_or(ChamaError::PayoutRequestNotFound(request_id))?;
    match request.approvals.iter().position(|a| a.admin == admin) {
        Some(_) if !rules.allow_vote_overwrite => {
            return Err(ChamaError::DuplicateVote {
                request: request_id,
                admin,
            })
        }
        Some(index) => {
            let existing = &mut request.approvals[index];
            existing.approved = approved;
            existing.cast_at = now;
        }
        None => request.approvals.push(PayoutApproval {
            request: request_id,
            admin,
            approved,
            cast_at: now,
        }),
    }

    let tally = request.tally();
    if tally.rejections > 0 {
        request.status = PayoutStatus::Rejected;
    } else if tally.approvals >= rules.payout_approval_quorum {
        request.status = PayoutStatus::Approved;
    }
    let decided = request.clone();

    match decided.status {
        PayoutStatus::Rejected => {
            set_schedule_status(state, decided.round, ScheduleStatus::Scheduled, None);
            info!(group = %decided.group, request = %decided.id, admin = %admin, "payout request vetoed");
        }
        PayoutStatus::Approved => {
            info!(
                group = %decided.group,
                request = %decided.id,
                approvals = tally.approvals,
                "payout request approved"
            );
        }
        _ => {
            debug!(
                group = %decided.group,
                request = %decided.id,
                approvals = tally.approvals,
                quorum = rules.payout_approval_quorum,
                "payout vote recorded"
            );
        }
    }
    Ok(decided)
}

/// Record that the ledger paid out an approved request.
pub fn complete(
    state: &mut GroupState,
    request_id: PayoutRequestId,
    ledger_reference: Option<String>,
    now: Timestamp,
) -> ChamaResult<PayoutCompletion> {
    state.ensure_active()?;
    let request = state
        .payout_requests
        .get_mut(&request_id)
        .ok_or(ChamaError::PayoutRequestNotFound(request_id))?;
    if request.status != PayoutStatus::Approved {
        return Err(ChamaError::PayoutNotActionable {
            id: request_id,
            status: request.status,
        });
    }
    request.status = PayoutStatus::Completed;
    request.completed_at = Some(now);
    request.ledger_reference = ledger_reference;
    let request = request.clone();

    mark_round_completed(state, request.round)?;
    set_schedule_status(state, request.round, ScheduleStatus::Paid, Some(now));

    info!(
        group = %request.group,
        request = %request.id,
        round = request.round,
        amount = request.amount,
        "payout completed"
    );

    let next_round = advance_round(state)?;
    let group = match next_round {
        Some(_) => state.group.clone(),
        None => complete_group(state)?,
    };

    Ok(PayoutCompletion {
        request,
        group,
        next_round,
    })
}

/// Requests visible to an approved member, newest first.
pub fn list_requests(state: &GroupState, actor: MemberId) -> ChamaResult<Vec<PayoutRequest>> {
    require_approved(state.member(&actor)?)?;
    let mut requests: Vec<PayoutRequest> = state.payout_requests.values().cloned().collect();
    requests.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.round.cmp(&a.round))
    });
    Ok(requests)
}

fn scheduled_recipient(state: &GroupState, round: u32) -> ChamaResult<MemberId> {
    state
        .schedule
        .iter()
        .find(|e| e.round == round)
        .map(|e| e.member)
        .ok_or(ChamaError::RoundNotFound(round))
}

fn set_schedule_status(
    state: &mut GroupState,
    round: u32,
    status: ScheduleStatus,
    paid_at: Option<Timestamp>,
) {
    if let Some(entry) = state.schedule.iter_mut().find(|e| e.round == round) {
        entry.status = status;
        entry.paid_at = paid_at;
    }
}
