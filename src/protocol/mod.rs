//! JSON request/response protocol.
//!
//! One JSON object per request, tagged by `action`; one JSON object per
//! response, tagged by `outcome`:
//!
//! ```json
//! {"action":"join_group","group":"…","user":"…","wallet":"G…"}
//! {"outcome":"ok","data":{…}}
//! {"outcome":"rejected","kind":"capacity_exceeded","code":"group_full","message":"…"}
//! ```
//!
//! Authentication is the caller's job; ids arrive already resolved.

use crate::error::{ChamaError, ErrorKind};
use crate::group::{
    ActivationTerms, Amount, GroupId, InvitationId, MemberId, NewGroup, PayoutRequestId, UserId,
};
use crate::service::ChamaService;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Request {
    CreateGroup(NewGroup),
    GetGroup {
        group: GroupId,
    },
    ListMembers {
        group: GroupId,
    },
    InviteMember {
        group: GroupId,
        inviter: MemberId,
        email: String,
    },
    AcceptInvitation {
        invitation: InvitationId,
        user: UserId,
        email: String,
        #[serde(default)]
        wallet: String,
    },
    DeclineInvitation {
        invitation: InvitationId,
        email: String,
    },
    JoinGroup {
        group: GroupId,
        user: UserId,
        #[serde(default)]
        wallet: String,
    },
    ApproveMember {
        group: GroupId,
        actor: MemberId,
        member: MemberId,
    },
    RejectMember {
        group: GroupId,
        actor: MemberId,
        member: MemberId,
    },
    ApproveGroup {
        group: GroupId,
        actor: MemberId,
    },
    ProposePayoutOrder {
        group: GroupId,
        #[serde(default)]
        seed: Option<u64>,
    },
    ActivateGroup {
        group: GroupId,
        actor: MemberId,
        #[serde(flatten)]
        terms: ActivationTerms,
    },
    NominateAdmin {
        group: GroupId,
        nominator: MemberId,
        nominee: MemberId,
    },
    Contribute {
        group: GroupId,
        member: MemberId,
        round: u32,
        amount: Amount,
    },
    RoundStatus {
        group: GroupId,
        round: u32,
    },
    CreatePayoutRequest {
        group: GroupId,
        actor: MemberId,
        recipient: MemberId,
        amount: Amount,
        round: u32,
    },
    CreateScheduledPayout {
        group: GroupId,
        actor: MemberId,
    },
    VotePayout {
        request: PayoutRequestId,
        admin: MemberId,
        approved: bool,
    },
    CompletePayout {
        request: PayoutRequestId,
        #[serde(default)]
        ledger_reference: Option<String>,
    },
    ListPayoutRequests {
        group: GroupId,
        actor: MemberId,
    },
    PayoutSchedule {
        group: GroupId,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Response {
    Ok {
        data: Value,
    },
    Rejected {
        kind: ErrorKind,
        code: String,
        message: String,
    },
    /// The request could not be parsed.
    Malformed {
        message: String,
    },
}

impl Response {
    fn ok<T: Serialize>(value: T) -> Self {
        match serde_json::to_value(value) {
            Ok(data) => Response::Ok { data },
            Err(e) => Response::Malformed {
                message: format!("response encoding failed: {}", e),
            },
        }
    }

    fn rejected(err: ChamaError) -> Self {
        Response::Rejected {
            kind: err.kind(),
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

fn respond<T: Serialize>(result: Result<T, ChamaError>) -> Response {
    match result {
        Ok(value) => Response::ok(value),
        Err(err) => Response::rejected(err),
    }
}

/// Run one request against the service.
pub async fn dispatch(service: &ChamaService, request: Request) -> Response {
    use Request::*;
    match request {
        CreateGroup(new) => respond(service.create_group(new).await),
        GetGroup { group } => respond(service.get_group(group).await),
        ListMembers { group } => respond(service.list_members(group).await),
        InviteMember {
            group,
            inviter,
            email,
        } => respond(service.invite(group, inviter, &email).await),
        AcceptInvitation {
            invitation,
            user,
            email,
            wallet,
        } => respond(
            service
                .accept_invitation(invitation, user, &email, &wallet)
                .await,
        ),
        DeclineInvitation { invitation, email } => {
            respond(service.decline_invitation(invitation, &email).await)
        }
        JoinGroup {
            group,
            user,
            wallet,
        } => respond(service.join(group, user, &wallet).await),
        ApproveMember {
            group,
            actor,
            member,
        } => respond(service.approve_member(group, actor, member).await),
        RejectMember {
            group,
            actor,
            member,
        } => respond(service.reject_member(group, actor, member).await),
        ApproveGroup { group, actor } => respond(service.approve_group(group, actor).await),
        ProposePayoutOrder { group, seed } => {
            respond(service.propose_payout_order(group, seed).await)
        }
        ActivateGroup {
            group,
            actor,
            terms,
        } => respond(service.activate_group(group, actor, terms).await),
        NominateAdmin {
            group,
            nominator,
            nominee,
        } => respond(service.nominate_admin(group, nominator, nominee).await),
        Contribute {
            group,
            member,
            round,
            amount,
        } => respond(service.contribute(group, member, round, amount).await),
        RoundStatus { group, round } => respond(service.round_status(group, round).await),
        CreatePayoutRequest {
            group,
            actor,
            recipient,
            amount,
            round,
        } => respond(
            service
                .create_payout_request(group, actor, recipient, amount, round)
                .await,
        ),
        CreateScheduledPayout { group, actor } => {
            respond(service.create_scheduled_payout(group, actor).await)
        }
        VotePayout {
            request,
            admin,
            approved,
        } => respond(service.vote_payout(request, admin, approved).await),
        CompletePayout {
            request,
            ledger_reference,
        } => respond(service.complete_payout(request, ledger_reference).await),
        ListPayoutRequests { group, actor } => {
            respond(service.list_payout_requests(group, actor).await)
        }
        PayoutSchedule { group } => respond(service.payout_schedule(group).await),
    }
}

/// Parse one JSON line, dispatch it and encode the response.
pub async fn handle_line(service: &ChamaService, line: &str) -> String {
    let response = match serde_json::from_str::<Request>(line) {
        Ok(request) => {
            debug!(?request, "request");
            dispatch(service, request).await
        }
        Err(e) => Response::Malformed {
            message: e.to_string(),
        },
    };
    serde_json::to_string(&response).unwrap_or_else(|e| {
        format!(
            "{{\"outcome\":\"malformed\",\"message\":\"response encoding failed: {}\"}}",
            e
        )
    })
}
