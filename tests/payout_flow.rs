//! Integration tests for contribution rounds and payout authorization.
//!
//! Tests the rotation lifecycle:
//! 1. Every approved member contributes to the current round
//! 2. An admin opens a payout request for the scheduled recipient
//! 3. Admins vote (quorum approves, any rejection vetoes)
//! 4. The ledger layer reports completion
//! 5. The next round opens, or the group completes after the last one

use chama::clock::FixedClock;
use chama::group::{
    ActivationTerms, GroupId, GroupRules, GroupStatus, MemberId, NewGroup, PayoutStatus,
    RoundStatus, ScheduleStatus, UserId,
};
use chama::persistence::MemoryGroupStore;
use chama::{ChamaError, ChamaService, ErrorKind};
use std::sync::Arc;
use std::time::Duration;

const AMOUNT: u64 = 250;

// === Test Fixtures ===

struct ActiveGroup {
    service: ChamaService,
    clock: FixedClock,
    group: GroupId,
    creator: MemberId,
    /// Payout order (join order, creator first)
    members: Vec<MemberId>,
}

/// Active three-member group paying in join order.
async fn active_group(rules: GroupRules) -> ActiveGroup {
    let clock = FixedClock::new(1_000);
    let service = ChamaService::new(
        rules,
        Arc::new(MemoryGroupStore::new()),
        Arc::new(clock.clone()),
        Vec::new(),
    );
    let created = service
        .create_group(NewGroup {
            creator: UserId::new(),
            name: "Jirani".to_string(),
            description: String::new(),
            wallet: "GPOOL".to_string(),
            creator_wallet: String::new(),
            min_members: None,
            max_members: None,
        })
        .await
        .unwrap();
    let group = created.group.id;
    let creator = created.creator.id;

    let mut members = vec![creator];
    for _ in 0..2 {
        clock.advance(Duration::from_secs(1));
        let member = service.join(group, UserId::new(), "GW").await.unwrap();
        service.approve_member(group, creator, member.id).await.unwrap();
        members.push(member.id);
    }
    service.approve_group(group, creator).await.unwrap();

    let order = service.propose_payout_order(group, None).await.unwrap();
    assert_eq!(order, members);
    service
        .activate_group(
            group,
            creator,
            ActivationTerms {
                contribution_amount: AMOUNT,
                contribution_period_days: 30,
                payout_order: order,
            },
        )
        .await
        .unwrap();

    ActiveGroup {
        service,
        clock,
        group,
        creator,
        members,
    }
}

impl ActiveGroup {
    async fn fill_round(&self, round: u32) {
        for member in &self.members {
            self.service
                .contribute(self.group, *member, round, AMOUNT)
                .await
                .unwrap();
        }
    }

    /// Promote `members[1]` to admin via two distinct nominations.
    async fn promote_second_admin(&self) -> MemberId {
        let nominee = self.members[1];
        self.service
            .nominate_admin(self.group, self.members[0], nominee)
            .await
            .unwrap();
        let outcome = self
            .service
            .nominate_admin(self.group, self.members[2], nominee)
            .await
            .unwrap();
        assert!(outcome.promoted);
        nominee
    }
}

// === Contributions ===

#[tokio::test]
async fn test_round_fills_then_becomes_ready() {
    let g = active_group(GroupRules::default()).await;

    g.service
        .contribute(g.group, g.members[0], 1, AMOUNT)
        .await
        .unwrap();
    let summary = g.service.round_status(g.group, 1).await.unwrap();
    assert_eq!(summary.status, RoundStatus::Collecting);
    assert_eq!(summary.paid_count, 1);
    assert_eq!(summary.outstanding.len(), 2);

    let wrong = g
        .service
        .contribute(g.group, g.members[1], 1, AMOUNT + 1)
        .await
        .unwrap_err();
    assert_eq!(
        wrong,
        ChamaError::WrongAmount {
            expected: AMOUNT,
            got: AMOUNT + 1
        }
    );

    let twice = g
        .service
        .contribute(g.group, g.members[0], 1, AMOUNT)
        .await
        .unwrap_err();
    assert_eq!(twice.kind(), ErrorKind::Conflict);

    let future = g
        .service
        .contribute(g.group, g.members[1], 2, AMOUNT)
        .await
        .unwrap_err();
    assert_eq!(future, ChamaError::WrongRound { expected: 1, got: 2 });

    g.service
        .contribute(g.group, g.members[1], 1, AMOUNT)
        .await
        .unwrap();
    let receipt = g
        .service
        .contribute(g.group, g.members[2], 1, AMOUNT)
        .await
        .unwrap();
    assert_eq!(receipt.round.status, RoundStatus::ReadyForPayout);
    assert_eq!(receipt.round.total_received, 3 * AMOUNT);
    assert!(receipt.round.outstanding.is_empty());
}

#[tokio::test]
async fn test_payout_blocked_until_round_full() {
    let g = active_group(GroupRules::default()).await;
    g.service
        .contribute(g.group, g.members[0], 1, AMOUNT)
        .await
        .unwrap();

    let err = g
        .service
        .create_payout_request(g.group, g.creator, g.members[0], AMOUNT, 1)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        ChamaError::RoundNotReady {
            round: 1,
            paid: 1,
            required: 3
        }
    );
}

// === Payout requests ===

#[tokio::test]
async fn test_request_checks_recipient_and_pool() {
    let g = active_group(GroupRules::default()).await;
    g.fill_round(1).await;

    let out_of_turn = g
        .service
        .create_payout_request(g.group, g.creator, g.members[1], AMOUNT, 1)
        .await
        .unwrap_err();
    assert!(matches!(out_of_turn, ChamaError::RecipientOutOfTurn { .. }));

    let too_much = g
        .service
        .create_payout_request(g.group, g.creator, g.members[0], 3 * AMOUNT + 1, 1)
        .await
        .unwrap_err();
    assert!(matches!(too_much, ChamaError::InsufficientPool { .. }));

    let not_admin = g
        .service
        .create_payout_request(g.group, g.members[2], g.members[0], AMOUNT, 1)
        .await
        .unwrap_err();
    assert_eq!(not_admin.kind(), ErrorKind::Forbidden);

    let request = g
        .service
        .create_payout_request(g.group, g.creator, g.members[0], 3 * AMOUNT, 1)
        .await
        .unwrap();
    assert_eq!(request.status, PayoutStatus::Pending);

    let second = g
        .service
        .create_payout_request(g.group, g.creator, g.members[0], AMOUNT, 1)
        .await
        .unwrap_err();
    assert_eq!(second, ChamaError::OpenRequestExists(1));

    let schedule = g.service.payout_schedule(g.group).await.unwrap();
    assert_eq!(schedule[0].status, ScheduleStatus::Pending);
}

#[tokio::test]
async fn test_single_admin_quorum_approves() {
    let g = active_group(GroupRules::default().with_payout_quorum(1)).await;
    g.fill_round(1).await;

    let request = g
        .service
        .create_scheduled_payout(g.group, g.creator)
        .await
        .unwrap();
    assert_eq!(request.recipient, g.members[0]);
    assert_eq!(request.amount, 3 * AMOUNT);

    let decided = g
        .service
        .vote_payout(request.id, g.creator, true)
        .await
        .unwrap();
    assert_eq!(decided.status, PayoutStatus::Approved);
}

#[tokio::test]
async fn test_two_admin_quorum_waits_for_second_vote() {
    let g = active_group(GroupRules::default()).await;
    let second_admin = g.promote_second_admin().await;
    g.fill_round(1).await;

    let request = g
        .service
        .create_scheduled_payout(g.group, g.creator)
        .await
        .unwrap();

    let after_one = g
        .service
        .vote_payout(request.id, g.creator, true)
        .await
        .unwrap();
    assert_eq!(after_one.status, PayoutStatus::Pending);

    // A repeat vote replaces the earlier one rather than counting twice.
    let repeat = g
        .service
        .vote_payout(request.id, g.creator, true)
        .await
        .unwrap();
    assert_eq!(repeat.status, PayoutStatus::Pending);
    assert_eq!(repeat.approvals.len(), 1);

    let plain_member = g
        .service
        .vote_payout(request.id, g.members[2], true)
        .await
        .unwrap_err();
    assert_eq!(plain_member.kind(), ErrorKind::Forbidden);

    let after_two = g
        .service
        .vote_payout(request.id, second_admin, true)
        .await
        .unwrap();
    assert_eq!(after_two.status, PayoutStatus::Approved);

    let late = g
        .service
        .vote_payout(request.id, second_admin, false)
        .await
        .unwrap_err();
    assert!(matches!(late, ChamaError::PayoutNotActionable { .. }));
}

#[tokio::test]
async fn test_single_rejection_vetoes() {
    let g = active_group(GroupRules::default()).await;
    let second_admin = g.promote_second_admin().await;
    g.fill_round(1).await;

    let request = g
        .service
        .create_scheduled_payout(g.group, g.creator)
        .await
        .unwrap();
    g.service
        .vote_payout(request.id, g.creator, true)
        .await
        .unwrap();
    let vetoed = g
        .service
        .vote_payout(request.id, second_admin, false)
        .await
        .unwrap();
    assert_eq!(vetoed.status, PayoutStatus::Rejected);

    let schedule = g.service.payout_schedule(g.group).await.unwrap();
    assert_eq!(schedule[0].status, ScheduleStatus::Scheduled);

    // A vetoed request does not block a fresh one for the same round.
    let retry = g
        .service
        .create_scheduled_payout(g.group, g.creator)
        .await
        .unwrap();
    assert_ne!(retry.id, request.id);

    let listed = g
        .service
        .list_payout_requests(g.group, g.members[2])
        .await
        .unwrap();
    assert_eq!(listed.len(), 2);
}

#[tokio::test]
async fn test_complete_requires_approval() {
    let g = active_group(GroupRules::default()).await;
    g.fill_round(1).await;
    let request = g
        .service
        .create_scheduled_payout(g.group, g.creator)
        .await
        .unwrap();

    let err = g
        .service
        .complete_payout(request.id, None)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        ChamaError::PayoutNotActionable {
            id: request.id,
            status: PayoutStatus::Pending
        }
    );
}

// === Full rotation ===

#[tokio::test]
async fn test_full_rotation_completes_group() {
    let g = active_group(GroupRules::default().with_payout_quorum(1)).await;

    for round in 1..=3u32 {
        g.clock.advance(Duration::from_secs(60));
        g.fill_round(round).await;

        let request = g
            .service
            .create_scheduled_payout(g.group, g.creator)
            .await
            .unwrap();
        assert_eq!(request.recipient, g.members[round as usize - 1]);
        g.service
            .vote_payout(request.id, g.creator, true)
            .await
            .unwrap();

        let done = g
            .service
            .complete_payout(request.id, Some(format!("tx-{}", round)))
            .await
            .unwrap();
        assert_eq!(done.request.status, PayoutStatus::Completed);
        assert_eq!(done.request.ledger_reference, Some(format!("tx-{}", round)));

        if round < 3 {
            assert_eq!(done.next_round, Some(round + 1));
            assert_eq!(done.group.current_round, round + 1);
            assert_eq!(done.group.status, GroupStatus::Active);
        } else {
            assert_eq!(done.next_round, None);
            assert_eq!(done.group.status, GroupStatus::Completed);
            assert_eq!(done.group.next_contribution_date, None);
        }

        let paid = g.service.round_status(g.group, round).await.unwrap();
        assert_eq!(paid.status, RoundStatus::Completed);
    }

    let schedule = g.service.payout_schedule(g.group).await.unwrap();
    assert!(schedule
        .iter()
        .all(|e| e.status == ScheduleStatus::Paid && e.paid_at.is_some()));

    let err = g
        .service
        .contribute(g.group, g.members[0], 3, AMOUNT)
        .await
        .unwrap_err();
    assert_eq!(err, ChamaError::GroupNotActive(GroupStatus::Completed));
}
