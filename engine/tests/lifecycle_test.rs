//! End-to-end lifecycle tests through the marketplace facade.
//!
//! Cover the 1:1 booking path (request, decision, settlement, certificate,
//! side-effect fan-out) and the group-session path (scheduling, capacity
//! resolution, join/leave credit flow, host payout, cancellation refunds).

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use skillswap_engine::{
    Capacity, Collaborators, Config, Credits, DeliveryMode, EngineError, Marketplace,
    NotificationKind, SystemClock, TransactionRef, UserId,
};
use skillswap_testing::{
    FailingCertificates, NoBadges, RecordingSink, ScriptedBadges, StubCertificates,
};
use std::sync::Arc;

struct World {
    market: Marketplace,
    sink: Arc<RecordingSink>,
    badges: Arc<ScriptedBadges>,
    certificates: Arc<StubCertificates>,
}

fn world() -> World {
    let sink = Arc::new(RecordingSink::new());
    let badges = Arc::new(ScriptedBadges::new());
    let certificates = Arc::new(StubCertificates::new());
    let market = Marketplace::new(
        Config {
            signup_grant: Credits::new(2),
            session_fee: Credits::ONE,
        },
        Arc::new(SystemClock),
        Collaborators {
            sink: sink.clone(),
            badges: badges.clone(),
            certificates: certificates.clone(),
        },
    );
    World {
        market,
        sink,
        badges,
        certificates,
    }
}

#[tokio::test]
async fn one_to_one_booking_settles_and_fans_out() {
    let w = world();
    let learner = UserId::new();
    let provider = UserId::new();
    w.market.register_user(learner).unwrap();
    w.market.register_user(provider).unwrap();

    let skill = w
        .market
        .publish_skill(provider, None, DeliveryMode::Online)
        .await
        .unwrap();
    let booking = w.market.create_booking(learner, skill).await.unwrap();

    w.market.accept_booking(booking, provider).await.unwrap();
    assert_eq!(
        w.sink
            .sent_to(learner, NotificationKind::BookingAccepted)
            .len(),
        1
    );

    w.badges.award_next(provider, "First Session Taught");
    w.market.complete_booking(booking, provider).await.unwrap();

    // Settlement: learner paid one, provider earned one.
    assert_eq!(w.market.balance(learner).unwrap(), Credits::ONE);
    assert_eq!(w.market.balance(provider).unwrap(), Credits::new(3));

    // Fan-out: completion notices for both parties, one badge notice.
    assert_eq!(
        w.sink
            .sent_to(learner, NotificationKind::SessionCompleted)
            .len(),
        1
    );
    assert_eq!(
        w.sink
            .sent_to(provider, NotificationKind::SessionCompleted)
            .len(),
        1
    );
    let badge_notes = w.sink.sent_to(provider, NotificationKind::BadgeAwarded);
    assert_eq!(badge_notes.len(), 1);
    assert!(badge_notes[0].message.contains("First Session Taught"));
}

#[tokio::test]
async fn declined_booking_cannot_be_accepted_later() {
    let w = world();
    let learner = UserId::new();
    let provider = UserId::new();
    w.market.register_user(learner).unwrap();
    w.market.register_user(provider).unwrap();

    let skill = w
        .market
        .publish_skill(provider, None, DeliveryMode::Any)
        .await
        .unwrap();
    let booking = w.market.create_booking(learner, skill).await.unwrap();

    w.market.decline_booking(booking, provider).await.unwrap();
    assert_eq!(
        w.sink
            .sent_to(learner, NotificationKind::BookingDeclined)
            .len(),
        1
    );

    let err = w.market.accept_booking(booking, provider).await;
    assert_eq!(
        err,
        Err(EngineError::InvalidTransition {
            from: "declined",
            to: "accepted",
        })
    );
}

#[tokio::test]
async fn retry_of_complete_settles_exactly_once() {
    let w = world();
    let learner = UserId::new();
    let provider = UserId::new();
    w.market.register_user(learner).unwrap();
    w.market.register_user(provider).unwrap();

    let skill = w
        .market
        .publish_skill(provider, None, DeliveryMode::Any)
        .await
        .unwrap();
    let booking = w.market.create_booking(learner, skill).await.unwrap();
    w.market.accept_booking(booking, provider).await.unwrap();

    w.market.complete_booking(booking, learner).await.unwrap();
    assert_eq!(
        w.market.complete_booking(booking, provider).await,
        Err(EngineError::AlreadyCompleted)
    );

    // One transfer: two entries for the booking, netting to zero.
    let entries = w
        .market
        .ledger()
        .transactions_for(TransactionRef::Booking(booking));
    assert_eq!(entries.len(), 2);
    assert_eq!(entries.iter().map(|t| t.delta).sum::<i64>(), 0);

    // Exactly one round of completion notices despite the retry.
    assert_eq!(
        w.sink
            .sent_to(learner, NotificationKind::SessionCompleted)
            .len(),
        1
    );
}

#[tokio::test]
async fn certificate_and_completion_are_one_step() {
    let w = world();
    let learner = UserId::new();
    let provider = UserId::new();
    w.market.register_user(learner).unwrap();
    w.market.register_user(provider).unwrap();

    let skill = w
        .market
        .publish_skill(provider, None, DeliveryMode::Offline)
        .await
        .unwrap();
    let booking = w.market.create_booking(learner, skill).await.unwrap();
    w.market.accept_booking(booking, provider).await.unwrap();

    w.market
        .complete_booking_with_certificate(booking, provider, "Ada Lovelace")
        .await
        .unwrap();

    let snapshot = w.market.booking(booking).await.unwrap();
    assert!(snapshot.certificate_id.is_some());
    assert_eq!(w.certificates.issued(), vec![(booking, "Ada Lovelace".to_string())]);
    assert_eq!(
        w.sink
            .sent_to(learner, NotificationKind::CertificateIssued)
            .len(),
        1
    );
}

#[tokio::test]
async fn failed_issuance_rolls_the_whole_completion_back() {
    let sink = Arc::new(RecordingSink::new());
    let market = Marketplace::new(
        Config {
            signup_grant: Credits::new(2),
            session_fee: Credits::ONE,
        },
        Arc::new(SystemClock),
        Collaborators {
            sink: sink.clone(),
            badges: Arc::new(NoBadges),
            certificates: Arc::new(FailingCertificates),
        },
    );
    let learner = UserId::new();
    let provider = UserId::new();
    market.register_user(learner).unwrap();
    market.register_user(provider).unwrap();

    let skill = market
        .publish_skill(provider, None, DeliveryMode::Any)
        .await
        .unwrap();
    let booking = market.create_booking(learner, skill).await.unwrap();
    market.accept_booking(booking, provider).await.unwrap();

    let err = market
        .complete_booking_with_certificate(booking, provider, "Ada Lovelace")
        .await;
    assert!(matches!(err, Err(EngineError::SettlementFailed(_))));

    // The booking is still accepted, balances are back where they started,
    // and no completion side effects fired.
    let snapshot = market.booking(booking).await.unwrap();
    assert_eq!(snapshot.status.as_str(), "accepted");
    assert!(snapshot.certificate_id.is_none());
    assert_eq!(market.balance(learner).unwrap(), Credits::new(2));
    assert_eq!(market.balance(provider).unwrap(), Credits::new(2));
    assert!(sink
        .sent_to(learner, NotificationKind::SessionCompleted)
        .is_empty());

    // The hold and its refund are both on the record, netting to zero.
    let entries = market
        .ledger()
        .transactions_for(TransactionRef::Booking(booking));
    assert_eq!(entries.len(), 2);
    assert_eq!(entries.iter().map(|t| t.delta).sum::<i64>(), 0);

    // Retry is safe: the booking can still be completed without a certificate.
    market.complete_booking(booking, provider).await.unwrap();
    assert_eq!(market.balance(provider).unwrap(), Credits::new(3));
}

#[tokio::test]
async fn session_override_capacity_beats_skill_default() {
    let w = world();
    let provider = UserId::new();
    w.market.register_user(provider).unwrap();
    let skill = w
        .market
        .publish_skill(provider, Some(Capacity::new(5)), DeliveryMode::Online)
        .await
        .unwrap();

    let session = w
        .market
        .schedule_session(skill, provider, Some(Capacity::new(2)), None)
        .await
        .unwrap();

    let mut learners = Vec::new();
    for _ in 0..3 {
        let learner = UserId::new();
        w.market.register_user(learner).unwrap();
        learners.push(learner);
    }

    w.market.join_session(session, learners[0]).await.unwrap();
    w.market.join_session(session, learners[1]).await.unwrap();
    let err = w.market.join_session(session, learners[2]).await;
    assert_eq!(
        err,
        Err(EngineError::SessionFull {
            session,
            capacity: Capacity::new(2),
        })
    );
}

#[tokio::test]
async fn group_session_full_lifecycle() {
    let w = world();
    let host = UserId::new();
    w.market.register_user(host).unwrap();
    let skill = w
        .market
        .publish_skill(host, Some(Capacity::new(4)), DeliveryMode::Any)
        .await
        .unwrap();
    let session = w
        .market
        .schedule_session(skill, host, None, None)
        .await
        .unwrap();

    let a = UserId::new();
    let b = UserId::new();
    let c = UserId::new();
    for learner in [a, b, c] {
        w.market.register_user(learner).unwrap();
        w.market.join_session(session, learner).await.unwrap();
    }

    // One learner thinks better of it; their hold comes back.
    w.market.leave_session(session, c).await.unwrap();
    assert_eq!(w.market.balance(c).unwrap(), Credits::new(2));

    w.market.start_session(session, host).await.unwrap();
    w.market.complete_session(session, host).await.unwrap();

    // Host paid once per remaining seat; roster settled.
    assert_eq!(w.market.balance(host).unwrap(), Credits::new(4));
    let snapshot = w.market.session(session).await.unwrap();
    assert_eq!(snapshot.status.as_str(), "completed");
    assert_eq!(snapshot.seat_count(), 2);

    // Completion notices for host and both seated learners, none for the
    // learner who left.
    for user in [host, a, b] {
        assert_eq!(
            w.sink.sent_to(user, NotificationKind::SessionCompleted).len(),
            1
        );
    }
    assert!(w.sink.sent_to(c, NotificationKind::SessionCompleted).is_empty());
}

#[tokio::test]
async fn cancelled_session_refunds_the_roster() {
    let w = world();
    let host = UserId::new();
    w.market.register_user(host).unwrap();
    let skill = w
        .market
        .publish_skill(host, Some(Capacity::new(3)), DeliveryMode::Any)
        .await
        .unwrap();
    let session = w
        .market
        .schedule_session(skill, host, None, None)
        .await
        .unwrap();

    let learner = UserId::new();
    w.market.register_user(learner).unwrap();
    w.market.join_session(session, learner).await.unwrap();
    assert_eq!(w.market.balance(learner).unwrap(), Credits::ONE);

    w.market.cancel_session(session, host).await.unwrap();
    assert_eq!(w.market.balance(learner).unwrap(), Credits::new(2));
    assert_eq!(w.market.balance(host).unwrap(), Credits::new(2));
}

#[tokio::test]
async fn skills_cannot_retire_while_referenced() {
    let w = world();
    let learner = UserId::new();
    let provider = UserId::new();
    w.market.register_user(learner).unwrap();
    w.market.register_user(provider).unwrap();

    let skill = w
        .market
        .publish_skill(provider, None, DeliveryMode::Any)
        .await
        .unwrap();
    let booking = w.market.create_booking(learner, skill).await.unwrap();

    assert_eq!(
        w.market.retire_skill(skill, provider).await,
        Err(EngineError::SkillInUse(skill))
    );

    w.market.decline_booking(booking, provider).await.unwrap();
    w.market.retire_skill(skill, provider).await.unwrap();

    // Gone from the catalog: new bookings are refused.
    assert_eq!(
        w.market.create_booking(learner, skill).await,
        Err(EngineError::SkillNotFound(skill))
    );
}
