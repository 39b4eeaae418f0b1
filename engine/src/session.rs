//! Group session allocator.
//!
//! Enforces `seats ≤ capacity` and one seat per learner under concurrent
//! join attempts. The capacity check and the seat insertion happen as one
//! atomic unit under the allocator's mutex — there is no check-then-insert
//! window for two joiners to squeeze through. Credit flow differs from 1:1
//! bookings: learners pay when they join, and the host is paid once per
//! seat when the session completes.

use crate::dispatch::{Settlement, SettlementKind};
use crate::environment::Clock;
use crate::error::EngineError;
use crate::ledger::Ledger;
use crate::types::{
    Capacity, Credits, GroupSession, Seat, SeatId, SessionId, SessionStatus, Skill, SkillId,
    TransactionReason, TransactionRef, UserId,
};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Registry and roster manager for group sessions.
pub struct SessionAllocator {
    clock: Arc<dyn Clock>,
    inner: Mutex<HashMap<SessionId, GroupSession>>,
}

impl SessionAllocator {
    /// Creates an empty allocator.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            inner: Mutex::new(HashMap::new()),
        }
    }

    /// Schedules a session for `skill`, resolving the effective capacity
    /// once: the explicit override, else the skill's default, else one.
    /// The result is frozen for the session's lifetime — editing the
    /// skill's default later never resizes an existing session.
    pub async fn schedule(
        &self,
        skill: &Skill,
        capacity: Option<Capacity>,
        scheduled_at: Option<DateTime<Utc>>,
    ) -> SessionId {
        let effective = capacity
            .or(skill.default_capacity)
            .unwrap_or(Capacity::MIN);
        let session = GroupSession {
            id: SessionId::new(),
            skill_id: skill.id,
            provider_id: skill.provider_id,
            capacity: effective,
            scheduled_at,
            status: SessionStatus::Scheduled,
            seats: Vec::new(),
        };
        let id = session.id;
        self.inner.lock().await.insert(id, session);
        tracing::info!(session = %id, capacity = %effective, "session scheduled");
        id
    }

    /// Returns a snapshot of one session.
    pub async fn get(&self, id: SessionId) -> Option<GroupSession> {
        self.inner.lock().await.get(&id).cloned()
    }

    /// Host marks the session as underway; no further joins are accepted.
    ///
    /// # Errors
    ///
    /// [`EngineError::NotAuthorized`] unless `by` hosts the session;
    /// [`EngineError::InvalidTransition`] unless it is scheduled.
    pub async fn start(&self, id: SessionId, by: UserId) -> Result<(), EngineError> {
        let mut inner = self.inner.lock().await;
        let session = inner.get_mut(&id).ok_or(EngineError::SessionNotFound(id))?;
        if by != session.provider_id {
            return Err(EngineError::NotAuthorized {
                actor: by,
                action: "start this session",
            });
        }
        session.status = session.status.transition(SessionStatus::InProgress)?;
        tracing::info!(session = %id, "session started");
        Ok(())
    }

    /// A learner takes a seat, paying the fee immediately.
    ///
    /// Capacity check and seat insertion are one atomic unit. The debit
    /// happens after the seat is held; if it fails the seat is rolled back
    /// in the same critical section, never left orphaned.
    ///
    /// # Errors
    ///
    /// [`EngineError::SessionNotJoinable`] unless the session is scheduled;
    /// [`EngineError::SelfBookingNotAllowed`] for the host;
    /// [`EngineError::AlreadyJoined`] for a second seat;
    /// [`EngineError::SessionFull`] at capacity;
    /// [`EngineError::InsufficientFunds`] when the learner cannot pay.
    pub async fn join(
        &self,
        id: SessionId,
        learner: UserId,
        ledger: &Ledger,
        fee: Credits,
    ) -> Result<SeatId, EngineError> {
        let mut inner = self.inner.lock().await;
        let session = inner.get_mut(&id).ok_or(EngineError::SessionNotFound(id))?;

        if session.status != SessionStatus::Scheduled {
            return Err(EngineError::SessionNotJoinable {
                session: id,
                status: session.status.as_str(),
            });
        }
        if learner == session.provider_id {
            return Err(EngineError::SelfBookingNotAllowed { user: learner });
        }
        if session.seat_of(learner).is_some() {
            return Err(EngineError::AlreadyJoined {
                session: id,
                learner,
            });
        }
        if session.is_full() {
            return Err(EngineError::SessionFull {
                session: id,
                capacity: session.capacity,
            });
        }

        let seat = Seat {
            id: SeatId::new(),
            learner_id: learner,
            joined_at: self.clock.now(),
        };
        let seat_id = seat.id;
        session.seats.push(seat);

        if let Err(err) = ledger.debit(
            learner,
            fee,
            TransactionReason::SeatHold,
            TransactionRef::Seat(seat_id),
        ) {
            // Compensating release: the reserved seat must not outlive the
            // failed debit.
            session.seats.retain(|s| s.id != seat_id);
            tracing::warn!(session = %id, %learner, "join rolled back: {err}");
            return Err(err);
        }

        tracing::info!(session = %id, %learner, seat = %seat_id,
            seats = session.seat_count(), "seat joined");
        Ok(seat_id)
    }

    /// A learner gives their seat back and is refunded.
    ///
    /// # Errors
    ///
    /// [`EngineError::NotJoined`] when the learner holds no seat;
    /// [`EngineError::SessionNotJoinable`] once the session is terminal
    /// (a completed session's roster is part of the settled record).
    pub async fn leave(
        &self,
        id: SessionId,
        learner: UserId,
        ledger: &Ledger,
        fee: Credits,
    ) -> Result<(), EngineError> {
        let mut inner = self.inner.lock().await;
        let session = inner.get_mut(&id).ok_or(EngineError::SessionNotFound(id))?;

        if session.status.is_terminal() {
            return Err(EngineError::SessionNotJoinable {
                session: id,
                status: session.status.as_str(),
            });
        }
        let seat_id = session
            .seat_of(learner)
            .map(|s| s.id)
            .ok_or(EngineError::NotJoined {
                session: id,
                learner,
            })?;

        session.seats.retain(|s| s.id != seat_id);
        ledger.credit(
            learner,
            fee,
            TransactionReason::SeatRefund,
            TransactionRef::Seat(seat_id),
        )?;
        tracing::info!(session = %id, %learner, "seat released and refunded");
        Ok(())
    }

    /// Host completes the session: every seat settles and the host is
    /// credited `seat_count × fee` in one settlement, not one racy transfer
    /// per seat.
    ///
    /// Idempotent under retry: a second call observes `Completed` and gets
    /// [`EngineError::AlreadyCompleted`] without a second payout.
    ///
    /// # Errors
    ///
    /// [`EngineError::NotAuthorized`] unless `by` hosts the session;
    /// [`EngineError::AlreadyCompleted`] on retry;
    /// [`EngineError::InvalidTransition`] from `Cancelled`.
    pub async fn complete(
        &self,
        id: SessionId,
        by: UserId,
        ledger: &Ledger,
        fee: Credits,
    ) -> Result<Settlement, EngineError> {
        let mut inner = self.inner.lock().await;
        let session = inner.get_mut(&id).ok_or(EngineError::SessionNotFound(id))?;
        if by != session.provider_id {
            return Err(EngineError::NotAuthorized {
                actor: by,
                action: "complete this session",
            });
        }
        if session.status == SessionStatus::Completed {
            return Err(EngineError::AlreadyCompleted);
        }
        // Validate the edge before paying out; the flip commits after.
        session.status.transition(SessionStatus::Completed)?;

        let seat_ids: Vec<SeatId> = session.seats.iter().map(|s| s.id).collect();
        ledger.settle_seats(session.provider_id, &seat_ids, fee)?;

        session.status = SessionStatus::Completed;
        let now = self.clock.now();
        tracing::info!(session = %id, seats = seat_ids.len(), "session completed and settled");
        Ok(Settlement {
            kind: SettlementKind::Session(id),
            skill_id: session.skill_id,
            provider_id: session.provider_id,
            learners: session.seats.iter().map(|s| s.learner_id).collect(),
            certificate_id: None,
            completed_at: now,
        })
    }

    /// Host calls the session off; every seated learner is refunded in one
    /// settlement and the roster is retained for audit.
    ///
    /// # Errors
    ///
    /// [`EngineError::NotAuthorized`] unless `by` hosts the session;
    /// [`EngineError::InvalidTransition`] once terminal.
    pub async fn cancel(
        &self,
        id: SessionId,
        by: UserId,
        ledger: &Ledger,
        fee: Credits,
    ) -> Result<(), EngineError> {
        let mut inner = self.inner.lock().await;
        let session = inner.get_mut(&id).ok_or(EngineError::SessionNotFound(id))?;
        if by != session.provider_id {
            return Err(EngineError::NotAuthorized {
                actor: by,
                action: "cancel this session",
            });
        }
        session.status.transition(SessionStatus::Cancelled)?;

        let holders: Vec<(UserId, SeatId)> = session
            .seats
            .iter()
            .map(|s| (s.learner_id, s.id))
            .collect();
        ledger.refund_seats(&holders, fee)?;

        session.status = SessionStatus::Cancelled;
        tracing::info!(session = %id, refunded = holders.len(), "session cancelled");
        Ok(())
    }

    /// Whether any non-terminal session still references `skill`.
    pub async fn references_skill(&self, skill: SkillId) -> bool {
        self.inner
            .lock()
            .await
            .values()
            .any(|s| s.skill_id == skill && !s.status.is_terminal())
    }
}

impl std::fmt::Debug for SessionAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionAllocator").finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::environment::SystemClock;
    use crate::types::DeliveryMode;

    struct Fixture {
        allocator: SessionAllocator,
        ledger: Ledger,
        host: UserId,
    }

    fn fixture() -> Fixture {
        let clock: Arc<SystemClock> = Arc::new(SystemClock);
        let allocator = SessionAllocator::new(clock.clone());
        let ledger = Ledger::new(clock);
        let host = UserId::new();
        ledger.open_account(host, Credits::ZERO).unwrap();
        Fixture {
            allocator,
            ledger,
            host,
        }
    }

    impl Fixture {
        fn skill(&self, default_capacity: Option<u32>) -> Skill {
            Skill {
                id: SkillId::new(),
                provider_id: self.host,
                default_capacity: default_capacity.map(Capacity::new),
                mode: DeliveryMode::Any,
            }
        }

        fn learner(&self, balance: u32) -> UserId {
            let learner = UserId::new();
            self.ledger
                .open_account(learner, Credits::new(balance))
                .unwrap();
            learner
        }
    }

    #[tokio::test]
    async fn capacity_override_beats_skill_default() {
        let fx = fixture();
        let skill = fx.skill(Some(5));
        let id = fx
            .allocator
            .schedule(&skill, Some(Capacity::new(2)), None)
            .await;

        let a = fx.learner(1);
        let b = fx.learner(1);
        let c = fx.learner(1);
        fx.allocator.join(id, a, &fx.ledger, Credits::ONE).await.unwrap();
        fx.allocator.join(id, b, &fx.ledger, Credits::ONE).await.unwrap();

        let err = fx.allocator.join(id, c, &fx.ledger, Credits::ONE).await;
        assert_eq!(
            err,
            Err(EngineError::SessionFull {
                session: id,
                capacity: Capacity::new(2),
            })
        );
    }

    #[tokio::test]
    async fn capacity_falls_back_to_skill_default_then_one() {
        let fx = fixture();
        let with_default = fx
            .allocator
            .schedule(&fx.skill(Some(4)), None, None)
            .await;
        assert_eq!(
            fx.allocator.get(with_default).await.unwrap().capacity,
            Capacity::new(4)
        );

        let bare = fx.allocator.schedule(&fx.skill(None), None, None).await;
        assert_eq!(fx.allocator.get(bare).await.unwrap().capacity, Capacity::MIN);
    }

    #[tokio::test]
    async fn join_debits_and_leave_refunds() {
        let fx = fixture();
        let id = fx
            .allocator
            .schedule(&fx.skill(Some(3)), None, None)
            .await;
        let learner = fx.learner(2);

        fx.allocator
            .join(id, learner, &fx.ledger, Credits::ONE)
            .await
            .unwrap();
        assert_eq!(fx.ledger.balance(learner).unwrap(), Credits::ONE);

        fx.allocator
            .leave(id, learner, &fx.ledger, Credits::ONE)
            .await
            .unwrap();
        assert_eq!(fx.ledger.balance(learner).unwrap(), Credits::new(2));
        assert_eq!(fx.allocator.get(id).await.unwrap().seat_count(), 0);
    }

    #[tokio::test]
    async fn broke_learner_holds_no_seat() {
        let fx = fixture();
        let id = fx
            .allocator
            .schedule(&fx.skill(Some(3)), None, None)
            .await;
        let learner = fx.learner(0);

        let err = fx.allocator.join(id, learner, &fx.ledger, Credits::ONE).await;
        assert!(matches!(err, Err(EngineError::InsufficientFunds { .. })));
        assert_eq!(fx.allocator.get(id).await.unwrap().seat_count(), 0);
    }

    #[tokio::test]
    async fn one_seat_per_learner() {
        let fx = fixture();
        let id = fx
            .allocator
            .schedule(&fx.skill(Some(3)), None, None)
            .await;
        let learner = fx.learner(5);

        fx.allocator
            .join(id, learner, &fx.ledger, Credits::ONE)
            .await
            .unwrap();
        let err = fx.allocator.join(id, learner, &fx.ledger, Credits::ONE).await;
        assert_eq!(
            err,
            Err(EngineError::AlreadyJoined {
                session: id,
                learner,
            })
        );
        // Only one hold was charged.
        assert_eq!(fx.ledger.balance(learner).unwrap(), Credits::new(4));
    }

    #[tokio::test]
    async fn host_cannot_take_a_seat() {
        let fx = fixture();
        let id = fx
            .allocator
            .schedule(&fx.skill(Some(3)), None, None)
            .await;
        let err = fx.allocator.join(id, fx.host, &fx.ledger, Credits::ONE).await;
        assert_eq!(
            err,
            Err(EngineError::SelfBookingNotAllowed { user: fx.host })
        );
    }

    #[tokio::test]
    async fn complete_pays_host_once_per_seat() {
        let fx = fixture();
        let id = fx
            .allocator
            .schedule(&fx.skill(Some(3)), None, None)
            .await;
        let a = fx.learner(1);
        let b = fx.learner(1);
        fx.allocator.join(id, a, &fx.ledger, Credits::ONE).await.unwrap();
        fx.allocator.join(id, b, &fx.ledger, Credits::ONE).await.unwrap();

        let settlement = fx
            .allocator
            .complete(id, fx.host, &fx.ledger, Credits::ONE)
            .await
            .unwrap();
        assert_eq!(settlement.learners.len(), 2);
        assert_eq!(fx.ledger.balance(fx.host).unwrap(), Credits::new(2));

        // Retry: no second payout.
        let retry = fx.allocator.complete(id, fx.host, &fx.ledger, Credits::ONE).await;
        assert_eq!(retry, Err(EngineError::AlreadyCompleted));
        assert_eq!(fx.ledger.balance(fx.host).unwrap(), Credits::new(2));
    }

    #[tokio::test]
    async fn leaving_a_completed_session_is_rejected() {
        let fx = fixture();
        let id = fx
            .allocator
            .schedule(&fx.skill(Some(3)), None, None)
            .await;
        let learner = fx.learner(1);
        fx.allocator
            .join(id, learner, &fx.ledger, Credits::ONE)
            .await
            .unwrap();
        fx.allocator
            .complete(id, fx.host, &fx.ledger, Credits::ONE)
            .await
            .unwrap();

        let err = fx.allocator.leave(id, learner, &fx.ledger, Credits::ONE).await;
        assert_eq!(
            err,
            Err(EngineError::SessionNotJoinable {
                session: id,
                status: "completed",
            })
        );
    }

    #[tokio::test]
    async fn join_is_frozen_once_started() {
        let fx = fixture();
        let id = fx
            .allocator
            .schedule(&fx.skill(Some(3)), None, None)
            .await;
        fx.allocator.start(id, fx.host).await.unwrap();

        let learner = fx.learner(1);
        let err = fx.allocator.join(id, learner, &fx.ledger, Credits::ONE).await;
        assert_eq!(
            err,
            Err(EngineError::SessionNotJoinable {
                session: id,
                status: "in_progress",
            })
        );
    }

    #[tokio::test]
    async fn leaving_an_in_progress_session_still_refunds() {
        let fx = fixture();
        let id = fx
            .allocator
            .schedule(&fx.skill(Some(3)), None, None)
            .await;
        let learner = fx.learner(1);
        fx.allocator
            .join(id, learner, &fx.ledger, Credits::ONE)
            .await
            .unwrap();
        fx.allocator.start(id, fx.host).await.unwrap();

        fx.allocator
            .leave(id, learner, &fx.ledger, Credits::ONE)
            .await
            .unwrap();
        assert_eq!(fx.ledger.balance(learner).unwrap(), Credits::ONE);
        assert_eq!(fx.allocator.get(id).await.unwrap().seat_count(), 0);
    }

    #[tokio::test]
    async fn cancel_refunds_every_seat() {
        let fx = fixture();
        let id = fx
            .allocator
            .schedule(&fx.skill(Some(3)), None, None)
            .await;
        let a = fx.learner(1);
        let b = fx.learner(1);
        fx.allocator.join(id, a, &fx.ledger, Credits::ONE).await.unwrap();
        fx.allocator.join(id, b, &fx.ledger, Credits::ONE).await.unwrap();

        fx.allocator
            .cancel(id, fx.host, &fx.ledger, Credits::ONE)
            .await
            .unwrap();
        assert_eq!(fx.ledger.balance(a).unwrap(), Credits::ONE);
        assert_eq!(fx.ledger.balance(b).unwrap(), Credits::ONE);
        assert_eq!(fx.ledger.balance(fx.host).unwrap(), Credits::ZERO);

        let session = fx.allocator.get(id).await.unwrap();
        assert_eq!(session.status, SessionStatus::Cancelled);
        // Roster retained for audit.
        assert_eq!(session.seat_count(), 2);
    }
}
