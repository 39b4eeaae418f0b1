//! Booking state machine for one-to-one learning requests.
//!
//! Every mutation of a booking runs under the registry's mutex, so no
//! transition can race another transition of the same booking. Settlement
//! happens inside the same critical section as the status flip: once
//! `complete` returns success, any subsequent read observes both the
//! `Completed` status and the moved credits.

use crate::dispatch::{CertificateIssuer, Settlement, SettlementKind};
use crate::environment::Clock;
use crate::error::EngineError;
use crate::ledger::Ledger;
use crate::types::{
    Booking, BookingId, BookingStatus, Credits, Skill, SkillId, TransactionReason, TransactionRef,
    UserId,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Registry of all one-to-one bookings.
///
/// Bookings are never deleted once accepted; terminal bookings stay on
/// record for audit and history.
pub struct BookingRegistry {
    clock: Arc<dyn Clock>,
    inner: Mutex<HashMap<BookingId, Booking>>,
}

impl BookingRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            inner: Mutex::new(HashMap::new()),
        }
    }

    /// Creates a pending booking of `skill` by `learner`.
    ///
    /// No credits move and nothing is reserved at creation; funds only move
    /// at completion.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::SelfBookingNotAllowed`] when the learner is
    /// the skill's own provider.
    pub async fn create(&self, learner: UserId, skill: &Skill) -> Result<BookingId, EngineError> {
        if learner == skill.provider_id {
            return Err(EngineError::SelfBookingNotAllowed { user: learner });
        }
        let booking = Booking::new(
            BookingId::new(),
            skill.id,
            learner,
            skill.provider_id,
            self.clock.now(),
        );
        let id = booking.id;
        self.inner.lock().await.insert(id, booking);
        tracing::info!(booking = %id, %learner, provider = %skill.provider_id, "booking created");
        Ok(id)
    }

    /// Returns a snapshot of one booking.
    pub async fn get(&self, id: BookingId) -> Option<Booking> {
        self.inner.lock().await.get(&id).cloned()
    }

    /// Provider accepts a pending booking.
    ///
    /// # Errors
    ///
    /// [`EngineError::NotAuthorized`] unless `by` is the booking's provider;
    /// [`EngineError::InvalidTransition`] unless the booking is pending.
    pub async fn accept(&self, id: BookingId, by: UserId) -> Result<Booking, EngineError> {
        self.decide(id, by, BookingStatus::Accepted, "accept this booking")
            .await
    }

    /// Provider declines a pending booking.
    ///
    /// # Errors
    ///
    /// Same conditions as [`Self::accept`].
    pub async fn decline(&self, id: BookingId, by: UserId) -> Result<Booking, EngineError> {
        self.decide(id, by, BookingStatus::Declined, "decline this booking")
            .await
    }

    async fn decide(
        &self,
        id: BookingId,
        by: UserId,
        to: BookingStatus,
        action: &'static str,
    ) -> Result<Booking, EngineError> {
        let mut inner = self.inner.lock().await;
        let booking = inner
            .get_mut(&id)
            .ok_or(EngineError::BookingNotFound(id))?;
        if by != booking.provider_id {
            return Err(EngineError::NotAuthorized { actor: by, action });
        }
        booking.status = booking.status.transition(to)?;
        tracing::info!(booking = %id, status = %booking.status, "booking decided");
        Ok(booking.clone())
    }

    /// Either party calls an accepted booking off. No credits have moved
    /// yet, so there is nothing to refund.
    ///
    /// # Errors
    ///
    /// [`EngineError::NotAuthorized`] unless `by` is the learner or the
    /// provider; [`EngineError::InvalidTransition`] unless the booking is
    /// accepted.
    pub async fn cancel(&self, id: BookingId, by: UserId) -> Result<Booking, EngineError> {
        let mut inner = self.inner.lock().await;
        let booking = inner
            .get_mut(&id)
            .ok_or(EngineError::BookingNotFound(id))?;
        if !booking.is_party(by) {
            return Err(EngineError::NotAuthorized {
                actor: by,
                action: "cancel this booking",
            });
        }
        booking.status = booking.status.transition(BookingStatus::Cancelled)?;
        tracing::info!(booking = %id, by = %by, "booking cancelled");
        Ok(booking.clone())
    }

    /// Completes an accepted booking: transfers the fee from learner to
    /// provider, then flips the status, all under the registry guard.
    ///
    /// Idempotent under retry: a second call observes `Completed` and gets
    /// [`EngineError::AlreadyCompleted`] without a second transfer.
    ///
    /// # Errors
    ///
    /// [`EngineError::NotAuthorized`] unless `by` is a party to the booking;
    /// [`EngineError::AlreadyCompleted`] on retry;
    /// [`EngineError::InvalidTransition`] from any state but accepted;
    /// [`EngineError::InsufficientFunds`] when the learner cannot pay — the
    /// booking then stays accepted.
    pub async fn complete(
        &self,
        id: BookingId,
        by: UserId,
        ledger: &Ledger,
        fee: Credits,
    ) -> Result<Settlement, EngineError> {
        let mut inner = self.inner.lock().await;
        let booking = Self::completable(&mut inner, id, by)?;

        ledger.transfer(
            booking.learner_id,
            booking.provider_id,
            fee,
            TransactionReason::SessionSettlement,
            TransactionRef::Booking(id),
        )?;
        Ok(Self::commit_completion(booking, None, self.clock.now()))
    }

    /// Completes an accepted booking and issues a certificate as one atomic
    /// step: the booking can never end up `Accepted` with a certificate
    /// issued, nor `Completed` without one.
    ///
    /// The learner's fee is held first and the provider is only credited
    /// once issuance succeeds. If the issuer fails, the held fee is
    /// refunded — a credit to an existing account, which cannot fail even
    /// when the provider spent their balance while issuance was in flight —
    /// and the booking stays accepted; retry is safe.
    ///
    /// # Errors
    ///
    /// As [`Self::complete`], plus [`EngineError::SettlementFailed`] when
    /// the issuer rejects the request.
    pub async fn complete_with_certificate(
        &self,
        id: BookingId,
        by: UserId,
        learner_display_name: &str,
        ledger: &Ledger,
        fee: Credits,
        issuer: &dyn CertificateIssuer,
    ) -> Result<Settlement, EngineError> {
        let mut inner = self.inner.lock().await;
        let booking = Self::completable(&mut inner, id, by)?;
        let (learner, provider) = (booking.learner_id, booking.provider_id);

        // Both accounts must exist before any leg applies; accounts are
        // never deleted, so the credit legs below cannot fail after this.
        ledger.balance(provider)?;
        ledger.debit(
            learner,
            fee,
            TransactionReason::SessionSettlement,
            TransactionRef::Booking(id),
        )?;

        match issuer.issue(id, learner_display_name).await {
            Ok(certificate) => {
                ledger.credit(
                    provider,
                    fee,
                    TransactionReason::SessionSettlement,
                    TransactionRef::Booking(id),
                )?;
                Ok(Self::commit_completion(
                    booking,
                    Some(certificate),
                    self.clock.now(),
                ))
            }
            Err(reason) => {
                ledger.credit(
                    learner,
                    fee,
                    TransactionReason::Reversal,
                    TransactionRef::Booking(id),
                )?;
                tracing::warn!(booking = %id, %reason, "certificate issuance failed, held fee refunded");
                Err(EngineError::SettlementFailed(format!(
                    "certificate issuance failed: {reason}"
                )))
            }
        }
    }

    /// Whether any non-terminal booking still references `skill`.
    pub async fn references_skill(&self, skill: SkillId) -> bool {
        self.inner
            .lock()
            .await
            .values()
            .any(|b| b.skill_id == skill && !b.status.is_terminal())
    }

    fn completable<'a>(
        inner: &'a mut HashMap<BookingId, Booking>,
        id: BookingId,
        by: UserId,
    ) -> Result<&'a mut Booking, EngineError> {
        let booking = inner
            .get_mut(&id)
            .ok_or(EngineError::BookingNotFound(id))?;
        if !booking.is_party(by) {
            return Err(EngineError::NotAuthorized {
                actor: by,
                action: "complete this booking",
            });
        }
        if booking.status == BookingStatus::Completed {
            return Err(EngineError::AlreadyCompleted);
        }
        // Validate the edge without flipping yet; the flip commits only
        // after settlement succeeds.
        booking.status.transition(BookingStatus::Completed)?;
        Ok(booking)
    }

    fn commit_completion(
        booking: &mut Booking,
        certificate: Option<crate::types::CertificateId>,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Settlement {
        booking.status = BookingStatus::Completed;
        booking.completed_at = Some(now);
        booking.certificate_id = certificate;
        tracing::info!(booking = %booking.id, "booking completed and settled");
        Settlement {
            kind: SettlementKind::Booking(booking.id),
            skill_id: booking.skill_id,
            provider_id: booking.provider_id,
            learners: vec![booking.learner_id],
            certificate_id: certificate,
            completed_at: now,
        }
    }
}

impl std::fmt::Debug for BookingRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BookingRegistry").finish_non_exhaustive()
    }
}
