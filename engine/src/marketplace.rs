//! The marketplace facade: the engine's inbound surface.
//!
//! Wires the ledger, catalog, booking registry, session allocator, and
//! completion dispatcher together. Every operation here is one of the
//! inbound calls the surrounding application makes; side effects are
//! dispatched strictly after the underlying transition has committed, so
//! retries of a transition can never re-fire them.

use crate::booking::BookingRegistry;
use crate::catalog::SkillCatalog;
use crate::config::Config;
use crate::dispatch::{
    BadgeEvaluator, CertificateIssuer, CompletionDispatcher, NotificationSink, Settlement,
};
use crate::environment::Clock;
use crate::error::EngineError;
use crate::ledger::Ledger;
use crate::session::SessionAllocator;
use crate::types::{
    Booking, BookingId, Capacity, Credits, DeliveryMode, GroupSession, SeatId, SessionId, SkillId,
    UserId,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Collaborators the marketplace consumes but does not implement.
#[derive(Clone)]
pub struct Collaborators {
    /// Outbound notification channel.
    pub sink: Arc<dyn NotificationSink>,
    /// Badge rule engine.
    pub badges: Arc<dyn BadgeEvaluator>,
    /// Certificate issuer for 1:1 completions.
    pub certificates: Arc<dyn CertificateIssuer>,
}

/// The assembled booking and credit engine.
pub struct Marketplace {
    config: Config,
    ledger: Ledger,
    catalog: SkillCatalog,
    bookings: BookingRegistry,
    sessions: SessionAllocator,
    dispatcher: CompletionDispatcher,
    certificates: Arc<dyn CertificateIssuer>,
}

impl Marketplace {
    /// Assembles the engine over its collaborators.
    #[must_use]
    pub fn new(config: Config, clock: Arc<dyn Clock>, collaborators: Collaborators) -> Self {
        Self {
            config,
            ledger: Ledger::new(Arc::clone(&clock)),
            catalog: SkillCatalog::new(),
            bookings: BookingRegistry::new(Arc::clone(&clock)),
            sessions: SessionAllocator::new(clock),
            dispatcher: CompletionDispatcher::new(collaborators.sink, collaborators.badges),
            certificates: collaborators.certificates,
        }
    }

    // ========== Accounts & catalog ==========

    /// Registers a user, opening their credit account with the configured
    /// signup grant.
    ///
    /// # Errors
    ///
    /// [`EngineError::AccountExists`] if already registered.
    pub fn register_user(&self, user: UserId) -> Result<Credits, EngineError> {
        self.ledger.open_account(user, self.config.signup_grant)
    }

    /// Current credit balance.
    ///
    /// # Errors
    ///
    /// [`EngineError::AccountNotFound`] for unknown users.
    pub fn balance(&self, user: UserId) -> Result<Credits, EngineError> {
        self.ledger.balance(user)
    }

    /// Publishes a skill offering.
    ///
    /// # Errors
    ///
    /// [`EngineError::AccountNotFound`] if the provider never registered.
    pub async fn publish_skill(
        &self,
        provider: UserId,
        default_capacity: Option<Capacity>,
        mode: DeliveryMode,
    ) -> Result<SkillId, EngineError> {
        self.ledger.balance(provider)?;
        Ok(self.catalog.publish(provider, default_capacity, mode).await)
    }

    /// Retires a skill, refused while any non-terminal booking or session
    /// still references it.
    ///
    /// # Errors
    ///
    /// [`EngineError::SkillInUse`] while live references exist, plus the
    /// catalog's own not-found and authorization errors.
    pub async fn retire_skill(&self, skill: SkillId, by: UserId) -> Result<(), EngineError> {
        if self.bookings.references_skill(skill).await
            || self.sessions.references_skill(skill).await
        {
            return Err(EngineError::SkillInUse(skill));
        }
        self.catalog.retire(skill, by).await
    }

    // ========== One-to-one bookings ==========

    /// Learner requests a booking against a skill.
    ///
    /// # Errors
    ///
    /// [`EngineError::SkillNotFound`], [`EngineError::AccountNotFound`], or
    /// [`EngineError::SelfBookingNotAllowed`].
    pub async fn create_booking(
        &self,
        learner: UserId,
        skill: SkillId,
    ) -> Result<BookingId, EngineError> {
        self.ledger.balance(learner)?;
        let skill = self.catalog.get(skill).await?;
        self.bookings.create(learner, &skill).await
    }

    /// Provider accepts a pending booking; the learner is notified after
    /// the transition commits.
    ///
    /// # Errors
    ///
    /// See [`BookingRegistry::accept`].
    pub async fn accept_booking(&self, id: BookingId, by: UserId) -> Result<(), EngineError> {
        let booking = self.bookings.accept(id, by).await?;
        self.dispatcher
            .booking_decision(booking.learner_id, true)
            .await;
        Ok(())
    }

    /// Provider declines a pending booking; the learner is notified after
    /// the transition commits.
    ///
    /// # Errors
    ///
    /// See [`BookingRegistry::decline`].
    pub async fn decline_booking(&self, id: BookingId, by: UserId) -> Result<(), EngineError> {
        let booking = self.bookings.decline(id, by).await?;
        self.dispatcher
            .booking_decision(booking.learner_id, false)
            .await;
        Ok(())
    }

    /// Either party calls an accepted booking off.
    ///
    /// # Errors
    ///
    /// See [`BookingRegistry::cancel`].
    pub async fn cancel_booking(&self, id: BookingId, by: UserId) -> Result<(), EngineError> {
        self.bookings.cancel(id, by).await.map(|_| ())
    }

    /// Completes a booking: settles one fee learner → provider, then fans
    /// out notifications and badge evaluation exactly once.
    ///
    /// # Errors
    ///
    /// See [`BookingRegistry::complete`].
    pub async fn complete_booking(&self, id: BookingId, by: UserId) -> Result<(), EngineError> {
        let settlement = self
            .bookings
            .complete(id, by, &self.ledger, self.config.session_fee)
            .await?;
        self.dispatch(&settlement).await;
        Ok(())
    }

    /// Completes a booking and issues a certificate as one atomic step.
    ///
    /// # Errors
    ///
    /// See [`BookingRegistry::complete_with_certificate`].
    pub async fn complete_booking_with_certificate(
        &self,
        id: BookingId,
        by: UserId,
        learner_display_name: &str,
    ) -> Result<(), EngineError> {
        let settlement = self
            .bookings
            .complete_with_certificate(
                id,
                by,
                learner_display_name,
                &self.ledger,
                self.config.session_fee,
                self.certificates.as_ref(),
            )
            .await?;
        self.dispatch(&settlement).await;
        Ok(())
    }

    /// Returns a snapshot of one booking.
    pub async fn booking(&self, id: BookingId) -> Option<Booking> {
        self.bookings.get(id).await
    }

    // ========== Group sessions ==========

    /// Provider schedules a group session for their own skill.
    ///
    /// # Errors
    ///
    /// [`EngineError::SkillNotFound`], or [`EngineError::NotAuthorized`]
    /// when `by` does not own the skill.
    pub async fn schedule_session(
        &self,
        skill: SkillId,
        by: UserId,
        capacity: Option<Capacity>,
        scheduled_at: Option<DateTime<Utc>>,
    ) -> Result<SessionId, EngineError> {
        let skill = self.catalog.get(skill).await?;
        if skill.provider_id != by {
            return Err(EngineError::NotAuthorized {
                actor: by,
                action: "schedule a session for this skill",
            });
        }
        Ok(self.sessions.schedule(&skill, capacity, scheduled_at).await)
    }

    /// Host marks a session as underway.
    ///
    /// # Errors
    ///
    /// See [`SessionAllocator::start`].
    pub async fn start_session(&self, id: SessionId, by: UserId) -> Result<(), EngineError> {
        self.sessions.start(id, by).await
    }

    /// Learner joins a session, paying the fee immediately.
    ///
    /// # Errors
    ///
    /// See [`SessionAllocator::join`].
    pub async fn join_session(&self, id: SessionId, learner: UserId) -> Result<SeatId, EngineError> {
        self.ledger.balance(learner)?;
        self.sessions
            .join(id, learner, &self.ledger, self.config.session_fee)
            .await
    }

    /// Learner leaves a session and is refunded.
    ///
    /// # Errors
    ///
    /// See [`SessionAllocator::leave`].
    pub async fn leave_session(&self, id: SessionId, learner: UserId) -> Result<(), EngineError> {
        self.sessions
            .leave(id, learner, &self.ledger, self.config.session_fee)
            .await
    }

    /// Host completes a session: the roster settles, the host is paid once
    /// per seat, and the dispatcher fans out exactly once.
    ///
    /// # Errors
    ///
    /// See [`SessionAllocator::complete`].
    pub async fn complete_session(&self, id: SessionId, by: UserId) -> Result<(), EngineError> {
        let settlement = self
            .sessions
            .complete(id, by, &self.ledger, self.config.session_fee)
            .await?;
        self.dispatch(&settlement).await;
        Ok(())
    }

    /// Host cancels a session; every seat is refunded.
    ///
    /// # Errors
    ///
    /// See [`SessionAllocator::cancel`].
    pub async fn cancel_session(&self, id: SessionId, by: UserId) -> Result<(), EngineError> {
        self.sessions
            .cancel(id, by, &self.ledger, self.config.session_fee)
            .await
    }

    /// Returns a snapshot of one session.
    pub async fn session(&self, id: SessionId) -> Option<GroupSession> {
        self.sessions.get(id).await
    }

    /// Read access to the ledger for audit queries.
    #[must_use]
    pub const fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    async fn dispatch(&self, settlement: &Settlement) {
        self.dispatcher.dispatch(settlement).await;
    }
}

impl std::fmt::Debug for Marketplace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Marketplace").finish_non_exhaustive()
    }
}
