//! Completion side-effect dispatcher.
//!
//! Side effects (notifications, badge evaluation, certificates) never run
//! inline with a state transition. A transition commits first and yields a
//! [`Settlement`] record; the dispatcher fans that record out exactly once.
//! Because completions are idempotent, a retried `complete` call can never
//! reach the dispatcher a second time.

use crate::types::{BookingId, CertificateId, SessionId, SkillId, UserId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// What kind of notification is being emitted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationKind {
    /// A provider accepted the learner's booking.
    BookingAccepted,
    /// A provider declined the learner's booking.
    BookingDeclined,
    /// A session the user took part in was completed and settled.
    SessionCompleted,
    /// The user earned a new badge.
    BadgeAwarded,
    /// A certificate was issued for the user's completed booking.
    CertificateIssued,
}

/// A badge newly awarded by the evaluator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Badge {
    /// Human-readable badge name.
    pub name: String,
}

/// Outbound notification channel. Implemented by the surrounding
/// application; the engine only describes what to send.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Delivers one notification to one user.
    async fn notify(&self, user: UserId, kind: NotificationKind, message: &str, link: Option<&str>);
}

/// Badge rule engine (threshold counts over completed sessions, five-star
/// reviews, skills listed). Returns only badges not previously awarded.
#[async_trait]
pub trait BadgeEvaluator: Send + Sync {
    /// Evaluates award rules for `user`, returning newly awarded badges.
    async fn evaluate(&self, user: UserId) -> Vec<Badge>;
}

/// Certificate issuance for completed one-to-one bookings.
#[async_trait]
pub trait CertificateIssuer: Send + Sync {
    /// Issues a certificate naming the learner.
    ///
    /// # Errors
    ///
    /// Returns a human-readable reason when issuance fails; the caller
    /// rolls the whole completion back.
    async fn issue(
        &self,
        booking_id: BookingId,
        learner_display_name: &str,
    ) -> Result<CertificateId, String>;
}

/// Which entity a settlement came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SettlementKind {
    /// A one-to-one booking completed.
    Booking(BookingId),
    /// A group session completed.
    Session(SessionId),
}

/// The committed outcome of a completion, handed to the dispatcher after
/// the status flip and ledger settlement are both visible.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    /// Source entity.
    pub kind: SettlementKind,
    /// The skill that was taught.
    pub skill_id: SkillId,
    /// The provider who taught.
    pub provider_id: UserId,
    /// Every learner who was settled (one for a booking, the roster for a
    /// session).
    pub learners: Vec<UserId>,
    /// Certificate issued with the completion, if any.
    pub certificate_id: Option<CertificateId>,
    /// When the completion committed.
    pub completed_at: DateTime<Utc>,
}

impl Settlement {
    /// Everyone involved: provider first, then learners.
    #[must_use]
    pub fn participants(&self) -> Vec<UserId> {
        let mut all = Vec::with_capacity(1 + self.learners.len());
        all.push(self.provider_id);
        all.extend(self.learners.iter().copied());
        all
    }
}

/// Fans a committed settlement out to the collaborators.
#[derive(Clone)]
pub struct CompletionDispatcher {
    sink: Arc<dyn NotificationSink>,
    badges: Arc<dyn BadgeEvaluator>,
}

impl CompletionDispatcher {
    /// Creates a dispatcher over the given collaborators.
    #[must_use]
    pub fn new(sink: Arc<dyn NotificationSink>, badges: Arc<dyn BadgeEvaluator>) -> Self {
        Self { sink, badges }
    }

    /// Runs the full completion fan-out for one settlement: completion
    /// notices for every participant, then badge evaluation with at most
    /// one notification per newly awarded badge.
    pub async fn dispatch(&self, settlement: &Settlement) {
        tracing::info!(kind = ?settlement.kind, learners = settlement.learners.len(),
            "dispatching completion side effects");

        for user in settlement.participants() {
            self.sink
                .notify(
                    user,
                    NotificationKind::SessionCompleted,
                    "Your session was completed and credits were settled.",
                    None,
                )
                .await;
        }

        if let Some(certificate) = settlement.certificate_id {
            for learner in &settlement.learners {
                self.sink
                    .notify(
                        *learner,
                        NotificationKind::CertificateIssued,
                        &format!("Your certificate {certificate} is ready."),
                        None,
                    )
                    .await;
            }
        }

        for user in settlement.participants() {
            for badge in self.badges.evaluate(user).await {
                tracing::debug!(%user, badge = %badge.name, "badge awarded");
                self.sink
                    .notify(
                        user,
                        NotificationKind::BadgeAwarded,
                        &format!("You earned the \"{}\" badge!", badge.name),
                        None,
                    )
                    .await;
            }
        }
    }

    /// Notifies the learner of the provider's accept/decline decision.
    pub async fn booking_decision(&self, learner: UserId, accepted: bool) {
        let (kind, message) = if accepted {
            (
                NotificationKind::BookingAccepted,
                "Your booking was accepted.",
            )
        } else {
            (
                NotificationKind::BookingDeclined,
                "Your booking was declined.",
            )
        };
        self.sink.notify(learner, kind, message, None).await;
    }
}

impl std::fmt::Debug for CompletionDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionDispatcher").finish_non_exhaustive()
    }
}
