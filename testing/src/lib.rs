//! Test doubles for the skillswap-engine collaborator interfaces.
//!
//! The engine consumes notifications, badge evaluation, and certificate
//! issuance through traits; these doubles record, script, or fail those
//! calls so engine tests can assert the fan-out precisely.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use skillswap_engine::{
    Badge, BadgeEvaluator, BookingId, CertificateId, CertificateIssuer, Clock, NotificationKind,
    NotificationSink, UserId,
};
use std::collections::HashMap;
use std::sync::Mutex;

/// Deterministic clock pinned to a fixed instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    time: DateTime<Utc>,
}

impl FixedClock {
    /// Creates a clock pinned to `time`.
    #[must_use]
    pub const fn at(time: DateTime<Utc>) -> Self {
        Self { time }
    }
}

impl Default for FixedClock {
    fn default() -> Self {
        Self { time: DateTime::UNIX_EPOCH }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.time
    }
}

/// One captured notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedNotification {
    /// Recipient.
    pub user: UserId,
    /// Kind of notification.
    pub kind: NotificationKind,
    /// Message body.
    pub message: String,
    /// Optional link.
    pub link: Option<String>,
}

/// Notification sink that records every delivery.
#[derive(Debug, Default)]
pub struct RecordingSink {
    sent: Mutex<Vec<RecordedNotification>>,
}

impl RecordingSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything delivered so far, in order.
    #[must_use]
    pub fn sent(&self) -> Vec<RecordedNotification> {
        self.sent.lock().map(|g| g.clone()).unwrap_or_default()
    }

    /// Deliveries of one kind to one user.
    #[must_use]
    pub fn sent_to(&self, user: UserId, kind: NotificationKind) -> Vec<RecordedNotification> {
        self.sent()
            .into_iter()
            .filter(|n| n.user == user && n.kind == kind)
            .collect()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn notify(&self, user: UserId, kind: NotificationKind, message: &str, link: Option<&str>) {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(RecordedNotification {
                user,
                kind,
                message: message.to_string(),
                link: link.map(ToString::to_string),
            });
        }
    }
}

/// Badge evaluator scripted per user: each pending badge is returned as
/// newly awarded exactly once, matching the contract that evaluators never
/// re-award.
#[derive(Debug, Default)]
pub struct ScriptedBadges {
    pending: Mutex<HashMap<UserId, Vec<Badge>>>,
}

impl ScriptedBadges {
    /// Creates an evaluator with no pending awards.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a badge to be awarded on the user's next evaluation.
    pub fn award_next(&self, user: UserId, name: &str) {
        if let Ok(mut pending) = self.pending.lock() {
            pending.entry(user).or_default().push(Badge {
                name: name.to_string(),
            });
        }
    }
}

#[async_trait]
impl BadgeEvaluator for ScriptedBadges {
    async fn evaluate(&self, user: UserId) -> Vec<Badge> {
        self.pending
            .lock()
            .ok()
            .and_then(|mut pending| pending.remove(&user))
            .unwrap_or_default()
    }
}

/// Badge evaluator that never awards anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoBadges;

#[async_trait]
impl BadgeEvaluator for NoBadges {
    async fn evaluate(&self, _user: UserId) -> Vec<Badge> {
        Vec::new()
    }
}

/// Certificate issuer that succeeds with a fresh id and records each call.
#[derive(Debug, Default)]
pub struct StubCertificates {
    issued: Mutex<Vec<(BookingId, String)>>,
}

impl StubCertificates {
    /// Creates an issuer with no history.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every issuance requested so far.
    #[must_use]
    pub fn issued(&self) -> Vec<(BookingId, String)> {
        self.issued.lock().map(|g| g.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl CertificateIssuer for StubCertificates {
    async fn issue(
        &self,
        booking_id: BookingId,
        learner_display_name: &str,
    ) -> Result<CertificateId, String> {
        if let Ok(mut issued) = self.issued.lock() {
            issued.push((booking_id, learner_display_name.to_string()));
        }
        Ok(CertificateId::new())
    }
}

/// Certificate issuer that always refuses, for rollback tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct FailingCertificates;

#[async_trait]
impl CertificateIssuer for FailingCertificates {
    async fn issue(
        &self,
        _booking_id: BookingId,
        _learner_display_name: &str,
    ) -> Result<CertificateId, String> {
        Err("issuer unavailable".to_string())
    }
}
