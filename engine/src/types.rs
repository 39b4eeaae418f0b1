//! Domain types for the skill-exchange engine.
//!
//! Identifiers are UUID-backed newtypes so a booking id can never be passed
//! where a session id is expected. Statuses are tagged enums with a single
//! central transition function; illegal edges are rejected in one place
//! instead of scattered string comparisons.

use crate::error::EngineError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a platform user (learner or provider).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(Uuid);

/// Unique identifier for a published skill offering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SkillId(Uuid);

/// Unique identifier for a one-to-one booking.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BookingId(Uuid);

/// Unique identifier for a scheduled group session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(Uuid);

/// Unique identifier for a learner's seat within a group session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SeatId(Uuid);

/// Unique identifier for an issued certificate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CertificateId(Uuid);

macro_rules! uuid_newtype {
    ($name:ident) => {
        impl $name {
            /// Creates a new random identifier.
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wraps an existing UUID.
            #[must_use]
            pub const fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            /// Returns the inner UUID.
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_newtype!(UserId);
uuid_newtype!(SkillId);
uuid_newtype!(BookingId);
uuid_newtype!(SessionId);
uuid_newtype!(SeatId);
uuid_newtype!(CertificateId);

/// Credit amount (the platform's internal unit of exchange).
///
/// Unsigned on purpose: account balances are structurally non-negative.
/// Arithmetic goes through the [`crate::ledger::Ledger`], never through
/// direct field mutation.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct Credits(u32);

impl Credits {
    /// One credit — the fee for one completed session.
    pub const ONE: Self = Self(1);

    /// Zero credits.
    pub const ZERO: Self = Self(0);

    /// Creates a credit amount.
    #[must_use]
    pub const fn new(amount: u32) -> Self {
        Self(amount)
    }

    /// Returns the raw amount.
    #[must_use]
    pub const fn value(&self) -> u32 {
        self.0
    }

    /// Checks whether this amount is zero.
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Saturating addition.
    #[must_use]
    pub const fn saturating_add(self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }

    /// Checked subtraction; `None` when `other` exceeds `self`.
    #[must_use]
    pub const fn checked_sub(self, other: Self) -> Option<Self> {
        match self.0.checked_sub(other.0) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }
}

impl std::fmt::Display for Credits {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} cr", self.0)
    }
}

/// Maximum number of seats a group session may hold.
///
/// Always at least one; `new` clamps zero up rather than panicking.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Capacity(u32);

impl Capacity {
    /// The minimum capacity (a session of one).
    pub const MIN: Self = Self(1);

    /// Creates a capacity, clamping zero to one.
    #[must_use]
    pub const fn new(seats: u32) -> Self {
        if seats == 0 { Self(1) } else { Self(seats) }
    }

    /// Returns the seat count.
    #[must_use]
    pub const fn value(&self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for Capacity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a skill is delivered.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeliveryMode {
    /// Remote sessions only.
    Online,
    /// In-person sessions only.
    Offline,
    /// Either works.
    #[default]
    Any,
}

/// A skill offering a provider makes available for booking.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Skill {
    /// Skill identifier.
    pub id: SkillId,
    /// The user teaching this skill.
    pub provider_id: UserId,
    /// Default seat count for group sessions of this skill, when set.
    pub default_capacity: Option<Capacity>,
    /// Delivery mode.
    pub mode: DeliveryMode,
}

/// Lifecycle state of a one-to-one booking.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BookingStatus {
    /// Created by the learner, awaiting the provider's decision.
    Pending,
    /// Provider accepted; the session may take place.
    Accepted,
    /// Provider declined. Terminal.
    Declined,
    /// Session happened and credits settled. Terminal.
    Completed,
    /// Called off after acceptance. Terminal.
    Cancelled,
}

impl BookingStatus {
    /// Stable name used in errors and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Declined => "declined",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Whether this status admits no further transitions.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Declined | Self::Completed | Self::Cancelled)
    }

    /// The single transition function for bookings.
    ///
    /// Legal edges: `Pending → {Accepted, Declined}`,
    /// `Accepted → {Completed, Cancelled}`. Everything else is rejected.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidTransition`] for any edge not listed
    /// above. Edges never replay: a terminal status rejects all targets.
    pub fn transition(self, to: Self) -> Result<Self, EngineError> {
        match (self, to) {
            (Self::Pending, Self::Accepted | Self::Declined)
            | (Self::Accepted, Self::Completed | Self::Cancelled) => Ok(to),
            (from, _) => Err(EngineError::InvalidTransition {
                from: from.as_str(),
                to: to.as_str(),
            }),
        }
    }
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A one-to-one learning request between a learner and a provider.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    /// Booking identifier.
    pub id: BookingId,
    /// The skill being taught.
    pub skill_id: SkillId,
    /// The user learning.
    pub learner_id: UserId,
    /// The user teaching.
    pub provider_id: UserId,
    /// Current lifecycle state.
    pub status: BookingStatus,
    /// When the learner created the request.
    pub created_at: DateTime<Utc>,
    /// When the booking reached `Completed`, if it has.
    pub completed_at: Option<DateTime<Utc>>,
    /// Certificate issued alongside completion, if any.
    pub certificate_id: Option<CertificateId>,
}

impl Booking {
    /// Creates a new pending booking.
    #[must_use]
    pub const fn new(
        id: BookingId,
        skill_id: SkillId,
        learner_id: UserId,
        provider_id: UserId,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            skill_id,
            learner_id,
            provider_id,
            status: BookingStatus::Pending,
            created_at,
            completed_at: None,
            certificate_id: None,
        }
    }

    /// Whether `user` is the learner or the provider on this booking.
    #[must_use]
    pub fn is_party(&self, user: UserId) -> bool {
        user == self.learner_id || user == self.provider_id
    }
}

/// Lifecycle state of a group session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    /// Announced; learners may join.
    Scheduled,
    /// Underway; the roster is frozen.
    InProgress,
    /// Finished and settled. Terminal.
    Completed,
    /// Called off; seats refunded. Terminal.
    Cancelled,
}

impl SessionStatus {
    /// Stable name used in errors and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Whether this status admits no further transitions.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// The single transition function for group sessions.
    ///
    /// Legal edges: `Scheduled → {InProgress, Completed, Cancelled}`,
    /// `InProgress → {Completed, Cancelled}`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidTransition`] for any other edge.
    pub fn transition(self, to: Self) -> Result<Self, EngineError> {
        match (self, to) {
            (Self::Scheduled, Self::InProgress | Self::Completed | Self::Cancelled)
            | (Self::InProgress, Self::Completed | Self::Cancelled) => Ok(to),
            (from, _) => Err(EngineError::InvalidTransition {
                from: from.as_str(),
                to: to.as_str(),
            }),
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A learner's reserved slot within a group session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Seat {
    /// Seat identifier (the reference for its credit transactions).
    pub id: SeatId,
    /// The learner holding the seat.
    pub learner_id: UserId,
    /// When the learner joined.
    pub joined_at: DateTime<Utc>,
}

/// A capacity-bounded group class for one skill.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSession {
    /// Session identifier.
    pub id: SessionId,
    /// The skill being taught.
    pub skill_id: SkillId,
    /// The hosting provider.
    pub provider_id: UserId,
    /// Effective capacity, frozen at scheduling time. Later edits to the
    /// skill's default never change it.
    pub capacity: Capacity,
    /// Planned start, if announced.
    pub scheduled_at: Option<DateTime<Utc>>,
    /// Current lifecycle state.
    pub status: SessionStatus,
    /// Seated learners, in join order. Retained after completion for audit.
    pub seats: Vec<Seat>,
}

impl GroupSession {
    /// Looks up the seat held by `learner`, if any.
    #[must_use]
    pub fn seat_of(&self, learner: UserId) -> Option<&Seat> {
        self.seats.iter().find(|s| s.learner_id == learner)
    }

    /// Number of seats currently held.
    #[must_use]
    pub fn seat_count(&self) -> usize {
        self.seats.len()
    }

    /// Whether the roster is at capacity.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.seats.len() >= self.capacity.value() as usize
    }
}

/// Why a credit transaction was recorded.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionReason {
    /// Grant issued when the account was opened.
    SignupGrant,
    /// Learner paid the provider for a completed 1:1 session.
    SessionSettlement,
    /// Learner paid for a seat when joining a group session.
    SeatHold,
    /// Learner refunded after leaving or cancellation.
    SeatRefund,
    /// Host credited for a seat when the session completed.
    HostPayout,
    /// Compensating reversal after a failed multi-step settlement.
    Reversal,
}

/// What a credit transaction refers back to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionRef {
    /// A one-to-one booking.
    Booking(BookingId),
    /// A seat in a group session.
    Seat(SeatId),
    /// Account bootstrap; no booking or seat involved.
    Account(UserId),
}

/// One ledger entry. Every balance mutation records exactly one of these.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditTransaction {
    /// Account the delta applies to.
    pub account_id: UserId,
    /// Signed credit delta.
    pub delta: i64,
    /// Why the mutation happened.
    pub reason: TransactionReason,
    /// The booking or seat this entry belongs to.
    pub reference: TransactionRef,
    /// When the entry was recorded.
    pub recorded_at: DateTime<Utc>,
}
