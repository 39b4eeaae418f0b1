//! Error taxonomy for the skill-exchange engine.
//!
//! Every variant is an expected, recoverable outcome returned to the caller
//! as a typed result. Nothing here is fatal: callers are other users acting
//! concurrently, and losing a race (for the last seat, for the last credit)
//! is ordinary operation.

use crate::types::{BookingId, Capacity, Credits, SessionId, SkillId, UserId};
use thiserror::Error;

/// Expected failure modes of ledger, booking, and session operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// An illegal state edge was requested.
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition {
        /// Status the entity was in.
        from: &'static str,
        /// Status the caller asked for.
        to: &'static str,
    },

    /// The acting user may not perform this action on this entity.
    #[error("user {actor} is not authorized to {action}")]
    NotAuthorized {
        /// Who tried.
        actor: UserId,
        /// What they tried, for logs.
        action: &'static str,
    },

    /// A debit would have taken the balance below zero. Balance unchanged.
    #[error("insufficient funds for {account}: balance {balance}, requested {requested}")]
    InsufficientFunds {
        /// The account that could not cover the debit.
        account: UserId,
        /// Balance at the time of the attempt.
        balance: Credits,
        /// Amount requested.
        requested: Credits,
    },

    /// The session roster is at capacity.
    #[error("session {session} is full (capacity {capacity})")]
    SessionFull {
        /// The full session.
        session: SessionId,
        /// Its frozen capacity.
        capacity: Capacity,
    },

    /// The learner already holds a seat in this session.
    #[error("user {learner} already holds a seat in session {session}")]
    AlreadyJoined {
        /// The session.
        session: SessionId,
        /// The learner who already joined.
        learner: UserId,
    },

    /// The booking or session is already completed; nothing was transferred.
    #[error("already completed; credits were settled exactly once")]
    AlreadyCompleted,

    /// A learner tried to book or join their own offering.
    #[error("user {user} cannot book their own offering")]
    SelfBookingNotAllowed {
        /// The user acting as both learner and provider.
        user: UserId,
    },

    /// The learner holds no seat in this session.
    #[error("user {learner} holds no seat in session {session}")]
    NotJoined {
        /// The session.
        session: SessionId,
        /// The learner without a seat.
        learner: UserId,
    },

    /// The session's roster cannot change in its current status.
    #[error("session {session} is not joinable in status {status}")]
    SessionNotJoinable {
        /// The session.
        session: SessionId,
        /// Its current status.
        status: &'static str,
    },

    /// A collaborator or store failed mid-settlement; all partial effects
    /// were rolled back and the entity is in its last consistent state.
    /// Retrying is safe.
    #[error("settlement failed and was rolled back: {0}")]
    SettlementFailed(String),

    /// The skill is still referenced by a non-terminal booking or session.
    #[error("skill {0} has active bookings or sessions")]
    SkillInUse(SkillId),

    /// No ledger account exists for this user.
    #[error("no account for user {0}")]
    AccountNotFound(UserId),

    /// An account already exists for this user.
    #[error("account for user {0} already exists")]
    AccountExists(UserId),

    /// No such skill in the catalog.
    #[error("skill {0} not found")]
    SkillNotFound(SkillId),

    /// No such booking.
    #[error("booking {0} not found")]
    BookingNotFound(BookingId),

    /// No such group session.
    #[error("session {0} not found")]
    SessionNotFound(SessionId),
}
