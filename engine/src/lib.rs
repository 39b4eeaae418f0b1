//! # SkillSwap Engine
//!
//! Booking lifecycle and credit-ledger engine for a peer-to-peer skill
//! exchange: users teach and learn from each other, paying and earning an
//! internal, non-monetary credit per completed session.
//!
//! ## Components
//!
//! - [`ledger`] — owns every credit balance; atomic `debit`/`credit`/
//!   `transfer` plus batched seat settlements. All balance mutations
//!   serialize through one guard.
//! - [`booking`] — the one-to-one booking state machine
//!   (`Pending → {Accepted, Declined}`, `Accepted → {Completed, Cancelled}`)
//!   with settlement inside the transition's critical section and
//!   idempotent completion.
//! - [`session`] — the group-session allocator: `seats ≤ capacity` and one
//!   seat per learner enforced atomically under concurrent joins; learners
//!   pay on join, the host is paid once per seat on completion.
//! - [`dispatch`] — completion side effects (notifications, badges,
//!   certificates) described by a [`dispatch::Settlement`] and fanned out
//!   exactly once, after the transition commits.
//! - [`catalog`] — read-mostly skill offerings with guarded retirement.
//! - [`marketplace`] — the facade wiring it all together; the inbound
//!   surface the surrounding application calls.
//!
//! ## Design principles
//!
//! - Balances are owned by the ledger and structurally non-negative;
//!   nothing mutates them but ledger operations, and every mutation records
//!   exactly one transaction.
//! - State machines are explicit tagged enums with one central transition
//!   function; illegal edges are rejected in one place.
//! - Multi-step settlements either fully apply or roll back their partial
//!   effects; callers never observe a half-applied state, and retrying is
//!   always safe.
//! - Side effects run after the commit, never inline with the transition.
//!
//! ## Example
//!
//! ```ignore
//! use skillswap_engine::{Collaborators, Config, Marketplace, SystemClock, UserId};
//! use std::sync::Arc;
//!
//! let market = Marketplace::new(Config::default(), Arc::new(SystemClock), collaborators);
//! market.register_user(learner)?;
//! let booking = market.create_booking(learner, skill).await?;
//! market.accept_booking(booking, provider).await?;
//! market.complete_booking(booking, provider).await?;
//! ```

/// One-to-one booking state machine.
pub mod booking;

/// Read-mostly skill offerings.
pub mod catalog;

/// Credit-economy configuration.
pub mod config;

/// Completion side-effect dispatcher and collaborator traits.
pub mod dispatch;

/// Injected dependencies (clock).
pub mod environment;

/// Error taxonomy.
pub mod error;

/// The credit ledger.
pub mod ledger;

/// The assembled facade.
pub mod marketplace;

/// Group session allocator.
pub mod session;

/// Domain types.
pub mod types;

pub use booking::BookingRegistry;
pub use catalog::SkillCatalog;
pub use config::Config;
pub use dispatch::{
    Badge, BadgeEvaluator, CertificateIssuer, CompletionDispatcher, NotificationKind,
    NotificationSink, Settlement, SettlementKind,
};
pub use environment::{Clock, SystemClock};
pub use error::EngineError;
pub use ledger::{Account, Ledger};
pub use marketplace::{Collaborators, Marketplace};
pub use session::SessionAllocator;
pub use types::{
    Booking, BookingId, BookingStatus, Capacity, CertificateId, Credits, CreditTransaction,
    DeliveryMode, GroupSession, Seat, SeatId, SessionId, SessionStatus, Skill, SkillId,
    TransactionReason, TransactionRef, UserId,
};
