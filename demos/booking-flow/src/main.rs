//! End-to-end walkthrough of the skill-exchange booking lifecycle.
//!
//! Runs the 1:1 booking path and the group-session path against an
//! in-process marketplace, with logging collaborators standing in for the
//! real notification, badge, and certificate services.

use async_trait::async_trait;
use skillswap_engine::{
    Badge, BadgeEvaluator, BookingId, Capacity, CertificateId, CertificateIssuer, Collaborators,
    Config, DeliveryMode, EngineError, Marketplace, NotificationKind, NotificationSink,
    SystemClock, UserId,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Notification sink that logs every delivery instead of sending it.
struct LoggingSink;

#[async_trait]
impl NotificationSink for LoggingSink {
    async fn notify(&self, user: UserId, kind: NotificationKind, message: &str, link: Option<&str>) {
        tracing::info!(%user, ?kind, message, link, "notification delivered");
    }
}

/// Awards "First Session" on a user's first completed session.
#[derive(Default)]
struct FirstSessionBadges {
    completions: Mutex<HashMap<UserId, u32>>,
}

#[async_trait]
impl BadgeEvaluator for FirstSessionBadges {
    async fn evaluate(&self, user: UserId) -> Vec<Badge> {
        let Ok(mut completions) = self.completions.lock() else {
            return Vec::new();
        };
        let count = completions.entry(user).or_insert(0);
        *count += 1;
        if *count == 1 {
            vec![Badge {
                name: "First Session".to_string(),
            }]
        } else {
            Vec::new()
        }
    }
}

/// Issuer that mints a fresh certificate id locally.
struct LocalCertificates;

#[async_trait]
impl CertificateIssuer for LocalCertificates {
    async fn issue(
        &self,
        booking_id: BookingId,
        learner_display_name: &str,
    ) -> Result<CertificateId, String> {
        let id = CertificateId::new();
        tracing::info!(%booking_id, learner_display_name, %id, "certificate issued");
        Ok(id)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let market = Marketplace::new(
        Config::default(),
        Arc::new(SystemClock),
        Collaborators {
            sink: Arc::new(LoggingSink),
            badges: Arc::new(FirstSessionBadges::default()),
            certificates: Arc::new(LocalCertificates),
        },
    );

    println!("=== SkillSwap: Booking Lifecycle Demo ===\n");

    // Three users: Priya teaches, Marco and Jun learn.
    let priya = UserId::new();
    let marco = UserId::new();
    let jun = UserId::new();
    for (user, name) in [(priya, "Priya"), (marco, "Marco"), (jun, "Jun")] {
        let balance = market.register_user(user)?;
        println!("Registered {name}: signup grant of {balance}");
    }

    // --- One-to-one booking ---
    println!("\n--- 1:1 Booking ---");
    let guitar = market
        .publish_skill(priya, None, DeliveryMode::Online)
        .await?;
    println!("Priya published a guitar skill");

    let booking = market.create_booking(marco, guitar).await?;
    println!("Marco requested a booking (pending)");

    market.accept_booking(booking, priya).await?;
    println!("Priya accepted; Marco was notified");

    market
        .complete_booking_with_certificate(booking, priya, "Marco Rossi")
        .await?;
    println!("Session completed with a certificate for Marco");
    println!(
        "Balances: Priya {}, Marco {}",
        market.balance(priya)?,
        market.balance(marco)?
    );

    // A retry of the same completion settles nothing twice.
    match market.complete_booking(booking, priya).await {
        Err(EngineError::AlreadyCompleted) => {
            println!("Retried completion refused: already completed, no second transfer");
        }
        other => println!("Unexpected retry outcome: {other:?}"),
    }

    // --- Group session ---
    println!("\n--- Group Session ---");
    let workshop = market
        .publish_skill(priya, Some(Capacity::new(5)), DeliveryMode::Offline)
        .await?;
    // Scheduled with an override of 2 seats, beating the skill default of 5.
    let session = market
        .schedule_session(workshop, priya, Some(Capacity::new(2)), None)
        .await?;
    println!("Priya scheduled a workshop with 2 seats");

    market.join_session(session, marco).await?;
    market.join_session(session, jun).await?;
    println!("Marco and Jun joined, each paying one credit up front");

    let latecomer = UserId::new();
    market.register_user(latecomer)?;
    match market.join_session(session, latecomer).await {
        Err(EngineError::SessionFull { capacity, .. }) => {
            println!("A third learner was turned away: session full at {capacity} seats");
        }
        other => println!("Unexpected join outcome: {other:?}"),
    }

    market.start_session(session, priya).await?;
    market.complete_session(session, priya).await?;
    println!("Workshop completed; Priya was paid once per seat");

    println!("\nFinal balances:");
    for (user, name) in [(priya, "Priya"), (marco, "Marco"), (jun, "Jun")] {
        println!("  {name}: {}", market.balance(user)?);
    }

    println!("\n=== Demo Complete ===");
    Ok(())
}
