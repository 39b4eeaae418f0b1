//! Account ledger: the single owner of every credit balance.
//!
//! All balance mutations for all accounts serialize through one internal
//! mutex, which closes the lost-update race of reading a balance, computing
//! `balance ± 1`, and writing it back from independent call sites. The guard
//! is a sync mutex and is never held across an `.await`, so critical
//! sections stay short. Multi-leg operations (`transfer`, the batched seat
//! settlements) apply all their legs under one guard: they either fully
//! apply or leave every balance untouched.

use crate::environment::Clock;
use crate::error::EngineError;
use crate::types::{
    Credits, CreditTransaction, SeatId, TransactionReason, TransactionRef, UserId,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// One user's credit account. Mutated only through [`Ledger`] operations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// The owning user.
    pub user_id: UserId,
    /// Current balance. Structurally non-negative.
    pub balance: Credits,
    /// When the account was opened.
    pub opened_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct LedgerInner {
    accounts: HashMap<UserId, Account>,
    transactions: Vec<CreditTransaction>,
}

impl LedgerInner {
    fn balance_of(&self, user: UserId) -> Result<Credits, EngineError> {
        self.accounts
            .get(&user)
            .map(|a| a.balance)
            .ok_or(EngineError::AccountNotFound(user))
    }

    /// Applies one signed delta and records its transaction. The caller has
    /// already verified the debit is covered.
    fn apply(
        &mut self,
        user: UserId,
        delta: i64,
        reason: TransactionReason,
        reference: TransactionRef,
        now: DateTime<Utc>,
    ) -> Result<Credits, EngineError> {
        let account = self
            .accounts
            .get_mut(&user)
            .ok_or(EngineError::AccountNotFound(user))?;

        let magnitude = Credits::new(u32::try_from(delta.unsigned_abs()).unwrap_or(u32::MAX));
        account.balance = if delta >= 0 {
            account.balance.saturating_add(magnitude)
        } else {
            account
                .balance
                .checked_sub(magnitude)
                .ok_or(EngineError::InsufficientFunds {
                    account: user,
                    balance: account.balance,
                    requested: magnitude,
                })?
        };

        let balance = account.balance;
        self.transactions.push(CreditTransaction {
            account_id: user,
            delta,
            reason,
            reference,
            recorded_at: now,
        });
        Ok(balance)
    }
}

/// Atomic, serializable credit ledger.
pub struct Ledger {
    clock: Arc<dyn Clock>,
    inner: Mutex<LedgerInner>,
}

impl Ledger {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            inner: Mutex::new(LedgerInner::default()),
        }
    }

    fn guard(&self) -> Result<MutexGuard<'_, LedgerInner>, EngineError> {
        self.inner
            .lock()
            .map_err(|_| EngineError::SettlementFailed("ledger state poisoned".to_string()))
    }

    /// Opens an account with the given signup grant.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::AccountExists`] if the user already has one.
    pub fn open_account(&self, user: UserId, grant: Credits) -> Result<Credits, EngineError> {
        let now = self.clock.now();
        let mut inner = self.guard()?;
        if inner.accounts.contains_key(&user) {
            return Err(EngineError::AccountExists(user));
        }
        inner.accounts.insert(
            user,
            Account {
                user_id: user,
                balance: Credits::ZERO,
                opened_at: now,
            },
        );
        let balance = if grant.is_zero() {
            Credits::ZERO
        } else {
            inner.apply(
                user,
                i64::from(grant.value()),
                TransactionReason::SignupGrant,
                TransactionRef::Account(user),
                now,
            )?
        };
        tracing::info!(%user, %balance, "account opened");
        Ok(balance)
    }

    /// Current balance for `user`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::AccountNotFound`] for unknown users.
    pub fn balance(&self, user: UserId) -> Result<Credits, EngineError> {
        self.guard()?.balance_of(user)
    }

    /// Debits `amount` from `user`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InsufficientFunds`] when the balance cannot
    /// cover the amount, leaving it unchanged. Two concurrent debits against
    /// a balance of one credit cannot both succeed.
    pub fn debit(
        &self,
        user: UserId,
        amount: Credits,
        reason: TransactionReason,
        reference: TransactionRef,
    ) -> Result<Credits, EngineError> {
        let now = self.clock.now();
        let mut inner = self.guard()?;
        let balance = inner.apply(user, -i64::from(amount.value()), reason, reference, now)?;
        tracing::debug!(%user, %amount, ?reason, %balance, "debit applied");
        Ok(balance)
    }

    /// Credits `amount` to `user`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::AccountNotFound`] for unknown users.
    pub fn credit(
        &self,
        user: UserId,
        amount: Credits,
        reason: TransactionReason,
        reference: TransactionRef,
    ) -> Result<Credits, EngineError> {
        let now = self.clock.now();
        let mut inner = self.guard()?;
        let balance = inner.apply(user, i64::from(amount.value()), reason, reference, now)?;
        tracing::debug!(%user, %amount, ?reason, %balance, "credit applied");
        Ok(balance)
    }

    /// Moves `amount` from `from` to `to` as one atomic primitive: both legs
    /// apply under a single guard, or neither does.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InsufficientFunds`] if `from` cannot cover the
    /// amount and [`EngineError::AccountNotFound`] if either account is
    /// missing. On any error no balance has changed and no transaction was
    /// recorded.
    pub fn transfer(
        &self,
        from: UserId,
        to: UserId,
        amount: Credits,
        reason: TransactionReason,
        reference: TransactionRef,
    ) -> Result<(), EngineError> {
        let now = self.clock.now();
        let mut inner = self.guard()?;

        // Check both sides before touching either, so a missing destination
        // cannot leave a half-applied debit.
        let from_balance = inner.balance_of(from)?;
        inner.balance_of(to)?;
        if from_balance < amount {
            return Err(EngineError::InsufficientFunds {
                account: from,
                balance: from_balance,
                requested: amount,
            });
        }

        inner.apply(from, -i64::from(amount.value()), reason, reference, now)?;
        inner.apply(to, i64::from(amount.value()), reason, reference, now)?;
        tracing::info!(%from, %to, %amount, ?reason, "transfer settled");
        Ok(())
    }

    /// Credits the host `fee` for every seat of a completed session in one
    /// settlement: a single balance mutation, one transaction per seat.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::AccountNotFound`] for an unknown host; in that
    /// case nothing was applied.
    pub fn settle_seats(
        &self,
        host: UserId,
        seats: &[SeatId],
        fee: Credits,
    ) -> Result<Credits, EngineError> {
        let now = self.clock.now();
        let mut inner = self.guard()?;
        let mut balance = inner.balance_of(host)?;
        for seat in seats {
            balance = inner.apply(
                host,
                i64::from(fee.value()),
                TransactionReason::HostPayout,
                TransactionRef::Seat(*seat),
                now,
            )?;
        }
        tracing::info!(%host, seats = seats.len(), %balance, "host payout settled");
        Ok(balance)
    }

    /// Refunds `fee` to every listed seat holder in one settlement, used
    /// when a session is cancelled.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::AccountNotFound`] if any holder's account is
    /// missing; earlier refunds in the batch remain applied only if every
    /// holder exists, which the caller guarantees by construction (a seat is
    /// only ever created for an account holder).
    pub fn refund_seats(
        &self,
        holders: &[(UserId, SeatId)],
        fee: Credits,
    ) -> Result<(), EngineError> {
        let now = self.clock.now();
        let mut inner = self.guard()?;
        for (learner, seat) in holders {
            inner.apply(
                *learner,
                i64::from(fee.value()),
                TransactionReason::SeatRefund,
                TransactionRef::Seat(*seat),
                now,
            )?;
        }
        tracing::info!(seats = holders.len(), "seat refunds settled");
        Ok(())
    }

    /// Snapshot of the full transaction log, oldest first.
    #[must_use]
    pub fn transactions(&self) -> Vec<CreditTransaction> {
        self.guard().map(|g| g.transactions.clone()).unwrap_or_default()
    }

    /// Transactions recorded against one booking or seat.
    #[must_use]
    pub fn transactions_for(&self, reference: TransactionRef) -> Vec<CreditTransaction> {
        self.guard()
            .map(|g| {
                g.transactions
                    .iter()
                    .filter(|t| t.reference == reference)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Sum of all recorded deltas for one account.
    #[must_use]
    pub fn transaction_sum(&self, user: UserId) -> i64 {
        self.guard()
            .map(|g| {
                g.transactions
                    .iter()
                    .filter(|t| t.account_id == user)
                    .map(|t| t.delta)
                    .sum()
            })
            .unwrap_or_default()
    }
}

impl std::fmt::Debug for Ledger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ledger").finish_non_exhaustive()
    }
}
