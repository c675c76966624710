//! Public Banking API
//!
//! `Bank` is the validated client surface: argument checks and money
//! conversion happen here; serialization and balance mutation happen behind
//! the gateway. Amounts cross this boundary as floats and travel internally
//! as integer minor units.

use std::sync::Arc;

use crate::config::GatewayConfig;
use crate::core_types::TxId;
use crate::error::BankError;
use crate::gateway::{Gateway, GatewayHandle, Request, Settled};
use crate::money;
use crate::store::transactions::{TransactionLog, TransactionRecord};
use crate::store::users::{StoreError, UserStore};

/// The banking core facade.
///
/// Must be created inside a Tokio runtime: construction spawns the gateway
/// coordinator task. Dropping the last clone-free `Bank` lets the
/// coordinator drain and exit.
pub struct Bank {
    users: Arc<UserStore>,
    log: Arc<TransactionLog>,
    gateway: GatewayHandle,
}

impl Bank {
    /// Bank with default gateway tuning (admission limit 10).
    pub fn new() -> Self {
        Self::with_config(&GatewayConfig::default())
    }

    pub fn with_config(config: &GatewayConfig) -> Self {
        let users = Arc::new(UserStore::new());
        let log = Arc::new(TransactionLog::new());
        let gateway = Gateway::spawn(Arc::clone(&users), Arc::clone(&log), config);
        Self {
            users,
            log,
            gateway,
        }
    }

    /// Register a new user with empty balances.
    pub fn create_user(&self, name: &str) -> Result<(), BankError> {
        if name.is_empty() {
            return Err(BankError::WrongArguments);
        }
        self.users.create(name).map_err(|e| match e {
            StoreError::AlreadyExists => BankError::UserAlreadyExists,
            StoreError::NotFound => BankError::Unexpected,
        })
    }

    /// Credit `amount` of `currency` to the user. Returns the new balance.
    pub async fn deposit(&self, user: &str, amount: f64, currency: &str) -> Result<f64, BankError> {
        let amount = validate_money_op(&[user, currency], amount)?;
        let settled = self
            .gateway
            .submit(Request::Deposit {
                username: user.to_string(),
                currency: currency.to_string(),
                amount,
            })
            .await?;
        single_balance(settled)
    }

    /// Debit `amount` of `currency` from the user. Returns the new balance.
    pub async fn withdraw(
        &self,
        user: &str,
        amount: f64,
        currency: &str,
    ) -> Result<f64, BankError> {
        let amount = validate_money_op(&[user, currency], amount)?;
        let settled = self
            .gateway
            .submit(Request::Withdraw {
                username: user.to_string(),
                currency: currency.to_string(),
                amount,
            })
            .await?;
        single_balance(settled)
    }

    /// Move `amount` of `currency` between two distinct users. Returns the
    /// post-transfer balances `(from, to)`.
    pub async fn send(
        &self,
        from: &str,
        to: &str,
        amount: f64,
        currency: &str,
    ) -> Result<(f64, f64), BankError> {
        if from == to {
            return Err(BankError::WrongArguments);
        }
        let amount = validate_money_op(&[from, to, currency], amount)?;
        let settled = self
            .gateway
            .submit(Request::Send {
                from: from.to_string(),
                to: to.to_string(),
                currency: currency.to_string(),
                amount,
            })
            .await?;
        match settled {
            Settled::Transfer {
                from_balance,
                to_balance,
            } => Ok((
                money::format_amount(from_balance),
                money::format_amount(to_balance),
            )),
            Settled::Balance(_) => Err(BankError::Unexpected),
        }
    }

    /// Read the user's balance in one currency.
    pub async fn get_balance(&self, user: &str, currency: &str) -> Result<f64, BankError> {
        if user.is_empty() || currency.is_empty() {
            return Err(BankError::WrongArguments);
        }
        let settled = self
            .gateway
            .submit(Request::Balance {
                username: user.to_string(),
                currency: currency.to_string(),
            })
            .await?;
        single_balance(settled)
    }

    /// Operation history of one transaction.
    pub fn transaction(&self, id: &TxId) -> Option<TransactionRecord> {
        self.log.get(id)
    }
}

impl Default for Bank {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared validation for money-moving operations: non-empty names and a
/// parseable positive amount.
fn validate_money_op(names: &[&str], amount: f64) -> Result<i64, BankError> {
    if names.iter().any(|name| name.is_empty()) {
        return Err(BankError::WrongArguments);
    }
    money::parse_amount(amount).map_err(|_| BankError::WrongArguments)
}

fn single_balance(settled: Settled) -> Result<f64, BankError> {
    match settled {
        Settled::Balance(balance) => Ok(money::format_amount(balance)),
        Settled::Transfer { .. } => Err(BankError::Unexpected),
    }
}
