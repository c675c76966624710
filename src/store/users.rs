//! User store
//!
//! Process-wide keyed table: username -> per-currency balances in minor
//! units. Users are created once and never deleted.

use std::collections::HashMap;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core_types::{Currency, Username};

/// User store errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("User already exists")]
    AlreadyExists,

    #[error("User not found")]
    NotFound,
}

/// A user and its per-currency balances.
///
/// # Invariants (enforced by private fields):
/// - balances are minor units and never negative at any externally
///   observable point
/// - a missing currency key reads as 0
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    username: Username,
    balances: HashMap<Currency, i64>,
}

impl User {
    fn new(username: Username) -> Self {
        Self {
            username,
            balances: HashMap::new(),
        }
    }

    /// Read-only access to the username
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Balance for one currency; missing keys read as 0.
    pub fn balance(&self, currency: &str) -> i64 {
        self.balances.get(currency).copied().unwrap_or(0)
    }

    /// Read-only access to the full balances mapping
    pub fn balances(&self) -> &HashMap<Currency, i64> {
        &self.balances
    }

    /// Copy of the balances mapping with one currency replaced.
    ///
    /// Mutations go back through [`UserStore::update_balances`], which swaps
    /// the whole mapping atomically for the key.
    pub fn balances_with(&self, currency: &str, amount: i64) -> HashMap<Currency, i64> {
        let mut next = self.balances.clone();
        next.insert(currency.to_string(), amount);
        next
    }
}

/// Thread-safe user table.
///
/// `create` is atomic against concurrent creates for the same name and
/// `update_balances` replaces the entire mapping for a key atomically.
#[derive(Debug, Default)]
pub struct UserStore {
    users: DashMap<Username, User>,
}

impl UserStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self {
            users: DashMap::new(),
        }
    }

    /// Register a new user with empty balances.
    pub fn create(&self, username: &str) -> Result<(), StoreError> {
        match self.users.entry(username.to_string()) {
            Entry::Occupied(_) => Err(StoreError::AlreadyExists),
            Entry::Vacant(slot) => {
                slot.insert(User::new(username.to_string()));
                Ok(())
            }
        }
    }

    /// Snapshot of one user.
    pub fn get(&self, username: &str) -> Option<User> {
        self.users.get(username).map(|user| user.clone())
    }

    /// Whether the user is registered.
    pub fn contains(&self, username: &str) -> bool {
        self.users.contains_key(username)
    }

    /// Replace the full balances mapping for a user.
    pub fn update_balances(
        &self,
        username: &str,
        balances: HashMap<Currency, i64>,
    ) -> Result<(), StoreError> {
        match self.users.get_mut(username) {
            Some(mut user) => {
                user.balances = balances;
                Ok(())
            }
            None => Err(StoreError::NotFound),
        }
    }

    /// Number of registered users.
    pub fn len(&self) -> usize {
        self.users.len()
    }

    /// Check if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}
