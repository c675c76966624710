//! Integration tests for the gateway core
//!
//! These drive the coordinator through its public handle with real workers
//! and real stores, verifying serialization, conservation and admission
//! semantics under actual concurrency.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::time::timeout;

use crate::config::GatewayConfig;
use crate::error::BankError;
use crate::gateway::{Gateway, GatewayHandle, Request, Settled};
use crate::store::transactions::TransactionLog;
use crate::store::users::UserStore;

struct TestHarness {
    users: Arc<UserStore>,
    log: Arc<TransactionLog>,
    gateway: GatewayHandle,
}

impl TestHarness {
    fn new() -> Self {
        let users = Arc::new(UserStore::new());
        let log = Arc::new(TransactionLog::new());
        let gateway = Gateway::spawn(
            Arc::clone(&users),
            Arc::clone(&log),
            &GatewayConfig::default(),
        );
        Self {
            users,
            log,
            gateway,
        }
    }

    /// Register a user and seed one balance directly in the store.
    fn seed(&self, username: &str, currency: &str, minor: i64) {
        self.users.create(username).unwrap();
        if minor > 0 {
            let user = self.users.get(username).unwrap();
            self.users
                .update_balances(username, user.balances_with(currency, minor))
                .unwrap();
        }
    }

    fn deposit(&self, username: &str, amount: i64) -> Request {
        Request::Deposit {
            username: username.to_string(),
            currency: "usd".to_string(),
            amount,
        }
    }

    fn withdraw(&self, username: &str, amount: i64) -> Request {
        Request::Withdraw {
            username: username.to_string(),
            currency: "usd".to_string(),
            amount,
        }
    }

    fn send(&self, from: &str, to: &str, amount: i64) -> Request {
        Request::Send {
            from: from.to_string(),
            to: to.to_string(),
            currency: "usd".to_string(),
            amount,
        }
    }

    fn balance_of(&self, username: &str) -> i64 {
        self.users.get(username).unwrap().balance("usd")
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_deposits_serialize_per_user() {
    let harness = TestHarness::new();
    harness.seed("alice", "usd", 0);

    // 10 concurrent deposits fit exactly inside the admission budget
    let tasks: Vec<_> = (0..10)
        .map(|_| {
            let gateway = harness.gateway.clone();
            let request = harness.deposit("alice", 500);
            tokio::spawn(async move { gateway.submit(request).await })
        })
        .collect();

    for result in join_all(tasks).await {
        assert!(matches!(result.unwrap(), Ok(Settled::Balance(_))));
    }

    assert_eq!(harness.balance_of("alice"), 5000);
    assert_eq!(harness.log.len(), 10);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_overdrafts_settle_exactly_once() {
    let harness = TestHarness::new();
    harness.seed("bob", "usd", 1000);

    // Five racing withdrawals of the full balance: precisely one can win
    let tasks: Vec<_> = (0..5)
        .map(|_| {
            let gateway = harness.gateway.clone();
            let request = harness.withdraw("bob", 1000);
            tokio::spawn(async move { gateway.submit(request).await })
        })
        .collect();

    let results: Vec<_> = join_all(tasks)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    let wins = results
        .iter()
        .filter(|r| matches!(r, Ok(Settled::Balance(0))))
        .count();
    let broke = results
        .iter()
        .filter(|r| matches!(r, Err(BankError::NotEnoughFunds)))
        .count();

    assert_eq!(wins, 1);
    assert_eq!(broke, 4);
    assert_eq!(harness.balance_of("bob"), 0);
    // Failed withdrawals leave no transaction behind
    assert_eq!(harness.log.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn opposing_transfers_conserve_and_complete() {
    let harness = TestHarness::new();
    harness.seed("alice", "usd", 10_000);
    harness.seed("bob", "usd", 10_000);

    // Transfers in both directions at once: two-account admission must
    // neither deadlock nor lose money
    let mut tasks = Vec::new();
    for _ in 0..5 {
        let gateway = harness.gateway.clone();
        let request = harness.send("alice", "bob", 100);
        tasks.push(tokio::spawn(async move { gateway.submit(request).await }));

        let gateway = harness.gateway.clone();
        let request = harness.send("bob", "alice", 100);
        tasks.push(tokio::spawn(async move { gateway.submit(request).await }));
    }

    let results = timeout(Duration::from_secs(10), join_all(tasks))
        .await
        .expect("transfers deadlocked");

    for result in results {
        assert!(matches!(result.unwrap(), Ok(Settled::Transfer { .. })));
    }

    assert_eq!(
        harness.balance_of("alice") + harness.balance_of("bob"),
        20_000
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn transfer_storm_completes() {
    let harness = TestHarness::new();
    for user in ["alice", "bob", "carol"] {
        harness.seed(user, "usd", 100_000);
    }

    // Every pair in both directions, interleaved with deposits and reads:
    // parked transfers must always make progress
    let mut tasks = Vec::new();
    let pairs = [
        ("alice", "bob"),
        ("bob", "carol"),
        ("carol", "alice"),
        ("bob", "alice"),
        ("carol", "bob"),
        ("alice", "carol"),
    ];
    for (from, to) in pairs {
        for _ in 0..3 {
            let gateway = harness.gateway.clone();
            let request = harness.send(from, to, 50);
            tasks.push(tokio::spawn(async move { gateway.submit(request).await }));
        }
        let gateway = harness.gateway.clone();
        let request = harness.deposit(from, 10);
        tasks.push(tokio::spawn(async move { gateway.submit(request).await }));
    }

    let results = timeout(Duration::from_secs(10), join_all(tasks))
        .await
        .expect("gateway stalled");

    for result in results {
        assert!(result.unwrap().is_ok());
    }

    let total: i64 = ["alice", "bob", "carol"]
        .iter()
        .map(|user| harness.balance_of(user))
        .sum();
    // 3 users seeded 100_000 each plus 6 deposits of 10
    assert_eq!(total, 300_060);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn balance_reads_spawn_no_worker() {
    let harness = TestHarness::new();
    harness.seed("alice", "usd", 4200);

    let result = harness
        .gateway
        .submit(Request::Balance {
            username: "alice".to_string(),
            currency: "usd".to_string(),
        })
        .await;

    assert_eq!(result, Ok(Settled::Balance(4200)));
    assert_eq!(harness.log.len(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn unknown_users_rejected_at_admission() {
    let harness = TestHarness::new();
    harness.seed("alice", "usd", 1000);

    let result = harness.gateway.submit(harness.deposit("ghost", 100)).await;
    assert_eq!(result, Err(BankError::UserDoesNotExist));

    let result = harness
        .gateway
        .submit(harness.send("ghost", "alice", 100))
        .await;
    assert_eq!(result, Err(BankError::SenderNotFound));

    let result = harness
        .gateway
        .submit(harness.send("alice", "ghost", 100))
        .await;
    assert_eq!(result, Err(BankError::ReceiverNotFound));

    // No slot state or transactions survive any of these
    assert_eq!(harness.log.len(), 0);
    assert_eq!(harness.balance_of("alice"), 1000);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn missing_currency_reads_as_zero() {
    let harness = TestHarness::new();
    harness.seed("alice", "usd", 1000);

    let result = harness
        .gateway
        .submit(Request::Balance {
            username: "alice".to_string(),
            currency: "brl".to_string(),
        })
        .await;
    assert_eq!(result, Ok(Settled::Balance(0)));

    // And withdrawing from it is an insufficient-funds error
    let result = harness
        .gateway
        .submit(Request::Withdraw {
            username: "alice".to_string(),
            currency: "brl".to_string(),
            amount: 100,
        })
        .await;
    assert_eq!(result, Err(BankError::NotEnoughFunds));
}
