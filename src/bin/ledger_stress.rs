//! Ledger Stress Tool
//!
//! Run with: cargo run --bin ledger_stress --release -- --operations 10000 --wallets 8
//!
//! Fires random deposits, withdrawals and transfers concurrently at the
//! in-memory store, then checks every wallet against the transaction log.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use tokio::task::JoinSet;
use uuid::Uuid;

use wallet_ledger::bus::{BusSettings, EventBus, InMemoryBroker};
use wallet_ledger::domain::{Balance, LedgerError, MovementKind};
use wallet_ledger::store::MemoryLedgerStore;
use wallet_ledger::LedgerEngine;

const OPENING_BALANCE: i64 = 1_000;

fn arg(args: &[String], name: &str, default: u64) -> u64 {
    args.iter()
        .position(|a| a == name)
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

#[derive(Debug, Clone, PartialEq)]
enum Operation {
    Deposit(Uuid, Decimal),
    Withdraw(Uuid, Decimal),
    Transfer(Uuid, Uuid, Decimal),
}

/// Next random operation: 0.01 to 200.00, transfers between distinct wallets.
/// `wallets` must hold at least two ids.
fn draw(rng: &mut StdRng, wallets: &[Uuid]) -> Operation {
    let amount = Decimal::new(rng.gen_range(1..=20_000), 2);
    let a = rng.gen_range(0..wallets.len());

    match rng.gen_range(0..3) {
        0 => Operation::Deposit(wallets[a], amount),
        1 => Operation::Withdraw(wallets[a], amount),
        _ => {
            // Any wallet but `a`
            let b = (a + rng.gen_range(1..wallets.len())) % wallets.len();
            Operation::Transfer(wallets[a], wallets[b], amount)
        }
    }
}

#[derive(Default)]
struct Outcome {
    committed: u64,
    insufficient: u64,
    failed: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let operations = arg(&args, "--operations", 10_000);
    let wallet_count = arg(&args, "--wallets", 8).max(2) as usize;
    let workers = arg(&args, "--workers", 32).max(1);

    println!(
        "Ledger stress - {} operations over {} wallets with {} workers",
        operations, wallet_count, workers
    );

    let store = MemoryLedgerStore::new();
    let mut wallets = Vec::with_capacity(wallet_count);
    for i in 0..wallet_count {
        let owner = store.add_owner(&format!("Owner {i}"), &format!("owner{i}@example.com"))?;
        let wallet = store.open_wallet(owner.id, Balance::new(Decimal::from(OPENING_BALANCE))?)?;
        wallets.push(wallet.id);
    }
    let opening: HashMap<Uuid, Decimal> = store
        .wallets()?
        .into_iter()
        .map(|w| (w.id, w.balance.value()))
        .collect();

    let bus = EventBus::connect(Arc::new(InMemoryBroker::new()), BusSettings::default()).await?;
    let engine = LedgerEngine::new(Arc::new(store.clone()), Arc::new(bus));
    let wallets = Arc::new(wallets);

    let start = Instant::now();
    let mut tasks = JoinSet::new();
    for worker in 0..workers {
        let engine = engine.clone();
        let wallets = Arc::clone(&wallets);
        let share = operations / workers + u64::from(worker < operations % workers);

        tasks.spawn(async move {
            // Seeded per worker so a run can be repeated
            let mut rng = StdRng::seed_from_u64(worker);
            let mut outcome = Outcome::default();

            for _ in 0..share {
                let result = match draw(&mut rng, &wallets) {
                    Operation::Deposit(a, amount) => {
                        engine.deposit_or_withdraw(a, amount, MovementKind::Deposit).await
                    }
                    Operation::Withdraw(a, amount) => {
                        engine.deposit_or_withdraw(a, amount, MovementKind::Withdraw).await
                    }
                    Operation::Transfer(a, b, amount) => engine.transfer(a, b, amount).await,
                };

                match result {
                    Ok(_) => outcome.committed += 1,
                    Err(LedgerError::InsufficientFunds { .. }) => outcome.insufficient += 1,
                    Err(_) => outcome.failed += 1,
                }
            }
            outcome
        });
    }

    let mut total = Outcome::default();
    while let Some(outcome) = tasks.join_next().await {
        let outcome = outcome?;
        total.committed += outcome.committed;
        total.insufficient += outcome.insufficient;
        total.failed += outcome.failed;
    }
    let elapsed = start.elapsed();

    // Replay the log
    let mut expected = opening.clone();
    let log = store.transaction_log()?;
    for tx in &log {
        for (wallet_id, balance) in expected.iter_mut() {
            *balance += tx.effect_on(*wallet_id);
        }
    }

    let mut mismatches = 0;
    for wallet in store.wallets()? {
        let want = expected.get(&wallet.id).copied().unwrap_or_default();
        if wallet.balance.value() != want {
            mismatches += 1;
            println!(
                "MISMATCH wallet {}: stored {}, replayed {}",
                wallet.id,
                wallet.balance.value(),
                want
            );
        }
    }

    let opening_total: Decimal = opening.values().sum();
    let closing_total: Decimal = store.wallets()?.iter().map(|w| w.balance.value()).sum();

    println!("\n=== Stress Results ===");
    println!("Committed: {}", total.committed);
    println!("Insufficient funds: {}", total.insufficient);
    println!("Other failures: {}", total.failed);
    println!("Transactions in log: {}", log.len());
    println!("Opening total: {}", opening_total);
    println!("Closing total: {}", closing_total);
    println!("Time: {:.2}s", elapsed.as_secs_f64());
    println!(
        "Rate: {:.0} ops/sec",
        operations as f64 / elapsed.as_secs_f64()
    );

    if mismatches > 0 || log.len() as u64 != total.committed {
        anyhow::bail!("ledger does not reconcile ({mismatches} wallet mismatches)");
    }
    println!("Ledger reconciles.");

    Ok(())
}
