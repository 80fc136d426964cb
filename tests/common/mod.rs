//! Common test utilities

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rust_decimal::Decimal;
use uuid::Uuid;

use wallet_ledger::bus::{BusSettings, EventBus, InMemoryBroker};
use wallet_ledger::domain::{Balance, TransactionDetails, Wallet};
use wallet_ledger::notification::{MailError, MailTransport, OutgoingMail};
use wallet_ledger::store::{MemoryLedgerStore, StoreError, TransactionLookup};
use wallet_ledger::LedgerEngine;

/// Engine over an in-memory store and broker
pub struct Ledger {
    pub store: MemoryLedgerStore,
    pub broker: InMemoryBroker,
    pub bus: Arc<EventBus>,
    pub engine: LedgerEngine,
}

pub async fn setup_ledger() -> Ledger {
    let store = MemoryLedgerStore::new();
    let broker = InMemoryBroker::new();
    let bus = Arc::new(
        EventBus::connect(Arc::new(broker.clone()), BusSettings::default())
            .await
            .expect("Failed to connect bus"),
    );
    let engine = LedgerEngine::new(Arc::new(store.clone()), bus.clone());

    Ledger {
        store,
        broker,
        bus,
        engine,
    }
}

/// Owner plus wallet with an opening balance
pub fn open_wallet(store: &MemoryLedgerStore, name: &str, balance: Decimal) -> Wallet {
    let owner = store
        .add_owner(name, &format!("{}@example.com", name.to_lowercase()))
        .expect("Failed to add owner");
    store
        .open_wallet(owner.id, Balance::new(balance).expect("Invalid balance"))
        .expect("Failed to open wallet")
}

pub fn balance_of(store: &MemoryLedgerStore, wallet_id: Uuid) -> Decimal {
    store
        .wallets()
        .unwrap()
        .into_iter()
        .find(|w| w.id == wallet_id)
        .map(|w| w.balance.value())
        .expect("Wallet not found")
}

/// Mail transport that keeps everything it is asked to send
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<OutgoingMail>>,
    fail_for: Mutex<Vec<String>>,
}

impl RecordingMailer {
    pub fn sent(&self) -> Vec<OutgoingMail> {
        self.sent.lock().unwrap().clone()
    }

    /// Refuse every mail addressed to `address`
    pub fn fail_for(&self, address: &str) {
        self.fail_for.lock().unwrap().push(address.to_string());
    }
}

#[async_trait]
impl MailTransport for RecordingMailer {
    async fn send(&self, mail: OutgoingMail) -> Result<(), MailError> {
        if self.fail_for.lock().unwrap().contains(&mail.to) {
            return Err(MailError::Transport(format!("relay refused {}", mail.to)));
        }
        self.sent.lock().unwrap().push(mail);
        Ok(())
    }
}

/// Lookup that reports "not found" for the first `misses` calls
pub struct LaggingLookup {
    inner: MemoryLedgerStore,
    misses: usize,
    calls: AtomicUsize,
}

impl LaggingLookup {
    pub fn new(inner: MemoryLedgerStore, misses: usize) -> Self {
        Self {
            inner,
            misses,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TransactionLookup for LaggingLookup {
    async fn find_details(&self, id: Uuid) -> Result<Option<TransactionDetails>, StoreError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.misses {
            return Ok(None);
        }
        self.inner.find_details(id).await
    }
}

/// Formatted log output collected in memory
#[derive(Clone, Default)]
pub struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    /// Route this thread's tracing output here until the guard drops
    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        let subscriber = tracing_subscriber::fmt()
            .with_writer(self.clone())
            .with_ansi(false)
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub fn count(&self, needle: &str) -> usize {
        let bytes = self.0.lock().unwrap();
        String::from_utf8_lossy(&bytes).matches(needle).count()
    }
}

impl std::io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for LogCapture {
    type Writer = LogCapture;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Wait until `check` holds, yielding to other tasks in between
pub async fn eventually<F: Fn() -> bool>(check: F) {
    for _ in 0..1_000 {
        if check() {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
    panic!("condition not reached");
}
