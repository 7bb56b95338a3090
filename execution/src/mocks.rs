use crate::ledger::{EventSink, Treasury, TransferError};
use crate::state::{Memory, State, Status};
use anyhow::Result;
use commonware_cryptography::{
    ed25519::{PrivateKey, PublicKey},
    Signer,
};
use qchess_types::{Event, Key, Value};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};

/// Creates an account keypair for Ed25519 signatures used by players
pub fn create_account_keypair(seed: u64) -> (PrivateKey, PublicKey) {
    let private = PrivateKey::from_seed(seed);
    let public = private.public_key();
    (private, public)
}

/// Keeps every published event for later inspection.
#[derive(Clone, Default)]
pub struct RecordingSink {
    events: Arc<Mutex<Vec<Event>>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().expect("sink lock poisoned").clone()
    }
}

impl EventSink for RecordingSink {
    fn publish(&self, events: &[Event]) {
        self.events
            .lock()
            .expect("sink lock poisoned")
            .extend_from_slice(events);
    }
}

/// Records transfers, optionally failing them.
#[derive(Clone, Default)]
pub struct MockTreasury {
    transfers: Arc<Mutex<Vec<(PublicKey, u64)>>>,
    fail: Arc<AtomicBool>,
}

impl MockTreasury {
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn transfers(&self) -> Vec<(PublicKey, u64)> {
        self.transfers.lock().expect("treasury lock poisoned").clone()
    }
}

impl Treasury for MockTreasury {
    async fn transfer(&self, to: &PublicKey, amount: u64) -> Result<(), TransferError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(TransferError {
                amount,
                reason: "treasury offline".to_string(),
            });
        }
        self.transfers
            .lock()
            .expect("treasury lock poisoned")
            .push((to.clone(), amount));
        Ok(())
    }
}

/// In-memory state whose batch commits can be made to fail.
#[derive(Default)]
pub struct FlakyState {
    inner: Memory,
    fail_apply: Arc<AtomicBool>,
}

impl FlakyState {
    /// Handle that arms or disarms commit failures.
    pub fn switch(&self) -> Arc<AtomicBool> {
        self.fail_apply.clone()
    }

    pub fn into_inner(self) -> Memory {
        self.inner
    }
}

impl State for FlakyState {
    async fn get(&self, key: &Key) -> Result<Option<Value>> {
        self.inner.get(key).await
    }

    async fn insert(&mut self, key: Key, value: Value) -> Result<()> {
        self.inner.insert(key, value).await
    }

    async fn delete(&mut self, key: &Key) -> Result<()> {
        self.inner.delete(key).await
    }

    async fn apply(&mut self, changes: Vec<(Key, Status)>) -> Result<()> {
        if self.fail_apply.load(Ordering::SeqCst) {
            anyhow::bail!("injected commit failure");
        }
        self.inner.apply(changes).await
    }
}
