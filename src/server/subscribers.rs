//! Subscriber registry for the WebSocket fan-out.
//!
//! Every subscriber owns a bounded message buffer. A send that would block
//! marks the subscriber slow; its connection task notices and closes the
//! socket with a policy-violation status. Messages are never retried across
//! reconnects.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::Notify;

/// Per-subscriber buffer capacity; the slow-subscriber policy kicks in when
/// it is full.
pub const SUBSCRIBER_BUFFER: usize = 16;

pub const SLOW_CLOSE_REASON: &str = "connection too slow to keep up with messages";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserType {
    Lp,
    Ob,
}

impl FromStr for UserType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lp" => Ok(UserType::Lp),
            "ob" => Ok(UserType::Ob),
            other => Err(format!("invalid user type: {other}, must be 'lp' or 'ob'")),
        }
    }
}

/// Outbound half of one subscriber: bounded queue plus the slow flag.
pub struct Outbox {
    tx: mpsc::Sender<String>,
    slow: AtomicBool,
    notify: Notify,
}

impl Outbox {
    pub fn new(capacity: usize) -> (Arc<Self>, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            Arc::new(Self {
                tx,
                slow: AtomicBool::new(false),
                notify: Notify::new(),
            }),
            rx,
        )
    }

    /// Queue a message. A full buffer flips the subscriber to slow; the
    /// connection task is woken to close the socket.
    pub fn send_or_mark_slow(&self, message: String) {
        if self.slow.load(Ordering::Acquire) {
            return;
        }
        match self.tx.try_send(message) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.slow.store(true, Ordering::Release);
                self.notify.notify_waiters();
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }

    pub fn is_slow(&self) -> bool {
        self.slow.load(Ordering::Acquire)
    }

    /// Resolves once the subscriber has been marked slow.
    pub async fn slow_triggered(&self) {
        while !self.is_slow() {
            self.notify.notified().await;
        }
    }
}

pub struct VaultSubscriber {
    pub vault_address: String,
    pub user_type: UserType,
    address: Mutex<String>,
    pub outbox: Arc<Outbox>,
}

impl VaultSubscriber {
    pub fn new(
        address: String,
        vault_address: String,
        user_type: UserType,
    ) -> (Arc<Self>, mpsc::Receiver<String>) {
        let (outbox, rx) = Outbox::new(SUBSCRIBER_BUFFER);
        (
            Arc::new(Self {
                vault_address,
                user_type,
                address: Mutex::new(address),
                outbox,
            }),
            rx,
        )
    }

    pub fn address(&self) -> String {
        self.address.lock().clone()
    }

    /// Re-key the subscriber to another user address (`account_update`).
    pub fn set_address(&self, address: String) {
        *self.address.lock() = address;
    }
}

pub struct HomeSubscriber {
    pub outbox: Arc<Outbox>,
}

impl HomeSubscriber {
    pub fn new() -> (Arc<Self>, mpsc::Receiver<String>) {
        let (outbox, rx) = Outbox::new(SUBSCRIBER_BUFFER);
        (Arc::new(Self { outbox }), rx)
    }
}

pub struct GasSubscriber {
    round_duration: Mutex<i64>,
    pub outbox: Arc<Outbox>,
}

impl GasSubscriber {
    pub fn new() -> (Arc<Self>, mpsc::Receiver<String>) {
        let (outbox, rx) = Outbox::new(SUBSCRIBER_BUFFER);
        (
            Arc::new(Self {
                round_duration: Mutex::new(0),
                outbox,
            }),
            rx,
        )
    }

    pub fn round_duration(&self) -> i64 {
        *self.round_duration.lock()
    }

    pub fn set_round_duration(&self, duration: i64) {
        *self.round_duration.lock() = duration;
    }
}

/// The three subscriber surfaces, keyed the way notifications route:
/// vault subscribers by vault address, home and gas as flat sets.
#[derive(Default)]
pub struct Subscribers {
    vault: Mutex<HashMap<String, Vec<Arc<VaultSubscriber>>>>,
    home: Mutex<Vec<Arc<HomeSubscriber>>>,
    gas: Mutex<Vec<Arc<GasSubscriber>>>,
}

impl Subscribers {
    pub fn add_vault(&self, subscriber: Arc<VaultSubscriber>) {
        self.vault
            .lock()
            .entry(subscriber.vault_address.clone())
            .or_default()
            .push(subscriber);
    }

    pub fn remove_vault(&self, subscriber: &Arc<VaultSubscriber>) {
        let mut map = self.vault.lock();
        if let Some(list) = map.get_mut(&subscriber.vault_address) {
            list.retain(|s| !Arc::ptr_eq(s, subscriber));
            if list.is_empty() {
                map.remove(&subscriber.vault_address);
            }
        }
    }

    /// Subscribers of one vault.
    pub fn vault_subscribers(&self, vault_address: &str) -> Vec<Arc<VaultSubscriber>> {
        self.vault.lock().get(vault_address).cloned().unwrap_or_default()
    }

    /// Subscribers across all vaults (buyer-keyed channels do not carry the
    /// vault address).
    pub fn all_vault_subscribers(&self) -> Vec<Arc<VaultSubscriber>> {
        self.vault.lock().values().flatten().cloned().collect()
    }

    pub fn add_home(&self, subscriber: Arc<HomeSubscriber>) {
        self.home.lock().push(subscriber);
    }

    pub fn remove_home(&self, subscriber: &Arc<HomeSubscriber>) {
        self.home.lock().retain(|s| !Arc::ptr_eq(s, subscriber));
    }

    pub fn add_gas(&self, subscriber: Arc<GasSubscriber>) {
        self.gas.lock().push(subscriber);
    }

    pub fn remove_gas(&self, subscriber: &Arc<GasSubscriber>) {
        self.gas.lock().retain(|s| !Arc::ptr_eq(s, subscriber));
    }

    pub fn gas_subscribers(&self) -> Vec<Arc<GasSubscriber>> {
        self.gas.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_full_buffer_marks_subscriber_slow() {
        let (subscriber, mut rx) =
            VaultSubscriber::new("0xa".into(), "0xv".into(), UserType::Lp);

        // Fill the buffer without the connection task reading.
        for i in 0..SUBSCRIBER_BUFFER {
            subscriber.outbox.send_or_mark_slow(format!("update {i}"));
        }
        assert!(!subscriber.outbox.is_slow());

        // The overflowing send trips the policy.
        subscriber.outbox.send_or_mark_slow("one too many".into());
        assert!(subscriber.outbox.is_slow());
        subscriber.outbox.slow_triggered().await;

        // Buffered messages are intact, the overflow was dropped.
        let mut drained = 0;
        while rx.try_recv().is_ok() {
            drained += 1;
        }
        assert_eq!(drained, SUBSCRIBER_BUFFER);

        // Further sends are ignored outright.
        subscriber.outbox.send_or_mark_slow("ignored".into());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_vault_registry_add_remove() {
        let subs = Subscribers::default();
        let (a, _rx_a) = VaultSubscriber::new("0x1".into(), "0xv".into(), UserType::Lp);
        let (b, _rx_b) = VaultSubscriber::new("0x2".into(), "0xv".into(), UserType::Ob);

        subs.add_vault(Arc::clone(&a));
        subs.add_vault(Arc::clone(&b));
        assert_eq!(subs.vault_subscribers("0xv").len(), 2);
        assert_eq!(subs.all_vault_subscribers().len(), 2);

        subs.remove_vault(&a);
        assert_eq!(subs.vault_subscribers("0xv").len(), 1);
        subs.remove_vault(&b);
        assert!(subs.vault_subscribers("0xv").is_empty());
    }

    #[test]
    fn test_user_type_parse() {
        assert_eq!("lp".parse::<UserType>().unwrap(), UserType::Lp);
        assert_eq!("ob".parse::<UserType>().unwrap(), UserType::Ob);
        assert!("trader".parse::<UserType>().is_err());
    }
}
