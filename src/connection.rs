//! Per-peer state: master key material, key derivation, cipher/auth
//! bindings, the send sequence counter, and the connection lifecycle.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use crate::auth::{AuthAlgo, HmacSha1AuthAlgo};
use crate::cipher::{AesIcmCipher, Cipher};
use crate::error::AnytunError;
use crate::kd::{AesIcmKeyDerivation, KeyDerivation};
use crate::satp::{Role, SALT_LEN};

/// Pre-shared (or externally provisioned) key material for a connection.
/// Key agreement itself is out of scope — this is purely the data the
/// pipeline consumes.
#[derive(Clone)]
pub struct MasterContext {
    pub master_key: Vec<u8>,
    pub master_salt: [u8; SALT_LEN],
    pub role: Role,
}

impl MasterContext {
    pub fn new(master_key: Vec<u8>, master_salt: [u8; SALT_LEN], role: Role) -> Self {
        MasterContext {
            master_key,
            master_salt,
            role,
        }
    }

    fn key_len_bits(&self) -> Result<u16, AnytunError> {
        match self.master_key.len() {
            16 => Ok(128),
            24 => Ok(192),
            32 => Ok(256),
            other => Err(AnytunError::crypto_init(format!(
                "master key length of {} bits is not supported",
                other * 8
            ))),
        }
    }
}

/// `New -> Active -> Teardown`. `New -> Active` happens on first successful
/// KD initialization; after `Teardown`, all further packets are dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    New,
    Active,
    Teardown,
}

/// One peer relationship: a sender identity, its remote endpoint, shared
/// key derivation, and the monotonic send sequence counter.
///
/// The send-sequence counter is a plain atomic — lost increments on a
/// partial failure before transmit are acceptable, sequence numbers need
/// not be gap-free. Header-stamping plus the cipher call for a
/// single send are serialized under `send_lock` so that packets sent from
/// one thread appear on the wire in send order; across threads, order is
/// unspecified by design.
pub struct Connection {
    pub sender_id: u16,
    pub remote_endpoint: SocketAddr,
    kd: RwLock<Arc<dyn KeyDerivation>>,
    cipher: Arc<dyn Cipher>,
    auth: Arc<dyn AuthAlgo>,
    send_seq: AtomicU32,
    send_lock: Mutex<()>,
    state: RwLock<ConnectionState>,
}

impl Connection {
    /// Builds a `Connection` from pre-shared key material, transitioning
    /// `New -> Active` immediately since KD construction here is
    /// infallible once the key length is validated. Returns `CryptoInit` on
    /// bad key/salt lengths, which is fatal for the connection.
    pub fn new(
        master: MasterContext,
        sender_id: u16,
        remote_endpoint: SocketAddr,
        tag_len: usize,
    ) -> Result<Self, AnytunError> {
        let key_len_bits = master.key_len_bits()?;
        let kd: Arc<dyn KeyDerivation> = Arc::new(AesIcmKeyDerivation::new(
            master.master_key,
            master.master_salt,
            master.role,
        )?);
        let cipher: Arc<dyn Cipher> = Arc::new(AesIcmCipher::new(key_len_bits)?);
        let auth: Arc<dyn AuthAlgo> = Arc::new(HmacSha1AuthAlgo::new(tag_len));

        Ok(Connection {
            sender_id,
            remote_endpoint,
            kd: RwLock::new(kd),
            cipher,
            auth,
            send_seq: AtomicU32::new(0),
            send_lock: Mutex::new(()),
            state: RwLock::new(ConnectionState::Active),
        })
    }

    /// Constructs a connection around arbitrary cipher/KD/auth
    /// implementations — used to wire up `NullCipher`/`NullAuthAlgo` for
    /// plumbing tests.
    pub fn with_algorithms(
        sender_id: u16,
        remote_endpoint: SocketAddr,
        kd: Arc<dyn KeyDerivation>,
        cipher: Arc<dyn Cipher>,
        auth: Arc<dyn AuthAlgo>,
    ) -> Self {
        Connection {
            sender_id,
            remote_endpoint,
            kd: RwLock::new(kd),
            cipher,
            auth,
            send_seq: AtomicU32::new(0),
            send_lock: Mutex::new(()),
            state: RwLock::new(ConnectionState::Active),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.read().expect("connection state lock poisoned")
    }

    pub fn is_active(&self) -> bool {
        self.state() == ConnectionState::Active
    }

    /// Swaps in new key material under the writer side of the KD lock.
    /// Readers (packet processing) never block each other, only a
    /// reconfigure blocks readers briefly.
    pub fn reconfigure(&self, master: MasterContext) -> Result<(), AnytunError> {
        let new_kd: Arc<dyn KeyDerivation> = Arc::new(AesIcmKeyDerivation::new(
            master.master_key,
            master.master_salt,
            master.role,
        )?);
        *self.kd.write().expect("connection kd lock poisoned") = new_kd;
        Ok(())
    }

    pub fn teardown(&self) {
        *self.state.write().expect("connection state lock poisoned") = ConnectionState::Teardown;
    }

    pub fn cipher(&self) -> &Arc<dyn Cipher> {
        &self.cipher
    }

    pub fn auth(&self) -> &Arc<dyn AuthAlgo> {
        &self.auth
    }

    pub fn kd(&self) -> Arc<dyn KeyDerivation> {
        Arc::clone(&self.kd.read().expect("connection kd lock poisoned"))
    }

    /// Claims the next send sequence number. Gaps are fine; this never
    /// blocks.
    pub fn next_send_seq(&self) -> u32 {
        self.send_seq.fetch_add(1, Ordering::Relaxed)
    }

    /// Serializes header-stamping + cipher invocation for a single send so
    /// that packets from one thread land on the wire in send order.
    pub fn lock_for_send(&self) -> std::sync::MutexGuard<'_, ()> {
        self.send_lock.lock().expect("connection send lock poisoned")
    }
}
