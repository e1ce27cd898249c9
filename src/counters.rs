//! Per-packet drop counters, exposed for logging/metrics collaborators.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::AnytunError;

/// Counts of locally-recovered per-packet failures. Never includes
/// `CryptoInit`, which is fatal rather than recovered.
#[derive(Default)]
pub struct PacketCounters {
    malformed: AtomicU64,
    bad_auth: AtomicU64,
    no_route: AtomicU64,
}

impl PacketCounters {
    pub fn new() -> Self {
        PacketCounters::default()
    }

    pub fn malformed(&self) -> u64 {
        self.malformed.load(Ordering::Relaxed)
    }

    pub fn bad_auth(&self) -> u64 {
        self.bad_auth.load(Ordering::Relaxed)
    }

    pub fn no_route(&self) -> u64 {
        self.no_route.load(Ordering::Relaxed)
    }

    /// Bumps the counter matching `err`'s kind. `CryptoInit`/`Io` are not
    /// counted here — they propagate instead of being recovered locally.
    pub fn record(&self, err: &AnytunError) {
        match err {
            AnytunError::Malformed(_) => self.malformed.fetch_add(1, Ordering::Relaxed),
            AnytunError::BadAuth => self.bad_auth.fetch_add(1, Ordering::Relaxed),
            AnytunError::NoRoute => self.no_route.fetch_add(1, Ordering::Relaxed),
            AnytunError::CryptoInit(_) | AnytunError::Io(_) => 0,
        };
    }
}
