//! Typed buffer views for the two packet stages: plaintext and wire.

pub mod encrypted;
pub mod plain;

pub use encrypted::{EncryptedPacket, Header};
pub use plain::PlainPacket;
