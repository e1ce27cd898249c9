//! Key derivation: produces per-packet session keys from a shared master
//! key/salt, keyed by role, direction, label, and sequence number.

use std::fmt;

use sha1::{Digest, Sha1};
use sha2::Sha256;

use crate::aesctr::apply_keystream;
use crate::error::AnytunError;
use crate::satp::{convert_label, Direction, Label, Role, SALT_LEN};

/// `KDF(master_key, master_salt, dir, label, seq_nr) -> key_bytes`.
///
/// Implementations write exactly `out.len()` derived bytes into `out`.
/// Nothing here needs interior mutability: the master key/salt are fixed
/// at construction, and every call builds a fresh counter block, so the
/// trait takes `&self` rather than the `&mut self` a stateful cipher
/// handle would require.
pub trait KeyDerivation: fmt::Display + Send + Sync {
    fn generate(
        &self,
        dir: Direction,
        label: Label,
        seq_nr: u32,
        out: &mut [u8],
    ) -> Result<(), AnytunError>;

    fn role(&self) -> Role;
}

/// AES-128/192/256 in counter mode, keyed by role. The counter block is
///
/// ```text
/// ctr[0..14] = master_salt XOR (0...0 || label(4 BE) || seq_nr(4 BE))
/// ctr[14..16] = 0x0000
/// ```
///
/// where the label occupies bytes 8..12 and the sequence number bytes
/// 12..16 of the 16-byte block, both XORed in after the salt is copied in.
pub struct AesIcmKeyDerivation {
    role: Role,
    master_key: Vec<u8>,
    master_salt: [u8; SALT_LEN],
}

impl AesIcmKeyDerivation {
    pub fn new(
        master_key: Vec<u8>,
        master_salt: [u8; SALT_LEN],
        role: Role,
    ) -> Result<Self, AnytunError> {
        match master_key.len() {
            16 | 24 | 32 => {}
            other => {
                return Err(AnytunError::crypto_init(format!(
                    "master key length of {} bits is not supported",
                    other * 8
                )))
            }
        }
        Ok(AesIcmKeyDerivation {
            role,
            master_key,
            master_salt,
        })
    }

    pub fn master_key_hex(&self) -> String {
        hex::encode(&self.master_key)
    }

    pub fn master_salt_hex(&self) -> String {
        hex::encode(self.master_salt)
    }

    /// Derives a master key/salt from a passphrase: SHA-256 for the key
    /// (truncated to `key_len_bits/8` bytes from the tail of the digest),
    /// SHA-1 for the 14-byte salt. A config-loading convenience for sites
    /// that provision a shared passphrase rather than raw key bytes.
    pub fn from_passphrase(
        passphrase: &str,
        key_len_bits: u16,
        role: Role,
    ) -> Result<Self, AnytunError> {
        let key_len = (key_len_bits / 8) as usize;
        if key_len == 0 || key_len > 32 {
            return Err(AnytunError::crypto_init(format!(
                "bad master key length: {key_len_bits} bits"
            )));
        }
        let key_digest = Sha256::digest(passphrase.as_bytes());
        if key_len > key_digest.len() {
            return Err(AnytunError::crypto_init(
                "master key too long for passphrase algorithm",
            ));
        }
        let master_key = key_digest[key_digest.len() - key_len..].to_vec();

        let salt_digest = Sha1::digest(passphrase.as_bytes());
        if SALT_LEN > salt_digest.len() {
            return Err(AnytunError::crypto_init(
                "master salt too long for passphrase algorithm",
            ));
        }
        let mut master_salt = [0u8; SALT_LEN];
        master_salt.copy_from_slice(&salt_digest[salt_digest.len() - SALT_LEN..]);

        AesIcmKeyDerivation::new(master_key, master_salt, role)
    }

    fn counter_block(&self, dir: Direction, label: Label, seq_nr: u32) -> [u8; 16] {
        let mut ctr = [0u8; 16];
        ctr[..SALT_LEN].copy_from_slice(&self.master_salt);

        let label = convert_label(self.role, dir, label);
        let label_bytes = label.value().to_be_bytes();
        for i in 0..4 {
            ctr[8 + i] ^= label_bytes[i];
        }

        let seq_bytes = seq_nr.to_be_bytes();
        for i in 0..4 {
            ctr[12 + i] ^= seq_bytes[i];
        }

        ctr
    }
}

impl KeyDerivation for AesIcmKeyDerivation {
    fn generate(
        &self,
        dir: Direction,
        label: Label,
        seq_nr: u32,
        out: &mut [u8],
    ) -> Result<(), AnytunError> {
        let ctr_block = self.counter_block(dir, label, seq_nr);
        out.iter_mut().for_each(|b| *b = 0);
        apply_keystream(&self.master_key, &ctr_block, out)
    }

    fn role(&self) -> Role {
        self.role
    }
}

impl fmt::Display for AesIcmKeyDerivation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AesIcm{}KeyDerivation", self.master_key.len() * 8)
    }
}

/// Always returns all-zero keys. Selectable only for debugging.
pub struct NullKeyDerivation {
    role: Role,
}

impl NullKeyDerivation {
    pub fn new(role: Role) -> Self {
        NullKeyDerivation { role }
    }
}

impl KeyDerivation for NullKeyDerivation {
    fn generate(
        &self,
        _dir: Direction,
        _label: Label,
        _seq_nr: u32,
        out: &mut [u8],
    ) -> Result<(), AnytunError> {
        out.iter_mut().for_each(|b| *b = 0);
        Ok(())
    }

    fn role(&self) -> Role {
        self.role
    }
}

impl fmt::Display for NullKeyDerivation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NullKeyDerivation")
    }
}
