//! AES-CTR keystream application, dispatching over the three supported key
//! sizes. Shared by key derivation and the payload cipher, both of which
//! encrypt a zero/plaintext buffer under a 16-byte counter block.

use aes::cipher::{KeyIvInit, StreamCipher};

use crate::error::AnytunError;

type Aes128Ctr = ctr::Ctr128BE<aes::Aes128>;
type Aes192Ctr = ctr::Ctr128BE<aes::Aes192>;
type Aes256Ctr = ctr::Ctr128BE<aes::Aes256>;

/// Encrypts (equivalently decrypts — CTR is its own inverse) `buf` in place
/// using AES-`key`-CTR with the given 16-byte counter block as IV.
///
/// `key` must be exactly 16, 24, or 32 bytes; any other length is a setup
/// failure (`CryptoInit`), never a per-packet error.
pub fn apply_keystream(key: &[u8], ctr_block: &[u8; 16], buf: &mut [u8]) -> Result<(), AnytunError> {
    match key.len() {
        16 => {
            let mut cipher = Aes128Ctr::new(key.into(), ctr_block.into());
            cipher.apply_keystream(buf);
        }
        24 => {
            let mut cipher = Aes192Ctr::new(key.into(), ctr_block.into());
            cipher.apply_keystream(buf);
        }
        32 => {
            let mut cipher = Aes256Ctr::new(key.into(), ctr_block.into());
            cipher.apply_keystream(buf);
        }
        other => {
            return Err(AnytunError::crypto_init(format!(
                "unsupported AES key length: {other} bytes (need 16, 24, or 32)"
            )))
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_bad_key_length() {
        let mut buf = [0u8; 16];
        assert!(apply_keystream(&[0u8; 10], &[0u8; 16], &mut buf).is_err());
    }

    #[test]
    fn ctr_is_self_inverse() {
        let key = [0x2bu8; 16];
        let ctr_block = [0x3cu8; 16];
        let plain = b"anycast tunnel!!".to_vec();
        let mut buf = plain.clone();
        apply_keystream(&key, &ctr_block, &mut buf).unwrap();
        assert_ne!(buf, plain);
        apply_keystream(&key, &ctr_block, &mut buf).unwrap();
        assert_eq!(buf, plain);
    }
}
