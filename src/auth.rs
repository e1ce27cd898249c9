//! HMAC-SHA1 packet authentication, truncated to the negotiated tag length.

use std::fmt;

use hmac::{Hmac, Mac};
use sha1::Sha1;
use subtle::ConstantTimeEq;

use crate::error::AnytunError;
use crate::kd::KeyDerivation;
use crate::packet::EncryptedPacket;
use crate::satp::{Direction, Label, SHA1_DIGEST_LEN};

type HmacSha1 = Hmac<Sha1>;

/// Generates and verifies the trailing authentication tag of an
/// `EncryptedPacket`.
pub trait AuthAlgo: fmt::Display + Send + Sync {
    fn tag_len(&self) -> usize;

    /// Appends (or zero-fills, if `tag_len() == 0`) the auth tag over
    /// `packet.authenticated_portion()`.
    fn generate(
        &self,
        kd: &dyn KeyDerivation,
        dir: Direction,
        packet: &mut EncryptedPacket,
    ) -> Result<(), AnytunError>;

    /// Verifies the trailing tag. Returns `Ok(true)` on success, `Ok(false)`
    /// on a clean mismatch (caller drops the packet), `Err` on a framing
    /// problem.
    fn verify(
        &self,
        kd: &dyn KeyDerivation,
        dir: Direction,
        packet: &EncryptedPacket,
    ) -> Result<bool, AnytunError>;
}

/// HMAC-SHA1, truncated to `tag_len` bytes (typically 10, i.e. 80 bits).
pub struct HmacSha1AuthAlgo {
    tag_len: usize,
}

impl HmacSha1AuthAlgo {
    pub fn new(tag_len: usize) -> Self {
        HmacSha1AuthAlgo { tag_len }
    }

    fn digest(key: &[u8], authenticated_portion: &[u8]) -> [u8; SHA1_DIGEST_LEN] {
        let mut mac =
            HmacSha1::new_from_slice(key).expect("HMAC-SHA1 accepts any key length");
        mac.update(authenticated_portion);
        let mut out = [0u8; SHA1_DIGEST_LEN];
        out.copy_from_slice(&mac.finalize().into_bytes());
        out
    }
}

impl AuthAlgo for HmacSha1AuthAlgo {
    fn tag_len(&self) -> usize {
        self.tag_len
    }

    fn generate(
        &self,
        kd: &dyn KeyDerivation,
        dir: Direction,
        packet: &mut EncryptedPacket,
    ) -> Result<(), AnytunError> {
        packet.add_auth_tag()?;
        if self.tag_len == 0 {
            return Ok(());
        }

        let mut key = vec![0u8; SHA1_DIGEST_LEN];
        let seq_nr = packet.header()?.seq_nr;
        kd.generate(dir, Label::Auth, seq_nr, &mut key)?;

        let hmac = Self::digest(&key, packet.authenticated_portion());
        let copy_len = self.tag_len.min(SHA1_DIGEST_LEN);

        let tag = packet.auth_tag_mut();
        if self.tag_len > SHA1_DIGEST_LEN {
            tag[..self.tag_len - SHA1_DIGEST_LEN].fill(0);
        }
        tag[self.tag_len - copy_len..].copy_from_slice(&hmac[SHA1_DIGEST_LEN - copy_len..]);

        Ok(())
    }

    fn verify(
        &self,
        kd: &dyn KeyDerivation,
        dir: Direction,
        packet: &EncryptedPacket,
    ) -> Result<bool, AnytunError> {
        if self.tag_len == 0 {
            return Ok(true);
        }
        if !packet.has_auth_tag() {
            return Err(AnytunError::malformed(
                "verify called on a packet with no auth tag region",
            ));
        }

        let mut key = vec![0u8; SHA1_DIGEST_LEN];
        let seq_nr = packet.header()?.seq_nr;
        kd.generate(dir, Label::Auth, seq_nr, &mut key)?;

        let hmac = Self::digest(&key, packet.authenticated_portion());
        let copy_len = self.tag_len.min(SHA1_DIGEST_LEN);
        let tag = packet.auth_tag();

        if self.tag_len > SHA1_DIGEST_LEN {
            let leading = &tag[..self.tag_len - SHA1_DIGEST_LEN];
            if leading.ct_eq(&vec![0u8; leading.len()]).unwrap_u8() != 1 {
                return Ok(false);
            }
        }

        let received = &tag[self.tag_len - copy_len..];
        let expected = &hmac[SHA1_DIGEST_LEN - copy_len..];
        Ok(received.ct_eq(expected).unwrap_u8() == 1)
    }
}

impl fmt::Display for HmacSha1AuthAlgo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HmacSha1AuthAlgo({} byte tag)", self.tag_len)
    }
}

/// Always succeeds and emits a zero-length/zero-filled tag. Paired with
/// `NullCipher` for plumbing tests.
pub struct NullAuthAlgo;

impl AuthAlgo for NullAuthAlgo {
    fn tag_len(&self) -> usize {
        0
    }

    fn generate(
        &self,
        _kd: &dyn KeyDerivation,
        _dir: Direction,
        packet: &mut EncryptedPacket,
    ) -> Result<(), AnytunError> {
        packet.add_auth_tag()
    }

    fn verify(
        &self,
        _kd: &dyn KeyDerivation,
        _dir: Direction,
        _packet: &EncryptedPacket,
    ) -> Result<bool, AnytunError> {
        Ok(true)
    }
}

impl fmt::Display for NullAuthAlgo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NullAuthAlgo")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kd::AesIcmKeyDerivation;
    use crate::satp::{Role, SALT_LEN};

    fn kd() -> AesIcmKeyDerivation {
        AesIcmKeyDerivation::new(vec![0x09u8; 16], [0x0Au8; SALT_LEN], Role::Left).unwrap()
    }

    #[test]
    fn generate_then_verify_succeeds() {
        let kd = kd();
        let auth = HmacSha1AuthAlgo::new(10);
        let mut pkt = EncryptedPacket::new(8, 10, true);
        pkt.set_header(crate::packet::Header {
            seq_nr: 5,
            sender_id: 1,
            mux: 1,
        })
        .unwrap();
        auth.generate(&kd, Direction::Outbound, &mut pkt).unwrap();
        assert!(auth.verify(&kd, Direction::Outbound, &pkt).unwrap());
    }

    #[test]
    fn bit_flip_fails_verification() {
        let kd = kd();
        let auth = HmacSha1AuthAlgo::new(10);
        let mut pkt = EncryptedPacket::new(8, 10, true);
        pkt.set_header(crate::packet::Header {
            seq_nr: 5,
            sender_id: 1,
            mux: 1,
        })
        .unwrap();
        auth.generate(&kd, Direction::Outbound, &mut pkt).unwrap();

        let last = pkt.auth_tag_mut().last_mut().unwrap();
        *last ^= 0xFF;
        assert!(!auth.verify(&kd, Direction::Outbound, &pkt).unwrap());
    }

    #[test]
    fn tag_truncation_to_10_bytes() {
        let kd = kd();
        let auth = HmacSha1AuthAlgo::new(10);
        let mut pkt = EncryptedPacket::new(0, 10, true);
        pkt.set_header(crate::packet::Header {
            seq_nr: 1,
            sender_id: 0,
            mux: 0,
        })
        .unwrap();
        auth.generate(&kd, Direction::Outbound, &mut pkt).unwrap();

        let seq_nr = pkt.header().unwrap().seq_nr;
        let mut key = vec![0u8; SHA1_DIGEST_LEN];
        kd.generate(Direction::Outbound, Label::Auth, seq_nr, &mut key)
            .unwrap();
        let full = HmacSha1AuthAlgo::digest(&key, pkt.authenticated_portion());
        assert_eq!(pkt.auth_tag(), &full[10..20]);
    }

    #[test]
    fn tag_expansion_to_24_bytes_zero_pads() {
        let kd = kd();
        let auth = HmacSha1AuthAlgo::new(24);
        let mut pkt = EncryptedPacket::new(0, 24, true);
        pkt.set_header(crate::packet::Header {
            seq_nr: 1,
            sender_id: 0,
            mux: 0,
        })
        .unwrap();
        auth.generate(&kd, Direction::Outbound, &mut pkt).unwrap();

        let tag = pkt.auth_tag();
        assert_eq!(&tag[..4], &[0u8; 4]);

        let seq_nr = pkt.header().unwrap().seq_nr;
        let mut key = vec![0u8; SHA1_DIGEST_LEN];
        kd.generate(Direction::Outbound, Label::Auth, seq_nr, &mut key)
            .unwrap();
        let full = HmacSha1AuthAlgo::digest(&key, pkt.authenticated_portion());
        assert_eq!(&tag[4..24], &full[..]);

        assert!(auth.verify(&kd, Direction::Outbound, &pkt).unwrap());
    }

    #[test]
    fn tag_len_zero_disables_auth() {
        let kd = kd();
        let auth = HmacSha1AuthAlgo::new(0);
        let mut pkt = EncryptedPacket::new(4, 0, true);
        auth.generate(&kd, Direction::Outbound, &mut pkt).unwrap();
        assert!(auth.verify(&kd, Direction::Outbound, &pkt).unwrap());
    }

    #[test]
    fn null_auth_always_succeeds() {
        let kd = kd();
        let auth = NullAuthAlgo;
        let mut pkt = EncryptedPacket::new(4, 10, true);
        auth.generate(&kd, Direction::Outbound, &mut pkt).unwrap();
        assert!(auth.verify(&kd, Direction::Outbound, &pkt).unwrap());
    }
}
