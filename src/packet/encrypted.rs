//! Encrypted (wire) packet framing: fixed 8-byte header, ciphertext
//! payload, optional trailing authentication tag.

use crate::buffer::Buffer;
use crate::error::AnytunError;
use crate::satp::HEADER_LEN;

/// SATP datagram header, always present, always network byte order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Header {
    pub seq_nr: u32,
    pub sender_id: u16,
    pub mux: u16,
}

/// A buffer view over `header || payload || [auth_tag]`.
///
/// `with_auth_tag` toggles whether the trailing `tag_len` bytes of the
/// buffer are treated as part of the tag rather than the payload, absent
/// until `add_auth_tag`/`with_auth_tag(true)` is called.
#[derive(Debug, Clone)]
pub struct EncryptedPacket {
    buf: Buffer,
    tag_len: usize,
    tag_present: bool,
}

impl EncryptedPacket {
    /// Allocates space for `payload_len` bytes of ciphertext with no auth
    /// tag yet present.
    pub fn new(payload_len: usize, tag_len: usize, growable: bool) -> Self {
        EncryptedPacket {
            buf: Buffer::new(HEADER_LEN + payload_len, growable),
            tag_len,
            tag_present: false,
        }
    }

    /// Wraps a raw datagram read off the wire. `tag_present` should be
    /// `true` whenever the transport is known to carry tags (the normal
    /// case) so that `payload()`/`authenticated_portion()` exclude it.
    pub fn from_buffer(
        buf: Buffer,
        tag_len: usize,
        tag_present: bool,
    ) -> Result<Self, AnytunError> {
        if buf.len() < HEADER_LEN {
            return Err(AnytunError::malformed(format!(
                "encrypted packet length {} shorter than header ({HEADER_LEN})",
                buf.len()
            )));
        }
        if tag_present && buf.len() < HEADER_LEN + tag_len {
            return Err(AnytunError::malformed(format!(
                "encrypted packet length {} too short for header+tag ({})",
                buf.len(),
                HEADER_LEN + tag_len
            )));
        }
        Ok(EncryptedPacket {
            buf,
            tag_len,
            tag_present,
        })
    }

    pub fn header(&self) -> Result<Header, AnytunError> {
        Ok(Header {
            seq_nr: self.buf.get_u32_be(0)?,
            sender_id: self.buf.get_u16_be(4)?,
            mux: self.buf.get_u16_be(6)?,
        })
    }

    pub fn set_header(&mut self, header: Header) -> Result<(), AnytunError> {
        self.buf.set_u32_be(0, header.seq_nr)?;
        self.buf.set_u16_be(4, header.sender_id)?;
        self.buf.set_u16_be(6, header.mux)?;
        Ok(())
    }

    pub fn tag_len(&self) -> usize {
        self.tag_len
    }

    fn tag_region_len(&self) -> usize {
        if self.tag_present {
            self.tag_len
        } else {
            0
        }
    }

    /// Fails fast if the buffer has shrunk below what the header (and, if
    /// present, the tag region) requires. Called internally after every
    /// `set_length`, mirroring the original's `reinit()` re-derivation of
    /// `header_`/`payload_`/`auth_tag_` — there are no raw pointers to
    /// re-derive here, but a buffer mutated out from under a packet view
    /// must still be caught immediately rather than surfacing later as a
    /// garbled `header()`/`payload()` read.
    fn revalidate(&self) -> Result<(), AnytunError> {
        let required = HEADER_LEN + self.tag_region_len();
        if self.buf.len() < required {
            return Err(AnytunError::malformed(format!(
                "encrypted packet length {} shorter than header+tag ({required})",
                self.buf.len()
            )));
        }
        Ok(())
    }

    pub fn payload_len(&self) -> usize {
        self.buf
            .len()
            .saturating_sub(HEADER_LEN)
            .saturating_sub(self.tag_region_len())
    }

    pub fn payload(&self) -> &[u8] {
        let len = self.payload_len();
        self.buf.slice(HEADER_LEN, len).unwrap_or(&[])
    }

    pub fn payload_mut(&mut self) -> &mut [u8] {
        let len = self.payload_len();
        self.buf.slice_mut(HEADER_LEN, len).unwrap_or(&mut [])
    }

    /// Everything except the trailing auth tag: header ++ payload. This is
    /// exactly what gets authenticated.
    pub fn authenticated_portion(&self) -> &[u8] {
        let end = self.buf.len() - self.tag_region_len();
        &self.buf.as_slice()[..end]
    }

    /// Toggles whether the trailing `tag_len` bytes are treated as the tag.
    /// Fails if enabling would require more bytes than the buffer holds.
    pub fn with_auth_tag(&mut self, present: bool) -> Result<(), AnytunError> {
        if present && self.buf.len() < HEADER_LEN + self.tag_len {
            return Err(AnytunError::malformed(
                "auth tag can't be enabled, buffer is too small",
            ));
        }
        self.tag_present = present;
        Ok(())
    }

    pub fn has_auth_tag(&self) -> bool {
        self.tag_present
    }

    /// Grows the buffer by `tag_len` bytes and marks the tag region
    /// present, ready for `generate` to fill in.
    pub fn add_auth_tag(&mut self) -> Result<(), AnytunError> {
        if self.tag_present {
            return Ok(());
        }
        if self.tag_len == 0 {
            self.tag_present = true;
            return Ok(());
        }
        let new_len = self.buf.len() + self.tag_len;
        self.buf.set_length(new_len)?;
        self.tag_present = true;
        self.revalidate()
    }

    /// Shrinks the buffer by `tag_len` bytes, inverse of `add_auth_tag`.
    pub fn remove_auth_tag(&mut self) -> Result<(), AnytunError> {
        if !self.tag_present {
            return Ok(());
        }
        self.tag_present = false;
        if self.tag_len == 0 {
            return Ok(());
        }
        let new_len = self.buf.len() - self.tag_len;
        self.buf.set_length(new_len)?;
        self.revalidate()
    }

    pub fn auth_tag(&self) -> &[u8] {
        if !self.tag_present || self.tag_len == 0 {
            return &[];
        }
        let start = self.buf.len() - self.tag_len;
        self.buf.slice(start, self.tag_len).unwrap_or(&[])
    }

    pub fn auth_tag_mut(&mut self) -> &mut [u8] {
        if !self.tag_present || self.tag_len == 0 {
            return &mut [];
        }
        let start = self.buf.len() - self.tag_len;
        self.buf.slice_mut(start, self.tag_len).unwrap_or(&mut [])
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.buf.as_slice()
    }

    pub fn set_payload_len(&mut self, payload_len: usize) -> Result<(), AnytunError> {
        let tag_region = self.tag_region_len();
        self.buf
            .set_length(HEADER_LEN + payload_len + tag_region)?;
        self.revalidate()
    }

    pub fn into_buffer(self) -> Buffer {
        self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_roundtrip() {
        let mut pkt = EncryptedPacket::new(4, 10, false);
        let header = Header {
            seq_nr: 0xDEADBEEF,
            sender_id: 0x1234,
            mux: 0x5678,
        };
        pkt.set_header(header).unwrap();
        assert_eq!(pkt.header().unwrap(), header);
    }

    #[test]
    fn add_remove_auth_tag_roundtrip() {
        let mut pkt = EncryptedPacket::new(4, 10, true);
        let before = pkt.as_bytes().to_vec();
        pkt.add_auth_tag().unwrap();
        assert_eq!(pkt.as_bytes().len(), before.len() + 10);
        pkt.remove_auth_tag().unwrap();
        assert_eq!(pkt.as_bytes(), before.as_slice());
    }

    #[test]
    fn empty_payload_is_header_plus_tag() {
        let mut pkt = EncryptedPacket::new(0, 10, true);
        pkt.add_auth_tag().unwrap();
        assert_eq!(pkt.as_bytes().len(), HEADER_LEN + 10);
        assert_eq!(pkt.payload_len(), 0);
    }

    #[test]
    fn zero_tag_len_disables_tag_region() {
        let mut pkt = EncryptedPacket::new(4, 0, true);
        pkt.add_auth_tag().unwrap();
        assert_eq!(pkt.payload_len(), 4);
        assert!(pkt.auth_tag().is_empty());
    }

    #[test]
    fn too_short_for_header_is_malformed() {
        let buf = Buffer::new(4, false);
        assert!(EncryptedPacket::from_buffer(buf, 10, true).is_err());
    }

    #[test]
    fn too_short_for_tag_is_malformed() {
        let buf = Buffer::new(HEADER_LEN + 2, false);
        assert!(EncryptedPacket::from_buffer(buf.clone(), 10, true).is_err());
        assert!(EncryptedPacket::from_buffer(buf, 2, true).is_ok());
    }

    #[test]
    fn revalidate_catches_a_buffer_shrunk_out_from_under_the_tag_region() {
        let mut pkt = EncryptedPacket::new(4, 10, true);
        pkt.add_auth_tag().unwrap();
        assert!(pkt.revalidate().is_ok());

        // Shrink the backing buffer directly, bypassing add_auth_tag/
        // remove_auth_tag/set_payload_len's own length bookkeeping, the
        // way a view re-derived after an external realloc might find it.
        pkt.buf.set_length(HEADER_LEN + 2).unwrap();
        assert!(pkt.revalidate().is_err());
    }

    #[test]
    fn set_payload_len_revalidates_after_resizing() {
        let mut pkt = EncryptedPacket::new(4, 10, true);
        pkt.add_auth_tag().unwrap();
        pkt.set_payload_len(20).unwrap();
        assert_eq!(pkt.payload_len(), 20);
        assert_eq!(pkt.as_bytes().len(), HEADER_LEN + 20 + 10);
    }
}
