//! Plain (decrypted) packet framing: a 2-byte payload-type prefix plus the
//! inner frame.

use crate::buffer::Buffer;
use crate::error::AnytunError;
use crate::satp::{sniff_payload_type, PayloadType, PAYLOAD_TYPE_LEN};

/// A buffer view with a payload-type prefix and the inner frame payload.
#[derive(Debug, Clone)]
pub struct PlainPacket {
    buf: Buffer,
}

impl PlainPacket {
    /// Builds a packet around `frame`, tagging it with `payload_type`. If
    /// `payload_type` is `Tun` (unspecified), sniffs the frame's first
    /// nibble unless the caller explicitly passed `Tap` — TAP frames
    /// suppress sniffing.
    pub fn new(payload_type: PayloadType, frame: &[u8], growable: bool) -> Self {
        let resolved = match payload_type {
            PayloadType::Tun => sniff_payload_type(frame),
            other => other,
        };

        let mut buf = Buffer::new(PAYLOAD_TYPE_LEN + frame.len(), growable);
        buf.set_u16_be(0, resolved.as_u16())
            .expect("just-allocated buffer fits its own header");
        buf.as_mut_slice()[PAYLOAD_TYPE_LEN..].copy_from_slice(frame);
        PlainPacket { buf }
    }

    /// Wraps an already-framed buffer (e.g. the output of decryption).
    /// Fails if it is too short to hold even the payload-type prefix.
    pub fn from_buffer(buf: Buffer) -> Result<Self, AnytunError> {
        if buf.len() < PAYLOAD_TYPE_LEN {
            return Err(AnytunError::malformed(
                "plain packet shorter than the payload-type prefix",
            ));
        }
        Ok(PlainPacket { buf })
    }

    /// Allocates an empty plain packet sized to hold `frame_len` bytes of
    /// payload, for use as a decryption target.
    pub fn with_capacity(frame_len: usize, growable: bool) -> Self {
        PlainPacket {
            buf: Buffer::new(PAYLOAD_TYPE_LEN + frame_len, growable),
        }
    }

    pub fn payload_type(&self) -> Result<PayloadType, AnytunError> {
        PayloadType::try_from(self.buf.get_u16_be(0)?)
    }

    pub fn set_payload_type(&mut self, pt: PayloadType) -> Result<(), AnytunError> {
        self.buf.set_u16_be(0, pt.as_u16())
    }

    pub fn payload(&self) -> &[u8] {
        if self.buf.len() <= PAYLOAD_TYPE_LEN {
            return &[];
        }
        &self.buf.as_slice()[PAYLOAD_TYPE_LEN..]
    }

    pub fn payload_mut(&mut self) -> &mut [u8] {
        if self.buf.len() <= PAYLOAD_TYPE_LEN {
            return &mut [];
        }
        &mut self.buf.as_mut_slice()[PAYLOAD_TYPE_LEN..]
    }

    pub fn payload_len(&self) -> usize {
        self.buf.len().saturating_sub(PAYLOAD_TYPE_LEN)
    }

    /// Resizes the payload region, keeping the 2-byte prefix intact.
    pub fn set_payload_len(&mut self, payload_len: usize) -> Result<(), AnytunError> {
        self.buf.set_length(PAYLOAD_TYPE_LEN + payload_len)
    }

    /// The full wire-level plain buffer: prefix followed by payload.
    pub fn as_bytes(&self) -> &[u8] {
        self.buf.as_slice()
    }

    pub fn into_buffer(self) -> Buffer {
        self.buf
    }

    pub fn buffer_mut(&mut self) -> &mut Buffer {
        &mut self.buf
    }
}
