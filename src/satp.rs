//! Wire constants for the Secure Anycast Tunneling Protocol.

use crate::error::AnytunError;

/// Size of the fixed `EncryptedPacket` header: seq(4) + sender_id(2) + mux(2).
pub const HEADER_LEN: usize = 8;

/// Size of the `PlainPacket` payload-type prefix.
pub const PAYLOAD_TYPE_LEN: usize = 2;

/// Master salt length in bytes (RFC 3711 section 4.3.1, shared by anytun).
pub const SALT_LEN: usize = 14;

/// HMAC-SHA1 digest length before truncation.
pub const SHA1_DIGEST_LEN: usize = 20;

/// Default auth tag length (80 bits).
pub const DEFAULT_TAG_LEN: usize = 10;

/// Inner-frame payload type, carried as the first two bytes of every
/// decrypted `PlainPacket`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum PayloadType {
    /// Family unknown — dispatch by sniffing the first nibble of the frame.
    Tun = 0x0000,
    Tun4 = 0x0800,
    Tun6 = 0x86DD,
    Tap = 0x6558,
}

impl PayloadType {
    pub fn as_u16(self) -> u16 {
        self as u16
    }
}

impl TryFrom<u16> for PayloadType {
    type Error = AnytunError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            0x0000 => Ok(PayloadType::Tun),
            0x0800 => Ok(PayloadType::Tun4),
            0x86DD => Ok(PayloadType::Tun6),
            0x6558 => Ok(PayloadType::Tap),
            other => Err(AnytunError::malformed(format!(
                "unknown payload type 0x{other:04x}"
            ))),
        }
    }
}

/// Static peer attribute that asymmetrizes key derivation so both endpoints
/// can share a master key without ever producing identical session keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Left,
    Right,
}

/// Which direction a packet is travelling, from the local peer's point of
/// view. Purely a key-derivation input — it carries no replay-window
/// meaning in this core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Outbound,
    Inbound,
}

/// PRF labels used by key derivation. They feed directly into the KD
/// counter block, so the numeric values must never be renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Label {
    Enc,
    Auth,
    Salt,
    LeftEnc,
    LeftAuth,
    LeftSalt,
    RightEnc,
    RightAuth,
    RightSalt,
}

impl Label {
    /// The 32-bit value XORed into bytes 8..12 of the KD counter block.
    pub fn value(self) -> u32 {
        match self {
            Label::Enc => 0x00,
            Label::Auth => 0x01,
            Label::Salt => 0x02,
            Label::LeftEnc => 0x10,
            Label::LeftAuth => 0x11,
            Label::LeftSalt => 0x12,
            Label::RightEnc => 0x20,
            Label::RightAuth => 0x21,
            Label::RightSalt => 0x22,
        }
    }
}

/// Translates a base label (`Enc`/`Auth`/`Salt`) to its role- and
/// direction-qualified variant. Labels that are already role-qualified (or
/// any other value) pass through unchanged.
///
/// Outbound from LEFT uses LEFT_*; outbound from RIGHT uses RIGHT_*.
/// Inbound swaps the mapping, so a LEFT peer decrypting inbound traffic
/// derives keys with the RIGHT_* labels its peer used to encrypt.
pub fn convert_label(role: Role, dir: Direction, label: Label) -> Label {
    use Direction::*;
    use Label::*;
    use Role::*;

    match label {
        Enc => match (dir, role) {
            (Outbound, Left) | (Inbound, Right) => LeftEnc,
            (Outbound, Right) | (Inbound, Left) => RightEnc,
        },
        Salt => match (dir, role) {
            (Outbound, Left) | (Inbound, Right) => LeftSalt,
            (Outbound, Right) | (Inbound, Left) => RightSalt,
        },
        Auth => match (dir, role) {
            (Outbound, Left) | (Inbound, Right) => LeftAuth,
            (Outbound, Right) | (Inbound, Left) => RightAuth,
        },
        other => other,
    }
}

/// Sniffs the inner frame's IP version from its first nibble when the
/// caller did not already know the payload type.
pub fn sniff_payload_type(frame: &[u8]) -> PayloadType {
    match frame.first().map(|b| b >> 4) {
        Some(4) => PayloadType::Tun4,
        Some(6) => PayloadType::Tun6,
        _ => PayloadType::Tun,
    }
}
