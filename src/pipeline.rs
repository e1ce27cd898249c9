//! Send-path and receive-path orchestration: wires the routing tree and a
//! set of connections into the two operations the tun/UDP collaborators
//! call into.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use tracing::warn;

use crate::connection::Connection;
use crate::counters::PacketCounters;
use crate::error::AnytunError;
use crate::packet::{EncryptedPacket, Header, PlainPacket};
use crate::routing::RoutingTree;
use crate::satp::{PayloadType, DEFAULT_TAG_LEN};

/// IPv4 destination is at header offset 16; IPv6 destination is at offset
/// 24 of its fixed 40-byte header. TAP (Ethernet) frames carry no routable
/// network-layer address here, so they fall back to the routing tree's
/// default route if one was configured.
fn destination_address<'a>(payload_type: PayloadType, frame: &'a [u8]) -> Option<&'a [u8]> {
    match payload_type {
        PayloadType::Tun4 => frame.get(16..20),
        PayloadType::Tun6 => frame.get(24..40),
        PayloadType::Tun | PayloadType::Tap => None,
    }
}

/// Ties a `RoutingTree` and a set of per-peer `Connection`s into the two
/// operations the I/O collaborators drive: `on_plain` for frames arriving
/// from tun/tap, `on_wire` for datagrams arriving from the UDP socket.
pub struct Pipeline {
    routes: RoutingTree,
    connections: HashMap<u16, Arc<Connection>>,
    local_sender_id: u16,
    tag_len: usize,
    device_type: PayloadType,
    pub counters: PacketCounters,
}

impl Pipeline {
    pub fn new(local_sender_id: u16, tag_len: usize) -> Self {
        Pipeline {
            routes: RoutingTree::new(),
            connections: HashMap::new(),
            local_sender_id,
            tag_len,
            device_type: PayloadType::Tun,
            counters: PacketCounters::new(),
        }
    }

    /// Selects the device type the tun/tap collaborator feeding this
    /// pipeline's `on_plain` actually is. `Tun` (the default) sniffs
    /// TUN4/TUN6 from the frame's first nibble; `Tap` suppresses sniffing
    /// and passes Ethernet frames through untouched (spec §4.6, S5). A
    /// `Pipeline` serves one tun/tap device, so the device type is
    /// pipeline-wide rather than per-connection.
    pub fn with_device_type(mut self, device_type: PayloadType) -> Self {
        self.device_type = device_type;
        self
    }

    pub fn add_route(&mut self, prefix: &[u8], prefix_len_bits: u8, mux: u16) {
        self.routes.insert(prefix, prefix_len_bits, mux);
    }

    pub fn add_connection(&mut self, mux: u16, connection: Arc<Connection>) {
        self.connections.insert(mux, connection);
    }

    fn connection_for(&self, mux: u16) -> Result<&Arc<Connection>, AnytunError> {
        self.connections.get(&mux).ok_or(AnytunError::NoRoute)
    }

    /// Send-path entry (frame from tun/tap -> datagram to the wire).
    /// Returns `None` on any recoverable failure after bumping the
    /// matching counter and logging; never panics on attacker input.
    pub fn on_plain(&self, frame: &[u8]) -> Option<(Vec<u8>, SocketAddr)> {
        match self.try_on_plain(frame) {
            Ok(result) => Some(result),
            Err(err) => {
                warn!(reason = %err, kind = err.kind(), "dropping outbound frame");
                self.counters.record(&err);
                None
            }
        }
    }

    fn try_on_plain(&self, frame: &[u8]) -> Result<(Vec<u8>, SocketAddr), AnytunError> {
        let plain = PlainPacket::new(self.device_type, frame, true);
        let payload_type = plain.payload_type()?;

        let dest = destination_address(payload_type, plain.payload());
        let mux = match dest {
            Some(addr) => self.routes.lookup(addr)?,
            None => self.routes.lookup(&[])?,
        };

        let connection = self.connection_for(mux)?;
        if !connection.is_active() {
            return Err(AnytunError::NoRoute);
        }

        let _send_guard = connection.lock_for_send();
        let seq_nr = connection.next_send_seq();
        let kd = connection.kd();

        let mut encrypted = EncryptedPacket::new(plain.as_bytes().len(), self.tag_len, true);
        encrypted.set_header(Header {
            seq_nr,
            sender_id: self.local_sender_id,
            mux,
        })?;

        let n = connection.cipher().encrypt(
            kd.as_ref(),
            crate::satp::Direction::Outbound,
            seq_nr,
            self.local_sender_id,
            mux,
            plain.as_bytes(),
            encrypted.payload_mut(),
        )?;
        if n != plain.as_bytes().len() {
            return Err(AnytunError::malformed(
                "cipher output shorter than plaintext",
            ));
        }

        connection
            .auth()
            .generate(kd.as_ref(), crate::satp::Direction::Outbound, &mut encrypted)?;

        Ok((encrypted.as_bytes().to_vec(), connection.remote_endpoint))
    }

    /// Receive-path entry (datagram from the wire -> frame for tun/tap).
    pub fn on_wire(&self, datagram: &[u8], _from: SocketAddr) -> Option<Vec<u8>> {
        match self.try_on_wire(datagram) {
            Ok(frame) => Some(frame),
            Err(err) => {
                warn!(reason = %err, kind = err.kind(), "dropping inbound datagram");
                self.counters.record(&err);
                None
            }
        }
    }

    fn try_on_wire(&self, datagram: &[u8]) -> Result<Vec<u8>, AnytunError> {
        if datagram.len() < crate::satp::HEADER_LEN + self.tag_len {
            return Err(AnytunError::malformed(
                "datagram shorter than header plus auth tag",
            ));
        }

        let buf = crate::buffer::Buffer::from_vec(datagram.to_vec(), false);
        let encrypted = EncryptedPacket::from_buffer(buf, self.tag_len, true)?;
        let header = encrypted.header()?;

        let connection = self.connection_for(header.mux)?;
        if !connection.is_active() {
            return Err(AnytunError::NoRoute);
        }
        let kd = connection.kd();

        let verified = connection
            .auth()
            .verify(kd.as_ref(), crate::satp::Direction::Inbound, &encrypted)?;
        if !verified {
            return Err(AnytunError::BadAuth);
        }

        let mut plain = PlainPacket::with_capacity(encrypted.payload_len(), true);
        let n = connection.cipher().decrypt(
            kd.as_ref(),
            crate::satp::Direction::Inbound,
            header.seq_nr,
            header.sender_id,
            header.mux,
            encrypted.payload(),
            plain.buffer_mut().as_mut_slice(),
        )?;
        if n != encrypted.payload_len() {
            return Err(AnytunError::malformed(
                "cipher output shorter than ciphertext",
            ));
        }

        plain.payload_type()?;
        Ok(plain.payload().to_vec())
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Pipeline::new(0, DEFAULT_TAG_LEN)
    }
}
