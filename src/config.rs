//! Configuration: loads master key material and static routes from a TOML
//! file instead of hardcoding them, in the shape of a typical
//! `ProjectDirs`-rooted config file.

use std::fs;
use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::connection::MasterContext;
use crate::error::AnytunError;
use crate::satp::{PayloadType, Role, SALT_LEN};

/// One static route entry: `prefix/prefix_len_bits -> mux`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteConfig {
    pub prefix: Vec<u8>,
    pub prefix_len_bits: u8,
    pub mux: u16,
}

/// One peer connection's configuration: key material (hex-encoded for TOML
/// friendliness), remote endpoint, local sender identity, and the mux it
/// answers to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub mux: u16,
    pub sender_id: u16,
    pub remote_endpoint: SocketAddr,
    pub role: RoleConfig,
    pub master_key_hex: String,
    pub master_salt_hex: String,
    #[serde(default = "default_tag_len")]
    pub tag_len: usize,
}

fn default_tag_len() -> usize {
    crate::satp::DEFAULT_TAG_LEN
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum RoleConfig {
    Left,
    Right,
}

impl From<RoleConfig> for Role {
    fn from(role: RoleConfig) -> Self {
        match role {
            RoleConfig::Left => Role::Left,
            RoleConfig::Right => Role::Right,
        }
    }
}

/// Which tun/tap device the pipeline's `on_plain` frames come from.
/// `Tun` (the default) sniffs TUN4/TUN6 from the frame's first nibble;
/// `Tap` suppresses sniffing, matching spec S5.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub enum DeviceConfig {
    #[default]
    Tun,
    Tap,
}

impl From<DeviceConfig> for PayloadType {
    fn from(device: DeviceConfig) -> Self {
        match device {
            DeviceConfig::Tun => PayloadType::Tun,
            DeviceConfig::Tap => PayloadType::Tap,
        }
    }
}

impl ConnectionConfig {
    pub fn master_context(&self) -> Result<MasterContext, AnytunError> {
        let master_key = hex::decode(&self.master_key_hex)
            .map_err(|e| AnytunError::crypto_init(format!("bad master_key_hex: {e}")))?;
        let salt_bytes = hex::decode(&self.master_salt_hex)
            .map_err(|e| AnytunError::crypto_init(format!("bad master_salt_hex: {e}")))?;
        if salt_bytes.len() != SALT_LEN {
            return Err(AnytunError::crypto_init(format!(
                "master_salt_hex decodes to {} bytes, expected {SALT_LEN}",
                salt_bytes.len()
            )));
        }
        let mut master_salt = [0u8; SALT_LEN];
        master_salt.copy_from_slice(&salt_bytes);
        Ok(MasterContext::new(master_key, master_salt, self.role.into()))
    }
}

/// Top-level configuration file: local sender identity, static routes, and
/// the set of peer connections to establish at startup.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Local UDP endpoint to bind the demo binary's socket to.
    pub listen_addr: Option<SocketAddr>,
    /// Tun or tap framing for frames arriving on the send path.
    #[serde(default)]
    pub device: DeviceConfig,
    pub routes: Vec<RouteConfig>,
    pub connections: Vec<ConnectionConfig>,
}

impl PipelineConfig {
    fn config_dir() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("net", "anytun", "anytun")
            .context("could not determine config directory")?;
        Ok(proj_dirs.config_dir().to_path_buf())
    }

    fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("anytun.toml"))
    }

    /// Loads from the platform config directory, or returns an empty
    /// configuration if no file exists yet (mirrors the common
    /// `Config::load` convenience of falling back to defaults).
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(&path).context("failed to read config file")?;
        toml::from_str(&content).context("failed to parse config file")
    }

    pub fn load_from_path(path: &PathBuf) -> Result<Self> {
        let content = fs::read_to_string(path).context("failed to read config file")?;
        toml::from_str(&content).context("failed to parse config file")
    }

    pub fn save(&self) -> Result<()> {
        let dir = Self::config_dir()?;
        fs::create_dir_all(&dir).context("failed to create config directory")?;

        let path = Self::config_path()?;
        let content = toml::to_string_pretty(self).context("failed to serialize config")?;
        fs::write(&path, content).context("failed to write config file")?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = fs::Permissions::from_mode(0o600);
            fs::set_permissions(&path, perms).context("failed to set config permissions")?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_config_decodes_hex_key_material() {
        let cfg = ConnectionConfig {
            mux: 7,
            sender_id: 1,
            remote_endpoint: "127.0.0.1:4567".parse().unwrap(),
            role: RoleConfig::Left,
            master_key_hex: "00".repeat(16),
            master_salt_hex: "11".repeat(SALT_LEN),
            tag_len: 10,
        };
        let master = cfg.master_context().unwrap();
        assert_eq!(master.master_key, vec![0u8; 16]);
        assert_eq!(master.master_salt, [0x11u8; SALT_LEN]);
    }

    #[test]
    fn rejects_wrong_salt_length() {
        let cfg = ConnectionConfig {
            mux: 7,
            sender_id: 1,
            remote_endpoint: "127.0.0.1:4567".parse().unwrap(),
            role: RoleConfig::Left,
            master_key_hex: "00".repeat(16),
            master_salt_hex: "11".repeat(4),
            tag_len: 10,
        };
        assert!(cfg.master_context().is_err());
    }

    #[test]
    fn toml_roundtrip_preserves_routes_and_connections() {
        let cfg = PipelineConfig {
            listen_addr: Some("127.0.0.1:9001".parse().unwrap()),
            device: DeviceConfig::Tap,
            routes: vec![RouteConfig {
                prefix: vec![10, 0, 0, 0],
                prefix_len_bits: 8,
                mux: 7,
            }],
            connections: vec![ConnectionConfig {
                mux: 7,
                sender_id: 1,
                remote_endpoint: "127.0.0.1:4567".parse().unwrap(),
                role: RoleConfig::Left,
                master_key_hex: "00".repeat(16),
                master_salt_hex: "11".repeat(SALT_LEN),
                tag_len: 10,
            }],
        };
        let toml_text = toml::to_string_pretty(&cfg).unwrap();
        let parsed: PipelineConfig = toml::from_str(&toml_text).unwrap();
        assert_eq!(parsed.routes.len(), 1);
        assert_eq!(parsed.connections[0].mux, 7);
        assert!(matches!(parsed.device, DeviceConfig::Tap));
    }
}
