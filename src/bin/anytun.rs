//! Demo entry point: wires a `Pipeline` to a real UDP socket so the crate
//! can be exercised from the command line. Tun/tap device I/O is out of
//! scope, so frames are read as hex text from stdin and received frames
//! are printed the same way.

use std::io::BufRead;
use std::net::UdpSocket;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use anytun::config::PipelineConfig;
use anytun::connection::Connection;
use anytun::kd::AesIcmKeyDerivation;
use anytun::pipeline::Pipeline;
use anytun::satp::Role;

#[derive(Parser)]
#[command(name = "anytun")]
#[command(about = "SATP packet pipeline demo", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline against a config file, reading/writing frames as
    /// hex text on stdin/stdout and datagrams over a real UDP socket.
    Run {
        /// Path to a TOML pipeline config (see `config::PipelineConfig`)
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Derive a master key/salt from a passphrase and print them as hex,
    /// ready to paste into a config file's `master_key_hex`/`master_salt_hex`.
    Keygen {
        /// Passphrase to derive key material from
        passphrase: String,

        /// Key length in bits: 128, 192, or 256
        #[arg(long, default_value = "128")]
        key_len_bits: u16,

        /// Role this key material will be used as
        #[arg(long, value_enum)]
        role: RoleArg,
    },
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum RoleArg {
    Left,
    Right,
}

impl From<RoleArg> for Role {
    fn from(role: RoleArg) -> Self {
        match role {
            RoleArg::Left => Role::Left,
            RoleArg::Right => Role::Right,
        }
    }
}

static STOPPING: AtomicBool = AtomicBool::new(false);

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    match cli.command {
        Commands::Run { config } => run(&config),
        Commands::Keygen {
            passphrase,
            key_len_bits,
            role,
        } => keygen(&passphrase, key_len_bits, role.into()),
    }
}

fn keygen(passphrase: &str, key_len_bits: u16, role: Role) -> Result<()> {
    let kd = AesIcmKeyDerivation::from_passphrase(passphrase, key_len_bits, role)
        .context("failed to derive key material from passphrase")?;
    println!("master_key_hex = \"{}\"", kd.master_key_hex());
    println!("master_salt_hex = \"{}\"", kd.master_salt_hex());
    Ok(())
}

fn run(config_path: &PathBuf) -> Result<()> {
    let config = PipelineConfig::load_from_path(config_path).context("loading pipeline config")?;
    let listen_addr = config
        .listen_addr
        .context("config is missing listen_addr")?;

    let mut pipeline = Pipeline::new(
        config
            .connections
            .first()
            .map(|c| c.sender_id)
            .unwrap_or(0),
        anytun::satp::DEFAULT_TAG_LEN,
    )
    .with_device_type(config.device.into());

    for route in &config.routes {
        pipeline.add_route(&route.prefix, route.prefix_len_bits, route.mux);
    }
    for conn_cfg in &config.connections {
        let master = conn_cfg
            .master_context()
            .context("building master context from config")?;
        let connection = Connection::new(
            master,
            conn_cfg.sender_id,
            conn_cfg.remote_endpoint,
            conn_cfg.tag_len,
        )
        .context("initializing connection")?;
        pipeline.add_connection(conn_cfg.mux, Arc::new(connection));
    }
    let pipeline = Arc::new(pipeline);

    let socket = UdpSocket::bind(listen_addr).context("binding UDP socket")?;
    socket
        .set_read_timeout(Some(Duration::from_millis(200)))
        .context("setting socket read timeout")?;
    tracing::info!(%listen_addr, "pipeline listening");

    let recv_socket = socket.try_clone().context("cloning socket for reader thread")?;
    let recv_pipeline = Arc::clone(&pipeline);
    let reader = thread::spawn(move || receive_loop(recv_socket, recv_pipeline));

    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = line.context("reading stdin")?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "quit" {
            break;
        }
        match hex::decode(line) {
            Ok(frame) => {
                if let Some((datagram, to)) = pipeline.on_plain(&frame) {
                    if let Err(e) = socket.send_to(&datagram, to) {
                        tracing::warn!(error = %e, "failed to send datagram");
                    }
                }
            }
            Err(e) => tracing::warn!(error = %e, "expected hex-encoded frame"),
        }
    }

    STOPPING.store(true, Ordering::SeqCst);
    reader.join().expect("receive thread panicked");
    Ok(())
}

fn receive_loop(socket: UdpSocket, pipeline: Arc<Pipeline>) {
    let mut buf = [0u8; 2048];
    while !STOPPING.load(Ordering::SeqCst) {
        match socket.recv_from(&mut buf) {
            Ok((n, from)) => {
                if let Some(frame) = pipeline.on_wire(&buf[..n], from) {
                    println!("{}", hex::encode(frame));
                }
            }
            Err(e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut => {}
            Err(e) => {
                tracing::warn!(error = %e, "socket recv failed");
            }
        }
    }
}
