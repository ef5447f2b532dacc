use clap::Parser;
use sigrelay_common::types::DEFAULT_PORT;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

/// CLI arguments for the signaling relay.
#[derive(Parser, Debug, Clone)]
#[command(name = "sigrelay")]
#[command(about = "WebRTC signaling relay")]
#[command(version)]
pub struct Args {
    /// Address to bind the relay listener on.
    #[arg(long, default_value = "0.0.0.0", env = "SIGRELAY_HOST")]
    pub host: IpAddr,
    /// Port to serve the relay endpoint and static assets on.
    #[arg(long, short, default_value_t = DEFAULT_PORT, env = "PORT")]
    pub port: u16,
    /// Directory served at `/`.
    #[arg(long, default_value = "src/public", env = "SIGRELAY_STATIC_DIR")]
    pub static_dir: PathBuf,
    /// Socket address for the metrics endpoint.
    #[arg(long, default_value = "127.0.0.1:9090", env = "SIGRELAY_METRICS")]
    pub metrics_addr: SocketAddr,
    /// Maximum concurrently registered connections.
    #[arg(long, default_value = "100000", env = "SIGRELAY_MAX_CONNS")]
    pub max_conns: usize,
    /// Maximum size of one inbound WebSocket message in bytes.
    #[arg(long, default_value = "65536", env = "SIGRELAY_MAX_MESSAGE_SIZE")]
    pub max_message_size: usize,
    /// Outbound messages buffered per connection before new ones are dropped.
    #[arg(long, default_value = "256", env = "SIGRELAY_SEND_QUEUE")]
    pub send_queue: usize,
    /// Increase log verbosity (-v debug, -vv trace). Ignored when RUST_LOG is set.
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Runtime configuration derived from [`Args`].
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address to listen on.
    pub listen: SocketAddr,
    /// Directory served at `/`.
    pub static_dir: PathBuf,
    /// Socket address for the metrics endpoint.
    pub metrics_addr: SocketAddr,
    /// Maximum concurrently registered connections.
    pub max_conns: usize,
    /// Maximum size of one inbound WebSocket message in bytes.
    pub max_message_size: usize,
    /// Per-connection outbound queue capacity.
    pub send_queue: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), DEFAULT_PORT),
            static_dir: PathBuf::from("src/public"),
            metrics_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 9090),
            max_conns: 100_000,
            max_message_size: 65_536,
            send_queue: 256,
        }
    }
}

impl ServerConfig {
    /// Validates the configuration values are within acceptable bounds.
    /// Returns Ok(()) if valid, Err with description otherwise.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_conns == 0 {
            return Err("max_conns must be greater than 0".to_string());
        }
        if self.max_conns > 1_000_000 {
            return Err("max_conns exceeds reasonable limit (1,000,000)".to_string());
        }

        // Room for an SDP blob; anything past 16 MiB is not signaling.
        const MIN_MESSAGE_SIZE: usize = 1024;
        const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;
        if self.max_message_size < MIN_MESSAGE_SIZE {
            return Err(format!(
                "max_message_size must be at least {} bytes",
                MIN_MESSAGE_SIZE
            ));
        }
        if self.max_message_size > MAX_MESSAGE_SIZE {
            return Err(format!(
                "max_message_size exceeds maximum allowed ({} bytes)",
                MAX_MESSAGE_SIZE
            ));
        }

        if self.send_queue == 0 {
            return Err("send_queue must be greater than 0".to_string());
        }
        if self.send_queue > 65_536 {
            return Err("send_queue exceeds reasonable limit (65,536)".to_string());
        }

        if self.metrics_addr == self.listen {
            return Err("metrics_addr must differ from the relay listen address".to_string());
        }
        Ok(())
    }
}

impl From<Args> for ServerConfig {
    fn from(args: Args) -> Self {
        Self {
            listen: SocketAddr::new(args.host, args.port),
            static_dir: args.static_dir,
            metrics_addr: args.metrics_addr,
            max_conns: args.max_conns,
            max_message_size: args.max_message_size,
            send_queue: args.send_queue,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_passes() {
        assert!(ServerConfig::default().validate().is_ok());
    }

    #[test]
    fn defaults_listen_on_port_3000() {
        let args = Args::try_parse_from(["sigrelay"]).unwrap();
        let config = ServerConfig::from(args);
        if std::env::var_os("PORT").is_none() {
            assert_eq!(config.listen.port(), 3000);
        }
        assert_eq!(config.send_queue, 256);
    }

    #[test]
    fn flags_override_defaults() {
        let args = Args::try_parse_from([
            "sigrelay",
            "--host",
            "127.0.0.1",
            "--port",
            "8081",
            "--static-dir",
            "web",
            "--max-conns",
            "2",
            "-vv",
        ])
        .unwrap();
        assert_eq!(args.verbose, 2);
        let config = ServerConfig::from(args);
        assert_eq!(config.listen, "127.0.0.1:8081".parse().unwrap());
        assert_eq!(config.static_dir, PathBuf::from("web"));
        assert_eq!(config.max_conns, 2);
    }

    #[test]
    fn max_conns_zero() {
        let mut c = ServerConfig::default();
        c.max_conns = 0;
        assert!(c.validate().unwrap_err().contains("max_conns"));
    }

    #[test]
    fn max_conns_too_large() {
        let mut c = ServerConfig::default();
        c.max_conns = 1_000_001;
        assert!(c.validate().unwrap_err().contains("max_conns"));
    }

    #[test]
    fn max_message_size_too_small() {
        let mut c = ServerConfig::default();
        c.max_message_size = 1023;
        assert!(c.validate().unwrap_err().contains("max_message_size"));
    }

    #[test]
    fn max_message_size_too_large() {
        let mut c = ServerConfig::default();
        c.max_message_size = 16 * 1024 * 1024 + 1;
        assert!(c.validate().unwrap_err().contains("max_message_size"));
    }

    #[test]
    fn send_queue_zero() {
        let mut c = ServerConfig::default();
        c.send_queue = 0;
        assert!(c.validate().unwrap_err().contains("send_queue"));
    }

    #[test]
    fn metrics_addr_collides_with_listen() {
        let mut c = ServerConfig::default();
        c.metrics_addr = c.listen;
        assert!(c.validate().unwrap_err().contains("metrics_addr"));
    }

    #[test]
    fn boundary_values_valid() {
        let mut c = ServerConfig::default();
        c.max_conns = 1;
        c.max_message_size = 1024;
        c.send_queue = 1;
        assert!(c.validate().is_ok());

        c.max_conns = 1_000_000;
        c.max_message_size = 16 * 1024 * 1024;
        c.send_queue = 65_536;
        assert!(c.validate().is_ok());
    }
}
