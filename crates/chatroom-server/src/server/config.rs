use anyhow::bail;
use clap::Parser;
use core::time::Duration;

/// Runtime configuration for the `chatroom-server` binary.
///
/// These settings control where the server listens, how much each client's
/// outbound stream may buffer, and how long a broadcast may wait on a slow
/// recipient. All values are parsed from CLI arguments or environment
/// variables (a `.env` file is loaded first), with defaults suitable for a
/// small deployment.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "chatroom-server",
    version,
    about = "A gRPC chat room with real-time message fan-out"
)]
pub struct CliArgs {
    /// Address to listen on (TCP or Unix socket path; use --uds for Unix
    /// socket).
    ///
    /// Example: "0.0.0.0:50051" or "/tmp/chatroom.sock"
    ///
    /// Environment variable: `SERVER_ADDR`
    #[arg(long, env = "SERVER_ADDR", default_value_t = String::from("0.0.0.0:50051"))]
    pub server_addr: String,

    /// Listen on a Unix socket instead of TCP. If set, `SERVER_ADDR` must be a
    /// file path.
    #[arg(short, long, default_value_t = false)]
    pub uds: bool,

    /// Number of messages buffered per connected client before broadcasts to
    /// that client start waiting.
    ///
    /// Environment variable: `SINK_BUFFER_SIZE`
    #[arg(long, env = "SINK_BUFFER_SIZE", default_value_t = 64)]
    pub sink_buffer_size: usize,

    /// Upper bound, in milliseconds, a broadcast waits on one recipient whose
    /// buffer is full. The message is dropped for that recipient afterwards.
    ///
    /// Environment variable: `SEND_TIMEOUT_MS`
    #[arg(long, env = "SEND_TIMEOUT_MS", default_value_t = 250)]
    pub send_timeout_ms: u64,

    /// Seconds to wait for connected sessions to drain on shutdown.
    ///
    /// Environment variable: `SHUTDOWN_TIMEOUT`
    #[arg(long, env = "SHUTDOWN_TIMEOUT", default_value_t = 5)]
    pub shutdown_timeout: u64,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub server_addr: String,
    pub uds: bool,
    pub sink_buffer_size: usize,
    pub send_timeout: Duration,
    pub shutdown_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            server_addr: String::from("0.0.0.0:50051"),
            uds: false,
            sink_buffer_size: 64,
            send_timeout: Duration::from_millis(250),
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.sink_buffer_size == 0 {
            bail!("SINK_BUFFER_SIZE must be greater than 0");
        }

        if args.send_timeout_ms == 0 {
            bail!("SEND_TIMEOUT_MS must be greater than 0");
        }

        if args.server_addr.trim().is_empty() {
            bail!("SERVER_ADDR must not be empty");
        }

        Ok(Self {
            server_addr: args.server_addr,
            uds: args.uds,
            sink_buffer_size: args.sink_buffer_size,
            send_timeout: Duration::from_millis(args.send_timeout_ms),
            shutdown_timeout: Duration::from_secs(args.shutdown_timeout),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    /// Every env-backed option, passed explicitly so variables set in the
    /// developer's shell cannot leak into the parse.
    const BASELINE: [(&str, &str); 4] = [
        ("--server-addr", "0.0.0.0:50051"),
        ("--sink-buffer-size", "64"),
        ("--send-timeout-ms", "250"),
        ("--shutdown-timeout", "5"),
    ];

    fn parse(overrides: &[(&str, &str)]) -> anyhow::Result<ServerConfig> {
        let mut argv = vec!["chatroom-server"];
        for (flag, value) in BASELINE {
            let value = overrides
                .iter()
                .find(|(name, _)| *name == flag)
                .map_or(value, |(_, v)| *v);
            argv.extend([flag, value]);
        }
        ServerConfig::try_from(CliArgs::try_parse_from(argv)?)
    }

    fn declared_default(id: &str) -> String {
        let command = CliArgs::command();
        let arg = command
            .get_arguments()
            .find(|arg| arg.get_id() == id)
            .unwrap();
        arg.get_default_values()[0].to_string_lossy().into_owned()
    }

    #[test]
    fn declared_defaults_match_default_config() {
        let default = ServerConfig::default();
        assert_eq!(declared_default("server_addr"), default.server_addr);
        assert_eq!(
            declared_default("sink_buffer_size"),
            default.sink_buffer_size.to_string()
        );
        assert_eq!(
            declared_default("send_timeout_ms"),
            default.send_timeout.as_millis().to_string()
        );
        assert_eq!(
            declared_default("shutdown_timeout"),
            default.shutdown_timeout.as_secs().to_string()
        );
        assert!(!parse(&[]).unwrap().uds);
    }

    #[test]
    fn rejects_zero_buffer() {
        let err = parse(&[("--sink-buffer-size", "0")]).unwrap_err();
        assert!(err.to_string().contains("SINK_BUFFER_SIZE"));
    }

    #[test]
    fn rejects_zero_send_timeout() {
        let err = parse(&[("--send-timeout-ms", "0")]).unwrap_err();
        assert!(err.to_string().contains("SEND_TIMEOUT_MS"));
    }

    #[test]
    fn converts_units() {
        let config = parse(&[("--send-timeout-ms", "1500"), ("--shutdown-timeout", "2")]).unwrap();
        assert_eq!(config.send_timeout, Duration::from_millis(1500));
        assert_eq!(config.shutdown_timeout, Duration::from_secs(2));
    }
}
