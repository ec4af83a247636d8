//! Worker configuration, environment-driven with sensible defaults.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// How often a worker announces itself on the bus.
const DEFAULT_HEARTBEAT_INTERVAL_SECS: f64 = 1.0;
/// How long a worker may stay silent before peers evict it.
const DEFAULT_HEARTBEAT_TIMEOUT_SECS: f64 = 5.0;
/// Upper bound on any single peer-to-peer call.
const DEFAULT_RPC_TIMEOUT_SECS: f64 = 2.0;

/// Everything a worker node needs to come up.
#[derive(Clone, Debug)]
pub struct NodeConfig {
    /// Address the RPC listener binds (port 0 picks an ephemeral port).
    pub bind_addr: String,
    /// Address peers use to reach this node; the node identity is derived
    /// from it. Empty means "use the actually bound address".
    pub advertise_addr: String,
    /// Address of the heartbeat relay.
    pub relay_addr: String,
    /// Directory holding this worker's list store.
    pub data_dir: PathBuf,
    pub heartbeat_interval: Duration,
    pub heartbeat_timeout: Duration,
    pub rpc_timeout: Duration,
}

impl NodeConfig {
    /// Read configuration from `CARTCAST_*` environment variables, falling
    /// back to defaults for anything unset.
    pub fn from_env() -> Self {
        Self {
            bind_addr: env::var("CARTCAST_BIND_ADDR")
                .unwrap_or_else(|_| "0.0.0.0:7000".to_string()),
            advertise_addr: env::var("CARTCAST_ADVERTISE_ADDR")
                .unwrap_or_else(|_| "127.0.0.1:7000".to_string()),
            relay_addr: env::var("CARTCAST_RELAY_ADDR")
                .unwrap_or_else(|_| "127.0.0.1:5556".to_string()),
            data_dir: env::var("CARTCAST_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("data")),
            heartbeat_interval: env_duration(
                "CARTCAST_HEARTBEAT_INTERVAL_SECS",
                DEFAULT_HEARTBEAT_INTERVAL_SECS,
            ),
            heartbeat_timeout: env_duration(
                "CARTCAST_HEARTBEAT_TIMEOUT_SECS",
                DEFAULT_HEARTBEAT_TIMEOUT_SECS,
            ),
            rpc_timeout: env_duration("CARTCAST_RPC_TIMEOUT_SECS", DEFAULT_RPC_TIMEOUT_SECS),
        }
    }

    /// A config suitable for in-process clusters: ephemeral port, given data
    /// directory, everything else default.
    pub fn ephemeral(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            bind_addr: "127.0.0.1:0".to_string(),
            advertise_addr: String::new(),
            relay_addr: "127.0.0.1:5556".to_string(),
            data_dir: data_dir.into(),
            heartbeat_interval: Duration::from_secs_f64(DEFAULT_HEARTBEAT_INTERVAL_SECS),
            heartbeat_timeout: Duration::from_secs_f64(DEFAULT_HEARTBEAT_TIMEOUT_SECS),
            rpc_timeout: Duration::from_secs_f64(DEFAULT_RPC_TIMEOUT_SECS),
        }
    }
}

fn env_duration(var: &str, default_secs: f64) -> Duration {
    let secs = env::var(var)
        .ok()
        .and_then(|raw| raw.parse::<f64>().ok())
        .filter(|secs| *secs > 0.0)
        .unwrap_or(default_secs);
    Duration::from_secs_f64(secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn defaults_apply_when_env_is_clear() {
        env::remove_var("CARTCAST_BIND_ADDR");
        env::remove_var("CARTCAST_HEARTBEAT_INTERVAL_SECS");
        env::remove_var("CARTCAST_HEARTBEAT_TIMEOUT_SECS");

        let config = NodeConfig::from_env();
        assert_eq!(config.bind_addr, "0.0.0.0:7000");
        assert_eq!(config.heartbeat_interval, Duration::from_secs(1));
        assert_eq!(config.heartbeat_timeout, Duration::from_secs(5));
        assert_eq!(config.rpc_timeout, Duration::from_secs(2));
    }

    #[test]
    #[serial]
    fn env_overrides_are_honored() {
        env::set_var("CARTCAST_BIND_ADDR", "0.0.0.0:9100");
        env::set_var("CARTCAST_HEARTBEAT_INTERVAL_SECS", "0.25");

        let config = NodeConfig::from_env();
        assert_eq!(config.bind_addr, "0.0.0.0:9100");
        assert_eq!(config.heartbeat_interval, Duration::from_millis(250));

        env::remove_var("CARTCAST_BIND_ADDR");
        env::remove_var("CARTCAST_HEARTBEAT_INTERVAL_SECS");
    }

    #[test]
    #[serial]
    fn garbage_durations_fall_back_to_defaults() {
        env::set_var("CARTCAST_HEARTBEAT_TIMEOUT_SECS", "not-a-number");
        let config = NodeConfig::from_env();
        assert_eq!(config.heartbeat_timeout, Duration::from_secs(5));
        env::remove_var("CARTCAST_HEARTBEAT_TIMEOUT_SECS");

        env::set_var("CARTCAST_HEARTBEAT_TIMEOUT_SECS", "-3");
        let config = NodeConfig::from_env();
        assert_eq!(config.heartbeat_timeout, Duration::from_secs(5));
        env::remove_var("CARTCAST_HEARTBEAT_TIMEOUT_SECS");
    }
}
