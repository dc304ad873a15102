//! Gateway configuration loaded from environment variables

use std::env;

use anyhow::{Context, Result};

/// Default broker topic for cross-node chat sync.
const DEFAULT_SYNC_CHANNEL: &str = "websocket_sync";

/// Gateway configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server port (default: 8080)
    pub port: u16,

    /// Redis connection URL; absent means single-process mode
    pub redis_url: Option<String>,

    /// Route chat broadcasts through the broker
    pub auto_sync: bool,

    /// Broker topic carrying sync envelopes
    pub sync_channel: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            port: env::var("GATEWAY_PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .context("Invalid GATEWAY_PORT value")?,

            redis_url: env::var("REDIS_URL").ok().filter(|s| !s.is_empty()),

            auto_sync: env::var("ROOMCAST_AUTO_SYNC")
                .map(|v| matches!(v.as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),

            sync_channel: env::var("ROOMCAST_SYNC_CHANNEL")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| DEFAULT_SYNC_CHANNEL.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Tests that touch environment variables must not run in parallel.
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// Restores the previous environment when dropped.
    struct EnvGuard {
        vars: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        fn set(vars: &[(&str, &str)]) -> Self {
            let saved = vars
                .iter()
                .map(|(k, v)| {
                    let old = env::var(*k).ok();
                    env::set_var(*k, *v);
                    (k.to_string(), old)
                })
                .collect();
            Self { vars: saved }
        }

        fn remove(vars: &[&str]) -> Self {
            let saved = vars
                .iter()
                .map(|k| {
                    let old = env::var(*k).ok();
                    env::remove_var(*k);
                    (k.to_string(), old)
                })
                .collect();
            Self { vars: saved }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (k, v) in &self.vars {
                match v {
                    Some(val) => env::set_var(k, val),
                    None => env::remove_var(k),
                }
            }
        }
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let _guard = EnvGuard::remove(&[
            "GATEWAY_PORT",
            "REDIS_URL",
            "ROOMCAST_AUTO_SYNC",
            "ROOMCAST_SYNC_CHANNEL",
        ]);

        let config = Config::from_env().unwrap();
        assert_eq!(config.port, 8080);
        assert!(config.redis_url.is_none());
        assert!(!config.auto_sync);
        assert_eq!(config.sync_channel, "websocket_sync");
    }

    #[test]
    fn values_are_read_from_the_environment() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let _guard = EnvGuard::set(&[
            ("GATEWAY_PORT", "9090"),
            ("REDIS_URL", "redis://cache:6379"),
            ("ROOMCAST_AUTO_SYNC", "true"),
            ("ROOMCAST_SYNC_CHANNEL", "chat_sync"),
        ]);

        let config = Config::from_env().unwrap();
        assert_eq!(config.port, 9090);
        assert_eq!(config.redis_url.as_deref(), Some("redis://cache:6379"));
        assert!(config.auto_sync);
        assert_eq!(config.sync_channel, "chat_sync");
    }

    #[test]
    fn invalid_port_is_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let _guard = EnvGuard::set(&[("GATEWAY_PORT", "not-a-port")]);

        let err = Config::from_env().unwrap_err().to_string();
        assert!(err.contains("GATEWAY_PORT"));
    }

    #[test]
    fn empty_redis_url_means_single_process() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let _guard = EnvGuard::set(&[("REDIS_URL", "")]);

        let config = Config::from_env().unwrap();
        assert!(config.redis_url.is_none());
    }
}
