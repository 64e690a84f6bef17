//! Per-process configuration, loaded from the environment.
//!
//! Missing or malformed required variables are `Config` errors; the
//! binaries exit non-zero on them.

use std::env;

use crate::errors::IndexerError;

fn require(name: &str) -> Result<String, IndexerError> {
    env::var(name)
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| IndexerError::Config(format!("{name} environment variable is required")))
}

/// Configuration for the chain-ingress plug-in loaded into the node host.
#[derive(Debug, Clone)]
pub struct PluginConfig {
    pub db_url: String,
    pub rpc_url: String,
    pub udc_address: String,
    /// Starting block number; blocks below it are skipped.
    pub cursor: u64,
}

impl PluginConfig {
    pub fn from_env() -> Result<Self, IndexerError> {
        let db_url = require("DB_URL")?;
        let rpc_url = require("RPC_URL")?;
        let udc_address = env::var("UDC_ADDRESS").unwrap_or_default();

        let cursor = match env::var("CURSOR") {
            Ok(raw) if !raw.is_empty() => raw
                .parse::<u64>()
                .map_err(|e| IndexerError::Config(format!("invalid CURSOR value {raw:?}: {e}")))?,
            _ => 0,
        };

        Ok(Self {
            db_url,
            rpc_url,
            udc_address,
            cursor,
        })
    }
}

/// Configuration for the replayer process.
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    pub db_url: String,
}

impl ProcessorConfig {
    pub fn from_env() -> Result<Self, IndexerError> {
        Ok(Self {
            db_url: require("DB_URL")?,
        })
    }
}

/// Configuration for the WebSocket fan-out server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub db_url: String,
    /// Allowed CORS origin; unset means same-origin only.
    pub frontend_url: Option<String>,
    pub listen_addr: String,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, IndexerError> {
        Ok(Self {
            db_url: require("PITCHLAKE_DB_URL")?,
            frontend_url: env::var("FRONTEND_URL").ok().filter(|v| !v.is_empty()),
            listen_addr: env::var("LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Env-var tests mutate process state; keep them in one test to avoid
    // interleaving with parallel test threads.
    #[test]
    fn test_plugin_config_from_env() {
        env::remove_var("DB_URL");
        env::remove_var("RPC_URL");
        assert!(PluginConfig::from_env().is_err());

        env::set_var("DB_URL", "postgres://localhost/pitchlake");
        env::set_var("RPC_URL", "http://localhost:6060");
        env::set_var("CURSOR", "not-a-number");
        assert!(PluginConfig::from_env().is_err());

        env::set_var("CURSOR", "1234");
        env::set_var("UDC_ADDRESS", "0x41a78e741e5af2fec34b695679bc6891742439f7afb8484ecd7766661ad02bf");
        let config = PluginConfig::from_env().unwrap();
        assert_eq!(config.cursor, 1234);
        assert!(!config.udc_address.is_empty());

        env::remove_var("CURSOR");
        let config = PluginConfig::from_env().unwrap();
        assert_eq!(config.cursor, 0);

        env::remove_var("DB_URL");
        env::remove_var("RPC_URL");
        env::remove_var("UDC_ADDRESS");
    }
}
