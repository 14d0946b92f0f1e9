//! Environment variable names and typed loaders.
//!
//! All deployment configuration comes in through the environment, loaded
//! once at startup (`.env` via `dotenvy` in the binary). The sponsor
//! private key is read here and nowhere else; it must never be reachable
//! from client-side code paths.

use std::env;
use std::str::FromStr;

use ed25519_dalek::SigningKey;
use url::Url;

use crate::network::Network;

pub const ENV_BACKEND_URL: &str = "TOOMA_BACKEND_URL";
pub const ENV_BACKEND_API_KEY: &str = "TOOMA_BACKEND_API_KEY";
pub const ENV_NETWORK: &str = "TOOMA_NETWORK";
pub const ENV_SPONSOR_PRIVATE_KEY: &str = "SPONSOR_PRIVATE_KEY";
pub const ENV_PRETIUM_BASE_URL: &str = "PRETIUM_BASE_URI";
pub const ENV_PRETIUM_API_KEY: &str = "PRETIUM_API_KEY";
pub const ENV_HOST: &str = "HOST";
pub const ENV_PORT: &str = "PORT";

pub const ENV_FULLNODE_DEVNET: &str = "FULLNODE_URL_DEVNET";
pub const ENV_FULLNODE_TESTNET: &str = "FULLNODE_URL_TESTNET";
pub const ENV_FULLNODE_MAINNET: &str = "FULLNODE_URL_MAINNET";

/// Default base URL of the payment backend.
pub const DEFAULT_BACKEND_URL: &str = "https://preview-api.tooma.xyz";
/// Default base URL of the fixed exchange-rate provider.
pub const DEFAULT_PRETIUM_BASE_URL: &str = "https://api.xwift.africa";

/// Configuration errors raised while reading the environment.
#[derive(Debug, thiserror::Error)]
pub enum EnvError {
    #[error("{0} environment variable is required")]
    Missing(&'static str),
    #[error("{name} is not a valid URL: {source}")]
    InvalidUrl {
        name: &'static str,
        #[source]
        source: url::ParseError,
    },
    #[error("{name} is invalid: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Name of the fullnode URL override variable for a network.
pub fn fullnode_env_name(network: Network) -> &'static str {
    match network {
        Network::Devnet => ENV_FULLNODE_DEVNET,
        Network::Testnet => ENV_FULLNODE_TESTNET,
        Network::Mainnet => ENV_FULLNODE_MAINNET,
    }
}

/// Fullnode REST endpoint for a network: the override variable when set,
/// the built-in default otherwise.
pub fn fullnode_url(network: Network) -> Result<Url, EnvError> {
    let raw = env::var(fullnode_env_name(network))
        .unwrap_or_else(|_| network.default_fullnode_url().to_string());
    Url::parse(&raw).map_err(|source| EnvError::InvalidUrl {
        name: fullnode_env_name(network),
        source,
    })
}

/// Target network, defaulting to testnet.
pub fn network() -> Result<Network, EnvError> {
    match env::var(ENV_NETWORK) {
        Ok(raw) => Network::from_str(&raw).map_err(|e| EnvError::Invalid {
            name: ENV_NETWORK,
            reason: e.to_string(),
        }),
        Err(_) => Ok(Network::Testnet),
    }
}

/// Payment backend base URL, defaulting to the preview deployment.
pub fn backend_url() -> Result<Url, EnvError> {
    let raw = env::var(ENV_BACKEND_URL).unwrap_or_else(|_| DEFAULT_BACKEND_URL.to_string());
    Url::parse(&raw).map_err(|source| EnvError::InvalidUrl {
        name: ENV_BACKEND_URL,
        source,
    })
}

/// Optional backend API key.
pub fn backend_api_key() -> Option<String> {
    env::var(ENV_BACKEND_API_KEY).ok().filter(|s| !s.is_empty())
}

/// Fixed exchange-rate provider base URL.
pub fn pretium_base_url() -> Result<Url, EnvError> {
    let raw = env::var(ENV_PRETIUM_BASE_URL).unwrap_or_else(|_| DEFAULT_PRETIUM_BASE_URL.to_string());
    Url::parse(&raw).map_err(|source| EnvError::InvalidUrl {
        name: ENV_PRETIUM_BASE_URL,
        source,
    })
}

/// Fixed exchange-rate provider API key. Required by the sponsor service.
pub fn pretium_api_key() -> Result<String, EnvError> {
    env::var(ENV_PRETIUM_API_KEY)
        .ok()
        .filter(|s| !s.is_empty())
        .ok_or(EnvError::Missing(ENV_PRETIUM_API_KEY))
}

/// Sponsor account signing key, hex-encoded 32 bytes with or without a
/// `0x` prefix. Server-side only.
pub fn sponsor_signing_key() -> Result<SigningKey, EnvError> {
    let raw = env::var(ENV_SPONSOR_PRIVATE_KEY).map_err(|_| EnvError::Missing(ENV_SPONSOR_PRIVATE_KEY))?;
    let stripped = raw.trim().trim_start_matches("0x");
    let bytes = hex::decode(stripped).map_err(|e| EnvError::Invalid {
        name: ENV_SPONSOR_PRIVATE_KEY,
        reason: e.to_string(),
    })?;
    let key: [u8; 32] = bytes.try_into().map_err(|_| EnvError::Invalid {
        name: ENV_SPONSOR_PRIVATE_KEY,
        reason: "expected 32 bytes of key material".to_string(),
    })?;
    Ok(SigningKey::from_bytes(&key))
}

/// Listen address for the sponsor service, `HOST`/`PORT` with the same
/// defaults the rest of our deployments use.
pub fn listen_addr() -> (String, u16) {
    let host = env::var(ENV_HOST).unwrap_or_else(|_| "0.0.0.0".to_string());
    let port = env::var(ENV_PORT)
        .ok()
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(8080);
    (host, port)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sponsor_key_parsing() {
        let hex_key = format!("0x{}", "11".repeat(32));
        env::set_var(ENV_SPONSOR_PRIVATE_KEY, &hex_key);
        assert!(sponsor_signing_key().is_ok());
        env::set_var(ENV_SPONSOR_PRIVATE_KEY, "11".repeat(32));
        assert!(sponsor_signing_key().is_ok());
        env::set_var(ENV_SPONSOR_PRIVATE_KEY, "abcd");
        assert!(sponsor_signing_key().is_err());
        env::remove_var(ENV_SPONSOR_PRIVATE_KEY);
        assert!(sponsor_signing_key().is_err());
    }

    #[test]
    fn fullnode_url_falls_back_to_default() {
        env::remove_var(ENV_FULLNODE_TESTNET);
        let url = fullnode_url(Network::Testnet).unwrap();
        assert_eq!(url.as_str(), "https://fullnode.testnet.tooma.xyz/v1");
    }
}
