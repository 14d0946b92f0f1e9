//! Network definitions and well-known on-chain constants.
//!
//! This module defines the chain environments the payment contract is
//! deployed to, their default fullnode REST endpoints, and the statically
//! known addresses the rest of the crate builds on: the payment module
//! address and the native gas coin's type tag and metadata placeholder.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Address of the deployed payment contract module.
pub const PAYMENT_MODULE_ADDRESS: &str =
    "0xce349ffbde2e28c21a4a7de7c4e1b3d72f1fe079494c7f8f8832bd6c8502e559";

/// Name of the payment contract module under [`PAYMENT_MODULE_ADDRESS`].
pub const PAYMENT_MODULE_NAME: &str = "tooma";

/// Fungible-asset metadata type argument passed to the payment entry functions.
pub const FUNGIBLE_ASSET_METADATA_TYPE: &str = "0x1::fungible_asset::Metadata";

/// Type tag of the native gas coin.
///
/// The supported-currencies catalog lists the gas coin with a placeholder
/// address; live balance records carry this coin-type tag instead, so the
/// balance join matches on it rather than on address equality.
pub const GAS_COIN_TYPE_TAG: &str = "0x1::aptos_coin::AptosCoin";

/// Fungible-asset metadata address of the native gas coin.
///
/// This is the value submitted as the asset argument when depositing the
/// gas coin itself, standing in for the placeholder the catalog carries.
pub const GAS_COIN_METADATA_ADDRESS: &str = "0xa";

/// Chain environments the payment contract is deployed to.
#[derive(Debug, Hash, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Network {
    /// Short-lived development network.
    #[serde(rename = "devnet")]
    Devnet,
    /// Long-lived test network. The default environment.
    #[serde(rename = "testnet")]
    Testnet,
    /// Production network.
    #[serde(rename = "mainnet")]
    Mainnet,
}

impl Display for Network {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Network::Devnet => write!(f, "devnet"),
            Network::Testnet => write!(f, "testnet"),
            Network::Mainnet => write!(f, "mainnet"),
        }
    }
}

impl FromStr for Network {
    type Err = UnknownNetwork;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "devnet" => Ok(Network::Devnet),
            "testnet" => Ok(Network::Testnet),
            "mainnet" => Ok(Network::Mainnet),
            other => Err(UnknownNetwork(other.to_string())),
        }
    }
}

/// Error returned when parsing an unrecognized network name.
#[derive(Debug, thiserror::Error)]
#[error("unknown network: {0}")]
pub struct UnknownNetwork(pub String);

impl Network {
    /// Return all known [`Network`] variants.
    pub fn variants() -> &'static [Network] {
        &[Network::Devnet, Network::Testnet, Network::Mainnet]
    }

    /// Default fullnode REST endpoint for this network.
    pub fn default_fullnode_url(&self) -> &'static str {
        match self {
            Network::Devnet => "https://fullnode.devnet.tooma.xyz/v1",
            Network::Testnet => "https://fullnode.testnet.tooma.xyz/v1",
            Network::Mainnet => "https://fullnode.mainnet.tooma.xyz/v1",
        }
    }

    /// Chain id embedded in every raw transaction for replay protection.
    pub fn chain_id(&self) -> u8 {
        match self {
            Network::Devnet => 4,
            Network::Testnet => 2,
            Network::Mainnet => 1,
        }
    }
}
