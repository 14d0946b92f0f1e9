//! Transaction model and signing.
//!
//! Raw transactions are BCS-serialized and signed over a domain-separated
//! message: `sha256(salt) || bcs(transaction)`, with distinct salts for
//! plain and fee-payer transactions so an authenticator produced for one
//! shape can never be replayed against the other. Both the sender and the
//! fee payer sign the fee-payer message.
//!
//! Signing goes through the [`TransactionSigner`] seam; in the browser the
//! connected wallet fills this role, while [`LocalSigner`] backs the
//! sponsor account and tests.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::ChainError;
use crate::network::{FUNGIBLE_ASSET_METADATA_TYPE, PAYMENT_MODULE_ADDRESS, PAYMENT_MODULE_NAME};

/// Domain separator for single-signer raw transactions.
const RAW_TRANSACTION_SALT: &[u8] = b"TOOMA::RawTransaction";
/// Domain separator for fee-payer transactions.
const FEE_PAYER_SALT: &[u8] = b"TOOMA::FeePayerTransaction";

// ============================================================================
// Payload
// ============================================================================

/// An entry-function invocation against an on-chain module.
///
/// Arguments travel as strings, matching the fullnode's JSON encoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryFunction {
    pub module_address: String,
    pub module_name: String,
    pub function: String,
    pub type_args: Vec<String>,
    pub args: Vec<String>,
}

impl EntryFunction {
    /// `deposit_fungible(metadata_address, amount)` on the payment module.
    pub fn deposit_fungible(metadata_address: &str, amount_base_units: u64) -> Self {
        Self {
            module_address: PAYMENT_MODULE_ADDRESS.to_string(),
            module_name: PAYMENT_MODULE_NAME.to_string(),
            function: "deposit_fungible".to_string(),
            type_args: vec![FUNGIBLE_ASSET_METADATA_TYPE.to_string()],
            args: vec![metadata_address.to_string(), amount_base_units.to_string()],
        }
    }

    /// `make_payment_fungible(metadata_address, amount, session_id)` on the
    /// payment module. The session id binds the deposit to its backend
    /// payment session.
    pub fn make_payment_fungible(
        metadata_address: &str,
        amount_base_units: u64,
        session_id: &str,
    ) -> Self {
        Self {
            module_address: PAYMENT_MODULE_ADDRESS.to_string(),
            module_name: PAYMENT_MODULE_NAME.to_string(),
            function: "make_payment_fungible".to_string(),
            type_args: vec![FUNGIBLE_ASSET_METADATA_TYPE.to_string()],
            args: vec![
                metadata_address.to_string(),
                amount_base_units.to_string(),
                session_id.to_string(),
            ],
        }
    }
}

/// Transaction payload. Entry functions are the only kind the payment
/// flows produce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionPayload {
    EntryFunction(EntryFunction),
}

// ============================================================================
// Raw transactions
// ============================================================================

/// An unsigned transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawTransaction {
    pub sender: String,
    pub sequence_number: u64,
    pub payload: TransactionPayload,
    pub max_gas_amount: u64,
    pub gas_unit_price: u64,
    pub expiration_timestamp_secs: u64,
    pub chain_id: u8,
}

impl RawTransaction {
    /// Message a single signer commits to.
    pub fn signing_message(&self) -> Result<Vec<u8>, ChainError> {
        signing_message(RAW_TRANSACTION_SALT, self)
    }
}

/// An unsigned transaction whose gas is paid by a second account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeePayerTransaction {
    pub raw: RawTransaction,
    pub fee_payer: String,
}

impl FeePayerTransaction {
    /// Message both the sender and the fee payer commit to. Covers the
    /// fee-payer address, so neither party can swap in a different sponsor.
    pub fn signing_message(&self) -> Result<Vec<u8>, ChainError> {
        signing_message(FEE_PAYER_SALT, self)
    }
}

fn signing_message<T: Serialize>(salt: &[u8], value: &T) -> Result<Vec<u8>, ChainError> {
    let body = bcs::to_bytes(value).map_err(|e| ChainError::Encoding(e.to_string()))?;
    let mut message = Sha256::digest(salt).to_vec();
    message.extend_from_slice(&body);
    Ok(message)
}

// ============================================================================
// Authenticators
// ============================================================================

/// An ed25519 signature over a transaction signing message, paired with the
/// signing public key. Hex-encoded on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountAuthenticator {
    pub public_key: String,
    pub signature: String,
}

impl AccountAuthenticator {
    /// Verify this authenticator over a signing message.
    pub fn verify(&self, message: &[u8]) -> Result<(), ChainError> {
        let public_key = decode_fixed::<32>(&self.public_key)
            .ok_or_else(|| ChainError::InvalidAuthenticator("malformed public key".to_string()))?;
        let signature = decode_fixed::<64>(&self.signature)
            .ok_or_else(|| ChainError::InvalidAuthenticator("malformed signature".to_string()))?;
        let key = VerifyingKey::from_bytes(&public_key)
            .map_err(|e| ChainError::InvalidAuthenticator(e.to_string()))?;
        key.verify(message, &Signature::from_bytes(&signature))
            .map_err(|e| ChainError::InvalidAuthenticator(e.to_string()))
    }

    /// Account address implied by the authenticator's public key.
    pub fn account_address(&self) -> Result<String, ChainError> {
        let public_key = decode_fixed::<32>(&self.public_key)
            .ok_or_else(|| ChainError::InvalidAuthenticator("malformed public key".to_string()))?;
        Ok(address_from_public_key(&public_key))
    }
}

fn decode_fixed<const N: usize>(hex_str: &str) -> Option<[u8; N]> {
    let bytes = hex::decode(hex_str.trim_start_matches("0x")).ok()?;
    bytes.try_into().ok()
}

/// Derive an account address from an ed25519 public key: the SHA-256 of the
/// key material with the single-key scheme byte appended.
pub fn address_from_public_key(public_key: &[u8; 32]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(public_key);
    hasher.update([0u8]);
    format!("0x{}", hex::encode(hasher.finalize()))
}

// ============================================================================
// Signed transactions
// ============================================================================

/// A fully signed transaction ready for submission, in either of the two
/// gas modes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SignedTransaction {
    /// Sender pays gas.
    SingleSigner {
        raw: RawTransaction,
        authenticator: AccountAuthenticator,
    },
    /// A sponsor account pays gas; both parties sign.
    FeePayer {
        raw: RawTransaction,
        fee_payer: String,
        sender_authenticator: AccountAuthenticator,
        fee_payer_authenticator: AccountAuthenticator,
    },
}

// ============================================================================
// Signers
// ============================================================================

/// Signing capability over transaction messages.
///
/// The connected wallet implements this in production; the sponsor service
/// and tests use [`LocalSigner`]. Signing is inherently serialized by the
/// wallet itself.
pub trait TransactionSigner {
    /// Account address of this signer.
    fn address(&self) -> String;

    /// Sign a transaction signing message.
    fn sign_message(&self, message: &[u8]) -> Result<AccountAuthenticator, ChainError>;
}

/// In-process ed25519 signer.
pub struct LocalSigner {
    signing_key: SigningKey,
    address: String,
}

impl std::fmt::Debug for LocalSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalSigner")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

impl LocalSigner {
    /// Wrap an existing signing key.
    pub fn new(signing_key: SigningKey) -> Self {
        let public_key = signing_key.verifying_key().to_bytes();
        let address = address_from_public_key(&public_key);
        Self {
            signing_key,
            address,
        }
    }

    /// Generate a fresh random signer.
    pub fn generate() -> Self {
        let mut rng = rand::rngs::OsRng;
        Self::new(SigningKey::generate(&mut rng))
    }

    /// Load a signer from 32 bytes of hex key material.
    pub fn from_private_key_hex(hex_key: &str) -> Result<Self, ChainError> {
        let bytes = hex::decode(hex_key.trim().trim_start_matches("0x"))
            .map_err(|e| ChainError::InvalidKey(e.to_string()))?;
        let key: [u8; 32] = bytes
            .try_into()
            .map_err(|_| ChainError::InvalidKey("expected 32 bytes of key material".to_string()))?;
        Ok(Self::new(SigningKey::from_bytes(&key)))
    }

    /// Hex-encoded public key of this signer.
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.signing_key.verifying_key().to_bytes())
    }
}

impl TransactionSigner for LocalSigner {
    fn address(&self) -> String {
        self.address.clone()
    }

    fn sign_message(&self, message: &[u8]) -> Result<AccountAuthenticator, ChainError> {
        let signature = self.signing_key.sign(message);
        Ok(AccountAuthenticator {
            public_key: self.public_key_hex(),
            signature: hex::encode(signature.to_bytes()),
        })
    }
}
