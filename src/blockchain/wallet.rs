//! Signing keys and where they come from.
//!
//! # Security
//! - Keys are never logged or serialized
//! - The key source is an opaque collaborator; only its string output is used

use alloy::network::EthereumWallet;
use alloy::primitives::Address;
use alloy::signers::local::PrivateKeySigner;

use crate::error::{EscrowError, EscrowResult};

/// Environment variable holding the acting user's private key.
pub const PRIVATE_KEY_ENV_VAR: &str = "ESCROW_PRIVATE_KEY";

/// Environment variable holding the platform (dispute resolver) key.
pub const PLATFORM_KEY_ENV_VAR: &str = "ESCROW_PLATFORM_KEY";

/// A parsed signing key.
#[derive(Clone)]
pub struct Wallet {
    signer: PrivateKeySigner,
}

impl Wallet {
    /// Parse a hex-encoded private key, with or without `0x`.
    pub fn from_private_key(private_key_hex: &str) -> EscrowResult<Self> {
        let trimmed = private_key_hex.trim();
        let key_hex = trimmed.strip_prefix("0x").unwrap_or(trimmed);

        let signer: PrivateKeySigner = key_hex
            .parse()
            .map_err(|e| EscrowError::Signing(format!("Invalid private key format: {}", e)))?;

        Ok(Self { signer })
    }

    /// The address this key controls.
    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// Network wallet used to sign transaction envelopes.
    pub fn network_wallet(&self) -> EthereumWallet {
        EthereumWallet::from(self.signer.clone())
    }
}

impl std::fmt::Debug for Wallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wallet").field("address", &self.address()).finish()
    }
}

/// Supplies signing keys on demand.
pub trait KeySource: Send + Sync {
    /// Key string for the acting user.
    fn signing_key(&self) -> EscrowResult<String>;

    /// Key string for the platform account.
    fn platform_key(&self) -> EscrowResult<String>;
}

/// Reads keys from `ESCROW_PRIVATE_KEY` and `ESCROW_PLATFORM_KEY`.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvKeySource;

impl EnvKeySource {
    fn read(var: &str) -> EscrowResult<String> {
        std::env::var(var).map_err(|_| {
            EscrowError::Signing(format!("Environment variable {} not set", var))
        })
    }
}

impl KeySource for EnvKeySource {
    fn signing_key(&self) -> EscrowResult<String> {
        Self::read(PRIVATE_KEY_ENV_VAR)
    }

    fn platform_key(&self) -> EscrowResult<String> {
        Self::read(PLATFORM_KEY_ENV_VAR)
    }
}
