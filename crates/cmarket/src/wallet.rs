use crate::errors::AgentError;
use alloy::{primitives::Address, signers::local::PrivateKeySigner};
use secrecy::{ExposeSecret as _, SecretString};

/// Environment variable holding the hex-encoded signing key.
pub const PRIVATE_KEY_ENV: &str = "CMARKET_PRIVATE_KEY";

/// The optional signing capability of an agent. Built once; never mutated.
#[derive(Clone)]
pub struct WalletIdentity {
    address: Address,
    signer: PrivateKeySigner,
}

impl std::fmt::Debug for WalletIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletIdentity")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

impl WalletIdentity {
    /// Parse a 32-byte hex private key, with or without `0x`.
    pub fn from_secret(key: &SecretString) -> Result<Self, AgentError> {
        let raw = key.expose_secret().trim();
        let hex = raw.strip_prefix("0x").unwrap_or(raw);
        if hex.len() != 64 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(AgentError::Configuration(
                "malformed signing key: expected 32 bytes of hex".into(),
            ));
        }
        // Never echo the parse error: it may quote the key material.
        let signer = hex.parse::<PrivateKeySigner>().map_err(|_e| {
            AgentError::Configuration("malformed signing key: not a valid secp256k1 scalar".into())
        })?;
        Ok(Self::from_signer(signer))
    }

    pub fn from_signer(signer: PrivateKeySigner) -> Self {
        Self {
            address: signer.address(),
            signer,
        }
    }

    /// `Ok(None)` when no key is configured (read-only mode).
    pub fn from_env() -> Result<Option<Self>, AgentError> {
        match std::env::var(PRIVATE_KEY_ENV) {
            Ok(v) if !v.trim().is_empty() => {
                let secret = SecretString::from(v);
                Self::from_secret(&secret).map(Some)
            }
            _ => Ok(None),
        }
    }

    pub const fn address(&self) -> Address {
        self.address
    }

    pub const fn signer(&self) -> &PrivateKeySigner {
        &self.signer
    }
}
