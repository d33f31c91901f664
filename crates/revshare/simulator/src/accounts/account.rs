use std::fmt;

use alloy_primitives::Address;
use alloy_signer_local::{LocalSignerError, PrivateKeySigner};

/// A signing account. Immutable once created.
#[derive(Clone)]
pub struct Account {
    address: Address,
    signer: PrivateKeySigner,
}

impl Account {
    /// Generates a fresh random account.
    pub fn random() -> Self {
        Self::from_signer(PrivateKeySigner::random())
    }

    /// Wraps an existing signer.
    pub fn from_signer(signer: PrivateKeySigner) -> Self {
        Self { address: signer.address(), signer }
    }

    /// Parses a hex private key, with or without `0x`.
    pub fn from_private_key(private_key: &str) -> Result<Self, LocalSignerError> {
        let signer: PrivateKeySigner = private_key.trim().parse()?;
        Ok(Self::from_signer(signer))
    }

    /// Account address.
    pub const fn address(&self) -> Address {
        self.address
    }

    /// Signer for this account.
    pub const fn signer(&self) -> &PrivateKeySigner {
        &self.signer
    }

    /// `0x`-prefixed hex private key.
    pub fn private_key_hex(&self) -> String {
        format!("0x{}", hex::encode(self.signer.to_bytes()))
    }

    /// Whether both accounts hold the same key.
    pub fn same_key(&self, other: &Self) -> bool {
        self.signer.to_bytes() == other.signer.to_bytes()
    }
}

impl PartialEq for Account {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address && self.same_key(other)
    }
}

impl Eq for Account {}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account").field("address", &self.address).finish_non_exhaustive()
    }
}
