//! Simulation accounts, their key store and the shared registry.

mod account;
pub use account::Account;

mod keystore;
pub use keystore::{KeyStore, generate_accounts};

mod nonce;
pub use nonce::NonceGuard;

mod registry;
pub use registry::AccountRegistry;
