use std::collections::HashMap;

use rand::RngCore as _;
use zeroize::{Zeroize, ZeroizeOnDrop};

const GENERATED_PASSPHRASE_LEN: usize = 64;

/// Loosely-typed configuration as it appears in configuration documents.
pub type ConfigMap = serde_json::Map<String, serde_json::Value>;

/// Tenant-scoped secret values handed over by the orchestrator, keyed by secret name.
pub type SecretsMap = HashMap<String, String>;

/// Data encryption key of a volume. The content is wiped on drop and never printed.
#[derive(Zeroize, ZeroizeOnDrop, Clone, PartialEq, Eq)]
pub struct Passphrase(Vec<u8>);

impl Passphrase {
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_slice()
    }

    pub fn random() -> Self {
        let mut passphrase = [0u8; GENERATED_PASSPHRASE_LEN / 2];
        let mut rng = rand::thread_rng();
        rng.fill_bytes(&mut passphrase);
        // Keep the generated DEK printable, LUKS passphrases are best restricted to 7-bit ASCII.
        let passphrase = hex::encode(passphrase);

        Passphrase::from(passphrase.into_bytes())
    }
}

impl From<Vec<u8>> for Passphrase {
    fn from(value: Vec<u8>) -> Self {
        Self(value)
    }
}

impl From<&str> for Passphrase {
    fn from(value: &str) -> Self {
        Self(value.as_bytes().to_vec())
    }
}
