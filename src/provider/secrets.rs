//! # Secrets KMS
//!
//! The provider used when a volume does not name a KMS. The passphrase is
//! handed over by the orchestrator together with the other secrets of the
//! volume, and the same passphrase protects every volume using it.

use async_trait::async_trait;

use crate::{
    error::{KmsError, Result},
    types::Passphrase,
};

use super::{EncryptionKms, InitializerArgs};

pub const KMS_TYPE_SECRETS: &str = "default";

/// Secret entry holding the passphrase.
pub const ENCRYPTION_PASSPHRASE_KEY: &str = "encryptionPassphrase";

pub struct SecretsKms {
    passphrase: Passphrase,
}

pub fn init_secrets_kms(args: InitializerArgs) -> Result<Box<dyn EncryptionKms>> {
    let passphrase = args
        .secret(ENCRYPTION_PASSPHRASE_KEY)
        .ok_or_else(|| KmsError::AuthMaterialMissing {
            expected: format!("secret entry {ENCRYPTION_PASSPHRASE_KEY:?}"),
        })?;

    Ok(Box::new(SecretsKms {
        passphrase: Passphrase::from(passphrase),
    }))
}

#[async_trait]
impl EncryptionKms for SecretsKms {
    fn debug_name(&self) -> String {
        "Passphrase from volume secrets".to_string()
    }

    async fn fetch_dek(&self, _volume_id: &str) -> Result<Passphrase> {
        Ok(self.passphrase.clone())
    }

    async fn store_dek(&self, _volume_id: &str, _dek: &Passphrase) -> Result<()> {
        Ok(())
    }

    async fn remove_dek(&self, _volume_id: &str) -> Result<()> {
        Ok(())
    }
}
