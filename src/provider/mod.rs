pub mod registry;
pub mod secrets;
#[cfg(feature = "provider-vault-tokens")]
pub mod vault_tokens;

use async_trait::async_trait;

use crate::{
    error::{KmsError, Result},
    types::{ConfigMap, Passphrase, SecretsMap},
};

/// Everything a provider gets to build a client for one provisioning request.
#[derive(Debug, Clone, Default)]
pub struct InitializerArgs {
    /// The tenant (namespace) the volume belongs to. Empty disables tenant scoping.
    pub tenant: String,
    /// The KMS configuration section, in either the internal or the standard schema.
    pub config: ConfigMap,
    /// Secrets of the tenant handed over by the orchestrator.
    pub secrets: Option<SecretsMap>,
    /// The configuration resource the tenant keeps in its own namespace, if any.
    /// Overrides the tenant's entry in the shared configuration.
    pub tenant_config: Option<ConfigMap>,
}

impl InitializerArgs {
    pub fn secret(&self, name: &str) -> Option<&str> {
        self.secrets
            .as_ref()
            .and_then(|secrets| secrets.get(name))
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }
}

/// Builds a KMS client from the arguments of a provisioning request.
pub type ProviderInitializer = fn(InitializerArgs) -> Result<Box<dyn EncryptionKms>>;

/// A client able to manage the data encryption keys (DEKs) of volumes.
///
/// Constructing a client never talks to the backend, connection problems show
/// up on the first call.
#[async_trait]
pub trait EncryptionKms: Send + Sync {
    fn debug_name(&self) -> String;

    /// Fails with [`KmsError::KeyNotFound`] if no DEK was stored for the volume.
    async fn fetch_dek(&self, volume_id: &str) -> Result<Passphrase>;

    /// May fail with [`KmsError::KeyExists`] when the backend refuses to
    /// replace a DEK that is already stored.
    async fn store_dek(&self, volume_id: &str, dek: &Passphrase) -> Result<()>;

    /// Removing the DEK of a volume that has none is not an error.
    async fn remove_dek(&self, volume_id: &str) -> Result<()>;

    async fn get_or_create_dek(&self, volume_id: &str) -> Result<Passphrase> {
        match self.fetch_dek(volume_id).await {
            Err(KmsError::KeyNotFound(_)) => {
                tracing::info!("Generating a new DEK for volume {volume_id}");
                let dek = Passphrase::random();
                match self.store_dek(volume_id, &dek).await {
                    Ok(()) => Ok(dek),
                    Err(KmsError::KeyExists(_)) => {
                        tracing::info!("DEK of volume {volume_id} was stored concurrently");
                        self.fetch_dek(volume_id).await
                    }
                    Err(error) => Err(error),
                }
            }
            result => result,
        }
    }
}
