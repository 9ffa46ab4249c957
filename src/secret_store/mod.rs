pub mod fs;

use async_trait::async_trait;

use crate::{error::Result, types::SecretsMap};

/// Access to secrets scoped to a tenant namespace.
///
/// This is the orchestrator's secret store seen from the KMS layer: the
/// embedding driver uses it to collect the tenant's secrets before building a
/// KMS client, so that initialization itself never waits on the network.
#[async_trait]
pub trait SecretStore {
    fn source_debug_string(&self) -> String;

    /// Fails with [`KmsError::SecretNotFound`](crate::error::KmsError::SecretNotFound) when absent.
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<String>;

    /// All secrets of a namespace. An unknown namespace has no secrets.
    async fn get_secrets(&self, namespace: &str) -> Result<SecretsMap>;
}
