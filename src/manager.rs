use std::sync::Arc;

use serde_json::Value;

use crate::{
    config::{resolve::tenant_config_name, source::KmsConfigSource, KMS_TYPE_KEY},
    error::{KmsError, Result},
    provider::{
        registry::ProviderRegistry, secrets::KMS_TYPE_SECRETS, EncryptionKms, InitializerArgs,
    },
    secret_store::SecretStore,
    types::{ConfigMap, SecretsMap},
};

/// Turns the KMS ID of a volume into a ready to use KMS client.
pub struct KmsManager {
    registry: Arc<ProviderRegistry>,
    config_source: Box<dyn KmsConfigSource + Send + Sync>,
    secret_store: Option<Box<dyn SecretStore + Send + Sync>>,
}

impl KmsManager {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        config_source: Box<dyn KmsConfigSource + Send + Sync>,
    ) -> Self {
        Self {
            registry,
            config_source,
            secret_store: None,
        }
    }

    /// Secrets of the tenant are loaded from `secret_store` whenever the
    /// caller does not hand them over.
    pub fn with_secret_store(mut self, secret_store: Box<dyn SecretStore + Send + Sync>) -> Self {
        self.secret_store = Some(secret_store);
        self
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn config_source(&self) -> &(dyn KmsConfigSource + Send + Sync) {
        self.config_source.as_ref()
    }

    /// The configuration section of `kms_id`. The default KMS has no section.
    pub async fn get_kms_config(&self, kms_id: &str) -> Result<ConfigMap> {
        if is_default_kms_id(kms_id) {
            let mut config = ConfigMap::new();
            config.insert(KMS_TYPE_KEY.to_owned(), Value::from(KMS_TYPE_SECRETS));
            return Ok(config);
        }

        self.config_source.get_kms_config(kms_id).await
    }

    /// The configuration resource `tenant` keeps in its own namespace, named
    /// by `tenantConfigName`. Without a secret store, or when the tenant has
    /// no such resource, there is none.
    pub async fn get_tenant_config(
        &self,
        tenant: &str,
        config: &ConfigMap,
    ) -> Result<Option<ConfigMap>> {
        let Some(secret_store) = &self.secret_store else {
            return Ok(None);
        };
        if tenant.is_empty() {
            return Ok(None);
        }

        let name = tenant_config_name(config, tenant)?;
        let content = match secret_store.get_secret(tenant, &name).await {
            Ok(content) => content,
            Err(KmsError::SecretNotFound { .. }) => {
                tracing::debug!("Tenant {tenant:?} has no configuration {name:?}");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        match serde_json::from_str::<Value>(&content) {
            Ok(Value::Object(tenant_config)) => {
                tracing::debug!("Using configuration {name:?} of tenant {tenant:?}");
                Ok(Some(tenant_config))
            }
            Ok(_) => Err(KmsError::MalformedConfig(format!(
                "configuration {name:?} of tenant {tenant:?} is not a JSON object"
            ))),
            Err(e) => Err(KmsError::MalformedConfig(format!(
                "configuration {name:?} of tenant {tenant:?}: {e}"
            ))),
        }
    }

    pub async fn get_kms(
        &self,
        tenant: &str,
        kms_id: &str,
        secrets: Option<SecretsMap>,
    ) -> Result<Box<dyn EncryptionKms>> {
        let config = self.get_kms_config(kms_id).await?;

        let secrets = match (secrets, &self.secret_store) {
            (Some(secrets), _) => Some(secrets),
            (None, Some(secret_store)) => {
                tracing::debug!(
                    "Loading secrets of tenant {tenant:?} from {}",
                    secret_store.source_debug_string()
                );
                Some(secret_store.get_secrets(tenant).await?)
            }
            (None, None) => None,
        };

        let tenant_config = if is_default_kms_id(kms_id) {
            None
        } else {
            self.get_tenant_config(tenant, &config).await?
        };

        tracing::debug!("Building KMS {kms_id:?} for tenant {tenant:?}");
        self.registry.build_kms_from_args(InitializerArgs {
            tenant: tenant.to_owned(),
            config,
            secrets,
            tenant_config,
        })
    }
}

fn is_default_kms_id(kms_id: &str) -> bool {
    kms_id.is_empty() || kms_id == KMS_TYPE_SECRETS
}
