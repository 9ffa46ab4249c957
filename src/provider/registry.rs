use std::{
    collections::HashMap,
    sync::{PoisonError, RwLock},
};

use crate::{
    config::{value_to_string, KMS_PROVIDER_KEY, KMS_TYPE_KEY},
    error::{KmsError, Result},
    types::{ConfigMap, SecretsMap},
};

use super::{EncryptionKms, InitializerArgs, ProviderInitializer};

/// Table of the KMS providers known to the driver.
///
/// Built once at startup and shared (usually behind an `Arc`) with every
/// component that needs to turn a KMS configuration into a client.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: RwLock<HashMap<String, ProviderInitializer>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every provider compiled into this build.
    pub fn with_builtin() -> Self {
        let registry = Self::new();

        registry.register_or_warn(
            super::secrets::KMS_TYPE_SECRETS,
            super::secrets::init_secrets_kms,
        );
        #[cfg(feature = "provider-vault-tokens")]
        registry.register_or_warn(
            super::vault_tokens::KMS_TYPE_VAULT_TOKENS,
            super::vault_tokens::init_vault_tokens_kms,
        );

        registry
    }

    /// Like [`Self::register`], but a rejected registration is only logged.
    /// Returns whether the provider was registered.
    pub fn register_or_warn(&self, provider_type: &str, initializer: ProviderInitializer) -> bool {
        match self.register(provider_type, initializer) {
            Ok(()) => true,
            Err(error) => {
                tracing::warn!("Skipping KMS provider registration: {error}");
                false
            }
        }
    }

    /// Registers a provider. A provider type can only be registered once, the
    /// first registration stays in effect.
    pub fn register(&self, provider_type: &str, initializer: ProviderInitializer) -> Result<()> {
        let mut providers = self.providers.write().unwrap_or_else(PoisonError::into_inner);
        if providers.contains_key(provider_type) {
            return Err(KmsError::DuplicateProvider(provider_type.to_owned()));
        }

        tracing::debug!("Registered KMS provider type {provider_type:?}");
        providers.insert(provider_type.to_owned(), initializer);
        Ok(())
    }

    pub fn get(&self, provider_type: &str) -> Option<ProviderInitializer> {
        self.providers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(provider_type)
            .copied()
    }

    pub fn lookup(&self, provider_type: &str) -> Result<ProviderInitializer> {
        self.get(provider_type)
            .ok_or_else(|| KmsError::UnknownProviderType(provider_type.to_owned()))
    }

    pub fn provider_types(&self) -> Vec<String> {
        let mut types: Vec<_> = self
            .providers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        types.sort();
        types
    }

    /// Builds a client from a KMS configuration section, picking the provider
    /// named by `encryptionKMSType` (or `KMS_PROVIDER` in the standard schema).
    pub fn build_kms(
        &self,
        tenant: &str,
        config: ConfigMap,
        secrets: Option<SecretsMap>,
    ) -> Result<Box<dyn EncryptionKms>> {
        self.build_kms_from_args(InitializerArgs {
            tenant: tenant.to_owned(),
            config,
            secrets,
            tenant_config: None,
        })
    }

    pub fn build_kms_from_args(&self, args: InitializerArgs) -> Result<Box<dyn EncryptionKms>> {
        let provider_type = provider_type(&args.config)?;
        let initializer = self.lookup(&provider_type)?;

        tracing::debug!(
            "Initializing KMS provider {provider_type:?} for tenant {:?}",
            args.tenant
        );
        let kms = initializer(args)?;

        tracing::info!("KMS initialized: {}", kms.debug_name());
        Ok(kms)
    }
}

fn provider_type(config: &ConfigMap) -> Result<String> {
    [KMS_TYPE_KEY, KMS_PROVIDER_KEY]
        .iter()
        .find_map(|key| config.get(*key).and_then(value_to_string))
        .filter(|provider_type| !provider_type.is_empty())
        .ok_or_else(|| KmsError::missing_option(KMS_TYPE_KEY))
}
