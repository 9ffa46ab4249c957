//! Layered resolution of KMS configuration.
//!
//! Options are resolved from three layers, later layers winning key by key:
//! the declared defaults, the base configuration section, and the overrides of
//! the requesting tenant. Once merged, every required option must carry a
//! non-empty value.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::{
    error::{KmsError, Result},
    types::ConfigMap,
};

use super::{
    transform::normalize_config, value_to_bool, value_to_string, TENANTS_KEY,
    TENANT_CONFIG_NAME_DEFAULT, TENANT_CONFIG_NAME_KEY,
};

/// Per-tenant partial configuration maps, keyed by tenant name.
pub type TenantOverrides = BTreeMap<String, ConfigMap>;

/// Declaration of a recognized configuration option.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigOption {
    pub key: &'static str,
    /// Applied when the option is absent from every layer.
    pub default: Option<&'static str>,
    pub required: bool,
}

impl ConfigOption {
    pub const fn required(key: &'static str) -> Self {
        Self {
            key,
            default: None,
            required: true,
        }
    }

    pub const fn optional(key: &'static str) -> Self {
        Self {
            key,
            default: None,
            required: false,
        }
    }

    pub const fn with_default(key: &'static str, default: &'static str) -> Self {
        Self {
            key,
            default: Some(default),
            required: false,
        }
    }
}

/// Merged and validated configuration. Unknown keys are kept as they were.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConfig {
    values: ConfigMap,
}

impl ResolvedConfig {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn string(&self, key: &str) -> Option<String> {
        self.values.get(key).and_then(value_to_string)
    }

    /// Returns the value of an option, treating empty strings as absent.
    pub fn non_empty_string(&self, key: &str) -> Option<String> {
        self.string(key).filter(|value| !value.is_empty())
    }

    pub fn required_string(&self, key: &str) -> Result<String> {
        self.non_empty_string(key)
            .ok_or_else(|| KmsError::missing_option(key))
    }

    pub fn bool(&self, key: &str) -> Result<Option<bool>> {
        match self.values.get(key) {
            None => Ok(None),
            Some(value) => value_to_bool(value)
                .map(Some)
                .ok_or_else(|| KmsError::invalid_option(key, "expected a boolean")),
        }
    }

    pub fn as_map(&self) -> &ConfigMap {
        &self.values
    }

    pub fn into_map(self) -> ConfigMap {
        self.values
    }
}

fn overlay(target: &mut ConfigMap, layer: &ConfigMap) {
    for (key, value) in layer {
        target.insert(key.clone(), value.clone());
    }
}

/// Resolves `options` from their defaults, the `base` section and the
/// overrides registered for `tenant`. An empty `tenant` disables tenant
/// scoping.
pub fn resolve(
    options: &[ConfigOption],
    base: &ConfigMap,
    tenant: &str,
    overrides: &TenantOverrides,
) -> Result<ResolvedConfig> {
    let mut values = ConfigMap::new();
    for option in options {
        if let Some(default) = option.default {
            values.insert(option.key.to_owned(), Value::String(default.to_owned()));
        }
    }

    overlay(&mut values, base);

    if !tenant.is_empty() {
        match overrides.get(tenant) {
            Some(tenant_config) => {
                tracing::debug!(
                    "Applying {} configuration override(s) of tenant {tenant}",
                    tenant_config.len()
                );
                overlay(&mut values, tenant_config);
            }
            None => tracing::debug!("No configuration override for tenant {tenant}"),
        }
    }

    let resolved = ResolvedConfig { values };
    for option in options.iter().filter(|option| option.required) {
        resolved.required_string(option.key)?;
    }

    Ok(resolved)
}

/// Collects the overrides of `tenant`: its entry in the `tenants` map of
/// `config`, then its own configuration resource on top. Entries of other
/// tenants are never inspected, so one broken tenant cannot affect the others.
/// Both layers may use the standard convention.
pub fn tenant_overrides(
    config: &ConfigMap,
    tenant: &str,
    tenant_config: Option<&ConfigMap>,
) -> Result<TenantOverrides> {
    let mut overrides = TenantOverrides::new();
    if tenant.is_empty() {
        return Ok(overrides);
    }

    let mut layer = match config.get(TENANTS_KEY) {
        None => ConfigMap::new(),
        Some(Value::Object(tenants)) => match tenants.get(tenant) {
            None => ConfigMap::new(),
            Some(Value::Object(entry)) => normalize_config(entry)?,
            Some(_) => {
                return Err(KmsError::MalformedConfig(format!(
                    "configuration of tenant {tenant:?} is not a map"
                )))
            }
        },
        Some(_) => {
            return Err(KmsError::MalformedConfig(format!(
                "{TENANTS_KEY:?} must be a map of tenant configurations"
            )))
        }
    };

    if let Some(tenant_config) = tenant_config {
        overlay(&mut layer, &normalize_config(tenant_config)?);
    }

    if !layer.is_empty() {
        overrides.insert(tenant.to_owned(), layer);
    }
    Ok(overrides)
}

/// Name of the configuration resource `tenant` may keep in its namespace.
pub fn tenant_config_name(config: &ConfigMap, tenant: &str) -> Result<String> {
    let config = normalize_config(config)?;
    let overrides = tenant_overrides(&config, tenant, None)?;
    let option = [ConfigOption::with_default(
        TENANT_CONFIG_NAME_KEY,
        TENANT_CONFIG_NAME_DEFAULT,
    )];

    Ok(resolve(&option, &config, tenant, &overrides)?
        .string(TENANT_CONFIG_NAME_KEY)
        .unwrap_or_default())
}
