//! Translation of the standard Vault configuration convention (`KMS_PROVIDER`,
//! `VAULT_ADDR`, ...) into the internal configuration schema.
//!
//! The standard convention is what most Vault tooling reads from the
//! environment, so operators often reuse such documents as KMS configuration.
//! Translation is purely syntactic: no option is validated here, that happens
//! when the result is resolved.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::{
    error::{KmsError, Result},
    types::ConfigMap,
};

use super::{value_to_bool, value_to_string, KMS_PROVIDER_KEY, KMS_TYPE_KEY};

/// A configuration document written in the standard Vault convention.
#[derive(Deserialize, Debug, Default, PartialEq, Clone)]
pub struct StandardVaultConfig {
    #[serde(rename = "KMS_PROVIDER", default, deserialize_with = "scalar")]
    pub kms_provider: Option<String>,

    #[serde(rename = "VAULT_ADDR", default, deserialize_with = "scalar")]
    pub vault_addr: Option<String>,

    #[serde(rename = "VAULT_BACKEND_PATH", default, deserialize_with = "scalar")]
    pub vault_backend_path: Option<String>,

    /// Name of the secret holding the CA bundle, not the certificate itself.
    #[serde(rename = "VAULT_CACERT", default, deserialize_with = "scalar")]
    pub vault_ca_cert: Option<String>,

    #[serde(rename = "VAULT_TLS_SERVER_NAME", default, deserialize_with = "scalar")]
    pub vault_tls_server_name: Option<String>,

    #[serde(rename = "VAULT_CLIENT_CERT", default, deserialize_with = "scalar")]
    pub vault_client_cert: Option<String>,

    #[serde(rename = "VAULT_CLIENT_KEY", default, deserialize_with = "scalar")]
    pub vault_client_key: Option<String>,

    #[serde(rename = "VAULT_NAMESPACE", default, deserialize_with = "scalar")]
    pub vault_namespace: Option<String>,

    /// `None` when the flag is absent, which is not the same as `false`.
    #[serde(rename = "VAULT_SKIP_VERIFY", default, deserialize_with = "skip_verify")]
    pub vault_skip_verify: Option<bool>,

    /// Keys outside the standard convention, passed through untouched.
    #[serde(flatten)]
    pub extra: ConfigMap,
}

fn scalar<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    match value {
        Value::Null => Ok(None),
        value => value_to_string(&value)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("expected a scalar value, got {value}"))),
    }
}

fn skip_verify<'de, D>(deserializer: D) -> std::result::Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    match &value {
        Value::Null => Ok(None),
        Value::String(s) if s.is_empty() => Ok(None),
        value => {
            let skip_verify = value_to_bool(value);
            if skip_verify.is_none() {
                tracing::warn!("Ignoring VAULT_SKIP_VERIFY {value}, certificates will be verified");
            }
            Ok(skip_verify)
        }
    }
}

impl StandardVaultConfig {
    pub fn from_map(config: &ConfigMap) -> Result<Self> {
        serde_json::from_value(Value::Object(config.clone())).map_err(|e| {
            KmsError::MalformedConfig(format!("standard Vault configuration: {e}"))
        })
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| {
            KmsError::MalformedConfig(format!("standard Vault configuration: {e}"))
        })
    }

    /// Converts into the internal schema. Only the keys present in the source
    /// appear in the result.
    pub fn into_config_map(self) -> ConfigMap {
        let mut config = self.extra;

        let renames = [
            (KMS_TYPE_KEY, self.kms_provider),
            ("vaultAddress", self.vault_addr),
            ("vaultBackendPath", self.vault_backend_path),
            ("vaultCAFromSecret", self.vault_ca_cert),
            ("vaultTLSServerName", self.vault_tls_server_name),
            ("vaultClientCertFromSecret", self.vault_client_cert),
            ("vaultClientCertKeyFromSecret", self.vault_client_key),
            ("vaultNamespace", self.vault_namespace),
        ];
        for (key, value) in renames {
            if let Some(value) = value {
                config.insert(key.to_owned(), Value::String(value));
            }
        }

        if let Some(skip_verify) = self.vault_skip_verify {
            config.insert(
                "vaultCAVerify".to_owned(),
                Value::String((!skip_verify).to_string()),
            );
        }

        config
    }
}

/// Whether a configuration section is written in the standard convention.
pub fn is_standard_config(config: &ConfigMap) -> bool {
    config.contains_key(KMS_PROVIDER_KEY)
        || config.keys().any(|key| key.starts_with("VAULT_"))
}

/// Returns `config` in the internal schema, translating it when needed.
pub fn normalize_config(config: &ConfigMap) -> Result<ConfigMap> {
    if is_standard_config(config) {
        transform_config(config)
    } else {
        Ok(config.clone())
    }
}

/// Translates a standard Vault configuration map into the internal schema.
pub fn transform_config(config: &ConfigMap) -> Result<ConfigMap> {
    let standard = StandardVaultConfig::from_map(config)?;
    tracing::debug!(
        "Transformed standard Vault configuration (provider: {:?})",
        standard.kms_provider
    );
    Ok(standard.into_config_map())
}

#[cfg(test)]
pub mod tests {
    use serde_json::json;

    use super::*;

    fn map(value: Value) -> ConfigMap {
        match value {
            Value::Object(map) => map,
            _ => unreachable!("test fixture must be an object"),
        }
    }

    #[test]
    fn test_std_vault_to_internal_config() -> anyhow::Result<()> {
        let standard = StandardVaultConfig::from_json(
            r#"{
                "KMS_PROVIDER":"vaulttokens",
                "VAULT_ADDR":"https://vault.example.com",
                "VAULT_BACKEND_PATH":"/secret",
                "VAULT_CACERT":"",
                "VAULT_TLS_SERVER_NAME":"vault.example.com",
                "VAULT_CLIENT_CERT":"",
                "VAULT_CLIENT_KEY":"",
                "VAULT_NAMESPACE":"a-department",
                "VAULT_SKIP_VERIFY":"true"
            }"#,
        )?;

        assert_eq!(standard.vault_skip_verify, Some(true));
        assert!(standard.extra.is_empty());

        let config = standard.into_config_map();
        assert_eq!(
            config,
            map(json!({
                "encryptionKMSType": "vaulttokens",
                "vaultAddress": "https://vault.example.com",
                "vaultBackendPath": "/secret",
                "vaultCAFromSecret": "",
                "vaultTLSServerName": "vault.example.com",
                "vaultClientCertFromSecret": "",
                "vaultClientCertKeyFromSecret": "",
                "vaultNamespace": "a-department",
                "vaultCAVerify": "false",
            }))
        );
        Ok(())
    }

    #[test]
    fn test_transform_address_and_skip_verify() -> anyhow::Result<()> {
        let config = transform_config(&map(json!({
            "VAULT_ADDR": "https://vault.example.com",
            "VAULT_SKIP_VERIFY": "true",
        })))?;

        assert_eq!(
            config,
            map(json!({
                "vaultAddress": "https://vault.example.com",
                "vaultCAVerify": "false",
            }))
        );
        Ok(())
    }

    #[test]
    fn test_skip_verify_false_and_native_bool() -> anyhow::Result<()> {
        let config = transform_config(&map(json!({ "VAULT_SKIP_VERIFY": false })))?;
        assert_eq!(config.get("vaultCAVerify"), Some(&json!("true")));

        let config = transform_config(&map(json!({ "VAULT_SKIP_VERIFY": "0" })))?;
        assert_eq!(config.get("vaultCAVerify"), Some(&json!("true")));
        Ok(())
    }

    #[test]
    fn test_absent_skip_verify_is_left_unset() -> anyhow::Result<()> {
        let config = transform_config(&map(json!({ "VAULT_ADDR": "https://vault" })))?;
        assert!(!config.contains_key("vaultCAVerify"));

        let config = transform_config(&map(json!({ "VAULT_SKIP_VERIFY": "" })))?;
        assert!(!config.contains_key("vaultCAVerify"));
        Ok(())
    }

    #[test]
    fn test_unparseable_skip_verify_is_ignored() -> anyhow::Result<()> {
        for skip_verify in [json!("yes"), json!("maybe"), json!(2)] {
            let config = transform_config(&map(json!({
                "VAULT_ADDR": "https://vault",
                "VAULT_SKIP_VERIFY": skip_verify,
            })))?;
            assert!(!config.contains_key("vaultCAVerify"));
        }
        Ok(())
    }

    #[test]
    fn test_unknown_keys_pass_through() -> anyhow::Result<()> {
        let config = transform_config(&map(json!({
            "KMS_PROVIDER": "vaulttokens",
            "tenantTokenName": "my-token",
            "tenants": { "bob": { "VAULT_ADDR": "https://vault.bob" } },
        })))?;

        assert_eq!(config.get("encryptionKMSType"), Some(&json!("vaulttokens")));
        assert_eq!(config.get("tenantTokenName"), Some(&json!("my-token")));
        assert_eq!(
            config.get("tenants"),
            Some(&json!({ "bob": { "VAULT_ADDR": "https://vault.bob" } }))
        );
        Ok(())
    }

    #[test]
    fn test_malformed_document() {
        let err = transform_config(&map(json!({ "VAULT_ADDR": { "nested": "map" } })))
            .expect_err("nested map is not a valid address");
        assert!(matches!(err, KmsError::MalformedConfig(_)));

        let err = StandardVaultConfig::from_json(r#"["VAULT_ADDR"]"#).expect_err("not an object");
        assert!(matches!(err, KmsError::MalformedConfig(_)));
    }

    #[test]
    fn test_is_standard_config() {
        assert!(is_standard_config(&map(json!({ "KMS_PROVIDER": "vaulttokens" }))));
        assert!(is_standard_config(&map(json!({ "VAULT_ADDR": "https://vault" }))));
        assert!(!is_standard_config(&map(json!({ "vaultAddress": "https://vault" }))));
    }
}
