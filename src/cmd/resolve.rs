use anyhow::{Context as _, Result};
use async_trait::async_trait;
use comfy_table::{
    modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Cell, Color, ContentArrangement, Table,
};
use serde_json::Value;

use crate::{
    cli::ResolveOptions,
    config::{transform::is_standard_config, transform::transform_config, value_to_string},
    manager::KmsManager,
};

pub struct ResolveCommand {
    pub resolve_options: ResolveOptions,
}

#[async_trait]
impl super::Command for ResolveCommand {
    async fn run(&self, manager: &KmsManager) -> Result<()> {
        let kms_id = &self.resolve_options.kms_id;
        let tenant = &self.resolve_options.tenant;

        let mut config = manager
            .get_kms_config(kms_id)
            .await
            .with_context(|| format!("Failed to load configuration of KMS {kms_id:?}"))?;
        if is_standard_config(&config) {
            config = transform_config(&config)?;
        }

        let tenant_config = manager
            .get_tenant_config(tenant, &config)
            .await
            .with_context(|| format!("Failed to load configuration of tenant {tenant:?}"))?;

        let rows = resolved_rows(&config, tenant, tenant_config.as_ref())
            .with_context(|| format!("Failed to resolve KMS {kms_id:?} for tenant {tenant:?}"))?;

        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .apply_modifier(UTF8_ROUND_CORNERS)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(vec!["Option", "Value"]);

        for (option, value) in rows {
            table.add_row(vec![
                Cell::new(option),
                match value {
                    Some(value) => Cell::new(value),
                    None => Cell::new("<none>").fg(Color::DarkGrey),
                },
            ]);
        }

        println!("{table}");
        Ok(())
    }
}

#[cfg(feature = "provider-vault-tokens")]
fn resolved_rows(
    config: &crate::types::ConfigMap,
    tenant: &str,
    tenant_config: Option<&crate::types::ConfigMap>,
) -> crate::error::Result<Vec<(String, Option<String>)>> {
    use crate::config::KMS_TYPE_KEY;
    use crate::provider::vault_tokens::{VaultTokensSettings, KMS_TYPE_VAULT_TOKENS};

    let is_vault_tokens = config
        .get(KMS_TYPE_KEY)
        .and_then(value_to_string)
        .is_some_and(|provider_type| provider_type == KMS_TYPE_VAULT_TOKENS);
    if !is_vault_tokens {
        return Ok(raw_rows(config));
    }

    let VaultTokensSettings { tokens, connection } =
        VaultTokensSettings::resolve_with_tenant_config(config, tenant, tenant_config)?;
    Ok(vec![
        (KMS_TYPE_KEY.to_owned(), Some(KMS_TYPE_VAULT_TOKENS.to_owned())),
        ("vaultAddress".to_owned(), Some(tokens.address)),
        ("tenantConfigName".to_owned(), Some(tokens.config_name)),
        ("tenantTokenName".to_owned(), Some(tokens.token_name)),
        ("vaultBackend".to_owned(), Some(connection.backend.as_ref().to_owned())),
        ("vaultBackendPath".to_owned(), Some(connection.backend_path)),
        ("vaultNamespace".to_owned(), connection.namespace),
        ("vaultTLSServerName".to_owned(), connection.tls_server_name),
        ("vaultCAVerify".to_owned(), Some(connection.ca_verify.to_string())),
        ("vaultCAFromSecret".to_owned(), connection.ca_from_secret),
        ("vaultClientCertFromSecret".to_owned(), connection.client_cert_from_secret),
        ("vaultClientCertKeyFromSecret".to_owned(), connection.client_cert_key_from_secret),
        ("vaultDestroyKeys".to_owned(), Some(connection.destroy_keys.to_string())),
    ])
}

#[cfg(not(feature = "provider-vault-tokens"))]
fn resolved_rows(
    config: &crate::types::ConfigMap,
    _tenant: &str,
    _tenant_config: Option<&crate::types::ConfigMap>,
) -> crate::error::Result<Vec<(String, Option<String>)>> {
    Ok(raw_rows(config))
}

fn raw_rows(config: &crate::types::ConfigMap) -> Vec<(String, Option<String>)> {
    config
        .iter()
        .map(|(key, value)| {
            let value = match value {
                Value::Object(_) | Value::Array(_) => Some(value.to_string()),
                value => value_to_string(value),
            };
            (key.clone(), value)
        })
        .collect()
}
