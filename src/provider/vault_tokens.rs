//! # Vault Tokens KMS
//!
//! Keeps the DEK of every volume in a HashiCorp Vault KV secrets engine. Each
//! tenant authenticates with its own Vault token, and may point to its own
//! Vault instance or namespace through the `tenants` section of the KMS
//! configuration:
//!
//! ```json
//! {
//!     "encryptionKMSType": "vaulttokens",
//!     "vaultAddress": "https://vault.example.com",
//!     "vaultBackendPath": "secret/",
//!     "tenants": {
//!         "bob": { "vaultNamespace": "bob" }
//!     }
//! }
//! ```
//!
//! Configuration sections (and tenant sections) written in the standard
//! `VAULT_*` convention are translated first.

use std::{net::SocketAddr, sync::Arc};

use async_trait::async_trait;
use base64::{prelude::BASE64_STANDARD, Engine as _};
use reqwest::{
    dns::{Addrs, Name, Resolve, Resolving},
    Method, RequestBuilder, Response, StatusCode, Url,
};
use serde_json::{json, Value};
use strum::{AsRefStr, EnumString};
use zeroize::Zeroizing;

use crate::{
    config::{
        resolve::{resolve, tenant_overrides, ConfigOption, TenantOverrides},
        transform::normalize_config,
        TENANT_CONFIG_NAME_DEFAULT, TENANT_CONFIG_NAME_KEY,
    },
    error::{KmsError, Result},
    types::{ConfigMap, Passphrase},
};

use super::{EncryptionKms, InitializerArgs};

pub const KMS_TYPE_VAULT_TOKENS: &str = "vaulttokens";

pub const VAULT_TOKENS_DEFAULT_CONFIG_NAME: &str = TENANT_CONFIG_NAME_DEFAULT;
pub const VAULT_TOKENS_DEFAULT_TOKEN_NAME: &str = "csi-kms-token";

/// Environment variable consulted when the tenant's secrets carry no token.
pub const VAULT_TOKEN_ENV: &str = "VAULT_TOKEN";

const VAULT_ADDRESS: &str = "vaultAddress";
const TENANT_CONFIG_NAME: &str = TENANT_CONFIG_NAME_KEY;
const TENANT_TOKEN_NAME: &str = "tenantTokenName";
const VAULT_BACKEND: &str = "vaultBackend";
const VAULT_BACKEND_PATH: &str = "vaultBackendPath";
const VAULT_NAMESPACE: &str = "vaultNamespace";
const VAULT_TLS_SERVER_NAME: &str = "vaultTLSServerName";
const VAULT_CA_VERIFY: &str = "vaultCAVerify";
const VAULT_CA_FROM_SECRET: &str = "vaultCAFromSecret";
const VAULT_CLIENT_CERT_FROM_SECRET: &str = "vaultClientCertFromSecret";
const VAULT_CLIENT_CERT_KEY_FROM_SECRET: &str = "vaultClientCertKeyFromSecret";
const VAULT_DESTROY_KEYS: &str = "vaultDestroyKeys";

const TOKENS_OPTIONS: &[ConfigOption] = &[
    ConfigOption::required(VAULT_ADDRESS),
    ConfigOption::with_default(TENANT_CONFIG_NAME, VAULT_TOKENS_DEFAULT_CONFIG_NAME),
    ConfigOption::with_default(TENANT_TOKEN_NAME, VAULT_TOKENS_DEFAULT_TOKEN_NAME),
];

const CONNECTION_OPTIONS: &[ConfigOption] = &[
    ConfigOption::with_default(VAULT_BACKEND, "kv-v2"),
    ConfigOption::with_default(VAULT_BACKEND_PATH, "secret/"),
    ConfigOption::optional(VAULT_NAMESPACE),
    ConfigOption::optional(VAULT_TLS_SERVER_NAME),
    ConfigOption::with_default(VAULT_CA_VERIFY, "true"),
    ConfigOption::optional(VAULT_CA_FROM_SECRET),
    ConfigOption::optional(VAULT_CLIENT_CERT_FROM_SECRET),
    ConfigOption::optional(VAULT_CLIENT_CERT_KEY_FROM_SECRET),
    ConfigOption::with_default(VAULT_DESTROY_KEYS, "true"),
];

/// Where to find Vault and the tenant's Vault credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultTokensConfig {
    pub address: String,
    /// Name of the tenant's configuration resource.
    pub config_name: String,
    /// Name of the tenant's secret holding the Vault token.
    pub token_name: String,
}

impl VaultTokensConfig {
    pub fn resolve(base: &ConfigMap, tenant: &str, overrides: &TenantOverrides) -> Result<Self> {
        let resolved = resolve(TOKENS_OPTIONS, base, tenant, overrides)?;

        let address = resolved.required_string(VAULT_ADDRESS)?;
        let url = Url::parse(&address)
            .map_err(|e| KmsError::invalid_option(VAULT_ADDRESS, e.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(KmsError::invalid_option(
                VAULT_ADDRESS,
                format!("unsupported scheme {:?}", url.scheme()),
            ));
        }

        Ok(Self {
            address,
            config_name: resolved.string(TENANT_CONFIG_NAME).unwrap_or_default(),
            token_name: resolved.string(TENANT_TOKEN_NAME).unwrap_or_default(),
        })
    }
}

/// Flavour of the KV secrets engine mounted at the backend path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, AsRefStr)]
pub enum VaultBackend {
    #[strum(serialize = "kv-v1")]
    KvV1,
    #[strum(serialize = "kv-v2")]
    KvV2,
}

/// How to talk to Vault once the address and the token are known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultConnectionConfig {
    pub backend: VaultBackend,
    /// Mount path of the KV engine, always without leading and with a trailing `/`.
    pub backend_path: String,
    pub namespace: Option<String>,
    pub tls_server_name: Option<String>,
    pub ca_verify: bool,
    pub ca_from_secret: Option<String>,
    pub client_cert_from_secret: Option<String>,
    pub client_cert_key_from_secret: Option<String>,
    /// Destroy all versions of a DEK instead of soft-deleting the latest one.
    pub destroy_keys: bool,
}

impl VaultConnectionConfig {
    pub fn resolve(base: &ConfigMap, tenant: &str, overrides: &TenantOverrides) -> Result<Self> {
        let resolved = resolve(CONNECTION_OPTIONS, base, tenant, overrides)?;

        let backend = resolved.non_empty_string(VAULT_BACKEND).unwrap_or_default();
        let backend = backend.parse::<VaultBackend>().map_err(|_| {
            KmsError::invalid_option(VAULT_BACKEND, format!("unsupported backend {backend:?}"))
        })?;

        let backend_path = resolved
            .non_empty_string(VAULT_BACKEND_PATH)
            .map(|path| format!("{}/", path.trim_matches('/')))
            .filter(|path| path != "/")
            .ok_or_else(|| KmsError::invalid_option(VAULT_BACKEND_PATH, "empty backend path"))?;

        Ok(Self {
            backend,
            backend_path,
            namespace: resolved.non_empty_string(VAULT_NAMESPACE),
            tls_server_name: resolved.non_empty_string(VAULT_TLS_SERVER_NAME),
            ca_verify: resolved.bool(VAULT_CA_VERIFY)?.unwrap_or(true),
            ca_from_secret: resolved.non_empty_string(VAULT_CA_FROM_SECRET),
            client_cert_from_secret: resolved.non_empty_string(VAULT_CLIENT_CERT_FROM_SECRET),
            client_cert_key_from_secret: resolved
                .non_empty_string(VAULT_CLIENT_CERT_KEY_FROM_SECRET),
            destroy_keys: resolved.bool(VAULT_DESTROY_KEYS)?.unwrap_or(true),
        })
    }
}

/// The fully resolved configuration of a tenant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultTokensSettings {
    pub tokens: VaultTokensConfig,
    pub connection: VaultConnectionConfig,
}

impl VaultTokensSettings {
    pub fn resolve(config: &ConfigMap, tenant: &str) -> Result<Self> {
        Self::resolve_with_tenant_config(config, tenant, None)
    }

    /// Like [`Self::resolve`], with the tenant's own configuration resource
    /// applied on top of its entry in the `tenants` map.
    pub fn resolve_with_tenant_config(
        config: &ConfigMap,
        tenant: &str,
        tenant_config: Option<&ConfigMap>,
    ) -> Result<Self> {
        let config = normalize_config(config)?;
        let overrides = tenant_overrides(&config, tenant, tenant_config)?;

        Ok(Self {
            tokens: VaultTokensConfig::resolve(&config, tenant, &overrides)?,
            connection: VaultConnectionConfig::resolve(&config, tenant, &overrides)?,
        })
    }
}

/// Takes the token from the tenant's secrets, falling back to the environment.
fn resolve_token(
    args: &InitializerArgs,
    token_name: &str,
    env_token: Option<String>,
) -> Result<Zeroizing<String>> {
    if let Some(token) = args.secret(token_name) {
        tracing::debug!("Using Vault token from secret {token_name:?}");
        return Ok(Zeroizing::new(token.to_owned()));
    }

    match env_token.filter(|token| !token.is_empty()) {
        Some(token) => {
            tracing::debug!("Using Vault token from environment variable {VAULT_TOKEN_ENV}");
            Ok(Zeroizing::new(token))
        }
        None => Err(KmsError::AuthMaterialMissing {
            expected: format!(
                "secret {token_name:?} of tenant {:?} or environment variable {VAULT_TOKEN_ENV}",
                args.tenant
            ),
        }),
    }
}

fn required_secret<'a>(args: &'a InitializerArgs, name: &str) -> Result<&'a str> {
    args.secret(name).ok_or_else(|| KmsError::SecretNotFound {
        namespace: args.tenant.clone(),
        name: name.to_owned(),
    })
}

fn build_client(
    settings: &VaultTokensSettings,
    args: &InitializerArgs,
) -> Result<reqwest::Client> {
    let address = &settings.tokens.address;
    let connection = &settings.connection;
    let mut builder = reqwest::Client::builder();

    if !connection.ca_verify {
        tracing::warn!("Certificate verification of Vault at {address} is disabled");
        builder = builder.danger_accept_invalid_certs(true);
    }

    if let Some(ca_secret) = &connection.ca_from_secret {
        let ca = reqwest::Certificate::from_pem(required_secret(args, ca_secret)?.as_bytes())
            .map_err(|e| {
                KmsError::invalid_option(
                    VAULT_CA_FROM_SECRET,
                    format!("secret {ca_secret:?} does not hold a PEM certificate: {e}"),
                )
            })?;
        builder = builder.add_root_certificate(ca);
    }

    match (
        &connection.client_cert_from_secret,
        &connection.client_cert_key_from_secret,
    ) {
        (Some(cert_secret), Some(key_secret)) => {
            let pem = Zeroizing::new(format!(
                "{}\n{}",
                required_secret(args, cert_secret)?,
                required_secret(args, key_secret)?
            ));
            let identity = reqwest::Identity::from_pem(pem.as_bytes()).map_err(|e| {
                KmsError::invalid_option(
                    VAULT_CLIENT_CERT_FROM_SECRET,
                    format!("invalid client certificate or key: {e}"),
                )
            })?;
            builder = builder.identity(identity);
        }
        (Some(_), None) => return Err(KmsError::missing_option(VAULT_CLIENT_CERT_KEY_FROM_SECRET)),
        (None, Some(_)) => return Err(KmsError::missing_option(VAULT_CLIENT_CERT_FROM_SECRET)),
        (None, None) => {}
    }

    if let Some(tls_server_name) = &connection.tls_server_name {
        let host = address_host(address)?;
        if !host.eq_ignore_ascii_case(tls_server_name) {
            tracing::debug!("Connecting to Vault at {host} as {tls_server_name}");
            builder = builder.dns_resolver(Arc::new(ServerNameResolver {
                server_name: tls_server_name.clone(),
                host,
            }));
        }
    }

    builder.build().map_err(|source| KmsError::ClientBuild {
        endpoint: address.clone(),
        source,
    })
}

/// Host of `address` in a form the system resolver accepts.
fn address_host(address: &str) -> Result<String> {
    let url =
        Url::parse(address).map_err(|e| KmsError::invalid_option(VAULT_ADDRESS, e.to_string()))?;
    url.host_str()
        .map(|host| host.trim_start_matches('[').trim_end_matches(']').to_owned())
        .ok_or_else(|| KmsError::invalid_option(VAULT_ADDRESS, "no host"))
}

/// The URL requests are sent to: the configured address, with the host
/// replaced by the TLS server name when one is set. Hostname verification
/// then checks the server certificate against that name.
fn endpoint(settings: &VaultTokensSettings) -> Result<Url> {
    let mut url = Url::parse(&settings.tokens.address)
        .map_err(|e| KmsError::invalid_option(VAULT_ADDRESS, e.to_string()))?;
    if let Some(tls_server_name) = &settings.connection.tls_server_name {
        url.set_host(Some(tls_server_name))
            .map_err(|e| KmsError::invalid_option(VAULT_TLS_SERVER_NAME, e.to_string()))?;
    }
    Ok(url)
}

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Resolves the TLS server name to the addresses of the configured Vault
/// host. Every other name goes through the system resolver.
struct ServerNameResolver {
    server_name: String,
    host: String,
}

impl Resolve for ServerNameResolver {
    fn resolve(&self, name: Name) -> Resolving {
        let host = if name.as_str().eq_ignore_ascii_case(&self.server_name) {
            self.host.clone()
        } else {
            name.as_str().to_owned()
        };

        Box::pin(async move {
            let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host.as_str(), 0))
                .await
                .map_err(|e| Box::new(e) as BoxError)?
                .collect();
            Ok::<Addrs, BoxError>(Box::new(addrs.into_iter()))
        })
    }
}

pub struct VaultTokensKms {
    tenant: String,
    settings: VaultTokensSettings,
    endpoint: Url,
    token: Zeroizing<String>,
    client: reqwest::Client,
}

pub fn init_vault_tokens_kms(args: InitializerArgs) -> Result<Box<dyn EncryptionKms>> {
    Ok(Box::new(VaultTokensKms::new(
        &args,
        std::env::var(VAULT_TOKEN_ENV).ok(),
    )?))
}

impl VaultTokensKms {
    pub fn new(args: &InitializerArgs, env_token: Option<String>) -> Result<Self> {
        let settings = VaultTokensSettings::resolve_with_tenant_config(
            &args.config,
            &args.tenant,
            args.tenant_config.as_ref(),
        )?;
        let token = resolve_token(args, &settings.tokens.token_name, env_token)?;
        let client = build_client(&settings, args)?;

        Ok(Self {
            tenant: args.tenant.clone(),
            endpoint: endpoint(&settings)?,
            settings,
            token,
            client,
        })
    }

    pub fn settings(&self) -> &VaultTokensSettings {
        &self.settings
    }

    /// `{endpoint}/v1/{backend path}/{section}/{volume_id}`, the volume ID
    /// being a single path segment whatever it contains.
    fn kv_url(&self, section: Option<&str>, volume_id: &str) -> Result<Url> {
        if matches!(volume_id, "" | "." | "..") {
            return Err(KmsError::InvalidVolumeId(volume_id.to_owned()));
        }

        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| KmsError::invalid_option(VAULT_ADDRESS, "cannot be a base URL"))?
            .pop_if_empty()
            .push("v1")
            .extend(
                self.settings
                    .connection
                    .backend_path
                    .split('/')
                    .filter(|segment| !segment.is_empty()),
            )
            .extend(section)
            .push(volume_id);
        Ok(url)
    }

    fn data_url(&self, volume_id: &str) -> Result<Url> {
        match self.settings.connection.backend {
            VaultBackend::KvV1 => self.kv_url(None, volume_id),
            VaultBackend::KvV2 => self.kv_url(Some("data"), volume_id),
        }
    }

    fn delete_url(&self, volume_id: &str) -> Result<Url> {
        match self.settings.connection.backend {
            VaultBackend::KvV2 if self.settings.connection.destroy_keys => {
                self.kv_url(Some("metadata"), volume_id)
            }
            _ => self.data_url(volume_id),
        }
    }

    fn request(&self, method: Method, url: &Url) -> RequestBuilder {
        let mut request = self
            .client
            .request(method, url.clone())
            .header("X-Vault-Token", self.token.as_str());
        if let Some(namespace) = &self.settings.connection.namespace {
            request = request.header("X-Vault-Namespace", namespace);
        }
        request
    }

    async fn send(&self, request: RequestBuilder, url: &Url) -> Result<Response> {
        request.send().await.map_err(|source| KmsError::Transport {
            endpoint: url.to_string(),
            source,
        })
    }
}

fn status_error(url: &Url, status: StatusCode) -> KmsError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => KmsError::PermissionDenied {
            endpoint: url.to_string(),
            status: status.as_u16(),
        },
        _ => KmsError::Backend {
            endpoint: url.to_string(),
            message: format!("HTTP {status}"),
        },
    }
}

#[async_trait]
impl EncryptionKms for VaultTokensKms {
    fn debug_name(&self) -> String {
        format!(
            "Vault ({}, tenant: {:?})",
            self.settings.tokens.address, self.tenant
        )
    }

    async fn fetch_dek(&self, volume_id: &str) -> Result<Passphrase> {
        let url = self.data_url(volume_id)?;
        let response = self.send(self.request(Method::GET, &url), &url).await?;

        match response.status() {
            StatusCode::NOT_FOUND => return Err(KmsError::KeyNotFound(volume_id.to_owned())),
            status if !status.is_success() => return Err(status_error(&url, status)),
            _ => {}
        }

        let body: Value = response.json().await.map_err(|source| KmsError::Transport {
            endpoint: url.to_string(),
            source,
        })?;
        let pointer = match self.settings.connection.backend {
            VaultBackend::KvV1 => "/data/passphrase",
            VaultBackend::KvV2 => "/data/data/passphrase",
        };

        let passphrase = body
            .pointer(pointer)
            .and_then(Value::as_str)
            .ok_or_else(|| KmsError::Backend {
                endpoint: url.to_string(),
                message: "response carries no passphrase".to_owned(),
            })
            .and_then(|encoded| {
                BASE64_STANDARD
                    .decode(encoded)
                    .map_err(|_| KmsError::Backend {
                        endpoint: url.to_string(),
                        message: "passphrase is not valid base64".to_owned(),
                    })
            })?;

        tracing::info!("The DEK of volume {volume_id} has been fetched from Vault");
        Ok(Passphrase::from(passphrase))
    }

    /// On kv-v2 the write is a check-and-set on version 0, so a DEK is only
    /// ever created once. KV v1 has no such guard and overwrites.
    async fn store_dek(&self, volume_id: &str, dek: &Passphrase) -> Result<()> {
        let url = self.data_url(volume_id)?;
        let encoded = Zeroizing::new(BASE64_STANDARD.encode(dek.as_bytes()));
        let body = match self.settings.connection.backend {
            VaultBackend::KvV1 => json!({ "passphrase": encoded.as_str() }),
            VaultBackend::KvV2 => json!({
                "options": { "cas": 0 },
                "data": { "passphrase": encoded.as_str() },
            }),
        };

        let response = self
            .send(self.request(Method::POST, &url).json(&body), &url)
            .await?;
        match response.status() {
            status if status.is_success() => {}
            StatusCode::BAD_REQUEST if self.settings.connection.backend == VaultBackend::KvV2 => {
                let message = response.text().await.unwrap_or_default();
                if message.contains("check-and-set") {
                    return Err(KmsError::KeyExists(volume_id.to_owned()));
                }
                return Err(status_error(&url, StatusCode::BAD_REQUEST));
            }
            status => return Err(status_error(&url, status)),
        }

        tracing::info!("The DEK of volume {volume_id} has been stored in Vault");
        Ok(())
    }

    async fn remove_dek(&self, volume_id: &str) -> Result<()> {
        let url = self.delete_url(volume_id)?;
        let response = self.send(self.request(Method::DELETE, &url), &url).await?;

        match response.status() {
            StatusCode::NOT_FOUND => {
                tracing::debug!("No DEK of volume {volume_id} in Vault, nothing to remove");
                Ok(())
            }
            status if status.is_success() => {
                tracing::info!("The DEK of volume {volume_id} has been removed from Vault");
                Ok(())
            }
            status => Err(status_error(&url, status)),
        }
    }
}

#[cfg(test)]
pub mod tests {
    use crate::{config::TENANTS_KEY, error::ErrorKind, types::SecretsMap};

    use super::*;

    fn map(value: Value) -> ConfigMap {
        match value {
            Value::Object(map) => map,
            _ => unreachable!("test fixture must be an object"),
        }
    }

    fn token_secrets() -> Option<SecretsMap> {
        Some(SecretsMap::from([(
            VAULT_TOKENS_DEFAULT_TOKEN_NAME.to_owned(),
            "s.tenant-token".to_owned(),
        )]))
    }

    #[test]
    fn test_parse_config() -> anyhow::Result<()> {
        let mut config = ConfigMap::new();

        // empty config map
        let err = VaultTokensConfig::resolve(&config, "", &TenantOverrides::new())
            .expect_err("address is required");
        assert!(matches!(&err, KmsError::MissingConfigOption { option } if option == VAULT_ADDRESS));

        config.insert(VAULT_ADDRESS.into(), json!("https://vault.default.cluster.svc"));
        config.insert(TENANT_CONFIG_NAME.into(), json!(VAULT_TOKENS_DEFAULT_CONFIG_NAME));
        config.insert(TENANT_TOKEN_NAME.into(), json!(VAULT_TOKENS_DEFAULT_TOKEN_NAME));

        let parsed = VaultTokensConfig::resolve(&config, "", &TenantOverrides::new())?;
        assert_eq!(
            parsed,
            VaultTokensConfig {
                address: "https://vault.default.cluster.svc".into(),
                config_name: VAULT_TOKENS_DEFAULT_CONFIG_NAME.into(),
                token_name: VAULT_TOKENS_DEFAULT_TOKEN_NAME.into(),
            }
        );

        // tenant "bob" uses a different config name
        let overrides = TenantOverrides::from([(
            "bob".to_owned(),
            map(json!({ TENANT_CONFIG_NAME: "the-config-from-bob" })),
        )]);
        let parsed = VaultTokensConfig::resolve(&config, "bob", &overrides)?;
        assert_eq!(parsed.config_name, "the-config-from-bob");
        assert_eq!(parsed.token_name, VAULT_TOKENS_DEFAULT_TOKEN_NAME);
        Ok(())
    }

    #[test]
    fn test_invalid_address() {
        for address in ["not a url", "ftp://vault.example.com"] {
            let err = VaultTokensConfig::resolve(
                &map(json!({ VAULT_ADDRESS: address })),
                "",
                &TenantOverrides::new(),
            )
            .expect_err("address must be an http(s) URL");
            assert!(matches!(err, KmsError::InvalidConfigOption { .. }));
        }
    }

    #[test]
    fn test_connection_defaults() -> anyhow::Result<()> {
        let settings = VaultTokensSettings::resolve(
            &map(json!({ VAULT_ADDRESS: "https://vault.example.com" })),
            "",
        )?;

        assert_eq!(
            settings.connection,
            VaultConnectionConfig {
                backend: VaultBackend::KvV2,
                backend_path: "secret/".into(),
                namespace: None,
                tls_server_name: None,
                ca_verify: true,
                ca_from_secret: None,
                client_cert_from_secret: None,
                client_cert_key_from_secret: None,
                destroy_keys: true,
            }
        );
        Ok(())
    }

    #[test]
    fn test_standard_config_round_trip() -> anyhow::Result<()> {
        let settings = VaultTokensSettings::resolve(
            &map(json!({
                "KMS_PROVIDER": "vaulttokens",
                "VAULT_ADDR": "https://vault.example.com",
                "VAULT_BACKEND_PATH": "/secret",
                "VAULT_CACERT": "vault-ca",
                "VAULT_TLS_SERVER_NAME": "vault.example.com",
                "VAULT_CLIENT_CERT": "vault-client-cert",
                "VAULT_CLIENT_KEY": "vault-client-key",
                "VAULT_NAMESPACE": "a-department",
                "VAULT_SKIP_VERIFY": "true",
            })),
            "",
        )?;

        assert_eq!(settings.tokens.address, "https://vault.example.com");
        let connection = settings.connection;
        assert_eq!(connection.backend_path, "secret/");
        assert_eq!(connection.ca_from_secret.as_deref(), Some("vault-ca"));
        assert_eq!(connection.tls_server_name.as_deref(), Some("vault.example.com"));
        assert_eq!(connection.client_cert_from_secret.as_deref(), Some("vault-client-cert"));
        assert_eq!(connection.client_cert_key_from_secret.as_deref(), Some("vault-client-key"));
        assert_eq!(connection.namespace.as_deref(), Some("a-department"));
        assert!(!connection.ca_verify);
        Ok(())
    }

    #[test]
    fn test_absent_skip_verify_verifies() -> anyhow::Result<()> {
        let settings = VaultTokensSettings::resolve(
            &map(json!({
                "KMS_PROVIDER": "vaulttokens",
                "VAULT_ADDR": "https://vault.example.com",
            })),
            "",
        )?;

        assert!(settings.connection.ca_verify);
        Ok(())
    }

    #[test]
    fn test_tenant_overrides() -> anyhow::Result<()> {
        let config = map(json!({
            VAULT_ADDRESS: "https://vault.default.cluster.svc",
            VAULT_NAMESPACE: "storage",
            TENANTS_KEY: {
                "bob": { VAULT_ADDRESS: "https://vault.bob.example.org" },
                "carol": { "VAULT_NAMESPACE": "carol", "VAULT_SKIP_VERIFY": true },
                "broken": "not a map",
            },
        }));

        let bob = VaultTokensSettings::resolve(&config, "bob")?;
        assert_eq!(bob.tokens.address, "https://vault.bob.example.org");
        assert_eq!(bob.connection.namespace.as_deref(), Some("storage"));

        // tenant sections in the standard convention are translated as well
        let carol = VaultTokensSettings::resolve(&config, "carol")?;
        assert_eq!(carol.tokens.address, "https://vault.default.cluster.svc");
        assert_eq!(carol.connection.namespace.as_deref(), Some("carol"));
        assert!(!carol.connection.ca_verify);

        assert_eq!(
            VaultTokensSettings::resolve(&config, "dave")?,
            VaultTokensSettings::resolve(&config, "")?
        );
        assert!(matches!(
            VaultTokensSettings::resolve(&config, "broken"),
            Err(KmsError::MalformedConfig(_))
        ));
        Ok(())
    }

    #[test]
    fn test_invalid_connection_options() {
        let cases = [
            json!({ VAULT_ADDRESS: "https://vault", VAULT_BACKEND: "kv-v3" }),
            json!({ VAULT_ADDRESS: "https://vault", VAULT_BACKEND_PATH: "/" }),
            json!({ VAULT_ADDRESS: "https://vault", VAULT_CA_VERIFY: "sometimes" }),
        ];

        for config in cases {
            assert!(matches!(
                VaultTokensSettings::resolve(&map(config), ""),
                Err(KmsError::InvalidConfigOption { .. })
            ));
        }
    }

    #[test]
    fn test_init_with_token_from_secrets() -> anyhow::Result<()> {
        // Vault is not reachable here, initialization must not care.
        let kms = VaultTokensKms::new(
            &InitializerArgs {
                tenant: "bob".into(),
                config: map(json!({ VAULT_ADDRESS: "https://vault.invalid:8200" })),
                secrets: token_secrets(),
                tenant_config: None,
            },
            None,
        )?;

        assert_eq!(kms.token.as_str(), "s.tenant-token");
        assert_eq!(
            kms.data_url("pvc-1")?.as_str(),
            "https://vault.invalid:8200/v1/secret/data/pvc-1"
        );
        assert_eq!(
            kms.delete_url("pvc-1")?.as_str(),
            "https://vault.invalid:8200/v1/secret/metadata/pvc-1"
        );
        assert!(kms.debug_name().contains("bob"));
        Ok(())
    }

    #[test]
    fn test_kv_v1_urls() -> anyhow::Result<()> {
        let kms = VaultTokensKms::new(
            &InitializerArgs {
                tenant: "".into(),
                config: map(json!({
                    VAULT_ADDRESS: "https://vault.example.com/",
                    VAULT_BACKEND: "kv-v1",
                    VAULT_BACKEND_PATH: "kv/csi",
                })),
                secrets: token_secrets(),
                tenant_config: None,
            },
            None,
        )?;

        assert_eq!(
            kms.data_url("pvc-1")?.as_str(),
            "https://vault.example.com/v1/kv/csi/pvc-1"
        );
        assert_eq!(kms.delete_url("pvc-1")?, kms.data_url("pvc-1")?);
        Ok(())
    }

    #[test]
    fn test_volume_id_is_one_segment() -> anyhow::Result<()> {
        let kms = VaultTokensKms::new(
            &InitializerArgs {
                tenant: "bob".into(),
                config: map(json!({ VAULT_ADDRESS: "https://vault.example.com/prefix/" })),
                secrets: token_secrets(),
                tenant_config: None,
            },
            None,
        )?;

        assert_eq!(
            kms.data_url("a/b?c#d")?.as_str(),
            "https://vault.example.com/prefix/v1/secret/data/a%2Fb%3Fc%23d"
        );
        assert_eq!(
            kms.data_url("../sys")?.as_str(),
            "https://vault.example.com/prefix/v1/secret/data/..%2Fsys"
        );
        for volume_id in ["", ".", ".."] {
            assert!(matches!(
                kms.data_url(volume_id),
                Err(KmsError::InvalidVolumeId(_))
            ));
        }
        Ok(())
    }

    #[test]
    fn test_tls_server_name() -> anyhow::Result<()> {
        let init = |tls_server_name: &str| {
            VaultTokensKms::new(
                &InitializerArgs {
                    tenant: "bob".into(),
                    config: map(json!({
                        VAULT_ADDRESS: "https://10.0.0.7:8200",
                        VAULT_TLS_SERVER_NAME: tls_server_name,
                    })),
                    secrets: token_secrets(),
                    tenant_config: None,
                },
                None,
            )
        };

        // requests name the server, the address only decides where they go
        let kms = init("vault.example.com")?;
        assert_eq!(
            kms.data_url("pvc-1")?.as_str(),
            "https://vault.example.com:8200/v1/secret/data/pvc-1"
        );
        assert!(kms.debug_name().contains("10.0.0.7"));

        assert!(matches!(
            init("not a host name"),
            Err(KmsError::InvalidConfigOption { option, .. }) if option == VAULT_TLS_SERVER_NAME
        ));
        Ok(())
    }

    #[test]
    fn test_address_host() -> anyhow::Result<()> {
        assert_eq!(address_host("https://vault.example.com:8200")?, "vault.example.com");
        assert_eq!(address_host("https://[::1]:8200")?, "::1");
        Ok(())
    }

    #[test]
    fn test_tenant_config_resource() -> anyhow::Result<()> {
        let config = map(json!({
            VAULT_ADDRESS: "https://vault.default.cluster.svc",
            TENANTS_KEY: {
                "bob": {
                    VAULT_NAMESPACE: "bob-from-tenants",
                    VAULT_BACKEND_PATH: "bob/",
                },
            },
        }));
        let tenant_config = map(json!({
            "VAULT_NAMESPACE": "bob-from-resource",
            "VAULT_ADDR": "https://vault.bob.example.org",
        }));

        let settings =
            VaultTokensSettings::resolve_with_tenant_config(&config, "bob", Some(&tenant_config))?;
        assert_eq!(settings.tokens.address, "https://vault.bob.example.org");
        assert_eq!(settings.connection.namespace.as_deref(), Some("bob-from-resource"));
        assert_eq!(settings.connection.backend_path, "bob/");

        let kms = VaultTokensKms::new(
            &InitializerArgs {
                tenant: "bob".into(),
                config,
                secrets: token_secrets(),
                tenant_config: Some(tenant_config),
            },
            None,
        )?;
        assert_eq!(kms.settings(), &settings);
        Ok(())
    }

    #[test]
    fn test_token_resolution() -> anyhow::Result<()> {
        let mut args = InitializerArgs {
            tenant: "bob".into(),
            ..Default::default()
        };

        let token = resolve_token(&args, VAULT_TOKENS_DEFAULT_TOKEN_NAME, Some("s.env".into()))?;
        assert_eq!(token.as_str(), "s.env");

        args.secrets = token_secrets();
        let token = resolve_token(&args, VAULT_TOKENS_DEFAULT_TOKEN_NAME, Some("s.env".into()))?;
        assert_eq!(token.as_str(), "s.tenant-token");

        let err = resolve_token(&args, "other-token", Some(String::new()))
            .expect_err("no usable token");
        assert_eq!(err.kind(), ErrorKind::Authentication);
        assert!(err.to_string().contains("other-token"));
        assert!(err.to_string().contains(VAULT_TOKEN_ENV));
        Ok(())
    }

    #[test]
    fn test_missing_token_fails_init() {
        let err = VaultTokensKms::new(
            &InitializerArgs {
                tenant: "bob".into(),
                config: map(json!({ VAULT_ADDRESS: "https://vault.example.com" })),
                secrets: None,
                tenant_config: None,
            },
            None,
        )
        .err()
        .expect("no token available");
        assert!(matches!(err, KmsError::AuthMaterialMissing { .. }));
    }

    #[test]
    fn test_missing_tls_material() {
        let init = |config: Value| {
            VaultTokensKms::new(
                &InitializerArgs {
                    tenant: "bob".into(),
                    config: map(config),
                    secrets: token_secrets(),
                    tenant_config: None,
                },
                None,
            )
            .err()
        };

        assert!(matches!(
            init(json!({ VAULT_ADDRESS: "https://vault", VAULT_CA_FROM_SECRET: "vault-ca" })),
            Some(KmsError::SecretNotFound { name, .. }) if name == "vault-ca"
        ));
        assert!(matches!(
            init(json!({ VAULT_ADDRESS: "https://vault", VAULT_CLIENT_CERT_FROM_SECRET: "cert" })),
            Some(KmsError::MissingConfigOption { option }) if option == VAULT_CLIENT_CERT_KEY_FROM_SECRET
        ));
    }
}
