use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::{
    error::{KmsError, Result},
    types::SecretsMap,
};

use super::SecretStore;

pub const CSI_KMS_SECRETS_DIR_DEFAULT: &str = "/etc/csi-kms/secrets";

/// Reads secrets laid out as `<root>/<namespace>/<name>`, which is how
/// orchestrator secrets look once mounted as volumes.
pub struct FileSystemSecretStore {
    root: PathBuf,
}

impl FileSystemSecretStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn new_with_default_secrets_dir() -> Self {
        Self::new(CSI_KMS_SECRETS_DIR_DEFAULT)
    }

    fn namespace_dir(&self, namespace: &str) -> PathBuf {
        if namespace.is_empty() {
            self.root.clone()
        } else {
            self.root.join(namespace)
        }
    }

    async fn read_secret(path: &Path) -> std::io::Result<String> {
        let content = tokio::fs::read_to_string(path).await?;
        Ok(content.trim_end_matches(['\r', '\n']).to_owned())
    }
}

fn load_error(path: &Path, e: std::io::Error) -> KmsError {
    KmsError::ConfigLoad(
        anyhow::Error::from(e).context(format!("Failed to read secret from: {path:?}")),
    )
}

#[async_trait]
impl SecretStore for FileSystemSecretStore {
    fn source_debug_string(&self) -> String {
        format!("filesystem: {:?}", self.root)
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<String> {
        // Secret names never contain path separators, reject them instead of escaping the root.
        if name.is_empty() || name.contains('/') || name == ".." || namespace.contains('/') {
            return Err(KmsError::SecretNotFound {
                namespace: namespace.to_owned(),
                name: name.to_owned(),
            });
        }

        let path = self.namespace_dir(namespace).join(name);
        match Self::read_secret(&path).await {
            Ok(secret) => Ok(secret),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(KmsError::SecretNotFound {
                namespace: namespace.to_owned(),
                name: name.to_owned(),
            }),
            Err(e) => Err(load_error(&path, e)),
        }
    }

    async fn get_secrets(&self, namespace: &str) -> Result<SecretsMap> {
        let dir = self.namespace_dir(namespace);
        let mut secrets = SecretsMap::new();

        tracing::debug!("Loading secrets from: {dir:?}");
        if namespace.contains('/') || !dir.is_dir() {
            tracing::debug!("Secrets directory not found, skip: {dir:?}");
            return Ok(secrets);
        }

        let mut entries = tokio::fs::read_dir(&dir).await.map_err(|e| load_error(&dir, e))?;
        while let Some(entry) = entries.next_entry().await.map_err(|e| load_error(&dir, e))? {
            let path = entry.path();
            // Mounted secret volumes carry hidden `..data` links next to the real keys.
            let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
                continue;
            };
            if name.starts_with('.') || !path.is_file() {
                continue;
            }

            let secret = Self::read_secret(&path).await.map_err(|e| load_error(&path, e))?;
            secrets.insert(name.to_owned(), secret);
        }

        Ok(secrets)
    }
}
