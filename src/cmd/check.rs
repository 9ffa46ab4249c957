use anyhow::{bail, Context as _, Result};
use async_trait::async_trait;
use tracing::Instrument;

use crate::{cli::CheckOptions, manager::KmsManager};

pub struct CheckCommand {
    pub check_options: CheckOptions,
}

#[async_trait]
impl super::Command for CheckCommand {
    async fn run(&self, manager: &KmsManager) -> Result<()> {
        let mut is_error = false;

        macro_rules! continue_or_throw {
            ($error:expr) => ({
                is_error = true;
                if self.check_options.keep_checking {
                    tracing::error!(error=?$error);
                } else {
                    anyhow::bail!($error);
                }
            });
        }

        let config_source = manager.config_source();
        let tenant = &self.check_options.tenant;

        // Check if config can be loaded
        tracing::info!("Load config from {}", config_source.source_debug_string());
        let config = config_source
            .get_config()
            .await
            .context("Load config failed")?;

        tracing::info!("Checking {} KMS configurations", config.len());

        for kms_id in config.keys() {
            async {
                tracing::info!("Checking configuration of KMS \"{kms_id}\"");

                match manager.get_kms(tenant, kms_id, None).await {
                    Ok(kms) => {
                        tracing::info!("KMS \"{kms_id}\" is usable: {}", kms.debug_name())
                    }
                    Err(error) => {
                        let kind = error.kind();
                        continue_or_throw!(anyhow::Error::from(error).context(format!(
                            "KMS \"{kms_id}\" cannot be initialized for tenant {tenant:?} ({kind} error)"
                        )))
                    }
                }

                Ok(())
            }
            .instrument(tracing::info_span!("check-kms", kms_id = kms_id.as_str()))
            .await?;
        }

        if is_error {
            bail!("Config check failed, please check the errors above")
        } else {
            tracing::info!("Config check passed")
        }

        Ok(())
    }
}
