use std::path::PathBuf;

use clap::Parser;

use crate::build::CLAP_LONG_VERSION;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
#[clap(long_version = CLAP_LONG_VERSION)]
pub struct Cli {
    #[command(subcommand)]
    pub command: GlobalSubcommand,

    #[clap(long, short = 'c')]
    /// Path to the KMS configuration document. Default value is /etc/csi-kms/config.json.
    pub config_file: Option<PathBuf>,

    #[clap(long, short = 's')]
    /// Root directory of the tenants' secrets, laid out as <dir>/<tenant>/<name>. Default value is /etc/csi-kms/secrets.
    pub secrets_dir: Option<PathBuf>,
}

#[derive(Parser, Debug)]
pub enum GlobalSubcommand {
    /// Translate a KMS configuration in the standard VAULT_* convention.
    #[command(name = "transform")]
    Transform(TransformOptions),

    /// Show the effective configuration of a KMS for a tenant.
    #[command(name = "resolve")]
    Resolve(ResolveOptions),

    /// Check that a client can be built for every KMS in the configuration.
    #[command(name = "check")]
    Check(CheckOptions),

    /// List the KMS provider types compiled into this build.
    #[command(name = "providers")]
    Providers,
}

#[derive(Parser, Debug)]
pub struct TransformOptions {
    /// JSON or TOML file holding either a single KMS configuration or a map of KMS IDs to configurations.
    pub file: PathBuf,
}

#[derive(Parser, Debug)]
pub struct ResolveOptions {
    /// ID of the KMS in the configuration document.
    pub kms_id: String,

    /// Tenant to resolve the configuration for.
    #[clap(long, short = 't', default_value = "")]
    pub tenant: String,
}

#[derive(Parser, Debug)]
pub struct CheckOptions {
    /// Keep checking the remaining KMS configurations when an error is found.
    #[clap(long, default_value = "false")]
    pub keep_checking: bool,

    /// Tenant to build the KMS clients for.
    #[clap(long, short = 't', default_value = "")]
    pub tenant: String,
}
