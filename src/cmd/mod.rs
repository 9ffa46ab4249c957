use anyhow::Result;
use async_trait::async_trait;

use crate::manager::KmsManager;

pub mod check;
pub mod providers;
pub mod resolve;
pub mod transform;

#[async_trait]
pub trait Command {
    async fn run(&self, manager: &KmsManager) -> Result<()>;
}

pub trait IntoCommand {
    fn into_command(self) -> Box<dyn Command>;
}

impl IntoCommand for crate::cli::GlobalSubcommand {
    fn into_command(self) -> Box<dyn Command> {
        match self {
            crate::cli::GlobalSubcommand::Transform(transform_options) => {
                Box::new(transform::TransformCommand { transform_options })
            }
            crate::cli::GlobalSubcommand::Resolve(resolve_options) => {
                Box::new(resolve::ResolveCommand { resolve_options })
            }
            crate::cli::GlobalSubcommand::Check(check_options) => {
                Box::new(check::CheckCommand { check_options })
            }
            crate::cli::GlobalSubcommand::Providers => Box::new(providers::ProvidersCommand {}),
        }
    }
}
