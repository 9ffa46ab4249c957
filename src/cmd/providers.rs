use anyhow::Result;
use async_trait::async_trait;
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, ContentArrangement, Table};

use crate::manager::KmsManager;

pub struct ProvidersCommand {}

#[async_trait]
impl super::Command for ProvidersCommand {
    async fn run(&self, manager: &KmsManager) -> Result<()> {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .apply_modifier(UTF8_ROUND_CORNERS)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(vec!["KMS Provider Type"]);

        for provider_type in manager.registry().provider_types() {
            table.add_row(vec![provider_type]);
        }

        println!("{table}");
        Ok(())
    }
}
