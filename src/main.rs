#[tokio::main]
async fn main() -> anyhow::Result<()> {
    csi_kms::run().await
}
