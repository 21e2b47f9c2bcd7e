#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fluxpoint_lib::run().await
}
