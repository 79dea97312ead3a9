#[tokio::main]
async fn main() -> voicebridge::error::Result<()> {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("voicebridge=info,serenity=warn,songbird=warn"),
    )
    .init();
    log::info!("Starting voicebridge Discord bot");

    match voicebridge::run().await {
        Ok(()) => {
            log::info!("Bot shut down successfully");
            Ok(())
        }
        Err(e) => {
            log::error!("Bot encountered an error: {}", e);
            Err(e)
        }
    }
}
