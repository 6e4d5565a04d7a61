use std::sync::Arc;

use anyhow::Context;

use channel_relay::channels::{Channel, Outbound, TelegramChannel};
use channel_relay::config::RelayConfig;
use channel_relay::relay::{AlbumAggregator, DeliveryPipeline, Relay};
use channel_relay::template::persistence::load_or_default;
use channel_relay::template::{JsonTemplateFile, TemplateStore, TemplateUpdateHandler};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = RelayConfig::from_env().context("invalid relay configuration")?;

    eprintln!("📡 Channel Relay v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Destination: {}", config.channel_id);
    eprintln!("   Operator: {}", config.admin_id);
    eprintln!("   Album window: {}ms", config.album_latency.as_millis());

    // ── Template ────────────────────────────────────────────────────────
    let persistence = Arc::new(JsonTemplateFile::new(config.template_file.clone()));
    let template = load_or_default(persistence.as_ref()).await;
    eprintln!(
        "   Template: {} ({})",
        persistence.path().display(),
        if template.is_identity() {
            "identity".to_string()
        } else {
            format!("{:?}", template.pattern())
        }
    );
    let store = TemplateStore::new(template);

    // ── Telegram ────────────────────────────────────────────────────────
    let telegram = Arc::new(
        TelegramChannel::new(config.bot_token.clone())
            .with_api_base(config.api_base.clone())
            .with_skip_updates(config.skip_updates),
    );
    telegram
        .health_check()
        .await
        .context("Telegram health check failed")?;
    let outbound: Arc<dyn Outbound> = telegram.clone();

    // ── Relay ───────────────────────────────────────────────────────────
    let relay = Relay::new(
        AlbumAggregator::new(config.album_latency),
        DeliveryPipeline::new(Arc::clone(&outbound), Arc::clone(&store), &config.channel_id),
        TemplateUpdateHandler::new(config.admin_id, store, persistence),
        outbound,
    );

    let stream = telegram.start().await?;
    eprintln!("   Listening. Ctrl-C to stop.\n");

    tokio::select! {
        _ = relay.run(stream) => {}
        result = tokio::signal::ctrl_c() => {
            result.context("failed to listen for Ctrl-C")?;
            tracing::info!("Ctrl-C received");
        }
    }

    telegram.shutdown().await?;
    Ok(())
}
