use speedprobe::config::app_config::load_config;
use speedprobe::{ProbeContext, Prober};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    dotenvy::dotenv().ok();

    // Logs go to stderr; stdout carries one JSON result per line.
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("speedprobe=info".parse()?),
        )
        .init();

    let app = load_config()?;
    if app.targets.is_empty() {
        tracing::warn!("No targets configured, set `targets` in the config file or PROBE_TARGETS");
        return Ok(());
    }

    tracing::info!(
        "Downloading {} bytes per target, SNI {}, Host {}",
        app.download.bytes,
        app.download.sni,
        app.download.host_name
    );
    let prober = Prober::new(app.download)?;

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Interrupted, cancelling");
                shutdown.cancel();
            }
        });
    }

    for ip in app.targets {
        let ctx = ProbeContext::new().with_cancellation(shutdown.child_token());
        let result = prober.download(&ctx, ip).await;

        if result.ok {
            tracing::info!("✅ {ip}: {:.2} Mbps ({} bytes in {}ms)", result.mbps, result.bytes, result.total_ms);
        } else {
            tracing::warn!("❌ {ip}: {}", result.error);
        }
        println!("{}", serde_json::to_string(&result)?);

        if shutdown.is_cancelled() {
            break;
        }
    }

    Ok(())
}
