use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

use neurawell_ai_client::{AiServiceClient, ClientConfig};

/// Prefix that asks the service to stream its thoughts for this turn
const THOUGHTS_PREFIX: &str = "/thoughts ";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();

    info!(
        "Starting NeuraWell AI client v{}",
        env!("CARGO_PKG_VERSION")
    );

    let config = ClientConfig::load()?;
    info!(
        http = %config.http.base_url,
        websocket = %config.websocket.base_url,
        user_id = %config.user_id,
        "Configuration loaded"
    );

    if config.metrics.enabled {
        PrometheusBuilder::new()
            .with_http_listener(config.metrics.listen)
            .install()?;
        info!(listen = %config.metrics.listen, "Prometheus exporter listening");
    }

    let client = AiServiceClient::new(&config)?;

    if !client.wait_for_service_default().await {
        error!("AI service did not become available");
        return Err("AI service unavailable".into());
    }

    match client.get_status().await {
        Ok(status) => info!(%status, "AI service status"),
        Err(e) => warn!(error = %e, "Could not read AI service status"),
    }

    client.connect_websocket(
        &config.user_id,
        |message| match message.get("response").and_then(|r| r.as_str()) {
            Some(response) => println!("ai> {}", response),
            None => println!("ai> {}", message),
        },
        |thoughts| println!("ai (thinking)> {}", thoughts),
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                let (text, include_thoughts) = match line.strip_prefix(THOUGHTS_PREFIX) {
                    Some(rest) => (rest.trim(), true),
                    None => (line.trim(), false),
                };
                if text.is_empty() {
                    continue;
                }
                if let Err(e) = client.send_websocket_message(text, include_thoughts) {
                    eprintln!("not sent: {}", e);
                }
            }
        }
    }

    client.disconnect_websocket();
    info!("Shutdown complete");
    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let format = fmt::format().with_target(true).compact();

    // Logs go to stderr so they do not interleave with the chat on stdout
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("neurawell_ai_client=info"));

    tracing_subscriber::registry()
        .with(fmt::layer().event_format(format).with_writer(std::io::stderr))
        .with(filter)
        .init();
}
