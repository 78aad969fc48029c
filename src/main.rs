use color_eyre::eyre::{Result, WrapErr, eyre};
use echoprobe::network::{DEFAULT_HTTP_ENDPOINT, DEFAULT_WS_ENDPOINT};
use echoprobe::{
    Endpoint, RequestProbe, RequestProbeConfig, StreamEchoProbe, StreamProbeConfig,
};
use serde_json::json;
use std::time::Duration;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Initialize error handling
    color_eyre::install()?;

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("echoprobe=info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();

    // Default to the WebSocket probe if no mode specified
    let mode = args
        .get(1)
        .map(|s| s.to_lowercase())
        .unwrap_or_else(|| "ws".to_string());
    let uri = args.get(2);
    let timeout = args
        .get(3)
        .map(|ms| ms.parse::<u64>().map(Duration::from_millis))
        .transpose()
        .wrap_err("timeout_ms must be a whole number of milliseconds")?;

    match mode.as_str() {
        "ws" => {
            let endpoint: Endpoint = uri
                .map(String::as_str)
                .unwrap_or(DEFAULT_WS_ENDPOINT)
                .parse()
                .wrap_err("Invalid WebSocket endpoint")?;
            let mut config = StreamProbeConfig::default();
            config.connect_timeout = timeout;
            config.read_timeout = timeout;

            info!(endpoint = %endpoint, "Starting WebSocket echo probe");
            let probe = StreamEchoProbe::new(endpoint)
                .wrap_err("Invalid WebSocket endpoint")?
                .with_config(config);
            let mut session = probe
                .connect()
                .await
                .wrap_err("Failed to open WebSocket session")?;

            let finished = tokio::select! {
                result = session.run_echo_loop() => Some(result),
                _ = signal::ctrl_c() => None,
            };
            match finished {
                Some(result) => {
                    let echoed = result.wrap_err("WebSocket session failed")?;
                    info!(echoed, "Remote side closed the session");
                }
                None => {
                    info!("Received shutdown signal, closing session");
                    session.close().await;
                }
            }
        }
        "http" => {
            let endpoint: Endpoint = uri
                .map(String::as_str)
                .unwrap_or(DEFAULT_HTTP_ENDPOINT)
                .parse()
                .wrap_err("Invalid HTTP endpoint")?;
            let mut config = RequestProbeConfig::default();
            config.timeout = timeout;

            info!(endpoint = %endpoint, "Starting request probe");
            let outcome = RequestProbe::new(endpoint)
                .wrap_err("Invalid HTTP endpoint")?
                .with_config(config)
                .send(&json!({ "hello": "dsad" }))
                .await;
            let elapsed_ms = outcome.elapsed_ms();
            outcome
                .into_result()
                .wrap_err_with(|| format!("Request failed after {elapsed_ms:.2} ms"))?;
        }
        _ => {
            eprintln!("Usage: {} [ws|http] [uri] [timeout_ms]", args[0]);
            eprintln!("  ws|http:    Probe to run (default: ws)");
            eprintln!("  uri:        Target endpoint (default: {DEFAULT_WS_ENDPOINT} or {DEFAULT_HTTP_ENDPOINT})");
            eprintln!("  timeout_ms: Give up after this long instead of waiting forever");
            eprintln!();
            eprintln!("Examples:");
            eprintln!("  {} ws                                   # Bounce messages from the default server", args[0]);
            eprintln!("  {} ws ws://127.0.0.1:9000/ws            # Bounce messages from another server", args[0]);
            eprintln!("  {} http http://localhost:8080/api/x 5000 # POST once, fail after 5 seconds", args[0]);
            return Err(eyre!("unknown probe {mode:?}"));
        }
    }

    Ok(())
}
