use super::traits::{ProbeEvent, ProbeObserver};
use crate::websocket::SessionState;
use tracing::{error, info, warn};

/// Observer that reports probe events through `tracing`
///
/// # Examples
///
/// ```
/// use echoprobe::{StreamEchoProbe, TracingObserver};
/// use std::sync::Arc;
///
/// let probe = StreamEchoProbe::new("ws://127.0.0.1:8080/ws".parse().unwrap())
///     .unwrap()
///     .with_observer(Arc::new(TracingObserver));
/// ```
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl ProbeObserver for TracingObserver {
    fn notify(&self, event: ProbeEvent<'_>) {
        match event {
            ProbeEvent::Transition {
                target: endpoint,
                from,
                to,
            } => match to {
                SessionState::Connecting => info!(%endpoint, "Connecting"),
                SessionState::Open => info!(%endpoint, "Connected to the WebSocket server"),
                SessionState::Closed => info!(%endpoint, ?from, "Connection closed"),
                SessionState::Errored => warn!(%endpoint, ?from, "Connection errored"),
            },
            ProbeEvent::PayloadEchoed {
                target: endpoint,
                payload,
            } => {
                info!(%endpoint, size = payload.len(), preview = %payload, "Echoed payload");
            }
            ProbeEvent::EchoVerified {
                target: endpoint,
                payload,
            } => {
                info!(%endpoint, size = payload.len(), preview = %payload, "Echo verified");
            }
            ProbeEvent::ConnectFailed {
                target: endpoint,
                error,
            } => {
                error!(%endpoint, error = %error, "WebSocket connect failed");
            }
            ProbeEvent::Fault {
                target: endpoint,
                fault,
            } => {
                error!(%endpoint, error = %fault, "WebSocket error");
            }
            ProbeEvent::Outcome(outcome) => {
                let elapsed_ms = format!("{:.2}", outcome.elapsed_ms());
                match (outcome.body(), outcome.error()) {
                    (Some(body), _) => info!(
                        endpoint = %outcome.target(),
                        status = ?outcome.status(),
                        %body,
                        "Response data"
                    ),
                    (None, Some(err)) => error!(
                        endpoint = %outcome.target(),
                        kind = ?err.kind(),
                        error = %err,
                        "Request failed"
                    ),
                    (None, None) => {}
                }
                info!(endpoint = %outcome.target(), %elapsed_ms, "Request took {elapsed_ms} ms");
            }
        }
    }
}
