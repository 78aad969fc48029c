use crate::network::Endpoint;
use crate::request::RequestOutcome;
use crate::websocket::{Payload, SessionState};
use crate::{ConnectionError, TransportFault};

/// Lifecycle and outcome notifications emitted by the probes
#[derive(Debug, Clone, Copy)]
pub enum ProbeEvent<'a> {
    /// A session moved between lifecycle states
    Transition {
        target: &'a Endpoint,
        from: SessionState,
        to: SessionState,
    },
    /// An inbound payload was bounced back to the remote side
    PayloadEchoed {
        target: &'a Endpoint,
        payload: &'a Payload,
    },
    /// The remote side returned a round-trip payload unchanged
    EchoVerified {
        target: &'a Endpoint,
        payload: &'a Payload,
    },
    /// Opening a session failed; no session exists
    ConnectFailed {
        target: &'a Endpoint,
        error: &'a ConnectionError,
    },
    /// An open session faulted
    Fault {
        target: &'a Endpoint,
        fault: &'a TransportFault,
    },
    /// A request/response exchange was finalized
    Outcome(&'a RequestOutcome),
}

/// External collaborator that accepts probe events
///
/// Observers see every event but cannot influence probe state.
pub trait ProbeObserver: Send + Sync {
    fn notify(&self, event: ProbeEvent<'_>);
}

/// Observer that discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl ProbeObserver for NullObserver {
    fn notify(&self, _event: ProbeEvent<'_>) {}
}
