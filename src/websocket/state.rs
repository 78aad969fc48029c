/// Lifecycle state of a WebSocket session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Connecting,
    Open,
    Closed,
    Errored,
}

/// Inputs that drive [`SessionState`] transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// The opening handshake completed
    HandshakeAccepted,
    /// The opening handshake failed
    HandshakeRejected,
    /// A data message arrived
    PayloadReceived,
    /// The transport faulted after the handshake
    TransportFault,
    /// The remote side sent a Close frame
    RemoteClosed,
    /// The local caller asked to close
    CloseRequested,
}

impl SessionState {
    /// Pure transition function
    ///
    /// Transport events never leave `Closed` or `Errored`. A local close
    /// request always lands in `Closed`.
    ///
    /// ```
    /// use echoprobe::websocket::{SessionEvent, SessionState};
    ///
    /// let state = SessionState::Connecting.on(SessionEvent::HandshakeAccepted);
    /// assert_eq!(state, SessionState::Open);
    /// assert_eq!(state.on(SessionEvent::TransportFault), SessionState::Errored);
    /// ```
    pub fn on(self, event: SessionEvent) -> SessionState {
        use SessionEvent::*;
        use SessionState::*;

        match (self, event) {
            (_, CloseRequested) => Closed,
            (Connecting, HandshakeAccepted) => Open,
            (Connecting, HandshakeRejected) => Errored,
            (Open, PayloadReceived) => Open,
            (Open, TransportFault) => Errored,
            (Open, RemoteClosed) => Closed,
            (state, _) => state,
        }
    }

    pub fn is_open(self) -> bool {
        self == SessionState::Open
    }

    /// `Closed` and `Errored` accept no further transport events
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Closed | SessionState::Errored)
    }
}
