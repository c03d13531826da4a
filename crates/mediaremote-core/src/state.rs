//! Connection lifecycle state.

/// Connection state, shared by the AirPlay and Companion transports.
///
/// Transitions are monotonic toward `Ready` or `Closing`; a connection
/// never moves backwards except through `Closing` to `Disconnected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConnectionState {
    Disconnected,
    TcpOpen,
    VerifyInProgress,
    VerifyComplete,
    SetupInProgress,
    Ready,
    Closing,
}

impl ConnectionState {
    /// Whether the connection can carry application traffic.
    pub fn is_ready(self) -> bool {
        self == Self::Ready
    }

    /// Whether the connection is torn down or tearing down.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Closing | Self::Disconnected)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::TcpOpen => "tcp-open",
            Self::VerifyInProgress => "verify-in-progress",
            Self::VerifyComplete => "verify-complete",
            Self::SetupInProgress => "setup-in-progress",
            Self::Ready => "ready",
            Self::Closing => "closing",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_is_monotonic_toward_ready() {
        assert!(ConnectionState::TcpOpen < ConnectionState::VerifyInProgress);
        assert!(ConnectionState::VerifyInProgress < ConnectionState::VerifyComplete);
        assert!(ConnectionState::VerifyComplete < ConnectionState::SetupInProgress);
        assert!(ConnectionState::SetupInProgress < ConnectionState::Ready);
    }

    #[test]
    fn terminal_states() {
        assert!(ConnectionState::Closing.is_terminal());
        assert!(ConnectionState::Disconnected.is_terminal());
        assert!(!ConnectionState::Ready.is_terminal());
        assert!(ConnectionState::Ready.is_ready());
    }
}
