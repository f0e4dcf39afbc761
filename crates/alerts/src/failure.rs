use std::fmt;

/// Why the relay closed a node session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Reading from the transport failed.
    ConnectError,
    /// The frame envelope could not be decoded.
    ConnectTypeError,
    /// The `hello` payload could not be decoded.
    AuthParseError,
    /// The `hello` secret did not match.
    AuthLoginSecretError,
    /// The `hello` id is bound to another live session.
    AuthLoginSameNodeIdError,
    /// Sending the login reply failed.
    AuthLoginRespError,
    /// Too many malformed `node-ping` payloads in a row.
    PingError,
    /// The node reported its chain process as stopped.
    PingStopError,
}

impl FailureKind {
    /// Stable identifier, used in logs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ConnectError => "ConnectError",
            Self::ConnectTypeError => "ConnectTypeError",
            Self::AuthParseError => "AuthParseError",
            Self::AuthLoginSecretError => "AuthLoginSecretError",
            Self::AuthLoginSameNodeIdError => "AuthLoginSameNodeIDError",
            Self::AuthLoginRespError => "AuthLoginRespError",
            Self::PingError => "PingError",
            Self::PingStopError => "PingStopError",
        }
    }

    /// Human-readable description used as alert text.
    #[must_use]
    pub const fn description(&self) -> &'static str {
        match self {
            Self::ConnectError => "connection lost",
            Self::ConnectTypeError => "sent an undecodable message",
            Self::AuthParseError => "sent an unreadable login",
            Self::AuthLoginSecretError => "failed login: invalid secret",
            Self::AuthLoginSameNodeIdError => "failed login: id already in use",
            Self::AuthLoginRespError => "could not be answered during login",
            Self::PingError => "ping error",
            Self::PingStopError => "process stopped",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
