//! Connection lifecycle as seen by consumers.

use serde::Serialize;

/// Public connection status of the price stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    /// A transport is being opened.
    Connecting,
    /// Transport open, messages flowing.
    Connected,
    /// No transport; a retry may be pending.
    Disconnected,
    /// Reconnect budget exhausted (terminal until the next `connect()`).
    Error,
}

impl ConnectionStatus {
    /// All statuses, for exporting one gauge per label.
    pub const ALL: [Self; 4] = [
        Self::Connecting,
        Self::Connected,
        Self::Disconnected,
        Self::Error,
    ];

    /// Lowercase label, matching the serialized form.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
