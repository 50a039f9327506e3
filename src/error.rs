//! Error types for p2pfile
//!
//! Every failure the session controller and its helpers can produce is a
//! variant of [`P2pError`]. Variants are grouped into coarse
//! [`ErrorCategory`] values that decide how the controller cleans up.

use std::fmt;

/// Result alias used throughout the library
pub type Result<T> = std::result::Result<T, P2pError>;

/// Coarse failure classes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Invalid combination of settings, rejected before anything is opened
    ConfigConflict,
    /// Port, address, target or session acquisition failed
    ResourceAcquisitionFailure,
    /// The engine refused to add or resume the transfer
    TransferFailure,
    /// Stopping the transfer failed
    RuntimeStopFailure,
    /// The engine stopped on its own and reported an error
    AsyncStopWithError,
}

/// Error type for transfer operations
#[derive(Debug, Clone)]
pub enum P2pError {
    /// Mutually exclusive settings were combined
    ConfigConflict {
        message: String,
    },

    /// Port range string could not be parsed or is reversed
    PortRangeInvalid {
        range: String,
    },

    /// No port in the range could be bound for both UDP and TCP
    NoPortAvailable {
        range: String,
    },

    /// Explicit IP address is malformed
    InvalidAddress {
        address: String,
    },

    /// A configured bootstrap peer did not resolve
    PeerAddressUnresolved {
        peer: String,
        source: Option<String>,
    },

    /// Target could not be read (missing file, failed fetch)
    TargetUnreadable {
        target: String,
        source: Option<String>,
    },

    /// Target was read but is not a valid magnet, torrent or info-hash
    TargetInvalid {
        target: String,
        message: String,
    },

    /// Stale resume file could not be removed
    ResumeFileDeleteError {
        path: String,
        source: Option<String>,
    },

    /// Address detection or session open failed
    ResourceAcquisition {
        message: String,
        source: Option<String>,
    },

    /// Engine failed to add or resume the torrent
    TransferFailure {
        message: String,
        source: Option<String>,
    },

    /// Engine failed to stop the torrent
    RuntimeStopFailure {
        message: String,
        source: Option<String>,
    },

    /// Engine reported an asynchronous stop carrying an error
    AsyncStopWithError {
        source: String,
    },

    /// Metainfo could not be built or written
    MetainfoError {
        message: String,
        path: Option<String>,
        source: Option<String>,
    },
}

impl P2pError {
    /// Create a new ConfigConflict
    pub fn config_conflict(message: impl Into<String>) -> Self {
        P2pError::ConfigConflict {
            message: message.into(),
        }
    }

    pub fn port_range_invalid(range: impl Into<String>) -> Self {
        P2pError::PortRangeInvalid { range: range.into() }
    }

    pub fn no_port_available(range: impl Into<String>) -> Self {
        P2pError::NoPortAvailable { range: range.into() }
    }

    pub fn invalid_address(address: impl Into<String>) -> Self {
        P2pError::InvalidAddress {
            address: address.into(),
        }
    }

    /// Create a new PeerAddressUnresolved naming the offending peer
    pub fn peer_unresolved(peer: impl Into<String>, source: impl Into<String>) -> Self {
        P2pError::PeerAddressUnresolved {
            peer: peer.into(),
            source: Some(source.into()),
        }
    }

    pub fn target_unreadable(target: impl Into<String>, source: impl Into<String>) -> Self {
        P2pError::TargetUnreadable {
            target: target.into(),
            source: Some(source.into()),
        }
    }

    pub fn target_invalid(target: impl Into<String>, message: impl Into<String>) -> Self {
        P2pError::TargetInvalid {
            target: target.into(),
            message: message.into(),
        }
    }

    pub fn resume_delete(path: impl Into<String>, source: impl Into<String>) -> Self {
        P2pError::ResumeFileDeleteError {
            path: path.into(),
            source: Some(source.into()),
        }
    }

    /// Create a new ResourceAcquisition error with source
    pub fn resource(message: impl Into<String>, source: impl Into<String>) -> Self {
        P2pError::ResourceAcquisition {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub fn transfer(message: impl Into<String>, source: impl Into<String>) -> Self {
        P2pError::TransferFailure {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub fn stop_failure(message: impl Into<String>, source: impl Into<String>) -> Self {
        P2pError::RuntimeStopFailure {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub fn async_stop(source: impl Into<String>) -> Self {
        P2pError::AsyncStopWithError {
            source: source.into(),
        }
    }

    /// Create a new MetainfoError
    pub fn metainfo(message: impl Into<String>) -> Self {
        P2pError::MetainfoError {
            message: message.into(),
            path: None,
            source: None,
        }
    }

    /// Create a new MetainfoError with path and source
    pub fn metainfo_full(message: impl Into<String>, path: impl Into<String>, source: impl Into<String>) -> Self {
        P2pError::MetainfoError {
            message: message.into(),
            path: Some(path.into()),
            source: Some(source.into()),
        }
    }

    /// The cleanup class this error belongs to
    pub fn category(&self) -> ErrorCategory {
        match self {
            P2pError::ConfigConflict { .. } => ErrorCategory::ConfigConflict,
            P2pError::TransferFailure { .. } => ErrorCategory::TransferFailure,
            P2pError::RuntimeStopFailure { .. } => ErrorCategory::RuntimeStopFailure,
            P2pError::AsyncStopWithError { .. } => ErrorCategory::AsyncStopWithError,
            _ => ErrorCategory::ResourceAcquisitionFailure,
        }
    }

}

fn with_source(f: &mut fmt::Formatter<'_>, head: fmt::Arguments<'_>, source: &Option<String>) -> fmt::Result {
    match source {
        Some(src) => write!(f, "{} (source: {})", head, src),
        None => write!(f, "{}", head),
    }
}

impl fmt::Display for P2pError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            P2pError::ConfigConflict { message } => write!(f, "Config conflict: {}", message),
            P2pError::PortRangeInvalid { range } => write!(f, "Invalid port range specified: {:?}", range),
            P2pError::NoPortAvailable { range } => write!(f, "No available ports in range: {}", range),
            P2pError::InvalidAddress { address } => write!(f, "Invalid IP address: {:?}", address),
            P2pError::PeerAddressUnresolved { peer, source } => {
                with_source(f, format_args!("Cannot resolve peer address: {}", peer), source)
            }
            P2pError::TargetUnreadable { target, source } => {
                with_source(f, format_args!("Cannot read target: {}", target), source)
            }
            P2pError::TargetInvalid { target, message } => {
                write!(f, "Invalid target {}: {}", target, message)
            }
            P2pError::ResumeFileDeleteError { path, source } => {
                with_source(f, format_args!("Cannot delete resume file: {}", path), source)
            }
            P2pError::ResourceAcquisition { message, source } => {
                with_source(f, format_args!("Resource error: {}", message), source)
            }
            P2pError::TransferFailure { message, source } => {
                with_source(f, format_args!("Transfer error: {}", message), source)
            }
            P2pError::RuntimeStopFailure { message, source } => {
                with_source(f, format_args!("Stop error: {}", message), source)
            }
            P2pError::AsyncStopWithError { source } => write!(f, "Torrent stopped with error: {}", source),
            P2pError::MetainfoError { message, path, source } => match (path, source) {
                (Some(p), Some(s)) => write!(f, "Metainfo error: {} (path: {}, source: {})", message, p, s),
                (Some(p), None) => write!(f, "Metainfo error: {} (path: {})", message, p),
                (None, Some(s)) => write!(f, "Metainfo error: {} (source: {})", message, s),
                (None, None) => write!(f, "Metainfo error: {}", message),
            },
        }
    }
}

impl std::error::Error for P2pError {}

impl From<serde_bencode::Error> for P2pError {
    fn from(err: serde_bencode::Error) -> Self {
        P2pError::MetainfoError {
            message: "Failed to encode bencode data".to_string(),
            path: None,
            source: Some(err.to_string()),
        }
    }
}
