//! Interaction statuses returned by attribute writes and commands.
//!
//! A status has two levels: the generic interaction-model status and, for
//! feature-specific rejections, a cluster-specific code carried alongside a
//! generic `Failure`. Callers can therefore tell a range violation
//! (`ConstraintError`) from a missing capability (`UnsupportedPattern`).

use strum::FromRepr;
use thiserror::Error;

/// Generic interaction-model status codes used by this cluster.
#[derive(Clone, Copy, Debug, Eq, PartialEq, FromRepr)]
#[repr(u8)]
pub enum ImStatus {
    Success = 0x00,
    Failure = 0x01,
    UnsupportedEndpoint = 0x7F,
    UnsupportedCommand = 0x81,
    InvalidCommand = 0x85,
    UnsupportedAttribute = 0x86,
    ConstraintError = 0x87,
    UnsupportedWrite = 0x88,
    InvalidInState = 0xCB,
}

/// Fan Control cluster-specific status codes.
#[derive(Clone, Copy, Debug, Eq, PartialEq, FromRepr)]
#[repr(u8)]
pub enum FanControlStatusCode {
    /// The requested motion pattern is not supported by the device
    UnsupportedPattern = 0x02,
}

/// A rejected attribute write or command.
#[derive(Error, Clone, Copy, Debug, Eq, PartialEq)]
pub enum ClusterStatus {
    #[error("generic failure")]
    Failure,

    #[error("unsupported endpoint")]
    UnsupportedEndpoint,

    #[error("unsupported command")]
    UnsupportedCommand,

    #[error("invalid command")]
    InvalidCommand,

    #[error("unsupported attribute")]
    UnsupportedAttribute,

    #[error("constraint error")]
    ConstraintError,

    #[error("unsupported write")]
    UnsupportedWrite,

    #[error("invalid in state")]
    InvalidInState,

    #[error("cluster-specific failure: {0:?}")]
    ClusterSpecific(FanControlStatusCode),
}

impl ClusterStatus {
    pub fn cluster_specific(code: FanControlStatusCode) -> Self {
        ClusterStatus::ClusterSpecific(code)
    }

    /// The generic status to put on the wire.
    pub fn im_status(&self) -> ImStatus {
        match self {
            ClusterStatus::Failure | ClusterStatus::ClusterSpecific(_) => ImStatus::Failure,
            ClusterStatus::UnsupportedEndpoint => ImStatus::UnsupportedEndpoint,
            ClusterStatus::UnsupportedCommand => ImStatus::UnsupportedCommand,
            ClusterStatus::InvalidCommand => ImStatus::InvalidCommand,
            ClusterStatus::UnsupportedAttribute => ImStatus::UnsupportedAttribute,
            ClusterStatus::ConstraintError => ImStatus::ConstraintError,
            ClusterStatus::UnsupportedWrite => ImStatus::UnsupportedWrite,
            ClusterStatus::InvalidInState => ImStatus::InvalidInState,
        }
    }

    /// The cluster-specific code, if this is a cluster-specific failure.
    pub fn cluster_code(&self) -> Option<FanControlStatusCode> {
        match self {
            ClusterStatus::ClusterSpecific(code) => Some(*code),
            _ => None,
        }
    }
}

/// Result of an attribute write or command invocation.
pub type ClusterResult<T = ()> = Result<T, ClusterStatus>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cluster_specific_is_generic_failure() {
        let status = ClusterStatus::cluster_specific(FanControlStatusCode::UnsupportedPattern);
        assert_eq!(status.im_status(), ImStatus::Failure);
        assert_eq!(
            status.cluster_code(),
            Some(FanControlStatusCode::UnsupportedPattern)
        );
    }

    #[test]
    fn test_generic_status_has_no_cluster_code() {
        assert_eq!(
            ClusterStatus::ConstraintError.im_status(),
            ImStatus::ConstraintError
        );
        assert_eq!(ClusterStatus::ConstraintError.cluster_code(), None);
        assert_eq!(ImStatus::ConstraintError as u8, 0x87);
    }
}
