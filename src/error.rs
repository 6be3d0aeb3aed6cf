use thiserror::Error as ThisError;

use crate::clusters::fan_control::{ClusterStatus, EndpointId};

#[derive(ThisError, Debug)]
pub enum FanControlError {
    #[error("Invalid driver capabilities: {0}")]
    InvalidCapabilities(String),

    #[error("Endpoint {0} is not registered")]
    EndpointNotFound(EndpointId),

    #[error("Endpoint {0} is already registered")]
    EndpointAlreadyRegistered(EndpointId),

    #[error("Invalid action '{0}'")]
    InvalidAction(String),

    #[error("Request rejected: {0}")]
    Rejected(#[from] ClusterStatus),

    #[error(transparent)]
    IoError(#[from] std::io::Error),

    #[error(transparent)]
    SerdeJsonError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, FanControlError>;
