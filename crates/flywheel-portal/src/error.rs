//! Error types for the portal.

use thiserror::Error;

/// Errors that can occur in portal operations.
#[derive(Debug, Error)]
pub enum PortalError {
    /// The runtime thread could not be started.
    #[error("failed to start portal runtime: {0}")]
    Spawn(#[from] std::io::Error),

    /// The portal shut down before the result was delivered.
    #[error("portal is closed")]
    Closed,
}
