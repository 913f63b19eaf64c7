//! Sync/async bridging utilities.
//!
//! [`Portal`] runs a tokio runtime on a dedicated thread so synchronous code
//! can drive async work; [`unblock`] is the reverse direction, running
//! blocking closures from async code without stalling the runtime.

mod error;
mod portal;
mod unblock;

pub use error::PortalError;
pub use portal::{Portal, PortalFuture};
pub use unblock::unblock;
