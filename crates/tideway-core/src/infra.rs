//! Infrastructure lifecycle contract
//!
//! Provisioning of backing resources happens outside the processor runtime;
//! a deployment layer drives this contract before `run` is called. The core
//! pull/process/push path never touches it.

use crate::error::Result;
use async_trait::async_trait;
use std::fmt;

/// Current state of an infrastructure runner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfraStatus {
    Idle,
    Planning,
    Applying,
    Destroying,
}

impl fmt::Display for InfraStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Planning => write!(f, "planning"),
            Self::Applying => write!(f, "applying"),
            Self::Destroying => write!(f, "destroying"),
        }
    }
}

/// Trait for infrastructure lifecycle collaborators
#[async_trait]
pub trait InfraLifecycle: Send + Sync {
    /// Compute the changes that `apply` would make
    async fn plan(&self) -> Result<()>;

    /// Apply the planned changes to the infrastructure
    async fn apply(&self) -> Result<()>;

    /// Tear the infrastructure down
    async fn destroy(&self) -> Result<()>;

    /// The runner's current state
    async fn status(&self) -> InfraStatus;
}
