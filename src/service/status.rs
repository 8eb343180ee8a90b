use crate::error::SupportError;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle status of a service. Variants are ordered by lifecycle progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
    New,
    Initializing,
    Initialized,
    Starting,
    Started,
    Suspending,
    Suspended,
    Stopping,
    Stopped,
    ShuttingDown,
    Shutdown,
    Failed,
}

impl ServiceStatus {
    pub fn is_new(self) -> bool {
        self == Self::New
    }

    pub fn is_init(self) -> bool {
        self == Self::Initialized
    }

    pub fn is_starting(self) -> bool {
        self == Self::Starting
    }

    pub fn is_started(self) -> bool {
        self == Self::Started
    }

    pub fn is_suspending(self) -> bool {
        self == Self::Suspending
    }

    pub fn is_suspended(self) -> bool {
        self == Self::Suspended
    }

    pub fn is_stopping(self) -> bool {
        self == Self::Stopping
    }

    /// Not running: never started, stopped, shut down or failed
    pub fn is_stopped(self) -> bool {
        self < Self::Starting || self > Self::Stopping
    }

    pub fn is_shutdown(self) -> bool {
        self == Self::Shutdown
    }

    pub fn is_failed(self) -> bool {
        self == Self::Failed
    }

    /// Between initialized and suspended, inclusive
    pub fn is_run_allowed(self) -> bool {
        self >= Self::Initialized && self <= Self::Suspended
    }
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::New => "new",
            Self::Initializing => "initializing",
            Self::Initialized => "initialized",
            Self::Starting => "starting",
            Self::Started => "started",
            Self::Suspending => "suspending",
            Self::Suspended => "suspended",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::ShuttingDown => "shutting_down",
            Self::Shutdown => "shutdown",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

impl FromStr for ServiceStatus {
    type Err = SupportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(Self::New),
            "initializing" => Ok(Self::Initializing),
            "initialized" => Ok(Self::Initialized),
            "starting" => Ok(Self::Starting),
            "started" => Ok(Self::Started),
            "suspending" => Ok(Self::Suspending),
            "suspended" => Ok(Self::Suspended),
            "stopping" => Ok(Self::Stopping),
            "stopped" => Ok(Self::Stopped),
            "shutting_down" => Ok(Self::ShuttingDown),
            "shutdown" => Ok(Self::Shutdown),
            "failed" => Ok(Self::Failed),
            _ => Err(SupportError::InvalidState(format!(
                "Unknown service status: {s}"
            ))),
        }
    }
}

/// Thread-safe status holder embedded in every service.
///
/// Transitions are serialized through an async lock so concurrent
/// `start`/`stop` calls run one after the other.
#[derive(Debug)]
pub struct ServiceState {
    status: RwLock<ServiceStatus>,
    transition: tokio::sync::Mutex<()>,
}

impl ServiceState {
    pub fn new() -> Self {
        Self {
            status: RwLock::new(ServiceStatus::New),
            transition: tokio::sync::Mutex::new(()),
        }
    }

    pub fn status(&self) -> ServiceStatus {
        *self.status.read()
    }

    pub fn set_status(&self, status: ServiceStatus) {
        *self.status.write() = status;
    }

    pub(crate) async fn lock_transition(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.transition.lock().await
    }
}

impl Default for ServiceState {
    fn default() -> Self {
        Self::new()
    }
}
