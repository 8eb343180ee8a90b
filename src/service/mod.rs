//! # Service Lifecycle
//!
//! Init / start / stop / suspend / resume / shutdown plumbing shared by
//! consumers, producers, the reload strategy and the context itself.
//!
//! ## Overview
//!
//! Implementors provide the `do_*` hooks of [`Service`]; the guarded
//! transitions live in [`ServiceExt`], which every service gets for free.
//!
//! ```text
//! New ─init─> Initialized ─start─> Started ─suspend─> Suspended
//!                                    │  <──resume──────┘
//!                                    └─stop─> Stopped ─shutdown─> Shutdown
//! any hook failure during start/stop ─> Failed
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use async_trait::async_trait;
//! use conduit_support::service::{Service, ServiceExt, ServiceState};
//!
//! struct Heartbeat {
//!     state: ServiceState,
//! }
//!
//! #[async_trait]
//! impl Service for Heartbeat {
//!     fn service_name(&self) -> &str {
//!         "heartbeat"
//!     }
//!
//!     fn service_state(&self) -> &ServiceState {
//!         &self.state
//!     }
//! }
//!
//! # tokio_test::block_on(async {
//! let service = Heartbeat { state: ServiceState::new() };
//! service.start().await.unwrap();
//! assert!(service.is_started());
//! service.shutdown().await.unwrap();
//! # });
//! ```

pub mod service_helper;
mod status;

pub use status::{ServiceState, ServiceStatus};

use crate::error::{SupportError, SupportResult};
use crate::logging::{log_error, log_service_operation};
use async_trait::async_trait;
use tracing::debug;

/// A component with a managed lifecycle
#[async_trait]
pub trait Service: Send + Sync {
    fn service_name(&self) -> &str;

    fn service_state(&self) -> &ServiceState;

    async fn do_init(&self) -> SupportResult<()> {
        Ok(())
    }

    async fn do_start(&self) -> SupportResult<()> {
        Ok(())
    }

    async fn do_stop(&self) -> SupportResult<()> {
        Ok(())
    }

    async fn do_suspend(&self) -> SupportResult<()> {
        Ok(())
    }

    async fn do_resume(&self) -> SupportResult<()> {
        Ok(())
    }

    async fn do_shutdown(&self) -> SupportResult<()> {
        Ok(())
    }

    /// Called after a failed start or stop
    async fn do_fail(&self, _error: &SupportError) {}
}

/// Guarded lifecycle transitions for every [`Service`]
#[async_trait]
pub trait ServiceExt: Service {
    fn status(&self) -> ServiceStatus {
        self.service_state().status()
    }

    fn is_started(&self) -> bool {
        self.status().is_started()
    }

    fn is_stopped(&self) -> bool {
        self.status().is_stopped()
    }

    fn is_suspended(&self) -> bool {
        self.status().is_suspended()
    }

    fn is_run_allowed(&self) -> bool {
        self.status().is_run_allowed()
    }

    /// Run `do_init` once
    async fn init(&self) -> SupportResult<()> {
        let _guard = self.service_state().lock_transition().await;
        init_locked(self).await
    }

    async fn start(&self) -> SupportResult<()> {
        let state = self.service_state();
        let _guard = state.lock_transition().await;
        let status = state.status();
        if status.is_started() || status.is_starting() {
            debug!(service = %self.service_name(), "Service already started");
            return Ok(());
        }

        init_locked(self).await?;

        state.set_status(ServiceStatus::Starting);
        match self.do_start().await {
            Ok(()) => {
                state.set_status(ServiceStatus::Started);
                log_service_operation("start", self.service_name(), "started", None);
                Ok(())
            }
            Err(error) => {
                fail(self, "start", &error).await;
                Err(error)
            }
        }
    }

    async fn stop(&self) -> SupportResult<()> {
        let state = self.service_state();
        let _guard = state.lock_transition().await;
        stop_locked(self).await
    }

    /// Suspend a started service; other states are left untouched
    async fn suspend(&self) -> SupportResult<()> {
        let state = self.service_state();
        let _guard = state.lock_transition().await;
        if !state.status().is_started() {
            return Ok(());
        }
        state.set_status(ServiceStatus::Suspending);
        match self.do_suspend().await {
            Ok(()) => {
                state.set_status(ServiceStatus::Suspended);
                debug!(service = %self.service_name(), "Service suspended");
                Ok(())
            }
            Err(error) => {
                fail(self, "suspend", &error).await;
                Err(error)
            }
        }
    }

    /// Resume a suspended service; other states are left untouched
    async fn resume(&self) -> SupportResult<()> {
        let state = self.service_state();
        let _guard = state.lock_transition().await;
        if !state.status().is_suspended() {
            return Ok(());
        }
        state.set_status(ServiceStatus::Starting);
        match self.do_resume().await {
            Ok(()) => {
                state.set_status(ServiceStatus::Started);
                debug!(service = %self.service_name(), "Service resumed");
                Ok(())
            }
            Err(error) => {
                fail(self, "resume", &error).await;
                Err(error)
            }
        }
    }

    /// Stop, then run `do_shutdown` once
    async fn shutdown(&self) -> SupportResult<()> {
        let state = self.service_state();
        let _guard = state.lock_transition().await;
        let status = state.status();
        if status.is_shutdown() || status == ServiceStatus::ShuttingDown {
            return Ok(());
        }
        stop_locked(self).await?;

        state.set_status(ServiceStatus::ShuttingDown);
        let result = self.do_shutdown().await;
        state.set_status(ServiceStatus::Shutdown);
        debug!(service = %self.service_name(), "Service shut down");
        result
    }
}

impl<S: Service + ?Sized> ServiceExt for S {}

async fn init_locked<S: Service + ?Sized>(service: &S) -> SupportResult<()> {
    let state = service.service_state();
    if state.status() != ServiceStatus::New {
        return Ok(());
    }
    state.set_status(ServiceStatus::Initializing);
    match service.do_init().await {
        Ok(()) => {
            state.set_status(ServiceStatus::Initialized);
            Ok(())
        }
        Err(error) => {
            fail(service, "init", &error).await;
            Err(error)
        }
    }
}

async fn stop_locked<S: Service + ?Sized>(service: &S) -> SupportResult<()> {
    let state = service.service_state();
    let status = state.status();
    // a failed service is regarded as stopped
    if status.is_failed() {
        return Ok(());
    }
    if matches!(
        status,
        ServiceStatus::Stopped
            | ServiceStatus::Stopping
            | ServiceStatus::ShuttingDown
            | ServiceStatus::Shutdown
    ) {
        return Ok(());
    }

    state.set_status(ServiceStatus::Stopping);
    match service.do_stop().await {
        Ok(()) => {
            state.set_status(ServiceStatus::Stopped);
            log_service_operation("stop", service.service_name(), "stopped", None);
            Ok(())
        }
        Err(error) => {
            fail(service, "stop", &error).await;
            Err(error)
        }
    }
}

async fn fail<S: Service + ?Sized>(service: &S, operation: &str, error: &SupportError) {
    log_error("service", operation, &error.to_string(), Some(service.service_name()));
    service.service_state().set_status(ServiceStatus::Failed);
    service.do_fail(error).await;
}
