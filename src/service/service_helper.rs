//! Lifecycle operations over groups of services.
//!
//! Start and stop failures are also reported to the given notifiers as
//! `ServiceStartupFailure` / `ServiceStopFailure` events.

use super::{Service, ServiceExt};
use crate::error::SupportResult;
use crate::event::{self, EventNotifiers};
use std::sync::Arc;
use tracing::warn;

/// Start services in order, stopping at the first failure
pub async fn start_services(
    services: &[Arc<dyn Service>],
    notifiers: &EventNotifiers,
) -> SupportResult<()> {
    for service in services {
        if let Err(error) = service.start().await {
            event::notify_service_startup_failure(notifiers, service.service_name(), &error);
            return Err(error);
        }
    }
    Ok(())
}

/// Stop services in reverse order. Every service is attempted; the first
/// failure is returned.
pub async fn stop_services(
    services: &[Arc<dyn Service>],
    notifiers: &EventNotifiers,
) -> SupportResult<()> {
    let mut first_error = None;
    for service in services.iter().rev() {
        if let Err(error) = service.stop().await {
            warn!(service = %service.service_name(), error = %error, "Error stopping service");
            event::notify_service_stop_failure(notifiers, service.service_name(), &error);
            first_error.get_or_insert(error);
        }
    }
    first_error.map_or(Ok(()), Err)
}

/// Stop and shut down services in reverse order, attempting all of them
pub async fn stop_and_shutdown_services(
    services: &[Arc<dyn Service>],
    notifiers: &EventNotifiers,
) -> SupportResult<()> {
    let mut first_error = None;
    for service in services.iter().rev() {
        if let Err(error) = service.shutdown().await {
            warn!(service = %service.service_name(), error = %error, "Error shutting down service");
            event::notify_service_stop_failure(notifiers, service.service_name(), &error);
            first_error.get_or_insert(error);
        }
    }
    first_error.map_or(Ok(()), Err)
}

pub async fn suspend_services(services: &[Arc<dyn Service>]) -> SupportResult<()> {
    for service in services {
        service.suspend().await?;
    }
    Ok(())
}

pub async fn resume_services(services: &[Arc<dyn Service>]) -> SupportResult<()> {
    for service in services {
        service.resume().await?;
    }
    Ok(())
}
