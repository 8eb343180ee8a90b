//! # Consumers
//!
//! Consumers turn incoming data into exchanges and drive them through a
//! route's processor.
//!
//! ## Overview
//!
//! - [`DefaultConsumer`]: owns the exchange factory of one endpoint, creates
//!   exchanges and runs them through an [`AsyncProcessor`].
//! - [`ScheduledPollConsumer`]: a [`DefaultConsumer`] driven by a tokio
//!   scheduler that repeatedly polls a [`PollSource`], with backoff, greedy
//!   polling and a repeat limit.
//!
//! Failures that cannot be returned to anyone (a failed poll, a failed
//! exchange on a fire-and-forget consumer) go to the consumer's
//! [`ExceptionHandler`].

mod default_consumer;
mod scheduled;

pub use default_consumer::DefaultConsumer;
pub use scheduled::{
    DefaultPollStrategy, PollSource, PollStrategy, ScheduledPollConfig, ScheduledPollConsumer,
    ScheduledPollContext,
};

use crate::error::SupportError;
use crate::exchange::{helper, Exchange};
use crate::processor::AsyncProcessor;
use crate::service::Service;
use std::sync::Arc;
use tracing::warn;

/// Receives failures that have no caller to propagate to
pub trait ExceptionHandler: Send + Sync {
    fn handle_exception(&self, message: &str, exchange: Option<&Exchange>, error: &SupportError);
}

/// Logs failures at warn level
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingExceptionHandler;

impl LoggingExceptionHandler {
    pub fn new() -> Self {
        Self
    }
}

impl ExceptionHandler for LoggingExceptionHandler {
    fn handle_exception(&self, message: &str, exchange: Option<&Exchange>, error: &SupportError) {
        match exchange {
            Some(exchange) => warn!(
                ids = %helper::log_ids(exchange),
                error = %error,
                "{message}"
            ),
            None => warn!(error = %error, "{message}"),
        }
    }
}

/// Source of exchanges for a route
pub trait Consumer: Service {
    fn endpoint_uri(&self) -> &str;

    /// Processor the consumer hands its exchanges to
    fn processor(&self) -> Arc<dyn AsyncProcessor>;
}
