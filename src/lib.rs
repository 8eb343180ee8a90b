#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Conduit Support
//!
//! Support layer for message-exchange integration engines.
//!
//! ## Overview
//!
//! An integration engine moves [`Exchange`]s between consumers, processors and
//! producers. This crate provides the plumbing those pieces share:
//!
//! - **Exchange model**: messages, headers, properties, variables and
//!   on-completion callbacks, with pooled reuse through exchange factories
//! - **Async bridge**: run synchronous processors asynchronously and block on
//!   asynchronous ones, with interruption, timeouts and statistics
//! - **Lifecycle**: an init / start / stop / suspend / resume / shutdown state
//!   machine shared by every service
//! - **Registries**: named, typed bean lookup with fallback chains
//! - **Events**: lifecycle, exchange and reload notifications
//! - **Reload**: file-watching reload of route resources
//!
//! ## Module Organization
//!
//! - [`exchange`] - Exchange model, factories and helpers
//! - [`message`] - Message bodies and headers
//! - [`processor`] - Sync/async processors and the bridges between them
//! - [`consumer`] / [`producer`] - Endpoint base implementations
//! - [`context`] - Shared dependencies and lifecycle root
//! - [`service`] - Lifecycle state machine
//! - [`registry`] - Bean registries
//! - [`variable`] - Global and route-scoped variable repositories
//! - [`id_generator`] - Exchange and message id generators
//! - [`event`] - Event notifiers
//! - [`reload`] - File watcher reload strategy
//! - [`property_binding`] - Binding option maps onto typed targets
//! - [`config`] - Layered configuration
//! - [`error`] - Structured error handling
//!
//! ## Quick Start
//!
//! ```rust
//! use conduit_support::context::SupportContextBuilder;
//! use conduit_support::consumer::DefaultConsumer;
//! use conduit_support::exchange::Exchange;
//! use conduit_support::processor::{processor_fn, ProcessorConverter};
//! use conduit_support::service::ServiceExt;
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let context = SupportContextBuilder::new("quick-start").build().unwrap();
//!
//! let greet = ProcessorConverter::to_async(Arc::new(processor_fn(|exchange: &mut Exchange| {
//!     let name = exchange.in_message().body_as_text().unwrap_or_default();
//!     exchange.in_message_mut().set_body(format!("Hello {name}"));
//!     Ok(())
//! })));
//!
//! let consumer = Arc::new(DefaultConsumer::new(context.clone(), "direct:greet", None, greet));
//! context.add_service(consumer.clone()).await.unwrap();
//! context.start().await.unwrap();
//!
//! let exchange = consumer.process_body("World").await.unwrap().unwrap();
//! assert_eq!(exchange.in_message().body_as_text().as_deref(), Some("Hello World"));
//!
//! context.stop().await.unwrap();
//! # });
//! ```

pub mod clock;
pub mod config;
pub mod constants;
pub mod consumer;
pub mod context;
pub mod error;
pub mod event;
pub mod exchange;
pub mod id_generator;
pub mod logging;
pub mod message;
pub mod processor;
pub mod producer;
pub mod property_binding;
pub mod registry;
pub mod reload;
pub mod service;
pub mod utils;
pub mod variable;

pub use config::{ConfigLoader, SupportConfig};
pub use context::{SupportContext, SupportContextBuilder};
pub use error::{SupportError, SupportResult};
pub use exchange::{Exchange, ExchangeContext, ExchangePattern};
pub use message::{Body, Message};
pub use processor::{AsyncCallback, AsyncProcessor, Processor};
pub use service::{Service, ServiceExt, ServiceStatus};
