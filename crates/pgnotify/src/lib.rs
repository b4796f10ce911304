//! A long-lived, supervised client over a database LISTEN/NOTIFY transport.
//!
//! [`Notifier`] multiplexes a single connection across many logical
//! channels, fans notifications out to per-channel subscribers with panic
//! isolation and per-callback deadlines, and transparently reconnects with
//! capped exponential backoff while preserving the listener set.
//!
//! ```ignore
//! use pgnotify::{Notifier, NotifierConfig, Hooks, provider::PgConnectionProvider};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> pgnotify::error::Result<()> {
//! let provider = Arc::new(PgConnectionProvider::new("host=localhost user=postgres"));
//! provider.reconnect(CancellationToken::new()).await?;
//! let notifier = Notifier::new(provider, NotifierConfig::default(), Hooks::builder())?;
//!
//! notifier.subscribe("events", Arc::new(|n| Box::pin(async move {
//!     println!("{}: {}", n.channel, n.payload_str());
//!     Ok(())
//! }))).await?;
//!
//! let ctx = CancellationToken::new();
//! let notifier_clone = Arc::clone(&notifier);
//! tokio::spawn(async move { notifier_clone.start(ctx).await });
//!
//! notifier.publish("events", b"hello").await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod hooks;
pub mod metrics;
pub mod notification;
pub mod notifier;
pub mod provider;
pub mod registry;
pub mod subscription;
pub mod supervisor;

pub use config::NotifierConfig;
pub use error::{NotifierError, NotifierErrorCode, Result};
pub use hooks::Hooks;
pub use metrics::{ConnectionState, NotifierStatistics};
pub use notification::Notification;
pub use notifier::Notifier;
pub use provider::{ConnectionProvider, InMemoryConnectionProvider, PgConnectionProvider};
pub use subscription::{Callback, CallbackFuture, CallbackResult, Subscription};
