//! # dealroom-sdk
//!
//! Client-side sync layer for the dealroom transaction backend.
//!
//! - [`ConnectionManager`] owns the authenticated push channel, with
//!   bounded retries and automatic reconnection.
//! - [`EventRegistry`] maps event names to handlers independent of the
//!   connection, so handlers survive reconnects without being doubled.
//! - The [`store`] module caches server entities, coalesces fetches and
//!   folds push events into the cache.
//! - [`optimistic_update`] applies local edits ahead of the server and rolls
//!   them back on failure.
//! - [`SyncService`] wires all of it together behind `init()`/`dispose()`.
//!
//! ```no_run
//! use std::sync::Arc;
//! use dealroom_sdk::{SyncConfig, SyncService, StaticSession};
//!
//! # async fn example() -> dealroom_sdk::Result<()> {
//! let session = Arc::new(StaticSession::new(Some("jwt".into())));
//! let service = SyncService::connect_to(SyncConfig::from_env(), session)?;
//! service.init().await?;
//! if let Some(report) = service.reports().fetch_transaction_report("txn-123").await {
//!     println!("{} fields extracted", report.data.len());
//! }
//! service.dispose();
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod config;
pub mod connection;
pub mod error;
pub mod event;
pub mod models;
pub mod optimistic;
pub mod registry;
pub mod service;
pub mod session;
pub mod store;
pub mod transport;
pub mod wire;

pub use api::{ApiClient, ApiResult, HttpApiClient};
pub use config::{ReconnectConfig, SyncConfig};
pub use connection::{ConnectionManager, ConnectionState};
pub use error::{ApiError, Result, SyncError};
pub use event::{ClientEvent, ServerEvent};
pub use optimistic::{OptimisticSlot, optimistic_update};
pub use registry::{EventRegistry, Handler, handler};
pub use service::SyncService;
pub use session::{SessionProvider, StaticSession};
