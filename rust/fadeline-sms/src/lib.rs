//! Fadeline SMS - Recurring SMS Schedule Engine
//!
//! This crate manages the recurring SMS campaigns a Fadeline barber shop
//! sends to its clients. It keeps a small collection of scheduled messages
//! in sync with the Fadeline backend and offers:
//!
//! - **Cron codec**: Lossless translation between 5-field cron expressions
//!   and the weekly/biweekly/monthly 12-hour schedule form users edit
//! - **Message lifecycle**: A six-state machine from first draft through
//!   content validation to an active, pausable schedule
//! - **Content validation**: Every message passes the backend moderation
//!   gateway before it can go live
//! - **Schedule store**: Concurrency-safe in-memory collection with remote
//!   persistence, stale-load protection, and per-message save guards
//!
//! # Architecture
//!
//! The crate is organized into a few key modules:
//!
//! - [`config`]: Configuration management and environment loading
//! - [`scheduler`]: Schedule domain model, cron codec, lifecycle, and store
//! - [`backend`]: HTTP transport and content validation gateway clients
//! - [`error`]: Error taxonomy shared across the crate
//! - [`logging`]: Operation timing helpers
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use fadeline_sms::backend::{HttpBackend, HttpValidator};
//! use fadeline_sms::scheduler::ScheduleStore;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let backend = HttpBackend::new(
//!         "https://api.fadeline.app",
//!         "access-token",
//!         Duration::from_secs(30),
//!     )?;
//!     let validator = HttpValidator::new(
//!         "https://api.fadeline.app",
//!         "access-token",
//!         Duration::from_secs(20),
//!     )?;
//!     let store = ScheduleStore::new(Arc::new(backend), Arc::new(validator));
//!
//!     for message in store.load().await? {
//!         println!("{}: {}", message.title, message.recurrence);
//!     }
//!     Ok(())
//! }
//! ```

#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

pub mod backend;
pub mod config;
pub mod error;
pub mod logging;
pub mod scheduler;
