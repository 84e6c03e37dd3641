//! Common test infrastructure
//!
//! Tests should only import from this module, not from internal submodules.
//!
//! # Example
//!
//! ```no_run
//! mod common;
//! use common::{TestServer, TestClient};
//!
//! #[tokio::test]
//! async fn test_hydrate() {
//!     let server = TestServer::spawn().await;
//!     let client = TestClient::connect(&server).await;
//!     assert_eq!(client.service.unread_count(), 2);
//! }
//! ```

mod client;
mod constants;
mod fixtures;
mod server;

// Public API - this is what tests import
#[allow(unused_imports)]
pub use client::{wait_until, TestClient};
#[allow(unused_imports)]
pub use constants::*;
#[allow(unused_imports)]
pub use fixtures::{notification, notification_frame, seed_notifications};
#[allow(unused_imports)]
pub use server::{routes, TestServer};
