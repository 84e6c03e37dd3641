//! Shared constants for end-to-end tests

/// Token accepted by the test server until it is revoked
pub const TEST_TOKEN: &str = "test-token-1";

/// Server startup timeout in milliseconds
pub const SERVER_READY_TIMEOUT_MS: u64 = 5000;

/// Polling interval when waiting for server readiness
pub const SERVER_READY_POLL_INTERVAL_MS: u64 = 10;

/// Upper bound for any single wait in a test
pub const WAIT_TIMEOUT_MS: u64 = 5000;

/// Notification ids seeded on the server
pub const NOTIFICATION_OLD_ID: &str = "notif-old";
pub const NOTIFICATION_MID_ID: &str = "notif-mid";
pub const NOTIFICATION_NEW_ID: &str = "notif-new";
