//! Shared constants for end-to-end tests

// ============================================================================
// Timeouts
// ============================================================================

/// How long to wait for the test server to answer its first request
pub const SERVER_READY_TIMEOUT_MS: u64 = 5_000;

/// Delay between readiness probes
pub const SERVER_READY_POLL_INTERVAL_MS: u64 = 20;

/// Per-request timeout of the test client
pub const REQUEST_TIMEOUT_SECS: u64 = 10;

/// How long to wait for background workers to finish a job
pub const JOB_SETTLE_TIMEOUT_MS: u64 = 5_000;

/// Delay between polls while waiting on background work
pub const JOB_POLL_INTERVAL_MS: u64 = 25;

// ============================================================================
// Mock LLM
// ============================================================================

/// Review text containing this word is classified as negative by the mock
pub const NEGATIVE_MARKER: &str = "terrible";

pub const POSITIVE_TONE: &str = "enthusiastic";
pub const POSITIVE_SENTIMENT: &str = "positive";
pub const NEGATIVE_TONE: &str = "frustrated";
pub const NEGATIVE_SENTIMENT: &str = "negative";

/// Worker tasks started by the test server
pub const TEST_WORKER_COUNT: usize = 2;
