use crate::background_jobs::context::JobContext;
use tracing::{debug, warn};

/// Appends one access-log row. Errors are logged and swallowed.
pub fn log_access(ctx: &JobContext, text: &str) {
    match ctx.review_store.append_access_log(text) {
        Ok(id) => debug!("Access log entry {} recorded: {}", id, text),
        Err(e) => warn!("Failed to record access log entry '{}': {}", text, e),
    }
}
