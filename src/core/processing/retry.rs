// Wait-and-retry heuristic for analysing freshly uploaded files.
//
// The AI vendor gives no "indexing finished" signal. We sleep a fixed settle
// delay after the uploads, ask, and if the answer looks like a placeholder we
// back off linearly and ask again a bounded number of times. The bound and the
// delays were tuned by hand; a stale answer can still slip through.

use std::time::Duration;

/// Pause after the last upload before the first chat call.
pub const ANALYSIS_SETTLE_DELAY: Duration = Duration::from_secs(30);

/// Backoff unit; retry `n` waits `n * ANALYSIS_RETRY_STEP`.
pub const ANALYSIS_RETRY_STEP: Duration = Duration::from_secs(15);

/// Retries after the first attempt.
pub const MAX_ANALYSIS_RETRIES: u32 = 3;

/// Gap between consecutive uploads so the vendor does not rate-limit us.
pub const UPLOAD_PACING_DELAY: Duration = Duration::from_secs(2);

/// Returned by the chat endpoint when it answered before the file was indexed.
pub const PLACEHOLDER_SENTINEL: &str = "Chat endpoint response retrieved";

// Lowercased. Known to be incomplete: a short legitimate answer quoting one of
// these will be treated as not ready.
const PROCESSING_ERROR_SIGNATURES: [&str; 5] = [
    "error processing",
    "still being processed",
    "file is being processed",
    "no data sources available",
    "unable to access the attached",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub settle_delay: Duration,
    pub retry_step: Duration,
    pub max_retries: u32,
    pub pacing_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            settle_delay: ANALYSIS_SETTLE_DELAY,
            retry_step: ANALYSIS_RETRY_STEP,
            max_retries: MAX_ANALYSIS_RETRIES,
            pacing_delay: UPLOAD_PACING_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Same retry bound, no waiting. Used in mock mode where nothing needs indexing.
    pub fn immediate() -> Self {
        Self {
            settle_delay: Duration::ZERO,
            retry_step: Duration::ZERO,
            pacing_delay: Duration::ZERO,
            ..Self::default()
        }
    }

    pub fn backoff(&self, attempt: u32) -> Duration {
        self.retry_step * attempt
    }
}

/// True when a chat answer looks like the vendor had not finished with the files.
pub fn is_not_ready(content: &str) -> bool {
    let trimmed = content.trim();
    if trimmed.is_empty() || trimmed.contains(PLACEHOLDER_SENTINEL) {
        return true;
    }

    let lowered = trimmed.to_lowercase();
    PROCESSING_ERROR_SIGNATURES
        .iter()
        .any(|signature| lowered.contains(signature))
}
