use chrono::{DateTime, SubsecRound, Utc};

/// Current UTC time truncated to whole seconds.
///
/// Every timestamp in the state document is second-precision so documents
/// stay diff-friendly and fingerprint comparisons never depend on sub-second
/// noise.
pub fn now_utc() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(0)
}

/// Age in whole seconds of `then` relative to `now`, clamped to zero.
pub fn age_seconds(now: DateTime<Utc>, then: DateTime<Utc>) -> i64 {
    (now - then).num_seconds().max(0)
}
