//! Timestamp utilities

use chrono::{DateTime, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Whether `expires_at` lies at or before `at`
///
/// A missing expiry never expires.
pub fn is_expired(expires_at: Option<DateTime<Utc>>, at: DateTime<Utc>) -> bool {
    expires_at.map_or(false, |deadline| deadline <= at)
}
