//! Request types for the offline queue.
//!
//! A [`QueuedRequest`] is the persisted description of a deferred HTTP call.
//! Callers build a [`NewRequest`] and the queue stamps it with an id,
//! timestamp and retry counter.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use reqwest::header::{HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::SyncError;

/// HTTP status that triggers the conflict policy.
const HTTP_CONFLICT: u16 = 409;

/// Replay priority of a queued request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Replayed after everything else with a priority
    Low,
    /// Default for interactive calls
    Normal,
    /// Replayed first
    High,
}

impl Priority {
    /// Numeric rank used for ordering (higher replays first).
    #[must_use]
    pub const fn rank(self) -> u8 {
        match self {
            Self::High => 3,
            Self::Normal => 2,
            Self::Low => 1,
        }
    }

    /// Storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "normal" => Ok(Self::Normal),
            "high" => Ok(Self::High),
            other => Err(SyncError::Parse(format!("Unknown priority: {other}"))),
        }
    }
}

/// How a replay that hits a `409 Conflict` should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ConflictResolution {
    /// Keep retrying; the server copy is expected to be replaced
    Overwrite,
    /// Keep retrying; merging is left to the server
    Merge,
    /// Give up on the first conflict
    Skip,
}

impl ConflictResolution {
    /// Storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Overwrite => "overwrite",
            Self::Merge => "merge",
            Self::Skip => "skip",
        }
    }
}

impl fmt::Display for ConflictResolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConflictResolution {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "overwrite" => Ok(Self::Overwrite),
            "merge" => Ok(Self::Merge),
            "skip" => Ok(Self::Skip),
            other => Err(SyncError::Parse(format!(
                "Unknown conflict resolution: {other}"
            ))),
        }
    }
}

/// Header map as stored with a request.
pub type Headers = BTreeMap<String, String>;

/// A deferred HTTP call persisted in the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedRequest {
    /// Unique id, `"{timestamp_ms}-{suffix}"`
    pub id: String,
    /// Target URL
    pub url: String,
    /// HTTP method, upper-case
    pub method: String,
    /// Explicit headers; `None` replays with a JSON content type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<Headers>,
    /// Serialized payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    /// Creation time in milliseconds since the epoch
    pub timestamp: i64,
    /// Failed replay attempts so far
    pub retry_count: u32,
    /// Retry ceiling
    pub max_retries: u32,
    /// Replay priority
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    /// Treatment of `409 Conflict` responses
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conflict_resolution: Option<ConflictResolution>,
}

impl QueuedRequest {
    /// Rank used for replay ordering; a missing priority ranks 0.
    #[must_use]
    pub fn priority_rank(&self) -> u8 {
        self.priority.map_or(0, Priority::rank)
    }

    /// No failed replay attempts yet.
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        self.retry_count == 0
    }

    /// At least one replay attempt has failed.
    #[must_use]
    pub const fn is_failed(&self) -> bool {
        self.retry_count > 0
    }

    /// Whether a response with `status` means giving up at once: a
    /// `409 Conflict` on a request with `skip` resolution.
    #[must_use]
    pub fn skips_on(&self, status: u16) -> bool {
        status == HTTP_CONFLICT
            && self.conflict_resolution == Some(ConflictResolution::Skip)
    }

    /// Record a failed attempt.
    ///
    /// Returns `true` while the request may still be retried.
    pub fn record_failure(&mut self) -> bool {
        self.retry_count = self.retry_count.saturating_add(1);
        self.retry_count < self.max_retries
    }

    /// Creation time as a `DateTime`.
    #[must_use]
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.timestamp)
    }
}

/// Why a request ended up in the dead-letter list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeadReason {
    /// Ran out of retries
    Exhausted,
    /// Hit a conflict with `skip` resolution
    Skipped,
}

impl DeadReason {
    /// Storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Exhausted => "exhausted",
            Self::Skipped => "skipped",
        }
    }
}

impl fmt::Display for DeadReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeadReason {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "exhausted" => Ok(Self::Exhausted),
            "skipped" => Ok(Self::Skipped),
            other => Err(SyncError::Parse(format!("Unknown dead-letter reason: {other}"))),
        }
    }
}

/// A request removed from the queue for good.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadLetter {
    /// The request as it was when dropped
    #[serde(flatten)]
    pub request: QueuedRequest,
    /// When it was dropped, milliseconds since the epoch
    pub failed_at: i64,
    /// Error from the final attempt
    pub last_error: String,
    /// Why it was dropped
    pub reason: DeadReason,
}

impl DeadLetter {
    /// Wrap a request that has just failed for the last time.
    #[must_use]
    pub fn new(request: QueuedRequest, last_error: impl Into<String>) -> Self {
        Self::with_reason(request, last_error, DeadReason::Exhausted)
    }

    /// Wrap a request given up on after a conflict.
    #[must_use]
    pub fn skipped(request: QueuedRequest, last_error: impl Into<String>) -> Self {
        Self::with_reason(request, last_error, DeadReason::Skipped)
    }

    fn with_reason(
        request: QueuedRequest,
        last_error: impl Into<String>,
        reason: DeadReason,
    ) -> Self {
        Self {
            request,
            failed_at: Utc::now().timestamp_millis(),
            last_error: last_error.into(),
            reason,
        }
    }
}

/// Caller-supplied part of a request, before the queue stamps it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRequest {
    pub url: String,
    pub method: String,
    pub headers: Option<Headers>,
    pub body: Option<String>,
    pub max_retries: Option<u32>,
    pub priority: Option<Priority>,
    pub conflict_resolution: Option<ConflictResolution>,
}

impl NewRequest {
    /// Start a request for `method` against `url`.
    #[must_use]
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: method.into().to_uppercase(),
            ..Self::default()
        }
    }

    /// Start a request whose body is `payload` serialized as JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be serialized.
    pub fn json<T: Serialize>(
        method: impl Into<String>,
        url: impl Into<String>,
        payload: &T,
    ) -> Result<Self, SyncError> {
        let body = serde_json::to_string(payload)?;
        Ok(Self::new(method, url).body(body))
    }

    /// Add a header; the first call switches off the implicit JSON content type.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .get_or_insert_with(Headers::new)
            .insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    #[must_use]
    pub const fn priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    #[must_use]
    pub const fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    #[must_use]
    pub const fn conflict_resolution(mut self, mode: ConflictResolution) -> Self {
        self.conflict_resolution = Some(mode);
        self
    }

    /// Check that the request can be replayed later.
    ///
    /// # Errors
    ///
    /// Returns an error for a non-HTTP URL, an empty or malformed method, a
    /// zero retry ceiling, or a header that is not valid HTTP.
    pub fn validate(&self) -> Result<(), SyncError> {
        if !(self.url.starts_with("http://") || self.url.starts_with("https://")) {
            return Err(SyncError::InvalidRequest(format!(
                "URL must be absolute http(s): {}",
                self.url
            )));
        }

        if self.method.is_empty() || !self.method.bytes().all(|b| b.is_ascii_alphabetic()) {
            return Err(SyncError::InvalidRequest(format!(
                "Invalid HTTP method: {:?}",
                self.method
            )));
        }

        if self.max_retries == Some(0) {
            return Err(SyncError::InvalidRequest(
                "max_retries must be at least 1".to_string(),
            ));
        }

        if let Some(headers) = &self.headers {
            validate_headers(headers)?;
        }

        Ok(())
    }

    /// Stamp the request with a fresh id, `timestamp` and zero retries.
    #[must_use]
    pub fn stamp(self, timestamp: i64, default_max_retries: u32) -> QueuedRequest {
        QueuedRequest {
            id: generate_id(timestamp),
            url: self.url,
            method: self.method,
            headers: self.headers,
            body: self.body,
            timestamp,
            retry_count: 0,
            max_retries: self.max_retries.unwrap_or(default_max_retries),
            priority: self.priority,
            conflict_resolution: self.conflict_resolution,
        }
    }
}

/// Check that every header name and value can go on the wire.
///
/// # Errors
///
/// Returns `InvalidRequest` naming the first offending header.
pub fn validate_headers(headers: &Headers) -> Result<(), SyncError> {
    for (name, value) in headers {
        HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
            SyncError::InvalidRequest(format!("Invalid header name {name:?}: {e}"))
        })?;
        HeaderValue::from_str(value).map_err(|e| {
            SyncError::InvalidRequest(format!("Invalid header value for {name}: {e}"))
        })?;
    }
    Ok(())
}

/// Generate a request id from a timestamp and a random 9-character suffix.
#[must_use]
pub fn generate_id(timestamp: i64) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{timestamp}-{}", &suffix[..9])
}

/// Parse a `Name: value` header argument.
///
/// # Errors
///
/// Returns an error if there is no colon or the name is empty.
pub fn parse_header(raw: &str) -> Result<(String, String), SyncError> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| SyncError::InvalidRequest(format!("Header must be 'Name: value': {raw}")))?;

    let name = name.trim();
    if name.is_empty() {
        return Err(SyncError::InvalidRequest(format!(
            "Header name is empty: {raw}"
        )));
    }

    Ok((name.to_string(), value.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_rank() {
        assert!(Priority::High.rank() > Priority::Normal.rank());
        assert!(Priority::Normal.rank() > Priority::Low.rank());

        let mut req = NewRequest::new("get", "http://x/a").stamp(1, 3);
        assert_eq!(req.priority_rank(), 0);
        req.priority = Some(Priority::Low);
        assert_eq!(req.priority_rank(), 1);
    }

    #[test]
    fn test_priority_from_str() {
        assert_eq!("HIGH".parse::<Priority>().unwrap(), Priority::High);
        assert!("urgent".parse::<Priority>().is_err());
        assert_eq!(
            "skip".parse::<ConflictResolution>().unwrap(),
            ConflictResolution::Skip
        );
    }

    #[test]
    fn test_stamp() {
        let req = NewRequest::new("post", "https://api.test/loans")
            .body("{}")
            .priority(Priority::High)
            .stamp(1_700_000_000_000, 3);

        assert!(req.id.starts_with("1700000000000-"));
        assert_eq!(req.id.len(), "1700000000000-".len() + 9);
        assert_eq!(req.method, "POST");
        assert_eq!(req.timestamp, 1_700_000_000_000);
        assert_eq!(req.retry_count, 0);
        assert_eq!(req.max_retries, 3);
        assert!(req.headers.is_none());
    }

    #[test]
    fn test_stamp_keeps_caller_ceiling() {
        let req = NewRequest::new("POST", "http://x").max_retries(7).stamp(5, 3);
        assert_eq!(req.max_retries, 7);
    }

    #[test]
    fn test_ids_are_unique() {
        let a = generate_id(42);
        let b = generate_id(42);
        assert_ne!(a, b);
    }

    #[test]
    fn test_record_failure() {
        let mut req = NewRequest::new("POST", "http://x").max_retries(3).stamp(1, 3);

        assert!(req.record_failure());
        assert_eq!(req.retry_count, 1);
        assert!(req.record_failure());
        assert!(!req.record_failure());
        assert_eq!(req.retry_count, 3);
        assert!(req.is_failed());
    }

    #[test]
    fn test_validate() {
        assert!(NewRequest::new("POST", "https://x/api").validate().is_ok());
        assert!(NewRequest::new("POST", "/api/x").validate().is_err());
        assert!(NewRequest::new("", "http://x").validate().is_err());
        assert!(NewRequest::new("PO ST", "http://x").validate().is_err());
        assert!(NewRequest::new("POST", "http://x")
            .max_retries(0)
            .validate()
            .is_err());
    }

    #[test]
    fn test_validate_rejects_malformed_headers() {
        let ok = NewRequest::new("POST", "http://x").header("X-Branch", "nairobi-01");
        assert!(ok.validate().is_ok());

        let bad_name = NewRequest::new("POST", "http://x").header("Bad Name", "v");
        assert!(matches!(
            bad_name.validate().unwrap_err(),
            SyncError::InvalidRequest(msg) if msg.contains("Bad Name")
        ));

        let bad_value = NewRequest::new("POST", "http://x").header("X-Note", "line\nbreak");
        assert!(matches!(
            bad_value.validate().unwrap_err(),
            SyncError::InvalidRequest(_)
        ));
    }

    #[test]
    fn test_skips_on_conflict_only_with_skip() {
        let plain = NewRequest::new("PUT", "http://x/a").stamp(1, 3);
        let skip = NewRequest::new("PUT", "http://x/a")
            .conflict_resolution(ConflictResolution::Skip)
            .stamp(1, 3);
        let merge = NewRequest::new("PUT", "http://x/a")
            .conflict_resolution(ConflictResolution::Merge)
            .stamp(1, 3);

        assert!(skip.skips_on(409));
        assert!(!skip.skips_on(500));
        assert!(!plain.skips_on(409));
        assert!(!merge.skips_on(409));
    }

    #[test]
    fn test_dead_letter_reason() {
        let req = NewRequest::new("PUT", "http://x/members/1").stamp(1, 3);
        assert_eq!(DeadLetter::new(req.clone(), "HTTP 500").reason, DeadReason::Exhausted);
        assert_eq!(DeadLetter::skipped(req, "HTTP 409").reason, DeadReason::Skipped);
        assert_eq!("SKIPPED".parse::<DeadReason>().unwrap(), DeadReason::Skipped);
        assert!("lost".parse::<DeadReason>().is_err());
    }

    #[test]
    fn test_json_constructor() {
        #[derive(Serialize)]
        struct Repayment {
            loan_id: u32,
            amount: u64,
        }

        let req = NewRequest::json(
            "post",
            "http://x/repayments",
            &Repayment {
                loan_id: 9,
                amount: 1500,
            },
        )
        .unwrap();
        assert_eq!(req.body.as_deref(), Some(r#"{"loan_id":9,"amount":1500}"#));
    }

    #[test]
    fn test_parse_header() {
        assert_eq!(
            parse_header("Authorization: Bearer abc").unwrap(),
            ("Authorization".to_string(), "Bearer abc".to_string())
        );
        assert!(parse_header("no-colon").is_err());
        assert!(parse_header(": value").is_err());
    }

    #[test]
    fn test_serialization_omits_absent_fields() {
        let req = NewRequest::new("GET", "http://x").stamp(1, 3);
        let json = serde_json::to_string(&req).unwrap();
        assert!(!json.contains("headers"));
        assert!(!json.contains("priority"));
        assert!(json.contains("\"retry_count\":0"));
    }
}
