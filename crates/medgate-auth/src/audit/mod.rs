//! Audit trail types.
//!
//! Every state-changing operation on a protected table produces one
//! [`AuditRecord`]. Records are append-only: nothing in this crate updates
//! or deletes them.
//!
//! Writes go through [`AuditLogger`], which never fails the calling
//! operation. The result of each write is reported as an [`AuditOutcome`].

mod logger;

pub use logger::AuditLogger;

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use axum::http::{HeaderMap, Method};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::principal::UserId;

// =============================================================================
// Action
// =============================================================================

/// The verb recorded for an audited action.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AuditAction {
    Insert,
    Update,
    Delete,
    Approve,
    /// Any other verb, stored upper-cased.
    Other(String),
}

impl AuditAction {
    /// Creates an action from a free-form verb.
    #[must_use]
    pub fn other(verb: impl Into<String>) -> Self {
        let verb = verb.into().to_ascii_uppercase();
        match verb.as_str() {
            "INSERT" => Self::Insert,
            "UPDATE" => Self::Update,
            "DELETE" => Self::Delete,
            "APPROVE" => Self::Approve,
            _ => Self::Other(verb),
        }
    }

    /// Maps an HTTP method to the action it performs.
    #[must_use]
    pub fn from_method(method: &Method) -> Self {
        match *method {
            Method::POST => Self::Insert,
            Method::PUT | Method::PATCH => Self::Update,
            Method::DELETE => Self::Delete,
            ref other => Self::Other(other.as_str().to_ascii_uppercase()),
        }
    }

    /// Returns the stored verb.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::Approve => "APPROVE",
            Self::Other(verb) => verb,
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for AuditAction {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for AuditAction {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let verb = String::deserialize(deserializer)?;
        Ok(Self::other(verb))
    }
}

// =============================================================================
// Source
// =============================================================================

/// Where a request came from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditSource {
    pub ip_address: Option<IpAddr>,
    pub user_agent: Option<String>,
}

impl AuditSource {
    /// Extracts the client address and user agent from a request.
    ///
    /// The socket peer is recorded unless `trust_forwarded` is set, in which
    /// case the first `X-Forwarded-For` hop that parses wins, then
    /// `X-Real-IP`, then the peer.
    #[must_use]
    pub fn from_headers(
        headers: &HeaderMap,
        peer: Option<SocketAddr>,
        trust_forwarded: bool,
    ) -> Self {
        let forwarded = if trust_forwarded {
            forwarded_ip(headers)
        } else {
            None
        };
        let ip_address = forwarded.or_else(|| peer.map(|addr| addr.ip()));

        let user_agent = headers
            .get(axum::http::header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(String::from);

        Self {
            ip_address,
            user_agent,
        }
    }
}

fn header_ip(headers: &HeaderMap, name: &str) -> Option<IpAddr> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .and_then(|s| s.trim().parse().ok())
}

fn forwarded_ip(headers: &HeaderMap) -> Option<IpAddr> {
    header_ip(headers, "x-forwarded-for").or_else(|| header_ip(headers, "x-real-ip"))
}

/// Maps a request path to the table it mutates.
///
/// Only whole path segments match: `/clinics/4` is `clinics`,
/// `/clinics-summary` is not.
#[must_use]
pub fn table_for_path(path: &str) -> &'static str {
    let has_segment = |name: &str| path.split('/').any(|segment| segment == name);

    if has_segment("transactions") {
        "transactions"
    } else if has_segment("revenue") {
        "daily_revenue_summaries"
    } else if has_segment("clinics") {
        "clinics"
    } else {
        "unknown"
    }
}

// =============================================================================
// Entries and records
// =============================================================================

/// An audit record waiting to be written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub table_name: String,
    pub record_id: Option<i64>,
    pub action: AuditAction,
    pub old_values: Option<serde_json::Value>,
    pub new_values: Option<serde_json::Value>,
    pub user_id: UserId,
    #[serde(flatten)]
    pub source: AuditSource,
}

impl AuditEntry {
    /// Starts an entry for `user_id` acting on `table_name`.
    #[must_use]
    pub fn new(user_id: UserId, table_name: impl Into<String>, action: AuditAction) -> Self {
        Self {
            table_name: table_name.into(),
            record_id: None,
            action,
            old_values: None,
            new_values: None,
            user_id,
            source: AuditSource::default(),
        }
    }

    #[must_use]
    pub fn record_id(mut self, record_id: i64) -> Self {
        self.record_id = Some(record_id);
        self
    }

    #[must_use]
    pub fn old_values(mut self, values: serde_json::Value) -> Self {
        self.old_values = Some(values);
        self
    }

    #[must_use]
    pub fn new_values(mut self, values: serde_json::Value) -> Self {
        self.new_values = Some(values);
        self
    }

    #[must_use]
    pub fn source(mut self, source: AuditSource) -> Self {
        self.source = source;
        self
    }

    /// The monetary amount carried in the new-state snapshot, if any.
    #[must_use]
    pub fn amount(&self) -> Option<Decimal> {
        amount_of(self.new_values.as_ref())
    }
}

/// A persisted audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: i64,
    pub table_name: String,
    pub record_id: Option<i64>,
    pub action: AuditAction,
    pub old_values: Option<serde_json::Value>,
    pub new_values: Option<serde_json::Value>,
    pub user_id: UserId,
    pub ip_address: Option<IpAddr>,
    pub user_agent: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl AuditRecord {
    /// Builds the persisted form of `entry`.
    #[must_use]
    pub fn from_entry(id: i64, entry: &AuditEntry, timestamp: OffsetDateTime) -> Self {
        Self {
            id,
            table_name: entry.table_name.clone(),
            record_id: entry.record_id,
            action: entry.action.clone(),
            old_values: entry.old_values.clone(),
            new_values: entry.new_values.clone(),
            user_id: entry.user_id,
            ip_address: entry.source.ip_address,
            user_agent: entry.source.user_agent.clone(),
            timestamp,
        }
    }

    /// The monetary amount carried in the new-state snapshot, if any.
    #[must_use]
    pub fn amount(&self) -> Option<Decimal> {
        amount_of(self.new_values.as_ref())
    }
}

/// Reads `amount` from a snapshot, accepting a JSON number or a decimal string.
#[must_use]
pub fn amount_of(values: Option<&serde_json::Value>) -> Option<Decimal> {
    let raw = match values?.get("amount")? {
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::String(s) => s.trim().to_string(),
        _ => return None,
    };
    raw.parse::<Decimal>()
        .or_else(|_| Decimal::from_scientific(&raw))
        .ok()
}

/// Predicate for counting one principal's recent audit records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditCountFilter {
    pub user_id: UserId,
    /// Trailing window, measured back from the store's clock.
    pub window: Duration,
    /// Only count records whose amount is strictly above this value.
    pub amount_above: Option<Decimal>,
}

// =============================================================================
// Outcome
// =============================================================================

/// Result of a best-effort audit write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AuditOutcome {
    /// The record was written.
    Committed { id: i64 },
    /// The write failed and was absorbed.
    Failed { reason: String },
}

impl AuditOutcome {
    #[must_use]
    pub fn is_committed(&self) -> bool {
        matches!(self, Self::Committed { .. })
    }

    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}
