// 💼 Deals - input records read from the document store
//
// Documents are decoded field by field: a missing or mistyped field takes its
// default instead of rejecting the whole response.

use crate::errors::TransformError;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Company name shown on a card when the deal has no customer name.
pub const CUSTOMER_UNSPECIFIED: &str = "Unspecified";

// ============================================================================
// CUSTOMER
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

// ============================================================================
// DEAL
// ============================================================================

/// A sales deal as stored in the `deals` collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deal {
    /// Stable document id
    #[serde(rename = "$id")]
    pub id: String,

    /// Raw creation timestamp; only used for ordering
    #[serde(rename = "$createdAt")]
    pub created_at: String,

    pub name: String,

    pub price: f64,

    /// Must match a column id for the deal to appear on the board
    pub status: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer: Option<Customer>,
}

impl Deal {
    pub fn new(
        id: impl Into<String>,
        created_at: impl Into<String>,
        name: impl Into<String>,
        price: f64,
        status: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            created_at: created_at.into(),
            name: name.into(),
            price,
            status: status.into(),
            customer: None,
        }
    }

    pub fn with_customer(mut self, name: impl Into<String>) -> Self {
        self.customer = Some(Customer {
            name: name.into(),
            email: None,
        });
        self
    }

    /// Decode a store document leniently.
    ///
    /// Only a document that is not an object at all is rejected.
    pub fn from_document(index: usize, document: &Value) -> Result<Self, TransformError> {
        let fields = document
            .as_object()
            .ok_or(TransformError::NotAnObject { index })?;

        Ok(Self {
            id: scalar_text(fields, "$id"),
            created_at: scalar_text(fields, "$createdAt"),
            name: scalar_text(fields, "name"),
            price: fields.get("price").and_then(numeric).unwrap_or(0.0),
            status: scalar_text(fields, "status"),
            customer: fields
                .get("customer")
                .and_then(Value::as_object)
                .map(|customer| Customer {
                    name: scalar_text(customer, "name"),
                    email: customer
                        .get("email")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                }),
        })
    }

    /// Encode as a store document.
    pub fn to_document(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Customer name, or the sentinel when absent or empty.
    pub fn company_name(&self) -> String {
        match &self.customer {
            Some(customer) if !customer.name.is_empty() => customer.name.clone(),
            _ => CUSTOMER_UNSPECIFIED.to_string(),
        }
    }

    pub fn created_at_parsed(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.created_at)
    }
}

// ============================================================================
// FIELD HELPERS
// ============================================================================

/// Strings pass through, numbers and booleans are rendered, anything else is "".
fn scalar_text(fields: &Map<String, Value>, key: &str) -> String {
    match fields.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Parse a creation timestamp.
///
/// Accepts RFC 3339, naive `YYYY-MM-DDTHH:MM:SS[.f]` (UTC) and plain dates
/// (midnight UTC). Returns `None` for anything else.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
