use crate::deal::Deal;
use anyhow::{bail, Context, Result};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use tracing::{debug, info, warn};

/// Collection holding deal documents
pub const COLLECTION_DEALS: &str = "deals";

/// Result of listing a collection, shaped like the remote document API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentList {
    pub total: usize,
    pub documents: Vec<Value>,
}

/// Outcome of an import run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub inserted: usize,
    pub updated: usize,
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    // ==========================================================================
    // Documents Table (one JSON document per row, grouped by collection)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS documents (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            collection TEXT NOT NULL,
            doc_id TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            data TEXT NOT NULL,
            UNIQUE(collection, doc_id)
        )",
        [],
    )?;

    // ==========================================================================
    // Settings Table (UI preferences such as the theme)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_documents_collection ON documents(collection)",
        [],
    )?;

    Ok(())
}

/// Insert or replace a document. Returns `true` when the document is new.
///
/// `$id` and `$createdAt` are generated when missing and written back into
/// the stored JSON so listings always carry them.
pub fn upsert_document(conn: &Connection, collection: &str, document: &Value) -> Result<bool> {
    let Some(fields) = document.as_object() else {
        bail!("Document for collection '{}' is not a JSON object", collection);
    };

    let mut fields = fields.clone();
    let doc_id = match fields.get("$id").and_then(Value::as_str) {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => {
            let id = uuid::Uuid::new_v4().to_string();
            fields.insert("$id".to_string(), Value::String(id.clone()));
            id
        }
    };
    let now = Utc::now().to_rfc3339();
    let created_at = match fields.get("$createdAt").and_then(Value::as_str) {
        Some(ts) if !ts.is_empty() => ts.to_string(),
        _ => {
            fields.insert("$createdAt".to_string(), Value::String(now.clone()));
            now.clone()
        }
    };

    let data = serde_json::to_string(&Value::Object(fields))?;

    let existed: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM documents WHERE collection = ?1 AND doc_id = ?2)",
        params![collection, doc_id],
        |row| row.get(0),
    )?;

    conn.execute(
        "INSERT INTO documents (collection, doc_id, created_at, updated_at, data)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(collection, doc_id) DO UPDATE SET
            created_at = excluded.created_at,
            updated_at = excluded.updated_at,
            data = excluded.data",
        params![collection, doc_id, created_at, now, data],
    )
    .with_context(|| format!("Failed to store document {} in '{}'", doc_id, collection))?;

    Ok(!existed)
}

/// Write deals into the `deals` collection
pub fn upsert_deals(conn: &Connection, deals: &[Deal]) -> Result<ImportSummary> {
    let mut summary = ImportSummary::default();

    let tx = conn.unchecked_transaction()?;
    for deal in deals {
        if upsert_document(&tx, COLLECTION_DEALS, &deal.to_document())? {
            summary.inserted += 1;
        } else {
            summary.updated += 1;
        }
    }
    tx.commit()?;

    info!(
        inserted = summary.inserted,
        updated = summary.updated,
        "deals stored"
    );

    Ok(summary)
}

/// List every document of a collection in insertion order
pub fn list_documents(conn: &Connection, collection: &str) -> Result<DocumentList> {
    let mut stmt = conn.prepare(
        "SELECT doc_id, data
         FROM documents
         WHERE collection = ?1
         ORDER BY id ASC",
    )?;

    let rows = stmt
        .query_map([collection], |row| {
            let doc_id: String = row.get(0)?;
            let data: String = row.get(1)?;
            Ok((doc_id, data))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut documents = Vec::with_capacity(rows.len());
    for (doc_id, data) in rows {
        // A corrupt row is surfaced as a non-object so the board layer can classify it
        let document = serde_json::from_str(&data).unwrap_or_else(|err| {
            warn!(doc_id = %doc_id, error = %err, "stored document is not valid JSON");
            Value::Null
        });
        documents.push(document);
    }

    debug!(collection, total = documents.len(), "listed documents");

    Ok(DocumentList {
        total: documents.len(),
        documents,
    })
}

pub fn count_documents(conn: &Connection, collection: &str) -> Result<i64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM documents WHERE collection = ?1",
        [collection],
        |row| row.get(0),
    )?;

    Ok(count)
}

pub fn delete_document(conn: &Connection, collection: &str, doc_id: &str) -> Result<bool> {
    let removed = conn.execute(
        "DELETE FROM documents WHERE collection = ?1 AND doc_id = ?2",
        params![collection, doc_id],
    )?;

    Ok(removed > 0)
}

pub fn load_setting(conn: &Connection, key: &str) -> Result<Option<String>> {
    let value = conn
        .query_row("SELECT value FROM settings WHERE key = ?1", [key], |row| {
            row.get(0)
        })
        .optional()?;

    Ok(value)
}

pub fn save_setting(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO settings (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP",
        params![key, value],
    )?;

    Ok(())
}

// ============================================================================
// IMPORT
// ============================================================================

/// One CSV row; every column except the header names is optional
#[derive(Debug, Deserialize)]
struct DealRow {
    #[serde(default)]
    id: String,
    #[serde(default)]
    created_at: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    price: Option<f64>,
    #[serde(default)]
    status: String,
    #[serde(default)]
    customer_name: String,
    #[serde(default)]
    customer_email: String,
}

impl From<DealRow> for Deal {
    fn from(row: DealRow) -> Self {
        let mut deal = Deal::new(
            row.id,
            row.created_at,
            row.name,
            row.price.unwrap_or(0.0),
            row.status,
        );
        if !row.customer_name.is_empty() || !row.customer_email.is_empty() {
            deal = deal.with_customer(row.customer_name);
            if let Some(customer) = deal.customer.as_mut() {
                customer.email = Some(row.customer_email).filter(|email| !email.is_empty());
            }
        }
        deal
    }
}

pub fn load_deals_csv(csv_path: &Path) -> Result<Vec<Deal>> {
    let mut rdr = csv::Reader::from_path(csv_path).context("Failed to open CSV file")?;

    let mut deals = Vec::new();
    for result in rdr.deserialize() {
        let row: DealRow = result.context("Failed to deserialize deal row")?;
        deals.push(fill_identity(row.into()));
    }

    Ok(deals)
}

/// Load a JSON array of deal documents; fields are decoded leniently
pub fn load_deals_json(json_path: &Path) -> Result<Vec<Deal>> {
    let content = std::fs::read_to_string(json_path)
        .with_context(|| format!("Failed to read deals file: {:?}", json_path))?;

    let value: Value = serde_json::from_str(&content).context("Failed to parse deals JSON")?;
    let Value::Array(documents) = value else {
        bail!("Deals file must contain a JSON array of documents");
    };

    documents
        .iter()
        .enumerate()
        .map(|(index, document)| {
            Deal::from_document(index, document)
                .map(fill_identity)
                .with_context(|| format!("Invalid deal document at position {}", index))
        })
        .collect()
}

/// Pick a loader from the file extension
pub fn load_deals(path: &Path) -> Result<Vec<Deal>> {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("csv") => load_deals_csv(path),
        Some(ext) if ext.eq_ignore_ascii_case("json") => load_deals_json(path),
        _ => bail!("Unsupported import file {:?} (expected .csv or .json)", path),
    }
}

fn fill_identity(mut deal: Deal) -> Deal {
    if deal.id.is_empty() {
        deal.id = uuid::Uuid::new_v4().to_string();
    }
    if deal.created_at.is_empty() {
        deal.created_at = Utc::now().to_rfc3339();
    }
    deal
}
