// 📋 Board Assembly - deals → ordered kanban columns
//
// The template fixes which columns exist and in what order. Data never adds,
// removes or reorders columns; it only fills them.

use crate::db::DocumentList;
use crate::deal::{parse_timestamp, Deal};
use crate::errors::{TemplateError, TransformError};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};
use tracing::{debug, trace};

// ============================================================================
// TEMPLATE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnTemplate {
    /// Matched against `Deal::status`
    pub id: String,

    /// Display name, copied onto every card placed in the column
    pub name: String,
}

impl ColumnTemplate {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Ordered, validated column definitions.
///
/// Construction guarantees at least one column and unique, non-empty ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BoardTemplate {
    columns: Vec<ColumnTemplate>,
}

impl BoardTemplate {
    pub fn new(columns: Vec<ColumnTemplate>) -> Result<Self, TemplateError> {
        if columns.is_empty() {
            return Err(TemplateError::Empty);
        }

        let mut seen = HashSet::new();
        for (position, column) in columns.iter().enumerate() {
            if column.id.is_empty() {
                return Err(TemplateError::EmptyColumnId { position });
            }
            if !seen.insert(column.id.as_str()) {
                return Err(TemplateError::DuplicateColumn {
                    id: column.id.clone(),
                });
            }
        }

        Ok(Self { columns })
    }

    pub fn columns(&self) -> &[ColumnTemplate] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// A fresh board with every column present and empty.
    pub fn empty_board(&self) -> Board {
        Board {
            columns: self
                .columns
                .iter()
                .map(|column| Column {
                    id: column.id.clone(),
                    name: column.name.clone(),
                    items: Vec::new(),
                })
                .collect(),
        }
    }
}

impl Default for BoardTemplate {
    /// The sales pipeline used when no template is configured.
    fn default() -> Self {
        Self {
            columns: vec![
                ColumnTemplate::new("todo", "Incoming"),
                ColumnTemplate::new("to-be-agreed", "Awaiting approval"),
                ColumnTemplate::new("in-progress", "In progress"),
                ColumnTemplate::new("produced", "Produced"),
            ],
        }
    }
}

// ============================================================================
// BOARD
// ============================================================================

/// Display projection of a single deal. Owned by the board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    pub id: String,
    pub created_at: String,
    pub name: String,
    pub price: f64,
    pub company_name: String,
    /// Display name of the column, not its id
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub id: String,
    pub name: String,
    pub items: Vec<Card>,
}

impl Column {
    pub fn total_price(&self) -> f64 {
        self.items.iter().map(|card| card.price).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Board {
    pub columns: Vec<Column>,
}

impl Board {
    pub fn total_cards(&self) -> usize {
        self.columns.iter().map(|column| column.items.len()).sum()
    }

    pub fn column(&self, id: &str) -> Option<&Column> {
        self.columns.iter().find(|column| column.id == id)
    }

    pub fn find_card(&self, card_id: &str) -> Option<&Card> {
        self.columns
            .iter()
            .flat_map(|column| column.items.iter())
            .find(|card| card.id == card_id)
    }
}

// ============================================================================
// ASSEMBLY
// ============================================================================

/// Place deals into the template's columns and sort each column newest first.
///
/// Deals whose status matches no column are skipped. Cards with an
/// unparseable `created_at` sort after every dated card.
pub fn assemble(template: &BoardTemplate, deals: &[Deal]) -> Board {
    let mut board = template.empty_board();

    let index: HashMap<String, usize> = board
        .columns
        .iter()
        .enumerate()
        .map(|(position, column)| (column.id.clone(), position))
        .collect();

    let mut skipped = 0usize;
    for deal in deals {
        let Some(&position) = index.get(&deal.status) else {
            trace!(deal_id = %deal.id, status = %deal.status, "deal status not on board");
            skipped += 1;
            continue;
        };

        let column = &mut board.columns[position];
        column.items.push(Card {
            id: deal.id.clone(),
            created_at: deal.created_at.clone(),
            name: deal.name.clone(),
            price: deal.price,
            company_name: deal.company_name(),
            status: column.name.clone(),
        });
    }

    // Sort once, after population, so input order never matters.
    for column in &mut board.columns {
        column
            .items
            .sort_by_cached_key(|card| Reverse(parse_timestamp(&card.created_at)));
    }

    debug!(
        placed = board.total_cards(),
        skipped,
        columns = board.columns.len(),
        "board assembled"
    );

    board
}

/// Decode a store response and assemble it.
///
/// Fails only when a document is not an object; every other defect is
/// absorbed by field defaults.
pub fn assemble_documents(
    template: &BoardTemplate,
    response: &DocumentList,
) -> Result<Board, TransformError> {
    let deals = response
        .documents
        .iter()
        .enumerate()
        .map(|(index, document)| Deal::from_document(index, document))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(assemble(template, &deals))
}
