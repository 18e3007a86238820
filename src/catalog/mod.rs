//! Read-through cache of the `examples` and `assignments` tables.
//!
//! Both tables are fetched once, on first use, and then served from memory
//! for the lifetime of the catalog. Later edits to the sheet are not seen.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::error::{AppResult, SessionError, SessionResult, StoreResult};
use crate::resilient::{ResilientStore, Workbook};
use crate::store::{cell_to_string, Record, WorksheetHandle};

/// Highest `sentence_N` column read from the examples table.
pub const MAX_SENTENCES: usize = 50;

/// A claim with its ordered evidence sentences.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExampleRecord {
    pub example_id: i64,
    pub claim: String,
    pub sentences: Vec<String>,
}

/// The ordered examples a user has to annotate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub user_id: String,
    pub example_ids: Vec<i64>,
}

/// Row counts reported after loading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CatalogSummary {
    pub examples: usize,
    pub assignments: usize,
    pub skipped_examples: usize,
}

impl ExampleRecord {
    /// Build an example from an `examples` row.
    ///
    /// Empty `sentence_N` cells are skipped wherever they occur.
    pub fn from_record(record: &Record) -> SessionResult<Self> {
        let example_id = record
            .get("example_id")
            .ok_or_else(|| SessionError::MalformedExample {
                reason: "missing example_id column".to_string(),
            })
            .and_then(parse_example_id_cell)?;

        let claim = record
            .get("claim")
            .map(cell_to_string)
            .ok_or_else(|| SessionError::MalformedExample {
                reason: format!("example {} has no claim column", example_id),
            })?;

        let sentences = (1..=MAX_SENTENCES)
            .filter_map(|i| record.get(&format!("sentence_{}", i)))
            .map(cell_to_string)
            .filter(|s| !s.trim().is_empty())
            .collect();

        Ok(Self {
            example_id,
            claim,
            sentences,
        })
    }
}

fn parse_example_id_cell(cell: &Value) -> SessionResult<i64> {
    let text = cell_to_string(cell);
    text.trim()
        .parse()
        .map_err(|_| SessionError::MalformedExample {
            reason: format!("invalid example_id {:?}", text),
        })
}

/// Parse a bracketed, comma-separated id list such as `"[35695,52186]"`.
///
/// Only an explicit `"[]"` yields an empty list; a blank cell is malformed.
/// Brackets may be omitted altogether, which is how a single-id cell comes
/// back from the sheet, but must not be unbalanced. Empty or non-integer
/// elements are rejected.
pub fn parse_example_ids(user_id: &str, raw: &str) -> SessionResult<Vec<i64>> {
    let malformed = |reason: String| SessionError::MalformedAssignment {
        user_id: user_id.to_string(),
        raw: raw.to_string(),
        reason,
    };

    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(malformed("blank example_ids cell".to_string()));
    }
    let inner = match (trimmed.strip_prefix('['), trimmed.ends_with(']')) {
        (Some(rest), true) => &rest[..rest.len() - 1],
        (None, false) => trimmed,
        _ => return Err(malformed("unbalanced brackets".to_string())),
    };

    if inner.contains('[') || inner.contains(']') {
        return Err(malformed("nested brackets".to_string()));
    }
    if inner.trim().is_empty() {
        return Ok(Vec::new());
    }

    inner
        .split(',')
        .enumerate()
        .map(|(position, element)| {
            let element = element.trim();
            if element.is_empty() {
                return Err(malformed(format!("empty element at position {}", position)));
            }
            element
                .parse::<i64>()
                .map_err(|_| malformed(format!("invalid example id {:?}", element)))
        })
        .collect()
}

struct CatalogTables {
    examples: HashMap<i64, Arc<ExampleRecord>>,
    // user_id -> raw example_ids cell, parsed on lookup
    assignments: HashMap<String, String>,
    skipped_examples: usize,
}

/// Session-lifetime cache over the examples and assignments worksheets.
pub struct ExampleCatalog {
    store: ResilientStore,
    examples_sheet: WorksheetHandle,
    assignments_sheet: WorksheetHandle,
    tables: OnceCell<CatalogTables>,
}

impl ExampleCatalog {
    /// Create a catalog over the workbook's tables; nothing is read yet.
    pub fn new(store: ResilientStore, workbook: &Workbook) -> Self {
        Self {
            store,
            examples_sheet: workbook.examples.clone(),
            assignments_sheet: workbook.assignments.clone(),
            tables: OnceCell::new(),
        }
    }

    /// Whether both tables are already cached.
    pub fn is_loaded(&self) -> bool {
        self.tables.initialized()
    }

    /// Load both tables if needed and report their sizes.
    pub async fn load(&self) -> StoreResult<CatalogSummary> {
        let tables = self.tables().await?;
        Ok(CatalogSummary {
            examples: tables.examples.len(),
            assignments: tables.assignments.len(),
            skipped_examples: tables.skipped_examples,
        })
    }

    /// Look up the assignment of `user_id`; `Ok(None)` when the user is unknown.
    pub async fn assignment(&self, user_id: &str) -> AppResult<Option<Assignment>> {
        let tables = self.tables().await?;
        match tables.assignments.get(user_id) {
            Some(raw) => Ok(Some(Assignment {
                user_id: user_id.to_string(),
                example_ids: parse_example_ids(user_id, raw)?,
            })),
            None => Ok(None),
        }
    }

    /// Fetch a cached example by id.
    pub async fn example(&self, example_id: i64) -> AppResult<Arc<ExampleRecord>> {
        let tables = self.tables().await?;
        tables
            .examples
            .get(&example_id)
            .cloned()
            .ok_or_else(|| SessionError::ExampleNotFound { example_id }.into())
    }

    async fn tables(&self) -> StoreResult<&CatalogTables> {
        self.tables.get_or_try_init(|| self.fetch()).await
    }

    async fn fetch(&self) -> StoreResult<CatalogTables> {
        let example_rows = self.store.get_all_records(&self.examples_sheet).await?;
        let assignment_rows = self.store.get_all_records(&self.assignments_sheet).await?;

        let mut examples = HashMap::new();
        let mut skipped_examples = 0;
        for (index, record) in example_rows.iter().enumerate() {
            match ExampleRecord::from_record(record) {
                Ok(example) => {
                    examples
                        .entry(example.example_id)
                        .or_insert_with(|| Arc::new(example));
                }
                Err(e) => {
                    skipped_examples += 1;
                    // +2: header row and 1-based sheet rows
                    warn!(row = index + 2, error = %e, "Skipping example row");
                }
            }
        }

        let mut assignments = HashMap::new();
        for record in &assignment_rows {
            let user_id = record.get("user_id").map(cell_to_string).unwrap_or_default();
            if user_id.trim().is_empty() {
                continue;
            }
            // A missing column reads as a blank cell and fails on lookup
            let raw = record
                .get("example_ids")
                .map(cell_to_string)
                .unwrap_or_default();
            // First matching row wins
            assignments.entry(user_id.trim().to_string()).or_insert(raw);
        }

        info!(
            examples = examples.len(),
            assignments = assignments.len(),
            skipped = skipped_examples,
            "Catalog loaded"
        );

        Ok(CatalogTables {
            examples,
            assignments,
            skipped_examples,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RetryConfig, TableConfig};
    use crate::error::AppError;
    use crate::store::{MemoryStore, StoreOp};
    use serde_json::json;

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_parse_example_ids() {
        assert_eq!(parse_example_ids("u", "[35695,52186]").unwrap(), vec![35695, 52186]);
        assert_eq!(parse_example_ids("u", " [ 1 , 2 ,3 ] ").unwrap(), vec![1, 2, 3]);
        assert_eq!(parse_example_ids("u", "101").unwrap(), vec![101]);
        assert_eq!(parse_example_ids("u", "101,102").unwrap(), vec![101, 102]);
    }

    #[test]
    fn test_parse_empty_list() {
        assert!(parse_example_ids("u", "[]").unwrap().is_empty());
        assert!(parse_example_ids("u", "[ ]").unwrap().is_empty());
    }

    #[test]
    fn test_parse_blank_cell_is_malformed() {
        for raw in ["", "   "] {
            assert!(matches!(
                parse_example_ids("u", raw),
                Err(SessionError::MalformedAssignment { ref reason, .. }) if reason.contains("blank")
            ));
        }
    }

    #[test]
    fn test_parse_malformed_lists() {
        for raw in ["[1,2", "1,2]", "[1,,2]", "[1,a]", "[[1]]", "[1.5]", "[1,]"] {
            let err = parse_example_ids("user_3", raw).unwrap_err();
            assert!(
                matches!(err, SessionError::MalformedAssignment { ref user_id, .. } if user_id == "user_3"),
                "{} should be malformed",
                raw
            );
        }
    }

    #[test]
    fn test_example_from_record_skips_empty_sentences() {
        let example = ExampleRecord::from_record(&record(json!({
            "example_id": 101,
            "claim": "X is true",
            "sentence_1": "first",
            "sentence_2": "",
            "sentence_3": "third",
            "sentence_4": "   ",
        })))
        .unwrap();

        assert_eq!(example.example_id, 101);
        assert_eq!(example.claim, "X is true");
        assert_eq!(example.sentences, vec!["first", "third"]);
    }

    #[test]
    fn test_example_id_accepts_numeric_strings_and_floats() {
        let from_string =
            ExampleRecord::from_record(&record(json!({"example_id": "42", "claim": "c"}))).unwrap();
        assert_eq!(from_string.example_id, 42);

        let from_float =
            ExampleRecord::from_record(&record(json!({"example_id": 42.0, "claim": "c"}))).unwrap();
        assert_eq!(from_float.example_id, 42);
    }

    #[test]
    fn test_example_without_id_is_malformed() {
        let err = ExampleRecord::from_record(&record(json!({"claim": "c"}))).unwrap_err();
        assert!(matches!(err, SessionError::MalformedExample { .. }));

        let err =
            ExampleRecord::from_record(&record(json!({"example_id": "abc", "claim": "c"})))
                .unwrap_err();
        assert!(matches!(err, SessionError::MalformedExample { .. }));
    }

    #[test]
    fn test_sentences_capped_at_fifty() {
        let mut map = record(json!({"example_id": 1, "claim": "c"}));
        for i in 1..=55 {
            map.insert(format!("sentence_{}", i), json!(format!("s{}", i)));
        }
        let example = ExampleRecord::from_record(&map).unwrap();
        assert_eq!(example.sentences.len(), MAX_SENTENCES);
        assert_eq!(example.sentences.last().unwrap(), "s50");
    }

    async fn catalog(store: Arc<MemoryStore>) -> ExampleCatalog {
        let resilient = ResilientStore::new(store, RetryConfig::default());
        let tables = TableConfig {
            spreadsheet: "study".to_string(),
            ..TableConfig::default()
        };
        let workbook = resilient.open_workbook(&tables).await.unwrap();
        ExampleCatalog::new(resilient, &workbook)
    }

    fn study_store() -> Arc<MemoryStore> {
        Arc::new(
            MemoryStore::new("study")
                .with_table(
                    "examples",
                    &["example_id", "claim", "sentence_1"],
                    vec![
                        vec![json!(101), json!("X is true"), json!("a")],
                        vec![json!("oops"), json!("bad row"), json!("")],
                        vec![json!(101), json!("duplicate"), json!("b")],
                    ],
                )
                .with_table(
                    "assignments",
                    &["user_id", "example_ids"],
                    vec![
                        vec![json!("user_7"), json!("[101,102]")],
                        vec![json!("user_7"), json!("[999]")],
                        vec![json!("user_bad"), json!("[1,x]")],
                    ],
                )
                .with_table("results", &["user_id"], Vec::new()),
        )
    }

    #[tokio::test]
    async fn test_catalog_loads_once() {
        let store = study_store();
        let catalog = catalog(store.clone()).await;
        assert!(!catalog.is_loaded());

        let summary = catalog.load().await.unwrap();
        assert_eq!(summary.examples, 1);
        assert_eq!(summary.assignments, 2);
        assert_eq!(summary.skipped_examples, 1);

        catalog.example(101).await.unwrap();
        catalog.assignment("user_7").await.unwrap();
        assert!(catalog.is_loaded());
        assert_eq!(store.call_count(StoreOp::Read), 2);
    }

    #[tokio::test]
    async fn test_catalog_first_rows_win() {
        let catalog = catalog(study_store()).await;

        let example = catalog.example(101).await.unwrap();
        assert_eq!(example.claim, "X is true");

        let assignment = catalog.assignment("user_7").await.unwrap().unwrap();
        assert_eq!(assignment.example_ids, vec![101, 102]);
    }

    #[tokio::test]
    async fn test_missing_example_ids_column_is_malformed() {
        let store = Arc::new(
            MemoryStore::new("study")
                .with_table("examples", &["example_id", "claim"], Vec::new())
                .with_table("assignments", &["user_id"], vec![vec![json!("user_7")]])
                .with_table("results", &["user_id"], Vec::new()),
        );
        let catalog = catalog(store).await;

        assert!(matches!(
            catalog.assignment("user_7").await,
            Err(AppError::Session(SessionError::MalformedAssignment { .. }))
        ));
    }

    #[tokio::test]
    async fn test_catalog_lookup_failures() {
        let catalog = catalog(study_store()).await;

        assert!(catalog.assignment("nobody").await.unwrap().is_none());
        assert!(matches!(
            catalog.assignment("user_bad").await,
            Err(AppError::Session(SessionError::MalformedAssignment { .. }))
        ));
        assert!(matches!(
            catalog.example(5).await,
            Err(AppError::Session(SessionError::ExampleNotFound { example_id: 5 }))
        ));
    }
}
