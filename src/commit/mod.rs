//! Writes answers to the results table.
//!
//! Under [`PersistencePolicy::Immediate`] every decision is appended on its
//! own before the session advances. Under [`PersistencePolicy::Batched`]
//! decisions collect in the session and [`Committer::commit`] writes them in
//! a single append. The caller clears its pending answers only after a
//! successful commit, so a failed commit can simply be retried.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::StoreResult;
use crate::resilient::ResilientStore;
use crate::session::AnswerRecord;
use crate::store::WorksheetHandle;

/// When answers are written to the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistencePolicy {
    /// One append per decision.
    Immediate,
    /// One append per commit.
    #[default]
    Batched,
}

impl std::fmt::Display for PersistencePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PersistencePolicy::Immediate => write!(f, "immediate"),
            PersistencePolicy::Batched => write!(f, "batched"),
        }
    }
}

impl std::str::FromStr for PersistencePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "immediate" => Ok(PersistencePolicy::Immediate),
            "batched" | "batch" => Ok(PersistencePolicy::Batched),
            _ => Err(format!("Unknown persistence policy: {}", s)),
        }
    }
}

/// Result of a commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitOutcome {
    pub rows_written: usize,
    pub message: String,
}

/// Appends answer rows to the results worksheet through the retrying store.
#[derive(Clone)]
pub struct Committer {
    store: ResilientStore,
    results: WorksheetHandle,
    policy: PersistencePolicy,
    include_answer_id: bool,
}

impl Committer {
    pub fn new(
        store: ResilientStore,
        results: WorksheetHandle,
        policy: PersistencePolicy,
        include_answer_id: bool,
    ) -> Self {
        Self {
            store,
            results,
            policy,
            include_answer_id,
        }
    }

    pub fn policy(&self) -> PersistencePolicy {
        self.policy
    }

    /// Append a single answer right away.
    pub async fn append_answer(&self, answer: &AnswerRecord) -> StoreResult<()> {
        debug!(
            user_id = %answer.user_id,
            example_id = answer.example_id,
            decision = %answer.decision,
            "Appending answer"
        );
        self.store
            .append_row(&self.results, answer.to_row(self.include_answer_id))
            .await
    }

    /// Append all `pending` answers in one call. Nothing is written when
    /// there is nothing pending.
    pub async fn commit(&self, pending: &[AnswerRecord]) -> StoreResult<CommitOutcome> {
        if pending.is_empty() {
            return Ok(CommitOutcome {
                rows_written: 0,
                message: "Nothing to save.".to_string(),
            });
        }

        let rows = pending
            .iter()
            .map(|answer| answer.to_row(self.include_answer_id))
            .collect();
        self.store.append_rows(&self.results, rows).await?;

        info!(rows = pending.len(), sheet = %self.results.title, "Answers committed");

        Ok(CommitOutcome {
            rows_written: pending.len(),
            message: format!("Saved {} answer(s). Thank you!", pending.len()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ExampleRecord;
    use crate::config::RetryConfig;
    use crate::error::StoreError;
    use crate::session::Decision;
    use crate::store::MockTabularStore;
    use std::sync::Arc;
    use tokio_test::{assert_err, assert_ok};

    fn results() -> WorksheetHandle {
        WorksheetHandle {
            spreadsheet_id: "sheet".to_string(),
            sheet_id: 2,
            title: "results".to_string(),
        }
    }

    fn answer(decision: Decision) -> AnswerRecord {
        let example = ExampleRecord {
            example_id: 101,
            claim: "X is true".to_string(),
            sentences: Vec::new(),
        };
        AnswerRecord::new("user_7", &example, 1, decision)
    }

    fn committer(mock: MockTabularStore, include_answer_id: bool) -> Committer {
        Committer::new(
            ResilientStore::new(Arc::new(mock), RetryConfig::default()),
            results(),
            PersistencePolicy::Batched,
            include_answer_id,
        )
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!("immediate".parse::<PersistencePolicy>().unwrap(), PersistencePolicy::Immediate);
        assert_eq!("Batched".parse::<PersistencePolicy>().unwrap(), PersistencePolicy::Batched);
        assert!("sometimes".parse::<PersistencePolicy>().is_err());
        assert_eq!(PersistencePolicy::default(), PersistencePolicy::Batched);
    }

    #[tokio::test]
    async fn test_empty_commit_makes_no_store_call() {
        let mut mock = MockTabularStore::new();
        mock.expect_append_rows().times(0);
        mock.expect_append_row().times(0);

        let outcome = assert_ok!(committer(mock, false).commit(&[]).await);
        assert_eq!(outcome.rows_written, 0);
    }

    #[tokio::test]
    async fn test_commit_writes_rows_in_order() {
        let pending = vec![answer(Decision::Support), answer(Decision::CannotDecide)];
        let expected: Vec<_> = pending.iter().map(|a| a.to_row(true)).collect();

        let mut mock = MockTabularStore::new();
        mock.expect_append_rows()
            .times(1)
            .withf(move |sheet, rows| sheet.title == "results" && *rows == expected)
            .returning(|_, _| Ok(()));

        let outcome = assert_ok!(committer(mock, true).commit(&pending).await);
        assert_eq!(outcome.rows_written, 2);
    }

    #[tokio::test]
    async fn test_append_answer_propagates_fatal_errors() {
        let mut mock = MockTabularStore::new();
        mock.expect_append_row().times(1).returning(|_, _| {
            Err(StoreError::Unauthorized {
                status: 403,
                message: "forbidden".to_string(),
            })
        });

        let err = assert_err!(committer(mock, false).append_answer(&answer(Decision::Refute)).await);
        assert!(matches!(err, StoreError::Unauthorized { .. }));
    }
}
