//! Per-user annotation session state.
//!
//! A [`SessionState`] lives only as long as the client session. The only
//! thing that outlives it is what the committer has written to the results
//! table.

use chrono::Local;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::catalog::ExampleRecord;
use crate::error::{SessionError, SessionResult};
use crate::store::Row;

/// Timestamp layout written to the results table.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// The participant's judgment on a claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Support,
    Refute,
    CannotDecide,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Support => "support",
            Decision::Refute => "refute",
            Decision::CannotDecide => "cannot_decide",
        }
    }
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Decision {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "support" => Ok(Decision::Support),
            "refute" => Ok(Decision::Refute),
            "cannot_decide" => Ok(Decision::CannotDecide),
            _ => Err(format!("Unknown decision: {}", s)),
        }
    }
}

/// One recorded decision, immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerRecord {
    /// Per-answer key, only written when the results table carries it.
    pub answer_id: Uuid,
    pub user_id: String,
    pub example_id: i64,
    pub claim: String,
    /// Sentences visible when the decision was made.
    pub sentences_shown: usize,
    pub decision: Decision,
    /// Decision time, not commit time.
    pub timestamp: String,
}

impl AnswerRecord {
    /// Capture a decision on `example` made now.
    pub fn new(
        user_id: impl Into<String>,
        example: &ExampleRecord,
        sentences_shown: usize,
        decision: Decision,
    ) -> Self {
        Self {
            answer_id: Uuid::new_v4(),
            user_id: user_id.into(),
            example_id: example.example_id,
            claim: example.claim.clone(),
            sentences_shown,
            decision,
            timestamp: Local::now().format(TIMESTAMP_FORMAT).to_string(),
        }
    }

    /// Serialize as a results row:
    /// `[user_id, example_id, claim, sentences_shown, decision, timestamp]`,
    /// optionally followed by the answer id.
    pub fn to_row(&self, include_answer_id: bool) -> Row {
        let mut row = vec![
            Value::from(self.user_id.clone()),
            Value::from(self.example_id),
            Value::from(self.claim.clone()),
            Value::from(self.sentences_shown as u64),
            Value::from(self.decision.as_str()),
            Value::from(self.timestamp.clone()),
        ];
        if include_answer_id {
            row.push(Value::from(self.answer_id.to_string()));
        }
        row
    }
}

/// Where a session is in the annotation flow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    #[default]
    NotLoggedIn,
    LoadingAssignment,
    UserNotFound,
    InProgress,
    Complete,
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionPhase::NotLoggedIn => write!(f, "not_logged_in"),
            SessionPhase::LoadingAssignment => write!(f, "loading_assignment"),
            SessionPhase::UserNotFound => write!(f, "user_not_found"),
            SessionPhase::InProgress => write!(f, "in_progress"),
            SessionPhase::Complete => write!(f, "complete"),
        }
    }
}

/// In-memory progress of one participant.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionState {
    phase: SessionPhase,
    user_id: Option<String>,
    example_ids: Vec<i64>,
    current_index: usize,
    sentences_shown: usize,
    shown_sentences: Vec<String>,
    pending_answers: Vec<AnswerRecord>,
}

impl SessionState {
    /// Fresh session with no user entered.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn example_ids(&self) -> &[i64] {
        &self.example_ids
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn sentences_shown(&self) -> usize {
        self.sentences_shown
    }

    pub fn shown_sentences(&self) -> &[String] {
        &self.shown_sentences
    }

    pub fn pending_answers(&self) -> &[AnswerRecord] {
        &self.pending_answers
    }

    /// Example currently presented, if the session is in progress.
    pub fn current_example_id(&self) -> Option<i64> {
        match self.phase {
            SessionPhase::InProgress => self.example_ids.get(self.current_index).copied(),
            _ => None,
        }
    }

    /// Start looking up `user_id`, discarding any previous progress.
    pub fn begin_login(&mut self, user_id: impl Into<String>) {
        *self = Self {
            phase: SessionPhase::LoadingAssignment,
            user_id: Some(user_id.into()),
            ..Self::default()
        };
    }

    /// Bind the looked-up assignment. An empty list completes immediately.
    pub fn bind_assignment(&mut self, example_ids: Vec<i64>) {
        self.example_ids = example_ids;
        self.current_index = 0;
        self.reset_reveal();
        self.phase = if self.example_ids.is_empty() {
            SessionPhase::Complete
        } else {
            SessionPhase::InProgress
        };
    }

    /// The entered user has no assignment.
    pub fn mark_user_not_found(&mut self) {
        self.phase = SessionPhase::UserNotFound;
    }

    /// Error unless the session is presenting an example.
    pub fn require_in_progress(&self) -> SessionResult<()> {
        match self.phase {
            SessionPhase::InProgress => Ok(()),
            SessionPhase::NotLoggedIn => Err(SessionError::NotLoggedIn),
            SessionPhase::UserNotFound => Err(SessionError::UserNotFound {
                user_id: self.user_id.clone().unwrap_or_default(),
            }),
            phase => Err(SessionError::NotInProgress {
                phase: phase.to_string(),
            }),
        }
    }

    /// Reveal the next of `sentences`. Returns `false` when all of them are
    /// already shown.
    pub fn reveal_next(&mut self, sentences: &[String]) -> SessionResult<bool> {
        self.require_in_progress()?;
        match sentences.get(self.sentences_shown) {
            Some(sentence) => {
                self.shown_sentences.push(sentence.clone());
                self.sentences_shown += 1;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Hold an answer until the next commit.
    pub fn queue_answer(&mut self, answer: AnswerRecord) {
        self.pending_answers.push(answer);
    }

    /// Drop answers the store has confirmed.
    pub fn clear_pending(&mut self) {
        self.pending_answers.clear();
    }

    /// Move to the next example, completing after the last one.
    pub fn advance(&mut self) -> SessionResult<()> {
        self.require_in_progress()?;
        self.current_index += 1;
        self.reset_reveal();
        if self.current_index >= self.example_ids.len() {
            self.phase = SessionPhase::Complete;
        }
        Ok(())
    }

    fn reset_reveal(&mut self) {
        self.sentences_shown = 0;
        self.shown_sentences.clear();
    }
}
