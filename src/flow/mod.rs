//! Annotation flow controller.
//!
//! Turns user actions (log in, reveal the next sentence, decide, commit)
//! into [`SessionState`] transitions and store writes, and renders the
//! resulting [`SessionView`]. Every action either completes or leaves the
//! session as it was, so a failed action can be repeated.

use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::catalog::ExampleCatalog;
use crate::commit::{CommitOutcome, Committer, PersistencePolicy};
use crate::error::{AppResult, SessionError};
use crate::session::{AnswerRecord, Decision, SessionPhase, SessionState};

pub const PROMPT_MESSAGE: &str = "Enter your user ID (e.g., user_1).";
pub const NOT_FOUND_MESSAGE: &str = "User not found.";
pub const COMPLETE_MESSAGE: &str = "You have completed all examples. Thank you!";

/// What the participant sees after an action.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionView {
    pub phase: SessionPhase,
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub example_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claim: Option<String>,
    pub shown_sentences: Vec<String>,
    pub sentences_shown: usize,
    pub sentences_total: usize,
    pub current_index: usize,
    pub total_examples: usize,
    pub pending_answers: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Outcome of a decision.
#[derive(Debug, Clone, Serialize)]
pub struct DecisionOutcome {
    pub answer: AnswerRecord,
    /// Whether the answer is already in the results table.
    pub persisted: bool,
    pub view: SessionView,
}

/// Outcome of a commit.
#[derive(Debug, Clone, Serialize)]
pub struct CommitResult {
    pub commit: CommitOutcome,
    pub view: SessionView,
}

/// Drives sessions against the cached tables and the committer.
pub struct AnnotationFlow {
    catalog: Arc<ExampleCatalog>,
    committer: Committer,
}

impl AnnotationFlow {
    pub fn new(catalog: Arc<ExampleCatalog>, committer: Committer) -> Self {
        Self { catalog, committer }
    }

    pub fn catalog(&self) -> &ExampleCatalog {
        &self.catalog
    }

    /// Enter a user id and bind its assignment.
    ///
    /// Blank input leaves the session untouched. Re-entering the current
    /// user keeps progress; switching users is refused while answers are
    /// still pending.
    pub async fn login(&self, state: &mut SessionState, user_id: &str) -> AppResult<SessionView> {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            return self.view(state).await;
        }

        let same_user = state.user_id() == Some(user_id);
        if same_user
            && matches!(
                state.phase(),
                SessionPhase::InProgress | SessionPhase::Complete
            )
        {
            return self.view(state).await;
        }
        if !same_user && !state.pending_answers().is_empty() {
            return Err(SessionError::UncommittedAnswers {
                count: state.pending_answers().len(),
            }
            .into());
        }

        // Committed to `state` only once the lookup and the view succeeded
        let mut next = state.clone();
        next.begin_login(user_id);

        match self.catalog.assignment(user_id).await? {
            Some(assignment) => {
                info!(
                    user_id = %user_id,
                    examples = assignment.example_ids.len(),
                    "Assignment bound"
                );
                next.bind_assignment(assignment.example_ids);
            }
            None => {
                warn!(user_id = %user_id, "User not found");
                next.mark_user_not_found();
            }
        }

        let view = self.view(&next).await?;
        *state = next;
        Ok(view)
    }

    /// Render the session without changing it.
    pub async fn view(&self, state: &SessionState) -> AppResult<SessionView> {
        let mut view = SessionView {
            phase: state.phase(),
            user_id: state.user_id().map(str::to_string),
            example_id: None,
            claim: None,
            shown_sentences: state.shown_sentences().to_vec(),
            sentences_shown: state.sentences_shown(),
            sentences_total: 0,
            current_index: state.current_index(),
            total_examples: state.example_ids().len(),
            pending_answers: state.pending_answers().len(),
            message: None,
        };

        match state.phase() {
            SessionPhase::NotLoggedIn => view.message = Some(PROMPT_MESSAGE.to_string()),
            SessionPhase::UserNotFound => view.message = Some(NOT_FOUND_MESSAGE.to_string()),
            SessionPhase::Complete => view.message = Some(COMPLETE_MESSAGE.to_string()),
            SessionPhase::LoadingAssignment => {}
            SessionPhase::InProgress => {
                if let Some(example_id) = state.current_example_id() {
                    let example = self.catalog.example(example_id).await?;
                    view.example_id = Some(example_id);
                    view.claim = Some(example.claim.clone());
                    view.sentences_total = example.sentences.len();
                }
            }
        }

        Ok(view)
    }

    /// Reveal the next evidence sentence; a no-op once all are shown.
    pub async fn reveal_next(&self, state: &mut SessionState) -> AppResult<SessionView> {
        state.require_in_progress()?;
        let example_id = current_example(state)?;
        let example = self.catalog.example(example_id).await?;

        if !state.reveal_next(&example.sentences)? {
            info!(example_id, "All sentences already revealed");
        }

        self.view(state).await
    }

    /// Record a decision on the current example and move on.
    ///
    /// The next example is resolved before anything is written. With
    /// immediate persistence the row is then appended, and the session only
    /// advances once the append succeeded.
    pub async fn decide(
        &self,
        state: &mut SessionState,
        decision: Decision,
    ) -> AppResult<DecisionOutcome> {
        state.require_in_progress()?;
        let example_id = current_example(state)?;
        let example = self.catalog.example(example_id).await?;
        let user_id = state.user_id().unwrap_or_default().to_string();

        let answer = AnswerRecord::new(user_id, &example, state.sentences_shown(), decision);

        let persisted = self.committer.policy() == PersistencePolicy::Immediate;
        let mut next = state.clone();
        if !persisted {
            next.queue_answer(answer.clone());
        }
        next.advance()?;
        let view = self.view(&next).await?;

        if persisted {
            self.committer.append_answer(&answer).await?;
        }
        *state = next;

        info!(
            user_id = %answer.user_id,
            example_id,
            decision = %decision,
            sentences_shown = answer.sentences_shown,
            persisted,
            "Decision recorded"
        );

        Ok(DecisionOutcome {
            answer,
            persisted,
            view,
        })
    }

    /// Write all pending answers; they are cleared only on success.
    pub async fn commit(&self, state: &mut SessionState) -> AppResult<CommitResult> {
        let mut next = state.clone();
        next.clear_pending();
        let mut view = self.view(&next).await?;

        let commit = self.committer.commit(state.pending_answers()).await?;
        *state = next;

        if commit.rows_written > 0 {
            view.message = Some(commit.message.clone());
        }
        Ok(CommitResult { commit, view })
    }
}

fn current_example(state: &SessionState) -> AppResult<i64> {
    state.current_example_id().ok_or_else(|| {
        SessionError::NotInProgress {
            phase: state.phase().to_string(),
        }
        .into()
    })
}
