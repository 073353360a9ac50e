//! Text-to-store reconciliation.
//!
//! The notes text is the single source of truth. A pass parses the whole
//! text and replaces everything stored for the session ("delete all,
//! recreate in document order"); there is no diffing. A failed pass leaves
//! nothing behind in memory and is simply retried on the next edit.
//! Debouncing lives in the session runtime, which only calls
//! [`Reconciler::reconcile`] once the text has been quiet long enough.

use std::sync::Arc;

use cuemark_core::types::DbId;
use cuemark_core::{grammar, Annotation};

use crate::error::RepositoryError;
use crate::repository::AnnotationRepository;

pub struct Reconciler {
    repository: Arc<dyn AnnotationRepository>,
}

impl Reconciler {
    pub fn new(repository: Arc<dyn AnnotationRepository>) -> Self {
        Self { repository }
    }

    /// Make the stored annotations for `session_id` equal to what `text`
    /// says, returning the new list in document order.
    pub async fn reconcile(
        &self,
        session_id: DbId,
        text: &str,
    ) -> Result<Vec<Annotation>, RepositoryError> {
        let parsed = grammar::parse(text);
        self.repository.replace_all(session_id, &parsed).await?;

        tracing::debug!(session_id, count = parsed.len(), "Annotations reconciled");
        Ok(parsed)
    }

    /// Load what is currently stored for `session_id`, in document order.
    pub async fn load(&self, session_id: DbId) -> Result<Vec<Annotation>, RepositoryError> {
        let mut list = self.repository.list_by_session(session_id).await?;
        list.sort_by_key(|a| a.document_index);
        Ok(list)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
