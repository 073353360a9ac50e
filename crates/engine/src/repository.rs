//! Annotation Repository capability and an in-memory implementation.

use std::collections::HashMap;

use async_trait::async_trait;
use cuemark_core::types::DbId;
use cuemark_core::Annotation;
use tokio::sync::RwLock;

use crate::error::RepositoryError;

/// Persistence capability consumed by the reconciler.
///
/// The store for a session is only ever replaced wholesale, so
/// implementations must make `replace_all` atomic: readers see either the
/// old list or the new one.
#[async_trait]
pub trait AnnotationRepository: Send + Sync {
    /// All annotations stored for `session_id`, in document order.
    async fn list_by_session(&self, session_id: DbId) -> Result<Vec<Annotation>, RepositoryError>;

    /// Replace the session's annotations with `annotations`.
    async fn replace_all(
        &self,
        session_id: DbId,
        annotations: &[Annotation],
    ) -> Result<(), RepositoryError>;
}

/// Process-local repository, used by tests and the simulator.
#[derive(Debug, Default)]
pub struct InMemoryAnnotationRepository {
    sessions: RwLock<HashMap<DbId, Vec<Annotation>>>,
}

impl InMemoryAnnotationRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AnnotationRepository for InMemoryAnnotationRepository {
    async fn list_by_session(&self, session_id: DbId) -> Result<Vec<Annotation>, RepositoryError> {
        let sessions = self.sessions.read().await;
        let mut list = sessions.get(&session_id).cloned().unwrap_or_default();
        list.sort_by_key(|a| a.document_index);
        Ok(list)
    }

    async fn replace_all(
        &self,
        session_id: DbId,
        annotations: &[Annotation],
    ) -> Result<(), RepositoryError> {
        let mut sessions = self.sessions.write().await;
        sessions.insert(session_id, annotations.to_vec());
        Ok(())
    }
}
