//! Job record persistence boundary
//!
//! The pipeline reads and writes through this trait only; real storage lives
//! with an out-of-scope collaborator. Only four logical fields matter here:
//! the posting text, the candidate-document reference, and the generated
//! document with its grade.

use crate::error::{CvTailorError, Result};
use crate::llm::grader::GradeResult;
use crate::processing::stitcher::AssembledDocument;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: String,
    pub posting_text: String,
    /// Opaque reference to the candidate's master document (a path here)
    pub master_document_ref: String,
    pub outcome: Option<StoredOutcome>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredOutcome {
    pub document: AssembledDocument,
    pub grade: GradeResult,
}

#[async_trait]
pub trait JobStore: Send + Sync {
    async fn get(&self, id: &str) -> Result<JobRecord>;

    async fn put(&self, record: JobRecord) -> Result<()>;

    async fn save_outcome(
        &self,
        id: &str,
        document: &AssembledDocument,
        grade: &GradeResult,
    ) -> Result<()>;
}

/// Map-backed store for tests and single-shot CLI runs.
#[derive(Default)]
pub struct InMemoryJobStore {
    records: RwLock<HashMap<String, JobRecord>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn get(&self, id: &str) -> Result<JobRecord> {
        self.records
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| CvTailorError::JobNotFound(id.to_string()))
    }

    async fn put(&self, record: JobRecord) -> Result<()> {
        self.records
            .write()
            .await
            .insert(record.id.clone(), record);
        Ok(())
    }

    async fn save_outcome(
        &self,
        id: &str,
        document: &AssembledDocument,
        grade: &GradeResult,
    ) -> Result<()> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(id)
            .ok_or_else(|| CvTailorError::JobNotFound(id.to_string()))?;

        record.outcome = Some(StoredOutcome {
            document: document.clone(),
            grade: grade.clone(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_roundtrip() {
        let store = InMemoryJobStore::new();
        store
            .put(JobRecord {
                id: "job-1".to_string(),
                posting_text: "Staff engineer".to_string(),
                master_document_ref: "master.txt".to_string(),
                outcome: None,
            })
            .await
            .unwrap();

        let record = store.get("job-1").await.unwrap();
        assert_eq!(record.posting_text, "Staff engineer");
        assert!(record.outcome.is_none());
    }

    #[tokio::test]
    async fn test_missing_job_errors() {
        let store = InMemoryJobStore::new();
        assert!(matches!(
            store.get("nope").await,
            Err(CvTailorError::JobNotFound(_))
        ));
    }
}
