/*!
 * Background Jobs
 * Detached tool invocations with observable completion status
 */

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::error::{BluedeckError, Result};
use crate::process::CommandOutput;

/// Finished jobs kept around for status queries.
const RETAINED_FINISHED: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Scan,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobStatus {
    Running,
    Finished { success: bool, output: String },
    Failed { error: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub kind: JobKind,
    pub status: JobStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Returned to whoever started a job. Dropping it detaches the task.
pub struct JobHandle {
    pub id: Uuid,
    /// The job as registered, before `work` had a chance to run.
    pub job: Job,
    pub task: JoinHandle<()>,
}

#[derive(Default)]
struct Jobs {
    by_id: HashMap<Uuid, Job>,
    /// Completion order, oldest first.
    finished: VecDeque<Uuid>,
}

#[derive(Default)]
pub struct JobRegistry {
    jobs: RwLock<Jobs>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a running job and drives `work` to completion on its own task.
    pub async fn spawn<F>(self: &Arc<Self>, kind: JobKind, work: F) -> JobHandle
    where
        F: Future<Output = Result<CommandOutput>> + Send + 'static,
    {
        let id = Uuid::new_v4();
        let job = Job {
            id,
            kind,
            status: JobStatus::Running,
            started_at: Utc::now(),
            finished_at: None,
        };
        self.jobs.write().await.by_id.insert(id, job.clone());

        let registry = Arc::clone(self);
        let task = tokio::spawn(async move {
            let status = match work.await {
                Ok(output) => JobStatus::Finished {
                    success: output.success,
                    output: output.text,
                },
                Err(e) => JobStatus::Failed {
                    error: e.to_string(),
                },
            };
            tracing::info!("Job {} ({:?}) completed: {:?}", id, kind, status);
            registry.complete(id, status).await;
        });

        JobHandle { id, job, task }
    }

    pub async fn get(&self, id: Uuid) -> Result<Job> {
        self.jobs
            .read()
            .await
            .by_id
            .get(&id)
            .cloned()
            .ok_or(BluedeckError::UnknownJob(id))
    }

    async fn complete(&self, id: Uuid, status: JobStatus) {
        let mut guard = self.jobs.write().await;
        let jobs = &mut *guard;
        if let Some(job) = jobs.by_id.get_mut(&id) {
            job.status = status;
            job.finished_at = Some(Utc::now());
            jobs.finished.push_back(id);
        }

        while jobs.finished.len() > RETAINED_FINISHED {
            if let Some(old) = jobs.finished.pop_front() {
                jobs.by_id.remove(&old);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn job_runs_to_completion() {
        let registry = Arc::new(JobRegistry::new());
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();

        let handle = registry
            .spawn(JobKind::Scan, async move {
                let _ = rx.await;
                Ok(CommandOutput::ok("Discovery started"))
            })
            .await;

        let job = registry.get(handle.id).await.unwrap();
        assert_eq!(job.status, JobStatus::Running);
        assert!(job.finished_at.is_none());

        tx.send(()).unwrap();
        handle.task.await.unwrap();

        let job = registry.get(handle.id).await.unwrap();
        assert_eq!(
            job.status,
            JobStatus::Finished {
                success: true,
                output: "Discovery started".to_string()
            }
        );
        assert!(job.finished_at.is_some());
    }

    #[tokio::test]
    async fn spawn_failure_is_recorded() {
        let registry = Arc::new(JobRegistry::new());
        let handle = registry
            .spawn(JobKind::Scan, async {
                Err(BluedeckError::Invocation {
                    program: "timeout".to_string(),
                    source: std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
                })
            })
            .await;
        handle.task.await.unwrap();

        match registry.get(handle.id).await.unwrap().status {
            JobStatus::Failed { error } => assert!(error.contains("timeout")),
            other => panic!("unexpected status {:?}", other),
        }
    }

    #[tokio::test]
    async fn handle_keeps_registered_state() {
        let registry = Arc::new(JobRegistry::new());
        let handle = registry
            .spawn(JobKind::Scan, async { Ok(CommandOutput::ok("done")) })
            .await;
        handle.task.await.unwrap();

        assert_eq!(handle.job.status, JobStatus::Running);
        assert!(handle.job.finished_at.is_none());
        assert!(matches!(
            registry.get(handle.id).await.unwrap().status,
            JobStatus::Finished { .. }
        ));
    }

    #[tokio::test]
    async fn unknown_job_is_an_error() {
        let registry = JobRegistry::new();
        let err = registry.get(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, BluedeckError::UnknownJob(_)));
    }

    #[tokio::test]
    async fn old_finished_jobs_are_pruned() {
        let registry = Arc::new(JobRegistry::new());
        let mut ids = Vec::new();
        for _ in 0..RETAINED_FINISHED + 3 {
            let handle = registry
                .spawn(JobKind::Scan, async { Ok(CommandOutput::ok("")) })
                .await;
            handle.task.await.unwrap();
            ids.push(handle.id);
        }

        assert_eq!(registry.jobs.read().await.by_id.len(), RETAINED_FINISHED);
        assert!(registry.get(ids[0]).await.is_err());
        assert!(registry.get(*ids.last().unwrap()).await.is_ok());
    }
}
