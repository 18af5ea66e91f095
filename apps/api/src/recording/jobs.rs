//! Background recording jobs, each scoped by a cancellation token.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::recording::{AudioSource, PipelineOutcome, RecordingJob, RecordingPipeline, RecordingState};

/// Finished jobs are kept this long for status polling.
const FINISHED_RETENTION: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, Serialize)]
pub struct JobStatus {
    pub job_id: Uuid,
    pub state: RecordingState,
    pub finished: bool,
    pub outcome: Option<PipelineOutcome>,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
enum JobResult {
    Done(PipelineOutcome),
    Failed(String),
}

struct JobEntry {
    user_id: Uuid,
    state: watch::Receiver<RecordingState>,
    cancel: CancellationToken,
    result: Arc<Mutex<Option<(JobResult, Instant)>>>,
}

#[derive(Clone, Default)]
pub struct RecordingJobs {
    jobs: Arc<Mutex<HashMap<Uuid, JobEntry>>>,
}

impl RecordingJobs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn<S>(&self, pipeline: Arc<RecordingPipeline>, job: RecordingJob, source: S) -> Uuid
    where
        S: AudioSource + 'static,
    {
        self.prune_finished();

        let job_id = Uuid::new_v4();
        let (tx, rx) = watch::channel(RecordingState::Idle);
        let cancel = CancellationToken::new();
        let result = Arc::new(Mutex::new(None));

        self.jobs.lock().insert(
            job_id,
            JobEntry {
                user_id: job.user_id,
                state: rx,
                cancel: cancel.clone(),
                result: result.clone(),
            },
        );

        tokio::spawn(async move {
            let outcome = pipeline.run(&job, source, &tx, &cancel).await;
            let finished = match outcome {
                Ok(o) => JobResult::Done(o),
                Err(e) => JobResult::Failed(e.to_string()),
            };
            *result.lock() = Some((finished, Instant::now()));
        });

        job_id
    }

    /// Jobs are only visible to the user who started them.
    pub fn status(&self, job_id: Uuid, user_id: Uuid) -> Option<JobStatus> {
        let jobs = self.jobs.lock();
        let entry = jobs.get(&job_id).filter(|e| e.user_id == user_id)?;
        let state = *entry.state.borrow();
        let result = entry.result.lock().as_ref().map(|(r, _)| r.clone());

        let (outcome, error) = match result.clone() {
            Some(JobResult::Done(o)) => (Some(o), None),
            Some(JobResult::Failed(e)) => (None, Some(e)),
            None => (None, None),
        };
        Some(JobStatus {
            job_id,
            state,
            finished: result.is_some(),
            outcome,
            error,
        })
    }

    /// Cancels a running job. Returns false if the job is unknown.
    pub fn cancel(&self, job_id: Uuid, user_id: Uuid) -> bool {
        match self.jobs.lock().get(&job_id).filter(|e| e.user_id == user_id) {
            Some(entry) => {
                entry.cancel.cancel();
                true
            }
            None => false,
        }
    }

    fn prune_finished(&self) {
        self.jobs.lock().retain(|_, entry| match &*entry.result.lock() {
            Some((_, finished_at)) => finished_at.elapsed() < FINISHED_RETENTION,
            None => true,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::fakes::*;
    use tokio::sync::Notify;

    fn jobs_with(f: Fixture) -> (RecordingJobs, Arc<RecordingPipeline>) {
        (RecordingJobs::new(), Arc::new(f.pipeline))
    }

    async fn wait_until(
        jobs: &RecordingJobs,
        id: Uuid,
        user: Uuid,
        done: impl Fn(&JobStatus) -> bool,
    ) -> JobStatus {
        for _ in 0..200 {
            let status = jobs.status(id, user).unwrap();
            if done(&status) {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("job {id} never reached the expected status");
    }

    #[tokio::test]
    async fn test_finished_job_reports_outcome() {
        let f = fixture(FakeStore::default(), transcriber(PLAN), FakeRecords::default());
        let records = f.records.clone();
        let (jobs, pipeline) = jobs_with(f);
        let user = Uuid::new_v4();
        let (src, _) = source(&[b"ab"], false);

        let id = jobs.spawn(pipeline, job(user, None, false), src);
        let status = wait_until(&jobs, id, user, |s| s.finished).await;

        assert_eq!(status.job_id, id);
        assert_eq!(status.state, RecordingState::Idle);
        assert!(status.error.is_none());
        assert_eq!(status.outcome.unwrap().action_items, vec!["call back"]);
        assert_eq!(records.saved.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_job_reports_error() {
        let f = fixture(
            FakeStore {
                fail: true,
                ..Default::default()
            },
            transcriber(PLAN),
            FakeRecords::default(),
        );
        let (jobs, pipeline) = jobs_with(f);
        let user = Uuid::new_v4();
        let (src, _) = source(&[b"ab"], false);

        let id = jobs.spawn(pipeline, job(user, None, false), src);
        let status = wait_until(&jobs, id, user, |s| s.finished).await;

        assert!(status.outcome.is_none());
        assert!(status.error.unwrap().starts_with("Upload failed"));
    }

    #[tokio::test]
    async fn test_jobs_are_private_to_their_owner() {
        let gate = Arc::new(Notify::new());
        let f = fixture(
            FakeStore::default(),
            FakeTranscriber {
                gate: Some(gate.clone()),
                ..transcriber(PLAN)
            },
            FakeRecords::default(),
        );
        let (jobs, pipeline) = jobs_with(f);
        let owner = Uuid::new_v4();
        let stranger = Uuid::new_v4();
        let (src, _) = source(&[b"ab"], false);

        let id = jobs.spawn(pipeline, job(owner, None, false), src);

        assert!(jobs.status(id, stranger).is_none());
        assert!(!jobs.cancel(id, stranger));
        assert!(!jobs.cancel(Uuid::new_v4(), owner));

        gate.notify_one();
        let status = wait_until(&jobs, id, owner, |s| s.finished).await;
        assert!(status.error.is_none(), "a stranger's cancel must not stop the job");
    }

    #[tokio::test]
    async fn test_cancel_stops_running_job() {
        let gate = Arc::new(Notify::new());
        let f = fixture(
            FakeStore::default(),
            FakeTranscriber {
                gate: Some(gate),
                ..transcriber(PLAN)
            },
            FakeRecords::default(),
        );
        let records = f.records.clone();
        let (jobs, pipeline) = jobs_with(f);
        let user = Uuid::new_v4();
        let (src, _) = source(&[b"ab"], false);

        let id = jobs.spawn(pipeline, job(user, None, true), src);
        let running = wait_until(&jobs, id, user, |s| s.state == RecordingState::Transcribing).await;
        assert!(!running.finished);

        assert!(jobs.cancel(id, user));
        let status = wait_until(&jobs, id, user, |s| s.finished).await;

        assert_eq!(status.state, RecordingState::Idle);
        assert_eq!(status.error.as_deref(), Some("Recording was cancelled"));
        assert!(records.saved.lock().is_empty());
        assert!(records.tasks.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_finished_jobs_are_pruned_after_retention() {
        let f = fixture(FakeStore::default(), transcriber(PLAN), FakeRecords::default());
        let (jobs, pipeline) = jobs_with(f);
        let user = Uuid::new_v4();
        let (src, _) = source(&[b"ab"], false);

        let id = jobs.spawn(pipeline, job(user, None, false), src);
        wait_until(&jobs, id, user, |s| s.finished).await;

        jobs.prune_finished();
        assert!(jobs.status(id, user).is_some(), "recent jobs stay visible");

        tokio::time::advance(FINISHED_RETENTION + Duration::from_secs(1)).await;
        jobs.prune_finished();
        assert!(jobs.status(id, user).is_none());
    }
}
