//! Worker pool: one evaluator session per tokio task, fed from a shared FIFO.

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};
use std::time::Duration;

use futures::future::join_all;
use futures::Stream;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::error::{AnalysisError, EvaluatorFailure};
use crate::evaluator::{EvaluationJob, EvaluationResult, Evaluator, EvaluatorFactory};

type JobQueue = Arc<Mutex<VecDeque<EvaluationJob>>>;

/// One finished job, successful or not.
#[derive(Debug, Clone)]
pub struct JobOutcome {
    pub job: EvaluationJob,
    pub worker_id: usize,
    pub result: Result<EvaluationResult, EvaluatorFailure>,
}

/// Worker count when nothing else is configured.
pub fn default_workers() -> usize {
    num_cpus::get().max(1)
}

pub struct WorkerPool<F: EvaluatorFactory> {
    factory: Arc<F>,
    workers: usize,
    job_timeout: Option<Duration>,
}

impl<F: EvaluatorFactory> WorkerPool<F> {
    pub fn new(factory: Arc<F>, workers: usize) -> Self {
        Self {
            factory,
            workers: workers.max(1),
            job_timeout: None,
        }
    }

    pub fn with_job_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.job_timeout = timeout;
        self
    }

    /// Upper bound on concurrent sessions; a submission may start fewer.
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Start workers for `jobs` and stream their outcomes as they finish.
    ///
    /// Sessions are opened before any job is dispatched. Workers whose session
    /// fails to open are skipped; if none open the submission fails.
    pub async fn submit(&self, jobs: Vec<EvaluationJob>) -> Result<JobStream, AnalysisError> {
        let total = jobs.len();
        if total == 0 {
            return Ok(JobStream::empty());
        }

        let wanted = self.workers.min(total);
        let opened = join_all((0..wanted).map(|_| self.factory.open())).await;

        let mut sessions = Vec::with_capacity(wanted);
        let mut last_failure = None;
        for (slot, outcome) in opened.into_iter().enumerate() {
            match outcome {
                Ok(session) => sessions.push(session),
                Err(e) => {
                    warn!(slot, evaluator = self.factory.name(), error = %e, "Evaluator session failed to open");
                    last_failure = Some(e);
                }
            }
        }

        if sessions.is_empty() {
            let reason = last_failure
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no sessions requested".into());
            return Err(AnalysisError::SchedulerExhaustion(reason));
        }

        let workers = sessions.len();
        info!(jobs = total, workers, evaluator = self.factory.name(), "Dispatching evaluation jobs");

        let queue: JobQueue = Arc::new(Mutex::new(jobs.into()));
        let (tx, rx) = mpsc::unbounded_channel();
        let mut tasks = JoinSet::new();

        for (worker_id, session) in sessions.into_iter().enumerate() {
            tasks.spawn(run_worker(
                worker_id,
                session,
                Arc::clone(&self.factory),
                Arc::clone(&queue),
                tx.clone(),
                self.job_timeout,
            ));
        }

        Ok(JobStream {
            rx,
            tasks,
            queue,
            workers,
            total,
        })
    }
}

fn next_job(queue: &JobQueue) -> Option<EvaluationJob> {
    queue
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .pop_front()
}

async fn run_worker<F: EvaluatorFactory>(
    worker_id: usize,
    session: F::Evaluator,
    factory: Arc<F>,
    queue: JobQueue,
    tx: mpsc::UnboundedSender<JobOutcome>,
    job_timeout: Option<Duration>,
) {
    let mut session = Some(session);

    while let Some(job) = next_job(&queue) {
        let mut evaluator = match session.take() {
            Some(evaluator) => evaluator,
            None => match factory.open().await {
                Ok(fresh) => fresh,
                Err(failure) => {
                    warn!(worker_id, job_id = job.job_id, error = %failure, "Evaluator reopen failed");
                    if tx.send(JobOutcome { job, worker_id, result: Err(failure) }).is_err() {
                        break;
                    }
                    continue;
                }
            },
        };

        debug!(worker_id, job_id = job.job_id, fen = %job.fen, "Evaluating");
        let result = match job_timeout {
            Some(limit) => tokio::time::timeout(limit, evaluator.evaluate(&job.fen, job.depth))
                .await
                .unwrap_or(Err(EvaluatorFailure::Timeout(limit))),
            None => evaluator.evaluate(&job.fen, job.depth).await,
        };

        match &result {
            Ok(_) => session = Some(evaluator),
            Err(failure) => {
                // The session may be mid-search or wedged; drop it and open a fresh one next time
                warn!(worker_id, job_id = job.job_id, fen = %job.fen, error = %failure, "Evaluation failed");
                drop(evaluator);
            }
        }

        if tx.send(JobOutcome { job, worker_id, result }).is_err() {
            break;
        }
    }

    if let Some(evaluator) = session {
        evaluator.close().await;
    }
    debug!(worker_id, "Worker finished");
}

/// Unordered outcomes of one submission.
///
/// Dropping the stream aborts every worker, which kills its subprocess.
pub struct JobStream {
    rx: mpsc::UnboundedReceiver<JobOutcome>,
    tasks: JoinSet<()>,
    queue: JobQueue,
    workers: usize,
    total: usize,
}

impl JobStream {
    fn empty() -> Self {
        let (_tx, rx) = mpsc::unbounded_channel();
        Self {
            rx,
            tasks: JoinSet::new(),
            queue: Arc::default(),
            workers: 0,
            total: 0,
        }
    }

    /// Sessions actually started.
    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn total(&self) -> usize {
        self.total
    }

    /// Jobs not yet picked up by a worker.
    pub fn pending(&self) -> usize {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Drop queued jobs and abort in-flight ones. The stream ends afterwards.
    pub fn cancel(&mut self) {
        let dropped = {
            let mut queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
            let n = queue.len();
            queue.clear();
            n
        };
        self.tasks.abort_all();
        self.rx.close();
        debug!(dropped, "Job stream cancelled");
    }
}

impl Stream for JobStream {
    type Item = JobOutcome;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::Depth;
    use crate::stub::StubFactory;
    use chess_core::Reconstructor;
    use futures::StreamExt;

    fn jobs(moves: &[&str]) -> Vec<EvaluationJob> {
        let positions = Reconstructor::standard().expand(moves).unwrap();
        positions
            .into_iter()
            .enumerate()
            .map(|(job_id, p)| EvaluationJob {
                job_id,
                fen: p.fen,
                key: p.key,
                depth: Depth::new(3).unwrap(),
            })
            .collect()
    }

    async fn collect(mut stream: JobStream) -> Vec<JobOutcome> {
        let mut out = Vec::new();
        while let Some(outcome) = stream.next().await {
            out.push(outcome);
        }
        out
    }

    #[tokio::test]
    async fn test_every_job_reported_once() {
        let factory = Arc::new(StubFactory::new());
        let pool = WorkerPool::new(Arc::clone(&factory), 3);
        let work = jobs(&["e4", "e5", "Nf3", "Nc6", "Bb5"]);

        let stream = pool.submit(work.clone()).await.unwrap();
        assert_eq!(stream.workers(), 3);
        let mut ids: Vec<usize> = collect(stream).await.iter().map(|o| o.job.job_id).collect();
        ids.sort_unstable();
        assert_eq!(ids, (0..work.len()).collect::<Vec<_>>());
        assert_eq!(factory.calls(), work.len());
    }

    #[tokio::test]
    async fn test_workers_bounded_by_job_count() {
        let factory = Arc::new(StubFactory::new());
        let pool = WorkerPool::new(Arc::clone(&factory), 16);
        let stream = pool.submit(jobs(&["d4"])).await.unwrap();
        assert_eq!(stream.workers(), 2);
        assert_eq!(factory.opens(), 2);
        collect(stream).await;
    }

    #[tokio::test]
    async fn test_concurrency_never_exceeds_workers() {
        let factory = Arc::new(StubFactory::new().with_delay(Duration::from_millis(20)));
        let pool = WorkerPool::new(Arc::clone(&factory), 2);
        let stream = pool.submit(jobs(&["e4", "e5", "Nf3", "Nc6", "Bc4", "Bc5"])).await.unwrap();
        collect(stream).await;
        assert!(factory.peak_in_flight() <= 2);
        assert!(factory.peak_in_flight() >= 1);
    }

    #[tokio::test]
    async fn test_single_worker_is_fifo() {
        let factory = Arc::new(StubFactory::new());
        let pool = WorkerPool::new(Arc::clone(&factory), 1);
        let work = jobs(&["e4", "c5", "Nf3"]);
        collect(pool.submit(work.clone()).await.unwrap()).await;
        let expected: Vec<String> = work.iter().map(|j| j.key.clone()).collect();
        assert_eq!(factory.call_order(), expected);
    }

    #[tokio::test]
    async fn test_failure_is_isolated_and_session_reopened() {
        let work = jobs(&["e4", "e5", "Nf3"]);
        let factory = Arc::new(StubFactory::new().failing(&work[1].fen));
        let pool = WorkerPool::new(Arc::clone(&factory), 1);

        let outcomes = collect(pool.submit(work.clone()).await.unwrap()).await;
        assert_eq!(outcomes.len(), work.len());
        let failed: Vec<_> = outcomes.iter().filter(|o| o.result.is_err()).collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].job.job_id, 1);
        // Initial session plus one replacement after the failure
        assert_eq!(factory.opens(), 2);
    }

    #[tokio::test]
    async fn test_job_timeout() {
        let work = jobs(&["e4"]);
        let factory = Arc::new(StubFactory::new().hanging(&work[0].fen));
        let pool = WorkerPool::new(factory, 2).with_job_timeout(Some(Duration::from_millis(50)));

        let outcomes = collect(pool.submit(work).await.unwrap()).await;
        let timed_out = outcomes
            .iter()
            .find(|o| o.job.job_id == 0)
            .map(|o| o.result.clone());
        assert_eq!(
            timed_out,
            Some(Err(EvaluatorFailure::Timeout(Duration::from_millis(50))))
        );
        assert!(outcomes.iter().any(|o| o.job.job_id == 1 && o.result.is_ok()));
    }

    #[tokio::test]
    async fn test_exhaustion_when_no_session_opens() {
        let pool = WorkerPool::new(Arc::new(StubFactory::new().unopenable()), 4);
        let err = pool.submit(jobs(&["e4"])).await.err().unwrap();
        assert!(matches!(err, AnalysisError::SchedulerExhaustion(_)));
    }

    #[tokio::test]
    async fn test_cancel_stops_stream() {
        let work = jobs(&["e4", "e5", "Nf3", "Nc6"]);
        let factory = Arc::new(StubFactory::new().hanging(&work[0].fen).hanging(&work[1].fen));
        let pool = WorkerPool::new(Arc::clone(&factory), 2);

        let mut stream = pool.submit(work).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        stream.cancel();
        assert_eq!(stream.pending(), 0);
        assert!(stream.next().await.is_none());
        // Only the two hanging positions were ever started
        assert_eq!(factory.calls(), 2);
    }

    #[tokio::test]
    async fn test_empty_submission() {
        let factory = Arc::new(StubFactory::new());
        let pool = WorkerPool::new(Arc::clone(&factory), 4);
        let stream = pool.submit(Vec::new()).await.unwrap();
        assert_eq!(stream.workers(), 0);
        assert!(collect(stream).await.is_empty());
        assert_eq!(factory.opens(), 0);
    }
}
