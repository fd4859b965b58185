//! Bounded worker pool for detached image-processing jobs.
//!
//! One job per admitted delivery. The queue is bounded so event bursts
//! degrade into explicit `Busy` acknowledgments instead of unbounded task
//! spawning; workers never cancel an admitted job.

use std::sync::Arc;

use futures::future::join_all;
use secrecy::SecretString;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{error, info};
use uuid::Uuid;

use crate::error::QueueError;
use crate::events::Attachment;
use crate::gateway::ChatGateway;
use crate::pipeline::ImageProcessor;

/// Everything a worker needs to process one admitted delivery. Owned by
/// the job: no mutable state is shared into the pool.
#[derive(Clone)]
pub struct ProcessingJob {
    pub job_id: Uuid,
    pub channel_id: String,
    pub thread_ts: String,
    pub user_id: String,
    pub text: String,
    pub attachments: Vec<Attachment>,
    pub credential: SecretString,
}

/// Admission seam between the dispatcher and the pool.
pub trait JobQueue: Send + Sync {
    /// Non-blocking submit. A full queue is an explicit error so the
    /// acknowledgment path never waits on processing capacity.
    fn submit(&self, job: ProcessingJob) -> Result<(), QueueError>;
}

/// Fixed-size pool draining a bounded queue.
///
/// Attachments within a job run concurrently and each posts its own
/// reply; one attachment's failure never cancels its siblings.
pub struct WorkerPool {
    tx: mpsc::Sender<ProcessingJob>,
    capacity: usize,
    #[allow(dead_code)]
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Start `workers` consumer tasks over a queue of `capacity` jobs.
    pub fn start(
        workers: usize,
        capacity: usize,
        processor: Arc<ImageProcessor>,
        chat: Arc<dyn ChatGateway>,
    ) -> Self {
        let (tx, rx) = mpsc::channel::<ProcessingJob>(capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));

        let handles = (0..workers.max(1))
            .map(|worker| {
                let rx = Arc::clone(&rx);
                let processor = Arc::clone(&processor);
                let chat = Arc::clone(&chat);
                tokio::spawn(async move {
                    loop {
                        let job = rx.lock().await.recv().await;
                        let Some(job) = job else {
                            info!(worker, "Processing queue closed; worker exiting");
                            break;
                        };
                        run_job(&processor, &chat, job).await;
                    }
                })
            })
            .collect();

        Self {
            tx,
            capacity: capacity.max(1),
            handles,
        }
    }
}

impl JobQueue for WorkerPool {
    fn submit(&self, job: ProcessingJob) -> Result<(), QueueError> {
        self.tx.try_send(job).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => QueueError::Full {
                capacity: self.capacity,
            },
            mpsc::error::TrySendError::Closed(_) => QueueError::Closed,
        })
    }
}

/// Process every attachment of one job, posting one reply each.
async fn run_job(processor: &ImageProcessor, chat: &Arc<dyn ChatGateway>, job: ProcessingJob) {
    info!(
        job_id = %job.job_id,
        channel = %job.channel_id,
        attachments = job.attachments.len(),
        "Processing job started"
    );

    let job = &job;
    join_all(job.attachments.iter().map(|attachment| async move {
        let reply = processor
            .process(attachment, &job.text, &job.credential)
            .await;
        if let Err(e) = chat
            .post_message(&job.channel_id, &job.thread_ts, &reply)
            .await
        {
            error!(job_id = %job.job_id, error = %e, "Failed to post processing reply");
        }
    }))
    .await;

    info!(job_id = %job.job_id, "Processing job finished");
}
