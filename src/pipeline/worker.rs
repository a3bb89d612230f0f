//! Background alignment thread.
//!
//! Jobs run in submission order on one thread and the caller polls for
//! results, so the interactive side never blocks on inference. Each job
//! carries the cache generation it was issued under; results from before an
//! invalidation are flagged stale and should be dropped by the caller.

use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::alignment::graph::PhonemeGraph;
use crate::error::AlignmentError;
use crate::pipeline::profile::{AlignmentProfile, ProfileOutcome};
use crate::types::AudioInput;

#[derive(Debug, Clone)]
pub enum AlignmentJob {
    RealignGrid {
        audio: AudioInput,
        graph: PhonemeGraph,
    },
    RealignAround {
        audio: AudioInput,
        graph: PhonemeGraph,
        pivot: usize,
        pivot_time: f64,
    },
}

#[derive(Debug)]
pub struct JobResult {
    pub request_id: u64,
    /// Generation current when the job was submitted.
    pub issued_generation: u64,
    pub outcome: Result<ProfileOutcome, AlignmentError>,
}

impl JobResult {
    /// True when the job was issued, or its emissions computed, under a
    /// generation other than `current`.
    pub fn is_stale(&self, current: u64) -> bool {
        if self.issued_generation != current {
            return true;
        }
        matches!(&self.outcome, Ok(o) if o.generation != current)
    }
}

struct Envelope {
    request_id: u64,
    issued_generation: u64,
    job: AlignmentJob,
}

pub struct AlignmentWorker {
    profile: Arc<dyn AlignmentProfile>,
    job_tx: Option<mpsc::Sender<Envelope>>,
    result_rx: mpsc::Receiver<JobResult>,
    handle: Option<JoinHandle<()>>,
    next_request_id: u64,
}

impl AlignmentWorker {
    pub fn spawn(profile: Arc<dyn AlignmentProfile>) -> Result<Self, AlignmentError> {
        let (job_tx, job_rx) = mpsc::channel::<Envelope>();
        let (result_tx, result_rx) = mpsc::channel::<JobResult>();
        let thread_profile = Arc::clone(&profile);
        let handle = std::thread::Builder::new()
            .name("alignment-worker".into())
            .spawn(move || worker_loop(thread_profile, job_rx, result_tx))
            .map_err(|e| AlignmentError::io("spawn alignment worker", e))?;
        tracing::debug!(profile = profile.name(), "alignment worker started");
        Ok(Self {
            profile,
            job_tx: Some(job_tx),
            result_rx,
            handle: Some(handle),
            next_request_id: 0,
        })
    }

    pub fn profile(&self) -> &Arc<dyn AlignmentProfile> {
        &self.profile
    }

    /// Queues `job` and returns its request id.
    pub fn submit(&mut self, job: AlignmentJob) -> Result<u64, AlignmentError> {
        let issued_generation = self.profile.generation()?;
        let request_id = self.next_request_id;
        let Some(tx) = self.job_tx.as_ref() else {
            return Err(AlignmentError::runtime("alignment worker", "worker is shut down"));
        };
        tx.send(Envelope {
            request_id,
            issued_generation,
            job,
        })
        .map_err(|_| AlignmentError::runtime("alignment worker", "worker thread stopped"))?;
        self.next_request_id += 1;
        Ok(request_id)
    }

    pub fn try_recv(&self) -> Option<JobResult> {
        self.result_rx.try_recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<JobResult> {
        self.result_rx.recv_timeout(timeout).ok()
    }

    /// Blocks until the next result; `None` once the worker has stopped.
    pub fn recv(&self) -> Option<JobResult> {
        self.result_rx.recv().ok()
    }

    pub fn is_stale(&self, result: &JobResult) -> Result<bool, AlignmentError> {
        Ok(result.is_stale(self.profile.generation()?))
    }

    /// Invalidates the profile's cache. Jobs already queued still run, but
    /// their results come back stale.
    pub fn invalidate(&self) -> Result<u64, AlignmentError> {
        self.profile.invalidate()
    }
}

impl Drop for AlignmentWorker {
    fn drop(&mut self) {
        drop(self.job_tx.take());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("alignment worker thread panicked");
            }
        }
    }
}

fn worker_loop(
    profile: Arc<dyn AlignmentProfile>,
    jobs: mpsc::Receiver<Envelope>,
    results: mpsc::Sender<JobResult>,
) {
    for envelope in jobs {
        let outcome = match envelope.job {
            AlignmentJob::RealignGrid { audio, graph } => profile.realign_grid(&audio, &graph),
            AlignmentJob::RealignAround {
                audio,
                graph,
                pivot,
                pivot_time,
            } => profile.realign_around(&audio, &graph, pivot, pivot_time),
        };
        if let Err(err) = &outcome {
            tracing::warn!(request_id = envelope.request_id, error = %err, "alignment job failed");
        }
        let result = JobResult {
            request_id: envelope.request_id,
            issued_generation: envelope.issued_generation,
            outcome,
        };
        if results.send(result).is_err() {
            break;
        }
    }
    tracing::debug!("alignment worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::profile::ManualProfile;

    fn graph() -> PhonemeGraph {
        PhonemeGraph::from_times(&[0.0, 0.5, 1.0], ["sil", "a"]).unwrap()
    }

    fn audio() -> AudioInput {
        AudioInput::new("worker.wav", 16_000, vec![0.0; 16_000])
    }

    #[test]
    fn results_come_back_in_order_with_ids() {
        let mut worker = AlignmentWorker::spawn(Arc::new(ManualProfile::new())).unwrap();
        let a = worker
            .submit(AlignmentJob::RealignGrid {
                audio: audio(),
                graph: graph(),
            })
            .unwrap();
        let b = worker
            .submit(AlignmentJob::RealignAround {
                audio: audio(),
                graph: graph(),
                pivot: 1,
                pivot_time: 0.7,
            })
            .unwrap();
        assert_eq!((a, b), (0, 1));

        let first = worker.recv_timeout(Duration::from_secs(5)).expect("first");
        assert_eq!(first.request_id, 0);
        assert!(first.outcome.is_ok());
        let second = worker.recv_timeout(Duration::from_secs(5)).expect("second");
        assert_eq!(second.request_id, 1);
        let outcome = second.outcome.as_ref().expect("realign ok");
        assert_eq!(outcome.graph.boundaries[1].time, 0.7);
        assert!(!worker.is_stale(&second).unwrap());
    }

    #[test]
    fn invalidation_marks_results_stale() {
        let mut worker = AlignmentWorker::spawn(Arc::new(ManualProfile::new())).unwrap();
        worker
            .submit(AlignmentJob::RealignGrid {
                audio: audio(),
                graph: graph(),
            })
            .unwrap();
        let result = worker.recv_timeout(Duration::from_secs(5)).expect("result");
        assert_eq!(worker.invalidate().unwrap(), 1);
        assert!(worker.is_stale(&result).unwrap());
    }

    #[test]
    fn failed_jobs_report_errors() {
        let mut worker = AlignmentWorker::spawn(Arc::new(ManualProfile::new())).unwrap();
        worker
            .submit(AlignmentJob::RealignAround {
                audio: audio(),
                graph: graph(),
                pivot: 0,
                pivot_time: 0.1,
            })
            .unwrap();
        let result = worker.recv_timeout(Duration::from_secs(5)).expect("result");
        assert!(result.outcome.is_err());
    }
}
