//! Batch dispatch over a bounded worker pool.
//!
//! Candidates are accumulated into fixed-size batches. Each batch fans out
//! to a pool of workers that claim one candidate at a time from a shared
//! queue, and the pool drains completely before the next batch starts, so
//! peak in-flight work is bounded by one batch. Separated from UI concerns:
//! progress is reported through events.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::warn;

use crate::annotate::Annotator;
use crate::error::{ClientError, StoreError};
use crate::sources::CandidateRecord;
use crate::state::ProcessingStatus;

/// Progress notifications emitted while a run advances.
#[derive(Debug)]
pub enum DispatchEvent {
    /// A candidate reached a terminal outcome.
    Completed {
        id: String,
        status: ProcessingStatus,
    },
    /// A candidate was dropped before dispatch because enumeration failed
    /// on it.
    Unreadable { error: String },
}

/// Counters for one run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunStats {
    pub dispatched: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub unreadable: u64,
}

/// Batch sizing for one run.
#[derive(Debug, Clone, Copy)]
pub struct DispatchConfig {
    pub batch_size: usize,
    pub concurrency: usize,
}

/// Drive every candidate the enumeration yields to a terminal outcome.
///
/// Per-candidate enumeration errors are counted and reported, never fatal.
/// Only a state store failure aborts the run.
pub async fn run(
    annotator: Arc<Annotator>,
    candidates: impl Iterator<Item = Result<CandidateRecord, ClientError>>,
    config: DispatchConfig,
    events: mpsc::Sender<DispatchEvent>,
) -> Result<RunStats, ClientError> {
    let mut stats = RunStats::default();
    let mut batch = Vec::with_capacity(config.batch_size);

    for item in candidates {
        match item {
            Ok(record) => {
                batch.push(record);
                if batch.len() == config.batch_size {
                    drain_batch(
                        &annotator,
                        std::mem::take(&mut batch),
                        config.concurrency,
                        &events,
                        &mut stats,
                    )
                    .await?;
                }
            }
            Err(err) => {
                warn!(error = %err, "skipping unreadable candidate");
                stats.unreadable += 1;
                let _ = events
                    .send(DispatchEvent::Unreadable {
                        error: err.to_string(),
                    })
                    .await;
            }
        }
    }

    // Final partial batch.
    if !batch.is_empty() {
        drain_batch(
            &annotator,
            batch,
            config.concurrency,
            &events,
            &mut stats,
        )
        .await?;
    }

    Ok(stats)
}

async fn drain_batch(
    annotator: &Arc<Annotator>,
    batch: Vec<CandidateRecord>,
    concurrency: usize,
    events: &mpsc::Sender<DispatchEvent>,
    stats: &mut RunStats,
) -> Result<(), ClientError> {
    stats.dispatched += batch.len() as u64;
    let workers = concurrency.min(batch.len());
    let queue = Arc::new(Mutex::new(VecDeque::from(batch)));

    let mut handles = Vec::with_capacity(workers);
    for _ in 0..workers {
        let annotator = annotator.clone();
        let queue = queue.clone();
        let events = events.clone();

        handles.push(tokio::spawn(async move {
            let mut succeeded = 0u64;
            let mut failed = 0u64;
            loop {
                let record = {
                    let mut queue = queue.lock().unwrap();
                    queue.pop_front()
                };
                let Some(record) = record else { break };

                let status = annotator.process(&record).await?;
                match status {
                    ProcessingStatus::Success => succeeded += 1,
                    ProcessingStatus::Failure => failed += 1,
                }
                let _ = events
                    .send(DispatchEvent::Completed {
                        id: record.id,
                        status,
                    })
                    .await;
            }
            Ok::<(u64, u64), StoreError>((succeeded, failed))
        }));
    }

    for handle in handles {
        let (succeeded, failed) = handle.await??;
        stats.succeeded += succeeded;
        stats.failed += failed;
    }
    Ok(())
}
