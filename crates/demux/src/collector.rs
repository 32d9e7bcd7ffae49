//! Sample collector: drains a `SampleSource` on a worker thread with a bounded wait.
//!
//! The caller blocks on a crossbeam channel with a deadline while the worker
//! pulls batches. Collection moves through a forward-only state machine:
//!
//! ```text
//! Collecting ──► Complete    every track reached its declared sample count
//!            ├─► TimedOut    deadline elapsed; partial samples are kept
//!            ├─► Exhausted   source ended short; partial samples are kept
//!            └─► Failed      source error before completion
//! ```
//!
//! Partial results clear track durations so the builder recomputes them
//! from the samples actually gathered.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use dm_common::{CollectedTrack, DemuxError, DemuxResult, Sample, TrackKind};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::traits::{SampleBatch, SampleSource, SourceTrack};

/// Batches buffered between the worker and the caller.
const CHANNEL_CAPACITY: usize = 8;

/// Collector lifecycle. Terminal states never change again.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CollectorState {
    Collecting,
    Complete,
    TimedOut,
    Exhausted,
    Failed(String),
}

impl CollectorState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, CollectorState::Collecting)
    }

    /// Move to `next` unless a terminal state was already reached.
    fn advance(&mut self, next: CollectorState) {
        if self.is_terminal() {
            warn!("Ignoring collector transition {:?} -> {:?}", self, next);
            return;
        }
        *self = next;
    }
}

/// How a successful collection ended.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CollectOutcome {
    Complete,
    TimedOut,
    Exhausted,
}

/// Per-track collection counters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrackProgress {
    pub track_id: u32,
    pub collected: u64,
    pub declared: u64,
}

impl TrackProgress {
    pub fn is_done(&self) -> bool {
        self.collected >= self.declared
    }
}

struct Shared {
    state: CollectorState,
    progress: Vec<TrackProgress>,
}

/// Cloneable view of a running collection, usable from any thread.
#[derive(Clone)]
pub struct CollectorHandle {
    shared: Arc<Mutex<Shared>>,
    cancel: Arc<AtomicBool>,
}

impl CollectorHandle {
    pub fn state(&self) -> CollectorState {
        self.shared.lock().state.clone()
    }

    pub fn progress(&self) -> Vec<TrackProgress> {
        self.shared.lock().progress.clone()
    }

    /// Ask the worker to stop pulling batches.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    fn record(&self, track_id: u32, added: u64) {
        let mut shared = self.shared.lock();
        if let Some(p) = shared.progress.iter_mut().find(|p| p.track_id == track_id) {
            p.collected += added;
        }
    }

    fn all_done(&self) -> bool {
        self.shared.lock().progress.iter().all(TrackProgress::is_done)
    }

    fn advance(&self, next: CollectorState) {
        self.shared.lock().state.advance(next);
    }
}

/// Result of a successful collection.
#[derive(Clone, Debug)]
pub struct Collection {
    pub tracks: Vec<CollectedTrack>,
    pub outcome: CollectOutcome,
}

impl Collection {
    pub fn is_complete(&self) -> bool {
        self.outcome == CollectOutcome::Complete
    }

    pub fn total_samples(&self) -> usize {
        self.tracks.iter().map(|t| t.samples.len()).sum()
    }

    /// First track of the given kind.
    pub fn track(&self, kind: TrackKind) -> Option<&CollectedTrack> {
        self.tracks.iter().find(|t| t.kind() == kind)
    }

    /// Remove and return the first track of the given kind.
    pub fn take_track(&mut self, kind: TrackKind) -> Option<CollectedTrack> {
        let idx = self.tracks.iter().position(|t| t.kind() == kind)?;
        Some(self.tracks.remove(idx))
    }
}

enum WorkerMessage {
    Batch(SampleBatch),
    Finished,
    Failed(DemuxError),
}

/// A collection in progress: the worker is running, the caller has not waited yet.
pub struct Collector {
    handle: CollectorHandle,
    tracks: Vec<SourceTrack>,
    rx: Receiver<WorkerMessage>,
}

impl Collector {
    /// Select every track of `source` and start the worker thread.
    pub fn start<S: SampleSource + 'static>(mut source: S) -> DemuxResult<Self> {
        let tracks = source.tracks().to_vec();
        for track in &tracks {
            source.select_track(track.id)?;
        }

        let handle = CollectorHandle {
            shared: Arc::new(Mutex::new(Shared {
                state: CollectorState::Collecting,
                progress: tracks
                    .iter()
                    .map(|t| TrackProgress {
                        track_id: t.id,
                        collected: 0,
                        declared: t.sample_count,
                    })
                    .collect(),
            })),
            cancel: Arc::new(AtomicBool::new(false)),
        };

        let (tx, rx) = channel::bounded(CHANNEL_CAPACITY);
        let cancel = handle.cancel.clone();
        thread::Builder::new()
            .name("dm-collector".into())
            .spawn(move || run_worker(source, tx, cancel))?;

        info!(tracks = tracks.len(), "Sample collection started");

        Ok(Collector { handle, tracks, rx })
    }

    pub fn handle(&self) -> CollectorHandle {
        self.handle.clone()
    }

    /// Block until every track is complete, the source ends or fails, or `deadline` passes.
    pub fn wait_until(self, deadline: Instant) -> DemuxResult<Collection> {
        let Collector { handle, tracks, rx } = self;
        let mut samples: HashMap<u32, Vec<Sample>> =
            tracks.iter().map(|t| (t.id, Vec::new())).collect();

        let outcome = loop {
            if handle.all_done() {
                handle.cancel();
                handle.advance(CollectorState::Complete);
                break CollectOutcome::Complete;
            }

            match rx.recv_deadline(deadline) {
                Ok(WorkerMessage::Batch(batch)) => match samples.get_mut(&batch.track_id) {
                    Some(list) => {
                        handle.record(batch.track_id, batch.samples.len() as u64);
                        list.extend(batch.samples);
                    }
                    None => warn!(
                        "Dropping batch for unselected track {}",
                        batch.track_id
                    ),
                },
                Ok(WorkerMessage::Finished) => {
                    if handle.all_done() {
                        handle.advance(CollectorState::Complete);
                        break CollectOutcome::Complete;
                    }
                    warn!(progress = ?handle.progress(), "Source ended before declared sample counts");
                    handle.advance(CollectorState::Exhausted);
                    break CollectOutcome::Exhausted;
                }
                Ok(WorkerMessage::Failed(err)) => {
                    handle.advance(CollectorState::Failed(err.to_string()));
                    return Err(err);
                }
                Err(RecvTimeoutError::Timeout) => {
                    handle.cancel();
                    warn!(progress = ?handle.progress(), "Sample collection timed out");
                    handle.advance(CollectorState::TimedOut);
                    break CollectOutcome::TimedOut;
                }
                Err(RecvTimeoutError::Disconnected) => {
                    let reason = "sample worker exited without finishing".to_string();
                    handle.advance(CollectorState::Failed(reason.clone()));
                    return Err(DemuxError::Source(reason));
                }
            }
        };

        let partial = outcome != CollectOutcome::Complete;
        let tracks: Vec<CollectedTrack> = tracks
            .into_iter()
            .map(|t| CollectedTrack {
                samples: samples.remove(&t.id).unwrap_or_default(),
                id: t.id,
                media: t.media,
                timescale: t.timescale,
                duration: if partial { None } else { t.duration },
                description: t.description(),
            })
            .collect();

        let collection = Collection { tracks, outcome };
        info!(
            outcome = ?collection.outcome,
            samples = collection.total_samples(),
            "Sample collection finished"
        );
        Ok(collection)
    }

    /// Block for at most `timeout`. A timeout past the clock's range expires at once.
    pub fn wait(self, timeout: Duration) -> DemuxResult<Collection> {
        let now = Instant::now();
        self.wait_until(now.checked_add(timeout).unwrap_or(now))
    }
}

/// Drain `source` into a `Collection`, waiting at most `timeout`.
pub fn collect_samples<S: SampleSource + 'static>(
    source: S,
    timeout: Duration,
) -> DemuxResult<Collection> {
    Collector::start(source)?.wait(timeout)
}

fn run_worker<S: SampleSource>(mut source: S, tx: Sender<WorkerMessage>, cancel: Arc<AtomicBool>) {
    loop {
        if cancel.load(Ordering::Relaxed) {
            debug!("Collector worker cancelled");
            return;
        }
        let message = match source.next_batch() {
            Ok(Some(batch)) => WorkerMessage::Batch(batch),
            Ok(None) => {
                let _ = tx.send(WorkerMessage::Finished);
                return;
            }
            Err(err) => {
                let _ = tx.send(WorkerMessage::Failed(err));
                return;
            }
        };
        // The receiver is gone once the caller timed out.
        if tx.send(message).is_err() {
            return;
        }
    }
}
