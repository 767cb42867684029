//! Background conversion of sealed segments into persisted ones
//!
//! Rotation hands the retired mutable segment to a dedicated worker thread
//! over a channel, so ingestion never waits on the store. Each job is retried
//! with exponential backoff; a segment that cannot be persisted stays in the
//! index in its mutable form.

use std::sync::Arc;
use std::thread;
use std::time::Instant;

use crossbeam::channel::{Receiver, Sender};
use tracing::{error, info, warn};

use super::Shared;
use crate::error::{QuarryError, Result};
use crate::persistence::ManifestEntry;
use crate::segment::{ImmutableSegment, MutableSegment, Segment, SegmentRef};

pub(crate) enum PersistOp {
    /// Persist a sealed segment and swap it into the segment list
    Persist {
        segment: Arc<MutableSegment>,
        done: Option<Sender<Result<()>>>,
    },
    /// Acknowledge once every earlier job has finished
    Barrier { done: Sender<Result<()>> },
}

pub(crate) struct PersisterHandles {
    pub(crate) tx: Sender<PersistOp>,
    pub(crate) join: thread::JoinHandle<()>,
}

pub(crate) fn spawn_persister(
    tx: Sender<PersistOp>,
    rx: Receiver<PersistOp>,
    shared: Arc<Shared>,
) -> Result<PersisterHandles> {
    let join = thread::Builder::new()
        .name("quarry-persister".to_string())
        .spawn(move || {
            while let Ok(op) = rx.recv() {
                match op {
                    PersistOp::Persist { segment, done } => {
                        let result = persist(&shared, &segment);
                        if let Some(done) = done {
                            // the committer may have given up waiting
                            let _ = done.send(result);
                        }
                    }
                    PersistOp::Barrier { done } => {
                        let _ = done.send(Ok(()));
                    }
                }
            }
        })?;
    Ok(PersisterHandles { tx, join })
}

fn persist(shared: &Shared, segment: &Arc<MutableSegment>) -> Result<()> {
    let id = segment.id();
    let policy = &shared.settings.persist_retry;
    let max_attempts = policy.max_attempts.max(1);
    let started = Instant::now();
    info!(segment = %id, docs = segment.doc_count(), "persisting segment");

    let mut attempt = 0;
    loop {
        attempt += 1;
        match write_segment(shared, segment).and_then(|persisted| install(shared, segment, persisted)) {
            Ok(()) => break,
            Err(e) => {
                warn!(segment = %id, attempt, error = %e, "segment persistence attempt failed");
                if let Err(cleanup) = shared.provider.remove(id) {
                    warn!(segment = %id, error = %cleanup, "failed to remove partial segment store");
                }
                if !e.is_retriable() || attempt >= max_attempts {
                    error!(
                        segment = %id,
                        attempts = attempt,
                        error = %e,
                        "giving up on segment persistence; segment stays in memory"
                    );
                    return Err(QuarryError::Persistence {
                        segment: id,
                        attempts: attempt,
                        reason: e.to_string(),
                    });
                }
                thread::sleep(policy.backoff(attempt));
            }
        }
    }

    info!(
        segment = %id,
        attempts = attempt,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "segment persisted"
    );
    Ok(())
}

/// Build the persisted form of a sealed segment in a fresh store
fn write_segment(shared: &Shared, segment: &MutableSegment) -> Result<ImmutableSegment> {
    let store = shared.provider.create(segment.id())?;
    ImmutableSegment::from_mutable(
        segment,
        store,
        shared.settings.cache_size_bytes,
        shared.settings.source_block_size,
    )
}

/// Swap the persisted segment in for its mutable original and record it in
/// the manifest. Deletes are taken under the segment-list read lock, so
/// holding the write lock here means no delete can land on the mutable
/// segment after its set is merged. The manifest names the segment only once
/// it is known to be in the list, and the swap happens only once the manifest
/// is durable.
fn install(shared: &Shared, segment: &Arc<MutableSegment>, persisted: ImmutableSegment) -> Result<()> {
    let mut state = shared.state.write();
    let position = state
        .sealed
        .iter()
        .position(|s| s.id() == segment.id())
        .ok_or_else(|| QuarryError::Internal(format!("{} is not in the segment list", segment.id())))?;
    let deleted = segment.read().deleted.clone();
    persisted.merge_deleted(&deleted)?;
    shared.provider.update_manifest(|m| {
        m.add_segment(ManifestEntry {
            id: persisted.id(),
            from: persisted.from(),
            next: persisted.next(),
        })
    })?;
    let persisted: SegmentRef = Arc::new(persisted);
    state.sealed[position] = persisted;
    Ok(())
}
