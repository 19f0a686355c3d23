//! File-based event store implementation.
//!
//! Stores events as JSONL (one JSON object per line) with support for:
//! - Optimistic concurrency via file locking
//! - Snapshots for faster aggregate loading
//! - Atomic writes via temp file + rename
//! - Checkpoint compaction that drops history before a given sequence

use crate::domain::errors::DomainError;
use crate::domain::types::TimestampUtc;
use async_trait::async_trait;
use cqrs_es::{Aggregate, AggregateContext, AggregateError, DomainEvent, EventEnvelope, EventStore};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind, Seek, SeekFrom, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

/// A stored event record in the event log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredEvent<E> {
    pub aggregate_id: String,
    pub sequence: u64,
    pub recorded_at: TimestampUtc,
    pub event_type: String,
    pub event_version: String,
    pub event: E,
    pub metadata: HashMap<String, String>,
}

/// A stored snapshot for faster aggregate loading.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredSnapshot<A> {
    pub aggregate_id: String,
    pub sequence: u64,
    pub snapshot_at: TimestampUtc,
    pub state: A,
}

/// File-based event store configuration.
#[derive(Debug)]
pub struct FileEventStore<A> {
    /// Path to the JSONL event log file.
    pub log_path: PathBuf,
    /// Path to the JSON snapshot file.
    pub snapshot_path: PathBuf,
    /// Snapshot after every N events (0 = disabled).
    pub snapshot_every: u64,
    _aggregate: PhantomData<fn() -> A>,
}

impl<A> Clone for FileEventStore<A> {
    fn clone(&self) -> Self {
        Self::new(
            self.log_path.clone(),
            self.snapshot_path.clone(),
            self.snapshot_every,
        )
    }
}

/// Aggregate context for file-based storage.
pub struct FileAggregateContext<A: Aggregate> {
    /// The aggregate ID.
    pub aggregate_id: String,
    /// The rehydrated aggregate.
    pub aggregate: A,
    /// The current sequence number (last applied event).
    pub current_sequence: u64,
}

impl<A: Aggregate> AggregateContext<A> for FileAggregateContext<A> {
    fn aggregate(&self) -> &A {
        &self.aggregate
    }
}

type StoreResult<T> = Result<T, AggregateError<DomainError>>;

fn unexpected<E: std::error::Error + Send + Sync + 'static>(e: E) -> AggregateError<DomainError> {
    AggregateError::UnexpectedError(Box::new(e))
}

impl<A> FileEventStore<A> {
    /// Creates a new file event store.
    pub fn new(log_path: PathBuf, snapshot_path: PathBuf, snapshot_every: u64) -> Self {
        Self {
            log_path,
            snapshot_path,
            snapshot_every,
            _aggregate: PhantomData,
        }
    }
}

impl<A> FileEventStore<A>
where
    A: Aggregate<Error = DomainError>,
{
    /// Drops every event of `aggregate_id` with a sequence lower than
    /// `keep_from`, plus any snapshot taken before it.
    ///
    /// Sequence numbers are preserved, so optimistic concurrency keeps
    /// working across compactions. Returns the number of events removed.
    pub fn truncate_before(&self, aggregate_id: &str, keep_from: u64) -> StoreResult<usize> {
        let file = match OpenOptions::new().read(true).write(true).open(&self.log_path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(unexpected(e)),
        };
        file.lock_exclusive().map_err(unexpected)?;

        let mut kept = Vec::new();
        let mut removed = 0usize;
        for line in BufReader::new(&file).lines() {
            let line = line.map_err(unexpected)?;
            let stored: StoredEvent<A::Event> = serde_json::from_str(&line)
                .map_err(|e| AggregateError::DeserializationError(Box::new(e)))?;
            if stored.aggregate_id == aggregate_id && stored.sequence < keep_from {
                removed += 1;
            } else {
                kept.push(line);
            }
        }

        if removed > 0 {
            // Write to temp file, then rename for atomicity
            let tmp_path = self.log_path.with_extension("jsonl.tmp");
            let mut tmp = File::create(&tmp_path).map_err(unexpected)?;
            for line in &kept {
                writeln!(tmp, "{}", line).map_err(unexpected)?;
            }
            tmp.sync_all().map_err(unexpected)?;
            std::fs::rename(&tmp_path, &self.log_path).map_err(unexpected)?;
        }

        if let Some(snapshot) = load_snapshot::<A>(&self.snapshot_path)? {
            if snapshot.aggregate_id == aggregate_id && snapshot.sequence < keep_from {
                std::fs::remove_file(&self.snapshot_path).map_err(unexpected)?;
            }
        }

        Ok(removed)
    }
}

#[async_trait]
impl<A> EventStore<A> for FileEventStore<A>
where
    A: Aggregate<Error = DomainError>,
{
    type AC = FileAggregateContext<A>;

    async fn load_events(&self, aggregate_id: &str) -> StoreResult<Vec<EventEnvelope<A>>> {
        let file = match File::open(&self.log_path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(unexpected(e)),
        };

        file.lock_shared().map_err(unexpected)?;

        let reader = BufReader::new(file);
        let mut envelopes = Vec::new();

        for line in reader.lines() {
            let line = line.map_err(unexpected)?;
            let stored: StoredEvent<A::Event> = serde_json::from_str(&line)
                .map_err(|e| AggregateError::DeserializationError(Box::new(e)))?;

            if stored.aggregate_id == aggregate_id {
                // Validate event type and version match
                if stored.event_type != stored.event.event_type()
                    || stored.event_version != stored.event.event_version()
                {
                    return Err(unexpected(std::io::Error::new(
                        ErrorKind::InvalidData,
                        "event version/type mismatch",
                    )));
                }

                envelopes.push(EventEnvelope {
                    aggregate_id: stored.aggregate_id,
                    sequence: stored.sequence as usize,
                    payload: stored.event,
                    metadata: stored.metadata,
                });
            }
        }

        Ok(envelopes)
    }

    async fn load_aggregate(&self, aggregate_id: &str) -> StoreResult<Self::AC> {
        let mut aggregate = A::default();
        let mut current_sequence = 0u64;

        // Try to load from snapshot first
        if let Some(snapshot) = load_snapshot::<A>(&self.snapshot_path)? {
            if snapshot.aggregate_id == aggregate_id {
                aggregate = snapshot.state;
                current_sequence = snapshot.sequence;
            }
        }

        // Apply events after snapshot
        let events = self.load_events(aggregate_id).await?;
        for event in events {
            let seq = event.sequence as u64;
            if seq > current_sequence {
                current_sequence = seq;
                aggregate.apply(event.payload);
            }
        }

        Ok(FileAggregateContext {
            aggregate_id: aggregate_id.to_string(),
            aggregate,
            current_sequence,
        })
    }

    async fn commit(
        &self,
        events: Vec<A::Event>,
        context: Self::AC,
        metadata: HashMap<String, String>,
    ) -> StoreResult<Vec<EventEnvelope<A>>> {
        if events.is_empty() {
            return Ok(Vec::new());
        }

        // Ensure parent directory exists
        if let Some(parent) = self.log_path.parent() {
            std::fs::create_dir_all(parent).map_err(unexpected)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.log_path)
            .map_err(unexpected)?;

        // Acquire exclusive lock for writing
        file.lock_exclusive().map_err(unexpected)?;

        let FileAggregateContext {
            aggregate_id,
            mut aggregate,
            current_sequence,
        } = context;

        // Check for concurrent writes (optimistic concurrency)
        let last_sequence = read_last_sequence::<A>(&file, &aggregate_id)?;
        if last_sequence != current_sequence {
            return Err(AggregateError::AggregateConflict);
        }

        let mut sequence = current_sequence;
        let mut envelopes: Vec<EventEnvelope<A>> = Vec::new();

        for event in events {
            sequence += 1;

            let record = StoredEvent {
                aggregate_id: aggregate_id.clone(),
                sequence,
                recorded_at: TimestampUtc::now(),
                event_type: event.event_type(),
                event_version: event.event_version(),
                event: event.clone(),
                metadata: metadata.clone(),
            };

            let line = serde_json::to_string(&record).map_err(unexpected)?;
            writeln!(file, "{}", line).map_err(unexpected)?;

            envelopes.push(EventEnvelope {
                aggregate_id: aggregate_id.clone(),
                sequence: sequence as usize,
                payload: event,
                metadata: metadata.clone(),
            });
        }

        // Ensure all data is persisted
        file.flush().map_err(unexpected)?;
        file.sync_all().map_err(unexpected)?;

        // Take snapshot if threshold reached
        if should_snapshot(sequence, self.snapshot_every) {
            for envelope in &envelopes {
                aggregate.apply(envelope.payload.clone());
            }
            let snapshot = StoredSnapshot {
                aggregate_id,
                sequence,
                snapshot_at: TimestampUtc::now(),
                state: aggregate,
            };
            save_snapshot(&self.snapshot_path, &snapshot)?;
        }

        Ok(envelopes)
    }
}

/// Load a snapshot from disk.
fn load_snapshot<A: Aggregate<Error = DomainError>>(
    path: &Path,
) -> StoreResult<Option<StoredSnapshot<A>>> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(unexpected(e)),
    };

    let snapshot: StoredSnapshot<A> = serde_json::from_str(&content)
        .map_err(|e| AggregateError::DeserializationError(Box::new(e)))?;

    Ok(Some(snapshot))
}

/// Save a snapshot to disk atomically.
fn save_snapshot<A: Aggregate<Error = DomainError>>(
    path: &Path,
    snapshot: &StoredSnapshot<A>,
) -> StoreResult<()> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(unexpected)?;
    }

    let content = serde_json::to_string(snapshot).map_err(unexpected)?;

    // Write to temp file, then rename for atomicity
    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, content).map_err(unexpected)?;
    std::fs::rename(&tmp_path, path).map_err(unexpected)?;

    Ok(())
}

/// Read the last sequence number for an aggregate from the log file.
fn read_last_sequence<A: Aggregate<Error = DomainError>>(
    file: &File,
    aggregate_id: &str,
) -> StoreResult<u64> {
    let mut reader = BufReader::new(file.try_clone().map_err(unexpected)?);

    reader.seek(SeekFrom::Start(0)).map_err(unexpected)?;

    let mut last_sequence = 0u64;

    for line in reader.lines() {
        let line = line.map_err(unexpected)?;
        let stored: StoredEvent<A::Event> = serde_json::from_str(&line)
            .map_err(|e| AggregateError::DeserializationError(Box::new(e)))?;

        if stored.aggregate_id == aggregate_id {
            last_sequence = stored.sequence;
        }
    }

    Ok(last_sequence)
}

/// Determines if a snapshot should be taken based on sequence and threshold.
fn should_snapshot(sequence: u64, snapshot_every: u64) -> bool {
    if snapshot_every == 0 {
        return false;
    }
    sequence % snapshot_every == 0
}

#[cfg(test)]
#[path = "tests/file_store_tests.rs"]
mod tests;
