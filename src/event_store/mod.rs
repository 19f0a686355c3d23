//! File-based event store for the actor journals.
//!
//! This module provides a JSONL-based event store with snapshot support,
//! generic over the aggregate it persists. Each actor address gets its own
//! log and snapshot file.

pub mod file_store;

pub use file_store::{FileAggregateContext, FileEventStore, StoredEvent, StoredSnapshot};
