//! Employee lifecycle actors.
//!
//! Each employee is a durable root actor supervising a notification digest
//! scheduler and a location tracker. Actor state is event-sourced into a
//! per-address journal, so a restarted actor resumes where it left off.

pub mod activities;
pub mod actors;
pub mod config;
pub mod domain;
pub mod engine;
pub mod event_store;
pub mod journal;
pub mod paths;

pub use engine::{EmployeeHandle, Engine, EngineError};
