//! Job Queue (C5, spec.md §4.5): two durable, at-least-once queues sharing
//! one claim protocol and state machine (`db::entities::JobStatus`).

pub mod claim;
pub mod generation;
pub mod trigger;
pub mod worker;

pub use worker::Worker;
