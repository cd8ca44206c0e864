//! Payload-agnostic processing pipeline.
//!
//! ```text
//! Receiver ──poll──▶ Poller ──submit──▶ Processor ──permit──▶ Task::execute
//!                                         │
//!                                    TaskFactory
//! ```
//!
//! A [`Poller`] drains one receiver and hands every value to a
//! [`Processor`], which asks its [`TaskFactory`] for a task bound to that
//! value and runs it on a bounded pool. Nothing in this module knows what the
//! values or tasks are.

pub mod poller;
pub mod processor;
pub mod task;

pub use poller::Poller;
pub use processor::{Processor, ProcessorHandle};
pub use task::{Task, TaskFactory};
