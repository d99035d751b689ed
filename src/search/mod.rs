//! The asynchronous search subsystem: scheduling, background execution,
//! signal evaluation, and pagination over result sessions.

pub mod eval;
mod executor;
pub mod pagination;
pub mod salary;
pub mod scheduler;
pub mod titles;

pub use scheduler::{
    long_guidance, tool_names, CancelReply, ResultsReply, SearchRuntime, StartReply,
    StatusReply, ToolError,
};
