//! The tool-serving shell: per-user invocation gate and the JSON-lines
//! dispatch loop.

mod dispatch;
mod gate;

pub use dispatch::{serve_stdio, ToolServer, TOOL_NAMES};
pub use gate::InvocationGate;
