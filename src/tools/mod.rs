//! Process-Backed Tool Invocation
//!
//! Manages an external tool-serving process and exposes typed tool
//! discovery and invocation over its line-delimited JSON-RPC streams.

pub mod client;
pub mod framing;
pub mod process;
pub mod protocol;

// Re-export key public types
pub use client::{ToolClient, ToolError};
pub use framing::LineAssembler;
pub use process::{ProcessState, ProcessStatus};
pub use protocol::{RpcRequest, ToolDescriptor, ToolListing};
