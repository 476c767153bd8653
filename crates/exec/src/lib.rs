#![deny(unused)]
//! Interactive execution sessions against running sandboxes.
//!
//! Where `agsbox_runtime` manages sandbox lifecycles through the control
//! plane, this crate talks to the execution plane: it resolves a tool to a
//! session target, opens an interactive session, and dispatches commands,
//! code, and file uploads over it.
//!
//! Sessions advertise a fixed [`session::CapabilitySet`] at open time.
//! [`adapter::ExecutionAdapter`] branches on it up front: direct code
//! execution when the runtime capability is present, upload-plus-command
//! otherwise.

pub mod adapter;
pub mod connector;
pub mod session;

pub use adapter::ExecutionAdapter;
pub use connector::{MockConnector, SessionConnector, SessionTarget};
pub use session::{
    Capability, CapabilitySet, CodeRequest, CommandRequest, CommandResult, ExecOutcome,
    ExecSession, Language, MockSession, OutputSink, WrittenFile,
};
