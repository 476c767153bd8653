//! Execution-plane sessions.
//!
//! This module provides the [`ExecSession`] trait over an interactive
//! execution service plus [`MockSession`] for tests. Sessions advertise a
//! fixed [`CapabilitySet`] at open time; callers branch on it instead of
//! probing the remote side and interpreting low-level failures.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use agsbox_core::Result;

// =============================================================================
// Capabilities
// =============================================================================

/// A feature an execution session may expose.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Shell command execution. Every session has this.
    Commands,
    /// Direct code execution in a managed language runtime.
    CodeRuntime,
    /// File read/write inside the sandbox.
    Files,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::Commands => write!(f, "Commands"),
            Capability::CodeRuntime => write!(f, "CodeRuntime"),
            Capability::Files => write!(f, "Files"),
        }
    }
}

/// The capabilities of one session, fixed at open time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CapabilitySet {
    commands: bool,
    code_runtime: bool,
    files: bool,
}

impl CapabilitySet {
    /// Commands and files only, no managed code runtime.
    pub fn commands_only() -> Self {
        Self {
            commands: true,
            code_runtime: false,
            files: true,
        }
    }

    /// Everything, including the code runtime.
    pub fn full() -> Self {
        Self {
            commands: true,
            code_runtime: true,
            files: true,
        }
    }

    pub fn supports(&self, capability: Capability) -> bool {
        match capability {
            Capability::Commands => self.commands,
            Capability::CodeRuntime => self.code_runtime,
            Capability::Files => self.files,
        }
    }
}

// =============================================================================
// Requests and results
// =============================================================================

/// Incremental output callback, invoked once per chunk as it arrives.
pub type OutputSink = Arc<dyn Fn(&str) + Send + Sync>;

/// Language for direct code execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    Python,
    JavaScript,
    Bash,
}

impl Default for Language {
    fn default() -> Self {
        Language::Python
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Language::Python => write!(f, "python"),
            Language::JavaScript => write!(f, "javascript"),
            Language::Bash => write!(f, "bash"),
        }
    }
}

/// A shell command to run in the session.
#[derive(Clone, Default)]
pub struct CommandRequest {
    pub command: String,
    /// User to run as; the session default when unset.
    pub user: Option<String>,
    /// Return immediately with a handle instead of waiting for completion.
    pub background: bool,
    pub timeout: Option<Duration>,
    pub on_stdout: Option<OutputSink>,
    pub on_stderr: Option<OutputSink>,
}

impl CommandRequest {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Self::default()
        }
    }
}

impl fmt::Debug for CommandRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandRequest")
            .field("command", &self.command)
            .field("user", &self.user)
            .field("background", &self.background)
            .field("timeout", &self.timeout)
            .field("on_stdout", &self.on_stdout.is_some())
            .field("on_stderr", &self.on_stderr.is_some())
            .finish()
    }
}

/// A snippet to run in the session's managed code runtime.
#[derive(Clone)]
pub struct CodeRequest {
    pub code: String,
    pub language: Language,
    pub timeout: Option<Duration>,
    pub on_stdout: Option<OutputSink>,
    pub on_stderr: Option<OutputSink>,
}

impl CodeRequest {
    pub fn new(code: impl Into<String>, language: Language) -> Self {
        Self {
            code: code.into(),
            language,
            timeout: None,
            on_stdout: None,
            on_stderr: None,
        }
    }
}

impl fmt::Debug for CodeRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodeRequest")
            .field("code", &self.code)
            .field("language", &self.language)
            .field("timeout", &self.timeout)
            .field("on_stdout", &self.on_stdout.is_some())
            .field("on_stderr", &self.on_stderr.is_some())
            .finish()
    }
}

/// Final result of a completed execution.
#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: i64,
    pub stdout: String,
    pub stderr: String,
}

impl CommandResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Outcome of `run_command`: completed inline, or detached in the sandbox.
#[derive(Debug, Clone)]
pub enum ExecOutcome {
    Completed(CommandResult),
    /// The command keeps running; `handle_id` identifies it session-side.
    Background { handle_id: String },
}

// =============================================================================
// Session Trait
// =============================================================================

/// An open interactive session against one sandbox.
///
/// Capabilities are fixed for the session's lifetime. `run_code` must only
/// be called when [`Capability::CodeRuntime`] is supported; the adapter
/// enforces this before dispatch.
#[async_trait]
pub trait ExecSession: Send + Sync + fmt::Debug {
    fn capabilities(&self) -> CapabilitySet;

    /// Run a shell command, streaming output to the request's sinks while
    /// accumulating the final result.
    async fn run_command(&self, req: CommandRequest) -> Result<ExecOutcome>;

    /// Run code in the managed runtime.
    async fn run_code(&self, req: CodeRequest) -> Result<CommandResult>;

    /// Write a file into the sandbox at the given path, owned by `user`
    /// (the session default when unset).
    async fn write_file(&self, path: &str, content: &[u8], user: Option<&str>) -> Result<()>;

    /// Close the session. The sandbox keeps running; only the session ends.
    async fn close(&self) -> Result<()>;
}

// =============================================================================
// Mock Session (for testing without a remote execution plane)
// =============================================================================

/// A file written through [`MockSession`], with the user it was written as.
#[derive(Debug, Clone)]
pub struct WrittenFile {
    pub content: Vec<u8>,
    pub user: Option<String>,
}

/// In-memory session for unit testing.
///
/// Clones share state, so a test can keep one handle while the connector
/// hands an identical one to the adapter and still observe call counts.
#[derive(Debug, Clone, Default)]
pub struct MockSession {
    capabilities: CapabilitySet,
    /// Predefined results, consumed front-first; a generic success once empty.
    pub scripted: Arc<Mutex<Vec<CommandResult>>>,
    pub files: Arc<Mutex<HashMap<String, WrittenFile>>>,
    pub run_command_calls: Arc<AtomicUsize>,
    pub run_code_calls: Arc<AtomicUsize>,
    background_seq: Arc<AtomicUsize>,
}

impl MockSession {
    pub fn new(capabilities: CapabilitySet) -> Self {
        Self {
            capabilities,
            ..Self::default()
        }
    }

    /// Queue a predefined result for the next execution.
    pub fn script_result(&self, result: CommandResult) {
        self.scripted.lock().unwrap().push(result);
    }

    fn next_result(&self) -> CommandResult {
        let mut scripted = self.scripted.lock().unwrap();
        if scripted.is_empty() {
            CommandResult {
                exit_code: 0,
                stdout: "[mock] executed".to_string(),
                stderr: String::new(),
            }
        } else {
            scripted.remove(0)
        }
    }
}

#[async_trait]
impl ExecSession for MockSession {
    fn capabilities(&self) -> CapabilitySet {
        self.capabilities
    }

    async fn run_command(&self, req: CommandRequest) -> Result<ExecOutcome> {
        self.run_command_calls.fetch_add(1, Ordering::SeqCst);
        if req.background {
            let n = self.background_seq.fetch_add(1, Ordering::SeqCst) + 1;
            return Ok(ExecOutcome::Background {
                handle_id: format!("bg-{n:04}"),
            });
        }
        let result = self.next_result();
        if let Some(sink) = &req.on_stdout {
            sink(&result.stdout);
        }
        if let Some(sink) = &req.on_stderr {
            sink(&result.stderr);
        }
        Ok(ExecOutcome::Completed(result))
    }

    async fn run_code(&self, req: CodeRequest) -> Result<CommandResult> {
        self.run_code_calls.fetch_add(1, Ordering::SeqCst);
        let result = self.next_result();
        if let Some(sink) = &req.on_stdout {
            sink(&result.stdout);
        }
        Ok(result)
    }

    async fn write_file(&self, path: &str, content: &[u8], user: Option<&str>) -> Result<()> {
        self.files.lock().unwrap().insert(
            path.to_string(),
            WrittenFile {
                content: content.to_vec(),
                user: user.map(str::to_string),
            },
        );
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capability_sets_report_membership() {
        let limited = CapabilitySet::commands_only();
        assert!(limited.supports(Capability::Commands));
        assert!(limited.supports(Capability::Files));
        assert!(!limited.supports(Capability::CodeRuntime));
        assert!(CapabilitySet::full().supports(Capability::CodeRuntime));
    }

    #[tokio::test]
    async fn mock_streams_and_accumulates() {
        let session = MockSession::new(CapabilitySet::full());
        session.script_result(CommandResult {
            exit_code: 0,
            stdout: "file1.py\n".into(),
            stderr: String::new(),
        });

        let streamed = Arc::new(Mutex::new(String::new()));
        let sink_target = streamed.clone();
        let mut req = CommandRequest::new("ls");
        req.on_stdout = Some(Arc::new(move |chunk| {
            sink_target.lock().unwrap().push_str(chunk);
        }));

        let outcome = session.run_command(req).await.unwrap();
        match outcome {
            ExecOutcome::Completed(result) => assert_eq!(result.stdout, "file1.py\n"),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(*streamed.lock().unwrap(), "file1.py\n");
        assert_eq!(session.run_command_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn mock_background_returns_handle() {
        let session = MockSession::new(CapabilitySet::full());
        let mut req = CommandRequest::new("sleep 999");
        req.background = true;

        let outcome = session.run_command(req).await.unwrap();
        assert!(matches!(
            outcome,
            ExecOutcome::Background { handle_id } if handle_id.starts_with("bg-")
        ));
    }

    #[tokio::test]
    async fn mock_write_file_records_content_and_user() {
        let session = MockSession::new(CapabilitySet::commands_only());
        session
            .write_file("src/main.py", b"print('hi')", None)
            .await
            .unwrap();
        session
            .write_file("etc/app.conf", b"debug=1", Some("root"))
            .await
            .unwrap();

        let files = session.files.lock().unwrap();
        let default_user = files.get("src/main.py").unwrap();
        assert_eq!(default_user.content, b"print('hi')");
        assert!(default_user.user.is_none());
        let as_root = files.get("etc/app.conf").unwrap();
        assert_eq!(as_root.user.as_deref(), Some("root"));
    }
}
