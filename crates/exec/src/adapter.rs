//! Execution adapter: resolve a tool, open a session, dispatch work.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use secrecy::Secret;

use agsbox_core::{AgsConfig, Error, Result};
use agsbox_runtime::{ControlPlane, ToolManager};

use crate::connector::{SessionConnector, SessionTarget};
use crate::session::{
    Capability, CodeRequest, CommandRequest, CommandResult, ExecOutcome, ExecSession,
};

/// Bridges the control plane (tool resolution) and the execution plane
/// (interactive sessions).
///
/// Direct code execution is dispatched only when the session advertises
/// [`Capability::CodeRuntime`]; everything else goes through the universal
/// upload-plus-command path.
pub struct ExecutionAdapter {
    tools: ToolManager,
    connector: Arc<dyn SessionConnector>,
    config: AgsConfig,
}

impl ExecutionAdapter {
    pub fn new(
        plane: Arc<dyn ControlPlane>,
        connector: Arc<dyn SessionConnector>,
        config: AgsConfig,
    ) -> Self {
        let tools = ToolManager::new(plane, config.clone());
        Self {
            tools,
            connector,
            config,
        }
    }

    /// Resolve `tool_name` and open an execution session against it.
    ///
    /// Resolution matches the tool name or a tag value equal to it. The
    /// target's domain is taken from the resolved configuration on every
    /// call, so a session opened earlier against another region can never
    /// leak its domain into this one.
    pub async fn create_session(
        &self,
        tool_name: &str,
        timeout: Duration,
        api_key: Option<Secret<String>>,
    ) -> Result<Box<dyn ExecSession>> {
        let tool = self
            .tools
            .find_by_name_or_tag(tool_name)
            .await?
            .ok_or_else(|| Error::sandbox_resolution(tool_name))?;

        let api_key = api_key
            .or_else(|| self.config.exec_api_key().cloned())
            .ok_or_else(|| {
                Error::configuration(
                    "no execution API key: pass one explicitly or set EXEC_API_KEY",
                )
            })?;

        let target = SessionTarget {
            template: tool.tool_name.clone(),
            timeout,
            api_key,
            domain: self.config.domain().to_string(),
        };
        tracing::info!(
            template = %target.template,
            domain = %target.domain,
            "Opening execution session"
        );
        self.connector.open(target).await
    }

    /// Run a shell command in the session. Always supported.
    pub async fn execute_command(
        &self,
        session: &dyn ExecSession,
        req: CommandRequest,
    ) -> Result<ExecOutcome> {
        session.run_command(req).await
    }

    /// Run code in the session's managed runtime.
    ///
    /// The capability check comes before any dispatch: an incapable session
    /// would fail remotely with a far less diagnostic error.
    pub async fn execute_code(
        &self,
        session: &dyn ExecSession,
        req: CodeRequest,
    ) -> Result<CommandResult> {
        if !session.capabilities().supports(Capability::CodeRuntime) {
            return Err(Error::unsupported_capability(
                Capability::CodeRuntime.to_string(),
                "upload_file followed by execute_command",
            ));
        }
        session.run_code(req).await
    }

    /// Copy a local file into the sandbox, written as `user` (the session
    /// default when unset). Universal fallback for sessions without a code
    /// runtime.
    pub async fn upload_file(
        &self,
        session: &dyn ExecSession,
        local_path: &Path,
        remote_path: &str,
        user: Option<&str>,
    ) -> Result<()> {
        let content = tokio::fs::read(local_path)
            .await
            .with_context(|| format!("reading local file {}", local_path.display()))?;
        session.write_file(remote_path, &content, user).await?;
        tracing::debug!(
            local = %local_path.display(),
            remote = remote_path,
            bytes = content.len(),
            "Uploaded file into sandbox"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::atomic::Ordering;
    use std::sync::Mutex;

    use agsbox_core::{Tag, Tool, ToolStatus};
    use agsbox_runtime::MockControlPlane;

    use crate::connector::MockConnector;
    use crate::session::{CapabilitySet, Language};

    fn config_for(region: &str) -> AgsConfig {
        AgsConfig::builder()
            .secret_id("id")
            .secret_key("key")
            .region(region)
            .exec_api_key("exec-key")
            .build()
            .unwrap()
    }

    fn seeded_tool(name: &str) -> Tool {
        Tool {
            tool_id: "tool-1".into(),
            tool_name: name.into(),
            image: "python:3.11".into(),
            image_registry_type: "enterprise".into(),
            status: ToolStatus::Active,
            status_message: None,
            network_mode: None,
            resources: None,
            env: Vec::new(),
            ports: Vec::new(),
            probe: None,
            storage_mounts: Vec::new(),
            tags: Vec::new(),
            created_at: None,
        }
    }

    fn adapter_with(
        capabilities: CapabilitySet,
        config: AgsConfig,
    ) -> (Arc<MockControlPlane>, Arc<MockConnector>, ExecutionAdapter) {
        let plane = Arc::new(MockControlPlane::new());
        let connector = Arc::new(MockConnector::new(capabilities));
        let adapter = ExecutionAdapter::new(plane.clone(), connector.clone(), config);
        (plane, connector, adapter)
    }

    #[tokio::test]
    async fn unresolved_tool_names_the_registration_step() {
        let (_plane, connector, adapter) =
            adapter_with(CapabilitySet::full(), config_for("ap-guangzhou"));

        let err = adapter
            .create_session("ghost", Duration::from_secs(60), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SandboxResolution(_)));
        assert!(err.to_string().contains("run tool registration first"));
        assert!(connector.opened_targets.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn resolves_by_tag_value() {
        let (plane, _connector, adapter) =
            adapter_with(CapabilitySet::full(), config_for("ap-guangzhou"));
        let mut tool = seeded_tool("internal-name");
        tool.tags = vec![Tag::new("image", "swebench-lite")];
        plane.seed_tool(tool);

        adapter
            .create_session("swebench-lite", Duration::from_secs(60), None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn missing_api_key_is_a_configuration_error() {
        let plane = Arc::new(MockControlPlane::new());
        plane.seed_tool(seeded_tool("t"));
        let connector = Arc::new(MockConnector::new(CapabilitySet::full()));
        // No exec_api_key on the config, none passed explicitly.
        let config = AgsConfig::builder()
            .secret_id("id")
            .secret_key("key")
            .build()
            .unwrap();
        let adapter = ExecutionAdapter::new(plane, connector.clone(), config);

        let err = adapter
            .create_session("t", Duration::from_secs(60), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
        assert!(connector.opened_targets.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn every_open_carries_the_config_domain() {
        let (plane, connector, adapter) =
            adapter_with(CapabilitySet::full(), config_for("eu-frankfurt"));
        plane.seed_tool(seeded_tool("t"));

        adapter
            .create_session("t", Duration::from_secs(60), None)
            .await
            .unwrap();
        adapter
            .create_session("t", Duration::from_secs(60), None)
            .await
            .unwrap();

        let opened = connector.opened_targets.lock().unwrap();
        assert_eq!(opened.len(), 2);
        for target in opened.iter() {
            assert_eq!(target.domain, "eu-frankfurt.agentsandbox.com");
        }
    }

    #[tokio::test]
    async fn execute_code_without_runtime_makes_no_remote_call() {
        let (plane, connector, adapter) =
            adapter_with(CapabilitySet::commands_only(), config_for("ap-guangzhou"));
        plane.seed_tool(seeded_tool("t"));

        let session = adapter
            .create_session("t", Duration::from_secs(60), None)
            .await
            .unwrap();
        let err = adapter
            .execute_code(
                session.as_ref(),
                CodeRequest::new("print('hi')", Language::Python),
            )
            .await
            .unwrap_err();

        match err {
            Error::UnsupportedCapability { capability, fallback } => {
                assert_eq!(capability, "CodeRuntime");
                assert!(fallback.contains("upload_file"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(connector.session.run_code_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn execute_code_dispatches_when_supported() {
        let (plane, connector, adapter) =
            adapter_with(CapabilitySet::full(), config_for("ap-guangzhou"));
        plane.seed_tool(seeded_tool("t"));

        let session = adapter
            .create_session("t", Duration::from_secs(60), None)
            .await
            .unwrap();
        let result = adapter
            .execute_code(
                session.as_ref(),
                CodeRequest::new("print('hi')", Language::Python),
            )
            .await
            .unwrap();
        assert!(result.success());
        assert_eq!(connector.session.run_code_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn execute_command_streams_to_sinks() {
        let (plane, connector, adapter) =
            adapter_with(CapabilitySet::commands_only(), config_for("ap-guangzhou"));
        plane.seed_tool(seeded_tool("t"));
        connector.session.script_result(CommandResult {
            exit_code: 0,
            stdout: "hello\n".into(),
            stderr: String::new(),
        });

        let session = adapter
            .create_session("t", Duration::from_secs(60), None)
            .await
            .unwrap();
        let streamed = Arc::new(Mutex::new(String::new()));
        let sink_target = streamed.clone();
        let mut req = CommandRequest::new("echo hello");
        req.on_stdout = Some(Arc::new(move |chunk| {
            sink_target.lock().unwrap().push_str(chunk);
        }));

        let outcome = adapter.execute_command(session.as_ref(), req).await.unwrap();
        match outcome {
            ExecOutcome::Completed(result) => assert_eq!(result.stdout, "hello\n"),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(*streamed.lock().unwrap(), "hello\n");
    }

    #[tokio::test]
    async fn upload_file_writes_local_content_through_the_session() {
        let (plane, connector, adapter) =
            adapter_with(CapabilitySet::commands_only(), config_for("ap-guangzhou"));
        plane.seed_tool(seeded_tool("t"));

        let mut local = tempfile::NamedTempFile::new().unwrap();
        local.write_all(b"print('from disk')").unwrap();

        let session = adapter
            .create_session("t", Duration::from_secs(60), None)
            .await
            .unwrap();
        adapter
            .upload_file(session.as_ref(), local.path(), "run.py", None)
            .await
            .unwrap();

        let files = connector.session.files.lock().unwrap();
        let written = files.get("run.py").unwrap();
        assert_eq!(written.content, b"print('from disk')");
        // No user requested: the session default applies.
        assert!(written.user.is_none());
    }

    #[tokio::test]
    async fn upload_file_threads_the_requested_user() {
        let (plane, connector, adapter) =
            adapter_with(CapabilitySet::commands_only(), config_for("ap-guangzhou"));
        plane.seed_tool(seeded_tool("t"));

        let mut local = tempfile::NamedTempFile::new().unwrap();
        local.write_all(b"setting=1").unwrap();

        let session = adapter
            .create_session("t", Duration::from_secs(60), None)
            .await
            .unwrap();
        adapter
            .upload_file(session.as_ref(), local.path(), "etc/app.conf", Some("root"))
            .await
            .unwrap();

        let files = connector.session.files.lock().unwrap();
        assert_eq!(
            files.get("etc/app.conf").unwrap().user.as_deref(),
            Some("root")
        );
    }

    #[tokio::test]
    async fn upload_file_missing_local_path_errors() {
        let (plane, _connector, adapter) =
            adapter_with(CapabilitySet::commands_only(), config_for("ap-guangzhou"));
        plane.seed_tool(seeded_tool("t"));

        let session = adapter
            .create_session("t", Duration::from_secs(60), None)
            .await
            .unwrap();
        let err = adapter
            .upload_file(session.as_ref(), Path::new("/no/such/file"), "run.py", None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("/no/such/file"));
    }
}
