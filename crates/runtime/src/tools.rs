//! Tool (sandbox template) lifecycle management.

use std::sync::Arc;
use std::time::Duration;

use agsbox_core::naming::validate_tool_name;
use agsbox_core::{
    AgsConfig, EnvVar, Error, NetworkMode, PortSpec, ProbeSpec, ResourceSpec, Result, StorageMount,
    Tag, Tool, ToolStatus,
};

use crate::api::{
    CreateToolRequest, CustomConfiguration, ListToolsRequest, NetworkConfiguration,
    StorageMountSpec,
};
use crate::client::ControlPlane;

/// Provider-enforced page size ceiling for list calls.
const MAX_PAGE_SIZE: u32 = 100;

/// Flat creation parameters for a sandbox tool.
///
/// `name` must already satisfy the identifier policy
/// ([`agsbox_core::naming::validate_tool_name`]); the manager rejects
/// non-conforming names rather than sanitizing them. Callers starting from an
/// image reference derive a compliant name with
/// [`agsbox_core::naming::derive_tool_name`].
#[derive(Debug, Clone)]
pub struct CreateToolSpec {
    pub name: String,
    pub image: String,
    pub description: String,
    /// Default timeout for instances of this tool, provider duration string.
    pub default_timeout: String,
    pub network_mode: NetworkMode,
    pub command: Option<Vec<String>>,
    pub args: Option<Vec<String>>,
    pub registry_type: Option<String>,
    pub role_arn: Option<String>,
    pub ports: Vec<PortSpec>,
    pub env: Vec<EnvVar>,
    pub cpu: Option<String>,
    pub memory: Option<String>,
    pub probe: ProbeSpec,
    pub tags: Vec<Tag>,
    /// Mounts for this tool. `Some` fully replaces the config-derived
    /// default mount, even when empty; `None` falls back to it.
    pub mounts: Option<Vec<StorageMount>>,
}

impl CreateToolSpec {
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            description: String::new(),
            default_timeout: "5m".into(),
            network_mode: NetworkMode::Public,
            command: None,
            args: None,
            registry_type: None,
            role_arn: None,
            ports: Vec::new(),
            env: Vec::new(),
            cpu: None,
            memory: None,
            probe: ProbeSpec::default(),
            tags: Vec::new(),
            mounts: None,
        }
    }
}

/// Creates, lists, polls, and deletes sandbox tools on the control plane.
pub struct ToolManager {
    plane: Arc<dyn ControlPlane>,
    config: AgsConfig,
}

impl ToolManager {
    pub fn new(plane: Arc<dyn ControlPlane>, config: AgsConfig) -> Self {
        Self { plane, config }
    }

    /// Register a new sandbox tool and return its provider-assigned id.
    ///
    /// The returned tool starts in CREATING; use [`Self::wait_until_active`]
    /// before starting instances from it.
    pub async fn create_tool(&self, spec: CreateToolSpec) -> Result<String> {
        validate_tool_name(&spec.name)?;

        let mounts: Vec<StorageMountSpec> = match &spec.mounts {
            Some(mounts) => mounts.iter().map(StorageMountSpec::from).collect(),
            None => self
                .config
                .default_mount()
                .as_ref()
                .map(StorageMountSpec::from)
                .into_iter()
                .collect(),
        };

        let role_arn = spec
            .role_arn
            .clone()
            .filter(|r| !r.is_empty())
            .or_else(|| {
                let r = self.config.role_arn();
                (!r.is_empty()).then(|| r.to_string())
            });

        let request = CreateToolRequest {
            tool_name: spec.name.clone(),
            tool_type: "custom".into(),
            description: spec.description,
            default_timeout: spec.default_timeout,
            client_token: uuid::Uuid::new_v4().to_string(),
            role_arn,
            network_configuration: NetworkConfiguration {
                network_mode: spec.network_mode,
            },
            custom_configuration: CustomConfiguration {
                image: spec.image.clone(),
                image_registry_type: spec
                    .registry_type
                    .unwrap_or_else(|| self.config.image_registry_type().to_string()),
                command: spec
                    .command
                    .unwrap_or_else(|| vec!["/bin/sh".into(), "-c".into()]),
                args: spec.args.unwrap_or_else(|| vec!["-l".into()]),
                ports: spec.ports,
                env: spec.env,
                resources: ResourceSpec {
                    cpu: spec.cpu.unwrap_or_else(|| self.config.cpu().to_string()),
                    memory: spec
                        .memory
                        .unwrap_or_else(|| self.config.memory().to_string()),
                },
                probe: (&spec.probe).into(),
            },
            storage_mounts: mounts,
            tags: spec.tags,
        };

        let response = self
            .plane
            .create_tool(request)
            .await
            .map_err(|e| Error::tool_creation(e.code, e.message))?;

        tracing::info!(
            tool_id = %response.tool_id,
            tool_name = %spec.name,
            image = %spec.image,
            "Sandbox tool created"
        );
        Ok(response.tool_id)
    }

    /// Poll the tool's status until it becomes ACTIVE.
    ///
    /// Suspends for `poll_period` between polls. A FAILED status fails
    /// immediately with [`Error::ToolActivation`] regardless of the remaining
    /// budget; running out of `ready_timeout` fails with
    /// [`Error::ToolTimeout`] so callers can tell "will never succeed" from
    /// "ran out of patience". No further status query is issued once ACTIVE
    /// is observed.
    pub async fn wait_until_active(
        &self,
        tool_id: &str,
        ready_timeout: Duration,
        poll_period: Duration,
    ) -> Result<Tool> {
        let start = tokio::time::Instant::now();
        loop {
            let response = self
                .plane
                .list_tools(ListToolsRequest::by_ids(vec![tool_id.to_string()]))
                .await
                .map_err(|e| Error::api("DescribeSandboxToolList", e.code, e.message))?;
            let tool = response
                .sandbox_tool_set
                .into_iter()
                .next()
                .ok_or_else(|| Error::tool_not_found(tool_id))?;

            match tool.status {
                ToolStatus::Active => {
                    tracing::info!(tool_id, elapsed = ?start.elapsed(), "Sandbox tool is ACTIVE");
                    return Ok(tool);
                }
                ToolStatus::Failed => {
                    let message = tool
                        .status_message
                        .unwrap_or_else(|| "no status message".into());
                    return Err(Error::ToolActivation {
                        tool_id: tool_id.to_string(),
                        message,
                    });
                }
                status => {
                    tracing::debug!(tool_id, %status, elapsed = ?start.elapsed(), "Waiting for ACTIVE");
                }
            }

            if start.elapsed() + poll_period > ready_timeout {
                return Err(Error::ToolTimeout {
                    tool_id: tool_id.to_string(),
                    waited: start.elapsed(),
                });
            }
            tokio::time::sleep(poll_period).await;
        }
    }

    /// List tools, optionally restricted to the given ids.
    ///
    /// Pagination passes through unmodified apart from clamping `limit` to
    /// the provider maximum; ordering is provider-defined (creation time
    /// descending).
    pub async fn list_tools(
        &self,
        ids: Option<Vec<String>>,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Tool>> {
        let request = ListToolsRequest {
            tool_ids: ids,
            filters: Vec::new(),
            limit: limit.min(MAX_PAGE_SIZE),
            offset,
        };
        let response = self
            .plane
            .list_tools(request)
            .await
            .map_err(|e| Error::api("DescribeSandboxToolList", e.code, e.message))?;
        Ok(response.sandbox_tool_set)
    }

    /// Find a tool by exact name.
    ///
    /// The provider cannot filter on ToolName server-side, so this scans
    /// pages client-side. With duplicate names the first match wins, which
    /// is the most recently created tool under provider ordering.
    pub async fn find_by_name(&self, name: &str) -> Result<Option<Tool>> {
        self.scan(|tool| tool.tool_name == name).await
    }

    /// Find a tool whose name or tag value matches `name`. Same duplicate
    /// policy as [`Self::find_by_name`].
    pub async fn find_by_name_or_tag(&self, name: &str) -> Result<Option<Tool>> {
        self.scan(|tool| tool.tool_name == name || tool.has_tag_value(name))
            .await
    }

    async fn scan(&self, matches: impl Fn(&Tool) -> bool) -> Result<Option<Tool>> {
        let mut offset = 0;
        loop {
            let page = self.list_tools(None, MAX_PAGE_SIZE, offset).await?;
            let page_len = page.len() as u32;
            if let Some(tool) = page.into_iter().find(&matches) {
                return Ok(Some(tool));
            }
            if page_len < MAX_PAGE_SIZE {
                return Ok(None);
            }
            offset += MAX_PAGE_SIZE;
        }
    }

    /// Delete a tool. Idempotent: deleting an id that is already gone is
    /// success, not an error, since templates have no dependent state once
    /// instances are stopped.
    pub async fn delete_tool(&self, tool_id: &str) -> Result<()> {
        match self.plane.delete_tool(tool_id).await {
            Ok(()) => {
                tracing::info!(tool_id, "Sandbox tool deleted");
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                tracing::info!(tool_id, "Sandbox tool already deleted");
                Ok(())
            }
            Err(e) => Err(Error::api("DeleteSandboxTool", e.code, e.message)),
        }
    }
}
