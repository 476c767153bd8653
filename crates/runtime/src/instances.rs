//! Instance (running sandbox) lifecycle management.

use std::sync::Arc;

use agsbox_core::{AgsConfig, Error, Instance, InstanceOverrides, InstanceStatus, Result, ToolStatus};

use crate::api::{Filter, ListInstancesRequest, StartInstanceRequest};
use crate::client::ControlPlane;
use crate::tools::ToolManager;

/// Parameters for starting a sandbox instance.
///
/// Exactly one of `tool_id` / `tool_name` must be set; a name is resolved
/// against the tool list before the start call. `overrides` replace the
/// tool's configuration field-by-field (lists wholesale, never deep-merged).
#[derive(Debug, Clone, Default)]
pub struct StartInstanceSpec {
    pub tool_id: Option<String>,
    pub tool_name: Option<String>,
    /// Provider duration string; falls back to the configured default.
    pub timeout: Option<String>,
    pub overrides: Option<InstanceOverrides>,
}

impl StartInstanceSpec {
    pub fn by_id(tool_id: impl Into<String>) -> Self {
        Self {
            tool_id: Some(tool_id.into()),
            ..Self::default()
        }
    }

    pub fn by_name(tool_name: impl Into<String>) -> Self {
        Self {
            tool_name: Some(tool_name.into()),
            ..Self::default()
        }
    }
}

/// Optional, AND-combined filters for listing instances.
#[derive(Debug, Clone, Default)]
pub struct ListInstancesSpec {
    pub instance_ids: Option<Vec<String>>,
    pub tool_id: Option<String>,
    pub status: Option<InstanceStatus>,
    pub limit: u32,
    pub offset: u32,
}

/// Starts, stops, and lists sandbox instances.
///
/// Holds no local cache: every query re-fetches from the control plane, and
/// instance existence is independent of this process.
pub struct InstanceManager {
    plane: Arc<dyn ControlPlane>,
    config: AgsConfig,
    tools: ToolManager,
}

impl InstanceManager {
    pub fn new(plane: Arc<dyn ControlPlane>, config: AgsConfig) -> Self {
        let tools = ToolManager::new(plane.clone(), config.clone());
        Self {
            plane,
            config,
            tools,
        }
    }

    /// Start an instance from a tool and return its id.
    pub async fn start_instance(&self, spec: StartInstanceSpec) -> Result<String> {
        let (tool_id, tool_name) = match (&spec.tool_id, &spec.tool_name) {
            (Some(id), None) => (Some(id.clone()), None),
            (None, Some(name)) => {
                let tool = self
                    .tools
                    .find_by_name(name)
                    .await?
                    .ok_or_else(|| Error::tool_not_found(name))?;
                // Save the remote round-trip when the tool cannot start yet.
                if tool.status != ToolStatus::Active {
                    return Err(Error::instance_start(
                        "ToolNotActive",
                        format!(
                            "tool '{name}' ({}) is {}, not ACTIVE; wait for activation first",
                            tool.tool_id, tool.status
                        ),
                    ));
                }
                (Some(tool.tool_id), None)
            }
            _ => {
                return Err(Error::configuration(
                    "exactly one of tool_id or tool_name must be provided",
                ));
            }
        };

        let request = StartInstanceRequest {
            tool_id: tool_id.clone(),
            tool_name,
            timeout: spec
                .timeout
                .unwrap_or_else(|| self.config.timeout().to_string()),
            client_token: uuid::Uuid::new_v4().to_string(),
            custom_configuration: spec.overrides,
        };

        let response = self
            .plane
            .start_instance(request)
            .await
            .map_err(|e| Error::instance_start(e.code, e.message))?;

        let instance_id = response.instance.instance_id;
        tracing::info!(
            instance_id = %instance_id,
            tool_id = ?tool_id,
            "Sandbox instance started"
        );
        Ok(instance_id)
    }

    /// List instances matching the given filters (AND semantics).
    pub async fn list_instances(&self, spec: ListInstancesSpec) -> Result<Vec<Instance>> {
        let filters = spec
            .status
            .map(|status| {
                vec![Filter {
                    name: "Status".into(),
                    values: vec![status.to_string()],
                }]
            })
            .unwrap_or_default();

        let request = ListInstancesRequest {
            instance_ids: spec.instance_ids,
            tool_id: spec.tool_id,
            filters,
            limit: if spec.limit == 0 { 20 } else { spec.limit },
            offset: spec.offset,
        };
        let response = self
            .plane
            .list_instances(request)
            .await
            .map_err(|e| Error::api("DescribeSandboxInstanceList", e.code, e.message))?;
        Ok(response.sandbox_instance_set)
    }

    /// Stop an instance. Idempotent: stopping an instance that is already
    /// gone is success, not an error.
    pub async fn stop_instance(&self, instance_id: &str) -> Result<()> {
        match self.plane.stop_instance(instance_id).await {
            Ok(()) => {
                tracing::info!(instance_id, "Sandbox instance stopped");
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                tracing::info!(instance_id, "Sandbox instance already stopped");
                Ok(())
            }
            Err(e) => Err(Error::api("StopSandboxInstance", e.code, e.message)),
        }
    }
}
