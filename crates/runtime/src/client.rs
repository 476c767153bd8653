//! Control-plane client abstraction.
//!
//! This module provides the [`ControlPlane`] trait plus the HTTP binding
//! used in production ([`HttpControlPlane`]) and an in-memory mock used by
//! the manager tests ([`MockControlPlane`]). The trait returns raw
//! [`ApiError`]s; the managers wrap them with operation context.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use secrecy::{ExposeSecret, Secret};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};

use agsbox_core::{AgsConfig, Instance, InstanceStatus, Result, Tool, ToolStatus};

use crate::api::{
    AcquireTokenRequest, ApiError, ApiResult, CreateToolRequest, CreateToolResponse,
    DeleteToolRequest, ListInstancesRequest, ListInstancesResponse, ListToolsRequest,
    ListToolsResponse, StartInstanceRequest, StartInstanceResponse, StopInstanceRequest,
    TokenGrant,
};

// =============================================================================
// Control Plane Trait
// =============================================================================

/// Raw request/response surface of the sandbox control plane.
///
/// Implementations are opaque remote services: a status enum per
/// tool/instance and structured error codes are the only contract the
/// managers rely on.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    async fn create_tool(&self, req: CreateToolRequest) -> ApiResult<CreateToolResponse>;

    async fn list_tools(&self, req: ListToolsRequest) -> ApiResult<ListToolsResponse>;

    async fn delete_tool(&self, tool_id: &str) -> ApiResult<()>;

    async fn start_instance(&self, req: StartInstanceRequest) -> ApiResult<StartInstanceResponse>;

    async fn list_instances(&self, req: ListInstancesRequest) -> ApiResult<ListInstancesResponse>;

    async fn stop_instance(&self, instance_id: &str) -> ApiResult<()>;

    async fn acquire_token(&self, instance_id: &str) -> ApiResult<TokenGrant>;
}

// =============================================================================
// HTTP binding
// =============================================================================

/// HTTP binding for the control plane.
///
/// Every operation is a JSON POST to the configured endpoint, routed by the
/// `X-Api-Action` header and authenticated with the credential id plus a
/// hex SHA-256 digest over (secret key, timestamp, body). Replies arrive in
/// a `{"Response": {...}}` envelope; an embedded `Error` object becomes an
/// [`ApiError`].
pub struct HttpControlPlane {
    http: reqwest::Client,
    endpoint: String,
    region: String,
    secret_id: String,
    secret_key: Secret<String>,
}

impl HttpControlPlane {
    /// Build a binding from the resolved session configuration.
    pub fn new(config: &AgsConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs_f64(config.runtime_timeout_secs()))
            .danger_accept_invalid_certs(config.skip_tls_verify())
            .build()
            .map_err(|e| {
                agsbox_core::Error::http(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            http,
            endpoint: config.http_endpoint().to_string(),
            region: config.region().to_string(),
            secret_id: config.secret_id().to_string(),
            secret_key: config.secret_key().clone(),
        })
    }

    async fn call<B, T>(&self, action: &str, body: &B) -> ApiResult<T>
    where
        B: Serialize,
        T: DeserializeOwned,
    {
        let payload = serde_json::to_string(body)
            .map_err(|e| ApiError::transport(format!("request serialization: {e}")))?;
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        let signature = sign(&self.secret_key, timestamp, &payload);

        let response = self
            .http
            .post(format!("https://{}/", self.endpoint))
            .header("X-Api-Action", action)
            .header("X-Api-Region", &self.region)
            .header("X-Api-Timestamp", timestamp.to_string())
            .header(
                reqwest::header::AUTHORIZATION,
                format!("AGS1 Credential={}, Signature={signature}", self.secret_id),
            )
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(payload)
            .send()
            .await
            .map_err(|e| ApiError::transport(format!("{action}: {e}")))?;

        let envelope: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ApiError::transport(format!("{action}: invalid response body: {e}")))?;

        let inner = envelope
            .get("Response")
            .cloned()
            .ok_or_else(|| ApiError::transport(format!("{action}: missing Response envelope")))?;

        if let Some(err) = inner.get("Error") {
            let api_err: ApiError = serde_json::from_value(err.clone()).map_err(|e| {
                ApiError::transport(format!("{action}: malformed Error object: {e}"))
            })?;
            tracing::warn!(action, code = %api_err.code, "Control plane rejected request");
            return Err(api_err);
        }

        serde_json::from_value(inner)
            .map_err(|e| ApiError::transport(format!("{action}: malformed payload: {e}")))
    }
}

fn sign(secret_key: &Secret<String>, timestamp: u64, payload: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret_key.expose_secret().as_bytes());
    hasher.update(timestamp.to_string().as_bytes());
    hasher.update(payload.as_bytes());
    hex::encode(hasher.finalize())
}

#[async_trait]
impl ControlPlane for HttpControlPlane {
    async fn create_tool(&self, req: CreateToolRequest) -> ApiResult<CreateToolResponse> {
        self.call("CreateSandboxTool", &req).await
    }

    async fn list_tools(&self, req: ListToolsRequest) -> ApiResult<ListToolsResponse> {
        self.call("DescribeSandboxToolList", &req).await
    }

    async fn delete_tool(&self, tool_id: &str) -> ApiResult<()> {
        let req = DeleteToolRequest {
            tool_id: tool_id.to_string(),
        };
        // The delete reply carries only a request id.
        let _: serde_json::Value = self.call("DeleteSandboxTool", &req).await?;
        Ok(())
    }

    async fn start_instance(&self, req: StartInstanceRequest) -> ApiResult<StartInstanceResponse> {
        self.call("StartSandboxInstance", &req).await
    }

    async fn list_instances(&self, req: ListInstancesRequest) -> ApiResult<ListInstancesResponse> {
        self.call("DescribeSandboxInstanceList", &req).await
    }

    async fn stop_instance(&self, instance_id: &str) -> ApiResult<()> {
        let req = StopInstanceRequest {
            instance_id: instance_id.to_string(),
        };
        let _: serde_json::Value = self.call("StopSandboxInstance", &req).await?;
        Ok(())
    }

    async fn acquire_token(&self, instance_id: &str) -> ApiResult<TokenGrant> {
        let req = AcquireTokenRequest {
            instance_id: instance_id.to_string(),
        };
        self.call("AcquireSandboxInstanceToken", &req).await
    }
}

// =============================================================================
// Mock control plane (for tests without a remote endpoint)
// =============================================================================

/// In-memory control plane for unit and integration tests.
///
/// Tools and instances live in plain vectors; a scripted status queue lets
/// tests drive the CREATING → ACTIVE/FAILED transitions one poll at a time,
/// and per-operation call logs make poll-count assertions possible.
#[derive(Default)]
pub struct MockControlPlane {
    pub tools: Mutex<Vec<Tool>>,
    pub instances: Mutex<Vec<Instance>>,
    /// Statuses applied to the described tool, one per `list_tools` call.
    pub status_script: Mutex<VecDeque<ToolStatus>>,
    /// One-shot error injection, keyed by operation name.
    pub failures: Mutex<HashMap<&'static str, ApiError>>,
    /// Every operation invoked, in order.
    pub calls: Mutex<Vec<&'static str>>,
    /// Full create requests, for payload assertions.
    pub create_requests: Mutex<Vec<CreateToolRequest>>,
    next_id: AtomicU64,
}

impl MockControlPlane {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an existing tool.
    pub fn seed_tool(&self, tool: Tool) {
        self.tools.lock().unwrap().push(tool);
    }

    /// Script the statuses returned by successive `list_tools` calls.
    pub fn script_statuses(&self, statuses: impl IntoIterator<Item = ToolStatus>) {
        self.status_script.lock().unwrap().extend(statuses);
    }

    /// Make the next invocation of `operation` fail with `error`.
    pub fn fail_next(&self, operation: &'static str, error: ApiError) {
        self.failures.lock().unwrap().insert(operation, error);
    }

    /// Number of times `operation` was invoked.
    pub fn call_count(&self, operation: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|op| **op == operation)
            .count()
    }

    fn record(&self, operation: &'static str) -> ApiResult<()> {
        self.calls.lock().unwrap().push(operation);
        if let Some(err) = self.failures.lock().unwrap().remove(operation) {
            return Err(err);
        }
        Ok(())
    }

    fn next_id(&self, prefix: &str) -> String {
        let n = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{prefix}-{n:04}")
    }
}

#[async_trait]
impl ControlPlane for MockControlPlane {
    async fn create_tool(&self, req: CreateToolRequest) -> ApiResult<CreateToolResponse> {
        self.record("CreateSandboxTool")?;
        self.create_requests.lock().unwrap().push(req.clone());
        let tool_id = self.next_id("tool");
        let cc = &req.custom_configuration;
        // New tools are listed most-recent-first, matching provider ordering.
        self.tools.lock().unwrap().insert(
            0,
            Tool {
                tool_id: tool_id.clone(),
                tool_name: req.tool_name.clone(),
                image: cc.image.clone(),
                image_registry_type: cc.image_registry_type.clone(),
                status: ToolStatus::Creating,
                status_message: None,
                network_mode: Some(req.network_configuration.network_mode),
                resources: Some(cc.resources.clone()),
                env: cc.env.clone(),
                ports: cc.ports.clone(),
                probe: None,
                storage_mounts: Vec::new(),
                tags: req.tags.clone(),
                created_at: None,
            },
        );
        Ok(CreateToolResponse {
            tool_id,
            request_id: Some(self.next_id("req")),
        })
    }

    async fn list_tools(&self, req: ListToolsRequest) -> ApiResult<ListToolsResponse> {
        self.record("DescribeSandboxToolList")?;
        let mut tools = self.tools.lock().unwrap();

        // Drive the scripted transition for the described tool.
        if let Some(ids) = &req.tool_ids {
            if ids.len() == 1 {
                if let Some(next) = self.status_script.lock().unwrap().pop_front() {
                    if let Some(tool) = tools.iter_mut().find(|t| t.tool_id == ids[0]) {
                        tool.status = next;
                        if next == ToolStatus::Failed && tool.status_message.is_none() {
                            tool.status_message = Some("image pull failed".into());
                        }
                    }
                }
            }
        }

        let matching: Vec<Tool> = tools
            .iter()
            .filter(|t| match &req.tool_ids {
                Some(ids) => ids.contains(&t.tool_id),
                None => true,
            })
            .cloned()
            .collect();
        let total_count = matching.len() as u32;
        let page: Vec<Tool> = matching
            .into_iter()
            .skip(req.offset as usize)
            .take(req.limit as usize)
            .collect();

        Ok(ListToolsResponse {
            sandbox_tool_set: page,
            total_count,
        })
    }

    async fn delete_tool(&self, tool_id: &str) -> ApiResult<()> {
        self.record("DeleteSandboxTool")?;
        let mut tools = self.tools.lock().unwrap();
        let before = tools.len();
        tools.retain(|t| t.tool_id != tool_id);
        if tools.len() == before {
            return Err(ApiError::new(
                "ResourceNotFound.Tool",
                format!("tool {tool_id} does not exist"),
            ));
        }
        Ok(())
    }

    async fn start_instance(&self, req: StartInstanceRequest) -> ApiResult<StartInstanceResponse> {
        self.record("StartSandboxInstance")?;
        let tools = self.tools.lock().unwrap();
        let tool = tools
            .iter()
            .find(|t| {
                req.tool_id.as_deref() == Some(t.tool_id.as_str())
                    || req.tool_name.as_deref() == Some(t.tool_name.as_str())
            })
            .ok_or_else(|| ApiError::new("ResourceNotFound.Tool", "no such tool"))?;
        if tool.status != ToolStatus::Active {
            return Err(ApiError::new(
                "FailedOperation.ToolNotActive",
                format!("tool {} is {}", tool.tool_id, tool.status),
            ));
        }
        let instance = Instance {
            instance_id: self.next_id("ins"),
            tool_id: tool.tool_id.clone(),
            status: InstanceStatus::Running,
            timeout: Some(req.timeout),
        };
        drop(tools);
        self.instances.lock().unwrap().push(instance.clone());
        Ok(StartInstanceResponse {
            instance,
            request_id: None,
        })
    }

    async fn list_instances(&self, req: ListInstancesRequest) -> ApiResult<ListInstancesResponse> {
        self.record("DescribeSandboxInstanceList")?;
        let status_filter: Option<Vec<String>> = req
            .filters
            .iter()
            .find(|f| f.name == "Status")
            .map(|f| f.values.clone());
        let instances: Vec<Instance> = self
            .instances
            .lock()
            .unwrap()
            .iter()
            .filter(|i| match &req.instance_ids {
                Some(ids) => ids.contains(&i.instance_id),
                None => true,
            })
            .filter(|i| match &req.tool_id {
                Some(id) => &i.tool_id == id,
                None => true,
            })
            .filter(|i| match &status_filter {
                Some(values) => values.contains(&i.status.to_string()),
                None => true,
            })
            .cloned()
            .collect();
        let total_count = instances.len() as u32;
        let page: Vec<Instance> = instances
            .into_iter()
            .skip(req.offset as usize)
            .take(req.limit as usize)
            .collect();
        Ok(ListInstancesResponse {
            sandbox_instance_set: page,
            total_count,
        })
    }

    async fn stop_instance(&self, instance_id: &str) -> ApiResult<()> {
        self.record("StopSandboxInstance")?;
        let mut instances = self.instances.lock().unwrap();
        let before = instances.len();
        instances.retain(|i| i.instance_id != instance_id);
        if instances.len() == before {
            return Err(ApiError::new(
                "ResourceNotFound.Instance",
                format!("instance {instance_id} does not exist"),
            ));
        }
        Ok(())
    }

    async fn acquire_token(&self, instance_id: &str) -> ApiResult<TokenGrant> {
        self.record("AcquireSandboxInstanceToken")?;
        let instances = self.instances.lock().unwrap();
        if !instances.iter().any(|i| i.instance_id == instance_id) {
            return Err(ApiError::new(
                "ResourceNotFound.Instance",
                format!("instance {instance_id} does not exist"),
            ));
        }
        Ok(TokenGrant {
            token: format!("tok-{instance_id}"),
            expires_at: Some("2099-01-01T00:00:00Z".into()),
        })
    }
}
