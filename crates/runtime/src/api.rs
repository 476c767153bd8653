//! Wire types for the control-plane API.
//!
//! The control plane speaks JSON with PascalCase member names and wraps every
//! reply in a `{"Response": {...}}` envelope that either carries the payload
//! or an `Error {Code, Message}` object. Requests are built here from the
//! flat manager-level specs; the managers never touch raw JSON.

use std::fmt;

use serde::{Deserialize, Serialize};

use agsbox_core::{
    EnvVar, Instance, InstanceOverrides, NetworkMode, PortSpec, ProbeSpec, ResourceSpec,
    StorageMount, Tag, Tool,
};

// =============================================================================
// Errors
// =============================================================================

/// Structured provider error: a stable code plus a human-readable message.
///
/// Transport-level failures are folded in under the `TransportError` code so
/// the managers have a single failure channel to wrap with operation context.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new("TransportError", message)
    }

    /// Whether the error means the target resource is already gone. Used by
    /// the idempotent delete/stop paths.
    pub fn is_not_found(&self) -> bool {
        self.code.starts_with("ResourceNotFound")
    }

    /// Whether the error is an expired access token.
    pub fn is_token_expired(&self) -> bool {
        self.code == "AuthFailure.TokenExpired"
    }

    /// Whether the error is an authentication-plane failure (commonly a
    /// region/domain or credential misalignment).
    pub fn is_auth_failure(&self) -> bool {
        self.code.starts_with("AuthFailure")
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

/// Result alias for raw control-plane calls.
pub type ApiResult<T> = std::result::Result<T, ApiError>;

// =============================================================================
// Requests
// =============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateToolRequest {
    pub tool_name: String,
    pub tool_type: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    pub default_timeout: String,
    pub client_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role_arn: Option<String>,
    pub network_configuration: NetworkConfiguration,
    pub custom_configuration: CustomConfiguration,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub storage_mounts: Vec<StorageMountSpec>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<Tag>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct NetworkConfiguration {
    pub network_mode: NetworkMode,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CustomConfiguration {
    pub image: String,
    pub image_registry_type: String,
    pub command: Vec<String>,
    pub args: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<PortSpec>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVar>,
    pub resources: ResourceSpec,
    pub probe: ProbeConfiguration,
}

/// Probe in provider shape: the HTTP action is nested under `HttpGet`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ProbeConfiguration {
    pub http_get: HttpGetAction,
    pub ready_timeout_ms: u32,
    pub probe_timeout_ms: u32,
    pub probe_period_ms: u32,
    pub success_threshold: u32,
    pub failure_threshold: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct HttpGetAction {
    pub path: String,
    pub port: u16,
    pub scheme: String,
}

impl From<&ProbeSpec> for ProbeConfiguration {
    fn from(p: &ProbeSpec) -> Self {
        Self {
            http_get: HttpGetAction {
                path: p.path.clone(),
                port: p.port,
                scheme: p.scheme.clone(),
            },
            ready_timeout_ms: p.ready_timeout_ms,
            probe_timeout_ms: p.probe_timeout_ms,
            probe_period_ms: p.probe_period_ms,
            success_threshold: p.success_threshold,
            failure_threshold: p.failure_threshold,
        }
    }
}

/// Storage mount in provider shape: the backing image is nested under
/// `StorageSource.Image`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct StorageMountSpec {
    pub name: String,
    pub mount_path: String,
    pub read_only: bool,
    pub storage_source: StorageSource,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct StorageSource {
    pub image: ImageStorageSource,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ImageStorageSource {
    pub reference: String,
    pub image_registry_type: String,
    pub sub_path: String,
}

impl From<&StorageMount> for StorageMountSpec {
    fn from(m: &StorageMount) -> Self {
        Self {
            name: m.name.clone(),
            mount_path: m.mount_path.clone(),
            read_only: m.read_only,
            storage_source: StorageSource {
                image: ImageStorageSource {
                    reference: m.image.clone(),
                    image_registry_type: m.image_registry_type.clone(),
                    sub_path: m.subpath.clone(),
                },
            },
        }
    }
}

/// Name/values filter, AND-combined by the provider.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Filter {
    pub name: String,
    pub values: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ListToolsRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_ids: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<Filter>,
    pub limit: u32,
    pub offset: u32,
}

impl ListToolsRequest {
    pub fn by_ids(ids: Vec<String>) -> Self {
        Self {
            tool_ids: Some(ids),
            filters: Vec::new(),
            limit: 1,
            offset: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeleteToolRequest {
    pub tool_id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct StartInstanceRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    pub timeout: String,
    pub client_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_configuration: Option<InstanceOverrides>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ListInstancesRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance_ids: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_id: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<Filter>,
    pub limit: u32,
    pub offset: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct StopInstanceRequest {
    pub instance_id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct AcquireTokenRequest {
    pub instance_id: String,
}

// =============================================================================
// Responses
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateToolResponse {
    pub tool_id: String,
    #[serde(default)]
    pub request_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ListToolsResponse {
    #[serde(default)]
    pub sandbox_tool_set: Vec<Tool>,
    #[serde(default)]
    pub total_count: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StartInstanceResponse {
    pub instance: Instance,
    #[serde(default)]
    pub request_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ListInstancesResponse {
    #[serde(default)]
    pub sandbox_instance_set: Vec<Instance>,
    #[serde(default)]
    pub total_count: u32,
}

/// Token material as issued by the control plane; the access service pairs it
/// with the instance id it was acquired for.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TokenGrant {
    pub token: String,
    #[serde(default)]
    pub expires_at: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_tool_request_serializes_provider_shape() {
        let req = CreateToolRequest {
            tool_name: "my-sandbox".into(),
            tool_type: "custom".into(),
            description: String::new(),
            default_timeout: "5m".into(),
            client_token: "ct-1".into(),
            role_arn: None,
            network_configuration: NetworkConfiguration {
                network_mode: NetworkMode::Public,
            },
            custom_configuration: CustomConfiguration {
                image: "python:3.11".into(),
                image_registry_type: "enterprise".into(),
                command: vec!["/bin/sh".into(), "-c".into()],
                args: vec!["-l".into()],
                ports: Vec::new(),
                env: vec![EnvVar::new("FOO", "bar")],
                resources: ResourceSpec {
                    cpu: "1".into(),
                    memory: "2Gi".into(),
                },
                probe: (&ProbeSpec::default()).into(),
            },
            storage_mounts: Vec::new(),
            tags: Vec::new(),
        };

        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["ToolName"], "my-sandbox");
        assert_eq!(value["NetworkConfiguration"]["NetworkMode"], "PUBLIC");
        assert_eq!(value["CustomConfiguration"]["Resources"]["CPU"], "1");
        assert_eq!(value["CustomConfiguration"]["Probe"]["HttpGet"]["Path"], "/");
        assert_eq!(value["CustomConfiguration"]["Env"][0]["Name"], "FOO");
        // Empty description and mounts are omitted entirely.
        assert!(value.get("Description").is_none());
        assert!(value.get("StorageMounts").is_none());
    }

    #[test]
    fn storage_mount_nests_the_backing_image() {
        let mount = StorageMount {
            name: "envd-storage".into(),
            mount_path: "/mnt/envd".into(),
            read_only: true,
            image: "registry.example.com/team/envd:v1".into(),
            image_registry_type: "personal".into(),
            subpath: "/usr/bin/envd".into(),
        };
        let value = serde_json::to_value(StorageMountSpec::from(&mount)).unwrap();
        assert_eq!(value["MountPath"], "/mnt/envd");
        assert_eq!(
            value["StorageSource"]["Image"]["Reference"],
            "registry.example.com/team/envd:v1"
        );
        assert_eq!(value["StorageSource"]["Image"]["SubPath"], "/usr/bin/envd");
    }

    #[test]
    fn api_error_classification() {
        assert!(ApiError::new("ResourceNotFound.Tool", "gone").is_not_found());
        assert!(ApiError::new("AuthFailure.TokenExpired", "old").is_token_expired());
        assert!(ApiError::new("AuthFailure.SignatureFailure", "bad").is_auth_failure());
        assert!(!ApiError::transport("connection reset").is_not_found());
    }
}
