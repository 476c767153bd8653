//! Data model for the sandbox control plane.
//!
//! These types mirror the provider's wire shapes (PascalCase field names,
//! SCREAMING_SNAKE_CASE status values) so the runtime crate can deserialize
//! list responses directly into them. They are plain values: the managers
//! hold no local cache, every query re-fetches from the control plane.

use std::fmt;

use serde::{Deserialize, Serialize};

// =============================================================================
// Status enums
// =============================================================================

/// Lifecycle status of a sandbox tool (template).
///
/// CREATING → ACTIVE transitions are observed via polling, never pushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ToolStatus {
    Creating,
    Active,
    Failed,
    Deleting,
    Deleted,
}

impl fmt::Display for ToolStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Creating => "CREATING",
            Self::Active => "ACTIVE",
            Self::Failed => "FAILED",
            Self::Deleting => "DELETING",
            Self::Deleted => "DELETED",
        };
        f.write_str(s)
    }
}

/// Lifecycle status of a running sandbox instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstanceStatus {
    Starting,
    Running,
    Stopped,
    Failed,
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Starting => "STARTING",
            Self::Running => "RUNNING",
            Self::Stopped => "STOPPED",
            Self::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

// =============================================================================
// Tool and Instance
// =============================================================================

/// A sandbox template registered with the control plane.
///
/// List responses carry the full template; fields the provider omits fall
/// back to their defaults instead of failing deserialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Tool {
    pub tool_id: String,
    pub tool_name: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub image_registry_type: String,
    pub status: ToolStatus,
    /// Provider diagnostic, populated when status is FAILED.
    #[serde(default)]
    pub status_message: Option<String>,
    #[serde(default)]
    pub network_mode: Option<NetworkMode>,
    #[serde(default)]
    pub resources: Option<ResourceSpec>,
    #[serde(default)]
    pub env: Vec<EnvVar>,
    #[serde(default)]
    pub ports: Vec<PortSpec>,
    #[serde(default)]
    pub probe: Option<ProbeSpec>,
    #[serde(default)]
    pub storage_mounts: Vec<StorageMount>,
    #[serde(default)]
    pub tags: Vec<Tag>,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl Tool {
    /// Whether the tool carries a tag with the given value.
    pub fn has_tag_value(&self, value: &str) -> bool {
        self.tags.iter().any(|t| t.value == value)
    }
}

/// A running sandbox derived from exactly one tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Instance {
    pub instance_id: String,
    pub tool_id: String,
    pub status: InstanceStatus,
    #[serde(default)]
    pub timeout: Option<String>,
}

// =============================================================================
// Token
// =============================================================================

/// Short-lived credential scoped to one instance.
///
/// Tokens are never cached across calls and must never be reused after the
/// issuing instance is stopped. On expiry the caller re-acquires; the access
/// service never refreshes silently.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Token {
    pub value: String,
    pub instance_id: String,
    #[serde(default)]
    pub expires_at: Option<String>,
}

impl Token {
    pub fn new(
        value: impl Into<String>,
        instance_id: impl Into<String>,
        expires_at: Option<String>,
    ) -> Self {
        Self {
            value: value.into(),
            instance_id: instance_id.into(),
            expires_at,
        }
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Keep token material out of logs.
        let preview: String = self.value.chars().take(8).collect();
        f.debug_struct("Token")
            .field("value", &format!("{preview}…"))
            .field("instance_id", &self.instance_id)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

// =============================================================================
// Tool creation building blocks
// =============================================================================

/// Network mode for a sandbox tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NetworkMode {
    Public,
    Vpc,
    Sandbox,
}

impl Default for NetworkMode {
    fn default() -> Self {
        Self::Public
    }
}

/// Environment variable injected into the sandbox. Order is preserved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EnvVar {
    pub name: String,
    pub value: String,
}

impl EnvVar {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Key/value tag attached to a tool. Order is preserved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Tag {
    pub key: String,
    pub value: String,
}

impl Tag {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Exposed port on a sandbox tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PortSpec {
    pub name: String,
    pub port: u16,
    pub protocol: String,
}

impl Default for PortSpec {
    fn default() -> Self {
        Self {
            name: "http".into(),
            port: 80,
            protocol: "TCP".into(),
        }
    }
}

/// CPU/memory limits as provider unit strings (e.g. `"1"`, `"2Gi"`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ResourceSpec {
    #[serde(rename = "CPU")]
    pub cpu: String,
    pub memory: String,
}

/// HTTP health probe determining tool/instance readiness.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ProbeSpec {
    pub path: String,
    pub port: u16,
    pub scheme: String,
    pub ready_timeout_ms: u32,
    pub probe_timeout_ms: u32,
    pub probe_period_ms: u32,
    pub success_threshold: u32,
    pub failure_threshold: u32,
}

impl Default for ProbeSpec {
    fn default() -> Self {
        Self {
            path: "/".into(),
            port: 80,
            scheme: "HTTP".into(),
            ready_timeout_ms: 30_000,
            probe_timeout_ms: 1_000,
            probe_period_ms: 100,
            success_threshold: 1,
            failure_threshold: 100,
        }
    }
}

/// An auxiliary image's subpath exposed as a volume inside the sandbox.
///
/// Mounts supplied at tool-creation time fully replace the config-derived
/// default mount; there is no merging.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StorageMount {
    pub name: String,
    pub mount_path: String,
    pub read_only: bool,
    /// Image reference backing the mount.
    pub image: String,
    pub image_registry_type: String,
    /// Subpath within the backing image exposed at `mount_path`.
    pub subpath: String,
}

/// Per-start overrides applied on top of the tool's configuration.
///
/// Merge is field-by-field with full-replacement semantics: a `Some` list
/// replaces the tool's list wholesale, it is never deep-merged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InstanceOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub env: Option<Vec<EnvVar>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceSpec>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_status_wire_names() {
        let s: ToolStatus = serde_json::from_str("\"CREATING\"").unwrap();
        assert_eq!(s, ToolStatus::Creating);
        assert_eq!(serde_json::to_string(&ToolStatus::Active).unwrap(), "\"ACTIVE\"");
        assert_eq!(ToolStatus::Failed.to_string(), "FAILED");
    }

    #[test]
    fn tool_deserializes_pascal_case() {
        let json = r#"{
            "ToolId": "tool-abc",
            "ToolName": "my-sandbox",
            "Image": "python:3.11",
            "Status": "ACTIVE",
            "Tags": [{"Key": "image", "Value": "python:3.11"}]
        }"#;
        let tool: Tool = serde_json::from_str(json).unwrap();
        assert_eq!(tool.tool_id, "tool-abc");
        assert_eq!(tool.status, ToolStatus::Active);
        assert!(tool.has_tag_value("python:3.11"));
        assert!(!tool.has_tag_value("other"));
        // Template fields the provider omitted fall back to their defaults.
        assert!(tool.network_mode.is_none());
        assert!(tool.env.is_empty());
        assert!(tool.storage_mounts.is_empty());
    }

    #[test]
    fn tool_carries_the_full_template_payload() {
        let json = r#"{
            "ToolId": "tool-abc",
            "ToolName": "my-sandbox",
            "Image": "python:3.11",
            "ImageRegistryType": "enterprise",
            "Status": "ACTIVE",
            "NetworkMode": "VPC",
            "Resources": {"CPU": "2", "Memory": "4Gi"},
            "Env": [{"Name": "FOO", "Value": "bar"}],
            "Ports": [{"Name": "http", "Port": 8000, "Protocol": "TCP"}],
            "Probe": {
                "Path": "/healthz",
                "Port": 8000,
                "Scheme": "HTTP",
                "ReadyTimeoutMs": 30000,
                "ProbeTimeoutMs": 1000,
                "ProbePeriodMs": 100,
                "SuccessThreshold": 1,
                "FailureThreshold": 100
            },
            "StorageMounts": [{
                "Name": "envd-storage",
                "MountPath": "/nix",
                "ReadOnly": false,
                "Image": "registry.example.com/team/envd:v1",
                "ImageRegistryType": "enterprise",
                "Subpath": "/nix"
            }]
        }"#;
        let tool: Tool = serde_json::from_str(json).unwrap();
        assert_eq!(tool.network_mode, Some(NetworkMode::Vpc));
        assert_eq!(tool.resources.as_ref().unwrap().memory, "4Gi");
        assert_eq!(tool.env[0].name, "FOO");
        assert_eq!(tool.ports[0].port, 8000);
        assert_eq!(tool.probe.as_ref().unwrap().path, "/healthz");
        assert_eq!(tool.storage_mounts[0].name, "envd-storage");
    }

    #[test]
    fn token_debug_redacts_value() {
        let token = Token {
            value: "super-secret-token-material".into(),
            instance_id: "ins-1".into(),
            expires_at: None,
        };
        let rendered = format!("{token:?}");
        assert!(!rendered.contains("super-secret-token-material"));
        assert!(rendered.contains("ins-1"));
    }
}
