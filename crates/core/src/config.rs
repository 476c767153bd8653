//! Session configuration for the sandbox control and execution planes.
//!
//! An [`AgsConfig`] is resolved once per client session through
//! [`AgsConfigBuilder`] and never mutated afterwards. Validation happens at
//! build time; the environment is consulted only as an optional input source
//! for credentials, the role reference, and the execution-plane API key —
//! never for region or domain.

use secrecy::Secret;

use crate::error::{Error, Result};

/// Provider suffix appended to the region when the domain is derived.
pub const DOMAIN_SUFFIX: &str = "agentsandbox.com";

const ENV_SECRET_ID: &str = "AGSBOX_SECRET_ID";
const ENV_SECRET_KEY: &str = "AGSBOX_SECRET_KEY";
const ENV_ROLE_ARN: &str = "AGSBOX_ROLE_ARN";
const ENV_EXEC_API_KEY: &str = "EXEC_API_KEY";

/// Immutable connection configuration for one client session.
#[derive(Debug, Clone)]
pub struct AgsConfig {
    secret_id: String,
    secret_key: Secret<String>,
    http_endpoint: String,
    skip_tls_verify: bool,
    region: String,
    domain: String,
    tool_id: String,
    image: String,
    image_registry_type: String,
    timeout: String,
    port: u16,
    startup_timeout_secs: f64,
    runtime_timeout_secs: f64,
    cpu: String,
    memory: String,
    role_arn: String,
    exec_api_key: Option<Secret<String>>,
    mount_name: String,
    mount_image: String,
    mount_image_registry_type: String,
    mount_path: String,
    mount_subpath: String,
    mount_read_only: bool,
}

impl AgsConfig {
    /// Start building a configuration with defaults for every field except
    /// the credentials.
    pub fn builder() -> AgsConfigBuilder {
        AgsConfigBuilder::default()
    }

    pub fn secret_id(&self) -> &str {
        &self.secret_id
    }

    pub fn secret_key(&self) -> &Secret<String> {
        &self.secret_key
    }

    pub fn http_endpoint(&self) -> &str {
        &self.http_endpoint
    }

    pub fn skip_tls_verify(&self) -> bool {
        self.skip_tls_verify
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    /// Domain for sandbox access URLs and execution sessions. Always agrees
    /// with the region; see [`AgsConfigBuilder::build`].
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Pre-registered tool id to reuse, empty when tools are created fresh.
    pub fn tool_id(&self) -> &str {
        &self.tool_id
    }

    pub fn image(&self) -> &str {
        &self.image
    }

    pub fn image_registry_type(&self) -> &str {
        &self.image_registry_type
    }

    /// Default instance timeout as a provider duration string (e.g. `"1h"`).
    pub fn timeout(&self) -> &str {
        &self.timeout
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn startup_timeout_secs(&self) -> f64 {
        self.startup_timeout_secs
    }

    pub fn runtime_timeout_secs(&self) -> f64 {
        self.runtime_timeout_secs
    }

    pub fn cpu(&self) -> &str {
        &self.cpu
    }

    pub fn memory(&self) -> &str {
        &self.memory
    }

    pub fn role_arn(&self) -> &str {
        &self.role_arn
    }

    /// Execution-plane API key, when configured or found in the environment.
    pub fn exec_api_key(&self) -> Option<&Secret<String>> {
        self.exec_api_key.as_ref()
    }

    /// Default storage mount derived from the mount_* fields, or `None`
    /// when no mount is configured.
    pub fn default_mount(&self) -> Option<crate::types::StorageMount> {
        if self.mount_name.is_empty() || self.mount_image.is_empty() {
            return None;
        }
        Some(crate::types::StorageMount {
            name: self.mount_name.clone(),
            mount_path: self.mount_path.clone(),
            read_only: self.mount_read_only,
            image: self.mount_image.clone(),
            image_registry_type: self.mount_image_registry_type.clone(),
            subpath: self.mount_subpath.clone(),
        })
    }
}

/// Builder for [`AgsConfig`]. All setters take ownership and return `self`.
#[derive(Debug, Clone)]
pub struct AgsConfigBuilder {
    secret_id: String,
    secret_key: String,
    http_endpoint: String,
    skip_tls_verify: bool,
    region: String,
    domain: Option<String>,
    tool_id: String,
    image: String,
    image_registry_type: String,
    timeout: String,
    port: u16,
    startup_timeout_secs: f64,
    runtime_timeout_secs: f64,
    cpu: String,
    memory: String,
    role_arn: String,
    exec_api_key: Option<String>,
    mount_name: String,
    mount_image: String,
    mount_image_registry_type: String,
    mount_path: String,
    mount_subpath: String,
    mount_read_only: bool,
}

impl Default for AgsConfigBuilder {
    fn default() -> Self {
        Self {
            secret_id: String::new(),
            secret_key: String::new(),
            http_endpoint: "api.agentsandbox.com".into(),
            skip_tls_verify: false,
            region: "ap-guangzhou".into(),
            domain: None,
            tool_id: String::new(),
            image: "python:3.11".into(),
            image_registry_type: "enterprise".into(),
            timeout: "1h".into(),
            port: 8000,
            startup_timeout_secs: 180.0,
            runtime_timeout_secs: 60.0,
            cpu: "1".into(),
            memory: "1Gi".into(),
            role_arn: String::new(),
            exec_api_key: None,
            mount_name: String::new(),
            mount_image: String::new(),
            mount_image_registry_type: "enterprise".into(),
            mount_path: "/nix".into(),
            mount_subpath: "/nix".into(),
            mount_read_only: false,
        }
    }
}

impl AgsConfigBuilder {
    pub fn secret_id(mut self, v: impl Into<String>) -> Self {
        self.secret_id = v.into();
        self
    }

    pub fn secret_key(mut self, v: impl Into<String>) -> Self {
        self.secret_key = v.into();
        self
    }

    pub fn http_endpoint(mut self, v: impl Into<String>) -> Self {
        self.http_endpoint = v.into();
        self
    }

    /// Skip TLS certificate verification (internal/pre-release endpoints).
    pub fn skip_tls_verify(mut self, v: bool) -> Self {
        self.skip_tls_verify = v;
        self
    }

    pub fn region(mut self, v: impl Into<String>) -> Self {
        self.region = v.into();
        self
    }

    pub fn domain(mut self, v: impl Into<String>) -> Self {
        self.domain = Some(v.into());
        self
    }

    pub fn tool_id(mut self, v: impl Into<String>) -> Self {
        self.tool_id = v.into();
        self
    }

    pub fn image(mut self, v: impl Into<String>) -> Self {
        self.image = v.into();
        self
    }

    pub fn image_registry_type(mut self, v: impl Into<String>) -> Self {
        self.image_registry_type = v.into();
        self
    }

    pub fn timeout(mut self, v: impl Into<String>) -> Self {
        self.timeout = v.into();
        self
    }

    pub fn port(mut self, v: u16) -> Self {
        self.port = v;
        self
    }

    pub fn startup_timeout_secs(mut self, v: f64) -> Self {
        self.startup_timeout_secs = v;
        self
    }

    pub fn runtime_timeout_secs(mut self, v: f64) -> Self {
        self.runtime_timeout_secs = v;
        self
    }

    pub fn cpu(mut self, v: impl Into<String>) -> Self {
        self.cpu = v.into();
        self
    }

    pub fn memory(mut self, v: impl Into<String>) -> Self {
        self.memory = v.into();
        self
    }

    pub fn role_arn(mut self, v: impl Into<String>) -> Self {
        self.role_arn = v.into();
        self
    }

    pub fn exec_api_key(mut self, v: impl Into<String>) -> Self {
        self.exec_api_key = Some(v.into());
        self
    }

    pub fn mount_name(mut self, v: impl Into<String>) -> Self {
        self.mount_name = v.into();
        self
    }

    pub fn mount_image(mut self, v: impl Into<String>) -> Self {
        self.mount_image = v.into();
        self
    }

    pub fn mount_image_registry_type(mut self, v: impl Into<String>) -> Self {
        self.mount_image_registry_type = v.into();
        self
    }

    pub fn mount_path(mut self, v: impl Into<String>) -> Self {
        self.mount_path = v.into();
        self
    }

    pub fn mount_subpath(mut self, v: impl Into<String>) -> Self {
        self.mount_subpath = v.into();
        self
    }

    pub fn mount_read_only(mut self, v: bool) -> Self {
        self.mount_read_only = v;
        self
    }

    /// Validate and freeze the configuration.
    ///
    /// Fails with [`Error::Configuration`] when the region is empty, when an
    /// explicit domain disagrees with the region, or when the cpu/memory
    /// strings fail the unit-pattern check. An unset domain is derived as
    /// `{region}.{DOMAIN_SUFFIX}`; a mismatch is never silently overridden.
    pub fn build(self) -> Result<AgsConfig> {
        if self.region.is_empty() {
            return Err(Error::configuration("region must not be empty"));
        }

        let expected_domain = format!("{}.{DOMAIN_SUFFIX}", self.region);
        let domain = match self.domain {
            None => expected_domain,
            Some(d) if d == expected_domain => d,
            Some(d) => {
                return Err(Error::configuration(format!(
                    "domain '{d}' does not match region '{}' (expected '{expected_domain}')",
                    self.region
                )));
            }
        };

        if !valid_cpu(&self.cpu) {
            return Err(Error::configuration(format!(
                "invalid cpu limit '{}' (expected cores like '1', '0.5' or millicores like '500m')",
                self.cpu
            )));
        }
        if !valid_memory(&self.memory) {
            return Err(Error::configuration(format!(
                "invalid memory limit '{}' (expected a value like '512Mi' or '2Gi')",
                self.memory
            )));
        }

        let secret_id = fallback_env(self.secret_id, ENV_SECRET_ID);
        let secret_key = fallback_env(self.secret_key, ENV_SECRET_KEY);
        let role_arn = fallback_env(self.role_arn, ENV_ROLE_ARN);
        let exec_api_key = self
            .exec_api_key
            .or_else(|| std::env::var(ENV_EXEC_API_KEY).ok())
            .map(Secret::new);

        tracing::debug!(
            region = %self.region,
            domain = %domain,
            endpoint = %self.http_endpoint,
            "Resolved sandbox session configuration"
        );

        Ok(AgsConfig {
            secret_id,
            secret_key: Secret::new(secret_key),
            http_endpoint: self.http_endpoint,
            skip_tls_verify: self.skip_tls_verify,
            region: self.region,
            domain,
            tool_id: self.tool_id,
            image: self.image,
            image_registry_type: self.image_registry_type,
            timeout: self.timeout,
            port: self.port,
            startup_timeout_secs: self.startup_timeout_secs,
            runtime_timeout_secs: self.runtime_timeout_secs,
            cpu: self.cpu,
            memory: self.memory,
            role_arn,
            exec_api_key,
            mount_name: self.mount_name,
            mount_image: self.mount_image,
            mount_image_registry_type: self.mount_image_registry_type,
            mount_path: self.mount_path,
            mount_subpath: self.mount_subpath,
            mount_read_only: self.mount_read_only,
        })
    }
}

fn fallback_env(value: String, var: &str) -> String {
    if value.is_empty() {
        std::env::var(var).unwrap_or_default()
    } else {
        value
    }
}

fn valid_cpu(s: &str) -> bool {
    if let Some(millis) = s.strip_suffix('m') {
        return !millis.is_empty() && millis.bytes().all(|b| b.is_ascii_digit());
    }
    !s.is_empty()
        && !s.starts_with('.')
        && !s.ends_with('.')
        && s.bytes().filter(|b| *b == b'.').count() <= 1
        && s.bytes().all(|b| b.is_ascii_digit() || b == b'.')
}

fn valid_memory(s: &str) -> bool {
    // "Mi" must be tried before "M" so "512Mi" does not parse as "512M" + "i".
    ["Mi", "Gi", "M", "G"].iter().any(|unit| {
        s.strip_suffix(unit)
            .map(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
            .unwrap_or(false)
    })
}
