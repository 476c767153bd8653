//! Instance access: short-lived tokens and per-instance URLs.

use std::sync::Arc;

use agsbox_core::{AgsConfig, Error, Result, Token};
use url::Url;

use crate::client::ControlPlane;

/// Issues access tokens and derives instance endpoint URLs.
pub struct AccessService {
    plane: Arc<dyn ControlPlane>,
    config: AgsConfig,
}

impl AccessService {
    pub fn new(plane: Arc<dyn ControlPlane>, config: AgsConfig) -> Self {
        Self { plane, config }
    }

    /// Acquire a short-lived access token for a running instance.
    ///
    /// Tokens are never cached here; callers decide their own reuse policy
    /// and re-acquire on [`Error::TokenExpired`].
    pub async fn acquire_token(&self, instance_id: &str) -> Result<Token> {
        let grant = self
            .plane
            .acquire_token(instance_id)
            .await
            .map_err(|e| {
                if e.is_token_expired() {
                    Error::TokenExpired {
                        instance_id: instance_id.to_string(),
                    }
                } else {
                    // Auth-plane rejections usually mean the credentials were
                    // signed for a different region/domain pair.
                    let message = if e.is_auth_failure() {
                        format!("{e} (verify that region and domain agree)")
                    } else {
                        e.to_string()
                    };
                    Error::TokenAcquisition {
                        instance_id: instance_id.to_string(),
                        message,
                    }
                }
            })?;
        tracing::debug!(instance_id, "Acquired instance access token");
        Ok(Token::new(grant.token, instance_id, grant.expires_at))
    }

    /// Derive the public URL of a service exposed by an instance.
    ///
    /// Pure derivation, no remote call: `https://{port}-{instance_id}.{domain}`
    /// with the configured service port as the default.
    pub fn instance_url(&self, instance_id: &str, port: Option<u16>) -> Result<Url> {
        let port = port.unwrap_or_else(|| self.config.port());
        let raw = format!(
            "https://{port}-{instance_id}.{domain}",
            domain = self.config.domain()
        );
        Url::parse(&raw).map_err(|e| {
            Error::configuration(format!("derived instance URL '{raw}' is invalid: {e}"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiError;
    use crate::client::MockControlPlane;
    use agsbox_core::{Instance, InstanceStatus};

    fn service(plane: Arc<MockControlPlane>) -> AccessService {
        let config = AgsConfig::builder()
            .secret_id("id")
            .secret_key("key")
            .build()
            .unwrap();
        AccessService::new(plane, config)
    }

    fn running_instance(id: &str) -> Instance {
        Instance {
            instance_id: id.into(),
            tool_id: "tool-1".into(),
            status: InstanceStatus::Running,
            timeout: None,
        }
    }

    #[tokio::test]
    async fn acquires_token_for_running_instance() {
        let plane = Arc::new(MockControlPlane::new());
        plane
            .instances
            .lock()
            .unwrap()
            .push(running_instance("ins-7"));
        let svc = service(plane);

        let token = svc.acquire_token("ins-7").await.unwrap();
        assert_eq!(token.instance_id, "ins-7");
        assert!(token.expires_at.is_some());
    }

    #[tokio::test]
    async fn missing_instance_maps_to_acquisition_error() {
        let plane = Arc::new(MockControlPlane::new());
        let svc = service(plane);

        let err = svc.acquire_token("ins-missing").await.unwrap_err();
        match err {
            Error::TokenAcquisition { ref instance_id, .. } => {
                assert_eq!(instance_id, "ins-missing");
            }
            other => panic!("unexpected error: {other}"),
        }
        // Not an auth-plane failure: no region/domain hint.
        assert!(!err.to_string().contains("region and domain"));
    }

    #[tokio::test]
    async fn auth_failure_carries_the_region_domain_hint() {
        let plane = Arc::new(MockControlPlane::new());
        plane
            .instances
            .lock()
            .unwrap()
            .push(running_instance("ins-7"));
        plane.fail_next(
            "AcquireSandboxInstanceToken",
            ApiError::new("AuthFailure.SignatureFailure", "signature mismatch"),
        );
        let svc = service(plane);

        let err = svc.acquire_token("ins-7").await.unwrap_err();
        assert!(matches!(err, Error::TokenAcquisition { .. }));
        assert!(err.to_string().contains("verify that region and domain agree"));
    }

    #[tokio::test]
    async fn expired_token_code_maps_to_token_expired() {
        let plane = Arc::new(MockControlPlane::new());
        plane
            .instances
            .lock()
            .unwrap()
            .push(running_instance("ins-7"));
        plane.fail_next(
            "AcquireSandboxInstanceToken",
            ApiError::new("AuthFailure.TokenExpired", "token lifetime exceeded"),
        );
        let svc = service(plane);

        let err = svc.acquire_token("ins-7").await.unwrap_err();
        assert!(matches!(err, Error::TokenExpired { .. }));
        assert!(err.to_string().contains("acquire a new one"));
    }

    #[test]
    fn url_uses_configured_default_port() {
        let plane = Arc::new(MockControlPlane::new());
        let svc = service(plane);

        let url = svc.instance_url("ins-42", None).unwrap();
        assert_eq!(
            url.as_str(),
            "https://8000-ins-42.ap-guangzhou.agentsandbox.com/"
        );
    }

    #[test]
    fn url_honors_explicit_port() {
        let plane = Arc::new(MockControlPlane::new());
        let svc = service(plane);

        let url = svc.instance_url("ins-42", Some(9090)).unwrap();
        assert_eq!(url.host_str(), Some("9090-ins-42.ap-guangzhou.agentsandbox.com"));
        assert_eq!(url.scheme(), "https");
    }
}
