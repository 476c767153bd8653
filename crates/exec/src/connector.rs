//! Session connectors bind a resolved target to a live execution session.

use std::fmt;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::Secret;

use agsbox_core::Result;

use crate::session::{CapabilitySet, ExecSession, MockSession};

/// Everything needed to open one session.
///
/// The execution domain travels inside the target instead of process-global
/// state, so each open call carries the region it was resolved against.
#[derive(Clone)]
pub struct SessionTarget {
    /// Tool name (or matching tag value) identifying the sandbox template.
    pub template: String,
    pub timeout: Duration,
    pub api_key: Secret<String>,
    pub domain: String,
}

impl fmt::Debug for SessionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionTarget")
            .field("template", &self.template)
            .field("timeout", &self.timeout)
            .field("api_key", &"<redacted>")
            .field("domain", &self.domain)
            .finish()
    }
}

/// Opens execution sessions against a target.
///
/// Connectors wrapping an SDK that only accepts a process-global domain
/// binding must apply `target.domain` immediately before every open, not
/// just the first, since an earlier session may have bound a different
/// region. That binding is last-writer-wins: opening sessions against
/// different regions concurrently from one process is unsupported.
#[async_trait]
pub trait SessionConnector: Send + Sync {
    async fn open(&self, target: SessionTarget) -> Result<Box<dyn ExecSession>>;
}

/// Connector returning clones of one shared [`MockSession`].
///
/// The shared session lets tests assert call counts after the adapter has
/// consumed its own handle; `opened_targets` records every open for
/// domain-threading assertions.
pub struct MockConnector {
    pub session: MockSession,
    pub opened_targets: Mutex<Vec<SessionTarget>>,
}

impl MockConnector {
    pub fn new(capabilities: CapabilitySet) -> Self {
        Self {
            session: MockSession::new(capabilities),
            opened_targets: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl SessionConnector for MockConnector {
    async fn open(&self, target: SessionTarget) -> Result<Box<dyn ExecSession>> {
        self.opened_targets.lock().unwrap().push(target);
        Ok(Box::new(self.session.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_debug_redacts_api_key() {
        let target = SessionTarget {
            template: "swebench-lite".into(),
            timeout: Duration::from_secs(300),
            api_key: Secret::new("very-secret-key".into()),
            domain: "ap-guangzhou.agentsandbox.com".into(),
        };
        let rendered = format!("{target:?}");
        assert!(rendered.contains("<redacted>"));
        assert!(!rendered.contains("very-secret-key"));
    }

    #[tokio::test]
    async fn mock_connector_records_targets() {
        let connector = MockConnector::new(CapabilitySet::full());
        let target = SessionTarget {
            template: "t".into(),
            timeout: Duration::from_secs(60),
            api_key: Secret::new("k".into()),
            domain: "eu-frankfurt.agentsandbox.com".into(),
        };
        connector.open(target).await.unwrap();

        let opened = connector.opened_targets.lock().unwrap();
        assert_eq!(opened.len(), 1);
        assert_eq!(opened[0].domain, "eu-frankfurt.agentsandbox.com");
    }
}
