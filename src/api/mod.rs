// MIT License - Copyright (c) 2026 Peter Wright
// Remote alarm API: one contract, two wire generations

pub mod current;
pub mod legacy;

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Response;
use secrecy::SecretString;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tracing::warn;

use crate::config::{ApiGeneration, SessionConfig};
use crate::error::{BridgeError, Result};
use crate::state::{RemoteAlarmState, RemoteCommand};

pub use current::CurrentApi;
pub use legacy::LegacyApi;

/// One controlled location and its last observed alarm state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Site {
    pub id: String,
    pub state: RemoteAlarmState,
}

/// Account credentials as configured.
#[derive(Debug, Clone)]
pub struct Account {
    pub username: String,
    pub password: SecretString,
}

/// Operations the bridge needs from the remote alarm service.
#[async_trait]
pub trait RemoteAlarmApi: Send + Sync {
    /// Authenticate and resolve the user identity.
    async fn login(&self, username: &str, password: &SecretString) -> Result<()>;

    /// Fetch the account's site and its current remote state.
    async fn fetch_status(&self) -> Result<Site>;

    /// Ask the remote to move `site` into the state `command` names.
    async fn set_state(&self, site: &Site, command: RemoteCommand) -> Result<()>;
}

/// Build the API client for the configured generation.
pub fn build_api(config: &SessionConfig) -> Result<Arc<dyn RemoteAlarmApi>> {
    Ok(match config.generation {
        ApiGeneration::Legacy => Arc::new(LegacyApi::new(config)?),
        ApiGeneration::Current => Arc::new(CurrentApi::new(config)?),
    })
}

/// Pick the site to control.
///
/// With `pinned` set, only that id is accepted. Otherwise the first site in
/// response order wins and the rest are ignored.
pub(crate) fn select_site(sites: Vec<Site>, pinned: Option<&str>) -> Result<Site> {
    match pinned {
        Some(id) => sites.into_iter().find(|s| s.id == id),
        None => sites.into_iter().next(),
    }
    .ok_or(BridgeError::NoSite)
}

/// Site selection that remembers what it already warned about, so an account
/// with several sites is announced once per selected site, not once per poll.
pub(crate) struct SiteSelector {
    pinned: Option<String>,
    warned_for: Mutex<Option<String>>,
}

impl SiteSelector {
    pub(crate) fn new(pinned: Option<String>) -> Self {
        Self {
            pinned,
            warned_for: Mutex::new(None),
        }
    }

    pub(crate) async fn select(&self, sites: Vec<Site>) -> Result<Site> {
        let count = sites.len();
        let site = select_site(sites, self.pinned.as_deref())?;
        if self.pinned.is_none() && count > 1 {
            let mut warned_for = self.warned_for.lock().await;
            if warned_for.as_deref() != Some(site.id.as_str()) {
                warn!(
                    "Account has {count} sites, controlling the first one ({}); set site_id to choose",
                    site.id
                );
                *warned_for = Some(site.id.clone());
            }
        }
        Ok(site)
    }
}

/// Render a remote id that may arrive as a JSON string or number.
pub(crate) fn id_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Fail with `Status` unless the response is a 2xx.
pub(crate) fn expect_success(response: Response, operation: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(BridgeError::Status {
            operation: operation.to_string(),
            status: status.as_u16(),
        })
    }
}

/// Read and deserialize a JSON body, keeping a preview of the body on failure.
pub(crate) async fn parse_body<T: DeserializeOwned>(response: Response) -> Result<T> {
    let body = response.text().await?;
    serde_json::from_str(&body).map_err(|e| {
        let preview: String = body.chars().take(200).collect();
        BridgeError::parse(format!("{e} (body preview: {preview:?})"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn site(id: &str) -> Site {
        Site {
            id: id.to_string(),
            state: RemoteAlarmState::Off,
        }
    }

    #[test]
    fn test_select_first_site() {
        let selected = select_site(vec![site("9"), site("3")], None).unwrap();
        assert_eq!(selected.id, "9");
    }

    #[test]
    fn test_select_no_site() {
        assert!(matches!(select_site(vec![], None), Err(BridgeError::NoSite)));
    }

    #[test]
    fn test_select_pinned_site() {
        let selected = select_site(vec![site("9"), site("3")], Some("3")).unwrap();
        assert_eq!(selected.id, "3");
        assert!(matches!(
            select_site(vec![site("9")], Some("3")),
            Err(BridgeError::NoSite)
        ));
    }

    #[tokio::test]
    async fn test_multi_site_warning_tracks_selected_site() {
        let selector = SiteSelector::new(None);

        selector.select(vec![site("9")]).await.unwrap();
        assert_eq!(*selector.warned_for.lock().await, None);

        for _ in 0..3 {
            let selected = selector.select(vec![site("9"), site("3")]).await.unwrap();
            assert_eq!(selected.id, "9");
        }
        assert_eq!(selector.warned_for.lock().await.as_deref(), Some("9"));

        selector.select(vec![site("3"), site("9")]).await.unwrap();
        assert_eq!(selector.warned_for.lock().await.as_deref(), Some("3"));
    }

    #[tokio::test]
    async fn test_pinned_selector_never_warns() {
        let selector = SiteSelector::new(Some("3".to_string()));
        let selected = selector.select(vec![site("9"), site("3")]).await.unwrap();
        assert_eq!(selected.id, "3");
        assert_eq!(*selector.warned_for.lock().await, None);
    }

    #[test]
    fn test_id_string() {
        assert_eq!(id_string(&json!("abc")), Some("abc".to_string()));
        assert_eq!(id_string(&json!(1234)), Some("1234".to_string()));
        assert_eq!(id_string(&json!("")), None);
        assert_eq!(id_string(&json!(null)), None);
    }
}
