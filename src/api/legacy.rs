// MIT License - Copyright (c) 2026 Peter Wright
// Legacy mobile API
//
// Form-encoded requests against `simplisafe.com/mobile`. Login sets a session
// cookie in the client's jar and returns the user id; sessions carry no
// expiry and cannot be refreshed.

use async_trait::async_trait;
use indexmap::IndexMap;
use reqwest::{Method, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde::de::IgnoredAny;
use tracing::debug;
use url::Url;

use crate::api::{RemoteAlarmApi, Site, SiteSelector, expect_success, id_string, parse_body};
use crate::config::SessionConfig;
use crate::error::{BridgeError, Result};
use crate::session::{
    Authenticator, Credentials, Identity, LoginGrant, RemoteSession, RequestBody, endpoint,
};
use crate::state::{RemoteAlarmState, RemoteCommand};

/// Client version the legacy login endpoint expects.
const CLIENT_VERSION: &str = "1200";

#[derive(Debug, Deserialize)]
struct LoginResponse {
    #[serde(default)]
    session: String,
    #[serde(default)]
    uid: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct LocationsResponse {
    #[serde(default)]
    locations: Option<Locations>,
}

/// The endpoint sends a JSON object keyed by site id, or `[]` when the
/// account has no locations.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Locations {
    Keyed(IndexMap<String, Location>),
    List(Vec<IgnoredAny>),
}

#[derive(Debug, Deserialize)]
struct Location {
    #[serde(default)]
    system_state: String,
}

/// Session-cookie login for the legacy API.
pub struct LegacyAuthenticator {
    device_uuid: String,
    device_name: String,
}

impl LegacyAuthenticator {
    pub fn new(device_name: impl Into<String>) -> Self {
        Self {
            device_uuid: uuid::Uuid::new_v4().to_string(),
            device_name: device_name.into(),
        }
    }
}

#[async_trait]
impl Authenticator for LegacyAuthenticator {
    async fn login(
        &self,
        http: &reqwest::Client,
        base_url: &Url,
        username: &str,
        password: &SecretString,
    ) -> Result<LoginGrant> {
        let url = endpoint(base_url, "login")?;
        let form = [
            ("name", username),
            ("pass", password.expose_secret()),
            ("version", CLIENT_VERSION),
            ("device_uuid", self.device_uuid.as_str()),
            ("device_name", self.device_name.as_str()),
        ];
        let response = http.post(url).form(&form).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(BridgeError::auth(format!("login failed (HTTP {status})")));
        }

        let login: LoginResponse = parse_body(response)
            .await
            .map_err(|e| BridgeError::auth(format!("malformed login response: {e}")))?;
        let uid = id_string(&login.uid)
            .ok_or_else(|| BridgeError::auth("login response carried no user id"))?;

        Ok(LoginGrant {
            credentials: Credentials {
                access_token: SecretString::from(login.session),
                refresh_token: None,
                expires_at: None,
            },
            identity: Some(Identity(uid)),
        })
    }

    async fn refresh(
        &self,
        _http: &reqwest::Client,
        _base_url: &Url,
        _credentials: &Credentials,
    ) -> Result<Credentials> {
        Err(BridgeError::auth("legacy sessions cannot be refreshed"))
    }

    fn authorize(&self, request: RequestBuilder, _credentials: &Credentials) -> RequestBuilder {
        // The session cookie rides along in the client's jar.
        request
    }
}

/// Legacy API client.
pub struct LegacyApi {
    session: RemoteSession,
    sites: SiteSelector,
}

impl LegacyApi {
    pub fn new(config: &SessionConfig) -> Result<Self> {
        let authenticator = LegacyAuthenticator::new(&config.device_name);
        Ok(Self::with_session(
            RemoteSession::new(config, Box::new(authenticator))?,
            config.site_id.clone(),
        ))
    }

    pub fn with_session(session: RemoteSession, site_id: Option<String>) -> Self {
        Self {
            session,
            sites: SiteSelector::new(site_id),
        }
    }

    pub fn session(&self) -> &RemoteSession {
        &self.session
    }

    fn debug_fields() -> [(&'static str, String); 2] {
        [
            ("no_persist", "1".to_string()),
            ("XDEBUG_SESSION_START", "session_name".to_string()),
        ]
    }
}

#[async_trait]
impl RemoteAlarmApi for LegacyApi {
    async fn login(&self, username: &str, password: &SecretString) -> Result<()> {
        self.session.login(username, password).await
    }

    async fn fetch_status(&self) -> Result<Site> {
        let uid = self.session.identity().await?;
        let response = self
            .session
            .authorized_request(
                Method::POST,
                &format!("{uid}/locations"),
                RequestBody::Form(Self::debug_fields().to_vec()),
            )
            .await?;
        let response = expect_success(response, "list locations")?;
        let body: LocationsResponse = parse_body(response).await?;

        let sites = match body.locations {
            Some(Locations::Keyed(locations)) => locations
                .into_iter()
                .map(|(id, location)| Site {
                    id,
                    state: RemoteAlarmState::from_remote(&location.system_state),
                })
                .collect(),
            Some(Locations::List(items)) if !items.is_empty() => {
                return Err(BridgeError::parse(format!(
                    "locations sent as a list of {} entries",
                    items.len()
                )));
            }
            Some(Locations::List(_)) | None => Vec::new(),
        };
        debug!("Legacy API listed {} location(s)", sites.len());
        self.sites.select(sites).await
    }

    async fn set_state(&self, site: &Site, command: RemoteCommand) -> Result<()> {
        let uid = self.session.identity().await?;
        let mut form = vec![
            ("state", command.as_str().to_string()),
            ("mobile", "1".to_string()),
        ];
        form.extend(Self::debug_fields());

        let response = self
            .session
            .authorized_request(
                Method::POST,
                &format!("{uid}/sid/{}/set-state", site.id),
                RequestBody::Form(form),
            )
            .await?;
        expect_success(response, "set state")?;
        Ok(())
    }
}
