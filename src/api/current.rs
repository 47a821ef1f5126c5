// MIT License - Copyright (c) 2026 Peter Wright
// Current REST API (OAuth bearer tokens)

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Method, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;
use url::Url;

use crate::api::{RemoteAlarmApi, Site, SiteSelector, expect_success, id_string, parse_body};
use crate::config::SessionConfig;
use crate::error::{BridgeError, Result};
use crate::session::{
    Authenticator, Credentials, Identity, LoginGrant, RemoteSession, RequestBody, endpoint,
};
use crate::state::{RemoteAlarmState, RemoteCommand};

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    /// Lifetime in seconds
    #[serde(default)]
    expires_in: Option<i64>,
}

impl TokenResponse {
    fn into_credentials(self, previous_refresh: Option<&SecretString>) -> Credentials {
        Credentials {
            access_token: SecretString::from(self.access_token),
            // Some refresh answers omit the refresh token; keep using the old one.
            refresh_token: self
                .refresh_token
                .map(SecretString::from)
                .or_else(|| previous_refresh.cloned()),
            expires_at: self
                .expires_in
                .map(|secs| Utc::now() + chrono::Duration::seconds(secs.clamp(0, 86_400 * 365))),
        }
    }
}

#[derive(Debug, Deserialize)]
struct AuthCheckResponse {
    #[serde(rename = "userId")]
    user_id: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct SubscriptionsResponse {
    #[serde(default)]
    subscriptions: Option<Vec<Subscription>>,
}

#[derive(Debug, Deserialize)]
struct Subscription {
    sid: serde_json::Value,
    #[serde(default)]
    location: Option<SubscriptionLocation>,
    /// Flattened form some responses use instead of `location.system`
    #[serde(default, rename = "alarmState")]
    alarm_state: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SubscriptionLocation {
    #[serde(default)]
    system: Option<SubscriptionSystem>,
}

#[derive(Debug, Deserialize)]
struct SubscriptionSystem {
    #[serde(default, rename = "alarmState")]
    alarm_state: Option<String>,
}

impl Subscription {
    fn alarm_state(&self) -> Option<&str> {
        self.location
            .as_ref()
            .and_then(|l| l.system.as_ref())
            .and_then(|s| s.alarm_state.as_deref())
            .or(self.alarm_state.as_deref())
    }
}

/// Password grant and refresh-token grant against `api/token`.
pub struct BearerAuthenticator {
    device_id: String,
}

impl BearerAuthenticator {
    pub fn new(device_name: &str) -> Self {
        Self {
            device_id: format!("{device_name}; uuid={}", uuid::Uuid::new_v4()),
        }
    }

    async fn request_token(
        &self,
        http: &reqwest::Client,
        base_url: &Url,
        body: serde_json::Value,
        operation: &str,
    ) -> Result<TokenResponse> {
        let url = endpoint(base_url, "api/token")?;
        let response = http.post(url).json(&body).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(BridgeError::auth(format!("{operation} failed (HTTP {status})")));
        }
        parse_body(response)
            .await
            .map_err(|e| BridgeError::auth(format!("malformed {operation} response: {e}")))
    }
}

#[async_trait]
impl Authenticator for BearerAuthenticator {
    async fn login(
        &self,
        http: &reqwest::Client,
        base_url: &Url,
        username: &str,
        password: &SecretString,
    ) -> Result<LoginGrant> {
        let body = json!({
            "grant_type": "password",
            "username": username,
            "password": password.expose_secret(),
            "device_id": self.device_id,
        });
        let token = self.request_token(http, base_url, body, "login").await?;
        Ok(LoginGrant {
            credentials: token.into_credentials(None),
            identity: None,
        })
    }

    async fn refresh(
        &self,
        http: &reqwest::Client,
        base_url: &Url,
        credentials: &Credentials,
    ) -> Result<Credentials> {
        let refresh_token = credentials
            .refresh_token
            .as_ref()
            .ok_or_else(|| BridgeError::auth("no refresh token issued"))?;
        let body = json!({
            "grant_type": "refresh_token",
            "refresh_token": refresh_token.expose_secret(),
            "device_id": self.device_id,
        });
        let token = self.request_token(http, base_url, body, "refresh").await?;
        Ok(token.into_credentials(Some(refresh_token)))
    }

    async fn identify(
        &self,
        http: &reqwest::Client,
        base_url: &Url,
        credentials: &Credentials,
    ) -> Result<Identity> {
        let url = endpoint(base_url, "api/authCheck")?;
        let response = self.authorize(http.get(url), credentials).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(BridgeError::auth(format!("identity lookup failed (HTTP {status})")));
        }
        let check: AuthCheckResponse = parse_body(response)
            .await
            .map_err(|e| BridgeError::auth(format!("malformed identity response: {e}")))?;
        id_string(&check.user_id)
            .map(Identity)
            .ok_or_else(|| BridgeError::auth("identity response carried no user id"))
    }

    fn authorize(&self, request: RequestBuilder, credentials: &Credentials) -> RequestBuilder {
        request.bearer_auth(credentials.access_token.expose_secret())
    }
}

/// Current API client.
pub struct CurrentApi {
    session: RemoteSession,
    sites: SiteSelector,
}

impl CurrentApi {
    pub fn new(config: &SessionConfig) -> Result<Self> {
        let authenticator = BearerAuthenticator::new(&config.device_name);
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
}

#[async_trait]
impl RemoteAlarmApi for CurrentApi {
    async fn login(&self, username: &str, password: &SecretString) -> Result<()> {
        self.session.login(username, password).await
    }

    async fn fetch_status(&self) -> Result<Site> {
        let uid = self.session.identity().await?;
        let response = self
            .session
            .authorized_request(
                Method::GET,
                &format!("users/{uid}/subscriptions?activeOnly=true"),
                RequestBody::Empty,
            )
            .await?;
        let response = expect_success(response, "list subscriptions")?;
        let body: SubscriptionsResponse = parse_body(response).await?;

        let subscriptions = body.subscriptions.unwrap_or_default();
        let mut sites = Vec::with_capacity(subscriptions.len());
        for subscription in &subscriptions {
            let id = id_string(&subscription.sid)
                .ok_or_else(|| BridgeError::parse("subscription without sid"))?;
            sites.push(Site {
                id,
                state: RemoteAlarmState::from_remote(subscription.alarm_state().unwrap_or("")),
            });
        }
        debug!("Current API listed {} subscription(s)", sites.len());
        self.sites.select(sites).await
    }

    async fn set_state(&self, site: &Site, command: RemoteCommand) -> Result<()> {
        let response = self
            .session
            .authorized_request(
                Method::POST,
                &format!("ss3/subscriptions/{}/state/{}", site.id, command.as_str()),
                RequestBody::Empty,
            )
            .await?;
        expect_success(response, "set state")?;
        Ok(())
    }
}
