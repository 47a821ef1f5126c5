// MIT License - Copyright (c) 2026 Peter Wright
// Remote session: HTTP transport and credential lifecycle

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use secrecy::SecretString;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};
use url::Url;

use crate::config::SessionConfig;
use crate::error::{BridgeError, Result};

/// Token material issued by the remote at login or refresh.
///
/// Never persisted and never logged; the secrets redact themselves in `Debug`.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub access_token: SecretString,
    pub refresh_token: Option<SecretString>,
    /// `None` when the remote does not announce an expiry (legacy sessions).
    pub expires_at: Option<DateTime<Utc>>,
}

impl Credentials {
    /// Whether the credentials are expired or will be within `margin` of `now`.
    pub fn expires_within(&self, margin: chrono::Duration, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at - margin <= now)
    }
}

/// Remote user id, assigned after authentication.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity(pub String);

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Outcome of a successful login exchange.
#[derive(Debug)]
pub struct LoginGrant {
    pub credentials: Credentials,
    /// Filled when the login response already names the user.
    pub identity: Option<Identity>,
}

/// Session lifecycle.
///
/// `Failed` is terminal until the caller logs in again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Authenticating,
    Authenticated,
    Refreshing,
    Failed,
}

/// Body of an outgoing request.
#[derive(Debug, Clone)]
pub enum RequestBody {
    Empty,
    Form(Vec<(&'static str, String)>),
    Json(serde_json::Value),
}

impl RequestBody {
    pub(crate) fn apply(self, builder: RequestBuilder) -> RequestBuilder {
        match self {
            RequestBody::Empty => builder,
            RequestBody::Form(fields) => builder.form(&fields),
            RequestBody::Json(value) => builder.json(&value),
        }
    }
}

/// The generation-specific half of the session: how to log in, refresh and
/// present credentials.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn login(
        &self,
        http: &reqwest::Client,
        base_url: &Url,
        username: &str,
        password: &SecretString,
    ) -> Result<LoginGrant>;

    async fn refresh(
        &self,
        http: &reqwest::Client,
        base_url: &Url,
        credentials: &Credentials,
    ) -> Result<Credentials>;

    /// Look up the user id for freshly issued credentials.
    async fn identify(
        &self,
        _http: &reqwest::Client,
        _base_url: &Url,
        _credentials: &Credentials,
    ) -> Result<Identity> {
        Err(BridgeError::auth("login response did not identify the user"))
    }

    /// Attach credentials to an outgoing request.
    fn authorize(&self, request: RequestBuilder, credentials: &Credentials) -> RequestBuilder;
}

/// Join a relative API path onto the base URL.
///
/// Unlike `Url::join`, the last segment of the base is kept.
pub(crate) fn endpoint(base_url: &Url, path: &str) -> Result<Url> {
    let base = base_url.as_str().trim_end_matches('/');
    let path = path.trim_start_matches('/');
    Ok(Url::parse(&format!("{base}/{path}"))?)
}

struct SessionInner {
    state: SessionState,
    credentials: Option<Credentials>,
    identity: Option<Identity>,
    /// Bumped whenever `credentials` is replaced
    generation: u64,
}

/// Authenticated access to the remote API.
///
/// Credentials, identity and state are swapped together under one lock, so
/// readers never observe a half-updated session. Refreshes are serialized
/// through `refresh_lock`: callers arriving while a refresh is in flight wait
/// for it and reuse its result.
pub struct RemoteSession {
    http: reqwest::Client,
    base_url: Url,
    refresh_margin: chrono::Duration,
    authenticator: Box<dyn Authenticator>,
    inner: RwLock<SessionInner>,
    refresh_lock: Mutex<()>,
}

impl RemoteSession {
    pub fn new(config: &SessionConfig, authenticator: Box<dyn Authenticator>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(config.request_timeout())
            .build()?;
        Self::with_client(http, config, authenticator)
    }

    /// Create a session around a pre-built `reqwest::Client`.
    pub fn with_client(
        http: reqwest::Client,
        config: &SessionConfig,
        authenticator: Box<dyn Authenticator>,
    ) -> Result<Self> {
        let base_url = Url::parse(config.resolved_base_url())?;
        Ok(Self {
            http,
            base_url,
            refresh_margin: config.refresh_margin(),
            authenticator,
            inner: RwLock::new(SessionInner {
                state: SessionState::Unauthenticated,
                credentials: None,
                identity: None,
                generation: 0,
            }),
            refresh_lock: Mutex::new(()),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub async fn state(&self) -> SessionState {
        self.inner.read().await.state
    }

    /// The authenticated user, or `NotReady` before the first successful login.
    pub async fn identity(&self) -> Result<Identity> {
        self.inner
            .read()
            .await
            .identity
            .clone()
            .ok_or_else(|| BridgeError::not_ready("not logged in"))
    }

    /// Exchange username and password for credentials, then resolve the identity.
    ///
    /// On failure the session is `Failed`; the previous credentials are dropped.
    pub async fn login(&self, username: &str, password: &SecretString) -> Result<()> {
        let _refresh_guard = self.refresh_lock.lock().await;
        self.inner.write().await.state = SessionState::Authenticating;
        debug!("Logging in at {}", self.base_url);

        match self.exchange_login(username, password).await {
            Ok((credentials, identity)) => {
                let mut inner = self.inner.write().await;
                if let Some(previous) = &inner.identity
                    && *previous != identity
                {
                    warn!("Remote identity changed on re-login: {previous} -> {identity}");
                }
                info!("Logged in, user id {identity}");
                inner.credentials = Some(credentials);
                inner.identity = Some(identity);
                inner.state = SessionState::Authenticated;
                inner.generation += 1;
                Ok(())
            }
            Err(e) => {
                let mut inner = self.inner.write().await;
                inner.credentials = None;
                inner.state = SessionState::Failed;
                inner.generation += 1;
                Err(e)
            }
        }
    }

    async fn exchange_login(
        &self,
        username: &str,
        password: &SecretString,
    ) -> Result<(Credentials, Identity)> {
        let grant = self
            .authenticator
            .login(&self.http, &self.base_url, username, password)
            .await?;
        let identity = match grant.identity {
            Some(identity) => identity,
            None => {
                self.authenticator
                    .identify(&self.http, &self.base_url, &grant.credentials)
                    .await?
            }
        };
        Ok((grant.credentials, identity))
    }

    /// Send a request with the current credentials attached.
    ///
    /// Credentials close to expiry are refreshed first. A 401 answer marks the
    /// session `Failed`; later calls then fail fast until the next login. A 401
    /// for credentials that were replaced while the request was in flight
    /// leaves the session alone.
    pub async fn authorized_request(
        &self,
        method: Method,
        path: &str,
        body: RequestBody,
    ) -> Result<Response> {
        let (credentials, generation) = self.valid_credentials().await?;
        let url = endpoint(&self.base_url, path)?;
        debug!("{} {}", method, url);

        let request = self.http.request(method, url);
        let request = self.authenticator.authorize(body.apply(request), &credentials);
        let response = request.send().await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            let mut inner = self.inner.write().await;
            if inner.generation == generation {
                warn!("Remote rejected credentials (HTTP 401), session needs a new login");
                inner.state = SessionState::Failed;
            } else {
                debug!("Ignoring HTTP 401 for credentials replaced since the request was sent");
            }
            return Err(BridgeError::auth("session expired or invalid credentials"));
        }
        Ok(response)
    }

    async fn valid_credentials(&self) -> Result<(Credentials, u64)> {
        let (current, generation) = self.usable_credentials().await?;
        if !current.expires_within(self.refresh_margin, Utc::now()) {
            return Ok((current, generation));
        }

        let _refresh_guard = self.refresh_lock.lock().await;
        // Another caller may have refreshed while we waited for the lock.
        let (current, generation) = self.usable_credentials().await?;
        if !current.expires_within(self.refresh_margin, Utc::now()) {
            return Ok((current, generation));
        }

        debug!("Credentials near expiry, refreshing");
        self.inner.write().await.state = SessionState::Refreshing;
        match self
            .authenticator
            .refresh(&self.http, &self.base_url, &current)
            .await
        {
            Ok(fresh) => {
                let mut inner = self.inner.write().await;
                inner.credentials = Some(fresh.clone());
                inner.state = SessionState::Authenticated;
                inner.generation += 1;
                info!("Credentials refreshed");
                Ok((fresh, inner.generation))
            }
            Err(e) => {
                self.inner.write().await.state = SessionState::Failed;
                Err(match e {
                    auth @ BridgeError::Auth { .. } => auth,
                    other => BridgeError::auth(format!("credential refresh failed: {other}")),
                })
            }
        }
    }

    async fn usable_credentials(&self) -> Result<(Credentials, u64)> {
        let inner = self.inner.read().await;
        match (inner.state, &inner.credentials) {
            (SessionState::Failed, _) => Err(BridgeError::auth("session failed, login required")),
            (_, Some(credentials)) if inner.identity.is_some() => {
                Ok((credentials.clone(), inner.generation))
            }
            _ => Err(BridgeError::not_ready("not logged in")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn credentials(expires_at: Option<DateTime<Utc>>) -> Credentials {
        Credentials {
            access_token: SecretString::from("token".to_string()),
            refresh_token: None,
            expires_at,
        }
    }

    #[test]
    fn test_expiry_window() {
        let now = Utc::now();
        let margin = Duration::seconds(60);
        assert!(!credentials(None).expires_within(margin, now));
        assert!(!credentials(Some(now + Duration::seconds(3600))).expires_within(margin, now));
        assert!(credentials(Some(now + Duration::seconds(30))).expires_within(margin, now));
        assert!(credentials(Some(now - Duration::seconds(1))).expires_within(margin, now));
    }

    #[test]
    fn test_endpoint_keeps_base_path() {
        let base = Url::parse("https://api.simplisafe.com/v1").unwrap();
        assert_eq!(
            endpoint(&base, "api/token").unwrap().as_str(),
            "https://api.simplisafe.com/v1/api/token"
        );
        let base = Url::parse("https://simplisafe.com/mobile/").unwrap();
        assert_eq!(
            endpoint(&base, "/42/locations").unwrap().as_str(),
            "https://simplisafe.com/mobile/42/locations"
        );
    }

    #[test]
    fn test_endpoint_keeps_query() {
        let base = Url::parse("http://127.0.0.1:8080").unwrap();
        let url = endpoint(&base, "users/7/subscriptions?activeOnly=true").unwrap();
        assert_eq!(url.path(), "/users/7/subscriptions");
        assert_eq!(url.query(), Some("activeOnly=true"));
    }
}
