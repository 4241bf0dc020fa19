use std::time::{Duration, Instant};

use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Client as ReqwestClient, Response, StatusCode};
use url::Url;

use crate::config::Credentials;
use crate::error::{Error, Result};
use crate::moderation::{IdentityResolver, ModerationApi};
use crate::observability::{HELIX_REQUEST_DURATION, HELIX_REQUEST_ERRORS, HELIX_REQUESTS};
use crate::types::{AccountId, BanRequest, BanRequestBody, ChannelContext, UserList};

const DEFAULT_API_URL: &str = "https://api.twitch.tv/helix/";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Client for the Twitch Helix API.
///
/// Covers the two endpoints the tool needs: account lookup by login and
/// ban/timeout creation. Every call is bounded by the client timeout and is
/// never retried.
#[derive(Debug, Clone)]
pub struct Helix {
    access_token: String,
    client_id: String,
    client: ReqwestClient,
    base_url: Url,
    timeout: Duration,
}

impl Helix {
    /// Create a new Helix client for the given credentials.
    pub fn new(credentials: &Credentials) -> Result<Self> {
        Self::with_options(credentials, None, None)
    }

    /// Create a new client with custom settings.
    pub fn with_options(
        credentials: &Credentials,
        base_url: Option<String>,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        let timeout = timeout.unwrap_or(DEFAULT_TIMEOUT);
        let client = ReqwestClient::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                Error::http_client(
                    format!("Failed to build HTTP client: {e}"),
                    Some(Box::new(e)),
                )
            })?;

        // Url::join drops the last path segment unless the base ends in '/'.
        let mut base_url = base_url.unwrap_or_else(|| DEFAULT_API_URL.to_string());
        if !base_url.ends_with('/') {
            base_url.push('/');
        }

        Ok(Self {
            access_token: credentials.access_token().to_string(),
            client_id: credentials.client_id().to_string(),
            client,
            base_url: Url::parse(&base_url)?,
            timeout,
        })
    }

    /// Create and return default headers for API requests.
    fn default_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        let bearer = HeaderValue::from_str(&format!("Bearer {}", self.access_token))
            .map_err(|_| {
                Error::validation(
                    "access token contains characters not allowed in a header",
                    Some("token".to_string()),
                )
            })?;
        headers.insert(header::AUTHORIZATION, bearer);
        let client_id = HeaderValue::from_str(&self.client_id).map_err(|_| {
            Error::validation(
                "client id contains characters not allowed in a header",
                Some("client_id".to_string()),
            )
        })?;
        headers.insert("client-id", client_id);
        Ok(headers)
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(self.base_url.join(path)?)
    }

    /// Convert a reqwest failure into our Error type.
    fn transport_error(&self, e: reqwest::Error) -> Error {
        HELIX_REQUEST_ERRORS.click();
        if e.is_timeout() {
            Error::timeout(
                format!("Request timed out: {e}"),
                Some(self.timeout.as_secs_f64()),
            )
        } else if e.is_connect() {
            Error::connection(format!("Connection error: {e}"), Some(Box::new(e)))
        } else {
            Error::http_client(format!("Request failed: {e}"), Some(Box::new(e)))
        }
    }

    /// Keep the status and body of an unexpected response for the operator.
    async fn error_response(response: Response) -> Error {
        HELIX_REQUEST_ERRORS.click();
        let status_code = response.status().as_u16();
        match response.text().await {
            Ok(body) => Error::api(status_code, body),
            Err(e) => Error::http_client(
                format!("HTTP {status_code}; failed to read error response: {e}"),
                Some(Box::new(e)),
            ),
        }
    }

    /// Look up the id of the account with the given login.
    ///
    /// Returns [`Error::NotFound`] when Helix answers with an empty list.
    pub async fn lookup_user(&self, login: &str) -> Result<AccountId> {
        let url = self.endpoint("users")?;
        let started = Instant::now();
        HELIX_REQUESTS.click();

        let response = self
            .client
            .get(url)
            .headers(self.default_headers()?)
            .query(&[("login", login)])
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        HELIX_REQUEST_DURATION.add(started.elapsed().as_secs_f64());
        tracing::debug!(login, status = response.status().as_u16(), "helix users lookup");

        if response.status() != StatusCode::OK {
            return Err(Self::error_response(response).await);
        }

        let users = response.json::<UserList>().await.map_err(|e| {
            Error::serialization(
                format!("Failed to parse users response: {e}"),
                Some(Box::new(e)),
            )
        })?;
        users.first_id().cloned().ok_or_else(|| {
            Error::not_found(
                "no account matches this login",
                Some(login.to_string()),
            )
        })
    }

    /// Ban or time out an account in the given channel.
    ///
    /// Succeeds on HTTP 200 or 204; anything else is [`Error::Api`] carrying
    /// the status and response body.
    pub async fn create_ban(&self, channel: &ChannelContext, request: BanRequest) -> Result<()> {
        let url = self.endpoint("moderation/bans")?;
        let started = Instant::now();
        HELIX_REQUESTS.click();

        let response = self
            .client
            .post(url)
            .headers(self.default_headers()?)
            .query(&[
                ("broadcaster_id", channel.channel_id.as_str()),
                ("moderator_id", channel.self_id.as_str()),
            ])
            .json(&BanRequestBody::from(request))
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        HELIX_REQUEST_DURATION.add(started.elapsed().as_secs_f64());
        tracing::debug!(
            channel = %channel.channel,
            status = response.status().as_u16(),
            "helix ban request"
        );

        match response.status() {
            StatusCode::OK | StatusCode::NO_CONTENT => Ok(()),
            _ => Err(Self::error_response(response).await),
        }
    }
}

#[async_trait::async_trait]
impl IdentityResolver for Helix {
    async fn resolve(&self, login: &str) -> Option<AccountId> {
        match self.lookup_user(login).await {
            Ok(id) => {
                tracing::debug!(login, id = %id, "resolved account");
                Some(id)
            }
            Err(err) if err.is_not_found() => {
                tracing::warn!(login, "no account with this login");
                None
            }
            Err(err) => {
                tracing::error!(login, error = %err, "account lookup failed");
                None
            }
        }
    }
}

#[async_trait::async_trait]
impl ModerationApi for Helix {
    async fn create_ban(&self, channel: &ChannelContext, request: BanRequest) -> Result<()> {
        Helix::create_ban(self, channel, request).await
    }
}
