//! Signed access to the Twitter v1.1 REST API.

use std::collections::BTreeMap;
use std::time::Duration;

use bytes::Bytes;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, instrument};
use url::Url;

use crate::{
    config::BridgeConfig,
    credential::Credential,
    error::{TwitterError, TwitterResult},
    oauth::OAuthSigner,
};

pub const VERIFY_CREDENTIALS_PATH: &str = "/1.1/account/verify_credentials.json";
pub const USERS_SHOW_PATH: &str = "/1.1/users/show.json";
pub const LISTS_PATH: &str = "/1.1/lists/list.json";
pub const HOME_TIMELINE_PATH: &str = "/1.1/statuses/home_timeline.json";

/// Ordered request parameters.
pub type Params = Vec<(String, String)>;

/// Twitter REST API client for one credential.
#[derive(Debug)]
pub struct TwitterApiClient {
    client: Client,
    base_url: String,
    signer: OAuthSigner,
    default_params: BTreeMap<String, String>,
}

impl TwitterApiClient {
    /// Create a client for `credential` using the bridge-wide configuration.
    pub fn new(config: &BridgeConfig, credential: Credential) -> TwitterResult<Self> {
        let mut headers = HeaderMap::new();
        for (name, value) in &config.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| TwitterError::Config(format!("invalid header name {name}: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| TwitterError::Config(format!("invalid value for {name}: {e}")))?;
            headers.insert(name, value);
        }

        // Configured headers are applied last so they can replace the user agent.
        let mut builder = Client::builder()
            .user_agent(format!("lazybridge/{}", env!("CARGO_PKG_VERSION")))
            .default_headers(headers);
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            client: builder.build()?,
            base_url: config.api_base().to_string(),
            signer: OAuthSigner::new(credential),
            default_params: config.default_params.clone(),
        })
    }

    #[must_use]
    pub const fn credential(&self) -> &Credential {
        self.signer.credential()
    }

    #[must_use]
    pub const fn signer(&self) -> &OAuthSigner {
        &self.signer
    }

    /// User ID of the credential's owner, for identity-scoped endpoints.
    #[must_use]
    pub fn identity(&self) -> &str {
        self.signer.credential().identity()
    }

    /// The configured default request parameters, ready to extend.
    #[must_use]
    pub fn item_params(&self) -> Params {
        self.default_params
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Resolve an endpoint against the base URL. Absolute URLs pass through;
    /// anything else must be a path starting with `/`.
    pub fn endpoint_url(&self, endpoint: &str) -> TwitterResult<Url> {
        if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            Ok(Url::parse(endpoint)?)
        } else if endpoint.starts_with('/') {
            Ok(Url::parse(&format!("{}{}", self.base_url, endpoint))?)
        } else {
            Err(TwitterError::Config(format!(
                "endpoint must be an absolute URL or start with '/': {endpoint}"
            )))
        }
    }

    /// Issue one signed request.
    ///
    /// Query parameters are appended to the URL, body parameters are sent
    /// form-encoded, and both take part in the signature. The response comes
    /// back whatever its status; transport failures propagate as-is.
    #[instrument(skip(self, query, body), fields(identity = %self.identity()))]
    pub async fn request(
        &self,
        method: Method,
        endpoint: &str,
        query: &[(String, String)],
        body: &[(String, String)],
    ) -> TwitterResult<UpstreamResponse> {
        let mut url = self.endpoint_url(endpoint)?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }

        let signed = self.signer.sign(method.as_str(), &url, body)?;
        debug!(
            method = %method,
            path = url.path(),
            query_params = query.len(),
            body_params = body.len(),
            "Making Twitter API request"
        );

        let mut req = self
            .client
            .request(method, url)
            .header(AUTHORIZATION, signed.authorization_header());
        if !body.is_empty() {
            req = req.form(body);
        }

        let response = req.send().await?;
        UpstreamResponse::read(response).await
    }

    /// Signed GET.
    pub async fn get(
        &self,
        endpoint: &str,
        query: &[(String, String)],
    ) -> TwitterResult<UpstreamResponse> {
        self.request(Method::GET, endpoint, query, &[]).await
    }

    /// Signed POST.
    pub async fn post(
        &self,
        endpoint: &str,
        query: &[(String, String)],
        body: &[(String, String)],
    ) -> TwitterResult<UpstreamResponse> {
        self.request(Method::POST, endpoint, query, body).await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Endpoints
    // ─────────────────────────────────────────────────────────────────────────

    /// The authenticated user.
    pub async fn verify_credentials(&self) -> TwitterResult<Value> {
        self.get(VERIFY_CREDENTIALS_PATH, &[])
            .await?
            .error_for_status()?
            .json()
    }

    /// One user profile by numeric ID, uncached.
    pub async fn show_user(&self, user_id: &str) -> TwitterResult<Value> {
        let mut params = self.item_params();
        params.push(("user_id".to_string(), user_id.to_string()));

        self.get(USERS_SHOW_PATH, &params)
            .await?
            .error_for_status()?
            .json()
    }

    /// Lists owned or subscribed to by the credential's owner.
    pub async fn lists(&self) -> TwitterResult<Vec<Value>> {
        let params = vec![("user_id".to_string(), self.identity().to_string())];

        self.get(LISTS_PATH, &params)
            .await?
            .error_for_status()?
            .json()
    }

    /// One page of the home timeline, newest first.
    pub async fn home_timeline_page(&self, params: &[(String, String)]) -> TwitterResult<Vec<Value>> {
        self.get(HOME_TIMELINE_PATH, params)
            .await?
            .error_for_status()?
            .json()
    }
}

/// An upstream response with status, headers and body left intact.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl UpstreamResponse {
    async fn read(response: Response) -> TwitterResult<Self> {
        let status = response.status();
        let headers = response.headers().clone();

        let rate_limit = RateLimitInfo::from_headers(&headers);
        if rate_limit.is_exhausted() {
            debug!(reset = ?rate_limit.reset, "Rate limit exhausted");
        }

        let body = response.bytes().await?;
        Ok(Self {
            status,
            headers,
            body,
        })
    }

    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    #[must_use]
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Body as text, lossily decoded.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    #[must_use]
    pub fn rate_limit(&self) -> RateLimitInfo {
        RateLimitInfo::from_headers(&self.headers)
    }

    /// Turn a non-success status into [`TwitterError::Upstream`].
    pub fn error_for_status(self) -> TwitterResult<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(TwitterError::Upstream {
                status: self.status,
                body: self.text(),
            })
        }
    }

    /// Deserialize the body.
    pub fn json<T: DeserializeOwned>(&self) -> TwitterResult<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}

/// Rate limit information from Twitter API headers.
#[derive(Debug, Clone, Default)]
pub struct RateLimitInfo {
    /// Maximum number of requests allowed in the window
    pub limit: Option<u32>,

    /// Remaining requests in the current window
    pub remaining: Option<u32>,

    /// Unix timestamp when the rate limit resets
    pub reset: Option<u64>,
}

impl RateLimitInfo {
    /// Parse rate limit info from response headers.
    #[must_use]
    pub fn from_headers(headers: &HeaderMap) -> Self {
        fn parse<T: std::str::FromStr>(headers: &HeaderMap, name: &str) -> Option<T> {
            headers.get(name)?.to_str().ok()?.parse().ok()
        }

        Self {
            limit: parse(headers, "x-rate-limit-limit"),
            remaining: parse(headers, "x-rate-limit-remaining"),
            reset: parse(headers, "x-rate-limit-reset"),
        }
    }

    /// Check if we're rate limited (remaining == 0).
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.remaining == Some(0)
    }

    /// Duration until the window resets, if it lies in the future.
    #[must_use]
    pub fn time_until_reset(&self) -> Option<Duration> {
        let reset = self.reset?;
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .ok()?
            .as_secs();

        (reset > now).then(|| Duration::from_secs(reset - now))
    }
}
