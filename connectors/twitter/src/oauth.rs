//! OAuth 1.0a request signing.
//!
//! Twitter's v1.1 API authenticates user-context requests with HMAC-SHA1
//! signed `Authorization: OAuth ...` headers. The signature must match the
//! upstream byte for byte, so every step here follows the reference
//! algorithm exactly: encode, sort the encoded `key=value` pairs as whole
//! strings, encode the joined string again, then sign.

use std::fmt;
use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use hmac::{Hmac, Mac};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use rand::RngCore;
use sha1::Sha1;
use tracing::debug;
use url::Url;
use zeroize::Zeroizing;

use crate::credential::Credential;
use crate::error::{TwitterError, TwitterResult};

/// Signature method advertised in every header.
pub const SIGNATURE_METHOD: &str = "HMAC-SHA1";

/// OAuth protocol version advertised in every header.
pub const OAUTH_VERSION: &str = "1.0";

/// Everything but RFC 3986 unreserved characters gets escaped. This is the
/// URI-component set with `'`, `(`, `)`, `*` and `!` escaped as well.
const OAUTH_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

type HmacSha1 = Hmac<Sha1>;

/// Percent-encode a string the way the upstream expects in signatures and
/// headers.
#[must_use]
pub fn percent_encode(s: &str) -> String {
    utf8_percent_encode(s, OAUTH_ENCODE_SET).to_string()
}

/// `encode(consumer_secret)&encode(access_token_secret)`, wiped on drop.
struct SigningKey(Zeroizing<Vec<u8>>);

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SigningKey(..)")
    }
}

/// OAuth 1.0a signer bound to one credential.
#[derive(Debug)]
pub struct OAuthSigner {
    credential: Credential,
    signing_key: OnceLock<SigningKey>,
}

impl OAuthSigner {
    #[must_use]
    pub const fn new(credential: Credential) -> Self {
        Self {
            credential,
            signing_key: OnceLock::new(),
        }
    }

    #[must_use]
    pub const fn credential(&self) -> &Credential {
        &self.credential
    }

    /// HMAC key material, derived on first use and reused afterwards.
    #[must_use]
    pub fn signing_key(&self) -> &[u8] {
        let key = self.signing_key.get_or_init(|| {
            debug!(identity = self.credential.identity(), "Deriving OAuth signing key");
            let key = format!(
                "{}&{}",
                percent_encode(self.credential.consumer_secret()),
                percent_encode(self.credential.access_token_secret())
            );
            SigningKey(Zeroizing::new(key.into_bytes()))
        });
        &key.0
    }

    /// Sign a request with a fresh nonce and the current time.
    ///
    /// `url` carries the query parameters that will be sent; `body_params`
    /// are the form-encoded body parameters (empty for GET).
    pub fn sign(
        &self,
        method: &str,
        url: &Url,
        body_params: &[(String, String)],
    ) -> TwitterResult<SignedRequest> {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| TwitterError::OAuth(format!("Failed to get timestamp: {e}")))?
            .as_secs();

        self.sign_with(method, url, body_params, generate_nonce(), timestamp)
    }

    /// Sign with a caller-chosen nonce and timestamp. Identical inputs
    /// always produce the identical signature.
    pub fn sign_with(
        &self,
        method: &str,
        url: &Url,
        body_params: &[(String, String)],
        nonce: impl Into<String>,
        timestamp: u64,
    ) -> TwitterResult<SignedRequest> {
        if !matches!(url.scheme(), "http" | "https") {
            return Err(TwitterError::OAuth(format!(
                "cannot sign non-HTTP URL {url}"
            )));
        }

        let method = method.to_uppercase();
        let mut oauth_params = vec![
            ("oauth_consumer_key", self.credential.consumer_key().to_string()),
            ("oauth_nonce", nonce.into()),
            ("oauth_signature_method", SIGNATURE_METHOD.to_string()),
            ("oauth_timestamp", timestamp.to_string()),
            ("oauth_token", self.credential.access_token().to_string()),
            ("oauth_version", OAUTH_VERSION.to_string()),
        ];

        let base_string = signature_base_string(&method, url, &oauth_params, body_params);

        let mut mac = HmacSha1::new_from_slice(self.signing_key())
            .map_err(|e| TwitterError::OAuth(e.to_string()))?;
        mac.update(base_string.as_bytes());
        let signature = BASE64.encode(mac.finalize().into_bytes());

        oauth_params.push(("oauth_signature", signature));

        Ok(SignedRequest {
            method,
            url: url.clone(),
            body_params: body_params.to_vec(),
            oauth_params,
            base_string,
        })
    }
}

/// Build the signature base string:
/// `METHOD&encode(origin + path)&encode(sorted encoded pairs)`.
fn signature_base_string(
    method: &str,
    url: &Url,
    oauth_params: &[(&str, String)],
    body_params: &[(String, String)],
) -> String {
    let oauth = oauth_params.iter().map(|(k, v)| encode_pair(k, v));
    let query = url.query_pairs().map(|(k, v)| encode_pair(&k, &v));
    let body = body_params.iter().map(|(k, v)| encode_pair(k, v));

    let mut pairs: Vec<String> = oauth.chain(query).chain(body).collect();
    pairs.sort_unstable();

    let endpoint = format!("{}{}", url.origin().ascii_serialization(), url.path());

    format!(
        "{}&{}&{}",
        method,
        percent_encode(&endpoint),
        percent_encode(&pairs.join("&"))
    )
}

fn encode_pair(key: &str, value: &str) -> String {
    format!("{}={}", percent_encode(key), percent_encode(value))
}

/// Generate a random nonce for OAuth.
fn generate_nonce() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// One signed request. Built per call and dropped after sending.
#[derive(Debug, Clone)]
pub struct SignedRequest {
    method: String,
    url: Url,
    body_params: Vec<(String, String)>,
    /// Header order: consumer_key, nonce, signature_method, timestamp,
    /// token, version, signature.
    oauth_params: Vec<(&'static str, String)>,
    base_string: String,
}

impl SignedRequest {
    /// Uppercased HTTP method.
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Target URL including query parameters.
    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.url
    }

    #[must_use]
    pub fn body_params(&self) -> &[(String, String)] {
        &self.body_params
    }

    /// Look up one `oauth_*` parameter by its full name.
    #[must_use]
    pub fn oauth_param(&self, name: &str) -> Option<&str> {
        self.oauth_params
            .iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Base64 HMAC-SHA1 signature.
    #[must_use]
    pub fn signature(&self) -> &str {
        self.oauth_param("oauth_signature").unwrap_or_default()
    }

    /// The exact string that was signed.
    #[must_use]
    pub fn base_string(&self) -> &str {
        &self.base_string
    }

    /// Value for the `Authorization` header.
    #[must_use]
    pub fn authorization_header(&self) -> String {
        let header = self
            .oauth_params
            .iter()
            .map(|(k, v)| format!("{}=\"{}\"", percent_encode(k), percent_encode(v)))
            .collect::<Vec<_>>()
            .join(", ");

        format!("OAuth {header}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NONCE: &str = "0123456789abcdef0123456789abcdef";
    const TIMESTAMP: u64 = 1_700_000_000;

    fn signer() -> OAuthSigner {
        OAuthSigner::new(Credential::new(
            "consumer_key",
            "consumer_secret",
            "12345-ABCDEF",
            "token_secret",
        ))
    }

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_percent_encode() {
        assert_eq!(percent_encode("hello world"), "hello%20world");
        assert_eq!(percent_encode("foo=bar&baz"), "foo%3Dbar%26baz");
        assert_eq!(percent_encode("test-value_123.txt"), "test-value_123.txt");
        assert_eq!(percent_encode("~tilde"), "~tilde");
        assert_eq!(percent_encode("caf\u{e9}"), "caf%C3%A9");
    }

    #[test]
    fn percent_encode_escapes_uri_component_leftovers() {
        assert_eq!(percent_encode("'()*!"), "%27%28%29%2A%21");
    }

    #[test]
    fn test_generate_nonce() {
        let nonce1 = generate_nonce();
        let nonce2 = generate_nonce();

        assert_ne!(nonce1, nonce2);
        assert_eq!(nonce1.len(), 32);
        assert!(nonce1.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn signing_key_is_derived_once() {
        let signer = signer();
        let first = signer.signing_key();
        let second = signer.signing_key();

        assert_eq!(first, b"consumer_secret&token_secret");
        assert!(std::ptr::eq(first, second));
    }

    #[test]
    fn signing_key_encodes_secrets() {
        let signer = OAuthSigner::new(Credential::new("ck", "a&b", "1-t", "c d!"));
        assert_eq!(signer.signing_key(), b"a%26b&c%20d%21");
    }

    #[test]
    fn reference_fixture_from_upstream_docs() {
        let signer = OAuthSigner::new(Credential::new(
            "xvz1evFS4wEEPTGEFPHBog",
            "kAcSOqF21Fu85e7zjz7ZN2U4ZRhfV3WpwPAoE3Z7kBw",
            "370773112-GmHxMAgYyLbNEtIKZeRNFsMKPR9EyMZeS9weJAEb",
            "LswwdoUaIvS8ltyTt5jkRh4J50vUPVVHtR2YPi5kE",
        ));
        let signed = signer
            .sign_with(
                "post",
                &url("https://api.twitter.com/1.1/statuses/update.json?include_entities=true"),
                &pairs(&[("status", "Hello Ladies + Gentlemen, a signed OAuth request!")]),
                "kYjzVBB8Y0ZFabxSWbWovY3uYSQ2pTgmZeNu2VS4cg",
                1_318_622_958,
            )
            .unwrap();

        assert_eq!(
            signed.base_string(),
            "POST&https%3A%2F%2Fapi.twitter.com%2F1.1%2Fstatuses%2Fupdate.json&\
             include_entities%3Dtrue%26oauth_consumer_key%3Dxvz1evFS4wEEPTGEFPHBog%26\
             oauth_nonce%3DkYjzVBB8Y0ZFabxSWbWovY3uYSQ2pTgmZeNu2VS4cg%26\
             oauth_signature_method%3DHMAC-SHA1%26oauth_timestamp%3D1318622958%26\
             oauth_token%3D370773112-GmHxMAgYyLbNEtIKZeRNFsMKPR9EyMZeS9weJAEb%26\
             oauth_version%3D1.0%26status%3DHello%2520Ladies%2520%252B%2520Gentlemen\
             %252C%2520a%2520signed%2520OAuth%2520request%2521"
        );
        assert_eq!(signed.signature(), "hCtSmYh+iHYCEqBWrE7C7hYmtUk=");
        assert_eq!(signed.method(), "POST");
    }

    #[test]
    fn header_fixture_for_plain_get() {
        let signed = signer()
            .sign_with(
                "GET",
                &url("https://api.twitter.com/1.1/account/verify_credentials.json"),
                &[],
                NONCE,
                TIMESTAMP,
            )
            .unwrap();

        assert_eq!(signed.signature(), "QQdeqVfiJvnPfUxgBQkFLUTA8Tw=");
        assert_eq!(
            signed.authorization_header(),
            "OAuth oauth_consumer_key=\"consumer_key\", \
             oauth_nonce=\"0123456789abcdef0123456789abcdef\", \
             oauth_signature_method=\"HMAC-SHA1\", oauth_timestamp=\"1700000000\", \
             oauth_token=\"12345-ABCDEF\", oauth_version=\"1.0\", \
             oauth_signature=\"QQdeqVfiJvnPfUxgBQkFLUTA8Tw%3D\""
        );
    }

    #[test]
    fn query_with_reserved_punctuation_is_escaped() {
        let signed = signer()
            .sign_with(
                "GET",
                &url("https://api.twitter.com/1.1/search/tweets.json?q=it%27s+(fun)*!"),
                &[],
                NONCE,
                TIMESTAMP,
            )
            .unwrap();

        assert!(
            signed
                .base_string()
                .ends_with("q%3Dit%2527s%2520%2528fun%2529%252A%2521")
        );
        assert_eq!(signed.signature(), "OrvYDc5ZE8D+q7Fe+FTuDen5qOg=");
    }

    #[test]
    fn signature_is_deterministic() {
        let signer = signer();
        let target = url("https://api.twitter.com/1.1/statuses/home_timeline.json?count=200");
        let first = signer.sign_with("GET", &target, &[], NONCE, TIMESTAMP).unwrap();
        let second = signer.sign_with("GET", &target, &[], NONCE, TIMESTAMP).unwrap();

        assert_eq!(first.authorization_header(), second.authorization_header());
    }

    #[test]
    fn parameter_order_does_not_matter() {
        let signer = signer();
        let forward = signer
            .sign_with(
                "GET",
                &url("https://api.twitter.com/1.1/statuses/home_timeline.json?count=200&since_id=99"),
                &pairs(&[("a", "1"), ("b", "2")]),
                NONCE,
                TIMESTAMP,
            )
            .unwrap();
        let reversed = signer
            .sign_with(
                "GET",
                &url("https://api.twitter.com/1.1/statuses/home_timeline.json?since_id=99&count=200"),
                &pairs(&[("b", "2"), ("a", "1")]),
                NONCE,
                TIMESTAMP,
            )
            .unwrap();

        assert_eq!(forward.signature(), "2eYbkLsCNJyQmJGuWKg3ibFvhuc=");
        assert_eq!(forward.signature(), reversed.signature());
    }

    #[test]
    fn fresh_signatures_differ() {
        let signer = signer();
        let target = url("https://api.twitter.com/1.1/account/verify_credentials.json");
        let first = signer.sign("GET", &target, &[]).unwrap();
        let second = signer.sign("GET", &target, &[]).unwrap();

        assert_ne!(
            first.oauth_param("oauth_nonce"),
            second.oauth_param("oauth_nonce")
        );
        assert_ne!(first.signature(), second.signature());
    }

    #[test]
    fn non_http_url_is_rejected() {
        let err = signer()
            .sign("GET", &url("ftp://api.twitter.com/file"), &[])
            .unwrap_err();
        assert!(matches!(err, TwitterError::OAuth(_)));
    }
}
