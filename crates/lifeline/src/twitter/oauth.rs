//! OAuth 1.0a request signing (HMAC-SHA1).

use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use sha1::Sha1;

use crate::config::OAuthCredentials;
use crate::error::{BotError, Result};

type HmacSha1 = Hmac<Sha1>;

/// RFC 3986 percent-encoding, as OAuth requires.
fn encode(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

/// Signs requests with a user-context credential set.
#[derive(Clone)]
pub struct OAuthSigner {
    credentials: OAuthCredentials,
}

impl OAuthSigner {
    #[must_use]
    pub fn new(credentials: OAuthCredentials) -> Self {
        Self { credentials }
    }

    /// `Authorization` header value for a request, with a fresh nonce and timestamp.
    ///
    /// `params` are the form-body parameters; query parameters are read from `url`.
    pub fn authorize(&self, method: &str, url: &str, params: &[(&str, &str)]) -> Result<String> {
        let nonce = uuid::Uuid::new_v4().simple().to_string();
        let timestamp = chrono::Utc::now().timestamp().to_string();
        self.authorize_with(method, url, params, &nonce, &timestamp)
    }

    /// `Authorization` header value with a caller-chosen nonce and timestamp.
    pub fn authorize_with(
        &self,
        method: &str,
        url: &str,
        params: &[(&str, &str)],
        nonce: &str,
        timestamp: &str,
    ) -> Result<String> {
        let oauth_params = [
            ("oauth_consumer_key", self.credentials.consumer_key.as_str()),
            ("oauth_nonce", nonce),
            ("oauth_signature_method", "HMAC-SHA1"),
            ("oauth_timestamp", timestamp),
            ("oauth_token", self.credentials.access_token.as_str()),
            ("oauth_version", "1.0"),
        ];

        let base = signature_base(method, url, &oauth_params, params);
        let signature = self.sign(&base)?;

        let mut header: Vec<String> = oauth_params
            .iter()
            .map(|(k, v)| format!("{}=\"{}\"", encode(k), encode(v)))
            .collect();
        header.push(format!("oauth_signature=\"{}\"", encode(&signature)));
        header.sort();
        Ok(format!("OAuth {}", header.join(", ")))
    }

    fn sign(&self, base: &str) -> Result<String> {
        let key = format!(
            "{}&{}",
            encode(&self.credentials.consumer_secret),
            encode(&self.credentials.access_token_secret)
        );
        let mut mac = HmacSha1::new_from_slice(key.as_bytes())
            .map_err(|e| BotError::Config(format!("invalid OAuth signing key: {e}")))?;
        mac.update(base.as_bytes());
        Ok(STANDARD.encode(mac.finalize().into_bytes()))
    }
}

/// Build the signature base string: method, bare URL and the sorted,
/// encoded union of OAuth, query and body parameters.
fn signature_base(
    method: &str,
    url: &str,
    oauth_params: &[(&str, &str)],
    params: &[(&str, &str)],
) -> String {
    let (bare_url, query) = url.split_once('?').unwrap_or((url, ""));

    let mut pairs: Vec<(String, String)> = oauth_params
        .iter()
        .chain(params)
        .map(|(k, v)| (encode(k), encode(v)))
        .collect();

    for pair in query.split('&').filter(|p| !p.is_empty()) {
        let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
        let k = urlencoding::decode(k).map_or_else(|_| k.to_string(), |s| s.into_owned());
        let v = urlencoding::decode(v).map_or_else(|_| v.to_string(), |s| s.into_owned());
        pairs.push((encode(&k), encode(&v)));
    }
    pairs.sort();

    let param_string = pairs
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");

    format!(
        "{}&{}&{}",
        method.to_ascii_uppercase(),
        encode(bare_url),
        encode(&param_string)
    )
}
