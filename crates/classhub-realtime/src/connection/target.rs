//! Stream URL construction.
//!
//! The stream transport cannot attach custom headers, so the session
//! credentials travel in the URL: the token as a trailing path segment
//! (optional) and `token`, `userId`, `role` as query parameters.

use std::fmt;

use url::Url;

use classhub_core::config::AppConfig;
use classhub_core::error::AppError;
use classhub_core::result::AppResult;
use classhub_core::types::Credentials;
use classhub_core::types::identity::mask_token;

/// Path appended to the REST base URL when no stream URL is configured.
const FALLBACK_SEGMENTS: [&str; 2] = ["notifications", "stream"];

/// Fully resolved stream URL.
#[derive(Clone, PartialEq, Eq)]
pub struct StreamTarget {
    /// URL with real credentials.
    url: Url,
    /// Same URL with the token masked, for logs.
    masked: String,
}

impl StreamTarget {
    /// Resolve the stream URL for a session.
    ///
    /// `stream_url` wins when set; otherwise the URL is derived from
    /// `api_base_url`. Fails when neither yields a usable base.
    pub fn build(
        stream_url: Option<&str>,
        api_base_url: Option<&str>,
        credentials: &Credentials,
        embed_token_in_path: bool,
    ) -> AppResult<Self> {
        let base = match (stream_url.filter(|u| !u.is_empty()), api_base_url) {
            (Some(url), _) => Url::parse(url)?,
            (None, Some(api)) => derive_fallback(api)?,
            (None, None) => {
                return Err(AppError::configuration(
                    "No stream URL configured and no API base URL to derive one from",
                ));
            }
        };

        let url = with_credentials(base.clone(), &credentials.token, credentials, embed_token_in_path)?;
        let masked = with_credentials(
            base,
            &mask_token(&credentials.token),
            credentials,
            embed_token_in_path,
        )?
        .to_string();

        Ok(Self { url, masked })
    }

    /// Resolve from the `[stream]` and `[api]` configuration sections.
    pub fn from_config(config: &AppConfig, credentials: &Credentials) -> AppResult<Self> {
        Self::build(
            config.stream.url.as_deref(),
            Some(&config.api.base_url),
            credentials,
            config.stream.embed_token_in_path,
        )
    }

    /// The URL to open.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Loggable form with the token hidden.
    pub fn masked(&self) -> &str {
        &self.masked
    }
}

impl fmt::Debug for StreamTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("StreamTarget").field(&self.masked).finish()
    }
}

impl fmt::Display for StreamTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.masked)
    }
}

/// Same-origin fallback: `{api_base}/notifications/stream`.
pub fn derive_fallback(api_base_url: &str) -> AppResult<Url> {
    let mut url = Url::parse(api_base_url)?;
    url.set_query(None);
    url.set_fragment(None);
    url.path_segments_mut()
        .map_err(|()| {
            AppError::configuration(format!("API base URL '{api_base_url}' cannot be a base"))
        })?
        .pop_if_empty()
        .extend(FALLBACK_SEGMENTS);
    Ok(url)
}

fn with_credentials(
    mut url: Url,
    token: &str,
    credentials: &Credentials,
    embed_token_in_path: bool,
) -> AppResult<Url> {
    if embed_token_in_path {
        url.path_segments_mut()
            .map_err(|()| AppError::configuration("Stream URL cannot be a base"))?
            .pop_if_empty()
            .push(token);
    }
    url.query_pairs_mut()
        .append_pair("token", token)
        .append_pair("userId", &credentials.user_id)
        .append_pair("role", credentials.role.as_str());
    Ok(url)
}
