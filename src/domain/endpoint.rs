//! Price stream endpoint resolution.
//!
//! Turns the configured API origin (or, failing that, the page origin the
//! dashboard is served from) into the WebSocket URL of the BTC price
//! stream, and appends the auth token as a query parameter.

use url::Url;

use crate::error::StreamError;

/// Default path of the price stream on the backend.
pub const DEFAULT_STREAM_PATH: &str = "/api/ws/btc-price";

/// Resolved WebSocket endpoint, without credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEndpoint {
    base: Url,
}

impl StreamEndpoint {
    /// Resolve the endpoint.
    ///
    /// `api_origin` wins when set and non-empty; otherwise `page_origin`
    /// is used. `http` maps to `ws`, `https` to `wss`; `ws`/`wss` are
    /// accepted as is.
    ///
    /// # Errors
    /// `StreamError::Config` for unparsable origins or other schemes.
    pub fn resolve(
        api_origin: Option<&str>,
        page_origin: &str,
        path: &str,
    ) -> Result<Self, StreamError> {
        let origin = api_origin
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .unwrap_or(page_origin);

        let mut base = Url::parse(origin)
            .map_err(|e| StreamError::Config(format!("invalid origin {origin:?}: {e}")))?;

        let scheme = match base.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => {
                return Err(StreamError::Config(format!(
                    "unsupported scheme {other:?} in origin {origin:?}"
                )));
            }
        };
        base.set_scheme(scheme)
            .map_err(|()| StreamError::Config(format!("cannot use scheme {scheme} for {origin:?}")))?;

        let prefix = base.path().trim_end_matches('/').to_string();
        let suffix = path.trim_start_matches('/');
        base.set_path(&format!("{prefix}/{suffix}"));
        base.set_query(None);
        base.set_fragment(None);

        Ok(Self { base })
    }

    /// Endpoint URL without the token.
    pub const fn base(&self) -> &Url {
        &self.base
    }

    /// Endpoint URL carrying `token` as the `token` query parameter.
    pub fn with_token(&self, token: &str) -> Url {
        let mut url = self.base.clone();
        url.query_pairs_mut().append_pair("token", token);
        url
    }
}
