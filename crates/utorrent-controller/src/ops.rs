//! Internal trait abstracting the HTTP exchanges with the daemon.
//!
//! This module provides the [`WebUiOps`] trait which abstracts the underlying
//! HTTP client, enabling mocking in tests, and [`HttpTransport`], its `reqwest`
//! implementation.

use reqwest::{
    RequestBuilder, Response,
    header::{COOKIE, SET_COOKIE},
    multipart::{Form, Part},
};
use thiserror::Error;
use url::Url;

use crate::config::ClientConfig;

/// Name of the session cookie issued with the token.
pub(crate) const GUID_COOKIE: &str = "GUID";

/// Multipart field carrying an uploaded .torrent file.
const TORRENT_FILE_FIELD: &str = "torrent_file";

/// Authentication attached to a single request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct RequestAuth {
    pub(crate) username: Option<String>,
    pub(crate) password: Option<String>,
    /// Value of the `GUID` cookie.
    pub(crate) cookie: Option<String>,
}

impl RequestAuth {
    fn apply(&self, request: RequestBuilder) -> RequestBuilder {
        let request = match &self.username {
            Some(username) => request.basic_auth(username, self.password.as_deref()),
            None => request,
        };
        match &self.cookie {
            Some(cookie) => request.header(COOKIE, format!("{GUID_COOKIE}={cookie}")),
            None => request,
        }
    }
}

/// A daemon response with its body already decoded as UTF-8.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RawResponse {
    pub(crate) status: u16,
    pub(crate) body: String,
    /// `GUID` value from the response's `Set-Cookie` headers, if any.
    pub(crate) guid: Option<String>,
}

/// Connection-level failure of an exchange.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub(crate) enum TransportFault {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("{0}")]
    Other(String),
}

impl From<reqwest::Error> for TransportFault {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else if err.is_connect() {
            Self::Connect(err.to_string())
        } else {
            Self::Other(err.to_string())
        }
    }
}

/// Internal trait that abstracts the HTTP exchanges with the daemon.
/// This allows for mocking in tests.
#[cfg_attr(test, mockall::automock)]
#[allow(async_fn_in_trait)]
pub(crate) trait WebUiOps {
    async fn get(&self, url: &Url, auth: &RequestAuth) -> Result<RawResponse, TransportFault>;
    async fn post_torrent_file(
        &self,
        url: &Url,
        auth: &RequestAuth,
        file_name: String,
        contents: Vec<u8>,
    ) -> Result<RawResponse, TransportFault>;
}

/// HTTP transport backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Build the underlying HTTP client from the configuration.
    pub(crate) fn new(config: &ClientConfig) -> Result<Self, TransportFault> {
        let mut builder = reqwest::Client::builder().timeout(config.request_timeout);
        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent);
        }
        Ok(Self {
            client: builder.build()?,
        })
    }
}

impl WebUiOps for HttpTransport {
    async fn get(&self, url: &Url, auth: &RequestAuth) -> Result<RawResponse, TransportFault> {
        let response = auth.apply(self.client.get(url.clone())).send().await?;
        read_response(response).await
    }

    async fn post_torrent_file(
        &self,
        url: &Url,
        auth: &RequestAuth,
        file_name: String,
        contents: Vec<u8>,
    ) -> Result<RawResponse, TransportFault> {
        let part = Part::bytes(contents)
            .file_name(file_name)
            .mime_str("application/x-bittorrent")?;
        let form = Form::new().part(TORRENT_FILE_FIELD, part);

        let response = auth
            .apply(self.client.post(url.clone()))
            .multipart(form)
            .send()
            .await?;
        read_response(response).await
    }
}

async fn read_response(response: Response) -> Result<RawResponse, TransportFault> {
    let status = response.status().as_u16();
    let guid = response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find_map(parse_guid);

    // The daemon's declared charset is unreliable, the body is always UTF-8.
    let bytes = response.bytes().await?;
    Ok(RawResponse {
        status,
        body: String::from_utf8_lossy(&bytes).into_owned(),
        guid,
    })
}

/// Extract the `GUID` value from one `Set-Cookie` header.
pub(crate) fn parse_guid(set_cookie: &str) -> Option<String> {
    let pair = set_cookie.split(';').next()?;
    let (name, value) = pair.split_once('=')?;
    let value = value.trim();
    (name.trim() == GUID_COOKIE && !value.is_empty()).then(|| value.to_owned())
}
