use crate::client::{create_http_client, Config};
use crate::error::{Error, Result};
use crate::response::HttpResponse;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, Method};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use url::Url;

/// An outgoing HTTP request.
///
/// Requests are plain values so they can be cloned and sent again, which the
/// authenticated handler relies on when it retries after re-authenticating.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
}

impl HttpRequest {
    /// Create a request without headers or body
    pub fn new(method: Method, url: Url) -> Self {
        HttpRequest {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    /// Add a header, failing on invalid names or values
    pub fn header(mut self, name: &str, value: &str) -> Result<Self> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| Error::RequestBuild(format!("invalid header name {}: {}", name, e)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| Error::RequestBuild(format!("invalid value for header {}: {}", name, e)))?;
        self.headers.insert(name, value);
        Ok(self)
    }

    /// Set a JSON body
    pub fn json<P: Serialize + ?Sized>(mut self, body: &P) -> Result<Self> {
        self.body = Some(serde_json::to_vec(body)?);
        self.headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(self)
    }

    /// Set a raw body
    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.body = Some(body);
        self
    }
}

/// Capability to send a request and receive a response or a transport failure.
///
/// Any status code, including errors, is a response; only failures to
/// exchange the request at all are errors.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: HttpRequest, cancel: &CancellationToken) -> Result<HttpResponse>;
}

/// [`Transport`] backed by a pooled `reqwest` client
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Create a transport using the client settings from `config`
    pub fn new(config: &Config) -> Result<Self> {
        Ok(ReqwestTransport {
            client: create_http_client(config)?,
        })
    }

    /// Wrap an existing client
    pub fn with_client(client: Client) -> Self {
        ReqwestTransport { client }
    }

    async fn exchange(&self, request: HttpRequest) -> Result<HttpResponse> {
        let mut builder = self
            .client
            .request(request.method, request.url)
            .headers(request.headers);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?.to_vec();

        Ok(HttpResponse::new(status, headers, body))
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: HttpRequest, cancel: &CancellationToken) -> Result<HttpResponse> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Cancelled),
            result = self.exchange(request) => result,
        }
    }
}
