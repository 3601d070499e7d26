//! Token-decorating transport with one-shot retry on 401.
//!
//! Every request gets the current token attached. If the service answers 401
//! the token is refreshed once and the request is sent once more; whatever the
//! second attempt yields goes back to the caller. There is no third attempt.

use crate::error::{Error, Result};
use crate::provider::AuthenticationProvider;
use crate::response::HttpResponse;
use crate::transport::{HttpRequest, Transport};
use async_trait::async_trait;
use reqwest::header::HeaderValue;
use reqwest::StatusCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

/// Header carrying the token on service requests
pub const AUTH_TOKEN_HEADER: &str = "x-auth-token";

/// [`Transport`] that authenticates requests before handing them to `inner`.
///
/// Being a `Transport` itself, it can be installed in front of any other
/// transport without the callers noticing.
pub struct AuthenticatedTransport<T> {
    inner: T,
    provider: Arc<dyn AuthenticationProvider>,
}

impl<T: Transport> AuthenticatedTransport<T> {
    /// Wrap `inner`, taking tokens from `provider`
    pub fn new(inner: T, provider: Arc<dyn AuthenticationProvider>) -> Self {
        AuthenticatedTransport { inner, provider }
    }

    /// The wrapped transport
    pub fn inner(&self) -> &T {
        &self.inner
    }
}

fn authorize(mut request: HttpRequest, token: &str) -> Result<HttpRequest> {
    let mut value = HeaderValue::from_str(token)
        .map_err(|e| Error::RequestBuild(format!("token is not a valid header value: {}", e)))?;
    value.set_sensitive(true);
    request.headers.insert(AUTH_TOKEN_HEADER, value);
    Ok(request)
}

#[async_trait]
impl<T: Transport> Transport for AuthenticatedTransport<T> {
    async fn send(&self, request: HttpRequest, cancel: &CancellationToken) -> Result<HttpResponse> {
        let trace_id = Uuid::new_v4();
        let method = request.method.clone();
        let url = request.url.clone();

        let token = self.provider.get_token(cancel).await?;
        let first = authorize(request.clone(), &token)?;
        let response = self.inner.send(first, cancel).await?;

        if response.status != StatusCode::UNAUTHORIZED {
            debug!(%trace_id, %method, %url, status = %response.status, attempt = 1, "request delivered");
            return Ok(response);
        }

        warn!(%trace_id, %method, %url, "token rejected, re-authenticating");
        let token = self.provider.refresh_token(cancel).await?;
        let retry = authorize(request, &token)?;
        let response = self.inner.send(retry, cancel).await?;

        debug!(%trace_id, %method, %url, status = %response.status, attempt = 2, "request delivered");
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::ServiceType;
    use parking_lot::Mutex;
    use reqwest::header::HeaderMap;
    use reqwest::Method;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use url::Url;

    /// Provider handing out T1, then T2, ... on each refresh
    struct CountingProvider {
        refreshes: AtomicUsize,
        fail_refresh: bool,
    }

    impl CountingProvider {
        fn new() -> Arc<Self> {
            Arc::new(CountingProvider {
                refreshes: AtomicUsize::new(0),
                fail_refresh: false,
            })
        }

        fn refreshes(&self) -> usize {
            self.refreshes.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl AuthenticationProvider for CountingProvider {
        async fn get_token(&self, _cancel: &CancellationToken) -> Result<String> {
            Ok(format!("T{}", self.refreshes() + 1))
        }

        async fn refresh_token(&self, _cancel: &CancellationToken) -> Result<String> {
            if self.fail_refresh {
                return Err(Error::TokenFetch(Arc::new(Error::http(
                    503,
                    "identity unavailable".to_string(),
                ))));
            }
            let n = self.refreshes.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(format!("T{}", n + 1))
        }

        async fn get_endpoint(
            &self,
            _service_type: &ServiceType,
            _region: &str,
            _use_internal_url: bool,
            _cancel: &CancellationToken,
        ) -> Result<Url> {
            Ok(Url::parse("https://compute.example/v2")?)
        }

        async fn get_user_id(&self, _cancel: &CancellationToken) -> Result<String> {
            Ok("user-1".to_string())
        }
    }

    /// Transport replaying scripted outcomes and recording what it was sent
    struct ScriptedTransport {
        script: Mutex<VecDeque<Result<u16>>>,
        sent: Mutex<Vec<HttpRequest>>,
    }

    impl ScriptedTransport {
        fn new(script: Vec<Result<u16>>) -> Self {
            ScriptedTransport {
                script: Mutex::new(script.into()),
                sent: Mutex::new(Vec::new()),
            }
        }

        fn tokens_sent(&self) -> Vec<String> {
            self.sent
                .lock()
                .iter()
                .map(|r| r.headers[AUTH_TOKEN_HEADER].to_str().unwrap().to_string())
                .collect()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send(&self, request: HttpRequest, _cancel: &CancellationToken) -> Result<HttpResponse> {
            self.sent.lock().push(request);
            let status = self
                .script
                .lock()
                .pop_front()
                .expect("unexpected extra send")?;
            Ok(HttpResponse::new(
                StatusCode::from_u16(status).unwrap(),
                HeaderMap::new(),
                Vec::new(),
            ))
        }
    }

    fn get_request() -> HttpRequest {
        HttpRequest::new(Method::GET, Url::parse("https://compute.example/v2/servers").unwrap())
    }

    #[tokio::test]
    async fn test_success_sends_once() {
        let provider = CountingProvider::new();
        let handler = AuthenticatedTransport::new(ScriptedTransport::new(vec![Ok(200)]), provider.clone());

        let response = handler.send(get_request(), &CancellationToken::new()).await.unwrap();

        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(handler.inner().tokens_sent(), vec!["T1"]);
        assert_eq!(provider.refreshes(), 0);
    }

    #[tokio::test]
    async fn test_401_then_200_retries_once_with_new_token() {
        let provider = CountingProvider::new();
        let handler = AuthenticatedTransport::new(
            ScriptedTransport::new(vec![Ok(401), Ok(200)]),
            provider.clone(),
        );

        let response = handler.send(get_request(), &CancellationToken::new()).await.unwrap();

        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(handler.inner().tokens_sent(), vec!["T1", "T2"]);
        assert_eq!(provider.refreshes(), 1);
    }

    #[tokio::test]
    async fn test_second_401_is_returned_as_is() {
        let provider = CountingProvider::new();
        let handler = AuthenticatedTransport::new(
            ScriptedTransport::new(vec![Ok(401), Ok(401)]),
            provider.clone(),
        );

        let response = handler.send(get_request(), &CancellationToken::new()).await.unwrap();

        assert_eq!(response.status, StatusCode::UNAUTHORIZED);
        assert_eq!(handler.inner().sent.lock().len(), 2);
        assert_eq!(provider.refreshes(), 1);
    }

    #[tokio::test]
    async fn test_other_errors_are_not_retried() {
        for status in [403, 404, 500, 503] {
            let provider = CountingProvider::new();
            let handler = AuthenticatedTransport::new(
                ScriptedTransport::new(vec![Ok(status)]),
                provider.clone(),
            );

            let response = handler.send(get_request(), &CancellationToken::new()).await.unwrap();

            assert_eq!(response.status.as_u16(), status);
            assert_eq!(handler.inner().sent.lock().len(), 1);
            assert_eq!(provider.refreshes(), 0);
        }
    }

    #[tokio::test]
    async fn test_failed_refresh_skips_resend() {
        let provider = Arc::new(CountingProvider {
            refreshes: AtomicUsize::new(0),
            fail_refresh: true,
        });
        let handler = AuthenticatedTransport::new(ScriptedTransport::new(vec![Ok(401)]), provider);

        let err = handler
            .send(get_request(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::TokenFetch(_)));
        assert_eq!(err.status_code(), Some(503));
        assert_eq!(handler.inner().sent.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_transport_failure_propagates() {
        let provider = CountingProvider::new();
        let handler = AuthenticatedTransport::new(
            ScriptedTransport::new(vec![Ok(401), Err(Error::Other("connection reset".to_string()))]),
            provider,
        );

        let err = handler
            .send(get_request(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "connection reset");
    }

    #[tokio::test]
    async fn test_retry_preserves_request() {
        let provider = CountingProvider::new();
        let handler = AuthenticatedTransport::new(
            ScriptedTransport::new(vec![Ok(401), Ok(202)]),
            provider,
        );
        let request = HttpRequest::new(
            Method::POST,
            Url::parse("https://compute.example/v2/servers").unwrap(),
        )
        .header("X-Trace", "abc")
        .unwrap()
        .json(&serde_json::json!({"server": {"name": "web"}}))
        .unwrap();

        handler.send(request.clone(), &CancellationToken::new()).await.unwrap();

        let sent = handler.inner().sent.lock();
        for attempt in sent.iter() {
            assert_eq!(attempt.method, Method::POST);
            assert_eq!(attempt.url, request.url);
            assert_eq!(attempt.headers["x-trace"], "abc");
            assert_eq!(attempt.body, request.body);
        }
    }

    #[test]
    fn test_token_header_is_sensitive() {
        let request = authorize(get_request(), "T1").unwrap();
        assert!(request.headers[AUTH_TOKEN_HEADER].is_sensitive());
    }
}
