use crate::error::Result;
use crate::handler::AuthenticatedTransport;
use crate::provider::AuthenticationProvider;
use crate::response::HttpResponse;
use crate::service::ServiceType;
use crate::transport::{HttpRequest, Transport};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

/// Client for one service in one region.
///
/// Resolves the service's base URL from the catalog on every call (so a
/// refreshed catalog is picked up) and sends through an
/// [`AuthenticatedTransport`].
pub struct ServiceClient {
    transport: Arc<dyn Transport>,
    provider: Arc<dyn AuthenticationProvider>,
    service_type: ServiceType,
    region: String,
    use_internal_url: bool,
}

impl ServiceClient {
    /// Create a client for `service_type` in `region`, sending through `transport`
    pub fn new<T>(
        provider: Arc<dyn AuthenticationProvider>,
        transport: T,
        service_type: ServiceType,
        region: impl Into<String>,
    ) -> Self
    where
        T: Transport + 'static,
    {
        let transport = Arc::new(AuthenticatedTransport::new(transport, Arc::clone(&provider)));
        ServiceClient {
            transport,
            provider,
            service_type,
            region: region.into(),
            use_internal_url: false,
        }
    }

    /// Use the catalog's internal URL instead of the public one
    pub fn with_internal_url(mut self, use_internal_url: bool) -> Self {
        self.use_internal_url = use_internal_url;
        self
    }

    /// Service type this client talks to
    pub fn service_type(&self) -> &ServiceType {
        &self.service_type
    }

    /// Region this client talks to
    pub fn region(&self) -> &str {
        &self.region
    }

    /// Base URL of the service
    pub async fn endpoint(&self, cancel: &CancellationToken) -> Result<Url> {
        self.provider
            .get_endpoint(&self.service_type, &self.region, self.use_internal_url, cancel)
            .await
    }

    /// Build a request for `path` relative to the service endpoint
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        cancel: &CancellationToken,
    ) -> Result<HttpRequest> {
        let base = self.endpoint(cancel).await?;
        let url = Url::parse(&format!(
            "{}/{}",
            base.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        ))?;

        HttpRequest::new(method, url).header("Accept", "application/json")
    }

    /// Send a prepared request through the authenticated pipeline
    pub async fn send(&self, request: HttpRequest, cancel: &CancellationToken) -> Result<HttpResponse> {
        self.transport.send(request, cancel).await
    }

    /// Execute a request and return the raw response, whatever its status
    ///
    /// # Arguments
    /// * `method` - HTTP method
    /// * `path` - Path relative to the service endpoint
    /// * `body` - Optional JSON body
    pub async fn do_request<P>(
        &self,
        method: Method,
        path: &str,
        body: Option<&P>,
        cancel: &CancellationToken,
    ) -> Result<HttpResponse>
    where
        P: Serialize + ?Sized,
    {
        let mut request = self.request(method, path, cancel).await?;
        if let Some(body) = body {
            request = request.json(body)?;
        }

        let start = std::time::Instant::now();
        let method = request.method.clone();
        let response = self.send(request, cancel).await?;

        debug!(
            service = %self.service_type,
            region = %self.region,
            %method,
            path,
            status = %response.status,
            request_id = response.request_id().unwrap_or("-"),
            elapsed = ?start.elapsed(),
            "service request"
        );

        Ok(response)
    }

    /// Execute a request and unmarshal the response body into the target type.
    /// Non-2xx responses become [`crate::Error::Http`].
    pub async fn apply<T, P>(
        &self,
        method: Method,
        path: &str,
        body: Option<&P>,
        cancel: &CancellationToken,
    ) -> Result<T>
    where
        T: DeserializeOwned,
        P: Serialize + ?Sized,
    {
        self.do_request(method, path, body, cancel)
            .await?
            .error_for_status()?
            .json()
    }

    /// GET `path` and unmarshal the response body
    pub async fn get<T>(&self, path: &str, cancel: &CancellationToken) -> Result<T>
    where
        T: DeserializeOwned,
    {
        self.apply::<T, ()>(Method::GET, path, None, cancel).await
    }
}

impl std::fmt::Debug for ServiceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceClient")
            .field("service_type", &self.service_type)
            .field("region", &self.region)
            .field("use_internal_url", &self.use_internal_url)
            .finish()
    }
}
