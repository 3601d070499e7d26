use crate::cache::{CacheKey, TokenCache};
use crate::catalog::Interface;
use crate::client::Config;
use crate::credential::Credential;
use crate::error::Result;
use crate::identity::IdentityClient;
use crate::service::ServiceType;
use crate::token::UserAccess;
use crate::transport::Transport;
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

/// Source of tokens and service endpoints for request pipelines.
///
/// One provider is typically shared by every client of an application;
/// implementations must be safe to call concurrently.
#[async_trait]
pub trait AuthenticationProvider: Send + Sync {
    /// Current token id, authenticating first if nothing valid is cached
    async fn get_token(&self, cancel: &CancellationToken) -> Result<String>;

    /// Authenticate again, bypassing the cache, and return the new token id
    async fn refresh_token(&self, cancel: &CancellationToken) -> Result<String>;

    /// Base URL of `service_type` in `region`
    async fn get_endpoint(
        &self,
        service_type: &ServiceType,
        region: &str,
        use_internal_url: bool,
        cancel: &CancellationToken,
    ) -> Result<Url>;

    /// Stable identifier of the authenticated user
    async fn get_user_id(&self, cancel: &CancellationToken) -> Result<String>;
}

/// Shared cache of identity responses
pub type AccessCache = TokenCache<Arc<UserAccess>>;

/// [`AuthenticationProvider`] backed by the identity service.
///
/// Token, user and catalog come from one cached [`UserAccess`], so endpoint
/// lookups always use the catalog issued with the current token.
#[derive(Debug)]
pub struct IdentityProvider {
    identity: IdentityClient,
    credential: Arc<Credential>,
    cache: Arc<AccessCache>,
    key: CacheKey,
}

impl IdentityProvider {
    /// Create a provider with its own cache
    pub fn new(config: &Config, credential: Credential, transport: Arc<dyn Transport>) -> Result<Self> {
        let identity = IdentityClient::new(config, transport)?;
        let key = CacheKey::new(identity.endpoint().as_str(), credential.user_identifier());

        Ok(IdentityProvider {
            identity,
            credential: Arc::new(credential),
            cache: Arc::new(TokenCache::new(config.token_refresh_margin)),
            key,
        })
    }

    /// Use a cache shared with other providers. Providers authenticating the
    /// same user against the same identity endpoint then share one token.
    pub fn with_cache(mut self, cache: Arc<AccessCache>) -> Self {
        self.cache = cache;
        self
    }

    /// Key under which this provider's token is cached
    pub fn cache_key(&self) -> &CacheKey {
        &self.key
    }

    /// Cached identity response, fetched when missing or when `force_refresh` is set
    pub async fn user_access(
        &self,
        force_refresh: bool,
        cancel: &CancellationToken,
    ) -> Result<Arc<UserAccess>> {
        let identity = self.identity.clone();
        let credential = Arc::clone(&self.credential);

        self.cache
            .get(
                &self.key,
                move || async move {
                    // the fetch is shared, so it must not follow any one caller's cancellation
                    identity
                        .authenticate(&credential, &CancellationToken::new())
                        .await
                        .map(Arc::new)
                },
                force_refresh,
                cancel,
            )
            .await
    }
}

#[async_trait]
impl AuthenticationProvider for IdentityProvider {
    async fn get_token(&self, cancel: &CancellationToken) -> Result<String> {
        Ok(self.user_access(false, cancel).await?.token.id.clone())
    }

    async fn refresh_token(&self, cancel: &CancellationToken) -> Result<String> {
        debug!(key = %self.key, "forcing token refresh");
        Ok(self.user_access(true, cancel).await?.token.id.clone())
    }

    async fn get_endpoint(
        &self,
        service_type: &ServiceType,
        region: &str,
        use_internal_url: bool,
        cancel: &CancellationToken,
    ) -> Result<Url> {
        let access = self.user_access(false, cancel).await?;
        access
            .catalog
            .resolve(service_type, region, Interface::from_internal_flag(use_internal_url))
    }

    async fn get_user_id(&self, cancel: &CancellationToken) -> Result<String> {
        Ok(self.user_access(false, cancel).await?.user.id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::response::HttpResponse;
    use crate::transport::HttpRequest;
    use reqwest::header::HeaderMap;
    use reqwest::StatusCode;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Identity backend that issues T1, T2, ... on successive calls
    struct FakeIdentity {
        calls: AtomicUsize,
        reject: bool,
    }

    impl FakeIdentity {
        fn new() -> Arc<Self> {
            Arc::new(FakeIdentity {
                calls: AtomicUsize::new(0),
                reject: false,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Transport for FakeIdentity {
        async fn send(&self, request: HttpRequest, _cancel: &CancellationToken) -> Result<HttpResponse> {
            assert!(request.url.as_str().ends_with("/v2.0/tokens"));
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;

            if self.reject {
                return Ok(HttpResponse::new(
                    StatusCode::UNAUTHORIZED,
                    HeaderMap::new(),
                    b"{\"unauthorized\": {\"code\": 401}}".to_vec(),
                ));
            }

            let expires = (chrono::Utc::now() + chrono::Duration::seconds(3600)).to_rfc3339();
            let body = serde_json::json!({
                "access": {
                    "token": {"id": format!("T{}", n), "expires": expires},
                    "user": {"id": "user-1", "name": "alice"},
                    "serviceCatalog": [{
                        "name": "nova",
                        "type": "compute",
                        "endpoints": [{
                            "region": "RegionOne",
                            "publicURL": "https://compute.example/v2",
                            "internalURL": "http://compute.internal/v2"
                        }]
                    }]
                }
            });
            Ok(HttpResponse::new(
                StatusCode::OK,
                HeaderMap::new(),
                serde_json::to_vec(&body)?,
            ))
        }
    }

    fn provider(identity: Arc<FakeIdentity>) -> IdentityProvider {
        let config = Config::new(Url::parse("https://identity.example/v2.0").unwrap());
        IdentityProvider::new(&config, Credential::password("alice", "s3cret"), identity).unwrap()
    }

    #[tokio::test]
    async fn test_token_is_cached() {
        let identity = FakeIdentity::new();
        let provider = provider(identity.clone());
        let cancel = CancellationToken::new();

        assert_eq!(provider.get_token(&cancel).await.unwrap(), "T1");
        assert_eq!(provider.get_token(&cancel).await.unwrap(), "T1");
        assert_eq!(identity.calls(), 1);
    }

    #[tokio::test]
    async fn test_refresh_bypasses_cache() {
        let identity = FakeIdentity::new();
        let provider = provider(identity.clone());
        let cancel = CancellationToken::new();

        assert_eq!(provider.get_token(&cancel).await.unwrap(), "T1");
        assert_eq!(provider.refresh_token(&cancel).await.unwrap(), "T2");
        assert_eq!(provider.get_token(&cancel).await.unwrap(), "T2");
        assert_eq!(identity.calls(), 2);
    }

    #[tokio::test]
    async fn test_get_endpoint() {
        let identity = FakeIdentity::new();
        let provider = provider(identity.clone());
        let cancel = CancellationToken::new();

        let public = provider
            .get_endpoint(&ServiceType::Compute, "RegionOne", false, &cancel)
            .await
            .unwrap();
        assert_eq!(public.as_str(), "https://compute.example/v2");

        let internal = provider
            .get_endpoint(&ServiceType::Compute, "RegionOne", true, &cancel)
            .await
            .unwrap();
        assert_eq!(internal.as_str(), "http://compute.internal/v2");

        let err = provider
            .get_endpoint(&ServiceType::Compute, "RegionTwo", false, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::EndpointNotFound { .. }));

        // a failed lookup neither re-authenticates nor disturbs the catalog
        assert_eq!(identity.calls(), 1);
        assert!(provider
            .get_endpoint(&ServiceType::Compute, "RegionOne", false, &cancel)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_get_user_id_authenticates() {
        let identity = FakeIdentity::new();
        let provider = provider(identity.clone());

        let user_id = provider.get_user_id(&CancellationToken::new()).await.unwrap();
        assert_eq!(user_id, "user-1");
        assert_eq!(identity.calls(), 1);
    }

    #[tokio::test]
    async fn test_rejected_credentials() {
        let identity = Arc::new(FakeIdentity {
            calls: AtomicUsize::new(0),
            reject: true,
        });
        let provider = provider(identity.clone());

        let err = provider.get_token(&CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, Error::TokenFetch(_)));
        assert!(err.is_unauthorized());
    }

    #[tokio::test]
    async fn test_shared_cache_across_providers() {
        let identity = FakeIdentity::new();
        let cache = Arc::new(AccessCache::default());
        let first = provider(identity.clone()).with_cache(cache.clone());
        let second = provider(identity.clone()).with_cache(cache.clone());
        let cancel = CancellationToken::new();

        assert_eq!(first.cache_key(), second.cache_key());
        assert_eq!(first.get_token(&cancel).await.unwrap(), "T1");
        assert_eq!(second.get_token(&cancel).await.unwrap(), "T1");
        assert_eq!(identity.calls(), 1);
        assert_eq!(cache.len(), 1);
    }
}
