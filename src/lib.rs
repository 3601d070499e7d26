//! # osclient - authenticated request pipeline for OpenStack-style clouds
//!
//! This crate handles the part of a cloud API client that every service
//! shares: authenticating against the identity service, caching the token and
//! service catalog, resolving service endpoints by type and region, and
//! transparently re-authenticating when a token is rejected.
//!
//! ## Features
//!
//! - Token cache with at most one identity call in flight per user
//! - Endpoint resolution from the service catalog (public or internal URLs)
//! - Request handler that retries exactly once after a 401
//! - Password and API key credentials
//! - Explicit configuration, no global state
//!
//! ## Basic Usage
//!
//! ```no_run
//! use osclient::{
//!     CancellationToken, Config, Credential, IdentityProvider, ReqwestTransport, ServiceClient,
//!     ServiceType,
//! };
//! use serde_json::Value;
//! use std::sync::Arc;
//!
//! # async fn run() -> osclient::Result<()> {
//! let config = Config::new("https://identity.example.com/v2.0".parse()?);
//! let transport = ReqwestTransport::new(&config)?;
//!
//! let provider = Arc::new(IdentityProvider::new(
//!     &config,
//!     Credential::password("alice", "s3cret"),
//!     Arc::new(transport.clone()),
//! )?);
//!
//! let compute = ServiceClient::new(provider, transport, ServiceType::Compute, "RegionOne");
//! let servers: Value = compute.get("servers", &CancellationToken::new()).await?;
//! println!("{}", servers);
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod catalog;
pub mod client;
pub mod credential;
pub mod error;
pub mod handler;
pub mod identity;
pub mod provider;
pub mod response;
pub mod rest;
pub mod service;
pub mod time;
pub mod token;
pub mod transport;

// Re-export main types for convenience
pub use cache::{CacheEntry, CacheKey, TokenCache};
pub use catalog::{CatalogEntry, Endpoint, Interface, ServiceCatalog};
pub use client::{create_http_client, Config};
pub use credential::{Credential, TenantScope};
pub use error::{Error, Result};
pub use handler::{AuthenticatedTransport, AUTH_TOKEN_HEADER};
pub use identity::IdentityClient;
pub use provider::{AccessCache, AuthenticationProvider, IdentityProvider};
pub use response::HttpResponse;
pub use rest::ServiceClient;
pub use service::ServiceType;
pub use token::{Role, Tenant, Token, User, UserAccess};
pub use transport::{HttpRequest, ReqwestTransport, Transport};

// Re-export for callers building requests
pub use reqwest::{Method, StatusCode};
pub use tokio_util::sync::CancellationToken;
