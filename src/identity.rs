use crate::client::Config;
use crate::credential::Credential;
use crate::error::{Error, Result};
use crate::token::UserAccess;
use crate::transport::{HttpRequest, Transport};
use reqwest::Method;
use serde::Deserialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use url::Url;

#[derive(Deserialize)]
struct AccessEnvelope {
    access: UserAccess,
}

/// Client for the identity service `tokens` call.
///
/// Talks to the raw transport: authentication requests are never decorated
/// with a token themselves.
#[derive(Clone)]
pub struct IdentityClient {
    transport: Arc<dyn Transport>,
    tokens_url: Url,
}

impl IdentityClient {
    /// Create an identity client for the service configured in `config`
    pub fn new(config: &Config, transport: Arc<dyn Transport>) -> Result<Self> {
        Ok(IdentityClient {
            transport,
            tokens_url: config.tokens_url()?,
        })
    }

    /// Identity endpoint this client authenticates against
    pub fn endpoint(&self) -> &Url {
        &self.tokens_url
    }

    /// Exchange a credential for a token, user and service catalog
    pub async fn authenticate(
        &self,
        credential: &Credential,
        cancel: &CancellationToken,
    ) -> Result<UserAccess> {
        debug!(
            user = credential.user_identifier(),
            url = %self.tokens_url,
            "authenticating"
        );

        let request = HttpRequest::new(Method::POST, self.tokens_url.clone())
            .header("Accept", "application/json")?
            .json(&credential.to_auth_request())?;

        let response = self.transport.send(request, cancel).await?;
        if !response.is_success() {
            return Err(Error::http(response.status.as_u16(), response.text()));
        }

        let envelope: AccessEnvelope = response.json()?;
        let access = envelope.access;

        info!(
            user_id = %access.user.id,
            expires_at = ?access.token.expires_at,
            services = access.catalog.entries.len(),
            "authenticated"
        );

        Ok(access)
    }
}

impl std::fmt::Debug for IdentityClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityClient")
            .field("tokens_url", &self.tokens_url.as_str())
            .finish()
    }
}
