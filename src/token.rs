use crate::catalog::ServiceCatalog;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Token issued by the identity service on successful authentication.
///
/// Tokens are never updated in place: a refresh produces a new `Token`.
#[derive(Clone, Serialize, Deserialize)]
pub struct Token {
    /// Token identifier presented on every request
    pub id: String,

    /// Expiration time, when the backend reports one
    #[serde(rename = "expires", default, with = "crate::time::optional")]
    pub expires_at: Option<DateTime<Utc>>,

    /// Tenant (project) the token is scoped to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant: Option<Tenant>,
}

impl Token {
    /// Create a new Token
    pub fn new(id: String, expires_at: Option<DateTime<Utc>>) -> Self {
        Token {
            id,
            expires_at,
            tenant: None,
        }
    }

    /// Set the tenant the token is scoped to
    pub fn with_tenant(mut self, tenant: Tenant) -> Self {
        self.tenant = Some(tenant);
        self
    }

    /// Whether the token expires within `margin` of `now`.
    /// Tokens without an expiry never expire on their own.
    pub fn is_expired(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        match self.expires_at {
            Some(expires_at) => expires_at <= now + margin,
            None => false,
        }
    }
}

// The token id is a bearer secret
impl std::fmt::Debug for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Token")
            .field("id", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .field("tenant", &self.tenant)
            .finish()
    }
}

/// Tenant (project) identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// Role granted to the authenticated user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

/// Authenticated user as reported by the identity service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Stable user identifier
    pub id: String,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub roles: Vec<Role>,

    /// Region the account defaults to (Rackspace extension)
    #[serde(
        rename = "RAX-AUTH:defaultRegion",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub default_region: Option<String>,
}

/// Everything one successful authentication returns: the token, the user it
/// belongs to and the service catalog. Cached as a unit so the token and the
/// catalog are always refreshed together.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserAccess {
    pub token: Token,
    pub user: User,
    #[serde(rename = "serviceCatalog", default)]
    pub catalog: ServiceCatalog,
}
