use crate::error::{Error, Result};
use serde_json::{json, Value};
use std::env;

/// Tenant (project) to scope the token to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TenantScope {
    Id(String),
    Name(String),
}

/// Identity used to authenticate against the identity service.
///
/// Immutable once constructed; the provider keeps its own shared copy.
#[derive(Clone)]
pub enum Credential {
    /// Username and password
    Password {
        username: String,
        password: String,
        tenant: Option<TenantScope>,
    },
    /// Username and API key (`RAX-KSKEY:apiKeyCredentials`)
    ApiKey {
        username: String,
        api_key: String,
        tenant: Option<TenantScope>,
    },
}

impl Credential {
    /// Create a password credential
    pub fn password(username: impl Into<String>, password: impl Into<String>) -> Self {
        Credential::Password {
            username: username.into(),
            password: password.into(),
            tenant: None,
        }
    }

    /// Create an API key credential
    pub fn api_key(username: impl Into<String>, api_key: impl Into<String>) -> Self {
        Credential::ApiKey {
            username: username.into(),
            api_key: api_key.into(),
            tenant: None,
        }
    }

    /// Scope the credential to a tenant
    pub fn with_tenant(mut self, scope: TenantScope) -> Self {
        match &mut self {
            Credential::Password { tenant, .. } | Credential::ApiKey { tenant, .. } => {
                *tenant = Some(scope);
            }
        }
        self
    }

    /// Load a credential from the usual `OS_*` environment variables.
    ///
    /// `OS_USERNAME` is required along with either `OS_PASSWORD` or
    /// `OS_API_KEY`. `OS_PROJECT_ID` or `OS_PROJECT_NAME` scopes the token.
    pub fn from_env() -> Result<Self> {
        let username = require_env("OS_USERNAME")?;

        let credential = match (env::var("OS_PASSWORD"), env::var("OS_API_KEY")) {
            (Ok(password), _) => Credential::password(username, password),
            (Err(_), Ok(api_key)) => Credential::api_key(username, api_key),
            (Err(_), Err(_)) => {
                return Err(Error::Config(
                    "either OS_PASSWORD or OS_API_KEY must be set".to_string(),
                ))
            }
        };

        let scope = env::var("OS_PROJECT_ID")
            .map(TenantScope::Id)
            .or_else(|_| env::var("OS_PROJECT_NAME").map(TenantScope::Name))
            .ok();

        Ok(match scope {
            Some(scope) => credential.with_tenant(scope),
            None => credential,
        })
    }

    /// Stable identifier of the user this credential authenticates
    pub fn user_identifier(&self) -> &str {
        match self {
            Credential::Password { username, .. } | Credential::ApiKey { username, .. } => {
                username
            }
        }
    }

    /// Tenant scope, if any
    pub fn tenant(&self) -> Option<&TenantScope> {
        match self {
            Credential::Password { tenant, .. } | Credential::ApiKey { tenant, .. } => {
                tenant.as_ref()
            }
        }
    }

    /// Body of the identity `tokens` request
    pub fn to_auth_request(&self) -> Value {
        let mut auth = match self {
            Credential::Password {
                username, password, ..
            } => json!({
                "passwordCredentials": {
                    "username": username,
                    "password": password,
                }
            }),
            Credential::ApiKey {
                username, api_key, ..
            } => json!({
                "RAX-KSKEY:apiKeyCredentials": {
                    "username": username,
                    "apiKey": api_key,
                }
            }),
        };

        match self.tenant() {
            Some(TenantScope::Id(id)) => auth["tenantId"] = json!(id),
            Some(TenantScope::Name(name)) => auth["tenantName"] = json!(name),
            None => {}
        }

        json!({ "auth": auth })
    }
}

fn require_env(name: &str) -> Result<String> {
    env::var(name).map_err(|_| Error::Config(format!("{} is not set", name)))
}

// Implement Debug manually to avoid exposing the secret
impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credential::Password {
                username, tenant, ..
            } => f
                .debug_struct("Password")
                .field("username", username)
                .field("password", &"<redacted>")
                .field("tenant", tenant)
                .finish(),
            Credential::ApiKey {
                username, tenant, ..
            } => f
                .debug_struct("ApiKey")
                .field("username", username)
                .field("api_key", &"<redacted>")
                .field("tenant", tenant)
                .finish(),
        }
    }
}
