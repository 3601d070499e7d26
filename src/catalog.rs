use crate::error::{Error, Result};
use crate::service::ServiceType;
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// Which URL of a catalog endpoint to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Interface {
    Public,
    Internal,
}

impl Interface {
    /// Map the `use_internal_url` flag to an interface
    pub fn from_internal_flag(use_internal_url: bool) -> Self {
        if use_internal_url {
            Interface::Internal
        } else {
            Interface::Public
        }
    }
}

impl fmt::Display for Interface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Interface::Public => f.write_str("public"),
            Interface::Internal => f.write_str("internal"),
        }
    }
}

/// One regional endpoint of a service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Endpoint {
    #[serde(default)]
    pub region: Option<String>,

    #[serde(rename = "publicURL", default)]
    pub public_url: Option<String>,

    #[serde(rename = "internalURL", default)]
    pub internal_url: Option<String>,

    #[serde(rename = "tenantId", default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
}

impl Endpoint {
    /// URL published for the given interface
    pub fn url(&self, interface: Interface) -> Option<&str> {
        match interface {
            Interface::Public => self.public_url.as_deref(),
            Interface::Internal => self.internal_url.as_deref(),
        }
    }
}

/// A service and all its endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogEntry {
    #[serde(default)]
    pub name: String,

    #[serde(rename = "type")]
    pub service_type: ServiceType,

    #[serde(default)]
    pub endpoints: Vec<Endpoint>,
}

/// Service catalog issued alongside a token.
///
/// The catalog is read-only once received; it is replaced wholesale when the
/// token is refreshed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceCatalog {
    pub entries: Vec<CatalogEntry>,
}

impl ServiceCatalog {
    /// Create a catalog from its entries
    pub fn new(entries: Vec<CatalogEntry>) -> Self {
        ServiceCatalog { entries }
    }

    /// Check whether the catalog lists no services
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve the base URL of `service_type` in `region`.
    ///
    /// Regions are matched exactly (case-sensitive) and there is no fallback
    /// to a default region.
    pub fn resolve(
        &self,
        service_type: &ServiceType,
        region: &str,
        interface: Interface,
    ) -> Result<Url> {
        let found = self
            .entries
            .iter()
            .filter(|entry| &entry.service_type == service_type)
            .flat_map(|entry| entry.endpoints.iter())
            .filter(|endpoint| endpoint.region.as_deref() == Some(region))
            .find_map(|endpoint| endpoint.url(interface));

        match found {
            Some(raw) => Ok(Url::parse(raw)?),
            None => Err(Error::EndpointNotFound {
                service_type: service_type.clone(),
                region: region.to_string(),
                interface,
            }),
        }
    }

    /// All regions in which `service_type` is published
    pub fn regions(&self, service_type: &ServiceType) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|entry| &entry.service_type == service_type)
            .flat_map(|entry| entry.endpoints.iter())
            .filter_map(|endpoint| endpoint.region.as_deref())
            .collect()
    }
}
