use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Category of backend API listed in the service catalog.
///
/// Known types are matched case-insensitively, including the aliases that
/// different deployments publish. Anything else is kept verbatim in
/// [`ServiceType::Other`] so new services can be addressed without a release.
#[derive(Debug, Clone, Eq)]
pub enum ServiceType {
    Compute,
    Networking,
    ObjectStorage,
    BlockStorage,
    Dns,
    ContentDelivery,
    Identity,
    /// A service type this crate has no name for
    Other(String),
}

impl ServiceType {
    /// Canonical catalog name of this service type
    pub fn as_str(&self) -> &str {
        match self {
            ServiceType::Compute => "compute",
            ServiceType::Networking => "network",
            ServiceType::ObjectStorage => "object-store",
            ServiceType::BlockStorage => "volume",
            ServiceType::Dns => "dns",
            ServiceType::ContentDelivery => "cdn",
            ServiceType::Identity => "identity",
            ServiceType::Other(raw) => raw,
        }
    }

    fn from_catalog_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "compute" => ServiceType::Compute,
            "network" | "networking" => ServiceType::Networking,
            "object-store" | "object-storage" => ServiceType::ObjectStorage,
            "volume" | "volumev2" | "volumev3" | "block-storage" | "block-store" => {
                ServiceType::BlockStorage
            }
            "dns" | "rax:dns" => ServiceType::Dns,
            "cdn" | "rax:object-cdn" => ServiceType::ContentDelivery,
            "identity" => ServiceType::Identity,
            _ => ServiceType::Other(name.to_string()),
        }
    }
}

impl ServiceType {
    /// Lowercase name two equal service types share, however they were built
    fn canonical(&self) -> std::borrow::Cow<'_, str> {
        match self {
            ServiceType::Other(raw) => match ServiceType::from_catalog_name(raw) {
                ServiceType::Other(_) => raw.to_ascii_lowercase().into(),
                known => known.as_str().to_string().into(),
            },
            known => known.as_str().into(),
        }
    }
}

impl PartialEq for ServiceType {
    fn eq(&self, other: &Self) -> bool {
        self.canonical() == other.canonical()
    }
}

impl std::hash::Hash for ServiceType {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.canonical().hash(state);
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(ServiceType::from_catalog_name(s))
    }
}

impl From<&str> for ServiceType {
    fn from(s: &str) -> Self {
        ServiceType::from_catalog_name(s)
    }
}

impl From<String> for ServiceType {
    fn from(s: String) -> Self {
        ServiceType::from_catalog_name(&s)
    }
}

impl Serialize for ServiceType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ServiceType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(ServiceType::from_catalog_name(&raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_aliases() {
        assert_eq!(ServiceType::from("Compute"), ServiceType::Compute);
        assert_eq!(ServiceType::from("volumev2"), ServiceType::BlockStorage);
        assert_eq!(ServiceType::from("rax:object-cdn"), ServiceType::ContentDelivery);
        assert_eq!(ServiceType::from("NETWORK"), ServiceType::Networking);
    }

    #[test]
    fn test_unknown_type_compares_case_insensitively() {
        let a = ServiceType::from("rax:monitor");
        let b = ServiceType::from("RAX:Monitor");
        assert_eq!(a, b);
        assert_ne!(a, ServiceType::Compute);
        // the raw spelling is preserved
        assert_eq!(b.to_string(), "RAX:Monitor");
    }

    #[test]
    fn test_hand_built_other_matches_known() {
        use std::collections::HashSet;

        let raw = ServiceType::Other("Compute".to_string());
        assert_eq!(raw, ServiceType::Compute);
        assert_eq!(ServiceType::Other("volumev3".into()), ServiceType::BlockStorage);

        let set: HashSet<_> = [ServiceType::Compute, raw, ServiceType::from("compute".to_string())]
            .into_iter()
            .collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_deserialize_from_catalog_string() {
        let parsed: ServiceType = serde_json::from_str("\"object-store\"").unwrap();
        assert_eq!(parsed, ServiceType::ObjectStorage);
        assert_eq!(serde_json::to_string(&parsed).unwrap(), "\"object-store\"");
    }
}
