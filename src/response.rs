use crate::error::{Error, Result};
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use serde_json::Value;

const REQUEST_ID_HEADERS: &[&str] = &[
    "x-openstack-request-id",
    "x-compute-request-id",
    "x-request-id",
];

/// Response received from a transport, with the body fully read
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Create a new response
    pub fn new(status: StatusCode, headers: HeaderMap, body: Vec<u8>) -> Self {
        HttpResponse {
            status,
            headers,
            body,
        }
    }

    /// Check for a 2xx status
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Body as text, lossily decoded
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).to_string()
    }

    /// Request id assigned by the service, if any
    pub fn request_id(&self) -> Option<&str> {
        REQUEST_ID_HEADERS
            .iter()
            .find_map(|name| self.headers.get(*name))
            .and_then(|v| v.to_str().ok())
    }

    /// Unmarshal the body into the provided type. An empty body decodes as `null`.
    pub fn json<T>(&self) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        if self.body.is_empty() {
            return serde_json::from_value(Value::Null).map_err(Error::from);
        }
        serde_json::from_slice(&self.body).map_err(Error::from)
    }

    /// Fail with [`Error::Http`] unless the status is 2xx
    pub fn error_for_status(self) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(Error::http(self.status.as_u16(), self.text()))
        }
    }

    /// Get a value from the JSON body by a slash-separated path.
    /// For example, "server/name" would access the "name" field inside the "server" object.
    pub fn get(&self, path: &str) -> Option<Value> {
        let body: Value = serde_json::from_slice(&self.body).ok()?;
        let mut current = &body;

        for part in path.split('/').filter(|s| !s.is_empty()) {
            current = match current {
                Value::Object(map) => map.get(part)?,
                Value::Array(arr) => {
                    let index: usize = part.parse().ok()?;
                    arr.get(index)?
                }
                _ => return None,
            };
        }

        Some(current.clone())
    }

    /// Get a string value from the JSON body by a slash-separated path
    pub fn get_string(&self, path: &str) -> Option<String> {
        self.get(path).and_then(|v| v.as_str().map(|s| s.to_string()))
    }
}
