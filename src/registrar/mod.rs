pub mod regru;

use std::{
    fmt::{self, Debug, Display, Formatter},
    net::Ipv4Addr,
};
use serde::Serialize;

/// Zone operations the reconciler drives.
///
/// `Err` means the call itself failed (transport, status, decoding) and the
/// run must stop. An application-level rejection is an `Ok(ApiResult::Failure)`.
#[cfg_attr(test, mockall::automock(type Error = MockTransportError;))]
#[async_trait::async_trait]
pub trait Registrar: Send + Sync {
    type Error: std::error::Error + Send;

    async fn test_credentials(&self, creds: &Credentials) -> Result<ApiResult, Self::Error>;
    async fn clear_zone(&self, creds: &Credentials, domain: &str) -> Result<ApiResult, Self::Error>;
    async fn add_alias(
        &self,
        creds: &Credentials,
        domain: &str,
        subdomain: &str,
        ip: Ipv4Addr,
    ) -> Result<ApiResult, Self::Error>;
    async fn add_cname(
        &self,
        creds: &Credentials,
        domain: &str,
        subdomain: &str,
        canonical_name: &str,
    ) -> Result<ApiResult, Self::Error>;
    async fn get_resource_records(
        &self,
        creds: &Credentials,
        domain: &str,
    ) -> Result<ApiResult<Vec<RemoteRecord>>, Self::Error>;
}

#[cfg(test)]
#[derive(Debug, thiserror::Error)]
#[error("mock transport failure")]
pub struct MockTransportError;

#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl Debug for Credentials {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Outcome of a single well-formed API response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiResult<T = ()> {
    Success(T),
    Failure(Option<String>),
}

impl<T> ApiResult<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, ApiResult::Success(_))
    }

    /// Error text for display, `"Unknown error"` when the server gave none.
    pub fn error_message(&self) -> Option<&str> {
        match self {
            ApiResult::Success(_) => None,
            ApiResult::Failure(msg) => Some(msg.as_deref().unwrap_or("Unknown error")),
        }
    }
}

/// A resource record as reported by the registrar.
///
/// Every field is optional: records are read field by field so an unexpected
/// shape never fails the listing.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RemoteRecord {
    pub rectype: Option<String>,
    pub subdomain: Option<String>,
    pub content: Option<String>,
    pub ipaddr: Option<String>,
}

impl RemoteRecord {
    /// Reads `type`/`subdomain` with the `rectype`/`subname` spellings the
    /// live API uses as fallbacks.
    pub fn from_json(value: &serde_json::Value) -> Self {
        let field = |keys: &[&str]| {
            keys.iter()
                .filter_map(|k| value.get(k))
                .find(|v| !v.is_null())
                .map(|v| match v.as_str() {
                    Some(s) => s.to_owned(),
                    None => v.to_string(),
                })
        };

        Self {
            rectype: field(&["type", "rectype"]),
            subdomain: field(&["subdomain", "subname"]),
            content: field(&["content"]),
            ipaddr: field(&["ipaddr"]),
        }
    }

    pub fn rectype(&self) -> &str {
        self.rectype.as_deref().unwrap_or("None")
    }

    pub fn name(&self) -> &str {
        self.subdomain.as_deref().unwrap_or("@")
    }

    pub fn value(&self) -> &str {
        self.content
            .as_deref()
            .or(self.ipaddr.as_deref())
            .unwrap_or_default()
    }
}

impl Display for RemoteRecord {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} → {}", self.rectype(), self.name(), self.value())
    }
}
