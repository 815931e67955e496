use std::{net::Ipv4Addr, time::Duration};
use reqwest::{Client, IntoUrl, StatusCode, Url};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use super::{ApiResult, Credentials, RemoteRecord};

pub const DEFAULT_API_URL: &str = "https://api.reg.ru/api/regru2/";

const RESULT_SUCCESS: &str = "success";

/// Client for the reg.ru `regru2` JSON API.
#[derive(Debug)]
pub struct RegRuClient {
    base_url: Url,
    client: Client,
}

impl RegRuClient {
    pub fn new<U: IntoUrl>(url: U, timeout: Option<Duration>) -> Result<Self, RegRuError> {
        let mut base_url = url.into_url()?;

        if base_url.cannot_be_a_base() {
            return Err(RegRuError::BadBaseUrl);
        }

        // Endpoints are joined relative to the base, which drops the last
        // segment unless the path ends with a slash.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            base_url,
            client: builder.build()?,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    async fn call<P: Serialize>(&self, endpoint: &str, payload: &P) -> Result<Envelope, RegRuError> {
        let url = self.base_url.join(endpoint)?;
        let input_data = serde_json::to_string(payload)?;

        debug!(%url, "POST {}", endpoint);
        let response = self.client.post(url)
            .form(&[
                ("input_format", "json"),
                ("input_data", input_data.as_str()),
                ("output_format", "json"),
            ])
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(RegRuError::UnexpectedStatus { status, body });
        }

        let envelope = response.json::<Envelope>().await?;
        debug!(result = ?envelope.result, error = ?envelope.error, "{} answered", endpoint);

        Ok(envelope)
    }
}

#[async_trait::async_trait]
impl super::Registrar for RegRuClient {
    type Error = RegRuError;

    #[tracing::instrument(skip_all)]
    async fn test_credentials(&self, creds: &Credentials) -> Result<ApiResult, Self::Error> {
        let payload = NopRequest {
            auth: creds,
            output_content_type: "json",
        };
        Ok(self.call("nop", &payload).await?.into_unit())
    }

    #[tracing::instrument(skip(self, creds))]
    async fn clear_zone(&self, creds: &Credentials, domain: &str) -> Result<ApiResult, Self::Error> {
        let payload = ClearRequest {
            auth: creds,
            domain_name: domain,
        };
        Ok(self.call("zone/clear", &payload).await?.into_unit())
    }

    #[tracing::instrument(skip(self, creds))]
    async fn add_alias(
        &self,
        creds: &Credentials,
        domain: &str,
        subdomain: &str,
        ip: Ipv4Addr,
    ) -> Result<ApiResult, Self::Error> {
        let payload = AddAliasRequest {
            auth: creds,
            domains: [DomainRef { dname: domain }],
            subdomain,
            ipaddr: ip,
        };
        Ok(self.call("zone/add_alias", &payload).await?.into_unit())
    }

    #[tracing::instrument(skip(self, creds))]
    async fn add_cname(
        &self,
        creds: &Credentials,
        domain: &str,
        subdomain: &str,
        canonical_name: &str,
    ) -> Result<ApiResult, Self::Error> {
        let payload = AddCnameRequest {
            auth: creds,
            domains: [DomainRef { dname: domain }],
            subdomain,
            canonical_name,
        };
        Ok(self.call("zone/add_cname", &payload).await?.into_unit())
    }

    #[tracing::instrument(skip(self, creds))]
    async fn get_resource_records(
        &self,
        creds: &Credentials,
        domain: &str,
    ) -> Result<ApiResult<Vec<RemoteRecord>>, Self::Error> {
        let payload = ListRequest {
            auth: creds,
            domains: [DomainRef { dname: domain }],
        };
        let envelope = self.call("zone/get_resource_records", &payload).await?;
        if !envelope.is_success() {
            return Ok(ApiResult::Failure(envelope.into_error()));
        }

        let records: Vec<_> = envelope.answer
            .as_ref()
            .and_then(|a| a.get(domain))
            .and_then(|zone| zone.get("rrs"))
            .and_then(|rrs| rrs.as_array())
            .map(|rrs| rrs.iter().map(RemoteRecord::from_json).collect())
            .unwrap_or_default();
        debug!(?records, "got {} records from reg.ru", records.len());

        Ok(ApiResult::Success(records))
    }
}

#[derive(Debug, Error)]
pub enum RegRuError {
    #[error(transparent)]
    ReqwestError(#[from] reqwest::Error),
    #[error("bad base url")]
    BadBaseUrl,
    #[error(transparent)]
    UrlParseError(#[from] url::ParseError),
    #[error(transparent)]
    JsonError(#[from] serde_json::Error),
    #[error("API request failed with status {status}: {body}")]
    UnexpectedStatus { status: StatusCode, body: String },
}

#[derive(Debug, Deserialize)]
struct Envelope {
    result: Option<String>,
    error: Option<String>,
    error_text: Option<String>,
    answer: Option<serde_json::Value>,
}

impl Envelope {
    fn is_success(&self) -> bool {
        self.result.as_deref() == Some(RESULT_SUCCESS)
    }

    fn into_error(self) -> Option<String> {
        self.error.or(self.error_text)
    }

    fn into_unit(self) -> ApiResult {
        if self.is_success() {
            ApiResult::Success(())
        } else {
            ApiResult::Failure(self.into_error())
        }
    }
}

#[derive(Serialize)]
struct DomainRef<'a> {
    dname: &'a str,
}

#[derive(Serialize)]
struct NopRequest<'a> {
    #[serde(flatten)]
    auth: &'a Credentials,
    output_content_type: &'a str,
}

#[derive(Serialize)]
struct ClearRequest<'a> {
    #[serde(flatten)]
    auth: &'a Credentials,
    domain_name: &'a str,
}

#[derive(Serialize)]
struct AddAliasRequest<'a> {
    #[serde(flatten)]
    auth: &'a Credentials,
    domains: [DomainRef<'a>; 1],
    subdomain: &'a str,
    ipaddr: Ipv4Addr,
}

#[derive(Serialize)]
struct AddCnameRequest<'a> {
    #[serde(flatten)]
    auth: &'a Credentials,
    domains: [DomainRef<'a>; 1],
    subdomain: &'a str,
    canonical_name: &'a str,
}

#[derive(Serialize)]
struct ListRequest<'a> {
    #[serde(flatten)]
    auth: &'a Credentials,
    domains: [DomainRef<'a>; 1],
}
