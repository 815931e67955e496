use std::{net::Ipv4Addr, time::Duration};
use config::{builder::DefaultState, Config, ConfigBuilder, ConfigError, File};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use thiserror::Error;
use crate::{
    reconciler::DesiredRecordSet,
    registrar::{regru::DEFAULT_API_URL, Credentials},
};

static HOSTNAME_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?i:[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?)(?:\.(?i:[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?))*\.?$")
        .unwrap()
});

const DEFAULT_DOMAIN: &str = "vnvnc.ru";
const DEFAULT_A_RECORD: &str = "76.76.21.21";
const DEFAULT_CNAME: &str = "cname.vercel-dns.com";
const DEFAULT_LOG_LEVEL: &str = "warn";

#[derive(Debug, Deserialize)]
pub struct Settings {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_domain")]
    pub domain: String,
    #[serde(default = "default_a_record")]
    pub a_record: String,
    #[serde(default = "default_cname")]
    pub cname: String,

    pub username: Option<String>,
    pub password: Option<String>,

    pub request_timeout: Option<String>,

    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_json: bool,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let home_cfg = shellexpand::tilde("~/.config/regru-dns/config");

        let builder = Config::builder()
            .add_source(File::with_name("config").required(false))
            .add_source(File::with_name("/etc/regru-dns/config").required(false))
            .add_source(File::with_name(&home_cfg).required(false))
            .add_source(config::Environment::with_prefix("REGRU"));

        Self::from_builder(builder)
    }

    fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
        builder.build()?.try_deserialize()
    }

    /// Validated target state for the reconciler.
    pub fn desired_state(&self) -> Result<DesiredRecordSet, SettingsError> {
        let root_ip = self.a_record
            .parse::<Ipv4Addr>()
            .map_err(|_| SettingsError::BadAddress(self.a_record.clone()))?;

        for host in [&self.domain, &self.cname] {
            if !HOSTNAME_REGEX.is_match(host) || host.len() > 253 {
                return Err(SettingsError::BadHostname(host.clone()));
            }
        }

        Ok(DesiredRecordSet {
            domain: self.domain.clone(),
            root_ip,
            www_target: self.cname.clone(),
        })
    }

    /// Configured credentials, if both halves are present.
    pub fn credentials(&mut self) -> Option<Credentials> {
        match (self.username.take(), self.password.take()) {
            (Some(username), Some(password)) => Some(Credentials::new(username, password)),
            _ => None,
        }
    }

    pub fn request_timeout(&self) -> Result<Option<Duration>, SettingsError> {
        self.request_timeout
            .as_deref()
            .map(humantime::parse_duration)
            .transpose()
            .map_err(SettingsError::BadTimeout)
    }

    pub fn log_level(&self) -> Result<tracing::Level, SettingsError> {
        self.log_level
            .parse()
            .map_err(|_| SettingsError::BadLogLevel(self.log_level.clone()))
    }
}

fn default_api_url() -> String { DEFAULT_API_URL.to_owned() }
fn default_domain() -> String { DEFAULT_DOMAIN.to_owned() }
fn default_a_record() -> String { DEFAULT_A_RECORD.to_owned() }
fn default_cname() -> String { DEFAULT_CNAME.to_owned() }
fn default_log_level() -> String { DEFAULT_LOG_LEVEL.to_owned() }

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("a_record is not an IPv4 address: {0}")]
    BadAddress(String),
    #[error("not a valid hostname: {0}")]
    BadHostname(String),
    #[error("bad request_timeout: {0}")]
    BadTimeout(#[from] humantime::DurationError),
    #[error("unknown log level: {0}")]
    BadLogLevel(String),
}
