//! Wire types of the ip-api batch endpoint.

use serde::{Deserialize, Serialize};

use crate::error::GeoError;

/// One entry of a batch request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeoQuery {
    /// IP address or domain to locate.
    pub query: String,
    /// Comma separated response fields. The provider default when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<String>,
    /// Response language for localized names.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,
}

impl GeoQuery {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            fields: None,
            lang: None,
        }
    }

    pub fn with_lang(mut self, lang: impl Into<String>) -> Self {
        self.lang = Some(lang.into());
        self
    }
}

/// Location of one address as reported by the provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeoInfo {
    /// `success` or `fail`.
    pub status: String,
    /// Failure reason, only present when `status` is `fail`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub country_code: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub region_name: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub zip: Option<String>,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lon: Option<f64>,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub isp: Option<String>,
    #[serde(default)]
    pub org: Option<String>,
    #[serde(default, rename = "as")]
    pub as_name: Option<String>,
    /// The address this entry answers.
    #[serde(default)]
    pub query: String,
}

impl GeoInfo {
    pub fn is_success(&self) -> bool {
        self.status == "success"
    }

    /// Turns a `fail` entry into an error for `query`.
    pub fn into_result(self, query: &str) -> Result<GeoInfo, GeoError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(GeoError::Lookup {
                query: query.to_string(),
                message: self
                    .message
                    .unwrap_or_else(|| format!("status {}", self.status)),
            })
        }
    }
}
