use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use url::Url;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TokenPermissions {
    #[serde(rename = "r")]
    Read,
}

#[derive(Debug, Serialize)]
pub(crate) struct TokenRequest {
    pub path: String,
    pub permissions: TokenPermissions,
    #[serde(with = "time::serde::rfc3339")]
    pub expiry: OffsetDateTime,
}

/// Short-lived, read-scoped credential for a single file, expressed as signed
/// query parameters.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReadToken {
    pub query: String,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

impl ReadToken {
    /// Returns `url` with the token's query pairs appended after any existing ones.
    pub fn append_to(&self, url: &Url) -> Url {
        let mut signed = url.clone();
        {
            let mut query = signed.query_pairs_mut();
            let pairs = url::form_urlencoded::parse(self.query.trim_start_matches('?').as_bytes());
            for (key, value) in pairs {
                query.append_pair(&key, &value);
            }
        }
        signed
    }
}
