//! Shared HTTP client for the Elasticsearch API.

use std::time::Duration;

use percent_encoding::percent_decode_str;
use reqwest::Client;
use serde::de::DeserializeOwned;
use tracing::trace;
use url::Url;

use crate::config::redact_url;
use crate::error::CollectError;
use crate::tls::TransportContext;

/// Elasticsearch API client.
///
/// Cheap to clone: the underlying connection pool is reference counted, so
/// every collector holds a handle to the same client.
#[derive(Debug, Clone)]
pub struct EsClient {
    http: Client,
    base_url: Url,
    credentials: Option<(String, Option<String>)>,
}

impl EsClient {
    /// Build the client. Proxy settings are taken from the environment.
    pub fn new(
        base_url: Url,
        timeout: Duration,
        transport: TransportContext,
    ) -> Result<Self, reqwest::Error> {
        let mut builder = Client::builder().timeout(timeout);

        if let TransportContext::Tls(tls) = transport {
            if let Some(certificates) = tls.ca_certificates {
                builder = builder.tls_built_in_root_certs(false);
                for certificate in certificates {
                    builder = builder.add_root_certificate(certificate);
                }
            }
            if let Some(identity) = tls.identity {
                builder = builder.identity(identity);
            }
            builder = builder.danger_accept_invalid_certs(tls.insecure_skip_verify);
        }

        let credentials = (!base_url.username().is_empty()).then(|| {
            (
                decode_userinfo(base_url.username()),
                base_url.password().map(decode_userinfo),
            )
        });
        let mut base_url = base_url;
        // Credentials go in the Authorization header, not in request URLs.
        let _ = base_url.set_username("");
        let _ = base_url.set_password(None);

        Ok(Self {
            http: builder.build()?,
            base_url,
            credentials,
        })
    }

    /// Base URL, without credentials.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Build the URL for an API path, keeping any path prefix of the base URL.
    pub fn endpoint(&self, path: &str, query: &[(&str, &str)]) -> Url {
        let mut url = self.base_url.clone();
        let joined = format!(
            "{}/{}",
            url.path().trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        url.set_path(&joined);
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        url
    }

    /// GET an API path and decode the JSON body.
    ///
    /// Any transport error, non-success status or malformed body is returned
    /// as a [`CollectError`]; nothing is retried.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, CollectError> {
        let url = self.endpoint(path, query);
        let url_str = redact_url(&url);
        trace!(url = %url_str, "Querying Elasticsearch");

        let mut request = self.http.get(url);
        if let Some((username, password)) = &self.credentials {
            request = request.basic_auth(username, password.as_deref());
        }

        let response = request.send().await.map_err(|source| CollectError::Request {
            url: url_str.clone(),
            source,
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(CollectError::Status {
                url: url_str,
                status,
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|source| CollectError::Request {
                url: url_str.clone(),
                source,
            })?;

        serde_json::from_slice(&body).map_err(|source| CollectError::Decode {
            url: url_str,
            source,
        })
    }
}

/// `Url` keeps userinfo percent-encoded; Basic auth needs the raw value.
fn decode_userinfo(value: &str) -> String {
    percent_decode_str(value).decode_utf8_lossy().into_owned()
}
