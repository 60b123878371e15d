//! Reqwest-backed remote client speaking the server's JSON envelope.
//!
//! Every response arrives wrapped as `{ "success": bool, "<kind>": .. }`
//! for single items and `{ "success": bool, "<collection>": [..] }` for
//! lists; list filters are path-encoded as `by-<field>/<value>`.

use color_eyre::eyre::eyre;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;
use url::Url;

use super::RemoteResourceClient;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::resource::Resource;
use crate::store::ListKey;

/// HTTP implementation of the remote resource capability. One instance
/// serves every resource kind; cloning shares the connection pool.
#[derive(Clone)]
pub struct HttpResourceClient {
  http: reqwest::Client,
  base: Url,
}

impl HttpResourceClient {
  pub fn new(config: &Config) -> color_eyre::Result<Self> {
    let base = Url::parse(&config.server.url)
      .map_err(|e| eyre!("Invalid server url {}: {}", config.server.url, e))?;

    let mut headers = HeaderMap::new();
    if let Some(token) = Config::auth_token() {
      let value = HeaderValue::from_str(&format!("Bearer {token}"))
        .map_err(|e| eyre!("Invalid characters in auth token: {}", e))?;
      headers.insert(AUTHORIZATION, value);
    }

    let http = reqwest::Client::builder()
      .default_headers(headers)
      .build()
      .map_err(|e| eyre!("Failed to build HTTP client: {}", e))?;

    Ok(Self { http, base })
  }

  /// Build `{base}/api/{parts...}`.
  fn endpoint(&self, parts: &[&str]) -> Result<Url> {
    let mut url = self.base.clone();
    {
      let mut segments = url
        .path_segments_mut()
        .map_err(|_| Error::Network(format!("server url {} cannot hold a path", self.base)))?;
      segments.pop_if_empty();
      segments.push("api");
      segments.extend(parts);
    }
    Ok(url)
  }

  /// Issue the request and peel the transport layer: connection errors and
  /// non-2xx statuses become `Network`, a bare 404 becomes `NotFound`, and
  /// anything else parses into the envelope.
  async fn send(&self, request: reqwest::RequestBuilder) -> Result<Envelope> {
    let response = request
      .send()
      .await
      .map_err(|e| Error::Network(e.to_string()))?;

    let status = response.status();
    if status == StatusCode::NOT_FOUND {
      return Err(Error::NotFound);
    }
    if !status.is_success() {
      return Err(Error::Network(format!("server returned {status}")));
    }

    response
      .json::<Envelope>()
      .await
      .map_err(|e| Error::Network(format!("invalid response body: {e}")))
  }
}

impl<R: Resource> RemoteResourceClient<R> for HttpResourceClient {
  async fn read(&self, id: &str) -> Result<R> {
    let url = self.endpoint(&[R::collection(), id])?;
    debug!(kind = R::kind(), id, "remote read");

    let envelope = self.send(self.http.get(url)).await?;
    if !envelope.success {
      // The server reports missing ids in the body rather than the status.
      return Err(Error::NotFound);
    }
    take_field(envelope, R::kind())
  }

  async fn list(&self, key: &ListKey) -> Result<Vec<R>> {
    let url = match key {
      ListKey::All => self.endpoint(&[R::collection()])?,
      ListKey::Filtered { field, value } => {
        self.endpoint(&[R::collection(), &format!("by-{field}"), value])?
      }
    };
    debug!(kind = R::kind(), %key, "remote list");

    let envelope = self.send(self.http.get(url)).await?;
    if !envelope.success {
      return Err(Error::Network(
        envelope.message.unwrap_or_else(|| "list fetch failed".to_string()),
      ));
    }
    take_field(envelope, R::collection())
  }

  async fn create(&self, draft: &R::Draft) -> Result<R> {
    let url = self.endpoint(&[R::collection()])?;
    debug!(kind = R::kind(), "remote create");

    let envelope = self.send(self.http.post(url).json(draft)).await?;
    if !envelope.success {
      return Err(Error::Validation(
        envelope.message.unwrap_or_else(|| "create rejected".to_string()),
      ));
    }
    take_field(envelope, R::kind())
  }

  async fn update(&self, id: &str, record: &R) -> Result<R> {
    let url = self.endpoint(&[R::collection(), id])?;
    debug!(kind = R::kind(), id, "remote update");

    let envelope = self.send(self.http.put(url).json(record)).await?;
    if !envelope.success {
      return Err(Error::Validation(
        envelope.message.unwrap_or_else(|| "update rejected".to_string()),
      ));
    }
    take_field(envelope, R::kind())
  }
}

/// The server's response wrapper. The payload sits next to `success` under
/// the kind (or collection) name, so it is captured as loose fields.
#[derive(Debug, Deserialize)]
struct Envelope {
  #[serde(default)]
  success: bool,
  #[serde(default)]
  message: Option<String>,
  #[serde(flatten)]
  body: serde_json::Map<String, Value>,
}

/// Pull the payload out of the envelope and reparse it as the target type.
fn take_field<T: DeserializeOwned>(mut envelope: Envelope, key: &str) -> Result<T> {
  let value = envelope
    .body
    .remove(key)
    .ok_or_else(|| Error::Network(format!("response missing '{key}' field")))?;
  serde_json::from_value(value)
    .map_err(|e| Error::Network(format!("failed to parse '{key}': {e}")))
}
