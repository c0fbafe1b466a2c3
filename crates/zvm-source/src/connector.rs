//! HTTP client for the z/VM Cloud Connector REST API.
//!
//! Every response is wrapped in an envelope:
//!
//! ```json
//! {"overallRC": 0, "rc": 0, "rs": 0, "errmsg": "", "output": {...}}
//! ```
//!
//! A non-zero `overallRC` is a backend failure; otherwise `output` is the
//! payload handed back to the caller. One connection per call, HTTP/1.1,
//! plain `http://` only.

use async_trait::async_trait;
use http_body_util::BodyExt;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use zvm_core::ConnectorConfig;

use crate::error::{FetchError, FetchResult};
use crate::{DataSource, SourceRequest};

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "overallRC")]
    overall_rc: i64,
    #[serde(default)]
    errmsg: String,
    #[serde(default)]
    output: Value,
}

/// One Cloud Connector endpoint.
#[derive(Debug, Clone)]
pub struct ZvmConnector {
    name: String,
    /// `host:port` to dial.
    address: String,
    /// URL path prefix without a trailing slash, e.g. `""` or `"/zvmsdk"`.
    base_path: String,
}

impl ZvmConnector {
    pub fn new(config: &ConnectorConfig) -> FetchResult<Self> {
        let invalid = |reason: &str| FetchError::InvalidUrl {
            url: config.url.clone(),
            reason: reason.to_string(),
        };

        let uri: http::Uri = config
            .url
            .parse()
            .map_err(|e: http::uri::InvalidUri| invalid(&e.to_string()))?;
        match uri.scheme_str() {
            Some("http") => {}
            Some(other) => return Err(invalid(&format!("unsupported scheme `{other}`"))),
            None => return Err(invalid("missing scheme")),
        }
        let host = uri.host().ok_or_else(|| invalid("missing host"))?;
        let port = uri.port_u16().unwrap_or(80);

        Ok(Self {
            name: config.name.clone(),
            address: format!("{host}:{port}"),
            base_path: uri.path().trim_end_matches('/').to_string(),
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    async fn get(&self, request: SourceRequest) -> FetchResult<Vec<u8>> {
        let path = format!("{}{}", self.base_path, request.path());
        let http_err = |reason: String| FetchError::Http {
            source_name: self.name.clone(),
            reason,
        };

        let stream = tokio::net::TcpStream::connect(&self.address)
            .await
            .map_err(|e| FetchError::Connect {
                address: self.address.clone(),
                reason: e.to_string(),
            })?;

        let io = hyper_util::rt::TokioIo::new(stream);
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(|e| http_err(format!("handshake: {e}")))?;

        // Drive the connection in the background.
        tokio::spawn(async move {
            let _ = conn.await;
        });

        let req = http::Request::builder()
            .method("GET")
            .uri(path.as_str())
            .header("host", self.address.as_str())
            .header("accept", "application/json")
            .header("user-agent", "zvm-exporter/0.1")
            .body(http_body_util::Empty::<bytes::Bytes>::new())
            .map_err(|e| http_err(format!("build request: {e}")))?;

        let resp = sender
            .send_request(req)
            .await
            .map_err(|e| http_err(format!("send: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                source_name: self.name.clone(),
                api: request.api(),
                status: status.as_u16(),
            });
        }

        let body = resp
            .into_body()
            .collect()
            .await
            .map_err(|e| http_err(format!("read body: {e}")))?
            .to_bytes();

        debug!(source = %self.name, api = request.api(), bytes = body.len(), "connector call complete");
        Ok(body.to_vec())
    }
}

#[async_trait]
impl DataSource for ZvmConnector {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, request: SourceRequest) -> FetchResult<Value> {
        let body = self.get(request).await?;

        let envelope: Envelope =
            serde_json::from_slice(&body).map_err(|e| FetchError::InvalidResponse {
                source_name: self.name.clone(),
                api: request.api(),
                reason: e.to_string(),
            })?;

        if envelope.overall_rc != 0 {
            return Err(FetchError::Backend {
                source_name: self.name.clone(),
                api: request.api(),
                rc: envelope.overall_rc,
                message: envelope.errmsg,
            });
        }

        Ok(envelope.output)
    }
}
