//! JSON-over-HTTP transport for remote crypto services
//!
//! Each operation is a `POST <base_url>/<operation>` with the request
//! message as JSON body and an `X-Request-Id` header. Status codes map onto
//! the error taxonomy:
//! - 400 → invalid argument
//! - 404 → not found
//! - 412 → root key not exposed (failed precondition)
//! - 5xx, connect and decode failures → unavailable (retried)

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::remote::{
    AppSKeyResponse, CryptoServicePayloadRequest, CryptoServicePayloadResponse, CryptoTransport,
    DeriveSessionKeysRequest, GetRootKeysRequest, JoinAcceptMicRequest, NwkSKeysResponse,
};
use crate::envelope::KeyEnvelope;
use crate::error::{Error, ErrorKind, Result};

pub const REQUEST_ID_HEADER: &str = "X-Request-Id";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP client for a remote crypto service
pub struct HttpCryptoTransport {
    http: Client,
    base_url: String,
    max_retries: u32,
}

impl HttpCryptoTransport {
    pub fn new(base_url: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| Error::Unavailable(format!("failed to build HTTP client: {}", e)))?;

        info!("Remote crypto service at {}", base_url);

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            max_retries: 0,
        })
    }

    /// Retry unavailable responses up to `max_retries` times with
    /// exponential backoff
    pub fn with_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn url(&self, operation: &str) -> String {
        format!("{}/{}", self.base_url, operation)
    }

    async fn post<Req, Resp>(&self, operation: &str, req: &Req) -> Result<Resp>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let mut attempt = 0u32;
        loop {
            match self.post_once(operation, req).await {
                Err(e) if e.kind() == ErrorKind::Unavailable && attempt < self.max_retries => {
                    attempt += 1;
                    let backoff = Duration::from_millis(100 * 2u64.pow(attempt.min(6)));
                    warn!(
                        "{} attempt {}/{} failed: {}. Retrying in {:?}...",
                        operation, attempt, self.max_retries, e, backoff
                    );
                    tokio::time::sleep(backoff).await;
                }
                result => return result,
            }
        }
    }

    async fn post_once<Req, Resp>(&self, operation: &str, req: &Req) -> Result<Resp>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let request_id = Uuid::new_v4().to_string();
        let url = self.url(operation);
        debug!("POST {} (request {})", url, request_id);

        let resp = self
            .http
            .post(&url)
            .header(REQUEST_ID_HEADER, &request_id)
            .json(req)
            .send()
            .await
            .map_err(|e| Error::Unavailable(format!("{} request {}: {}", operation, request_id, e)))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!(
                "{} request {} failed with status {}: {}",
                operation, request_id, status, body
            );
            return Err(status_error(status, operation, body));
        }

        resp.json::<Resp>().await.map_err(|e| {
            Error::Unavailable(format!("{} response {}: {}", operation, request_id, e))
        })
    }
}

/// Error for a non-success HTTP status
pub fn status_error(status: StatusCode, operation: &str, body: String) -> Error {
    let detail = if body.is_empty() {
        operation.to_string()
    } else {
        body
    };
    match status {
        StatusCode::BAD_REQUEST => Error::InvalidArgument(detail),
        StatusCode::NOT_FOUND => Error::KeyNotFound(detail),
        StatusCode::PRECONDITION_FAILED => Error::RootKeyNotExposed,
        _ => Error::Unavailable(format!("{} returned {}: {}", operation, status, detail)),
    }
}

#[async_trait]
impl CryptoTransport for HttpCryptoTransport {
    async fn join_request_mic(
        &self,
        req: &CryptoServicePayloadRequest,
    ) -> Result<CryptoServicePayloadResponse> {
        self.post("join_request_mic", req).await
    }

    async fn join_accept_mic(
        &self,
        req: &JoinAcceptMicRequest,
    ) -> Result<CryptoServicePayloadResponse> {
        self.post("join_accept_mic", req).await
    }

    async fn encrypt_join_accept(
        &self,
        req: &CryptoServicePayloadRequest,
    ) -> Result<CryptoServicePayloadResponse> {
        self.post("encrypt_join_accept", req).await
    }

    async fn encrypt_rejoin_accept(
        &self,
        req: &CryptoServicePayloadRequest,
    ) -> Result<CryptoServicePayloadResponse> {
        self.post("encrypt_rejoin_accept", req).await
    }

    async fn derive_nwk_s_keys(
        &self,
        req: &DeriveSessionKeysRequest,
    ) -> Result<NwkSKeysResponse> {
        self.post("derive_nwk_s_keys", req).await
    }

    async fn get_nwk_key(&self, req: &GetRootKeysRequest) -> Result<KeyEnvelope> {
        self.post("get_nwk_key", req).await
    }

    async fn derive_app_s_key(&self, req: &DeriveSessionKeysRequest) -> Result<AppSKeyResponse> {
        self.post("derive_app_s_key", req).await
    }

    async fn get_app_key(&self, req: &GetRootKeysRequest) -> Result<KeyEnvelope> {
        self.post("get_app_key", req).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cryptoservices::remote::EndDeviceIdentifiers;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio_test::{assert_err, assert_ok};

    /// Serve one HTTP request with `response`, returning the raw request
    async fn serve_once(response: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut raw = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = stream.read(&mut buf).await.unwrap();
                raw.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&raw).to_string();
                if let Some(end) = text.find("\r\n\r\n") {
                    let len = text[..end]
                        .lines()
                        .find_map(|l| {
                            l.to_ascii_lowercase()
                                .strip_prefix("content-length:")
                                .map(|v| v.trim().parse::<usize>().unwrap())
                        })
                        .unwrap_or(0);
                    if raw.len() >= end + 4 + len {
                        break;
                    }
                }
                if n == 0 {
                    break;
                }
            }
            stream.write_all(response.as_bytes()).await.unwrap();
            stream.shutdown().await.unwrap();
            String::from_utf8_lossy(&raw).to_string()
        });
        (url, handle)
    }

    fn root_keys_request() -> GetRootKeysRequest {
        GetRootKeysRequest {
            ids: EndDeviceIdentifiers::default(),
            provisioner_id: String::new(),
            provisioning_data: None,
        }
    }

    #[test]
    fn test_status_error_mapping() {
        assert_eq!(
            status_error(StatusCode::NOT_FOUND, "get_app_key", String::new()).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            status_error(StatusCode::PRECONDITION_FAILED, "get_app_key", String::new()),
            Error::RootKeyNotExposed
        );
        assert_eq!(
            status_error(StatusCode::BAD_REQUEST, "x", "bad payload".into()),
            Error::InvalidArgument("bad payload".into())
        );
        assert_eq!(
            status_error(StatusCode::SERVICE_UNAVAILABLE, "x", String::new()).kind(),
            ErrorKind::Unavailable
        );
    }

    #[test]
    fn test_url() {
        let transport = HttpCryptoTransport::new("http://js.example.com/api/").unwrap();
        assert_eq!(
            transport.url("get_nwk_key"),
            "http://js.example.com/api/get_nwk_key"
        );
    }

    #[tokio::test]
    async fn test_envelope_response() {
        let (url, server) = serve_once(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 44\r\nConnection: close\r\n\r\n{\"key\":\"01010101010101010101010101010101\"}\r\n",
        )
        .await;
        let transport = HttpCryptoTransport::new(&url).unwrap();
        let envelope = assert_ok!(transport.get_nwk_key(&root_keys_request()).await);
        assert_eq!(
            envelope,
            KeyEnvelope::Plain(crate::lorawan::AES128Key([0x01; 16]))
        );

        let request = server.await.unwrap().to_ascii_lowercase();
        assert!(request.starts_with("post /get_nwk_key "));
        assert!(request.contains("x-request-id: "));
    }

    #[tokio::test]
    async fn test_precondition_failed() {
        let (url, _server) = serve_once(
            "HTTP/1.1 412 Precondition Failed\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        )
        .await;
        let transport = HttpCryptoTransport::new(&url).unwrap();
        assert_eq!(
            transport.get_app_key(&root_keys_request()).await,
            Err(Error::RootKeyNotExposed)
        );
    }

    #[tokio::test]
    async fn test_connection_refused_is_unavailable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let transport = HttpCryptoTransport::new(&url).unwrap();
        let err = assert_err!(transport.get_nwk_key(&root_keys_request()).await);
        assert_eq!(err.kind(), ErrorKind::Unavailable);
    }
}
