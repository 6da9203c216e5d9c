//! Relay HTTP server
//!
//! Built on `hyper` and `tokio`: one task per connection, HTTP/1.1 only.
//!
//! # Endpoints
//!
//! * `GET /` - `{"success":true}`
//! * `GET /health` - `{"status":"ok"}`
//! * `POST /upload` - multipart form, field `files`; the first file is
//!   forwarded to the provider and its response returned as
//!   `{"success":true,"message":...,"result":{...}}`
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tsubame::config::Config;
//! use tsubame::provider::ProviderClient;
//! use tsubame::server::RelayServer;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::from_env()?;
//! let provider = Arc::new(ProviderClient::new(config.provider.clone())?);
//! let server = RelayServer::new(&config, provider).await?;
//! println!("Relay bound to {}", server.local_addr());
//! server.run().await?;
//! # Ok(())
//! # }
//! ```

use super::{RelayResponse, ServerError};
use crate::config::Config;
use crate::metrics;
use crate::provider::MediaUploader;
use crate::upload::multipart::{boundary_from_content_type, spool_form, FormLimits};
use crate::upload::UploadError;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{body::Incoming, Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

/// State shared by every connection
struct RelayState {
    limits: FormLimits,
    uploader: Arc<dyn MediaUploader>,
}

/// Relay server bound to a socket
pub struct RelayServer {
    state: Arc<RelayState>,
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl RelayServer {
    /// Bind the relay to `config.server.address`
    ///
    /// Port 0 lets the OS pick; use [`RelayServer::local_addr`] to find out
    /// which port was assigned.
    pub async fn new(
        config: &Config,
        uploader: Arc<dyn MediaUploader>,
    ) -> Result<Self, ServerError> {
        let addr: SocketAddr = config
            .server
            .address
            .parse()
            .map_err(|e| ServerError::BindError(format!("Invalid address: {}", e)))?;

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::BindError(format!("Failed to bind to {}: {}", addr, e)))?;

        let local_addr = listener
            .local_addr()
            .map_err(|e| ServerError::BindError(format!("Failed to get local address: {}", e)))?;

        info!("Relay bound to {}", local_addr);

        Ok(Self {
            state: Arc::new(RelayState {
                limits: FormLimits {
                    max_file_size: config.upload.max_file_size,
                    spool_dir: config.upload.spool_dir(),
                },
                uploader,
            }),
            listener,
            local_addr,
        })
    }

    /// Address the server is listening on
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serve forever
    pub async fn run(self) -> Result<(), ServerError> {
        self.run_until(std::future::pending()).await
    }

    /// Serve until `shutdown` resolves
    ///
    /// Connections already accepted keep running on their own tasks.
    pub async fn run_until<F>(self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()>,
    {
        info!("Starting relay on {}", self.local_addr);
        tokio::pin!(shutdown);

        loop {
            let (stream, peer_addr) = tokio::select! {
                _ = &mut shutdown => break,
                accepted = self.listener.accept() => match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                        continue;
                    }
                },
            };

            let state = Arc::clone(&self.state);

            tokio::spawn(async move {
                let io = TokioIo::new(stream);
                let service = service_fn(move |req| {
                    let state = Arc::clone(&state);
                    async move { handle_request(req, state).await }
                });

                if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                    error!("Error serving connection from {}: {}", peer_addr, e);
                }
            });
        }

        Ok(())
    }
}

/// Route a request
async fn handle_request(
    req: Request<Incoming>,
    state: Arc<RelayState>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let path = req.uri().path().to_string();
    let method = req.method().clone();

    debug!("Handling {} {}", method, path);

    let response = match (&method, path.as_str()) {
        (&Method::GET, "/") => json_response(StatusCode::OK, &serde_json::json!({ "success": true })),
        (&Method::GET, "/health") => {
            json_response(StatusCode::OK, &serde_json::json!({ "status": "ok" }))
        }
        (&Method::POST, "/upload") => {
            let (status, body) = handle_upload(req, &state).await;
            json_response(status, &body)
        }
        (_, "/" | "/health" | "/upload") => json_response(
            StatusCode::METHOD_NOT_ALLOWED,
            &RelayResponse::failure(format!("Method {} not allowed", method)),
        ),
        _ => json_response(StatusCode::NOT_FOUND, &RelayResponse::failure("Not Found")),
    };

    metrics::record_relay_request(route_label(&path), response.status().as_u16());
    Ok(response)
}

/// Receive the form, forward the first file, wrap the provider's answer
async fn handle_upload(req: Request<Incoming>, state: &RelayState) -> (StatusCode, RelayResponse) {
    let content_type = req
        .headers()
        .get(hyper::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();

    let boundary = match boundary_from_content_type(&content_type) {
        Ok(b) => b,
        Err(e) => {
            warn!("Rejected upload: {}", e);
            metrics::record_error("invalid_multipart");
            return (StatusCode::BAD_REQUEST, RelayResponse::failure(e.to_string()));
        }
    };

    let body = req.into_body().into_data_stream();
    let files = match spool_form(body, &boundary, &state.limits).await {
        Ok(files) => files,
        Err(e) => {
            let status = match &e {
                UploadError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
                UploadError::InvalidMultipart(_) => StatusCode::BAD_REQUEST,
                UploadError::IoError(_) | UploadError::AlreadyFinished => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            };
            warn!(status = status.as_u16(), "Rejected upload: {}", e);
            metrics::record_error("intake");
            return (status, RelayResponse::failure(e.to_string()));
        }
    };

    let Some(first) = files.first() else {
        warn!("Upload request carried no files");
        return (
            StatusCode::BAD_REQUEST,
            RelayResponse::failure("No files uploaded"),
        );
    };

    if files.len() > 1 {
        debug!(
            ignored = files.len() - 1,
            "Only the first file is forwarded to the provider"
        );
    }

    info!(
        file_name = first.display_name(),
        content_type = ?first.content_type,
        bytes = first.temp.size(),
        "Forwarding upload to provider"
    );

    match state
        .uploader
        .upload_file(first.temp.path(), first.display_name())
        .await
    {
        Ok(result) => (StatusCode::OK, RelayResponse::ok(result)),
        Err(e) => {
            error!("Provider upload failed: {}", e);
            metrics::record_error("provider");
            (StatusCode::BAD_GATEWAY, RelayResponse::failure(e.to_string()))
        }
    }
}

/// Bounded label set for the request counter
fn route_label(path: &str) -> &'static str {
    match path {
        "/" => "/",
        "/health" => "/health",
        "/upload" => "/upload",
        _ => "other",
    }
}

fn json_response<T: serde::Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    let bytes = serde_json::to_vec(body).unwrap_or_else(|_| b"{}".to_vec());
    let mut response = Response::new(Full::new(Bytes::from(bytes)));
    *response.status_mut() = status;
    response.headers_mut().insert(
        hyper::header::CONTENT_TYPE,
        hyper::header::HeaderValue::from_static("application/json"),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_label_is_bounded() {
        assert_eq!(route_label("/upload"), "/upload");
        assert_eq!(route_label("/wp-admin"), "other");
    }

    #[test]
    fn test_json_response() {
        let response = json_response(StatusCode::CREATED, &RelayResponse::failure("x"));
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(
            response.headers().get(hyper::header::CONTENT_TYPE).unwrap(),
            "application/json"
        );
    }
}
