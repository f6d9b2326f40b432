//! HTTP surface: `POST /auto-assembly` and its dry-run sibling.
//!
//! Each request carries its own CAD platform token in the `Authentication`
//! header; the server holds no credentials. One reqwest connection pool is
//! shared by all requests.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::header::CONTENT_TYPE;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::Serialize;
use tokio::net::TcpListener;

use matecraft_core::{AutoMate, ElementPath};
use matecraft_onshape::{build_http_client, OnshapeClient, OnshapeConfig};

pub const AUTH_HEADER: &str = "Authentication";

/// Builds a pipeline bound to one request's token.
pub type Connect = Arc<dyn Fn(&str) -> matecraft_core::Result<AutoMate> + Send + Sync>;

pub struct ServerState {
    connect: Connect,
}

impl ServerState {
    pub fn onshape(config: OnshapeConfig) -> Result<Self> {
        let http = build_http_client(&config)?;
        let connect: Connect = Arc::new(move |token: &str| {
            let client = Arc::new(OnshapeClient::with_client(http.clone(), config.clone(), token));
            Ok(AutoMate::new(client.clone(), client))
        });
        Ok(Self { connect })
    }

    pub fn with_connect(connect: Connect) -> Self {
        Self { connect }
    }
}

pub async fn serve(listen: SocketAddr, state: Arc<ServerState>) -> Result<()> {
    let listener = TcpListener::bind(listen)
        .await
        .map_err(|e| anyhow!("serve: failed to bind {listen}: {e}"))?;
    let bound = listener
        .local_addr()
        .map_err(|e| anyhow!("serve: failed to read bound addr: {e}"))?;
    tracing::info!(addr = %bound, "listening");

    loop {
        let (stream, peer) = listener
            .accept()
            .await
            .map_err(|e| anyhow!("serve: accept failed: {e}"))?;
        let io = TokioIo::new(stream);
        let state = state.clone();

        tokio::spawn(async move {
            let service = service_fn(move |req| handle_request(req, state.clone()));
            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                tracing::warn!(peer = %peer, error = %e, "connection error");
            }
        });
    }
}

async fn handle_request(
    req: Request<Incoming>,
    state: Arc<ServerState>,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let auth = req
        .headers()
        .get(AUTH_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let body = if method == Method::POST {
        req.into_body().collect().await?.to_bytes()
    } else {
        Bytes::new()
    };
    Ok(route(&state, method, &path, auth.as_deref(), &body).await)
}

pub async fn route(
    state: &ServerState,
    method: Method,
    path: &str,
    auth: Option<&str>,
    body: &[u8],
) -> Response<Full<Bytes>> {
    match (method, path) {
        (Method::GET, "/healthz") => text_response(StatusCode::OK, "ok\n"),
        (Method::POST, "/auto-assembly") => {
            let (engine, assembly) = match prepare(state, auth, body) {
                Ok(prepared) => prepared,
                Err(response) => return response,
            };
            match engine.run(&assembly).await {
                Ok(report) => {
                    tracing::info!(
                        assembly = %assembly,
                        instances = report.instances_added,
                        features = report.features_added,
                        "auto assembly complete"
                    );
                    json_response(StatusCode::OK, &serde_json::json!({ "message": "Success" }))
                }
                Err(e) => {
                    tracing::error!(assembly = %assembly, error = %e, "auto assembly failed");
                    json_error(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string())
                }
            }
        }
        (Method::POST, "/auto-assembly/plan") => {
            let (engine, assembly) = match prepare(state, auth, body) {
                Ok(prepared) => prepared,
                Err(response) => return response,
            };
            match engine.plan(&assembly).await {
                Ok(planned) => json_response(StatusCode::OK, &planned.plan),
                Err(e) => {
                    tracing::error!(assembly = %assembly, error = %e, "planning failed");
                    json_error(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string())
                }
            }
        }
        _ => json_error(StatusCode::NOT_FOUND, "not found"),
    }
}

/// `Basic <token>` and a bare `<token>` are both accepted.
pub fn extract_token(auth: &str) -> &str {
    auth.strip_prefix("Basic").unwrap_or(auth).trim()
}

fn prepare(
    state: &ServerState,
    auth: Option<&str>,
    body: &[u8],
) -> Result<(AutoMate, ElementPath), Response<Full<Bytes>>> {
    let token = auth.map(extract_token).filter(|t| !t.is_empty()).ok_or_else(|| {
        json_error(StatusCode::UNAUTHORIZED, "An onshape oauth token is required.")
    })?;
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(json_error(StatusCode::BAD_REQUEST, "A request body is required."));
    }
    let value: serde_json::Value = serde_json::from_slice(body)
        .map_err(|e| json_error(StatusCode::BAD_REQUEST, &format!("invalid JSON body: {e}")))?;
    let assembly =
        ElementPath::from_json(&value).map_err(|e| json_error(StatusCode::BAD_REQUEST, &e.to_string()))?;
    let engine =
        (state.connect)(token).map_err(|e| json_error(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()))?;
    Ok((engine, assembly))
}

fn text_response(status: StatusCode, body: &str) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "text/plain; charset=utf-8")
        .body(Full::new(Bytes::from(body.to_string())))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::from_static(b"internal error"))))
}

fn json_response<T: Serialize>(status: StatusCode, value: &T) -> Response<Full<Bytes>> {
    let body = serde_json::to_vec(value).unwrap_or_else(|_| b"{\"error\":\"serialize\"}".to_vec());
    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "application/json")
        .body(Full::new(Bytes::from(body)))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::from_static(b"{\"error\":\"internal\"}"))))
}

fn json_error(status: StatusCode, msg: &str) -> Response<Full<Bytes>> {
    let v = serde_json::json!({ "error": msg });
    json_response(status, &v)
}
