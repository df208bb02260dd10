//! HTTP Server
//! Minimal HTTP/1.1 server on tokio: one task per connection, one request
//! per connection.

use crate::api::{handle_nlp_to_sql, ApiResponse};
use crate::config::ServerConfig;
use crate::error::Result;
use crate::pipeline::Orchestrator;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{error, info, warn, Instrument};

const MAX_HEADER_BYTES: usize = 16 * 1024;
const WELCOME: &str = "Welcome to the RAG-Based SQL Query API";

pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub server: ServerConfig,
    pub include_sql_on_error: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: String,
    pub path: String,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub content_type: &'static str,
    pub body: String,
}

impl HttpResponse {
    fn json(status: u16, body: &serde_json::Value) -> Self {
        Self {
            status,
            content_type: "application/json",
            body: body.to_string(),
        }
    }

    fn json_error(status: u16, message: &str) -> Self {
        Self::json(status, &serde_json::json!({ "error": message }))
    }

    fn text(status: u16, body: &str) -> Self {
        Self {
            status,
            content_type: "text/plain; charset=utf-8",
            body: body.to_string(),
        }
    }
}

impl From<ApiResponse> for HttpResponse {
    fn from(response: ApiResponse) -> Self {
        Self::json(response.status, &response.body)
    }
}

/// Accept connections until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, state: Arc<AppState>, shutdown: F) -> Result<()>
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, addr) = match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!("Failed to accept connection: {}", e);
                        continue;
                    }
                };
                let state = state.clone();
                let request_id = uuid::Uuid::new_v4();
                let span = tracing::info_span!("request", id = %request_id, peer = %addr);
                tokio::spawn(handle_connection(stream, state).instrument(span));
            }
            _ = &mut shutdown => {
                info!("Shutdown signal received, no longer accepting connections");
                return Ok(());
            }
        }
    }
}

async fn handle_connection(mut stream: TcpStream, state: Arc<AppState>) {
    let response = match read_request_within(
        &mut stream,
        state.server.max_body_bytes,
        state.server.read_timeout,
    )
    .await
    {
        Ok(request) => {
            info!("{} {}", request.method, request.path);
            route(&state, request).await
        }
        Err(response) => response,
    };

    let raw = create_response(&response, &state.server.cors_origin);
    if let Err(e) = stream.write_all(raw.as_bytes()).await {
        error!("Failed to write response: {}", e);
    }
    let _ = stream.shutdown().await;
}

/// [`read_request`] bounded by `limit`; an idle or slow client gets a 408.
pub async fn read_request_within<S>(
    stream: &mut S,
    max_body_bytes: usize,
    limit: Duration,
) -> std::result::Result<HttpRequest, HttpResponse>
where
    S: AsyncRead + Unpin,
{
    match tokio::time::timeout(limit, read_request(stream, max_body_bytes)).await {
        Ok(result) => result,
        Err(_) => {
            warn!("Client did not send a complete request within {:?}", limit);
            Err(HttpResponse::json_error(408, "Request timed out"))
        }
    }
}

/// Read the head and a `Content-Length` body. Malformed or oversized
/// requests come back as the error response to send.
pub async fn read_request<S>(stream: &mut S, max_body_bytes: usize) -> std::result::Result<HttpRequest, HttpResponse>
where
    S: AsyncRead + Unpin,
{
    let mut buffer: Vec<u8> = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];

    let head_end = loop {
        if let Some(pos) = find_subsequence(&buffer, b"\r\n\r\n") {
            break pos;
        }
        if buffer.len() > MAX_HEADER_BYTES {
            return Err(HttpResponse::json_error(431, "Request headers too large"));
        }
        let n = stream
            .read(&mut chunk)
            .await
            .map_err(|_| HttpResponse::json_error(400, "Failed to read request"))?;
        if n == 0 {
            return Err(HttpResponse::json_error(400, "Incomplete request"));
        }
        buffer.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buffer[..head_end]).to_string();
    let mut lines = head.lines();
    let request_line = lines.next().unwrap_or_default();
    let parts: Vec<&str> = request_line.split_whitespace().collect();
    if parts.len() < 2 {
        return Err(HttpResponse::json_error(400, "Bad request line"));
    }

    let method = parts[0].to_uppercase();
    let mut path = parts[1].to_string();
    if let Some(query_start) = path.find('?') {
        path.truncate(query_start);
    }
    let path = match path.trim_end_matches('/') {
        "" => "/".to_string(),
        trimmed => trimmed.to_string(),
    };

    let mut headers = HashMap::new();
    for line in lines {
        if let Some((key, value)) = line.split_once(':') {
            headers.insert(key.trim().to_lowercase(), value.trim().to_string());
        }
    }

    let content_length = match headers.get("content-length") {
        Some(raw) => raw
            .parse::<usize>()
            .map_err(|_| HttpResponse::json_error(400, "Invalid Content-Length"))?,
        None => 0,
    };
    if content_length > max_body_bytes {
        return Err(HttpResponse::json_error(413, "Request body too large"));
    }

    let mut body = buffer.split_off(head_end + 4);
    while body.len() < content_length {
        let n = stream
            .read(&mut chunk)
            .await
            .map_err(|_| HttpResponse::json_error(400, "Failed to read request body"))?;
        if n == 0 {
            return Err(HttpResponse::json_error(400, "Incomplete request body"));
        }
        body.extend_from_slice(&chunk[..n]);
    }
    body.truncate(content_length);

    Ok(HttpRequest {
        method,
        path,
        headers,
        body,
    })
}

pub async fn route(state: &AppState, request: HttpRequest) -> HttpResponse {
    match (request.method.as_str(), request.path.as_str()) {
        ("OPTIONS", _) => HttpResponse::text(204, ""),
        ("GET", "/") => HttpResponse::text(200, WELCOME),
        ("GET", "/api/health") => HttpResponse::json(200, &serde_json::json!({ "status": "ok" })),
        ("POST", "/api/nlp-to-sql") => {
            if !accepts_json_body(&request) {
                return HttpResponse::json_error(415, "Content-Type must be application/json");
            }
            handle_nlp_to_sql(
                state.orchestrator.clone(),
                &request.body,
                state.include_sql_on_error,
            )
            .await
            .into()
        }
        (_, "/api/nlp-to-sql") => HttpResponse::json_error(405, "Method not allowed"),
        _ => HttpResponse::json_error(404, "Not found"),
    }
}

/// A declared body type other than JSON is refused; an absent one is allowed.
fn accepts_json_body(request: &HttpRequest) -> bool {
    match request.headers.get("content-type") {
        Some(value) => value
            .split(';')
            .next()
            .map(|mime| mime.trim().eq_ignore_ascii_case("application/json"))
            .unwrap_or(false),
        None => true,
    }
}

pub fn create_response(response: &HttpResponse, cors_origin: &str) -> String {
    format!(
        "HTTP/1.1 {} {}\r\n\
         Content-Type: {}\r\n\
         Content-Length: {}\r\n\
         Access-Control-Allow-Origin: {}\r\n\
         Access-Control-Allow-Methods: GET, POST, OPTIONS\r\n\
         Access-Control-Allow-Headers: Content-Type\r\n\
         Connection: close\r\n\
         \r\n\
         {}",
        response.status,
        reason_phrase(response.status),
        response.content_type,
        response.body.len(),
        cors_origin,
        response.body
    )
}

fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        204 => "No Content",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        408 => "Request Timeout",
        413 => "Payload Too Large",
        415 => "Unsupported Media Type",
        431 => "Request Header Fields Too Large",
        _ => "Internal Server Error",
    }
}

fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|window| window == needle)
}
