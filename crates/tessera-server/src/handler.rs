use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::extract::{Request, State};
use axum::http::{header, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use indexmap::IndexMap;
use serde_json::json;
use tessera_shell::ShellRegistry;
use tracing::{debug, warn};

/// Largest request body read before the request is handed to a shell.
const MAX_BODY: usize = 2 * 1024 * 1024;

/// Health check handler.
pub async fn health_handler(State(registry): State<Arc<ShellRegistry>>) -> Json<serde_json::Value> {
    let shells: Vec<_> = registry
        .shells()
        .iter()
        .map(|shell| {
            json!({
                "name": shell.name(),
                "active": shell.is_active(),
                "loaded": shell.is_loaded(),
            })
        })
        .collect();
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "shells": shells,
    }))
}

/// Hands every other request to the shell bound to its host and port.
pub async fn site_handler(
    State(registry): State<Arc<ShellRegistry>>,
    request: Request,
) -> Response {
    let (parts, body) = request.into_parts();
    let (host, port) = parts
        .headers
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .map(split_host)
        .unwrap_or((None, None));

    let Some(shell) = registry.resolve(host.as_deref(), port) else {
        debug!(host = ?host, port = ?port, "no shell for host");
        return (StatusCode::NOT_FOUND, "No site is bound to this host").into_response();
    };

    // The body is drained so the connection can be reused; shells only
    // see the request line and headers.
    if let Err(e) = to_bytes(body, MAX_BODY).await {
        warn!(error = %e, "failed to read request body");
        return StatusCode::PAYLOAD_TOO_LARGE.into_response();
    }

    let mut shell_request =
        tessera_shell::Request::new(parts.method.as_str(), parts.uri.path());
    shell_request.host = host;
    shell_request.port = port;
    shell_request.query = parse_query(parts.uri.query().unwrap_or_default());
    shell_request.headers = parts
        .headers
        .iter()
        .filter_map(|(name, value)| {
            Some((name.as_str().to_string(), value.to_str().ok()?.to_string()))
        })
        .collect();

    let response = shell.handle_request(shell_request).await;
    into_http(response)
}

/// Split a `Host` header into name and port. Bracketed IPv6 hosts keep
/// their brackets.
pub fn split_host(value: &str) -> (Option<String>, Option<u16>) {
    let value = value.trim();
    if value.is_empty() {
        return (None, None);
    }
    let split = match value.rfind(':') {
        Some(i) if !value[i..].contains(']') => Some(i),
        _ => None,
    };
    match split {
        Some(i) => match value[i + 1..].parse() {
            Ok(port) => (Some(value[..i].to_string()), Some(port)),
            Err(_) => (Some(value.to_string()), None),
        },
        None => (Some(value.to_string()), None),
    }
}

fn parse_query(query: &str) -> IndexMap<String, String> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) => (key.to_string(), value.to_string()),
            None => (pair.to_string(), String::new()),
        })
        .collect()
}

fn into_http(response: tessera_shell::Response) -> Response {
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut http = Response::new(Body::from(response.body));
    *http.status_mut() = status;
    for (name, value) in &response.headers {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                http.headers_mut().insert(name, value);
            }
            _ => warn!(header = %name, "dropping invalid response header"),
        }
    }
    http
}
