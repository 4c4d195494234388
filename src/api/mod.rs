//! HTTP API
//!
//! Thin hyper transport over [`StatisticsService`].
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | `POST` | `/api/statistics?countryCode=XX` | body `{"pageName": .., "viewsToAdd": ..}` |
//! | `GET` | `/api/statistics` | `{"US": {"views": 25, "mostPopularPage": "about"}, ..}` |
//! | `GET` | `/healthz`, `/livez` | process liveness |
//! | `GET` | `/readyz` | remote store reachability |
//! | `GET` | `/metrics` | Prometheus text format |
//!
//! Validation failures map to 400, store failures to 500.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Full, Limited};
use hyper::body::Incoming;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};
use url::form_urlencoded;
use uuid::Uuid;

use crate::domain::PageViewUpdate;
use crate::error::{Error, Result};
use crate::metrics::METRICS;
use crate::service::StatisticsService;

/// Statistics resource path
pub const STATISTICS_PATH: &str = "/api/statistics";

/// Maximum accepted request body size
const MAX_BODY_BYTES: usize = 64 * 1024;

const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

type HttpResponse = Response<Full<Bytes>>;

/// Accept connections until `shutdown` is cancelled.
pub async fn serve(
    listener: TcpListener,
    service: Arc<StatisticsService>,
    shutdown: CancellationToken,
) -> Result<()> {
    let addr = listener
        .local_addr()
        .map_err(|e| Error::Internal(format!("API listener has no address: {}", e)))?;
    info!("API server listening on {}", addr);

    loop {
        let accepted = tokio::select! {
            accepted = listener.accept() => accepted,
            _ = shutdown.cancelled() => {
                info!("API server shutting down");
                return Ok(());
            }
        };
        let (stream, peer) = match accepted {
            Ok(conn) => conn,
            Err(e) => {
                error!("API server accept error: {}", e);
                let backoff = accept_backoff(&e);
                if !backoff.is_zero() {
                    tokio::time::sleep(backoff).await;
                }
                continue;
            }
        };

        let io = TokioIo::new(stream);
        let service = service.clone();

        tokio::spawn(async move {
            let handler = service_fn(move |req| handle(service.clone(), peer, req));
            if let Err(e) = http1::Builder::new().serve_connection(io, handler).await {
                error!("API connection error: {}", e);
            }
        });
    }
}

/// Delay before the next `accept` after a failed one. Errors about a single
/// peer are retried at once; resource exhaustion (e.g. EMFILE) backs off so
/// the loop does not spin while descriptors are released.
fn accept_backoff(err: &std::io::Error) -> Duration {
    use std::io::ErrorKind;

    match err.kind() {
        ErrorKind::ConnectionAborted | ErrorKind::ConnectionReset | ErrorKind::ConnectionRefused => {
            Duration::ZERO
        }
        _ => ACCEPT_BACKOFF,
    }
}

async fn handle(
    service: Arc<StatisticsService>,
    peer: SocketAddr,
    req: Request<Incoming>,
) -> std::result::Result<HttpResponse, Infallible> {
    let span = info_span!(
        "request",
        request_id = %Uuid::new_v4(),
        method = %req.method(),
        path = %req.uri().path(),
        %peer,
    );

    async move {
        let (parts, body) = req.into_parts();
        let body = match Limited::new(body, MAX_BODY_BYTES).collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                warn!("Failed to read request body: {}", e);
                return Ok(text(StatusCode::BAD_REQUEST, format!("Bad request: {}", e)));
            }
        };

        let response = route(
            &service,
            &parts.method,
            parts.uri.path(),
            parts.uri.query(),
            body,
        )
        .await;
        debug!(status = %response.status(), "Request handled");
        Ok(response)
    }
    .instrument(span)
    .await
}

/// Dispatch one request. Separated from `handle` so it can be driven
/// without a socket.
pub async fn route(
    service: &StatisticsService,
    method: &Method,
    path: &str,
    query: Option<&str>,
    body: Bytes,
) -> HttpResponse {
    match (method, path) {
        (&Method::POST, STATISTICS_PATH) => update_statistics(service, query, &body).await,
        (&Method::GET, STATISTICS_PATH) => top_statistics(service).await,
        (&Method::GET, "/healthz") | (&Method::GET, "/livez") => text(StatusCode::OK, "ok"),
        (&Method::GET, "/readyz") => match service.health_check().await {
            Ok(()) => text(StatusCode::OK, "ok"),
            Err(e) => text(StatusCode::SERVICE_UNAVAILABLE, e.to_string()),
        },
        (&Method::GET, "/metrics") => metrics(),
        (_, STATISTICS_PATH) => text(StatusCode::METHOD_NOT_ALLOWED, "method not allowed"),
        _ => text(StatusCode::NOT_FOUND, "not found"),
    }
}

async fn update_statistics(
    service: &StatisticsService,
    query: Option<&str>,
    body: &[u8],
) -> HttpResponse {
    let Some(country_code) = query_param(query, "countryCode") else {
        return text(StatusCode::BAD_REQUEST, "Bad request: missing countryCode");
    };

    let request: PageViewUpdate = match serde_json::from_slice(body) {
        Ok(request) => request,
        Err(e) => return text(StatusCode::BAD_REQUEST, format!("Bad request: {}", e)),
    };

    let result = service
        .update_statistics(&country_code, &request)
        .await
        .and_then(|outcome| outcome.into_result());

    match result {
        Ok(()) => text(StatusCode::OK, ""),
        Err(e) if e.is_client_error() => text(StatusCode::BAD_REQUEST, format!("Bad request: {}", e)),
        Err(e) => {
            error!("UpdateStatistics failed: {}", e);
            text(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Internal server error: {}", e),
            )
        }
    }
}

async fn top_statistics(service: &StatisticsService) -> HttpResponse {
    match service.get_top_statistics().await {
        Ok(top) => json(StatusCode::OK, &top),
        Err(e) => {
            error!("GetTopStatistics failed: {}", e);
            json(
                StatusCode::INTERNAL_SERVER_ERROR,
                &serde_json::json!({ "error": e.to_string() }),
            )
        }
    }
}

fn metrics() -> HttpResponse {
    match METRICS.encode() {
        Ok((content_type, buffer)) => {
            let mut response = Response::new(Full::new(Bytes::from(buffer)));
            if let Ok(value) = HeaderValue::from_str(&content_type) {
                response.headers_mut().insert(CONTENT_TYPE, value);
            }
            response
        }
        Err(e) => text(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

/// First value of `name` in an `application/x-www-form-urlencoded` query.
fn query_param(query: Option<&str>, name: &str) -> Option<String> {
    form_urlencoded::parse(query?.as_bytes())
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}

fn text(status: StatusCode, body: impl Into<Bytes>) -> HttpResponse {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

fn json<T: serde::Serialize>(status: StatusCode, value: &T) -> HttpResponse {
    match serde_json::to_vec(value) {
        Ok(body) => {
            let mut response = Response::new(Full::new(Bytes::from(body)));
            *response.status_mut() = status;
            response
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            response
        }
        Err(e) => text(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}
