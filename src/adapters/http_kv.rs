//! HTTP Key-Value Store Adapter
//!
//! Implements the `StatisticsStore` port against a key-value service exposing
//! a REST command interface:
//!
//! | Operation | Request | Response |
//! |---|---|---|
//! | get | `GET {base}/get/{key}` | `{"result": "<json>" \| null}` |
//! | set | `POST {base}/set/{key}` (body: record JSON) | `{"result": "OK"}` |
//! | scan | `GET {base}/scan/{cursor}/match/{pattern}/count/{n}` | `{"result": ["<cursor>", ["<key>", ...]]}` |
//! | ping | `GET {base}/ping` | `{"result": "PONG"}` |
//!
//! Failures come back as `{"error": "..."}` or a non-2xx status. Values are
//! stored as JSON strings.

use std::time::Duration;

use async_trait::async_trait;
use futures::future::try_join_all;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::domain::ports::{StatisticsStore, StoreResult};
use crate::domain::StatisticsRecord;
use crate::error::{Error, Result, StoreError};

/// Keys requested per scan page.
const SCAN_PAGE_SIZE: u32 = 100;

/// Configuration for the HTTP key-value adapter
#[derive(Debug, Clone)]
pub struct HttpKvConfig {
    /// Base URL, e.g. `http://127.0.0.1:7379`
    pub base_url: String,
    /// Per-request timeout
    pub timeout: Duration,
    /// Bearer token, if the service requires one
    pub token: Option<String>,
}

impl Default for HttpKvConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:7379".to_string(),
            timeout: Duration::from_secs(5),
            token: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct KvResponse<T> {
    result: Option<T>,
    error: Option<String>,
}

/// Remote store reached over HTTP.
pub struct HttpKvStore {
    config: HttpKvConfig,
    client: Client,
}

impl HttpKvStore {
    pub fn new(config: HttpKvConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            config: HttpKvConfig {
                base_url: config.base_url.trim_end_matches('/').to_string(),
                ..config
            },
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url, path)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Send a request and unwrap the `result` envelope.
    async fn call<T: DeserializeOwned>(
        &self,
        key: &str,
        request: RequestBuilder,
    ) -> StoreResult<Option<T>> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| StoreError::new(key, e))?;

        let status = response.status();
        let body: KvResponse<T> = response
            .json()
            .await
            .map_err(|e| StoreError::new(key, format!("invalid response ({}): {}", status, e)))?;

        if let Some(error) = body.error {
            return Err(StoreError::new(key, error));
        }
        if !status.is_success() {
            return Err(StoreError::new(key, format!("status {}", status)));
        }
        Ok(body.result)
    }

    async fn scan_keys(&self, pattern: &str) -> StoreResult<Vec<String>> {
        let mut keys = Vec::new();
        let mut cursor = "0".to_string();

        loop {
            let path = format!(
                "scan/{}/match/{}/count/{}",
                cursor,
                urlencoding::encode(pattern),
                SCAN_PAGE_SIZE
            );
            let page: Option<(String, Vec<String>)> =
                self.call(pattern, self.client.get(self.url(&path))).await?;
            let Some((next, batch)) = page else {
                break;
            };

            keys.extend(batch);
            if next == "0" {
                break;
            }
            cursor = next;
        }

        Ok(keys)
    }
}

impl std::fmt::Debug for HttpKvStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpKvStore")
            .field("base_url", &self.config.base_url)
            .field("timeout", &self.config.timeout)
            .finish()
    }
}

#[async_trait]
impl StatisticsStore for HttpKvStore {
    #[instrument(skip(self))]
    async fn get(&self, key: &str) -> StoreResult<Option<StatisticsRecord>> {
        let path = format!("get/{}", urlencoding::encode(key));
        let raw: Option<String> = self.call(key, self.client.get(self.url(&path))).await?;

        raw.map(|json| serde_json::from_str(&json).map_err(|e| StoreError::new(key, e)))
            .transpose()
    }

    #[instrument(skip(self, value))]
    async fn set(&self, key: &str, value: &StatisticsRecord) -> StoreResult<()> {
        let path = format!("set/{}", urlencoding::encode(key));
        let body = serde_json::to_string(value).map_err(|e| StoreError::new(key, e))?;

        let _: Option<String> = self
            .call(key, self.client.post(self.url(&path)).body(body))
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn scan_prefix(&self, prefix: &str) -> StoreResult<Vec<StatisticsRecord>> {
        let keys = self.scan_keys(&format!("{}*", prefix)).await?;
        debug!("Scan matched {} keys", keys.len());

        // Keys removed between scan and get come back as None and are skipped.
        let values = try_join_all(keys.iter().map(|key| self.get(key))).await?;
        Ok(values.into_iter().flatten().collect())
    }

    async fn health_check(&self) -> StoreResult<()> {
        let pong: Option<String> = self.call("ping", self.client.get(self.url("ping"))).await?;
        match pong.as_deref() {
            Some("PONG") => Ok(()),
            other => Err(StoreError::new(
                "ping",
                format!("unexpected ping reply: {:?}", other),
            )),
        }
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_creation_trims_base_url() {
        let store = HttpKvStore::new(HttpKvConfig {
            base_url: "http://kv.local:7379/".to_string(),
            ..Default::default()
        })
        .unwrap();

        assert_eq!(store.base_url(), "http://kv.local:7379");
        assert_eq!(store.url("ping"), "http://kv.local:7379/ping");
        assert!(format!("{:?}", store).contains("HttpKvStore"));
        assert_eq!(store.name(), "http");
    }

    #[test]
    fn test_response_envelope_parsing() {
        let ok: KvResponse<String> =
            serde_json::from_str(r#"{"result":"{\"country\":\"US\",\"mostPopularPage\":\"home\",\"views\":3}"}"#)
                .unwrap();
        let record: StatisticsRecord = serde_json::from_str(&ok.result.unwrap()).unwrap();
        assert_eq!(record.views, 3);

        let missing: KvResponse<String> = serde_json::from_str(r#"{"result":null}"#).unwrap();
        assert!(missing.result.is_none());

        let failed: KvResponse<String> =
            serde_json::from_str(r#"{"error":"WRONGTYPE"}"#).unwrap();
        assert_eq!(failed.error.as_deref(), Some("WRONGTYPE"));

        let scan: KvResponse<(String, Vec<String>)> =
            serde_json::from_str(r#"{"result":["0",["top_statistics:US"]]}"#).unwrap();
        assert_eq!(scan.result.unwrap().1, vec!["top_statistics:US".to_string()]);
    }

    #[tokio::test]
    async fn test_unreachable_store_maps_to_store_error() {
        let store = HttpKvStore::new(HttpKvConfig {
            // port 9 (discard) on localhost is not expected to speak HTTP
            base_url: "http://127.0.0.1:9".to_string(),
            timeout: Duration::from_millis(200),
            token: None,
        })
        .unwrap();

        let err = store.get("top_statistics:US").await.unwrap_err();
        assert_eq!(err.key, "top_statistics:US");
    }

    // =========================================================================
    // Against a local key-value server
    // =========================================================================

    /// Minimal server speaking the REST command interface. Scans return one
    /// key on the first page and the rest on the second.
    mod kv_server {
        use std::collections::BTreeMap;
        use std::convert::Infallible;
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        use bytes::Bytes;
        use http_body_util::{BodyExt, Full};
        use hyper::body::Incoming;
        use hyper::header::AUTHORIZATION;
        use hyper::server::conn::http1;
        use hyper::service::service_fn;
        use hyper::{Request, Response, StatusCode};
        use hyper_util::rt::TokioIo;
        use parking_lot::Mutex;
        use serde_json::json;
        use tokio::net::TcpListener;

        pub const TOKEN: &str = "secret";

        #[derive(Default)]
        pub struct KvState {
            pub values: Mutex<BTreeMap<String, String>>,
            pub scans: AtomicUsize,
        }

        pub async fn start() -> (String, Arc<KvState>) {
            let state = Arc::new(KvState::default());
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let base = format!("http://{}", listener.local_addr().unwrap());

            let shared = state.clone();
            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    let shared = shared.clone();
                    tokio::spawn(async move {
                        let svc = service_fn(move |req| handle(shared.clone(), req));
                        let _ = http1::Builder::new()
                            .serve_connection(TokioIo::new(stream), svc)
                            .await;
                    });
                }
            });

            (base, state)
        }

        fn reply(status: StatusCode, body: serde_json::Value) -> Response<Full<Bytes>> {
            let mut response = Response::new(Full::new(Bytes::from(body.to_string())));
            *response.status_mut() = status;
            response
        }

        async fn handle(
            state: Arc<KvState>,
            req: Request<Incoming>,
        ) -> Result<Response<Full<Bytes>>, Infallible> {
            let (parts, body) = req.into_parts();
            let body = body.collect().await.unwrap().to_bytes();

            let bearer = format!("Bearer {}", TOKEN);
            let authorized = parts
                .headers
                .get(AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                == Some(bearer.as_str());
            if !authorized {
                return Ok(reply(StatusCode::UNAUTHORIZED, json!({"error": "unauthorized"})));
            }

            let path = urlencoding::decode(parts.uri.path()).unwrap().into_owned();
            let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();

            let response = match segments.as_slice() {
                ["ping"] => reply(StatusCode::OK, json!({"result": "PONG"})),
                ["get", "down"] => reply(StatusCode::INTERNAL_SERVER_ERROR, json!({})),
                ["get", "broken"] => reply(
                    StatusCode::OK,
                    json!({"error": "WRONGTYPE Operation against a key holding the wrong kind of value"}),
                ),
                ["get", key] => {
                    let value = state.values.lock().get(*key).cloned();
                    reply(StatusCode::OK, json!({"result": value}))
                }
                ["set", key] => {
                    let value = String::from_utf8(body.to_vec()).unwrap();
                    state.values.lock().insert(key.to_string(), value);
                    reply(StatusCode::OK, json!({"result": "OK"}))
                }
                ["scan", cursor, "match", pattern, "count", _] => {
                    state.scans.fetch_add(1, Ordering::SeqCst);
                    if pattern.starts_with("fail") {
                        return Ok(reply(StatusCode::OK, json!({"error": "scan refused"})));
                    }

                    let prefix = pattern.trim_end_matches('*');
                    let keys: Vec<String> = state
                        .values
                        .lock()
                        .keys()
                        .filter(|k| k.starts_with(prefix))
                        .cloned()
                        .collect();
                    let split = keys.len().min(1);
                    let (next, batch) = if *cursor == "0" {
                        ("17", &keys[..split])
                    } else {
                        ("0", &keys[split..])
                    };
                    reply(StatusCode::OK, json!({"result": [next, batch]}))
                }
                _ => reply(StatusCode::NOT_FOUND, json!({})),
            };
            Ok(response)
        }
    }

    fn remote(base: &str, token: Option<&str>) -> HttpKvStore {
        HttpKvStore::new(HttpKvConfig {
            base_url: base.to_string(),
            timeout: Duration::from_secs(5),
            token: token.map(String::from),
        })
        .unwrap()
    }

    fn record(country: &str, page: &str, views: u64) -> StatisticsRecord {
        use crate::domain::{CountryCode, PageId};
        StatisticsRecord::new(CountryCode::new(country), PageId::new(page), views)
    }

    #[tokio::test]
    async fn test_set_get_and_ping() {
        let (base, kv) = kv_server::start().await;
        let store = remote(&base, Some(kv_server::TOKEN));

        store.health_check().await.unwrap();
        assert_eq!(store.get("top_statistics:US").await.unwrap(), None);

        let us = record("US", "home", 10);
        store.set("top_statistics:US", &us).await.unwrap();

        let raw = kv.values.lock().get("top_statistics:US").cloned().unwrap();
        let stored: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(
            stored,
            serde_json::json!({"country": "US", "mostPopularPage": "home", "views": 10})
        );
        assert_eq!(store.get("top_statistics:US").await.unwrap(), Some(us));
    }

    #[tokio::test]
    async fn test_scan_prefix_follows_cursor_pages() {
        let (base, kv) = kv_server::start().await;
        let store = remote(&base, Some(kv_server::TOKEN));

        for (country, page, views) in [("US", "about", 25), ("RU", "news", 7), ("CY", "beach", 3)] {
            let key = format!("top_statistics:{}", country);
            store.set(&key, &record(country, page, views)).await.unwrap();
        }
        store
            .set("statistics:US:page:about", &record("US", "about", 25))
            .await
            .unwrap();

        let mut found = store.scan_prefix("top_statistics:").await.unwrap();
        found.sort_by(|a, b| a.country.cmp(&b.country));

        assert_eq!(
            found,
            vec![
                record("CY", "beach", 3),
                record("RU", "news", 7),
                record("US", "about", 25),
            ]
        );
        assert_eq!(kv.scans.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failures_carry_the_key() {
        let (base, kv) = kv_server::start().await;
        let store = remote(&base, Some(kv_server::TOKEN));

        let err = store.get("broken").await.unwrap_err();
        assert_eq!(err.key, "broken");
        assert!(err.cause.contains("WRONGTYPE"));

        let err = store.get("down").await.unwrap_err();
        assert_eq!(err.key, "down");
        assert!(err.cause.contains("500"));

        kv.values
            .lock()
            .insert("top_statistics:RU".to_string(), "not json".to_string());
        let err = store.get("top_statistics:RU").await.unwrap_err();
        assert_eq!(err.key, "top_statistics:RU");

        // an undecodable value fails the scan fan-out too
        let err = store.scan_prefix("top_statistics:").await.unwrap_err();
        assert_eq!(err.key, "top_statistics:RU");

        let err = store.scan_prefix("fail:").await.unwrap_err();
        assert_eq!(err.key, "fail:*");
        assert!(err.cause.contains("scan refused"));
    }

    #[tokio::test]
    async fn test_bearer_token_is_sent() {
        let (base, _) = kv_server::start().await;

        let err = remote(&base, None).health_check().await.unwrap_err();
        assert_eq!(err.key, "ping");
        assert!(err.cause.contains("unauthorized"));

        let err = remote(&base, Some("wrong"))
            .get("top_statistics:US")
            .await
            .unwrap_err();
        assert_eq!(err.key, "top_statistics:US");

        assert!(remote(&base, Some(kv_server::TOKEN))
            .health_check()
            .await
            .is_ok());
    }
}
