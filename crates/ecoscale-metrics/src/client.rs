//! Prometheus HTTP API client.
//!
//! Issues instant queries (`GET /api/v1/query`) over a fresh HTTP/1.1
//! connection per query, bounded by a timeout. Only vector results are
//! accepted.

use std::collections::HashMap;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Empty};
use serde::Deserialize;
use tracing::debug;

use ecoscale_core::QueryError;

use crate::source::{MetricsSource, QueryFuture, Sample};

/// Client for one Prometheus server.
#[derive(Debug, Clone)]
pub struct PromClient {
    /// `host:port` to connect to.
    address: String,
    /// Host header value.
    host: String,
    /// Path prefix in front of `/api/v1/query` (empty for the root).
    prefix: String,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    status: String,
    #[serde(default)]
    data: Option<QueryData>,
    #[serde(rename = "errorType", default)]
    error_type: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QueryData {
    #[serde(rename = "resultType")]
    result_type: String,
    result: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct VectorSample {
    #[serde(default)]
    metric: HashMap<String, String>,
    /// `[unix_ts, "value"]`
    value: (f64, String),
}

impl PromClient {
    /// Build a client for an `http://host[:port][/prefix]` base URL.
    pub fn new(url: &str, timeout: Duration) -> Result<Self, QueryError> {
        let invalid = |reason: &str| QueryError::InvalidUrl {
            url: url.to_string(),
            reason: reason.to_string(),
        };
        let uri: http::Uri = url.parse().map_err(|_| invalid("not a valid URI"))?;
        if uri.scheme_str() != Some("http") {
            return Err(invalid("only http:// is supported"));
        }
        let authority = uri.authority().ok_or_else(|| invalid("missing host"))?;
        let port = authority.port_u16().unwrap_or(80);

        Ok(Self {
            address: format!("{}:{}", authority.host(), port),
            host: authority.as_str().to_string(),
            prefix: uri.path().trim_end_matches('/').to_string(),
            timeout,
        })
    }

    /// Request target for `expression`.
    pub fn query_path(&self, expression: &str) -> String {
        format!(
            "{}/api/v1/query?query={}",
            self.prefix,
            urlencoding::encode(expression)
        )
    }

    async fn execute(&self, expression: &str) -> Result<Vec<Sample>, QueryError> {
        let path = self.query_path(expression);

        let stream = tokio::net::TcpStream::connect(&self.address)
            .await
            .map_err(|e| QueryError::Connect {
                address: self.address.clone(),
                reason: e.to_string(),
            })?;

        let io = hyper_util::rt::TokioIo::new(stream);
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(|e| QueryError::Connect {
                address: self.address.clone(),
                reason: e.to_string(),
            })?;

        // Drive the connection in the background.
        tokio::spawn(async move {
            let _ = conn.await;
        });

        let req = http::Request::builder()
            .method("GET")
            .uri(&path)
            .header("host", &self.host)
            .header("accept", "application/json")
            .header("user-agent", "ecoscale/0.1")
            .body(Empty::<Bytes>::new())
            .map_err(|e| QueryError::Http(e.to_string()))?;

        let resp = sender
            .send_request(req)
            .await
            .map_err(|e| QueryError::Http(e.to_string()))?;
        let status = resp.status();
        let body = resp
            .into_body()
            .collect()
            .await
            .map_err(|e| QueryError::Http(e.to_string()))?
            .to_bytes();

        debug!(%status, bytes = body.len(), %path, "telemetry query answered");

        let parsed = parse_query_response(&body);
        if status.is_success() {
            return parsed;
        }
        // Prometheus reports query errors as JSON with a 4xx/5xx status.
        match parsed {
            Err(e @ QueryError::Rejected { .. }) => Err(e),
            _ => Err(QueryError::Status(status.as_u16())),
        }
    }
}

impl MetricsSource for PromClient {
    fn query<'a>(&'a self, expression: &'a str) -> QueryFuture<'a> {
        Box::pin(async move {
            match tokio::time::timeout(self.timeout, self.execute(expression)).await {
                Ok(result) => result,
                Err(_) => Err(QueryError::Timeout(self.timeout)),
            }
        })
    }
}

/// Decode an instant-query response body into samples.
pub fn parse_query_response(body: &[u8]) -> Result<Vec<Sample>, QueryError> {
    let resp: QueryResponse =
        serde_json::from_slice(body).map_err(|e| QueryError::Parse(e.to_string()))?;

    if resp.status != "success" {
        return Err(QueryError::Rejected {
            error_type: resp.error_type.unwrap_or_else(|| resp.status.clone()),
            error: resp.error.unwrap_or_default(),
        });
    }

    let data = resp
        .data
        .ok_or_else(|| QueryError::Parse("missing data".to_string()))?;
    if data.result_type != "vector" {
        return Err(QueryError::Parse(format!(
            "expected vector result, got {}",
            data.result_type
        )));
    }

    let series: Vec<VectorSample> =
        serde_json::from_value(data.result).map_err(|e| QueryError::Parse(e.to_string()))?;

    series
        .into_iter()
        .map(|s| {
            let value = s.value.1.trim().parse::<f64>().map_err(|_| {
                QueryError::Parse(format!("non-numeric sample value {:?}", s.value.1))
            })?;
            Ok(Sample {
                labels: s.metric,
                value,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    const VECTOR_BODY: &str = r#"{
        "status": "success",
        "data": {
            "resultType": "vector",
            "result": [
                {"metric": {"deployment": "s1"}, "value": [1700000000.5, "2"]},
                {"metric": {"deployment": "s2"}, "value": [1700000000.5, "NaN"]}
            ]
        }
    }"#;

    /// Serve one canned HTTP response and hand back the request head.
    async fn serve_once(
        status_line: &'static str,
        body: &'static str,
    ) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut head = Vec::new();
            let mut buf = [0u8; 1024];
            while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                head.extend_from_slice(&buf[..n]);
            }
            let response = format!(
                "{status_line}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            String::from_utf8_lossy(&head).into_owned()
        });
        (format!("http://{addr}"), handle)
    }

    #[test]
    fn parses_vector_response() {
        let samples = parse_query_response(VECTOR_BODY.as_bytes()).unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].label("deployment"), Some("s1"));
        assert_eq!(samples[0].value, 2.0);
        assert!(samples[1].value.is_nan());
    }

    #[test]
    fn error_status_is_rejected() {
        let body = br#"{"status":"error","errorType":"bad_data","error":"parse error at char 5"}"#;
        let err = parse_query_response(body).unwrap_err();
        assert!(matches!(
            err,
            QueryError::Rejected { ref error_type, .. } if error_type == "bad_data"
        ));
    }

    #[test]
    fn non_vector_result_is_a_parse_error() {
        let body = br#"{"status":"success","data":{"resultType":"scalar","result":[1.0,"3"]}}"#;
        assert!(matches!(
            parse_query_response(body),
            Err(QueryError::Parse(_))
        ));
    }

    #[test]
    fn garbage_is_a_parse_error() {
        assert!(matches!(
            parse_query_response(b"<html>"),
            Err(QueryError::Parse(_))
        ));
        let body = br#"{"status":"success","data":{"resultType":"vector","result":[{"metric":{},"value":[1,"abc"]}]}}"#;
        assert!(matches!(
            parse_query_response(body),
            Err(QueryError::Parse(_))
        ));
    }

    #[test]
    fn url_forms() {
        let client = PromClient::new("http://192.168.49.2:30000", Duration::from_secs(1)).unwrap();
        assert_eq!(client.address, "192.168.49.2:30000");
        assert_eq!(client.prefix, "");

        let client = PromClient::new("http://prom.local/prometheus/", Duration::from_secs(1)).unwrap();
        assert_eq!(client.address, "prom.local:80");
        assert!(client.query_path("up").starts_with("/prometheus/api/v1/query?query=up"));

        assert!(PromClient::new("https://prom:9090", Duration::from_secs(1)).is_err());
    }

    #[test]
    fn query_is_percent_encoded() {
        let client = PromClient::new("http://prom:9090", Duration::from_secs(1)).unwrap();
        let path = client.query_path(r#"up{job="x"}"#);
        assert_eq!(path, "/api/v1/query?query=up%7Bjob%3D%22x%22%7D");
    }

    #[tokio::test]
    async fn queries_live_endpoint() {
        let (url, server) = serve_once("HTTP/1.1 200 OK", VECTOR_BODY).await;
        let client = PromClient::new(&url, Duration::from_secs(5)).unwrap();

        let samples = client.query("kube_deployment_status_replicas").await.unwrap();
        assert_eq!(samples.len(), 2);

        let head = server.await.unwrap();
        assert!(head.starts_with("GET /api/v1/query?query=kube_deployment_status_replicas HTTP/1.1"));
    }

    #[tokio::test]
    async fn http_error_status_is_reported() {
        let (url, server) = serve_once("HTTP/1.1 503 Service Unavailable", "{}").await;
        let client = PromClient::new(&url, Duration::from_secs(5)).unwrap();

        let err = client.query("up").await.unwrap_err();
        assert!(matches!(err, QueryError::Status(503)));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn bad_query_surfaces_backend_error() {
        let (url, server) = serve_once(
            "HTTP/1.1 400 Bad Request",
            r#"{"status":"error","errorType":"bad_data","error":"unexpected end of input"}"#,
        )
        .await;
        let client = PromClient::new(&url, Duration::from_secs(5)).unwrap();

        let err = client.query("rate(").await.unwrap_err();
        assert!(matches!(err, QueryError::Rejected { .. }));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn unreachable_backend_is_a_connect_error() {
        // Bind then drop to get a port nobody listens on.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = PromClient::new(&format!("http://{addr}"), Duration::from_secs(5)).unwrap();
        let err = client.query("up").await.unwrap_err();
        assert!(matches!(err, QueryError::Connect { .. }));
    }

    #[tokio::test]
    async fn silent_backend_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _server = tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
        });

        let client =
            PromClient::new(&format!("http://{addr}"), Duration::from_millis(200)).unwrap();
        let err = client.query("up").await.unwrap_err();
        assert!(matches!(err, QueryError::Timeout(_)));
    }
}
