// src/proxy/request.rs
// Inbound request buffered once so every retry and reroute replays the same bytes.

use hyper::body::{Bytes, HttpBody};
use hyper::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_LENGTH, HOST};
use hyper::{Body, Method, Request, Uri, Version};
use std::net::SocketAddr;
use url::{Position, Url};

use super::forwarder::ForwardError;

pub const REQUEST_ID_HEADER: &str = "x-request-id";
const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

const HOP_BY_HOP_HEADERS: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

#[derive(Debug, thiserror::Error)]
pub enum BodyError {
    #[error("Request body exceeds {0} bytes")]
    TooLarge(usize),

    #[error("Failed to read request body: {0}")]
    Read(#[from] hyper::Error),
}

#[derive(Debug, Clone)]
pub struct ProxyRequest {
    pub method: Method,
    pub uri: Uri,
    pub version: Version,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub remote_addr: Option<SocketAddr>,
}

impl ProxyRequest {
    /// Buffer the inbound request, refusing bodies over `max_body_bytes`.
    /// A declared length over the limit is rejected before reading anything;
    /// a streamed body is abandoned as soon as it crosses the limit.
    pub async fn from_hyper(
        req: Request<Body>,
        remote_addr: Option<SocketAddr>,
        max_body_bytes: usize,
    ) -> Result<Self, BodyError> {
        let (parts, mut body) = req.into_parts();
        let limit = max_body_bytes as u64;

        let declared = parts
            .headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        if declared.map_or(false, |len| len > limit) || body.size_hint().lower() > limit {
            return Err(BodyError::TooLarge(max_body_bytes));
        }

        let mut buffer = Vec::new();
        while let Some(chunk) = body.data().await {
            let chunk = chunk?;
            if buffer.len() + chunk.len() > max_body_bytes {
                return Err(BodyError::TooLarge(max_body_bytes));
            }
            buffer.extend_from_slice(&chunk);
        }

        Ok(Self {
            method: parts.method,
            uri: parts.uri,
            version: parts.version,
            headers: parts.headers,
            body: Bytes::from(buffer),
            remote_addr,
        })
    }

    /// Path and query of the inbound request, `/` when absent.
    pub fn path(&self) -> &str {
        self.uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/")
    }

    pub fn request_id(&self) -> Option<&str> {
        self.headers
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
    }

    pub fn set_request_id(&mut self, id: &str) {
        if let Ok(value) = HeaderValue::from_str(id) {
            self.headers
                .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
        }
    }

    /// Target URI: backend scheme and authority verbatim, backend base path
    /// joined with the inbound path and query.
    pub fn target_uri(&self, target: &Url) -> Result<Uri, ForwardError> {
        let origin = &target[..Position::AfterPort];
        let base = target.path().trim_end_matches('/');
        let path = self.path();
        let path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{}", path)
        };

        format!("{}{}{}", origin, base, path)
            .parse::<Uri>()
            .map_err(|e| ForwardError::InvalidTarget(e.to_string()))
    }

    /// Build the outbound request for one forwarding attempt.
    pub fn to_backend_request(&self, target: &Url) -> Result<Request<Body>, ForwardError> {
        let uri = self.target_uri(target)?;

        let mut headers = self.headers.clone();
        strip_hop_by_hop(&mut headers);
        // hyper sets Host from the target URI.
        headers.remove(HOST);

        if let Some(addr) = self.remote_addr {
            let client_ip = addr.ip().to_string();
            let forwarded = match headers.get(FORWARDED_FOR_HEADER).and_then(|v| v.to_str().ok()) {
                Some(prior) => format!("{}, {}", prior, client_ip),
                None => client_ip,
            };
            if let Ok(value) = HeaderValue::from_str(&forwarded) {
                headers.insert(HeaderName::from_static(FORWARDED_FOR_HEADER), value);
            }
        }

        let mut request = Request::builder()
            .method(self.method.clone())
            .uri(uri)
            .body(Body::from(self.body.clone()))
            .map_err(|e| ForwardError::InvalidTarget(e.to_string()))?;
        *request.headers_mut() = headers;
        Ok(request)
    }
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    // Headers named in Connection are hop-by-hop as well.
    let listed: Vec<String> = headers
        .get_all(hyper::header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|name| name.trim().to_ascii_lowercase())
        .filter(|name| !name.is_empty())
        .collect();

    for name in &listed {
        headers.remove(name.as_str());
    }
    for name in HOP_BY_HOP_HEADERS {
        headers.remove(name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(uri: &str) -> ProxyRequest {
        ProxyRequest {
            method: Method::GET,
            uri: uri.parse().unwrap(),
            version: Version::HTTP_11,
            headers: HeaderMap::new(),
            body: Bytes::from_static(b"payload"),
            remote_addr: Some("192.168.1.7:52100".parse().unwrap()),
        }
    }

    #[test]
    fn test_target_uri_keeps_backend_authority() {
        let req = request("/api/users?page=2");
        let target = Url::parse("https://10.0.0.5:8443").unwrap();
        assert_eq!(
            req.target_uri(&target).unwrap().to_string(),
            "https://10.0.0.5:8443/api/users?page=2"
        );
    }

    #[test]
    fn test_target_uri_joins_base_path() {
        let req = request("/users");
        let target = Url::parse("http://backend:3031/v1/").unwrap();
        assert_eq!(
            req.target_uri(&target).unwrap().to_string(),
            "http://backend:3031/v1/users"
        );
    }

    #[test]
    fn test_backend_request_strips_hop_by_hop_and_appends_forwarded_for() {
        let mut req = request("/");
        req.headers
            .insert("connection", HeaderValue::from_static("keep-alive, x-secret"));
        req.headers.insert("x-secret", HeaderValue::from_static("1"));
        req.headers.insert("keep-alive", HeaderValue::from_static("timeout=5"));
        req.headers.insert(HOST, HeaderValue::from_static("lb.example"));
        req.headers
            .insert("x-forwarded-for", HeaderValue::from_static("10.1.1.1"));
        req.headers.insert("accept", HeaderValue::from_static("*/*"));

        let out = req
            .to_backend_request(&Url::parse("http://backend:3031").unwrap())
            .unwrap();
        let headers = out.headers();
        assert!(headers.get("connection").is_none());
        assert!(headers.get("x-secret").is_none());
        assert!(headers.get("keep-alive").is_none());
        assert!(headers.get(HOST).is_none());
        assert_eq!(headers["accept"], "*/*");
        assert_eq!(headers["x-forwarded-for"], "10.1.1.1, 192.168.1.7");
    }

    #[tokio::test]
    async fn test_from_hyper_enforces_body_limit() {
        let req = Request::post("/upload").body(Body::from("0123456789")).unwrap();
        let buffered = ProxyRequest::from_hyper(req, None, 10).await.unwrap();
        assert_eq!(&buffered.body[..], b"0123456789");

        // Declared length over the limit.
        let req = Request::post("/upload")
            .header(CONTENT_LENGTH, "4096")
            .body(Body::empty())
            .unwrap();
        assert!(matches!(
            ProxyRequest::from_hyper(req, None, 10).await,
            Err(BodyError::TooLarge(10))
        ));

        // Chunked body with no length up front.
        let chunks: Vec<Result<&'static str, std::io::Error>> = vec![Ok("012345"), Ok("6789ab")];
        let req = Request::post("/upload")
            .body(Body::wrap_stream(futures::stream::iter(chunks)))
            .unwrap();
        assert!(matches!(
            ProxyRequest::from_hyper(req, None, 10).await,
            Err(BodyError::TooLarge(10))
        ));
    }

    #[test]
    fn test_request_id_round_trip_through_headers() {
        let mut req = request("/");
        assert!(req.request_id().is_none());
        req.set_request_id("abc-123");
        assert_eq!(req.request_id(), Some("abc-123"));
    }
}
