use axum::body::Bytes;
use axum::http::HeaderMap;

/// One inbound RPC call as seen by the interceptor chain.
///
/// Serialization and framing are the transport's business; the body is opaque.
#[derive(Debug, Clone)]
pub struct RpcCall {
    procedure: String,
    headers: HeaderMap,
    body: Bytes,
}

impl RpcCall {
    pub fn new(procedure: impl Into<String>, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            procedure: procedure.into(),
            headers,
            body,
        }
    }

    /// `/package.Service/Method`. Used for routing and audit, never for authorization by itself.
    pub fn procedure(&self) -> &str {
        &self.procedure
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Header value by name, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn service_and_method(&self) -> (&str, &str) {
        split_procedure(&self.procedure)
    }
}

#[derive(Debug, Clone, Default)]
pub struct RpcResponse {
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl RpcResponse {
    pub fn new(body: impl Into<Bytes>) -> Self {
        Self {
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    pub fn json<T: serde::Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        let mut resp = Self::new(serde_json::to_vec(value)?);
        resp.headers.insert(
            axum::http::header::CONTENT_TYPE,
            axum::http::HeaderValue::from_static("application/json"),
        );
        Ok(resp)
    }
}

/// Split `/pkg.Service/Method` into (`Service`, `Method`).
///
/// Anything that does not have that shape yields `("unknown", "unknown")`.
pub fn split_procedure(procedure: &str) -> (&str, &str) {
    let mut parts = procedure.split('/');
    let (Some(""), Some(service), Some(method)) = (parts.next(), parts.next(), parts.next()) else {
        return ("unknown", "unknown");
    };
    if service.is_empty() || method.is_empty() {
        return ("unknown", "unknown");
    }

    let service = service.rsplit('.').next().unwrap_or(service);
    (service, method)
}
