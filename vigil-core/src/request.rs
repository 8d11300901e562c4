//! A single HTTP transaction as seen by the proxy.

/// One proxy-log line. Two requests are the same request iff every field
/// matches (structural identity).
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Request {
    /// Epoch millis of the transaction.
    pub time: i64,
    /// Service time in millis.
    pub elapsed: u32,
    /// Client identifier (IPv4 dotted quad for the common case).
    pub client: String,
    /// HTTP status code.
    pub code: u16,
    /// HTTP method.
    pub method: String,
    /// Full request target.
    pub url: String,
    /// Response size in bytes.
    pub bytes: u64,
    /// Upstream peering status reported by the proxy.
    pub peer_status: String,
    /// Upstream host the proxy contacted.
    pub peer_host: String,
    /// Response content type.
    pub content_type: String,
}
