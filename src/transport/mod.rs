mod fallback_policy;
mod http_transport;

pub use fallback_policy::is_streaming_rejection;
pub use http_transport::HttpTransport;
