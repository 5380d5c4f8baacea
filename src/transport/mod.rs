mod http_transport;
mod retry_policy;
mod upstream_api;

pub use http_transport::HttpTransport;
pub use upstream_api::{UpstreamApi, CONVERSATION_READ_LIMIT, UPSTREAM_ERROR_DETAILS_MAX};
