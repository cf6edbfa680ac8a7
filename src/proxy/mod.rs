//
// src/proxy/mod.rs
//
mod backend;
mod forwarder;
mod pool;
mod proxy;
mod request;

pub use backend::Backend;
pub use forwarder::{build_client, ForwardError, Forwarder, HttpForwarder, HttpsClient};
pub use pool::{BackendPool, PoolError};
pub use proxy::{Proxy, ProxyError};
pub use request::{BodyError, ProxyRequest, REQUEST_ID_HEADER};
