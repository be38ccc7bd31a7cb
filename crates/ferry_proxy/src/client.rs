use std::time::Duration;

use ferry_http::ProxyBody;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::{TokioExecutor, TokioTimer};

/// The pooled outbound client shared by dispatch and the health prober.
pub(crate) type HttpClient = Client<HttpConnector, ProxyBody>;

/// Build the shared client with the forwarding transport defaults: short
/// connect timeout, TCP keepalive, and a generous idle pool per upstream.
pub(crate) fn build_http_client() -> HttpClient {
    let mut connector = HttpConnector::new();
    connector.set_connect_timeout(Some(Duration::from_secs(5)));
    connector.set_keepalive(Some(Duration::from_secs(30)));
    connector.set_nodelay(true);

    Client::builder(TokioExecutor::new())
        .pool_timer(TokioTimer::new())
        .pool_idle_timeout(Duration::from_secs(90))
        .pool_max_idle_per_host(128)
        .build(connector)
}
