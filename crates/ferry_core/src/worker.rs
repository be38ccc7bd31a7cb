use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use hyper::body::Incoming;
use hyper::server::conn::{http1, http2};
use hyper::service::service_fn;
use hyper::Request;
use hyper_util::rt::{TokioExecutor, TokioIo, TokioTimer};
use tokio::io::{AsyncRead, AsyncWrite};

use ferry_proxy::Proxy;

/// Bound on how long a client may dribble request headers.
const HEADER_READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Serve one accepted connection over HTTP/1.1, dispatching every request
/// through the proxy.
pub(crate) async fn serve_http1<S>(
    stream: S,
    client_addr: SocketAddr,
    proxy: Arc<Proxy>,
    is_tls: bool,
) -> anyhow::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let io = TokioIo::new(stream);
    let service = service_fn(move |req: Request<Incoming>| {
        let proxy = proxy.clone();
        async move { Ok::<_, Infallible>(proxy.serve(req, client_addr, is_tls).await) }
    });

    http1::Builder::new()
        .timer(TokioTimer::new())
        .header_read_timeout(HEADER_READ_TIMEOUT)
        .serve_connection(io, service)
        .await
        .context("HTTP/1.1 connection error")?;

    Ok(())
}

/// Serve one accepted connection over HTTP/2 (reached via TLS ALPN).
pub(crate) async fn serve_h2<S>(
    stream: S,
    client_addr: SocketAddr,
    proxy: Arc<Proxy>,
) -> anyhow::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let io = TokioIo::new(stream);
    let service = service_fn(move |req: Request<Incoming>| {
        let proxy = proxy.clone();
        async move { Ok::<_, Infallible>(proxy.serve(req, client_addr, true).await) }
    });

    http2::Builder::new(TokioExecutor::new())
        .serve_connection(io, service)
        .await
        .context("HTTP/2 connection error")?;

    Ok(())
}
