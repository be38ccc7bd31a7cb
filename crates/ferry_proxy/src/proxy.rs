use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use ferry_http::{text_response, ProxyBody};
use http::header::{HeaderValue, HOST};
use http::{Request, Response, StatusCode};
use http_body_util::combinators::BoxBody;
use hyper::body::Body;
use tracing::{debug, warn};

use crate::balance::{new_balancer, Balancer, PickState};
use crate::body::DoneBody;
use crate::client::{build_http_client, HttpClient};
use crate::headers::{
    append_forwarded_for, copy_headers, set_forwarded_host, set_forwarded_proto, strip_hop_by_hop,
};
use crate::health::HealthState;
use crate::options::ProxyOptions;
use crate::path::join_url_path;
use crate::upstream::Upstream;

/// =======================================================
/// DISPATCH HANDLER
/// =======================================================
///
/// Per-request flow: pick an upstream, rewrite the inbound request onto it,
/// issue it through the shared client, and stream the response back. The
/// pick's release token rides inside the response body so the in-flight
/// counter drops exactly once when the body closes; failure paths before the
/// handoff release it directly.
pub struct Proxy {
    upstreams: Arc<Vec<Upstream>>,
    client: HttpClient,
    balancer: Box<dyn Balancer>,
    health: Arc<HealthState>,
    pick_state: Arc<PickState>,
}

impl Proxy {
    pub fn new(opts: ProxyOptions) -> Self {
        let upstreams = Arc::new(opts.upstreams);
        let client = build_http_client();

        let health = Arc::new(HealthState::new(
            Arc::clone(&upstreams),
            client.clone(),
            opts.health_path,
            opts.health_interval,
            opts.health_timeout,
            opts.passive_fail_cooldown,
        ));
        health.start();

        let pick_state = PickState::new(upstreams.len());
        let balancer = new_balancer(
            opts.algo,
            upstreams.len(),
            Some(Arc::clone(&health)),
            Arc::clone(&pick_state),
        );

        Self {
            upstreams,
            client,
            balancer,
            health,
            pick_state,
        }
    }

    pub fn health(&self) -> &Arc<HealthState> {
        &self.health
    }

    /// Handle one inbound request end to end. Never fails: transport and
    /// selection errors become 502 responses.
    pub async fn serve<B>(
        &self,
        req: Request<B>,
        client_addr: SocketAddr,
        is_tls: bool,
    ) -> Response<ProxyBody>
    where
        B: Body<Data = Bytes, Error = hyper::Error> + Send + Sync + 'static,
    {
        let Some(pick) = self.balancer.pick() else {
            debug!(target: "ferry::proxy", "no upstream selectable");
            return text_response(StatusCode::BAD_GATEWAY, "no upstreams available");
        };
        let upstream = &self.upstreams[pick.index];

        let outbound = match build_upstream_request(req, upstream, client_addr, is_tls) {
            Ok(outbound) => outbound,
            Err(e) => {
                warn!(
                    target: "ferry::proxy",
                    upstream = %upstream,
                    error = ?e,
                    "failed to build upstream request"
                );
                pick.done.fire();
                return text_response(StatusCode::BAD_GATEWAY, "bad gateway");
            }
        };

        debug!(
            target: "ferry::proxy",
            method = %outbound.method(),
            uri = %outbound.uri(),
            upstream = %upstream,
            "forwarding request"
        );

        let resp = match self.client.request(outbound).await {
            Ok(resp) => resp,
            Err(e) => {
                warn!(
                    target: "ferry::proxy",
                    upstream = %upstream,
                    error = ?e,
                    "upstream request failed"
                );
                self.health.mark_passive_failure(pick.index);
                pick.done.fire();
                return text_response(StatusCode::BAD_GATEWAY, "bad gateway");
            }
        };

        let (mut parts, body) = resp.into_parts();
        strip_hop_by_hop(&mut parts.headers);

        // Release of the pick now belongs to the response body.
        let body = BoxBody::new(DoneBody::new(body, pick.done));
        Response::from_parts(parts, body)
    }

    /// Best-effort snapshot of the in-flight count for upstream index `i`.
    pub fn active_count(&self, i: usize) -> i64 {
        self.pick_state.active(i)
    }
}

/// Rewrite the inbound request onto the chosen upstream: joined path, the
/// inbound raw query, streamed body, copied-then-stripped headers, Host set
/// to the upstream authority, and the forwarding headers appended.
fn build_upstream_request<B>(
    req: Request<B>,
    upstream: &Upstream,
    client_addr: SocketAddr,
    is_tls: bool,
) -> anyhow::Result<Request<ProxyBody>>
where
    B: Body<Data = Bytes, Error = hyper::Error> + Send + Sync + 'static,
{
    let (parts, body) = req.into_parts();

    let path = join_url_path(upstream.path(), parts.uri.path());
    let target = upstream.target_uri(&path, parts.uri.query())?;

    let inbound_host = parts
        .headers
        .get(HOST)
        .cloned()
        .or_else(|| {
            // HTTP/2 requests carry the host in :authority instead.
            parts
                .uri
                .authority()
                .and_then(|a| HeaderValue::from_str(a.as_str()).ok())
        })
        .filter(|v| !v.is_empty());

    let mut out = Request::new(BoxBody::new(body));
    *out.method_mut() = parts.method;
    *out.uri_mut() = target;

    let headers = out.headers_mut();
    copy_headers(headers, &parts.headers);
    strip_hop_by_hop(headers);

    headers.insert(HOST, HeaderValue::from_str(upstream.authority().as_str())?);

    append_forwarded_for(headers, &client_addr.ip().to_string());
    set_forwarded_proto(headers, is_tls);
    set_forwarded_host(headers, inbound_host);

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::LbAlgo;
    use crate::upstream::parse_upstreams;

    use std::time::Duration;

    use ferry_http::full_body;
    use http_body_util::BodyExt;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;

    fn proxy_for(csv: &str, algo: LbAlgo, cooldown: Duration) -> Proxy {
        Proxy::new(ProxyOptions {
            upstreams: parse_upstreams(csv).unwrap(),
            algo,
            passive_fail_cooldown: cooldown,
            ..ProxyOptions::default()
        })
    }

    fn client_addr() -> SocketAddr {
        "203.0.113.7:40000".parse().unwrap()
    }

    /// One-shot upstream: accepts a single connection, captures the request
    /// head, and answers 200 with a small body.
    async fn spawn_upstream() -> (SocketAddr, oneshot::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (head_tx, head_rx) = oneshot::channel();

        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 1024];
            loop {
                let n = stream.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
                if buf.windows(4).any(|w| w == b"\r\n\r\n") {
                    break;
                }
            }
            let _ = head_tx.send(String::from_utf8_lossy(&buf).into_owned());

            let resp = b"HTTP/1.1 200 OK\r\ncontent-length: 5\r\nx-upstream: 1\r\nconnection: keep-alive\r\n\r\nhello";
            stream.write_all(resp).await.unwrap();
            stream.flush().await.unwrap();
        });

        (addr, head_rx)
    }

    #[tokio::test]
    async fn serve_forwards_and_streams_the_response() {
        let (addr, head_rx) = spawn_upstream().await;
        let proxy = proxy_for(
            &format!("http://{addr}"),
            LbAlgo::RoundRobin,
            Duration::ZERO,
        );

        let req = Request::builder()
            .method("GET")
            .uri("/greet?lang=en")
            .header("host", "ferry.example")
            .header("connection", "x-secret")
            .header("x-secret", "hidden")
            .header("x-app", "ok")
            .body(full_body(Bytes::new()))
            .unwrap();

        let resp = proxy.serve(req, client_addr(), false).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers().get("x-upstream").unwrap(), "1");
        // Inbound-direction hop-by-hop stripping applies to the relayed
        // response too.
        assert!(resp.headers().get("connection").is_none());

        let body = resp.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"hello");
        assert_eq!(proxy.active_count(0), 0);

        let head = head_rx.await.unwrap().to_ascii_lowercase();
        assert!(head.starts_with("get /greet?lang=en http/1.1"));
        assert!(head.contains(&format!("host: {addr}")));
        assert!(head.contains("x-forwarded-for: 203.0.113.7"));
        assert!(head.contains("x-forwarded-proto: http"));
        assert!(head.contains("x-forwarded-host: ferry.example"));
        assert!(head.contains("x-app: ok"));
        assert!(!head.contains("x-secret"));
        assert!(!head.contains("connection: x-secret"));
    }

    #[tokio::test]
    async fn empty_inbound_host_is_not_forwarded() {
        let (addr, head_rx) = spawn_upstream().await;
        let proxy = proxy_for(
            &format!("http://{addr}"),
            LbAlgo::RoundRobin,
            Duration::ZERO,
        );

        let req = Request::builder()
            .method("GET")
            .uri("/")
            .header("host", "")
            .body(full_body(Bytes::new()))
            .unwrap();

        let resp = proxy.serve(req, client_addr(), false).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let head = head_rx.await.unwrap().to_ascii_lowercase();
        assert!(!head.contains("x-forwarded-host"));
    }

    #[tokio::test]
    async fn serve_joins_upstream_and_inbound_paths() {
        let (addr, head_rx) = spawn_upstream().await;
        let proxy = proxy_for(
            &format!("http://{addr}/api/"),
            LbAlgo::LeastConn,
            Duration::ZERO,
        );

        let req = Request::builder()
            .method("GET")
            .uri("/users")
            .header("host", "ferry.example")
            .body(full_body(Bytes::new()))
            .unwrap();

        let resp = proxy.serve(req, client_addr(), false).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let head = head_rx.await.unwrap().to_ascii_lowercase();
        assert!(head.starts_with("get /api/users http/1.1"));
    }

    #[tokio::test]
    async fn transport_failure_marks_passive_and_returns_502() {
        // Bind then drop so the port is very likely unoccupied.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let proxy = proxy_for(
            &format!("http://{addr}"),
            LbAlgo::RoundRobin,
            Duration::from_secs(5),
        );

        let req = Request::builder()
            .method("GET")
            .uri("/")
            .body(full_body(Bytes::new()))
            .unwrap();

        let resp = proxy.serve(req, client_addr(), false).await;
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"bad gateway");

        assert!(!proxy.health().is_healthy(0));
        assert_eq!(proxy.active_count(0), 0);
    }

    #[tokio::test]
    async fn empty_upstream_set_returns_502() {
        let proxy = Proxy::new(ProxyOptions::default());

        let req = Request::builder()
            .method("GET")
            .uri("/")
            .body(full_body(Bytes::new()))
            .unwrap();

        let resp = proxy.serve(req, client_addr(), false).await;
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"no upstreams available");
    }
}
