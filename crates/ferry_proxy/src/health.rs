use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use ferry_http::full_body;
use http::{Method, Request};
use tokio::sync::watch;
use tokio::time::{interval, timeout};
use tracing::debug;

use crate::client::HttpClient;
use crate::path::join_url_path;
use crate::upstream::Upstream;

/// =======================================================
/// HEALTH STATE + ACTIVE PROBER
/// =======================================================
///
/// Per-upstream health shared by the balancers and dispatch, all of it
/// index-keyed atomics so readers never take a lock. An upstream is
/// effectively healthy when its last active probe passed AND no passive
/// failure penalty is in force. Readers may observe the two fields skewed;
/// the skew can only extend an unhealthy window, never shorten one.
pub struct HealthState {
    upstreams: Arc<Vec<Upstream>>,

    /// Last active probe verdict per index; starts true.
    pub(crate) healthy: Vec<AtomicBool>,
    /// Monotonic deadline (nanos since `epoch`) before which the index is
    /// passively unhealthy; 0 means no penalty.
    pub(crate) passive_until: Vec<AtomicI64>,
    epoch: Instant,

    health_path: String,
    interval: Duration,
    timeout: Duration,
    passive_cooldown: Duration,

    client: HttpClient,
    stop_tx: watch::Sender<bool>,
}

impl HealthState {
    pub(crate) fn new(
        upstreams: Arc<Vec<Upstream>>,
        client: HttpClient,
        health_path: String,
        probe_interval: Duration,
        probe_timeout: Duration,
        passive_cooldown: Duration,
    ) -> Self {
        let n = upstreams.len();
        let (stop_tx, _) = watch::channel(false);
        Self {
            upstreams,
            healthy: (0..n).map(|_| AtomicBool::new(true)).collect(),
            passive_until: (0..n).map(|_| AtomicI64::new(0)).collect(),
            epoch: Instant::now(),
            health_path,
            interval: probe_interval,
            timeout: probe_timeout,
            passive_cooldown,
            client,
            stop_tx,
        }
    }

    /// True iff at least one index is currently effectively healthy.
    pub fn any_healthy(&self) -> bool {
        let now = self.now_nanos();
        (0..self.upstreams.len()).any(|i| self.is_healthy_at(i, now))
    }

    /// Effective health of index `i` at the current instant.
    pub fn is_healthy(&self, i: usize) -> bool {
        self.is_healthy_at(i, self.now_nanos())
    }

    /// Penalize index `i` after a forwarding-time transport failure. No-op
    /// when the cooldown is disabled.
    pub fn mark_passive_failure(&self, i: usize) {
        if self.passive_cooldown.is_zero() {
            return;
        }
        let until = self.now_nanos() + self.passive_cooldown.as_nanos() as i64;
        self.passive_until[i].store(until, Ordering::Release);
        debug!(
            target: "ferry::health",
            upstream = %self.upstreams[i],
            cooldown_ms = self.passive_cooldown.as_millis() as u64,
            "passive failure marked"
        );
    }

    fn is_healthy_at(&self, i: usize, now: i64) -> bool {
        if !self.healthy[i].load(Ordering::Acquire) {
            return false;
        }
        let until = self.passive_until[i].load(Ordering::Acquire);
        until == 0 || now >= until
    }

    fn now_nanos(&self) -> i64 {
        self.epoch.elapsed().as_nanos() as i64
    }

    /// Start the background prober. Inert unless a health path, interval,
    /// and timeout are all configured; passive marking works either way.
    pub fn start(self: &Arc<Self>) {
        if self.interval.is_zero() || self.timeout.is_zero() || self.health_path.is_empty() {
            return;
        }

        let state = Arc::clone(self);
        let mut stop_rx = self.stop_tx.subscribe();
        tokio::spawn(async move {
            let mut ticker = interval(state.interval);
            loop {
                // The first tick completes immediately, so the initial sweep
                // runs at startup.
                tokio::select! {
                    _ = stop_rx.changed() => break,
                    _ = ticker.tick() => {}
                }
                tokio::select! {
                    _ = stop_rx.changed() => break,
                    _ = state.sweep() => {}
                }
            }
            debug!(target: "ferry::health", "prober stopped");
        });
    }

    /// Signal the prober to stop, interrupting any in-flight probe.
    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }

    async fn sweep(&self) {
        for i in 0..self.upstreams.len() {
            let ok = self.probe_one(i).await;
            let was = self.healthy[i].swap(ok, Ordering::AcqRel);
            if was != ok {
                debug!(
                    target: "ferry::health",
                    upstream = %self.upstreams[i],
                    healthy = ok,
                    "active probe verdict changed"
                );
            }
        }
    }

    /// Probe one upstream: GET on the joined health path, query cleared,
    /// bounded by the probe timeout. Any status in [200, 400) passes.
    async fn probe_one(&self, i: usize) -> bool {
        let up = &self.upstreams[i];
        let path = join_url_path(up.path(), &self.health_path);
        let Ok(uri) = up.target_uri(&path, None) else {
            return false;
        };
        let Ok(req) = Request::builder()
            .method(Method::GET)
            .uri(uri)
            .body(full_body(Bytes::new()))
        else {
            return false;
        };

        match timeout(self.timeout, self.client.request(req)).await {
            Ok(Ok(resp)) => (200..400).contains(&resp.status().as_u16()),
            Ok(Err(e)) => {
                debug!(target: "ferry::health", upstream = %up, error = ?e, "probe failed");
                false
            }
            Err(_) => {
                debug!(target: "ferry::health", upstream = %up, "probe timed out");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::build_http_client;
    use crate::upstream::parse_upstreams;

    fn state(cooldown: Duration) -> HealthState {
        let upstreams = Arc::new(parse_upstreams("http://a:9000,http://b:9001").unwrap());
        HealthState::new(
            upstreams,
            build_http_client(),
            String::new(),
            Duration::ZERO,
            Duration::ZERO,
            cooldown,
        )
    }

    #[test]
    fn starts_with_every_index_healthy() {
        let hs = state(Duration::from_millis(100));
        assert!(hs.is_healthy(0));
        assert!(hs.is_healthy(1));
        assert!(hs.any_healthy());
    }

    #[test]
    fn passive_failure_penalizes_until_cooldown_expires() {
        let hs = state(Duration::from_millis(25));
        hs.mark_passive_failure(0);
        assert!(!hs.is_healthy(0));
        assert!(hs.is_healthy(1));
        assert!(hs.any_healthy());

        std::thread::sleep(Duration::from_millis(40));
        assert!(hs.is_healthy(0));
    }

    #[test]
    fn passive_marking_is_a_noop_when_disabled() {
        let hs = state(Duration::ZERO);
        hs.mark_passive_failure(0);
        assert!(hs.is_healthy(0));
    }

    #[test]
    fn effective_health_requires_both_fields() {
        let hs = state(Duration::from_secs(60));

        hs.healthy[0].store(false, Ordering::Release);
        assert!(!hs.is_healthy(0));

        // Clearing the probe verdict is not enough while a penalty is live.
        hs.mark_passive_failure(0);
        hs.healthy[0].store(true, Ordering::Release);
        assert!(!hs.is_healthy(0));

        // Expired penalty and a passing probe restore health.
        hs.passive_until[0].store(1, Ordering::Release);
        assert!(hs.is_healthy(0));
    }

    #[test]
    fn any_healthy_false_only_when_all_are_down() {
        let hs = state(Duration::from_secs(60));
        hs.healthy[0].store(false, Ordering::Release);
        assert!(hs.any_healthy());
        hs.healthy[1].store(false, Ordering::Release);
        assert!(!hs.any_healthy());
    }

    #[tokio::test]
    async fn prober_keeps_a_live_upstream_healthy() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        use tokio::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    break;
                };
                tokio::spawn(async move {
                    let mut buf = [0u8; 1024];
                    let _ = stream.read(&mut buf).await;
                    let _ = stream
                        .write_all(
                            b"HTTP/1.1 200 OK\r\ncontent-length: 0\r\nconnection: close\r\n\r\n",
                        )
                        .await;
                });
            }
        });

        let upstreams = Arc::new(parse_upstreams(&format!("http://{addr}")).unwrap());
        let hs = Arc::new(HealthState::new(
            upstreams,
            build_http_client(),
            "/healthz".into(),
            Duration::from_millis(20),
            Duration::from_secs(1),
            Duration::ZERO,
        ));
        hs.start();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(hs.is_healthy(0));
        hs.stop();
    }

    #[tokio::test]
    async fn prober_marks_an_unreachable_upstream_down() {
        use tokio::net::TcpListener;

        // Bind then drop so the port is very likely unoccupied.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let upstreams = Arc::new(parse_upstreams(&format!("http://{addr}")).unwrap());
        let hs = Arc::new(HealthState::new(
            upstreams,
            build_http_client(),
            "/healthz".into(),
            Duration::from_millis(20),
            Duration::from_secs(1),
            Duration::ZERO,
        ));
        hs.start();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!hs.is_healthy(0));
        hs.stop();
    }

    #[tokio::test]
    async fn start_is_inert_without_a_health_path() {
        let upstreams = Arc::new(parse_upstreams("http://127.0.0.1:1").unwrap());
        let hs = Arc::new(HealthState::new(
            upstreams,
            build_http_client(),
            String::new(),
            Duration::from_millis(20),
            Duration::from_secs(1),
            Duration::ZERO,
        ));
        hs.start();

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(hs.is_healthy(0));
    }
}
