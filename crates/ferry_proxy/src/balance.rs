use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use crate::health::HealthState;
use crate::options::LbAlgo;

/// =======================================================
/// BALANCERS
/// =======================================================
///
/// Both algorithms share the rotation cursor and the per-upstream in-flight
/// counters; a pick increments the chosen counter and the returned token
/// decrements it exactly once.

/// Picks an upstream index per request.
pub trait Balancer: Send + Sync {
    fn pick(&self) -> Option<Pick>;
}

/// A successful balancer decision: the chosen index plus its release token.
pub struct Pick {
    pub index: usize,
    pub done: DoneToken,
}

/// Rotation cursor and in-flight counters shared by the balancers and
/// dispatch accounting.
pub(crate) struct PickState {
    active: Vec<AtomicI64>,
    cursor: AtomicU64,
}

impl PickState {
    pub(crate) fn new(n: usize) -> Arc<Self> {
        Arc::new(Self {
            active: (0..n).map(|_| AtomicI64::new(0)).collect(),
            cursor: AtomicU64::new(0),
        })
    }

    /// Advance the rotation cursor once; wraparound-safe.
    fn next_start(&self, n: usize) -> usize {
        (self.cursor.fetch_add(1, Ordering::Relaxed) % n as u64) as usize
    }

    /// Register an in-flight request on `index` and hand back its release
    /// token.
    pub(crate) fn begin(self: &Arc<Self>, index: usize) -> DoneToken {
        self.active[index].fetch_add(1, Ordering::AcqRel);
        DoneToken {
            state: Arc::clone(self),
            index,
            fired: AtomicBool::new(false),
        }
    }

    /// Current in-flight count for `index`; a best-effort snapshot.
    pub(crate) fn active(&self, index: usize) -> i64 {
        self.active[index].load(Ordering::Acquire)
    }
}

/// One-shot release handle for a pick. Firing decrements the chosen
/// upstream's in-flight counter; repeat fires are no-ops, and dropping an
/// unfired token fires it so every exit path releases the pick exactly once.
pub struct DoneToken {
    state: Arc<PickState>,
    index: usize,
    fired: AtomicBool,
}

impl DoneToken {
    pub fn fire(&self) {
        if !self.fired.swap(true, Ordering::AcqRel) {
            self.state.active[self.index].fetch_sub(1, Ordering::AcqRel);
        }
    }
}

impl Drop for DoneToken {
    fn drop(&mut self) {
        self.fire();
    }
}

pub(crate) fn new_balancer(
    algo: LbAlgo,
    n: usize,
    health: Option<Arc<HealthState>>,
    state: Arc<PickState>,
) -> Box<dyn Balancer> {
    match algo {
        LbAlgo::RoundRobin => Box::new(RoundRobinBalancer { n, health, state }),
        LbAlgo::LeastConn => Box::new(LeastConnBalancer { n, health, state }),
    }
}

/// Health filter: absent state accepts all; an all-unhealthy set accepts all
/// (fail-open); otherwise only effectively-healthy indices pass.
fn health_filter(health: &Option<Arc<HealthState>>) -> Option<&HealthState> {
    health.as_deref().filter(|h| h.any_healthy())
}

/// Round-robin: first healthy index at or after the rotation start.
pub(crate) struct RoundRobinBalancer {
    n: usize,
    health: Option<Arc<HealthState>>,
    state: Arc<PickState>,
}

impl Balancer for RoundRobinBalancer {
    fn pick(&self) -> Option<Pick> {
        let n = self.n;
        if n == 0 {
            return None;
        }

        let start = self.state.next_start(n);
        let filter = health_filter(&self.health);

        for k in 0..n {
            let i = (start + k) % n;
            if let Some(h) = filter {
                if !h.is_healthy(i) {
                    continue;
                }
            }
            return Some(Pick {
                index: i,
                done: self.state.begin(i),
            });
        }

        // Healthy set raced to empty between the any_healthy check and the
        // scan; fall back to the rotation start.
        Some(Pick {
            index: start,
            done: self.state.begin(start),
        })
    }
}

/// Least-connections: smallest in-flight counter among healthy indices, ties
/// broken by rotation order so equal counters spread across replicas.
pub(crate) struct LeastConnBalancer {
    n: usize,
    health: Option<Arc<HealthState>>,
    state: Arc<PickState>,
}

impl Balancer for LeastConnBalancer {
    fn pick(&self) -> Option<Pick> {
        let n = self.n;
        if n == 0 {
            return None;
        }
        if n == 1 {
            return Some(Pick {
                index: 0,
                done: self.state.begin(0),
            });
        }

        let start = self.state.next_start(n);
        let filter = health_filter(&self.health);

        let mut min_idx: Option<usize> = None;
        let mut min_val = i64::MAX;
        for k in 0..n {
            let i = (start + k) % n;
            if let Some(h) = filter {
                if !h.is_healthy(i) {
                    continue;
                }
            }
            let v = self.state.active(i);
            if v < min_val {
                min_val = v;
                min_idx = Some(i);
            }
        }

        // Second chance without the filter when the healthy set raced to
        // empty under us.
        if min_idx.is_none() {
            min_val = i64::MAX;
            for k in 0..n {
                let i = (start + k) % n;
                let v = self.state.active(i);
                if v < min_val {
                    min_val = v;
                    min_idx = Some(i);
                }
            }
        }

        let index = min_idx.unwrap_or(start);
        Some(Pick {
            index,
            done: self.state.begin(index),
        })
    }
}
