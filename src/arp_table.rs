//! ARP cache and pending-request queue, per spec.md §3 / §4.2.
//!
//! A single mutex guards cache and queue together, matching spec.md §5's "ARP
//! cache+queue is protected by a single mutex" discipline. The sweep pass mutates
//! state under that lock and returns a list of [`SweepAction`]s describing what the
//! caller must do *outside* the lock — retransmit a broadcast, or fail a request and
//! emit ICMP host-unreachable for each packet it was holding. This keeps the lock
//! from ever being held across a call into the driver's send entry point, per
//! spec.md §5.

use std::net::Ipv4Addr;
use std::sync::Mutex;
use std::time::{Duration, Instant};

pub const CACHE_TTL: Duration = Duration::from_secs(15);
pub const RETRY_INTERVAL: Duration = Duration::from_secs(1);
pub const MAX_TRIES: u8 = 5;

/// A frame parked awaiting ARP resolution: a full Ethernet frame with
/// `ether_dhost` still zeroed, plus the interface it should ultimately go out on.
#[derive(Debug, Clone)]
pub struct PendingFrame {
    pub frame: Vec<u8>,
    pub outbound_interface: String,
}

struct CacheEntry {
    ip: Ipv4Addr,
    mac: [u8; 6],
    inserted_at: Instant,
}

struct PendingRequest {
    ip_target: Ipv4Addr,
    times_sent: u8,
    last_sent_at: Instant,
    requested_interface: String,
    pending: Vec<PendingFrame>,
}

#[derive(Default)]
struct Inner {
    cache: Vec<CacheEntry>,
    requests: Vec<PendingRequest>,
}

/// Outcome of [`ArpTable::queue_request`]: tells the caller whether this is a brand
/// new request (and therefore needs an immediate first broadcast) or one that was
/// merely appended to.
pub struct QueueOutcome {
    pub is_new: bool,
    pub requested_interface: String,
}

/// Work the sweeper must do once it has released the table's lock.
pub enum SweepAction {
    /// Broadcast another ARP request for `target_ip` out `interface_name`.
    Retransmit { interface_name: String, target_ip: Ipv4Addr },
    /// `times_sent` exceeded [`MAX_TRIES`]; every parked frame needs an ICMP
    /// host-unreachable sent to its embedded IP source, then must be dropped.
    Exhausted { frames: Vec<PendingFrame> },
}

pub struct ArpTable {
    inner: Mutex<Inner>,
}

impl Default for ArpTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ArpTable {
    pub fn new() -> Self {
        Self { inner: Mutex::new(Inner::default()) }
    }

    /// Returns the cached MAC for `ip`, provided the entry hasn't aged past
    /// [`CACHE_TTL`]. Expired entries are left for the sweeper to reap, not removed
    /// here, matching spec.md §4.2 ("expired entry is ignored").
    pub fn lookup(&self, ip: Ipv4Addr, now: Instant) -> Option<[u8; 6]> {
        let inner = self.inner.lock().unwrap();
        inner
            .cache
            .iter()
            .find(|e| e.ip == ip && now.duration_since(e.inserted_at) < CACHE_TTL)
            .map(|e| e.mac)
    }

    /// Records `mac` for `ip` (overwriting any prior binding) and, if a request was
    /// pending for that IP, removes and returns it so the caller can flush its
    /// queued frames. Per spec.md §4.2, callers must only call this for replies
    /// whose target IP equals the receiving interface's own IP.
    pub fn insert(&self, ip: Ipv4Addr, mac: [u8; 6], now: Instant) -> Vec<PendingFrame> {
        let mut inner = self.inner.lock().unwrap();
        inner.cache.retain(|e| e.ip != ip);
        inner.cache.push(CacheEntry { ip, mac, inserted_at: now });

        if let Some(pos) = inner.requests.iter().position(|r| r.ip_target == ip) {
            let req = inner.requests.remove(pos);
            req.pending
        } else {
            Vec::new()
        }
    }

    /// Appends `frame` to the request for `ip`, creating one if none exists yet.
    /// The caller must, on `is_new`, immediately broadcast an ARP request on
    /// `requested_interface` and then call [`ArpTable::mark_first_sent`].
    pub fn queue_request(&self, ip: Ipv4Addr, frame: PendingFrame) -> QueueOutcome {
        let mut inner = self.inner.lock().unwrap();
        if let Some(req) = inner.requests.iter_mut().find(|r| r.ip_target == ip) {
            let requested_interface = req.requested_interface.clone();
            req.pending.push(frame);
            return QueueOutcome { is_new: false, requested_interface };
        }

        let requested_interface = frame.outbound_interface.clone();
        inner.requests.push(PendingRequest {
            ip_target: ip,
            times_sent: 0,
            last_sent_at: Instant::now(),
            requested_interface: requested_interface.clone(),
            pending: vec![frame],
        });
        QueueOutcome { is_new: true, requested_interface }
    }

    /// Records that the first broadcast for `ip`'s request has gone out.
    pub fn mark_first_sent(&self, ip: Ipv4Addr, now: Instant) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(req) = inner.requests.iter_mut().find(|r| r.ip_target == ip) {
            req.times_sent = 1;
            req.last_sent_at = now;
        }
    }

    /// One sweep pass: retransmits or fails pending requests due for action, and
    /// reaps expired cache entries. Returns the actions the caller must perform
    /// outside this table's lock.
    pub fn sweep_once(&self, now: Instant) -> Vec<SweepAction> {
        let mut inner = self.inner.lock().unwrap();
        let mut actions = Vec::new();

        let mut still_pending = Vec::with_capacity(inner.requests.len());
        for mut req in std::mem::take(&mut inner.requests) {
            if now.duration_since(req.last_sent_at) >= RETRY_INTERVAL {
                if req.times_sent >= MAX_TRIES {
                    actions.push(SweepAction::Exhausted { frames: req.pending });
                    continue;
                }
                actions.push(SweepAction::Retransmit {
                    interface_name: req.requested_interface.clone(),
                    target_ip: req.ip_target,
                });
                req.times_sent += 1;
                req.last_sent_at = now;
            }
            still_pending.push(req);
        }
        inner.requests = still_pending;

        inner.cache.retain(|e| now.duration_since(e.inserted_at) < CACHE_TTL);

        actions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(tag: u8) -> PendingFrame {
        PendingFrame { frame: vec![tag], outbound_interface: "eth1".into() }
    }

    #[test]
    fn lookup_misses_before_insert_and_hits_after() {
        let table = ArpTable::new();
        let now = Instant::now();
        let ip = Ipv4Addr::new(172, 16, 0, 5);
        assert!(table.lookup(ip, now).is_none());
        table.insert(ip, [0xAA; 6], now);
        assert_eq!(table.lookup(ip, now).unwrap(), [0xAA; 6]);
    }

    #[test]
    fn cache_entry_expires_after_ttl() {
        let table = ArpTable::new();
        let t0 = Instant::now();
        let ip = Ipv4Addr::new(172, 16, 0, 5);
        table.insert(ip, [0xAA; 6], t0);
        let later = t0 + CACHE_TTL;
        assert!(table.lookup(ip, later).is_none());
    }

    #[test]
    fn queue_then_reply_flushes_in_fifo_order() {
        let table = ArpTable::new();
        let now = Instant::now();
        let ip = Ipv4Addr::new(172, 16, 0, 5);

        let outcome_a = table.queue_request(ip, frame(1));
        assert!(outcome_a.is_new);
        table.mark_first_sent(ip, now);

        let outcome_b = table.queue_request(ip, frame(2));
        assert!(!outcome_b.is_new);

        let flushed = table.insert(ip, [0xBB; 6], now);
        assert_eq!(flushed.len(), 2);
        assert_eq!(flushed[0].frame, vec![1]);
        assert_eq!(flushed[1].frame, vec![2]);
    }

    #[test]
    fn sweep_retransmits_then_exhausts_after_max_tries() {
        let table = ArpTable::new();
        let mut now = Instant::now();
        let ip = Ipv4Addr::new(172, 16, 0, 5);

        table.queue_request(ip, frame(1));
        table.mark_first_sent(ip, now);

        let mut retransmits = 0;
        let mut exhausted = false;
        for _ in 0..MAX_TRIES {
            now += RETRY_INTERVAL;
            for action in table.sweep_once(now) {
                match action {
                    SweepAction::Retransmit { .. } => retransmits += 1,
                    SweepAction::Exhausted { frames } => {
                        exhausted = true;
                        assert_eq!(frames.len(), 1);
                    }
                }
            }
        }

        assert_eq!(retransmits, (MAX_TRIES - 1) as usize);
        assert!(exhausted);
    }

    #[test]
    fn sweep_does_not_retransmit_before_interval_elapses() {
        let table = ArpTable::new();
        let now = Instant::now();
        let ip = Ipv4Addr::new(172, 16, 0, 5);
        table.queue_request(ip, frame(1));
        table.mark_first_sent(ip, now);

        let actions = table.sweep_once(now + Duration::from_millis(500));
        assert!(actions.is_empty());
    }
}
