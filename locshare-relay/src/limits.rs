//! Sliding-window pacing for accept loops.
//!
//! The limiter remembers the last `burst` accept times. Before each accept it
//! waits until the oldest of them has left the window, so at most `burst`
//! connections are admitted per rolling window. Excess load turns into
//! latency, never rejection.

use std::future::Future;
use std::io;
use std::time::Duration;

use axum::serve::Listener;
use tokio::time::{sleep_until, Instant};

/// Ring of recent accept times.
///
/// Slots start at construction time, so the first accepts after startup wait
/// out one window.
#[derive(Debug)]
pub struct AdmissionLimiter {
    slots: Vec<Instant>,
    next: usize,
    window: Duration,
}

impl AdmissionLimiter {
    /// Allow `burst` accepts per `window`.
    pub fn new(burst: usize, window: Duration) -> Self {
        Self {
            slots: vec![Instant::now(); burst.max(1)],
            next: 0,
            window,
        }
    }

    /// Record an accept and wait until the next one is allowed.
    pub async fn admit(&mut self) {
        let now = Instant::now();
        self.slots[self.next] = now;
        self.next = (self.next + 1) % self.slots.len();

        let threshold = self.slots[self.next] + self.window;
        if threshold > now {
            sleep_until(threshold).await;
        }
    }
}

/// A [`Listener`] whose accepts are paced by an [`AdmissionLimiter`].
#[derive(Debug)]
pub struct PacedListener<L> {
    inner: L,
    limiter: AdmissionLimiter,
}

impl<L> PacedListener<L> {
    /// Wrap `inner`.
    pub fn new(inner: L, limiter: AdmissionLimiter) -> Self {
        Self { inner, limiter }
    }
}

impl<L: Listener> Listener for PacedListener<L> {
    type Io = L::Io;
    type Addr = L::Addr;

    fn accept(&mut self) -> impl Future<Output = (Self::Io, Self::Addr)> + Send {
        async move {
            self.limiter.admit().await;
            self.inner.accept().await
        }
    }

    fn local_addr(&self) -> io::Result<Self::Addr> {
        self.inner.local_addr()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::{TcpListener, TcpStream};

    #[tokio::test(start_paused = true)]
    async fn burst_passes_then_paces() {
        let mut limiter = AdmissionLimiter::new(16, Duration::from_millis(100));
        tokio::time::sleep(Duration::from_secs(1)).await;

        let start = Instant::now();
        let mut done = Vec::new();
        for _ in 0..20 {
            limiter.admit().await;
            done.push(Instant::now());
        }

        // Fifteen pass untouched; the sixteenth waits for the first slot to age out.
        assert!(done[..15].iter().all(|t| *t == start));
        assert!(done[16] >= done[0] + Duration::from_millis(100));
        assert!(done[19] >= done[0] + Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn first_accept_waits_one_window_after_startup() {
        let mut limiter = AdmissionLimiter::new(16, Duration::from_millis(100));
        let start = Instant::now();

        limiter.admit().await;
        assert!(Instant::now() >= start + Duration::from_millis(100));

        let before = Instant::now();
        limiter.admit().await;
        assert_eq!(Instant::now(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn sustained_rate_is_bounded() {
        let mut limiter = AdmissionLimiter::new(4, Duration::from_millis(100));
        tokio::time::sleep(Duration::from_secs(1)).await;

        let start = Instant::now();
        for _ in 0..40 {
            limiter.admit().await;
        }
        // 40 admits at 4 per 100ms need at least 900ms.
        assert!(Instant::now() >= start + Duration::from_millis(900));
    }

    #[tokio::test]
    async fn paced_listener_accepts_connections() {
        let inner = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = inner.local_addr().unwrap();
        let mut listener =
            PacedListener::new(inner, AdmissionLimiter::new(16, Duration::from_millis(1)));
        assert_eq!(Listener::local_addr(&listener).unwrap(), addr);

        let client = tokio::spawn(async move { TcpStream::connect(addr).await.unwrap() });
        let (_stream, peer) = listener.accept().await;
        let client = client.await.unwrap();
        assert_eq!(peer, client.local_addr().unwrap());
    }
}
