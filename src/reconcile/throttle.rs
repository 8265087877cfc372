//! Provider message throttling.
//!
//! Providers may emit bursts of snapshots. The throttle forwards a message
//! at once when nothing was forwarded during the last window; otherwise
//! it keeps the message as the provider's latest and checks again when
//! the window has passed, forwarding whatever is latest by then.
//!
//! The window is shared by all providers: a forward for one provider
//! delays pending messages of the others.

use futures_util::future::BoxFuture;
use futures_util::stream::{FuturesUnordered, StreamExt};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;

use crate::config::ConfigMessage;

#[derive(Debug, Clone, Copy)]
pub struct Throttle {
    window: Duration,
}

#[derive(Debug, Default)]
struct State {
    last_forwarded: Option<Instant>,
    /// Latest not yet forwarded message per provider.
    pending: HashMap<String, ConfigMessage>,
}

impl Throttle {
    pub fn new(window: Duration) -> Self {
        Self { window }
    }

    /// Time left before the next forward is allowed.
    fn remaining(&self, state: &State, now: Instant) -> Option<Duration> {
        let last = state.last_forwarded?;
        let elapsed = now.duration_since(last);
        (elapsed < self.window).then(|| self.window - elapsed)
    }

    fn timer(provider: String, delay: Duration) -> BoxFuture<'static, String> {
        Box::pin(async move {
            tokio::time::sleep(delay).await;
            provider
        })
    }

    /// Consume `rx` and forward the throttled stream to `tx` until either
    /// channel closes or `shutdown` fires.
    pub async fn run(
        self,
        mut rx: mpsc::Receiver<ConfigMessage>,
        tx: mpsc::Sender<ConfigMessage>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        let mut state = State::default();
        let mut timers: FuturesUnordered<BoxFuture<'static, String>> = FuturesUnordered::new();

        loop {
            let forward = tokio::select! {
                biased;
                _ = shutdown.recv() => break,
                msg = rx.recv() => {
                    let Some(msg) = msg else { break };
                    let now = Instant::now();
                    match self.remaining(&state, now) {
                        None => {
                            state.pending.remove(&msg.provider_name);
                            state.last_forwarded = Some(now);
                            Some(msg)
                        }
                        Some(_) => {
                            tracing::debug!(provider = %msg.provider_name, window = ?self.window, "Configuration received within throttle window, deferring");
                            timers.push(Self::timer(msg.provider_name.clone(), self.window));
                            state.pending.insert(msg.provider_name.clone(), msg);
                            None
                        }
                    }
                }
                Some(provider) = timers.next(), if !timers.is_empty() => {
                    let now = Instant::now();
                    match self.remaining(&state, now) {
                        None => {
                            let msg = state.pending.remove(&provider);
                            if msg.is_some() {
                                state.last_forwarded = Some(now);
                            }
                            msg
                        }
                        Some(left) => {
                            if state.pending.contains_key(&provider) {
                                timers.push(Self::timer(provider, left));
                            }
                            None
                        }
                    }
                }
            };

            if let Some(msg) = forward {
                tracing::debug!(provider = %msg.provider_name, "Forwarding configuration");
                if tx.send(msg).await.is_err() {
                    break;
                }
            }
        }
        tracing::debug!("Throttle stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Backend, Configuration};

    const WINDOW: Duration = Duration::from_secs(2);

    fn message(provider: &str, marker: &str) -> ConfigMessage {
        let mut configuration = Configuration::default();
        configuration
            .backends
            .insert(marker.to_string(), Backend::default());
        ConfigMessage::new(provider, configuration)
    }

    fn marker(msg: &ConfigMessage) -> String {
        let config = msg.configuration.as_ref().unwrap();
        config.backends.keys().next().unwrap().clone()
    }

    struct Harness {
        raw: mpsc::Sender<ConfigMessage>,
        out: mpsc::Receiver<ConfigMessage>,
        _shutdown: broadcast::Sender<()>,
    }

    fn spawn() -> Harness {
        let (raw, raw_rx) = mpsc::channel(100);
        let (out_tx, out) = mpsc::channel(100);
        let (shutdown, shutdown_rx) = broadcast::channel(1);
        tokio::spawn(Throttle::new(WINDOW).run(raw_rx, out_tx, shutdown_rx));
        Harness {
            raw,
            out,
            _shutdown: shutdown,
        }
    }

    async fn next(out: &mut mpsc::Receiver<ConfigMessage>) -> Option<ConfigMessage> {
        tokio::time::timeout(WINDOW * 3, out.recv()).await.ok().flatten()
    }

    #[tokio::test(start_paused = true)]
    async fn first_message_is_forwarded_immediately() {
        let mut h = spawn();
        h.raw.send(message("p1", "a")).await.unwrap();
        let start = Instant::now();
        let msg = next(&mut h.out).await.unwrap();
        assert_eq!(marker(&msg), "a");
        assert!(start.elapsed() < WINDOW);
    }

    #[tokio::test(start_paused = true)]
    async fn burst_is_coalesced_to_latest() {
        let mut h = spawn();
        h.raw.send(message("p1", "first")).await.unwrap();
        assert_eq!(marker(&next(&mut h.out).await.unwrap()), "first");

        for i in 0..5 {
            h.raw.send(message("p1", &format!("m{i}"))).await.unwrap();
        }

        let msg = next(&mut h.out).await.unwrap();
        assert_eq!(marker(&msg), "m4");
        assert!(next(&mut h.out).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn window_is_shared_across_providers() {
        let mut h = spawn();
        h.raw.send(message("p1", "a")).await.unwrap();
        assert_eq!(marker(&next(&mut h.out).await.unwrap()), "a");

        let start = Instant::now();
        h.raw.send(message("p2", "b")).await.unwrap();
        let msg = next(&mut h.out).await.unwrap();
        assert_eq!(msg.provider_name, "p2");
        assert!(start.elapsed() >= WINDOW - Duration::from_millis(1));
    }

    #[tokio::test(start_paused = true)]
    async fn deferred_message_survives_other_forwards() {
        let mut h = spawn();
        h.raw.send(message("p1", "a")).await.unwrap();
        assert_eq!(marker(&next(&mut h.out).await.unwrap()), "a");

        tokio::time::sleep(WINDOW / 2).await;
        h.raw.send(message("p2", "b")).await.unwrap();

        // p1 forwards again right as the window opens, before p2's timer.
        tokio::time::sleep(WINDOW / 2 + Duration::from_millis(100)).await;
        h.raw.send(message("p1", "c")).await.unwrap();
        assert_eq!(marker(&next(&mut h.out).await.unwrap()), "c");

        let msg = next(&mut h.out).await.unwrap();
        assert_eq!(marker(&msg), "b");
    }

    #[tokio::test(start_paused = true)]
    async fn stops_when_input_closes() {
        let (raw, raw_rx) = mpsc::channel(1);
        let (out_tx, _out) = mpsc::channel(1);
        let (_shutdown, shutdown_rx) = broadcast::channel(1);
        let task = tokio::spawn(Throttle::new(WINDOW).run(raw_rx, out_tx, shutdown_rx));
        drop(raw);
        task.await.unwrap();
    }
}
