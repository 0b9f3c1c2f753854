//! Periodic reachability probing.
//!
//! A [`ProbeMonitor`] runs on its own thread and turns one probe per tick
//! into one [`ProbeEvent`] on the controller's channel.

use log::{debug, info, warn};
use std::sync::mpsc::Sender;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::cancel::CancellationToken;
use crate::errors::FailoverResult;

/// Outcome of one probe tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeEvent {
    Good,
    Bad,
}

/// Message delivered to the controller loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// A probe result
    Probe(ProbeEvent),
    /// Sent on shutdown so a blocked receiver wakes up
    Wake,
}

/// Something that can test reachability of a host through an interface.
pub trait Prober: Send {
    /// `Ok` when `host` answered through `interface` within `timeout`.
    fn probe(&self, host: &str, interface: &str, timeout: Duration) -> FailoverResult<()>;
}

/// Probes a sentinel host over one interface at a fixed period.
pub struct ProbeMonitor<P> {
    prober: P,
    host: String,
    interface: String,
    interval: Duration,
    timeout: Duration,
}

impl<P: Prober + 'static> ProbeMonitor<P> {
    pub fn new(
        prober: P,
        host: &str,
        interface: &str,
        interval: Duration,
        timeout: Duration,
    ) -> Self {
        ProbeMonitor {
            prober,
            host: host.to_string(),
            interface: interface.to_string(),
            interval,
            timeout,
        }
    }

    /// Probe once. Any probe error counts as [`ProbeEvent::Bad`].
    pub fn tick(&self) -> ProbeEvent {
        match self.prober.probe(&self.host, &self.interface, self.timeout) {
            Ok(()) => ProbeEvent::Good,
            Err(e) => {
                debug!("Probe of {} via {} failed: {}", self.host, self.interface, e);
                ProbeEvent::Bad
            }
        }
    }

    /// Emit one event per interval until `token` is cancelled or the
    /// receiving side goes away.
    ///
    /// Ticks are scheduled against a fixed start instant so a slow probe
    /// does not push every later tick back.
    pub fn run(self, events: Sender<Event>, token: CancellationToken) {
        info!(
            "Running probe monitor for {} via {} every {:?}",
            self.host, self.interface, self.interval
        );

        let mut next_tick = Instant::now() + self.interval;
        loop {
            let wait = next_tick.saturating_duration_since(Instant::now());
            if token.wait_timeout(wait) {
                break;
            }

            let event = self.tick();
            if events.send(Event::Probe(event)).is_err() {
                warn!("Event receiver dropped, stopping probe monitor");
                break;
            }

            next_tick += self.interval;
            let now = Instant::now();
            if next_tick < now {
                // Probe overran; resume on the next whole interval
                next_tick = now + self.interval;
            }
        }

        info!("Probe monitor for {} stopped", self.interface);
    }

    /// Start [`run`](Self::run) on a dedicated thread.
    pub fn spawn(
        self,
        events: Sender<Event>,
        token: CancellationToken,
    ) -> FailoverResult<JoinHandle<()>> {
        let handle = thread::Builder::new()
            .name(format!("probe-{}", self.interface))
            .spawn(move || self.run(events, token))?;
        Ok(handle)
    }
}
