//! Wires the probe monitor, state machine and kernel backends together.

use log::{error, info, warn};
use std::sync::mpsc::{self, Receiver, Sender};

use crate::cancel::CancellationToken;
use crate::config::FailoverConfig;
use crate::errors::FailoverResult;
use crate::firewall::{self, Firewall};
use crate::hook::{SwitchEvent, SwitchHook};
use crate::monitor::{Event, ProbeEvent, ProbeMonitor, Prober};
use crate::routing::{self, RouteTable};
use crate::state::{FailoverMachine, FailoverState, Transition};

/// Stops a running [`Controller`] from another thread or a signal handler.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    token: CancellationToken,
    events: Sender<Event>,
}

impl ShutdownHandle {
    /// Cancel the controller and wake its event loop.
    pub fn shutdown(&self) {
        info!("Shutdown requested");
        self.token.cancel();
        // The loop may already be gone, nothing left to wake then
        let _ = self.events.send(Event::Wake);
    }
}

/// Owns the failover state and is the only mutator of routes and firewall
/// rules.
pub struct Controller<R, F> {
    config: FailoverConfig,
    routes: R,
    firewall: F,
    hook: Box<dyn SwitchHook>,
    machine: FailoverMachine,
    token: CancellationToken,
    events_tx: Sender<Event>,
    events_rx: Receiver<Event>,
}

impl<R: RouteTable, F: Firewall> Controller<R, F> {
    pub fn new(config: FailoverConfig, routes: R, firewall: F, hook: Box<dyn SwitchHook>) -> Self {
        let (events_tx, events_rx) = mpsc::channel();
        let machine = FailoverMachine::new(config.bad_max, config.good_min);
        Controller {
            config,
            routes,
            firewall,
            hook,
            machine,
            token: CancellationToken::new(),
            events_tx,
            events_rx,
        }
    }

    pub fn state(&self) -> FailoverState {
        self.machine.state()
    }

    pub fn machine(&self) -> &FailoverMachine {
        &self.machine
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            token: self.token.clone(),
            events: self.events_tx.clone(),
        }
    }

    /// Force the preferred link active and isolate the backup link,
    /// whatever the kernel state was before.
    pub fn initialize(&mut self) -> FailoverResult<()> {
        info!(
            "Forcing initial state: {} active, {} isolated",
            self.config.preferred_interface, self.config.backup_interface
        );
        self.apply(Transition::Promote)
    }

    /// Carry out `transition` once, outside of the state machine's counters.
    pub fn force(&mut self, transition: Transition) -> FailoverResult<()> {
        self.apply(transition)
    }

    /// Feed one probe event through the state machine and perform any
    /// transition it asks for. A failed switch is logged and not committed.
    pub fn handle_event(&mut self, event: ProbeEvent) {
        let Some(transition) = self.machine.observe(event) else {
            return;
        };

        if let Err(e) = self.apply(transition) {
            error!(
                "Switch to {} failed, staying on {}: {}",
                transition.target(),
                self.machine.state(),
                e
            );
        }
    }

    /// Switch routes, then toggle isolation of the backup link and run the
    /// hook. Only the route switch can fail the transition.
    fn apply(&mut self, transition: Transition) -> FailoverResult<()> {
        let preferred = self.config.preferred_interface.as_str();
        let backup = self.config.backup_interface.as_str();
        let (from, to) = match transition {
            Transition::Demote => (preferred, backup),
            Transition::Promote => (backup, preferred),
        };

        routing::switch_routes(&self.routes, from, to)?;

        let isolation = match transition {
            Transition::Demote => firewall::unisolate(&self.firewall, backup),
            Transition::Promote => firewall::isolate(&self.firewall, backup),
        };
        if let Err(e) = isolation {
            warn!("Firewall update for {} failed: {}", backup, e);
        }

        self.machine.commit(transition);
        info!("Now on {} link ({})", self.machine.state(), to);

        let event = SwitchEvent {
            from: from.to_string(),
            to: to.to_string(),
            state: self.machine.state(),
        };
        if let Err(e) = self.hook.on_switch(&event) {
            warn!("Switch hook failed: {}", e);
        }
        Ok(())
    }

    /// Run until shutdown: force the initial state, start probing the
    /// preferred link and consume events in order.
    pub fn run<P: Prober + 'static>(&mut self, prober: P) -> FailoverResult<()> {
        if self.token.is_cancelled() {
            info!("Shutdown requested before start, leaving routes untouched");
            return Ok(());
        }

        if let Err(e) = self.initialize() {
            error!("Initial switch to {} failed: {}", self.config.preferred_interface, e);
        }

        let monitor = ProbeMonitor::new(
            prober,
            &self.config.ping_host,
            &self.config.preferred_interface,
            self.config.interval,
            self.config.probe_timeout,
        );
        let pinger = monitor.spawn(self.events_tx.clone(), self.token.clone())?;

        while !self.token.is_cancelled() {
            match self.events_rx.recv() {
                Ok(Event::Probe(event)) if !self.token.is_cancelled() => self.handle_event(event),
                Ok(_) => {}
                Err(_) => break,
            }
        }

        self.token.cancel();
        if pinger.join().is_err() {
            warn!("Probe monitor thread panicked");
        }
        info!("Controller stopped in {} state", self.machine.state());
        Ok(())
    }
}
