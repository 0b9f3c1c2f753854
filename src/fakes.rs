//! In-memory backends that track state instead of touching the host.
//!
//! These keep actual routes and rules, so callers can assert on the
//! resulting table rather than on call sequences. Clones share state, which
//! lets a test hand one copy to the [`Controller`](crate::controller::Controller)
//! and inspect another.

use std::collections::{HashMap, HashSet, VecDeque};
use std::net::IpAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::errors::{FailoverError, FailoverResult};
use crate::firewall::{Firewall, FirewallRule};
use crate::monitor::{ProbeEvent, Prober};
use crate::routing::{DefaultRoute, RouteEntry, RouteTable};

/// A mutation applied to a [`MemoryRouteTable`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOp {
    Add(DefaultRoute),
    Delete(DefaultRoute),
}

#[derive(Debug, Default)]
struct RouteState {
    links: HashMap<String, u32>,
    routes: Vec<RouteEntry>,
    ops: Vec<RouteOp>,
    fail_add: HashSet<String>,
}

/// Routing table kept in memory.
///
/// Like the kernel, it refuses to add a default route whose metric is
/// already taken.
#[derive(Debug, Clone, Default)]
pub struct MemoryRouteTable {
    state: Arc<Mutex<RouteState>>,
}

impl MemoryRouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RouteState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register an interface name with a link index.
    pub fn with_link(self, name: &str, index: u32) -> Self {
        self.lock().links.insert(name.to_string(), index);
        self
    }

    /// Seed a default route through a registered link.
    pub fn with_default_route(self, interface: &str, gateway: IpAddr, priority: u32) -> Self {
        {
            let mut state = self.lock();
            let oif = state.links.get(interface).copied();
            state.routes.push(RouteEntry {
                destination: None,
                oif,
                gateway: Some(gateway),
                priority: Some(priority),
            });
        }
        self
    }

    /// Seed an arbitrary entry.
    pub fn with_entry(self, entry: RouteEntry) -> Self {
        self.lock().routes.push(entry);
        self
    }

    /// Make every `add_route` through `interface` fail.
    pub fn fail_add_on(&self, interface: &str) {
        self.lock().fail_add.insert(interface.to_string());
    }

    pub fn routes(&self) -> Vec<RouteEntry> {
        self.lock().routes.clone()
    }

    pub fn ops(&self) -> Vec<RouteOp> {
        self.lock().ops.clone()
    }

    /// Metrics of the default routes currently on `interface`.
    pub fn priorities(&self, interface: &str) -> Vec<u32> {
        let state = self.lock();
        let Some(oif) = state.links.get(interface).copied() else {
            return Vec::new();
        };
        state
            .routes
            .iter()
            .filter(|r| r.destination.is_none() && r.oif == Some(oif))
            .filter_map(|r| r.priority)
            .collect()
    }
}

impl RouteTable for MemoryRouteTable {
    fn link_index(&self, interface: &str) -> Option<u32> {
        self.lock().links.get(interface).copied()
    }

    fn list_default_routes(&self) -> FailoverResult<Vec<RouteEntry>> {
        Ok(self.routes())
    }

    fn add_route(&self, route: &DefaultRoute) -> FailoverResult<()> {
        let mut state = self.lock();
        if state.fail_add.contains(&route.interface) {
            return Err(FailoverError::RouteMutation(format!("add {}: injected failure", route)));
        }

        let taken = state
            .routes
            .iter()
            .any(|r| r.destination.is_none() && r.priority == route.priority);
        if taken {
            return Err(FailoverError::RouteMutation(format!("add {}: File exists", route)));
        }

        state.routes.push(RouteEntry {
            destination: None,
            oif: Some(route.oif),
            gateway: Some(route.gateway),
            priority: route.priority,
        });
        state.ops.push(RouteOp::Add(route.clone()));
        Ok(())
    }

    fn delete_route(&self, route: &DefaultRoute) -> FailoverResult<()> {
        let mut state = self.lock();
        let position = state.routes.iter().position(|r| {
            r.destination.is_none()
                && r.oif == Some(route.oif)
                && r.gateway == Some(route.gateway)
                && (route.priority.is_none() || r.priority == route.priority)
        });

        match position {
            Some(i) => {
                state.routes.remove(i);
                state.ops.push(RouteOp::Delete(route.clone()));
                Ok(())
            }
            None => Err(FailoverError::RouteNotFound(route.to_string())),
        }
    }
}

#[derive(Debug, Default)]
struct FirewallState {
    rules: Vec<FirewallRule>,
    fail: bool,
    mutations: usize,
}

/// Firewall rule set kept in memory. Duplicate rules are allowed, as with
/// iptables.
#[derive(Debug, Clone, Default)]
pub struct MemoryFirewall {
    state: Arc<Mutex<FirewallState>>,
}

impl MemoryFirewall {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FirewallState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn with_rule(self, rule: FirewallRule) -> Self {
        self.lock().rules.push(rule);
        self
    }

    /// Make every operation fail from now on.
    pub fn fail_all(&self) {
        self.lock().fail = true;
    }

    /// Number of copies of `rule` present.
    pub fn count(&self, rule: &FirewallRule) -> usize {
        self.lock().rules.iter().filter(|r| *r == rule).count()
    }

    pub fn rules(&self) -> Vec<FirewallRule> {
        self.lock().rules.clone()
    }

    /// Number of successful adds and deletes so far.
    pub fn mutations(&self) -> usize {
        self.lock().mutations
    }

    fn check(&self, state: &FirewallState, rule: &FirewallRule) -> FailoverResult<()> {
        if state.fail {
            return Err(FailoverError::FirewallMutation(format!("{}: injected failure", rule)));
        }
        Ok(())
    }
}

impl Firewall for MemoryFirewall {
    fn has_rule(&self, rule: &FirewallRule) -> FailoverResult<bool> {
        let state = self.lock();
        self.check(&state, rule)?;
        Ok(state.rules.contains(rule))
    }

    fn add_rule(&self, rule: &FirewallRule) -> FailoverResult<()> {
        let mut state = self.lock();
        self.check(&state, rule)?;
        state.rules.insert(0, rule.clone());
        state.mutations += 1;
        Ok(())
    }

    fn delete_rule(&self, rule: &FirewallRule) -> FailoverResult<()> {
        let mut state = self.lock();
        self.check(&state, rule)?;
        let Some(i) = state.rules.iter().position(|r| r == rule) else {
            return Err(FailoverError::FirewallMutation(format!("{}: no such rule", rule)));
        };
        state.rules.remove(i);
        state.mutations += 1;
        Ok(())
    }
}

/// Prober replaying a fixed script of outcomes, then repeating a fallback.
#[derive(Debug, Clone)]
pub struct ScriptedProber {
    script: Arc<Mutex<VecDeque<ProbeEvent>>>,
    fallback: ProbeEvent,
}

impl ScriptedProber {
    pub fn new(script: impl IntoIterator<Item = ProbeEvent>, fallback: ProbeEvent) -> Self {
        ScriptedProber {
            script: Arc::new(Mutex::new(script.into_iter().collect())),
            fallback,
        }
    }

    /// Prober that always reports the same outcome.
    pub fn always(event: ProbeEvent) -> Self {
        Self::new(Vec::new(), event)
    }
}

impl Prober for ScriptedProber {
    fn probe(&self, host: &str, interface: &str, _timeout: Duration) -> FailoverResult<()> {
        let next = self
            .script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or(self.fallback);

        match next {
            ProbeEvent::Good => Ok(()),
            ProbeEvent::Bad => Err(FailoverError::ProbeFailed(format!(
                "{} unreachable via {}",
                host, interface
            ))),
        }
    }
}
