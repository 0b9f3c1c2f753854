//! Default-route discovery and replacement.
//!
//! [`RouteTable`] abstracts the kernel routing table. Production code uses
//! [`IpRouteTable`](crate::network::IpRouteTable); tests use
//! [`MemoryRouteTable`](crate::fakes::MemoryRouteTable).

use log::{debug, info, warn};
use std::fmt;
use std::net::IpAddr;

use crate::errors::{FailoverError, FailoverResult};

/// Metric of the default route on the interface that carries traffic.
pub const ACTIVE_PRIORITY: u32 = 50;

/// Metric of the default route on the demoted interface.
pub const DEMOTED_PRIORITY: u32 = 200;

/// Upper bound on duplicate default routes drained for one interface.
const MAX_DUPLICATE_ROUTES: usize = 32;

/// One entry of a routing table dump.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteEntry {
    /// Destination prefix, `None` for a default route
    pub destination: Option<String>,

    /// Outbound link index
    pub oif: Option<u32>,

    /// Next hop
    pub gateway: Option<IpAddr>,

    /// Route metric
    pub priority: Option<u32>,
}

/// A `0.0.0.0/0` route through a specific link and gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefaultRoute {
    pub interface: String,
    pub oif: u32,
    pub gateway: IpAddr,
    /// `None` matches any metric when deleting
    pub priority: Option<u32>,
}

impl DefaultRoute {
    fn with_priority(&self, priority: u32) -> Self {
        DefaultRoute {
            priority: Some(priority),
            ..self.clone()
        }
    }
}

impl fmt::Display for DefaultRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "default via {} dev {}", self.gateway, self.interface)?;
        if let Some(priority) = self.priority {
            write!(f, " metric {}", priority)?;
        }
        Ok(())
    }
}

/// Abstraction over the kernel routing table.
pub trait RouteTable {
    /// Resolve an interface name to its link index.
    fn link_index(&self, interface: &str) -> Option<u32>;

    /// Dump the entries that may serve as default routes.
    fn list_default_routes(&self) -> FailoverResult<Vec<RouteEntry>>;

    fn add_route(&self, route: &DefaultRoute) -> FailoverResult<()>;

    /// Delete one matching route. Must return
    /// [`FailoverError::RouteNotFound`] when nothing matches.
    fn delete_route(&self, route: &DefaultRoute) -> FailoverResult<()>;
}

/// Find the gateway of the default route carried by `interface`.
///
/// Entries with a destination prefix or a different outbound link are
/// skipped; the first remaining entry with a gateway wins.
pub fn resolve_gateway<R: RouteTable + ?Sized>(
    table: &R,
    interface: &str,
) -> FailoverResult<IpAddr> {
    let link = table
        .link_index(interface)
        .ok_or_else(|| FailoverError::InterfaceNotFound(interface.to_string()))?;

    let routes = table.list_default_routes()?;
    debug!("Scanning {} route entries for link {} ({})", routes.len(), link, interface);

    routes
        .iter()
        .filter(|r| r.oif == Some(link) && r.destination.is_none())
        .find_map(|r| r.gateway)
        .ok_or_else(|| FailoverError::GatewayNotFound(interface.to_string()))
}

/// Resolve the link index and gateway of `interface` into a route template.
fn current_default_route<R: RouteTable + ?Sized>(
    table: &R,
    interface: &str,
) -> FailoverResult<DefaultRoute> {
    let gateway = resolve_gateway(table, interface)?;
    let oif = table
        .link_index(interface)
        .ok_or_else(|| FailoverError::InterfaceNotFound(interface.to_string()))?;

    Ok(DefaultRoute {
        interface: interface.to_string(),
        oif,
        gateway,
        priority: None,
    })
}

/// Delete every default route matching `route`, returning how many went.
fn drain_routes<R: RouteTable + ?Sized>(table: &R, route: &DefaultRoute) -> FailoverResult<usize> {
    let mut removed = 0;
    loop {
        match table.delete_route(route) {
            Ok(()) => removed += 1,
            Err(FailoverError::RouteNotFound(_)) => return Ok(removed),
            Err(e) => return Err(e),
        }
        if removed >= MAX_DUPLICATE_ROUTES {
            return Err(FailoverError::RouteMutation(format!(
                "{} still present after {} deletions",
                route, removed
            )));
        }
    }
}

/// Move the active default route from `old_interface` to `new_interface`.
///
/// Both gateways are resolved before anything is touched, so an unresolved
/// interface leaves the table as it was. Existing default routes on both
/// links are removed before the replacements go in, because the kernel
/// refuses an insert that collides with a surviving entry.
///
/// Once the active route on `new_interface` is in place the switch has
/// succeeded: a failed insert of the demoted route on `old_interface` is
/// only logged, since traffic already flows through the new link.
pub fn switch_routes<R: RouteTable + ?Sized>(
    table: &R,
    old_interface: &str,
    new_interface: &str,
) -> FailoverResult<()> {
    info!("Changing interface from {} to {}", old_interface, new_interface);

    let old = current_default_route(table, old_interface)?;
    let new = current_default_route(table, new_interface)?;

    let removed_old = drain_routes(table, &old)?;
    let removed_new = drain_routes(table, &new)?;
    debug!(
        "Removed {} default route(s) on {} and {} on {}",
        removed_old, old_interface, removed_new, new_interface
    );

    let demoted = table.add_route(&old.with_priority(DEMOTED_PRIORITY));
    table.add_route(&new.with_priority(ACTIVE_PRIORITY))?;

    match demoted {
        Ok(()) => info!(
            "Default route now via {} on {} (backup via {} on {})",
            new.gateway, new_interface, old.gateway, old_interface
        ),
        Err(e) => warn!(
            "Default route now via {} on {}, but no fallback route on {}: {}",
            new.gateway, new_interface, old_interface, e
        ),
    }
    Ok(())
}
