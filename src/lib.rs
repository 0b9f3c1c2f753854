//! # Link Failover
//!
//! Keeps a host's default route on its preferred network link while that
//! link can reach a sentinel host, and moves it to a backup link when it
//! cannot.
//!
//! A probe thread pings the sentinel through the preferred interface once per
//! interval. The controller feeds the results through a hysteresis state
//! machine; when the preferred link has failed long enough the default routes
//! are rewritten so the backup link carries the lower metric, and the backup
//! link's firewall isolation is lifted. Once the preferred link has been
//! healthy long enough, routes are swapped back and the backup link is
//! isolated again.

pub mod cancel;
pub mod config;
pub mod controller;
pub mod errors;
pub mod fakes;
pub mod firewall;
pub mod hook;
pub mod monitor;
pub mod network;
pub mod routing;
pub mod state;

// Re-export commonly used types and functions
pub use cancel::CancellationToken;
pub use config::{Args, FailoverConfig, ForceTarget};
pub use controller::{Controller, ShutdownHandle};
pub use errors::{FailoverError, FailoverResult};
pub use firewall::{isolate, unisolate, Direction, Firewall, FirewallRule, IptablesFirewall};
pub use hook::{CommandHook, NoopHook, SwitchEvent, SwitchHook};
pub use monitor::{Event, ProbeEvent, ProbeMonitor, Prober};
pub use network::{
    check_privileges,
    interface_exists,
    link_index,
    list_interfaces,
    IpRouteTable,
    PingProber,
};
pub use routing::{
    resolve_gateway,
    switch_routes,
    DefaultRoute,
    RouteEntry,
    RouteTable,
    ACTIVE_PRIORITY,
    DEMOTED_PRIORITY,
};
pub use state::{FailoverMachine, FailoverState, Transition};
