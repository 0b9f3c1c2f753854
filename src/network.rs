use log::debug;
use std::ffi::CString;
use std::net::IpAddr;
use std::process::{Command, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crate::errors::{FailoverError, FailoverResult};
use crate::monitor::Prober;
use crate::routing::{DefaultRoute, RouteEntry, RouteTable};

/// How often a running probe is polled for completion
const PROBE_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Run a command to completion and capture its output.
///
/// Only a failure to spawn is an error here; exit status is left to the caller.
pub fn run_command(program: &str, args: &[&str]) -> FailoverResult<Output> {
    debug!("Executing command: {} {}", program, args.join(" "));
    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|e| FailoverError::CommandExecution(format!("{}: {}", program, e)))?;

    debug!("Command exited with status: {}", output.status);
    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stderr.is_empty() {
        debug!("Command stderr: {}", stderr.trim());
    }
    Ok(output)
}

/// Resolve an interface name to its kernel link index.
pub fn link_index(iface: &str) -> Option<u32> {
    let name = CString::new(iface).ok()?;
    // SAFETY: `name` is a valid NUL-terminated string for the duration of the call
    let index = unsafe { libc::if_nametoindex(name.as_ptr()) };
    (index != 0).then_some(index)
}

/// Check if a given interface exists
pub fn interface_exists(iface: &str) -> bool {
    link_index(iface).is_some()
}

/// Get available network interfaces
pub fn list_interfaces() -> Vec<String> {
    match std::fs::read_dir("/sys/class/net") {
        Ok(entries) => {
            let mut interfaces: Vec<String> = entries
                .filter_map(|entry| entry.ok())
                .filter_map(|entry| entry.file_name().into_string().ok())
                .collect();
            interfaces.sort();
            interfaces
        }
        Err(e) => {
            debug!("Could not list interfaces: {}", e);
            Vec::new()
        }
    }
}

/// Fail unless running with an effective uid of root.
pub fn check_privileges() -> FailoverResult<()> {
    // SAFETY: geteuid has no preconditions and cannot fail
    let euid = unsafe { libc::geteuid() };
    if euid != 0 {
        debug!("Running with effective uid {}", euid);
        return Err(FailoverError::InsufficientPermissions);
    }
    Ok(())
}

/// Parse one line of `ip -4 route show` output.
///
/// Lines look like `default via 192.168.1.1 dev eth0 proto dhcp metric 100`.
/// Device names are mapped to link indices through `resolve`.
pub(crate) fn parse_route_line(
    line: &str,
    resolve: impl Fn(&str) -> Option<u32>,
) -> Option<RouteEntry> {
    let mut tokens = line.split_whitespace();
    let destination = match tokens.next()? {
        "default" | "0.0.0.0/0" => None,
        other => Some(other.to_string()),
    };

    let mut entry = RouteEntry {
        destination,
        oif: None,
        gateway: None,
        priority: None,
    };

    while let Some(key) = tokens.next() {
        match key {
            "via" => entry.gateway = tokens.next().and_then(|v| v.parse::<IpAddr>().ok()),
            "dev" => entry.oif = tokens.next().and_then(&resolve),
            "metric" => entry.priority = tokens.next().and_then(|v| v.parse().ok()),
            _ => {}
        }
    }

    Some(entry)
}

/// Production [`RouteTable`] driving the `ip` binary against the main table.
#[derive(Debug, Clone, Default)]
pub struct IpRouteTable;

impl IpRouteTable {
    pub fn new() -> Self {
        IpRouteTable
    }

    /// Run `ip -4 route <op> default via <gw> dev <iface> [metric <n>]`.
    fn route_command(&self, op: &str, route: &DefaultRoute) -> FailoverResult<()> {
        let gateway = route.gateway.to_string();
        let metric = route.priority.map(|p| p.to_string());

        let mut args = vec![
            "-4",
            "route",
            op,
            "default",
            "via",
            gateway.as_str(),
            "dev",
            route.interface.as_str(),
        ];
        if let Some(metric) = metric.as_deref() {
            args.extend(["metric", metric]);
        }

        let output = run_command("ip", &args)?;
        if !output.status.success() {
            return Err(route_error(route, op, &String::from_utf8_lossy(&output.stderr)));
        }
        debug!("Route {} succeeded: {}", op, route);
        Ok(())
    }
}

/// Classify a failed `ip route` invocation.
fn route_error(route: &DefaultRoute, op: &str, stderr: &str) -> FailoverError {
    if stderr.contains("No such process") || stderr.contains("No such file or directory") {
        FailoverError::RouteNotFound(route.to_string())
    } else if stderr.contains("Cannot find device") {
        FailoverError::InterfaceNotFound(route.interface.clone())
    } else {
        FailoverError::RouteMutation(format!("{} {}: {}", op, route, stderr.trim()))
    }
}

impl RouteTable for IpRouteTable {
    fn link_index(&self, interface: &str) -> Option<u32> {
        link_index(interface)
    }

    fn list_default_routes(&self) -> FailoverResult<Vec<RouteEntry>> {
        let output = run_command("ip", &["-4", "route", "show", "default"])?;
        if !output.status.success() {
            return Err(FailoverError::CommandExecution(format!(
                "ip route show failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        debug!("Command output (stdout): {}", stdout.trim());
        Ok(stdout
            .lines()
            .filter_map(|line| parse_route_line(line, link_index))
            .collect())
    }

    fn add_route(&self, route: &DefaultRoute) -> FailoverResult<()> {
        self.route_command("add", route)
    }

    fn delete_route(&self, route: &DefaultRoute) -> FailoverResult<()> {
        self.route_command("del", route)
    }
}

/// Production [`Prober`] sending one ICMP echo with the `ping` binary.
///
/// The child is killed once the timeout passes, so a probe never outlives
/// its budget even if `ping` ignores `-W`.
#[derive(Debug, Clone, Default)]
pub struct PingProber;

impl PingProber {
    pub fn new() -> Self {
        PingProber
    }
}

impl Prober for PingProber {
    fn probe(&self, host: &str, interface: &str, timeout: Duration) -> FailoverResult<()> {
        debug!("Pinging {} from interface {}", host, interface);

        let wait_secs = timeout.as_secs().max(1).to_string();
        let mut child = Command::new("ping")
            .args(["-n", "-q", "-c", "1", "-W", &wait_secs, "-I", interface, host])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| FailoverError::ProbeFailed(format!("could not spawn ping: {}", e)))?;

        let deadline = Instant::now() + timeout;
        loop {
            if let Some(status) = child.try_wait()? {
                return if status.success() {
                    Ok(())
                } else {
                    Err(FailoverError::ProbeFailed(format!(
                        "{} unreachable via {} ({})",
                        host, interface, status
                    )))
                };
            }
            if Instant::now() >= deadline {
                let _ = child.kill();
                let _ = child.wait();
                return Err(FailoverError::ProbeFailed(format!(
                    "{} timed out via {} after {:?}",
                    host, interface, timeout
                )));
            }
            thread::sleep(PROBE_POLL_INTERVAL);
        }
    }
}
