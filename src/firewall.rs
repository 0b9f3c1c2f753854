//! Interface isolation through DROP rules.
//!
//! Production code uses [`IptablesFirewall`]; tests use
//! [`MemoryFirewall`](crate::fakes::MemoryFirewall).

use log::{debug, info};
use std::fmt;

use crate::errors::{FailoverError, FailoverResult};
use crate::network::run_command;

/// Upper bound on duplicate rules removed per direction.
const MAX_DUPLICATE_RULES: usize = 32;

/// Traffic direction a rule applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Ingress,
    Egress,
}

impl Direction {
    /// Filter chain holding rules for this direction
    pub fn chain(&self) -> &'static str {
        match self {
            Direction::Ingress => "INPUT",
            Direction::Egress => "OUTPUT",
        }
    }

    /// iptables match flag selecting the interface
    fn interface_flag(&self) -> &'static str {
        match self {
            Direction::Ingress => "-i",
            Direction::Egress => "-o",
        }
    }
}

/// A deny-all rule scoped to one interface.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FirewallRule {
    pub direction: Direction,
    pub interface: String,
}

impl FirewallRule {
    pub fn drop_all(direction: Direction, interface: &str) -> Self {
        FirewallRule {
            direction,
            interface: interface.to_string(),
        }
    }

    /// Rule specification as passed to iptables after the chain name.
    fn spec(&self) -> [&str; 4] {
        [self.direction.interface_flag(), self.interface.as_str(), "-j", "DROP"]
    }
}

impl fmt::Display for FirewallRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.direction.chain(), self.spec().join(" "))
    }
}

/// Abstraction over the host firewall.
pub trait Firewall {
    fn has_rule(&self, rule: &FirewallRule) -> FailoverResult<bool>;
    fn add_rule(&self, rule: &FirewallRule) -> FailoverResult<()>;
    /// Delete one instance of `rule`.
    fn delete_rule(&self, rule: &FirewallRule) -> FailoverResult<()>;
}

/// Drop all traffic in and out of `interface`.
///
/// Each direction is checked separately and only added if missing, so
/// repeated calls leave one rule per direction.
pub fn isolate<F: Firewall + ?Sized>(firewall: &F, interface: &str) -> FailoverResult<()> {
    info!("Blocking all packets via firewall on interface {}", interface);
    for direction in [Direction::Ingress, Direction::Egress] {
        let rule = FirewallRule::drop_all(direction, interface);
        if firewall.has_rule(&rule)? {
            debug!("Rule already present: {}", rule);
            continue;
        }
        firewall.add_rule(&rule)?;
    }
    Ok(())
}

/// Remove every DROP rule scoped to `interface`. No-op when none exist.
pub fn unisolate<F: Firewall + ?Sized>(firewall: &F, interface: &str) -> FailoverResult<()> {
    info!("Unblocking all packets via firewall on interface {}", interface);
    for direction in [Direction::Ingress, Direction::Egress] {
        let rule = FirewallRule::drop_all(direction, interface);
        let mut removed = 0;
        while firewall.has_rule(&rule)? {
            if removed >= MAX_DUPLICATE_RULES {
                return Err(FailoverError::FirewallMutation(format!(
                    "{} still present after {} deletions",
                    rule, removed
                )));
            }
            firewall.delete_rule(&rule)?;
            removed += 1;
        }
        debug!("Removed {} instance(s) of {}", removed, rule);
    }
    Ok(())
}

/// Production [`Firewall`] driving the `iptables` binary on the filter table.
#[derive(Debug, Clone)]
pub struct IptablesFirewall {
    binary: String,
}

impl Default for IptablesFirewall {
    fn default() -> Self {
        IptablesFirewall {
            binary: "iptables".to_string(),
        }
    }
}

impl IptablesFirewall {
    pub fn new() -> Self {
        Self::default()
    }

    fn args<'a>(&'a self, op: &'a str, rule: &'a FirewallRule) -> Vec<&'a str> {
        let mut args = vec!["-w", op, rule.direction.chain()];
        args.extend(rule.spec());
        args
    }
}

impl Firewall for IptablesFirewall {
    fn has_rule(&self, rule: &FirewallRule) -> FailoverResult<bool> {
        let output = run_command(&self.binary, &self.args("-C", rule))?;
        // -C exits 1 when the rule is absent; anything else is a real failure
        match output.status.code() {
            Some(0) => Ok(true),
            Some(1) => Ok(false),
            _ => Err(FailoverError::FirewallMutation(format!(
                "checking {} failed: {}",
                rule,
                String::from_utf8_lossy(&output.stderr).trim()
            ))),
        }
    }

    fn add_rule(&self, rule: &FirewallRule) -> FailoverResult<()> {
        let output = run_command(&self.binary, &self.args("-I", rule))?;
        if !output.status.success() {
            return Err(FailoverError::FirewallMutation(format!(
                "inserting {} failed: {}",
                rule,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }

    fn delete_rule(&self, rule: &FirewallRule) -> FailoverResult<()> {
        let output = run_command(&self.binary, &self.args("-D", rule))?;
        if !output.status.success() {
            return Err(FailoverError::FirewallMutation(format!(
                "deleting {} failed: {}",
                rule,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }
}
