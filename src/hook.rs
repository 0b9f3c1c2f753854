use log::{debug, info};
use std::process::Command;

use crate::errors::{FailoverError, FailoverResult};
use crate::state::FailoverState;

/// Details of a completed route switch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchEvent {
    /// Interface that lost the active default route
    pub from: String,
    /// Interface that now carries the active default route
    pub to: String,
    /// Controller state after the switch
    pub state: FailoverState,
}

/// Extension point run after every successful switch.
///
/// Failures are reported to the caller, which logs them. Hooks are never
/// retried.
pub trait SwitchHook {
    fn on_switch(&self, event: &SwitchEvent) -> FailoverResult<()>;
}

/// Hook that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHook;

impl SwitchHook for NoopHook {
    fn on_switch(&self, _event: &SwitchEvent) -> FailoverResult<()> {
        Ok(())
    }
}

/// Runs an external command, typically restarting a VPN bound to the
/// default route (`systemctl restart openvpn@hs`).
///
/// The switch details are exported as `FAILOVER_FROM`, `FAILOVER_TO` and
/// `FAILOVER_STATE`.
#[derive(Debug, Clone)]
pub struct CommandHook {
    argv: Vec<String>,
}

impl CommandHook {
    pub fn new(argv: Vec<String>) -> FailoverResult<Self> {
        if argv.is_empty() || argv[0].trim().is_empty() {
            return Err(FailoverError::InvalidConfiguration(
                "on_switch command must not be empty".to_string(),
            ));
        }
        Ok(CommandHook { argv })
    }

    pub fn argv(&self) -> &[String] {
        &self.argv
    }
}

impl SwitchHook for CommandHook {
    fn on_switch(&self, event: &SwitchEvent) -> FailoverResult<()> {
        info!("Running switch hook: {}", self.argv.join(" "));

        let output = Command::new(&self.argv[0])
            .args(&self.argv[1..])
            .env("FAILOVER_FROM", &event.from)
            .env("FAILOVER_TO", &event.to)
            .env("FAILOVER_STATE", event.state.to_string())
            .output()
            .map_err(|e| FailoverError::HookFailed(format!("{}: {}", self.argv[0], e)))?;

        if !output.status.success() {
            return Err(FailoverError::HookFailed(format!(
                "{} exited with {}: {}",
                self.argv[0],
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        debug!("Switch hook finished with status: {}", output.status);
        Ok(())
    }
}
