use thiserror::Error;

/// Errors that can occur in the link failover system
#[derive(Error, Debug)]
pub enum FailoverError {
    /// Interface has no resolvable link index
    #[error("Interface not found: {0}")]
    InterfaceNotFound(String),

    /// Interface exists but carries no default route with a gateway
    #[error("Gateway not found for interface: {0}")]
    GatewayNotFound(String),

    /// A route to delete was not present. Callers draining routes treat
    /// this as success.
    #[error("No such route: {0}")]
    RouteNotFound(String),

    /// Adding or deleting a route failed
    #[error("Route modification failed: {0}")]
    RouteMutation(String),

    /// Adding, deleting or querying a firewall rule failed
    #[error("Firewall modification failed: {0}")]
    FirewallMutation(String),

    /// Reachability probe failed or timed out
    #[error("Probe failed: {0}")]
    ProbeFailed(String),

    /// The on-switch hook failed
    #[error("Switch hook failed: {0}")]
    HookFailed(String),

    /// Command execution failed
    #[error("Failed to execute command: {0}")]
    CommandExecution(String),

    /// Configuration is invalid
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Operating system is not supported
    #[error("Unsupported operating system")]
    UnsupportedOS,

    /// Insufficient permissions
    #[error("Insufficient permissions (try running as root)")]
    InsufficientPermissions,

    /// IO error
    #[error("IO error: {0}")]
    IOError(#[from] std::io::Error),
}

/// Shorthand result type for failover operations
pub type FailoverResult<T> = Result<T, FailoverError>;
