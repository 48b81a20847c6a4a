// Keel - dependency-injected route dispatch for Rust
//
// Handlers and middleware are injectable types resolved through hierarchical
// scopes; servers nest as mount points, each invocation getting a child scope.

// Re-export core functionality
pub use keel_core::*;

// Re-export procedural macros
pub use keel_macro::Injectable;

// Re-export optional crates
#[cfg(feature = "config")]
pub use keel_config;

#[cfg(feature = "testing")]
pub use keel_testing;

/// Prelude for common imports
pub mod prelude {
    pub use keel_core::logging::{LogConfig, LogLevel};
    pub use keel_core::{
        Container, Error, Flow, Handler, HandlerRef, HandlerResult, HttpMethod, HttpRequest,
        HttpResponse, Injectable, MountPoint, Next, PathConfig, Server, ServerHandle, async_trait,
    };
    pub use keel_macro::Injectable;

    #[cfg(feature = "config")]
    pub use keel_config::{ConfigManager, ServerConfig};

    #[cfg(feature = "testing")]
    pub use keel_testing::{Probe, TestClient};
}
