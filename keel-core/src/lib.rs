// Core library for the Keel dispatch framework
// Injection scopes, handler references, the dispatch wrapper and mount points

pub mod adapter;
pub mod container;
pub mod dispatch;
pub mod error;
pub mod handler;
pub mod handler_ref;
pub mod http;
pub mod logging;
pub mod routing;
pub mod server;
pub mod traits;

// Re-export commonly used types
pub use adapter::{CallbackHandler, Next, from_fn};
pub use container::*;
pub use dispatch::{DispatchWrapper, GENERIC_FAILURE_BODY};
pub use error::*;
pub use handler::*;
pub use handler_ref::{HandlerRef, MountPoint, Resolved};
pub use http::*;
pub use routing::{MatchMode, PathConfig, Registration, RouteTable};
pub use server::{BindAddr, Server, ServerHandle, ServerSettings, TRANSPORT_TOKEN, TransportHandle};
pub use traits::*;

pub use async_trait::async_trait;
