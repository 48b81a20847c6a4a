//! Testing utilities for Keel servers.
//!
//! - [`TestClient`] drives a [`Server`](keel_core::Server) in process,
//!   without sockets, through the same root dispatch the transport uses.
//! - [`TestResponse`] wraps the produced response with assertion helpers.
//! - [`Probe`] records how often a position in a chain was reached.
//!
//! ```
//! use keel_core::{Container, HandlerRef, Server};
//! use keel_testing::{Probe, TestClient};
//!
//! # tokio_test::block_on(async {
//! let probe = Probe::new();
//! let mut server = Server::new(Container::new());
//! server.get("/", [probe.continuing(), probe.sending("hello")]).unwrap();
//!
//! let client = TestClient::new(server);
//! client.get("/").await.assert_status(200).assert_body("hello");
//! assert_eq!(probe.count(), 2);
//! # });
//! ```

mod probe;
mod test_client;

pub use probe::Probe;
pub use test_client::{TestClient, TestRequestBuilder, TestResponse};
