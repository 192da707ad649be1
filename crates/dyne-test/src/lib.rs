//! # dyne-test
//!
//! In-memory testing for dyne services: requests and streams go through a
//! real [`Dispatcher`](dyne_server::Dispatcher) without binding a port.
//!
//! ## Example
//!
//! ```rust
//! use dyne_core::Response;
//! use dyne_server::{handler, stream_handler, Registry, Route, StreamSession};
//! use dyne_test::TestClient;
//!
//! # tokio_test::block_on(async {
//! let mut registry = Registry::new();
//! registry
//!     .register(Route::new("/hello", handler(|_req| async { Ok(Response::text("hi")) })))
//!     .unwrap();
//! registry
//!     .register(Route::stream("/echo", stream_handler(|mut session: StreamSession| async move {
//!         while let Some(msg) = session.recv().await {
//!             let _ = session.send(msg).await;
//!         }
//!     })))
//!     .unwrap();
//!
//! let client = TestClient::new(registry);
//! client.get("/hello").send().await.assert_body_eq("hi");
//!
//! let mut stream = client.stream("/echo").connect().await.unwrap();
//! stream.send_text("ping").await.unwrap();
//! assert_eq!(stream.recv_text().await.unwrap(), "ping");
//! stream.close().await.unwrap();
//! # });
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod client;
mod error;
mod request;
mod response;
mod stream;

pub use client::{TestClient, TestClientRequest};
pub use error::TestError;
pub use request::TestRequestBuilder;
pub use response::TestResponse;
pub use stream::{Closed, TestStream};
