//! Live code-generation stream over a WebSocket.
//!
//! [`StreamController`] owns at most one connection. Frames are parsed into
//! [`shared_types::StreamMessage`] and handed to a [`StreamHandler`] in
//! arrival order; a [`PauseGate`] holds them back while the handler waits on
//! the user.

mod controller;
mod gate;
mod transport;


pub use controller::{stream_url, Flow, StreamController, StreamHandle, StreamHandler, StreamOutcome};
pub use gate::{Admission, PauseGate};
pub use transport::{StreamConnector, StreamTransport, WsConnector};
