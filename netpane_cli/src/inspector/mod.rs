//! Inspector: the panel served over HTTP and WebSocket

mod client;
mod port;
mod server;
mod store;

pub use client::InspectorClient;
pub use port::{find_inspector_port, InspectorMode};
pub use server::start_server;
pub use store::PanelStore;
