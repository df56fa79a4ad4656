pub mod launcher;
pub mod registry;
pub mod server;

pub use launcher::{EngineLauncher, LaunchError, SessionLauncher};
pub use registry::SessionRegistry;
pub use server::{ClientMessage, Gateway, GatewayHandle, ServerMessage};
