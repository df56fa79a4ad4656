pub mod backend;
pub mod cdp;
pub mod inject;

pub use backend::CdpDriver;
pub use cdp::LaunchOptions;
