pub mod agent;
pub mod backend;
pub mod config;
pub mod executor;
pub mod history;
pub mod observer;
pub mod oracle;
pub mod scorer;
pub mod snapshot;

pub use ferret_common::fuzzy;
pub use ferret_common::model;
pub use ferret_common::protocol;
