pub mod fuzzy;
pub mod model;
pub mod protocol;
