//! Domain types shared by the session components.

pub mod errors;
pub mod model;
