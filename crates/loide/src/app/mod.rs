//! Application layer: the session model, its codecs, and the solver service protocol.

pub mod catalog;
pub mod export;
pub mod form;
pub mod project;
pub mod run;
pub mod session;
pub mod settings;
pub mod share;
pub mod tabs;
