//! Script assembly and sandboxed execution.

pub mod sandbox;
pub mod script_builder;

pub use sandbox::{persist_script, Sandbox};
pub use script_builder::{assemble_script, check_forbidden_selectors};
