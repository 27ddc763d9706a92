//! Check definitions on disk.
//!
//! Reading a check's declared identifiers, and validating that every
//! check under a checks root carries a unique one.

pub mod definition;
pub mod validator;

pub use definition::resolve_check_id;
pub use validator::IdValidator;
