pub mod constants;
pub mod layout;
pub mod options;

pub(crate) mod alive;

mod core;
pub use core::{Runtime, RuntimeInfo};
