pub mod diff;
pub mod loader;
pub mod projection;
