pub mod cache;
pub mod elastic;
pub mod gateway;
pub mod memory;
