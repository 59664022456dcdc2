pub mod checkpoint;
pub mod classifier;
pub mod normalize;
pub mod passes;
pub mod resolver;
