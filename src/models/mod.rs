pub mod range;
pub mod snapshot;
