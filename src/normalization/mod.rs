pub mod snapshot;
pub mod title;
