pub mod checkpoint;

pub use checkpoint::{Checkpointable, FileStateStore};
