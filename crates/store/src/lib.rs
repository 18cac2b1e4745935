pub mod artifact_store;
pub mod dataset;
pub mod fs_store;
pub mod memory_store;

pub use artifact_store::*;
pub use dataset::*;
pub use fs_store::*;
pub use memory_store::*;
