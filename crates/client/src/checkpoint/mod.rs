//! Checkpointed configuration storage.
//!
//! [`ConfigTree`] is an in-memory image of a configuration directory and
//! [`CheckpointStore`] keeps the ordered history of saved images that
//! installers roll back through.

mod store;
mod tree;

pub use store::CheckpointStore;
pub use tree::ConfigTree;
