//! Response cache adapters.

pub mod file;

pub use file::FileResponseCache;
