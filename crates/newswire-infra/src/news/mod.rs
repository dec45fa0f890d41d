//! Upstream article sources.

pub mod newsapi;

pub use newsapi::NewsApiSource;
