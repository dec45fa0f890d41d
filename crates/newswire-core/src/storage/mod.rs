//! Persistence ports. Implementations live in newswire-infra.

pub mod article;
