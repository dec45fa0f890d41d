//! Service-level ports shared by the pipeline and the infra adapters.

pub mod hash;
