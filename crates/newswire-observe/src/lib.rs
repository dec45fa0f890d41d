//! Observability setup for Newswire.
//!
//! Provider calls carry `gen_ai.*` span fields; this crate installs the
//! subscriber that renders them and, optionally, exports them as
//! OpenTelemetry spans.

pub mod tracing_setup;
