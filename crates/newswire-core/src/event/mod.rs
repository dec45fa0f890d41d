//! Event distribution for operational visibility.

pub mod bus;
