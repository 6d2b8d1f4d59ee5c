//! Test suites for the supervision core.

pub(crate) mod support;
