//! Test support and behavioural suites for the node controller.

mod process_behaviour;
pub(crate) mod support;
