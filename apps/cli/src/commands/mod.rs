//! Subcommand implementations.

pub mod goal;
pub mod notifications;
pub mod run;
pub mod status;
