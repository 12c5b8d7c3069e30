//! CLI subcommands.

pub mod dump;
pub mod info;
