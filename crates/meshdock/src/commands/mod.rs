//! Command handlers: CLI args -> core operations -> output formatting.

pub mod config_cmd;
pub mod link;
pub mod netmap;
pub mod pipe;
pub mod profiles;
pub mod util;
