//! Clap derive structures for the `meshdock` CLI.
//!
//! Defines the complete command tree, global flags, and shared types.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use meshdock_core::Protocol;

// ── Top-Level CLI ────────────────────────────────────────────────────

/// meshdock -- operator companion for the mesh console
#[derive(Debug, Parser)]
#[command(
    name = "meshdock",
    version,
    about = "Inspect and operate meshdock mesh console state from the command line",
    long_about = "Inspect the profiles a mesh console persisted, decode network maps,\n\
        share remote-access targets as links and bridge stdio through a raw channel.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Config file (defaults to the platform config dir)
    #[arg(long, env = "MESHDOCK_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Stack state file (overrides `state_file` from config)
    #[arg(long, env = "MESHDOCK_STATE_FILE", global = true)]
    pub state: Option<PathBuf>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "MESHDOCK_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Inspect and select persisted login profiles
    #[command(alias = "prof", alias = "p")]
    Profiles(ProfilesArgs),

    /// Decode a network map and list its peers
    #[command(alias = "nm")]
    Netmap(NetmapArgs),

    /// Encode or decode remote-access connection links
    Link(LinkArgs),

    /// Bridge stdin/stdout through a raw channel to HOST:PORT
    Pipe(PipeArgs),

    /// Manage CLI configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  PROFILES
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct ProfilesArgs {
    #[command(subcommand)]
    pub command: ProfilesCommand,
}

#[derive(Debug, Subcommand)]
pub enum ProfilesCommand {
    /// List stored profiles
    #[command(alias = "ls")]
    List,

    /// Show the current profile
    Current,

    /// Show one profile's details
    Show {
        /// Profile name (`profile-<id>` or just `<id>`)
        name: String,
    },

    /// Point the current-profile marker at a stored profile
    Use {
        /// Profile name (`profile-<id>` or just `<id>`)
        name: String,
    },

    /// Remove the current-profile marker (log out on next start)
    Clear,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  NETMAP
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct NetmapArgs {
    /// Network map JSON file, or `-` for stdin
    #[arg(value_name = "FILE")]
    pub file: String,

    /// Only list peers that are online
    #[arg(long)]
    pub online: bool,

    /// Print only the self-service peer matching this short hostname
    #[arg(long, value_name = "HOSTNAME", num_args = 0..=1, default_missing_value = "self-service")]
    pub selfservice: Option<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  LINK
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct LinkArgs {
    #[command(subcommand)]
    pub command: LinkCommand,
}

#[derive(Debug, Subcommand)]
pub enum LinkCommand {
    /// Encode a target as a URL-safe token
    Encode {
        /// Protocol: ssh, vnc or rdp
        #[arg(value_parser = parse_protocol)]
        proto: Protocol,

        /// Target host
        host: Option<String>,

        /// Target port (defaults to the protocol's well-known port)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Decode a token back into its target
    Decode {
        /// Token produced by `link encode`
        token: String,
    },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  PIPE
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct PipeArgs {
    /// Target host
    pub host: String,

    /// Target port
    pub port: u16,

    /// Protocol profile used to pick the read buffer size
    #[arg(long, value_parser = parse_protocol)]
    pub proto: Option<Protocol>,

    /// Connect timeout in seconds (overrides `[channels]` config)
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Close the channel as soon as stdin ends instead of waiting for the
    /// remote to close
    #[arg(long)]
    pub close_on_eof: bool,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  CONFIG
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Display current resolved configuration (secrets masked)
    Show,

    /// Print the config file path
    Path,

    /// Write an initial config file
    Init {
        /// Control server URL
        #[arg(long)]
        control_url: Option<String>,

        /// Environment variable to read the auth key from
        #[arg(long)]
        auth_key_env: Option<String>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Read an auth key from stdin and store it in the system keyring
    SetKey,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  COMPLETIONS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}

fn parse_protocol(raw: &str) -> Result<Protocol, String> {
    raw.parse()
        .map_err(|_| format!("unknown protocol '{raw}' (expected ssh, vnc or rdp)"))
}
