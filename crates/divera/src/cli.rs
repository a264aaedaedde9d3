//! Clap derive structures for the `divera` CLI.
//!
//! Defines the complete command tree, global flags, and shared types.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use divera_api::CrewMode;
use divera_core::{ActionKind, RecordKind};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// divera -- poll and drive Divera 24/7 units from the command line
#[derive(Debug, Parser)]
#[command(
    name = "divera",
    version,
    about = "Divera 24/7 alerting from the command line",
    long_about = "Polls Divera 24/7 units for alarms, vehicles, message channels and\n\
        status options, and sends alarms, vehicle updates, messages and news.",
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
    /// Config file (defaults to the platform config directory)
    #[arg(long, env = "DIVERA_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Account profile to use
    #[arg(long, short = 'p', env = "DIVERA_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "DIVERA_OUTPUT",
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
    /// Log in (or use an API key) and select the units to poll
    Setup(SetupArgs),

    /// Poll every unit once and show its health
    #[command(alias = "st")]
    Status,

    /// Poll once and list entities
    #[command(alias = "ls")]
    Entities(EntitiesArgs),

    /// Keep polling and print entity changes until interrupted
    Watch(WatchArgs),

    /// Create, modify and close alarms
    #[command(alias = "a")]
    Alarm(AlarmArgs),

    /// Update vehicle status, crew and properties
    #[command(alias = "v")]
    Vehicle(VehicleArgs),

    /// Send a message to a channel or alarm thread
    #[command(alias = "msg")]
    Message(MessageArgs),

    /// Publish a news item
    News(NewsArgs),

    /// Run any action with JSON data
    Call(CallArgs),

    /// Export diagnostics (credentials redacted)
    #[command(alias = "diag")]
    Diagnostics,

    /// Manage CLI configuration and profiles
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Shared target argument ───────────────────────────────────────────

#[derive(Debug, Clone, Args)]
pub struct UnitArg {
    /// Unit (ucr id); may be omitted when the profile has one unit or the
    /// target record identifies it
    #[arg(long, short = 'u')]
    pub unit: Option<u64>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  SETUP
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct SetupArgs {
    /// Divera account login; the password is prompted
    #[arg(long, conflicts_with = "api_key")]
    pub username: Option<String>,

    /// Personal or system-user API key (prompted when neither this nor
    /// --username is given)
    #[arg(long, env = "DIVERA_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Self-hosted Divera instance
    #[arg(long)]
    pub base_url: Option<String>,

    /// Units to poll (ucr ids); required for multi-unit accounts when not
    /// running interactively
    #[arg(long = "unit", short = 'u', value_delimiter = ',')]
    pub units: Vec<u64>,

    /// Save the API key in the config file instead of the system keyring
    #[arg(long)]
    pub plaintext: bool,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  ENTITIES / WATCH
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct EntitiesArgs {
    #[command(flatten)]
    pub unit: UnitArg,

    /// Only this kind (alarm, vehicle, message_channel, status, event,
    /// open_alarms, unit, current_status, calendar)
    #[arg(long, short = 'k')]
    pub kind: Option<RecordKind>,
}

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Also print the initial entity list
    #[arg(long)]
    pub initial: bool,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  ALARM
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct AlarmArgs {
    #[command(subcommand)]
    pub command: AlarmCommand,
}

/// Fields shared by alarm create and modify.
#[derive(Debug, Args)]
pub struct AlarmFieldArgs {
    /// Keyword / title
    #[arg(long, short = 't')]
    pub title: String,

    /// Recipients: 1 unit leaders, 2 whole unit, 3 groups, 4 users
    #[arg(long, short = 'n', default_value = "2")]
    pub notification_type: u8,

    #[arg(long)]
    pub text: Option<String>,

    #[arg(long)]
    pub address: Option<String>,

    /// Mark as priority alarm (with special signal)
    #[arg(long)]
    pub priority: bool,

    /// Group ids to alert
    #[arg(long, value_delimiter = ',')]
    pub group: Vec<u64>,

    /// User cluster relation ids to alert
    #[arg(long, value_delimiter = ',')]
    pub user_cluster_relation: Vec<u64>,

    /// Vehicle ids to alert
    #[arg(long, value_delimiter = ',')]
    pub vehicle: Vec<u64>,
}

#[derive(Debug, Subcommand)]
pub enum AlarmCommand {
    /// Create an alarm; it shows up with the next poll
    Create {
        #[command(flatten)]
        unit: UnitArg,

        /// Cluster the alarm belongs to (defaults to the unit's cluster)
        #[arg(long)]
        cluster_id: Option<u64>,

        #[command(flatten)]
        fields: AlarmFieldArgs,
    },

    /// Replace title, text and recipients of an alarm
    Modify {
        #[command(flatten)]
        unit: UnitArg,

        /// Alarm id
        id: u64,

        #[command(flatten)]
        fields: AlarmFieldArgs,
    },

    /// Close (or reopen) an alarm
    Close {
        #[command(flatten)]
        unit: UnitArg,

        /// Alarm id
        id: u64,

        /// Reopen instead of closing
        #[arg(long)]
        reopen: bool,

        /// Deployment report
        #[arg(long)]
        report: Option<String>,
    },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  VEHICLE
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct VehicleArgs {
    #[command(subcommand)]
    pub command: VehicleCommand,
}

#[derive(Debug, Subcommand)]
pub enum VehicleCommand {
    /// Set FMS status, note and position
    Status {
        #[command(flatten)]
        unit: UnitArg,

        /// Vehicle id
        id: u64,

        /// FMS status number (0-9)
        #[arg(long, short = 's', conflicts_with = "status_id")]
        status: Option<u32>,

        /// FMS status id (takes precedence over --status)
        #[arg(long)]
        status_id: Option<u32>,

        #[arg(long)]
        note: Option<String>,

        #[arg(long, requires = "lng")]
        lat: Option<f64>,

        #[arg(long, requires = "lat")]
        lng: Option<f64>,
    },

    /// Add, remove or reset crew members
    Crew {
        #[command(flatten)]
        unit: UnitArg,

        /// Vehicle id
        id: u64,

        /// add, remove or reset
        #[arg(long, short = 'm')]
        mode: CrewMode,

        /// User cluster relation ids
        #[arg(value_delimiter = ',')]
        crew: Vec<u64>,
    },

    /// Set custom vehicle properties
    Property {
        #[command(flatten)]
        unit: UnitArg,

        /// Vehicle id
        id: u64,

        /// Properties as key=value (numbers and booleans are detected)
        #[arg(required = true)]
        properties: Vec<String>,
    },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  MESSAGE / NEWS / CALL
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct MessageArgs {
    #[command(flatten)]
    pub unit: UnitArg,

    /// Message channel id
    #[arg(long, short = 'c', conflicts_with = "alarm")]
    pub channel: Option<u64>,

    /// Alarm whose thread receives the message
    #[arg(long, short = 'a')]
    pub alarm: Option<u64>,

    /// Message text
    pub text: String,
}

#[derive(Debug, Args)]
pub struct NewsArgs {
    #[command(flatten)]
    pub unit: UnitArg,

    /// Cluster the news belongs to (defaults to the unit's cluster)
    #[arg(long)]
    pub cluster_id: Option<u64>,

    #[arg(long, short = 't')]
    pub title: String,

    #[arg(long)]
    pub text: Option<String>,

    /// Recipients: 1 unit leaders, 2 whole unit, 3 groups, 4 users
    #[arg(long, short = 'n', default_value = "2")]
    pub notification_type: u8,

    /// Group ids to notify
    #[arg(long, value_delimiter = ',')]
    pub group: Vec<u64>,
}

#[derive(Debug, Args)]
pub struct CallArgs {
    #[command(flatten)]
    pub unit: UnitArg,

    /// Action name (e.g. set_vehicle_status, create_alarm)
    pub action: ActionKind,

    /// Action data as a JSON object
    #[arg(long, short = 'd', conflicts_with = "file")]
    pub data: Option<String>,

    /// Read action data from a JSON file
    #[arg(long, short = 'f')]
    pub file: Option<PathBuf>,
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
    /// Display the current configuration (secrets masked)
    Show,

    /// List configured profiles
    Profiles,

    /// Set the default profile
    Use {
        /// Profile name to set as default
        name: String,
    },

    /// Change polling intervals (defaults, or one unit with --unit)
    SetIntervals {
        #[command(flatten)]
        unit: UnitArg,

        /// Idle interval in seconds (at least 30)
        #[arg(long)]
        data: Option<u64>,

        /// Interval while an alarm is open, in seconds (at least 10)
        #[arg(long)]
        alarm: Option<u64>,
    },

    /// Replace the API key of the active profile
    SetKey {
        /// New API key (prompted when absent)
        #[arg(long, env = "DIVERA_API_KEY", hide_env_values = true)]
        api_key: Option<String>,

        /// Save in the config file instead of the system keyring
        #[arg(long)]
        plaintext: bool,
    },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  COMPLETIONS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
