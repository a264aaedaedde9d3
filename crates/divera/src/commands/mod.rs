//! Command dispatch.

pub mod actions;
pub mod config_cmd;
pub mod diagnostics;
pub mod setup;
pub mod status;
pub mod util;
pub mod watch;

use divera_core::RecentLogs;

use crate::cli::{Cli, Command, GlobalOpts};
use crate::error::CliError;

pub async fn dispatch(cmd: Command, global: &GlobalOpts, logs: &RecentLogs) -> Result<(), CliError> {
    match cmd {
        // Config and setup don't poll any unit
        Command::Config(args) => config_cmd::handle(args, global),
        Command::Setup(args) => setup::handle(args, global).await,

        Command::Status => status::handle(global).await,
        Command::Entities(args) => status::entities(args, global).await,
        Command::Watch(args) => watch::handle(args, global).await,

        Command::Alarm(args) => actions::alarm(args, global).await,
        Command::Vehicle(args) => actions::vehicle(args, global).await,
        Command::Message(args) => actions::message(args, global).await,
        Command::News(args) => actions::news(args, global).await,
        Command::Call(args) => actions::call(args, global).await,

        Command::Diagnostics => diagnostics::handle(global, logs).await,

        // Shell completions generation
        Command::Completions(args) => {
            use clap::CommandFactory;
            use clap_complete::generate;

            let mut cmd = Cli::command();
            generate(args.shell, &mut cmd, "divera", &mut std::io::stdout());
            Ok(())
        }
    }
}
