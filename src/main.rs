use std::process;

use anyhow::Result;
use clap::CommandFactory;
use tracing::error;

use terraform_provisioner::cli::{self, Commands};
use terraform_provisioner::remote::LocalCommunicator;
use terraform_provisioner::ui::ConsoleUi;
use terraform_provisioner::version::VersionResolver;

fn main() -> Result<()> {
    let args = cli::parse_args()?;
    terraform_provisioner::init_logging(args.command.log_level())?;

    let result = match &args.command {
        Commands::Apply(opts) => {
            let versions = VersionResolver::new(opts.endpoint);
            let ui = ConsoleUi::new(&opts.name);
            let comm = LocalCommunicator::new(opts.dry_run);
            terraform_provisioner::run_apply(opts, &versions, &ui, &comm)
        }
        Commands::Validate(opts) => {
            let versions = VersionResolver::new(opts.endpoint);
            terraform_provisioner::run_validate(opts, &versions)
        }
        Commands::Completions(opts) => {
            let mut cmd = cli::Cli::command();
            let name = cmd.get_name().to_string();
            clap_complete::generate(opts.shell, &mut cmd, name, &mut std::io::stdout());
            Ok(())
        }
    };

    if let Err(e) = result {
        error!("{:#}", e);
        process::exit(1);
    }

    Ok(())
}
