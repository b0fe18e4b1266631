use clap::{Parser, Subcommand};
use launchpad::console::commands::{deploy, mq, project, CallableTrait};
use launchpad::telemetry::{get_subscriber, init_subscriber};

#[derive(Parser, Debug)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    MQ {
        #[command(subcommand)]
        command: AppMqCommands,
    },
    Deploy {
        #[command(subcommand)]
        command: DeployCommands,
    },
    Project {
        #[command(subcommand)]
        command: ProjectCommands,
    },
}

#[derive(Debug, Subcommand)]
enum AppMqCommands {
    /// Print invalidation broadcasts as edges receive them
    Listen {},
}

#[derive(Debug, Subcommand)]
enum DeployCommands {
    /// Put a deploy job on the deploy queue
    Enqueue {
        #[arg(long)]
        deployment_id: i32,
        #[arg(long)]
        skip_webroot_upload: bool,
        #[arg(long)]
        skip_invalidation: bool,
        #[arg(long)]
        use_raw_bundle: bool,
    },
}

#[derive(Debug, Subcommand)]
enum ProjectCommands {
    /// Delete a project, its storage objects and its edge caches
    Destroy {
        #[arg(long)]
        name: String,
    },
    Lock {
        #[arg(long)]
        name: String,
    },
    Unlock {
        #[arg(long)]
        name: String,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let subscriber = get_subscriber("console".into(), "warn".into());
    init_subscriber(subscriber);

    get_command(cli)?.call()
}

fn get_command(cli: Cli) -> Result<Box<dyn CallableTrait>, String> {
    match cli.command {
        Commands::MQ { command } => match command {
            AppMqCommands::Listen {} => Ok(Box::new(mq::ListenCommand::new())),
        },
        Commands::Deploy { command } => match command {
            DeployCommands::Enqueue {
                deployment_id,
                skip_webroot_upload,
                skip_invalidation,
                use_raw_bundle,
            } => Ok(Box::new(deploy::EnqueueCommand::new(
                deployment_id,
                skip_webroot_upload,
                skip_invalidation,
                use_raw_bundle,
            ))),
        },
        Commands::Project { command } => match command {
            ProjectCommands::Destroy { name } => Ok(Box::new(project::DestroyCommand::new(name))),
            ProjectCommands::Lock { name } => Ok(Box::new(project::LockCommand::new(name, true))),
            ProjectCommands::Unlock { name } => {
                Ok(Box::new(project::LockCommand::new(name, false)))
            }
        },
    }
}
