use anyhow::Result;
use clap::{ArgAction, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use tracing_subscriber::EnvFilter;

use ccswap::{
    commands,
    environment::ShellProjector,
    paths::Paths,
    secrets::open_backend,
    store::FileStore,
    switch::SwitchEngine,
    ui::{ColorMode, Ui},
};

#[derive(Parser)]
#[command(name = "ccswap")]
#[command(about = "Claude Code Account Switcher - keep several OAuth and API accounts and swap between them")]
#[command(version)]
struct Cli {
    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// When to use colors: always, auto, never
    #[arg(long, global = true, value_name = "WHEN", default_value = "auto")]
    color: ColorMode,

    /// Log progress to stderr (-v for info, -vv for debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register the account Claude Code is currently logged in to
    AddOauthAccount,

    /// Register an API endpoint account
    AddApiAccount {
        /// Display name (defaults to the endpoint host)
        name: Option<String>,

        /// Endpoint URL
        #[arg(long, env = "ANTHROPIC_BASE_URL", hide_env_values = true)]
        base_url: Option<String>,

        /// Auth token for the endpoint
        #[arg(long, env = "ANTHROPIC_AUTH_TOKEN", hide_env_values = true)]
        auth_token: Option<String>,
    },

    /// Remove an account by number or email
    RemoveAccount {
        /// Account number or email
        identifier: String,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// List all managed accounts
    List,

    /// Show the active account and the Claude Code login
    Status,

    /// Rotate to the next account
    Switch {
        /// Wait up to this many seconds for Claude Code to exit first
        #[arg(long, value_name = "SECS")]
        wait: Option<u64>,
    },

    /// Switch to a specific account by number or email
    SwitchTo {
        /// Account number or email
        identifier: String,

        /// Wait up to this many seconds for Claude Code to exit first
        #[arg(long, value_name = "SECS")]
        wait: Option<u64>,
    },

    /// Print shell commands for the active account: eval "$(ccswap env)"
    #[command(alias = "env")]
    EmitEnvironmentCommands,

    /// Run diagnostics on the ccswap setup
    Doctor,

    /// Generate shell completions
    Completions {
        /// Target shell
        shell: Shell,
    },
}

fn init_logging(verbose: u8, color: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(match verbose {
            0 => "ccswap=warn",
            1 => "ccswap=info",
            _ => "ccswap=debug",
        })
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(color)
        .with_target(false)
        .init();
}

fn main() {
    let cli = Cli::parse();
    let ui = Ui::new(cli.color, cli.no_color);
    init_logging(cli.verbose, ui.color_enabled);

    if let Err(e) = run(cli, &ui) {
        ui.err(format!("{:#}", e));
        std::process::exit(1);
    }
}

fn run(cli: Cli, ui: &Ui) -> Result<()> {
    if let Commands::Completions { shell } = cli.command {
        clap_complete::generate(shell, &mut Cli::command(), "ccswap", &mut std::io::stdout());
        return Ok(());
    }

    let paths = Paths::new()?;
    paths.ensure_dirs()?;
    let store = FileStore::new(&paths);
    let secrets = open_backend(&paths)?;
    let projector = ShellProjector::new(&paths);
    let engine = SwitchEngine::new(&paths, &store, secrets.as_ref(), &projector);

    match cli.command {
        Commands::AddOauthAccount => commands::add_oauth(&engine, ui),
        Commands::AddApiAccount {
            name,
            base_url,
            auth_token,
        } => commands::add_api(
            &engine,
            ui,
            name.as_deref(),
            base_url.as_deref(),
            auth_token.as_deref(),
        ),
        Commands::RemoveAccount { identifier, yes } => {
            commands::remove(&engine, ui, &identifier, yes)
        }
        Commands::List => commands::list(&engine, ui),
        Commands::Status => commands::status(&engine, ui),
        Commands::Switch { wait } => commands::switch(&engine, ui, wait),
        Commands::SwitchTo { identifier, wait } => {
            commands::switch_to(&engine, ui, &identifier, wait)
        }
        Commands::EmitEnvironmentCommands => commands::env(&engine, ui),
        Commands::Doctor => commands::doctor(&paths, &store, secrets.as_ref(), ui),
        Commands::Completions { .. } => Ok(()),
    }
}
