use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::{commands, config::PilotConfig, error::CliError};
use commands::*;

#[derive(Debug, Parser)]
#[command(name = "promptpilot")]
#[command(about = "Turn a prompt into a runnable agent")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(author = env!("CARGO_PKG_AUTHORS"))]
#[command(long_about = None)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(long, global = true)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Subcommands
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Route, clarify and generate an agent interactively
    Generate(GenerateArgs),

    /// Ask whether a prompt needs the reasoning flow
    Route {
        /// Prompt to classify
        prompt: String,
    },

    /// Print the optimized form of a prompt
    Optimize {
        /// Prompt to optimize
        prompt: String,
    },

    /// Saved agents
    Agents {
        #[command(subcommand)]
        action: AgentCommands,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },

    /// Show version information
    Version,
}

#[derive(Debug, clap::Args)]
pub struct GenerateArgs {
    /// What the agent should do
    pub prompt: String,

    /// Skip classification and force the reasoning flow on or off
    #[arg(long)]
    pub reasoning: Option<bool>,

    /// Ask the server which parameters the agent needs before generating
    #[arg(long)]
    pub identify_parameters: bool,

    /// Write the generated code to this file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// What to do with the code once it is ready
    #[arg(long, value_enum)]
    pub then: Option<FollowUp>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum FollowUp {
    Execute,
    Test,
    Schedule,
}

#[derive(Debug, Subcommand)]
pub enum AgentCommands {
    /// List saved agents
    List,

    /// Delete an agent
    Delete {
        /// Agent id
        id: String,
    },

    /// Build and run an agent from a prompt in one server call
    Run {
        prompt: String,
    },

    /// Save code as a named agent
    Save {
        /// Agent name
        #[arg(short, long)]
        name: String,

        /// File holding the agent code
        #[arg(short, long)]
        file: PathBuf,

        /// Prompt the code was generated from
        #[arg(long)]
        prompt_id: String,

        #[arg(short, long)]
        description: Option<String>,
    },
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,

    /// Print the configuration file location
    Path,

    /// Write the default configuration file if none exists
    Init,
}

impl Cli {
    pub async fn run(&self) -> Result<(), CliError> {
        match &self.command {
            Some(Commands::Generate(args)) => run_generate(&self.load_config()?, args).await,
            Some(Commands::Route { prompt }) => route_prompt(&self.load_config()?, prompt).await,
            Some(Commands::Optimize { prompt }) => optimize_prompt(&self.load_config()?, prompt).await,
            Some(Commands::Agents { action }) => handle_agents_command(&self.load_config()?, action).await,
            Some(Commands::Config { action }) => handle_config_command(self.config.as_deref(), action).await,
            Some(Commands::Version) => self.handle_version().await,
            None => {
                println!("promptpilot - turn a prompt into a runnable agent");
                println!("Run 'promptpilot --help' for usage information.");
                Ok(())
            }
        }
    }

    fn load_config(&self) -> Result<PilotConfig, CliError> {
        let (config, path) = PilotConfig::load(self.config.as_deref())?;
        tracing::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    async fn handle_version(&self) -> Result<(), CliError> {
        println!("promptpilot version: {}", env!("CARGO_PKG_VERSION"));
        println!("Author: {}", env!("CARGO_PKG_AUTHORS"));
        println!("Description: {}", env!("CARGO_PKG_DESCRIPTION"));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_flags() {
        let cli = Cli::try_parse_from([
            "promptpilot",
            "generate",
            "Email me the weather",
            "--reasoning",
            "false",
            "--then",
            "execute",
            "-o",
            "agent.py",
        ])
        .unwrap();

        match cli.command {
            Some(Commands::Generate(args)) => {
                assert_eq!(args.prompt, "Email me the weather");
                assert_eq!(args.reasoning, Some(false));
                assert_eq!(args.then, Some(FollowUp::Execute));
                assert_eq!(args.output, Some(PathBuf::from("agent.py")));
                assert!(!args.identify_parameters);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_global_config_flag_after_subcommand() {
        let cli = Cli::try_parse_from(["promptpilot", "agents", "list", "--config", "/tmp/p.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/p.toml")));
        assert!(matches!(
            cli.command,
            Some(Commands::Agents {
                action: AgentCommands::List
            })
        ));
    }

    #[test]
    fn test_save_requires_name_and_file() {
        assert!(Cli::try_parse_from(["promptpilot", "agents", "save", "--prompt-id", "p1"]).is_err());
    }
}
