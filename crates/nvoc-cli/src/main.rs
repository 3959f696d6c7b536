//! NVOC runtime inspection tool
//!
//! Lists the registered class hierarchy, prints cast graphs and export
//! tables, shows how HAL slots bind for a given halspec, calls device
//! controls through the export dispatcher, and validates the static metadata
//! of every class.

mod commands;
mod logger;
mod output;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "nvoc")]
#[command(about = "Inspect the NVOC object runtime", long_about = None)]
#[command(version)]
struct Cli {
    /// Runtime configuration file (nvoc.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// When to color output
    #[arg(long, global = true, value_enum, default_value_t = ColorMode::Auto)]
    color: ColorMode,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ColorMode {
    Auto,
    Always,
    Never,
}

impl ColorMode {
    fn as_str(self) -> &'static str {
        match self {
            ColorMode::Auto => "auto",
            ColorMode::Always => "always",
            ColorMode::Never => "never",
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// List registered classes
    Classes {
        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Print the cast graph of a class
    CastGraph {
        /// Class name or id (e.g. "Device" or "0xe0ac20")
        class: String,
    },

    /// Show HAL bindings and properties for a halspec
    Hal {
        /// Chip (overrides the configuration), e.g. "GH100"
        #[arg(long)]
        chip: Option<String>,
        /// Runtime variant (overrides the configuration): "pf-kernel-only" or "vf"
        #[arg(long)]
        variant: Option<String>,
        /// Display IP version (overrides the configuration), e.g. "v04_04"
        #[arg(long)]
        disp: Option<String>,
    },

    /// Print the merged export table of a class
    Exports {
        /// Class name or id
        class: String,
        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Call Device controls under the configured rights and disabled mask
    Dispatch {
        /// Method id to call (e.g. "0x800280"); every export when omitted
        #[arg(long, value_parser = commands::dispatch::parse_method_id)]
        method: Option<u32>,
        /// Parameter buffer size; the declared size when omitted
        #[arg(long)]
        size: Option<usize>,
    },

    /// Validate every registered class
    Check,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let choice = output::resolve_color_choice(Some(cli.color.as_str()));
    logger::init(cli.verbose, choice);

    let config = commands::load_config(cli.config.as_deref())?;
    let mut ctx = commands::Context::new(config, choice);

    match cli.command {
        Commands::Classes { json } => commands::classes::execute(&mut ctx, json),
        Commands::CastGraph { class } => commands::cast_graph::execute(&mut ctx, &class),
        Commands::Hal {
            chip,
            variant,
            disp,
        } => commands::hal::execute(
            &mut ctx,
            commands::hal::HalOptions {
                chip,
                variant,
                disp,
            },
        ),
        Commands::Exports { class, json } => commands::exports::execute(&mut ctx, &class, json),
        Commands::Dispatch { method, size } => commands::dispatch::execute(
            &mut ctx,
            commands::dispatch::DispatchOptions { method, size },
        ),
        Commands::Check => commands::check::execute(&mut ctx),
    }
}
