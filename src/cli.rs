use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "field-weaver")]
#[command(about = "Redirect field access on model classes through generated accessors")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// -v for debug, -vv for trace. RUST_LOG wins when set.
    #[arg(short = 'v', long, action = ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    /// Run the pass over every class of INPUT and write the result.
    Weave {
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        #[arg(short = 'o', long, value_name = "PATH")]
        out: PathBuf,

        /// Extra class sources used only to resolve symbols.
        #[arg(long, value_name = "PATH")]
        classpath: Vec<PathBuf>,

        /// JSON list of {"owner", "name"} fields; enables scoped mode.
        #[arg(long, value_name = "FILE")]
        managed: Option<PathBuf>,

        #[arg(short = 'f', long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,
    },
    /// Report model status and persisted fields per class.
    Classify {
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        #[arg(long, value_name = "PATH")]
        classpath: Vec<PathBuf>,
    },
    /// Print one class as Java-like text.
    Show {
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        #[arg(value_name = "CLASS")]
        class_name: String,

        #[arg(long, value_name = "PATH")]
        classpath: Vec<PathBuf>,

        /// Run the pass over INPUT first.
        #[arg(long)]
        woven: bool,
    },
    /// Lower Java sources to compiled class files.
    Compile {
        #[arg(value_name = "SRC_DIR")]
        src: PathBuf,

        #[arg(short = 'o', long, value_name = "PATH")]
        out: PathBuf,
    },
}

#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum OutputFormat {
    Json,
    Text,
}
