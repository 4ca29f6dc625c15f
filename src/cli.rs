use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "entity-finder")]
#[command(about = "List classes carrying persistence annotations on a classpath")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Build directory that relative output files are placed under
    #[arg(long, value_name = "DIR", global = true)]
    pub build_dir: Option<PathBuf>,

    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    /// Scan the classpath and write annotated class names as properties
    List {
        #[command(flatten)]
        scan: ScanArgs,

        /// Annotation to track (repeatable); defaults to the JPA annotations
        #[arg(long = "annotation", value_name = "TYPE")]
        annotations: Vec<String>,

        /// Property name for classes no package mapping applies to
        #[arg(long, value_name = "NAME")]
        default_property: Option<String>,

        /// Maps a package prefix to a property name
        #[arg(long = "property", value_name = "PACKAGE=NAME", value_parser = parse_property)]
        properties: Vec<(String, String)>,

        #[arg(long, value_name = "TEXT", default_value = "", allow_hyphen_values = true)]
        first_item_prefix: String,

        #[arg(long, value_name = "TEXT", default_value = "", allow_hyphen_values = true)]
        prefix: String,

        #[arg(long, value_name = "TEXT", default_value = "", allow_hyphen_values = true)]
        suffix: String,

        #[arg(long, value_name = "TEXT", default_value = "", allow_hyphen_values = true)]
        last_item_suffix: String,

        /// Keep surrounding quotes on decoration values
        #[arg(long)]
        keep_quotes: bool,

        #[arg(short = 'f', long, value_enum, default_value_t = OutputFormat::Properties)]
        format: OutputFormat,

        #[arg(short = 'o', long, value_name = "FILE", conflicts_with = "stdout")]
        output: Option<PathBuf>,

        /// Print instead of writing the output file
        #[arg(long)]
        stdout: bool,
    },
    /// Scan the classpath and print the index
    Dump {
        #[command(flatten)]
        scan: ScanArgs,

        /// Also print the super type index
        #[arg(long)]
        types: bool,

        /// `json` prints options, scan summary and every index
        #[arg(short = 'f', long, value_enum, default_value_t = DumpFormat::Text)]
        format: DumpFormat,
    },
}

#[derive(Debug, Clone, Args)]
pub struct ScanArgs {
    /// Directories, archives or file: URLs to scan
    #[arg(value_name = "CLASSPATH", required = true)]
    pub classpath: Vec<String>,

    /// Only scan classpath entries matching this pattern (repeatable)
    #[arg(long = "include", value_name = "REGEX")]
    pub includes: Vec<String>,

    /// Skip classpath entries matching this pattern (repeatable)
    #[arg(long = "exclude", value_name = "REGEX")]
    pub excludes: Vec<String>,

    /// Package prefix to leave out (repeatable); replaces the defaults
    #[arg(long = "ignore", value_name = "PACKAGE")]
    pub ignored_packages: Vec<String>,

    /// Do not ignore any package
    #[arg(long, conflicts_with = "ignored_packages")]
    pub no_default_ignores: bool,

    #[arg(long)]
    pub scan_methods: bool,

    #[arg(long)]
    pub scan_fields: bool,

    #[arg(long)]
    pub scan_parameters: bool,

    /// Skip class level annotations
    #[arg(long)]
    pub skip_classes: bool,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Properties,
    Json,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum DumpFormat {
    Text,
    Json,
}

fn parse_property(raw: &str) -> Result<(String, String), String> {
    let (package, name) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected PACKAGE=NAME, got {raw:?}"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("property name missing in {raw:?}"));
    }
    Ok((package.trim().to_string(), name.to_string()))
}
