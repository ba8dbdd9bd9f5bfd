//! Command line configuration

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use bddviz_dump::dddmp::DDDMPVersion;
use bddviz_dump::Dialect;

// spell-checker:ignore dddmp

/// Top-level command line of the `bddviz` binary
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// What to do
    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the diagram API
    Serve(ServeArgs),
    /// Convert a BuDDy dump to DDDMP
    Convert(ConvertArgs),
}

/// Options of `bddviz serve`
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Host name or address to listen on
    #[arg(long, default_value = "localhost")]
    pub host: String,

    /// Port to listen on
    #[arg(long, short = 'p', default_value_t = 8080)]
    pub port: u16,

    /// Path of the diagram index
    ///
    /// The diagram and state files are stored in the same directory.
    #[arg(long, default_value = "data/diagrams.json")]
    pub data: PathBuf,

    /// BuDDy dialect for uploads that do not specify one (`direct` or
    /// `inverted`)
    #[arg(long, default_value_t = Dialect::Direct)]
    pub dialect: Dialect,
}

/// Options of `bddviz convert`
#[derive(Args, Debug)]
pub struct ConvertArgs {
    /// BuDDy dump to convert
    pub input: PathBuf,

    /// File with variable names separated by whitespace
    #[arg(long)]
    pub vars: Option<PathBuf>,

    /// BuDDy dialect of the input (`direct` or `inverted`)
    #[arg(long, default_value_t = Dialect::Direct)]
    pub dialect: Dialect,

    /// Write the DDDMP file here instead of stdout
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,

    /// DDDMP version to write
    #[arg(value_enum, long, default_value_t = DddmpVersion::V2_0)]
    pub dddmp_version: DddmpVersion,

    /// Decision diagram name (`.dd` field)
    #[arg(long, default_value = "")]
    pub dd_name: String,
}

/// DDDMP version as given on the command line
#[derive(Copy, Clone, PartialEq, Eq, Debug, ValueEnum)]
pub enum DddmpVersion {
    /// Version 2.0 as bundled with CUDD 3.0
    #[value(name = "2.0")]
    V2_0,
    /// Version 3.0, adds `.varnames`
    #[value(name = "3.0")]
    V3_0,
}

impl From<DddmpVersion> for DDDMPVersion {
    fn from(version: DddmpVersion) -> Self {
        match version {
            DddmpVersion::V2_0 => DDDMPVersion::V2_0,
            DddmpVersion::V3_0 => DDDMPVersion::V3_0,
        }
    }
}
