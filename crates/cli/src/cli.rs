//! Command-line interface for modbind.

use clap::{Parser, Subcommand};
use modbind_image::{ExportKind, Identity};
use std::path::PathBuf;

/// modbind - build, inspect and load versioned module images
#[derive(Parser)]
#[command(name = "modbind")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a module image
    Build {
        /// Output file
        out: PathBuf,

        /// Simple module name
        #[arg(long)]
        name: String,

        /// Module version, e.g. 2.5 or 2.5.0.0
        #[arg(long = "version", value_name = "VERSION")]
        module_version: String,

        /// Culture of a satellite module
        #[arg(long)]
        culture: Option<String>,

        /// Public key token, 16 hex digits
        #[arg(long)]
        token: Option<String>,

        /// Exported symbol as KIND:NAME (kind is type, function or global)
        #[arg(long = "export", value_name = "KIND:NAME", value_parser = parse_export)]
        exports: Vec<(ExportKind, String)>,

        /// Display name of a referenced module
        #[arg(long = "reference", value_name = "DISPLAY_NAME")]
        references: Vec<String>,

        /// File whose contents become the image payload
        #[arg(long)]
        payload: Option<PathBuf>,
    },

    /// Print the identity, exports and references of an image
    Inspect {
        /// Path to the image
        file: PathBuf,
    },

    /// Run load requests against a fresh binder and print the trace
    Load {
        /// Trusted module file (repeatable)
        #[arg(long)]
        trusted: Vec<PathBuf>,

        /// Probing directory (repeatable)
        #[arg(long = "probe", value_name = "DIR")]
        probing_paths: Vec<PathBuf>,

        /// Load into a new custom context with this name instead of the default context
        #[arg(long)]
        context: Option<String>,

        /// Echo trace events as they are recorded
        #[arg(short, long)]
        verbose: bool,

        /// Read files through a memory map
        #[arg(long)]
        mmap: bool,

        /// Requests: path:<file>, bytes:<file>, stream:<file> or name:<display name>
        #[arg(required = true, value_parser = parse_request)]
        requests: Vec<RequestSpec>,
    },
}

/// One load request from the command line.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestSpec {
    Path(PathBuf),
    Bytes(PathBuf),
    Stream(PathBuf),
    Name(Identity),
}

pub fn parse_request(s: &str) -> Result<RequestSpec, String> {
    let (kind, value) = s
        .split_once(':')
        .ok_or_else(|| format!("expected KIND:VALUE, got '{}'", s))?;
    if value.trim().is_empty() {
        return Err(format!("missing value in '{}'", s));
    }

    match kind.to_ascii_lowercase().as_str() {
        "path" => Ok(RequestSpec::Path(PathBuf::from(value))),
        "bytes" => Ok(RequestSpec::Bytes(PathBuf::from(value))),
        "stream" => Ok(RequestSpec::Stream(PathBuf::from(value))),
        "name" => Identity::parse(value)
            .map(RequestSpec::Name)
            .map_err(|e| e.to_string()),
        other => Err(format!(
            "unknown request kind '{}' (expected path, bytes, stream or name)",
            other
        )),
    }
}

pub fn parse_export(s: &str) -> Result<(ExportKind, String), String> {
    let (kind, name) = s
        .split_once(':')
        .ok_or_else(|| format!("expected KIND:NAME, got '{}'", s))?;
    let kind =
        ExportKind::from_name(kind).ok_or_else(|| format!("unknown export kind '{}'", kind))?;
    if name.trim().is_empty() {
        return Err(format!("missing export name in '{}'", s));
    }
    Ok((kind, name.trim().to_string()))
}

impl Cli {
    /// Resolve the actual command to run
    pub fn resolve_command(&self) -> ResolvedCommand {
        match &self.command {
            Commands::Build {
                out,
                name,
                module_version,
                culture,
                token,
                exports,
                references,
                payload,
            } => ResolvedCommand::Build(BuildOptions {
                out: out.clone(),
                name: name.clone(),
                version: module_version.clone(),
                culture: culture.clone(),
                token: token.clone(),
                exports: exports.clone(),
                references: references.clone(),
                payload: payload.clone(),
            }),
            Commands::Inspect { file } => ResolvedCommand::Inspect { file: file.clone() },
            Commands::Load {
                trusted,
                probing_paths,
                context,
                verbose,
                mmap,
                requests,
            } => ResolvedCommand::Load(LoadOptions {
                trusted: trusted.clone(),
                probing_paths: probing_paths.clone(),
                context: context.clone(),
                verbose: *verbose,
                mmap: *mmap,
                requests: requests.clone(),
            }),
        }
    }
}

/// Resolved command after processing CLI arguments
pub enum ResolvedCommand {
    Build(BuildOptions),
    Inspect { file: PathBuf },
    Load(LoadOptions),
}

#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub out: PathBuf,
    pub name: String,
    pub version: String,
    pub culture: Option<String>,
    pub token: Option<String>,
    pub exports: Vec<(ExportKind, String)>,
    pub references: Vec<String>,
    pub payload: Option<PathBuf>,
}

#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub trusted: Vec<PathBuf>,
    pub probing_paths: Vec<PathBuf>,
    pub context: Option<String>,
    pub verbose: bool,
    pub mmap: bool,
    pub requests: Vec<RequestSpec>,
}
