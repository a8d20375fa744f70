//! Command implementations for the modbind CLI.
//!
//! `load` runs every request in order against one fresh [`BinderHost`],
//! prints the resulting trace and reports failure if any request failed.
//! Individual load errors are printed as they happen and do not stop the
//! remaining requests.

use crate::cli::{BuildOptions, LoadOptions, RequestSpec};
use modbind_binder::{BindError, BinderConfig, BinderHost, LoadContext, TraceEvent};
use modbind_image::{
    Identity, IdentityError, ImageError, ModuleImage, ModuleImageBuilder, PublicKeyToken, Version,
};
use std::fmt::Write as _;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Result type for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Pipeline error type
#[derive(Debug)]
pub enum PipelineError {
    /// File I/O error
    IoError(std::io::Error),
    /// Image could not be encoded or decoded
    ImageError(ImageError),
    /// Bad version, token or display name argument
    IdentityError(IdentityError),
    /// Some load requests failed; each was already reported
    LoadFailed { failed: usize, total: usize },
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineError::IoError(e) => write!(f, "I/O error: {}", e),
            PipelineError::ImageError(e) => write!(f, "image error: {}", e),
            PipelineError::IdentityError(e) => write!(f, "invalid identity: {}", e),
            PipelineError::LoadFailed { failed, total } => {
                write!(f, "{} of {} load requests failed", failed, total)
            }
        }
    }
}

impl std::error::Error for PipelineError {}

impl From<std::io::Error> for PipelineError {
    fn from(error: std::io::Error) -> Self {
        PipelineError::IoError(error)
    }
}

impl From<ImageError> for PipelineError {
    fn from(error: ImageError) -> Self {
        PipelineError::ImageError(error)
    }
}

impl From<IdentityError> for PipelineError {
    fn from(error: IdentityError) -> Self {
        PipelineError::IdentityError(error)
    }
}

// =============================================================================
// build
// =============================================================================

pub fn build_image(options: &BuildOptions) -> PipelineResult<()> {
    let image = image_from_options(options)?;
    image.write_to(&options.out)?;
    println!("wrote {} to {}", image.identity, options.out.display());
    Ok(())
}

fn image_from_options(options: &BuildOptions) -> PipelineResult<ModuleImage> {
    let version: Version = options.version.parse()?;
    let mut builder =
        ModuleImageBuilder::new(Identity::new(options.name.trim()).with_version(version));

    if let Some(culture) = &options.culture {
        builder = builder.culture(culture.as_str());
    }
    if let Some(token) = &options.token {
        builder = builder.public_key_token(token.parse::<PublicKeyToken>()?);
    }
    for (kind, name) in &options.exports {
        builder = builder.export(*kind, name.as_str());
    }
    for reference in &options.references {
        builder = builder.reference(Identity::parse(reference)?);
    }
    if let Some(payload) = &options.payload {
        builder = builder.payload(fs::read(payload)?);
    }

    Ok(builder.build())
}

// =============================================================================
// inspect
// =============================================================================

pub fn inspect_image(path: &Path) -> PipelineResult<()> {
    let image = ModuleImage::read_from(path)?;
    print!("{}", describe_image(&image));
    Ok(())
}

fn describe_image(image: &ModuleImage) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "identity:   {}", image.identity);
    let _ = writeln!(out, "payload:    {} bytes", image.payload.len());

    let _ = writeln!(out, "exports:    {}", image.exports.count());
    for entry in image.exports.entries.values() {
        let _ = writeln!(out, "  {:#06x}  {:<8}  {}", entry.token, entry.kind.as_str(), entry.name);
    }

    let _ = writeln!(out, "references: {}", image.references.len());
    for reference in &image.references {
        let _ = writeln!(out, "  {}", reference);
    }
    out
}

// =============================================================================
// load
// =============================================================================

pub fn run_loads(options: &LoadOptions) -> PipelineResult<()> {
    let host = BinderHost::new(config_from_options(options)?);
    let context = match &options.context {
        Some(name) => host.create_context(name.as_str()),
        None => Arc::clone(host.default_context()),
    };

    let failed = execute_requests(&context, &options.requests);
    for event in context.trace().iter() {
        println!("{}", format_event(event));
    }

    if failed > 0 {
        return Err(PipelineError::LoadFailed {
            failed,
            total: options.requests.len(),
        });
    }
    Ok(())
}

fn config_from_options(options: &LoadOptions) -> PipelineResult<BinderConfig> {
    let absolute = |paths: &[PathBuf]| -> std::io::Result<Vec<PathBuf>> {
        paths.iter().map(std::path::absolute).collect()
    };

    Ok(BinderConfig::from_env()
        .with_trusted_modules(absolute(&options.trusted)?)
        .with_memory_mapping(options.mmap)
        .with_verbose_logging(options.verbose)
        .with_probing_paths(absolute(&options.probing_paths)?))
}

/// Run each request in order; returns the number that failed.
fn execute_requests(context: &LoadContext, requests: &[RequestSpec]) -> usize {
    let mut failed = 0;
    for request in requests {
        if let Err(error) = execute_request(context, request) {
            eprintln!("error: {}", error);
            failed += 1;
        }
    }
    failed
}

fn execute_request(context: &LoadContext, request: &RequestSpec) -> Result<(), String> {
    let loaded = match request {
        RequestSpec::Path(path) => {
            let path = std::path::absolute(path).map_err(|e| e.to_string())?;
            context.load_from_path(path)
        }
        RequestSpec::Name(identity) => context.load_from_name(identity),
        RequestSpec::Bytes(path) => {
            let bytes = fs::read(path).map_err(|e| format!("{}: {}", path.display(), e))?;
            context.load_from_bytes(bytes)
        }
        RequestSpec::Stream(path) => {
            let file = File::open(path).map_err(|e| format!("{}: {}", path.display(), e))?;
            context.load_from_stream(file, path.display().to_string())
        }
    };
    loaded.map(|_| ()).map_err(|e: BindError| e.to_string())
}

fn format_event(event: &TraceEvent) -> String {
    let outcome = match (&event.result, event.error) {
        (Some(record), _) => format!("{} ({})", record.identity(), record.origin().describe()),
        (None, Some(kind)) => kind.to_string(),
        (None, None) => "-".to_string(),
    };
    format!(
        "{:>3}  {:<14} {:<48} {}",
        event.sequence,
        event.stage.as_str(),
        event.requested.to_string(),
        outcome
    )
}
