//!
//! # Fill21 Command-Line Implementation
//!
//! The core logic of the `fill21` binary: `density`, `erase` and `fill` sub-commands.
//!

// Std-Lib
use std::io::Write;
use std::path::{Path, PathBuf};

// Crates.io
use clap::{ArgAction, Parser, Subcommand};
use tracing::{debug, info};

// Workspace Imports
use fill21raw::Layout;
use fill21utils::SerializationFormat;

// Local imports
use crate::engine::Engine;
use crate::error::{FillError, FillResult};
use crate::rules::RuleSet;

/// Rule file loaded when none is specified, if present in the working directory
pub const DEFAULT_CONFIG: &str = "fill21.yaml";

// => The doc-comment on `ProgramOptions` here is displayed by the `clap`-generated help docs =>

/// # Fill21
/// Layout density analysis, and dummy-fill insertion and removal, for GDSII files.
#[derive(Debug, Clone, Parser)]
#[command(name = "fill21", version)]
pub struct ProgramOptions {
    /// Fill-rule file: YAML, JSON or TOML. Defaults to `fill21.yaml`, if present.
    #[arg(short = 'c', long = "config-file", global = true)]
    pub config: Option<PathBuf>,
    /// Directory for artifacts retained by `--keep-data`
    #[arg(long, global = true, default_value = "fill21-tmp")]
    pub work_dir: PathBuf,
    /// Verbose output. Repeat for more.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,
    #[command(subcommand)]
    pub command: Command,
}

/// # Sub-Commands
#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Print the density of each configured layer, or of every layer if none are configured
    Density {
        /// GDSII layout file
        file: PathBuf,
        /// Also print each window's density
        #[arg(long)]
        windows: bool,
    },
    /// Remove all fill, writing the layout back in place
    Erase {
        /// GDSII layout file
        file: PathBuf,
        /// Retain a copy of the output in the working directory
        #[arg(long)]
        keep_data: bool,
    },
    /// Insert fill on each configured layer, writing the layout back in place
    Fill {
        /// GDSII layout file
        file: PathBuf,
        /// Retain density reports and the output layout in the working directory
        #[arg(long)]
        keep_data: bool,
        /// Compute and report fill, without modifying the layout file
        #[arg(long)]
        dry_run: bool,
        /// Region to fill, in the rule file's length units
        #[arg(
            long,
            num_args = 4,
            value_names = ["LLX", "LLY", "URX", "URY"],
            allow_negative_numbers = true
        )]
        core_size: Option<Vec<f64>>,
    },
}

/// Main entry point, writing reports to stdout
pub fn _main(options: &ProgramOptions) -> FillResult<()> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    run(options, &mut out)
}

/// Run the sub-command of `options`, writing reports to `out`
pub fn run(options: &ProgramOptions, out: &mut impl Write) -> FillResult<()> {
    let mut rules = load_rules(options.config.as_deref())?;
    match &options.command {
        Command::Density { file, windows } => density(&Engine::new(rules)?, file, *windows, out),
        Command::Erase { file, keep_data } => {
            let engine = Engine::new(rules)?;
            let work = WorkDir::new(*keep_data, &options.work_dir)?;
            erase(&engine, file, &work, out)
        }
        Command::Fill {
            file,
            keep_data,
            dry_run,
            core_size,
        } => {
            if let Some(core) = core_size {
                let core: [f64; 4] = core.as_slice().try_into().map_err(|_| {
                    FillError::Config(format!("--core-size takes 4 values, got {}", core.len()))
                })?;
                rules.core = Some(core);
            }
            let engine = Engine::new(rules)?;
            let work = WorkDir::new(*keep_data, &options.work_dir)?;
            fill(&engine, file, &work, *dry_run, out)
        }
    }
}

/// Load the rule file at `path`, or the default, or else an empty [RuleSet]
pub fn load_rules(path: Option<&Path>) -> FillResult<RuleSet> {
    if let Some(path) = path {
        return RuleSet::open(path);
    }
    let default = Path::new(DEFAULT_CONFIG);
    if default.exists() {
        return RuleSet::open(default);
    }
    debug!("No rule file, running without rules");
    Ok(RuleSet::default())
}

/// # Working Directory
/// Holds intermediate artifacts. Removed on drop, unless kept.
#[derive(Debug)]
pub enum WorkDir {
    Kept(PathBuf),
    Transient(tempfile::TempDir),
}
impl WorkDir {
    /// Create `kept` if `keep`, or else a fresh temporary directory
    pub fn new(keep: bool, kept: &Path) -> FillResult<Self> {
        if keep {
            std::fs::create_dir_all(kept)?;
            info!(dir = %kept.display(), "Keeping intermediate data");
            return Ok(Self::Kept(kept.to_path_buf()));
        }
        let dir = tempfile::Builder::new().prefix("fill21-").tempdir()?;
        Ok(Self::Transient(dir))
    }
    pub fn path(&self) -> &Path {
        match self {
            Self::Kept(p) => p,
            Self::Transient(d) => d.path(),
        }
    }
    /// Path of artifact `name`
    pub fn join(&self, name: impl AsRef<Path>) -> PathBuf {
        self.path().join(name)
    }
}

/// Encode `layout` and write it to `dest`, via a temporary file in the same directory.
/// `dest` is either fully written or untouched.
pub fn write_atomic(layout: &Layout, dest: &Path) -> FillResult<()> {
    let bytes = layout.encode()?;
    let dir = match dest.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(&bytes)?;
    tmp.flush()?;
    tmp.persist(dest).map_err(|e| e.error)?;
    Ok(())
}

/// File name of `path`, for working copies
fn file_name(path: &Path) -> PathBuf {
    path.file_name()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("layout.gds"))
}

/// Print densities, as percentages
fn density(engine: &Engine, file: &Path, windows: bool, out: &mut impl Write) -> FillResult<()> {
    let layout = engine.open(file)?;
    let report = engine.compute_density(&layout)?;
    for layer in report.layers.iter() {
        writeln!(out, "{}: {:.2} %", layer.name, 100.0 * layer.density)?;
        if windows {
            for w in layer.windows.iter() {
                writeln!(
                    out,
                    "  ({}, {}) - ({}, {}): {:.2} %",
                    w.window.p0.x,
                    w.window.p0.y,
                    w.window.p1.x,
                    w.window.p1.y,
                    100.0 * w.density
                )?;
            }
        }
    }
    Ok(())
}

/// Remove fill from `file`, in place
fn erase(engine: &Engine, file: &Path, work: &WorkDir, out: &mut impl Write) -> FillResult<()> {
    let mut layout = engine.open(file)?;
    let removed = engine.erase(&mut layout);
    if let WorkDir::Kept(_) = work {
        layout.save(work.join(file_name(file)))?;
    }
    write_atomic(&layout, file)?;
    writeln!(out, "Removed {} fill shapes", removed)?;
    Ok(())
}

/// Fill `file`, in place unless `dry_run`
fn fill(
    engine: &Engine,
    file: &Path,
    work: &WorkDir,
    dry_run: bool,
    out: &mut impl Write,
) -> FillResult<()> {
    let mut layout = engine.open(file)?;
    let outcome = if dry_run {
        engine.plan(&layout)?
    } else {
        engine.fill(&mut layout)?
    };
    let warnings = outcome.warnings();
    let yaml = SerializationFormat::Yaml;
    yaml.save(&outcome.before(), work.join("density-before.yaml"))?;
    yaml.save(&outcome.after(), work.join("density-after.yaml"))?;
    yaml.save(&warnings, work.join("warnings.yaml"))?;
    if !dry_run {
        layout.save(work.join(file_name(file)))?;
        write_atomic(&layout, file)?;
    }

    for layer in outcome.layers.iter() {
        writeln!(
            out,
            "{}: {:.2} % -> {:.2} % ({} fill cells)",
            layer.rule,
            100.0 * layer.before.density,
            100.0 * layer.after.density,
            layer.rects.len()
        )?;
    }
    if !warnings.is_empty() {
        writeln!(
            out,
            "{} window(s) could not reach minimum density:",
            warnings.len()
        )?;
        for w in warnings.iter() {
            writeln!(out, "  {}", w)?;
        }
    }
    if dry_run {
        writeln!(out, "Dry run: {} unchanged", file.display())?;
    }
    Ok(())
}
