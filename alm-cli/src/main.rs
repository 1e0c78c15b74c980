use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use alm_core::library::default_lib_dir;
use alm_core::{Compilation, CompileOptions, TreeDump, compile_file};
use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use tracing_subscriber::EnvFilter;

/// Check an ALM program and everything it imports.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Entry `.alm` file
    input: PathBuf,

    #[arg(
        long,
        value_name = "PATH",
        help = "Directory searched for `import name;` modules (defaults to the bundled lib)"
    )]
    lib_dir: Option<PathBuf>,

    #[arg(long, help = "Print the annotated tree when the program checks cleanly")]
    dump_tree: bool,

    #[arg(
        short,
        long,
        value_name = "PATH",
        help = "Write the tree dump to a file instead of stdout"
    )]
    output: Option<PathBuf>,

    #[arg(short, long, action = ArgAction::Count, help = "Raise log verbosity (-v, -vv, -vvv)")]
    verbose: u8,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    execute(cli)
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

fn execute(cli: Cli) -> Result<()> {
    let lib_dir = cli.lib_dir.clone().unwrap_or_else(default_lib_dir);
    let options = CompileOptions::with_lib_dir(lib_dir);

    let compilation = compile_file(&cli.input, &options)
        .with_context(|| format!("failed to compile {}", cli.input.display()))?;
    report(&compilation)?;

    if cli.dump_tree {
        let tree = compilation.emit(&mut TreeDump::default())?;
        match &cli.output {
            Some(path) => write_output(path, tree.as_bytes())?,
            None => print!("{tree}"),
        }
    } else {
        println!("{}: no errors", cli.input.display());
    }
    Ok(())
}

/// Print every diagnostic to stderr and fail if there was any.
fn report(compilation: &Compilation) -> Result<()> {
    let rendered = compilation.rendered_diagnostics();
    if rendered.is_empty() {
        return Ok(());
    }
    for line in &rendered {
        eprintln!("{line}");
    }
    anyhow::bail!("compilation failed with {} error(s)", rendered.len())
}

fn write_output(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory {parent:?}"))?;
        }
    }
    fs::write(path, bytes).with_context(|| format!("failed to write output file {}", path.display()))?;
    Ok(())
}
