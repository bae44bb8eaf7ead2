use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

use ndbind::prelude::*;
use ndbind::{Capability, LibraryKind};

#[derive(Parser)]
#[command(
    name = "ndbind",
    about = "Inspect and exercise a native tensor engine",
    long_about = "Loads a native tensor engine through ndbind and reports what it offers.\n\nThe in-process reference engine is used unless a dylib engine is configured.",
    version
)]
struct Cli {
    /// JSON engine configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Engine implementation: reference or dylib
    #[arg(long, global = true)]
    library: Option<LibraryKind>,
    /// Path of the native library for the dylib engine
    #[arg(long, global = true)]
    library_path: Option<PathBuf>,
    /// Print machine-readable JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Show engine name, version, devices and capabilities
    Info,
    /// List registered operators
    Ops {
        /// Only operators starting with this prefix
        #[arg(long)]
        filter: Option<String>,
    },
    /// Run a create / arithmetic / backward / dump round
    Smoke,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = load_engine(&cli).and_then(|engine| match &cli.command {
        Commands::Info => cmd_info(&engine, cli.json),
        Commands::Ops { filter } => cmd_ops(&engine, filter.as_deref(), cli.json),
        Commands::Smoke => cmd_smoke(&engine),
    });
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn load_engine(cli: &Cli) -> Result<Engine> {
    let mut config = match &cli.config {
        Some(path) => EngineConfig::from_json_file(path)?,
        None => EngineConfig::default(),
    }
    .with_env_overrides()?;
    if let Some(kind) = cli.library {
        config.library = kind;
    }
    if let Some(path) = &cli.library_path {
        config.library_path = Some(path.clone());
    }
    debug!(?config, "loading engine");
    Engine::new(config)
}

fn cmd_info(engine: &Engine, json: bool) -> Result<()> {
    let version = engine.version()?;
    let gpus = engine.gpu_count()?;
    let caps: Vec<&str> = [(Capability::Cuda, "cuda"), (Capability::Mkl, "mkl")]
        .into_iter()
        .filter(|(c, _)| engine.has_capability(*c))
        .map(|(_, name)| name)
        .collect();

    if json {
        let info = serde_json::json!({
            "engine": engine.name(),
            "version": version,
            "gpus": gpus,
            "capabilities": caps,
            "operators": engine.function_table().len(),
            "default_device": engine.default_device().to_string(),
        });
        println!("{info:#}");
        return Ok(());
    }

    println!("Engine");
    println!("  Name:    {}", engine.name());
    println!("  Version: {version}");
    println!("  Library: {}", engine.config().library);
    println!("\nDevices");
    println!("  Default: {}", engine.default_device());
    println!("  GPUs:    {gpus}");
    println!("\nCapabilities");
    println!("  CUDA: {}", if caps.contains(&"cuda") { "[x]" } else { "[ ]" });
    println!("  MKL:  {}", if caps.contains(&"mkl") { "[x]" } else { "[ ]" });
    println!("\nOperators: {}", engine.function_table().len());
    Ok(())
}

fn cmd_ops(engine: &Engine, filter: Option<&str>, json: bool) -> Result<()> {
    let names: Vec<&str> = engine
        .function_table()
        .names()
        .into_iter()
        .filter(|n| filter.map_or(true, |p| n.starts_with(p)))
        .collect();
    if json {
        println!("{}", serde_json::json!(names));
    } else {
        for name in &names {
            println!("{name}");
        }
        println!("\n{} operator(s)", names.len());
    }
    Ok(())
}

fn cmd_smoke(engine: &Engine) -> Result<()> {
    let scope = engine.new_base_manager();

    let x = scope.from_slice(&[1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0], [2, 3])?;
    x.set_name("x");
    x.attach_grad()?;

    let y = {
        let collector = engine.new_gradient_collector()?;
        let y = x.mul(&x)?.add_scalar(1.0)?.sum()?;
        collector.backward(&y)?;
        y
    };

    println!("input  {}", x.data_desc()?);
    print!("{}", x.dump()?);
    println!("sum(x * x + 1) = {:?}", y.to_f32_vec()?);
    print!("gradient\n{}", x.gradient()?.dump()?);

    scope.close();
    println!("\nscope closed, input released: {}", x.is_released());
    Ok(())
}
