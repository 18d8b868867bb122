use anyhow::{Context, Result};
use clap::Parser;
use field_weaver::class::CompiledClass;
use field_weaver::classify::{ModelClassifier, persisted_fields};
use field_weaver::cli::{Cli, Commands, OutputFormat};
use field_weaver::config::{WeaverConfig, load_config};
use field_weaver::lower::lower_directory;
use field_weaver::marker::is_already_transformed;
use field_weaver::output::{WrittenClass, write_classes};
use field_weaver::pool::SymbolPool;
use field_weaver::render::render_class;
use field_weaver::rewrite::ManagedFieldSet;
use field_weaver::source::open_source;
use field_weaver::weaver::{PassReport, Weaver};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let config = load_config(&cli)?;

    match cli.command.clone() {
        Commands::Weave {
            input,
            out,
            classpath,
            managed,
            format,
        } => {
            let result = weave(&config, &input, &out, &classpath, managed.as_deref())?;
            write_weave_output(&result, format)?;
        }
        Commands::Classify { input, classpath } => {
            let entries = classify(&config, &input, &classpath)?;
            println!("{}", serde_json::to_string_pretty(&entries)?);
        }
        Commands::Show {
            input,
            class_name,
            classpath,
            woven,
        } => {
            let class = show(&config, &input, &classpath, &class_name, woven)?;
            print!("{}", render_class(&class));
        }
        Commands::Compile { src, out } => {
            let result = compile(&src, &out)?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
    }

    Ok(())
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Input classes first, then the classpath in the order given.
fn build_pool(input: &Path, classpath: &[PathBuf]) -> Result<(SymbolPool, Vec<String>)> {
    let source =
        open_source(input).with_context(|| format!("failed to open input {}", input.display()))?;
    let targets = source.class_names();

    let mut pool = SymbolPool::new();
    pool.add_source(source);
    for path in classpath {
        let source = open_source(path)
            .with_context(|| format!("failed to open classpath entry {}", path.display()))?;
        pool.add_source(source);
    }
    Ok((pool, targets))
}

fn load_managed(path: &Path) -> Result<ManagedFieldSet> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read managed field list {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("invalid managed field list {}", path.display()))
}

#[derive(Debug, Serialize)]
struct WeaveOutput {
    input: String,
    out: String,
    sources: Vec<String>,
    targets: usize,
    duration_ms: u64,
    report: PassReport,
    written: Vec<WrittenClass>,
}

fn weave(
    config: &WeaverConfig,
    input: &Path,
    out: &Path,
    classpath: &[PathBuf],
    managed: Option<&Path>,
) -> Result<WeaveOutput> {
    let start = Instant::now();
    let (pool, targets) = build_pool(input, classpath)?;

    let mut weaver = Weaver::new(pool, config.clone());
    if let Some(path) = managed {
        weaver = weaver.with_managed_fields(load_managed(path)?);
    }

    let report = weaver.run(&targets);
    if !report.is_success() {
        let mut message = format!(
            "weaving failed for {} of {} classes; nothing was written",
            report.failures.len(),
            targets.len()
        );
        for failure in &report.failures {
            message.push_str(&format!("\n  {}: {}", failure.class, failure.error));
        }
        anyhow::bail!(message);
    }

    let classes = weaver.emit(&targets)?;
    let written = write_classes(out, &classes)?;

    Ok(WeaveOutput {
        input: input.to_string_lossy().to_string(),
        out: out.to_string_lossy().to_string(),
        sources: weaver.pool().source_descriptions(),
        targets: targets.len(),
        duration_ms: start.elapsed().as_millis() as u64,
        report,
        written,
    })
}

fn write_weave_output(result: &WeaveOutput, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(result)?),
        OutputFormat::Text => {
            let mut out = String::new();
            out.push_str(&format!("input: {}\n", result.input));
            out.push_str(&format!("out: {}\n", result.out));
            out.push_str(&format!("targets: {}\n", result.targets));
            out.push_str(&format!("duration_ms: {}\n", result.duration_ms));
            for c in &result.report.classes {
                out.push_str(&format!(
                    "- {} model: {}, accessors: {}, reads: {}, writes: {}, marked: {}\n",
                    c.class, c.model, c.accessors_added, c.reads, c.writes, c.marked
                ));
            }
            for name in &result.report.touched_outside_targets {
                out.push_str(&format!("- {name} (accessors only, not a target)\n"));
            }
            print!("{out}");
        }
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct ClassifyEntry {
    class: String,
    model: bool,
    directly_annotated: bool,
    implements_proxy_interface: bool,
    transformed: bool,
    persisted_fields: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn classify(
    config: &WeaverConfig,
    input: &Path,
    classpath: &[PathBuf],
) -> Result<Vec<ClassifyEntry>> {
    let (pool, targets) = build_pool(input, classpath)?;
    let classifier = ModelClassifier::new(&pool, config);

    let mut entries = Vec::with_capacity(targets.len());
    for name in targets {
        let class = pool.snapshot(&name)?;
        let header = class.header();
        entries.push(ClassifyEntry {
            model: classifier.is_model_header(&header),
            directly_annotated: header.has_annotation(&config.model_annotation),
            implements_proxy_interface: classifier.implements_proxy_interface(&class),
            transformed: is_already_transformed(&class, config),
            persisted_fields: persisted_fields(&class, config).map(|f| f.name.clone()).collect(),
            error: classifier.verify(&header).err().map(|e| e.to_string()),
            class: name,
        });
    }
    Ok(entries)
}

fn show(
    config: &WeaverConfig,
    input: &Path,
    classpath: &[PathBuf],
    class_name: &str,
    woven: bool,
) -> Result<CompiledClass> {
    let (pool, targets) = build_pool(input, classpath)?;
    let weaver = Weaver::new(pool, config.clone());
    if woven {
        weaver.run(&targets).into_result()?;
    }
    Ok(weaver.pool().snapshot(class_name)?)
}

#[derive(Debug, Serialize)]
struct CompileResult {
    src: String,
    out: String,
    duration_ms: u64,
    classes: Vec<WrittenClass>,
}

fn compile(src: &Path, out: &Path) -> Result<CompileResult> {
    let start = Instant::now();
    let classes = lower_directory(src)?;
    if classes.is_empty() {
        anyhow::bail!("no class declarations found under {}", src.display());
    }
    let written = write_classes(out, &classes)?;
    Ok(CompileResult {
        src: src.to_string_lossy().to_string(),
        out: out.to_string_lossy().to_string(),
        duration_ms: start.elapsed().as_millis() as u64,
        classes: written,
    })
}
