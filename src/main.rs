//! formatted-changelog CLI
//!
//! Entry point for the command-line tool.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use formatted_changelog::{
    Config, FsResourceAccessor, ParameterExpander, ParameterRegistry, SqlDialect, parse,
    unresolved_tokens,
};

#[derive(Parser, Debug)]
#[command(name = "formatted-changelog")]
#[command(about = "Parses line-oriented formatted SQL changelogs", long_about = None)]
struct Args {
    /// Path to the changelog to parse, relative to the configured base_dir
    path: Option<PathBuf>,

    /// Path to configuration file
    #[arg(short, long, default_value = "formatted-changelog.toml")]
    config: PathBuf,

    /// Additional `key=value` parameters, registered before parsing
    /// begins; these override any same-named key from the config file.
    #[arg(long = "param", value_parser = parse_key_value)]
    params: Vec<(String, String)>,

    /// Print configuration reference for a section (or all sections, the
    /// default) and exit without parsing anything.
    #[arg(long, num_args = 0..=1, default_missing_value = "all")]
    explain_config: Option<String>,
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((k, v)) => Ok((k.to_string(), v.to_string())),
        None => Err(format!("expected key=value, got '{s}'")),
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    if let Some(section) = &args.explain_config {
        return formatted_changelog::config::explain_config(section)
            .context("failed to explain configuration");
    }

    let path = args
        .path
        .ok_or_else(|| anyhow::anyhow!("the following required arguments were not provided: <PATH>"))?;

    let config = if args.config.exists() {
        Config::from_file(&args.config).context("failed to load configuration")?
    } else {
        Config::default()
    };

    let accessor = FsResourceAccessor::new(&config.changelog.base_dir);

    let mut expander = ParameterRegistry::new();
    for (name, value) in &config.parameters {
        expander.register(name, value, None, None, None, true, "<config>");
    }
    for (name, value) in &args.params {
        expander.register(name, value, None, None, None, true, "<cli>");
    }

    let path = path.to_string_lossy().into_owned();
    let changelog = parse(&path, &SqlDialect, &accessor, &mut expander, None)
        .with_context(|| format!("failed to parse changelog {path}"))?;

    if config.changelog.unresolved_parameter_policy == "error" {
        for cs in &changelog.change_sets {
            let unresolved = unresolved_tokens(&cs.change.sql);
            if !unresolved.is_empty() {
                anyhow::bail!(
                    "changeset {}::{} has unresolved parameters: {}",
                    cs.author,
                    cs.id,
                    unresolved.join(", ")
                );
            }
        }
    }

    println!(
        "{} ({} changesets)",
        changelog.physical_path,
        changelog.change_sets.len()
    );
    for cs in &changelog.change_sets {
        println!(
            "  {}::{} ({} line{})",
            cs.author,
            cs.id,
            cs.change.sql.lines().count(),
            if cs.change.sql.lines().count() == 1 { "" } else { "s" }
        );
    }

    Ok(())
}
