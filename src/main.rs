use anyhow::Context;
use clap::Parser;
use prism_connector::cli::{Cli, Commands};
use prism_connector::config::manager;
use prism_connector::config::models::SchemaSpecType;
use prism_connector::convert::{convert_document, ConvertConfig};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Convert {
            file,
            output,
            spec,
            prefix,
            trim_prefix,
            env_prefix,
            strict,
        } => {
            let raw = std::fs::read_to_string(&file)
                .with_context(|| format!("cannot read '{}'", file.display()))?;
            let spec = match spec.as_str() {
                "oas3" => SchemaSpecType::OpenApiV3,
                "oas2" => SchemaSpecType::OpenApiV2,
                "native" | "ndc" => SchemaSpecType::Native,
                other => anyhow::bail!("unknown spec '{other}' (expected oas3, oas2 or native)"),
            };
            let config = ConvertConfig {
                spec,
                prefix,
                trim_prefix,
                env_prefix,
                strict,
                ..ConvertConfig::default()
            };
            let base_dir = file.parent().map_or_else(|| ".".into(), ToOwned::to_owned);
            let outcome = convert_document(&raw, &config, &[], &[], &base_dir)?;
            for error in &outcome.errors {
                eprintln!("warning: {error}");
            }
            let serialized = serde_json::to_string_pretty(&outcome.catalog)?;
            write_output(output, &serialized)?;
        }
        Commands::Update { dir } => {
            let configuration = manager::load_configuration(&dir)?;
            let files = manager::convert_catalogs(&dir, &configuration)?;
            manager::write_catalog_cache(&dir, &configuration, &files)?;
            println!(
                "converted {} schema file(s) in '{}'",
                files.len(),
                dir.display()
            );
        }
        Commands::Json2yaml { file, output } => {
            let raw = std::fs::read_to_string(&file)
                .with_context(|| format!("cannot read '{}'", file.display()))?;
            let value: serde_json::Value = serde_json::from_str(&raw)?;
            let yaml = serde_yaml::to_string(&value)?;
            write_output(output, &yaml)?;
        }
    }
    Ok(())
}

fn write_output(path: Option<std::path::PathBuf>, contents: &str) -> anyhow::Result<()> {
    match path {
        Some(path) => std::fs::write(&path, contents)
            .with_context(|| format!("cannot write '{}'", path.display()))?,
        None => println!("{contents}"),
    }
    Ok(())
}
