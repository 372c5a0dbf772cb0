//! CLI argument parsing

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use cnab_driver::{Operation, IMAGE_TYPE_DOCKER};
use std::collections::HashMap;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "cnab-run")]
#[command(author, version, about = "Run CNAB invocation images in ephemeral containers", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run an invocation image and collect its outputs
    Run(RunArgs),

    /// List the driver configuration options
    Config {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Invocation image; overrides the image from --operation
    pub image: Option<String>,

    /// Operation description as JSON (`image`, `environment`, `files`)
    #[arg(long, value_name = "FILE.json")]
    pub operation: Option<PathBuf>,

    /// Environment variable for the container
    #[arg(short, long = "env", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    pub env: Vec<(String, String)>,

    /// Host file to inject at an absolute container path
    #[arg(short, long = "file", value_name = "CONTAINER_PATH=HOST_PATH", value_parser = parse_key_value)]
    pub files: Vec<(String, String)>,

    /// Driver setting, overriding the environment (e.g. PULL_ALWAYS=1)
    #[arg(long = "driver-config", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    pub driver_config: Vec<(String, String)>,

    /// Resolve everything but do not create a container
    #[arg(long, env = "CNAB_SIMULATE")]
    pub simulate: bool,

    /// Invocation image type
    #[arg(long, default_value = IMAGE_TYPE_DOCKER)]
    pub image_type: String,
}

impl RunArgs {
    /// Assemble the operation from the JSON file and the flags.
    ///
    /// Flags win over the file; `--file` contents are read from the host.
    pub fn operation(&self) -> anyhow::Result<Operation> {
        let mut operation = match &self.operation {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read {}", path.display()))?;
                serde_json::from_str::<Operation>(&raw)
                    .with_context(|| format!("failed to parse {}", path.display()))?
            }
            None => Operation::default(),
        };
        if let Some(image) = &self.image {
            operation.image = image.clone();
        }
        if operation.image.is_empty() {
            bail!("no invocation image given (pass IMAGE or --operation)");
        }

        for (key, value) in &self.env {
            operation.environment.insert(key.clone(), value.clone());
        }
        for (container_path, host_path) in &self.files {
            let content = std::fs::read_to_string(host_path)
                .with_context(|| format!("failed to read {host_path} for {container_path}"))?;
            operation.files.insert(container_path.clone(), content);
        }
        Ok(operation)
    }

    /// Driver settings: recognized environment variables, then `--driver-config`.
    pub fn settings(&self, env: HashMap<String, String>) -> HashMap<String, String> {
        let mut settings = env;
        settings.extend(self.driver_config.iter().cloned());
        settings
    }
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{s}'")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_args(argv: &[&str]) -> RunArgs {
        let cli = Cli::try_parse_from(["cnab-run", "run"].iter().chain(argv)).unwrap();
        match cli.command {
            Command::Run(args) => args,
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_key_value() {
        assert_eq!(
            parse_key_value("A=b=c"),
            Ok(("A".to_string(), "b=c".to_string()))
        );
        assert_eq!(parse_key_value("EMPTY="), Ok(("EMPTY".to_string(), String::new())));
        assert!(parse_key_value("=x").is_err());
        assert!(parse_key_value("novalue").is_err());
    }

    #[test]
    fn test_operation_from_flags() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("run.sh");
        std::fs::write(&script, "#!/bin/sh\necho ok").unwrap();
        let file_arg = format!("/cnab/app/run={}", script.display());

        let args = run_args(&[
            "example/install:v1",
            "--env",
            "CNAB_ACTION=install",
            "--file",
            &file_arg,
        ]);
        let op = args.operation().unwrap();
        assert_eq!(op.image, "example/install:v1");
        assert_eq!(op.environment["CNAB_ACTION"], "install");
        assert_eq!(op.files["/cnab/app/run"], "#!/bin/sh\necho ok");
        assert_eq!(args.image_type, "docker");
    }

    #[test]
    fn test_operation_file_overridden_by_flags() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("op.json");
        std::fs::write(
            &path,
            r#"{"image": "example/app:1", "environment": {"CNAB_ACTION": "install", "KEEP": "1"}}"#,
        )
        .unwrap();
        let op_arg = path.display().to_string();

        let args = run_args(&[
            "example/app:2",
            "--operation",
            &op_arg,
            "-e",
            "CNAB_ACTION=upgrade",
        ]);
        let op = args.operation().unwrap();
        assert_eq!(op.image, "example/app:2");
        assert_eq!(op.environment["CNAB_ACTION"], "upgrade");
        assert_eq!(op.environment["KEEP"], "1");
        assert!(op.files.is_empty());
    }

    #[test]
    fn test_operation_requires_image() {
        let args = run_args(&[]);
        assert!(args.operation().is_err());
    }

    #[test]
    fn test_driver_config_overrides_env() {
        let args = run_args(&["img", "--driver-config", "PULL_ALWAYS=1"]);
        let env = HashMap::from([
            ("PULL_ALWAYS".to_string(), "0".to_string()),
            ("VERBOSE".to_string(), "true".to_string()),
        ]);
        let settings = args.settings(env);
        assert_eq!(settings["PULL_ALWAYS"], "1");
        assert_eq!(settings["VERBOSE"], "true");
    }
}
