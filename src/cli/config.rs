//! Conversion from command line arguments to `ServerConfig`

use crate::cli::main_impl::Cli;
use crate::{config::ServerConfig, utils::ExecutionProviderManager};
use anyhow::{Context, Result};

pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Build a validated `ServerConfig` from CLI arguments
    pub(crate) fn from_cli(cli: &Cli) -> Result<ServerConfig> {
        let (backend_type, execution_provider) =
            ExecutionProviderManager::parse_provider_string(&cli.execution_provider)
                .context("Invalid execution provider format")?;

        if cli.jpeg_quality == 0 || cli.jpeg_quality > 100 {
            anyhow::bail!("JPEG quality must be between 1 and 100, got {}", cli.jpeg_quality);
        }

        let config = ServerConfig::builder()
            .host(cli.host.clone())
            .port(cli.port)
            .model_path(cli.model.clone())
            .backend_type(backend_type)
            .execution_provider(execution_provider)
            .intra_threads(cli.threads)
            .upload_dir(cli.upload_dir.clone())
            .output_dir(cli.output_dir.clone())
            .mask_threshold(cli.threshold)
            .pixel_scale(cli.pixel_scale)
            .jpeg_quality(cli.jpeg_quality)
            .max_upload_bytes(cli.max_upload_bytes)
            .create_dirs(cli.create_dirs)
            .debug(cli.debug)
            .build()?;

        config.socket_addr()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::ExecutionProvider, processor::BackendType};
    use clap::Parser;
    use std::path::PathBuf;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("noback-server").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_defaults_reproduce_fixed_layout() {
        let config = CliConfigBuilder::from_cli(&parse(&[])).unwrap();

        assert_eq!(config.port, 5001);
        assert_eq!(config.model_path, PathBuf::from("back_removal.onnx"));
        assert_eq!(config.upload_path(), PathBuf::from("uploads").join("input_image.jpg"));
        assert_eq!(
            config.output_path(),
            PathBuf::from("NoBackImages").join("output_image.jpg")
        );
        assert_eq!(config.backend_type, BackendType::Tract);
        assert!(!config.create_dirs);
        assert!(!config.debug);
    }

    #[test]
    fn test_cli_overrides() {
        let cli = parse(&[
            "--port",
            "8080",
            "--model",
            "models/seg.onnx",
            "-e",
            "onnx:cuda",
            "--threshold",
            "0.7",
            "--jpeg-quality",
            "75",
            "--create-dirs",
            "--debug",
        ]);
        let config = CliConfigBuilder::from_cli(&cli).unwrap();

        assert_eq!(config.port, 8080);
        assert_eq!(config.model_path, PathBuf::from("models/seg.onnx"));
        assert_eq!(config.backend_type, BackendType::Onnx);
        assert_eq!(config.execution_provider, ExecutionProvider::Cuda);
        assert!((config.mask_threshold - 0.7).abs() < f32::EPSILON);
        assert_eq!(config.jpeg_quality, 75);
        assert!(config.create_dirs);
        assert!(config.debug);
    }

    #[test]
    fn test_invalid_arguments_rejected() {
        let mut cli = parse(&[]);
        cli.execution_provider = "invalid:provider".to_string();
        assert!(CliConfigBuilder::from_cli(&cli).is_err());

        let mut cli = parse(&[]);
        cli.jpeg_quality = 150;
        assert!(CliConfigBuilder::from_cli(&cli).is_err());

        let mut cli = parse(&[]);
        cli.threshold = 1.5;
        assert!(CliConfigBuilder::from_cli(&cli).is_err());

        let mut cli = parse(&[]);
        cli.host = "not-an-address".to_string();
        assert!(CliConfigBuilder::from_cli(&cli).is_err());
    }
}
