//! Conversion of parsed CLI arguments into a `RunConfig` and logging setup

use crate::cli::main_impl::{Cli, CliLogFormat};
use crate::{
    config::{DelegateOptions, RunConfig},
    tracing_config::{TracingConfig, TracingFormat, TracingOutput},
    utils::ExecutionProviderManager,
};
use anyhow::{Context, Result};

pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Build a `RunConfig` from CLI arguments
    pub(crate) fn from_cli(cli: &Cli) -> Result<RunConfig> {
        Self::validate_cli(cli)?;

        let model_path = cli.model.clone().context("No model specified")?;

        let (backend_type, execution_provider) =
            ExecutionProviderManager::parse_provider_string(&cli.execution_provider)
                .context("Invalid execution provider format")?;

        let mut delegate_options = DelegateOptions::new();
        for option in &cli.delegate_options {
            let (key, value) = DelegateOptions::parse_option(option)
                .with_context(|| format!("Invalid delegate option '{option}'"))?;
            delegate_options.insert(key, value);
        }

        let mut builder = RunConfig::builder();
        if let Some(format) = cli.format {
            builder = builder.output_format(format.into());
        }
        let config = builder
            .model_path(model_path)
            .backend_type(backend_type)
            .execution_provider(execution_provider)
            .delegate_options(delegate_options)
            .intra_threads(cli.threads)
            .scaling(cli.scaling.into())
            .build()
            .context("Invalid configuration")?;

        Ok(config)
    }

    /// Build the logging setup from `-v`, `--log-format` and `--log-file`
    ///
    /// Formats and destinations whose cargo feature is disabled are errors.
    pub(crate) fn tracing_config(cli: &Cli) -> Result<TracingConfig> {
        let format = match cli.log_format {
            CliLogFormat::Console => TracingFormat::Console,
            CliLogFormat::Compact => TracingFormat::Compact,
            #[cfg(feature = "tracing-json")]
            CliLogFormat::Json => TracingFormat::Json,
            #[cfg(not(feature = "tracing-json"))]
            CliLogFormat::Json => {
                anyhow::bail!("--log-format json requires the tracing-json feature")
            },
        };

        let output = match &cli.log_file {
            None => TracingOutput::Console,
            #[cfg(feature = "tracing-files")]
            Some(path) => TracingOutput::File(path.clone()),
            #[cfg(not(feature = "tracing-files"))]
            Some(_) => anyhow::bail!("--log-file requires the tracing-files feature"),
        };

        Ok(TracingConfig::new()
            .with_verbosity(cli.verbose)
            .with_format(format)
            .with_output(output))
    }

    /// Check argument combinations clap cannot express
    pub(crate) fn validate_cli(cli: &Cli) -> Result<()> {
        if cli.inspect && (cli.input.is_some() || cli.output.is_some()) {
            anyhow::bail!("--inspect takes only the MODEL argument");
        }
        if cli.model.as_ref().is_some_and(|path| path.as_os_str().is_empty()) {
            anyhow::bail!("MODEL must not be empty");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::main_impl::{CliOutputFormat, CliScaling};
    use crate::config::{BackendType, ExecutionProvider, OutputFormat, PixelScaling};
    use std::path::PathBuf;

    fn create_test_cli() -> Cli {
        Cli {
            model: Some(PathBuf::from("model.onnx")),
            input: Some(PathBuf::from("in.png")),
            output: Some(PathBuf::from("out.png")),
            execution_provider: "onnx:auto".to_string(),
            delegate_options: Vec::new(),
            threads: 0,
            scaling: CliScaling::Raw,
            format: None,
            verbose: 0,
            log_format: CliLogFormat::Console,
            log_file: None,
            json: false,
            inspect: false,
            show_providers: false,
        }
    }

    #[test]
    fn test_cli_config_conversion() {
        let mut cli = create_test_cli();
        cli.execution_provider = "onnx:cuda".to_string();
        cli.delegate_options = vec!["device_id=1".to_string()];
        cli.threads = 2;
        cli.scaling = CliScaling::Normalized;

        let config = CliConfigBuilder::from_cli(&cli).unwrap();

        assert_eq!(config.model_path, PathBuf::from("model.onnx"));
        assert_eq!(config.backend_type, BackendType::Onnx);
        assert_eq!(config.execution_provider, ExecutionProvider::Cuda);
        assert_eq!(config.delegate_options.get("device_id"), Some("1"));
        assert_eq!(config.intra_threads, 2);
        assert_eq!(config.scaling, PixelScaling::Normalized);
        assert!(config.output_format.is_none());
    }

    #[test]
    fn test_cli_defaults() {
        let config = CliConfigBuilder::from_cli(&create_test_cli()).unwrap();
        assert_eq!(config.execution_provider, ExecutionProvider::Auto);
        assert!(config.delegate_options.is_empty());
        assert_eq!(config.scaling, PixelScaling::Raw);
        assert_eq!(config.output_format_for("out.jpg"), OutputFormat::Jpeg);
    }

    #[test]
    fn test_format_flag_overrides_extension() {
        let mut cli = create_test_cli();
        cli.format = Some(CliOutputFormat::Tiff);

        let config = CliConfigBuilder::from_cli(&cli).unwrap();
        assert_eq!(config.output_format, Some(OutputFormat::Tiff));
        assert_eq!(config.output_format_for("out.png"), OutputFormat::Tiff);
    }

    #[test]
    fn test_tracing_config_from_cli() {
        let mut cli = create_test_cli();
        cli.verbose = 1;
        cli.log_format = CliLogFormat::Compact;

        let tracing = CliConfigBuilder::tracing_config(&cli).unwrap();
        assert_eq!(tracing.verbosity_to_filter(), "debug");
        assert_eq!(tracing.format, TracingFormat::Compact);
        assert_eq!(tracing.output, TracingOutput::Console);

        cli.log_format = CliLogFormat::Json;
        assert_eq!(
            CliConfigBuilder::tracing_config(&cli).is_ok(),
            cfg!(feature = "tracing-json")
        );

        cli.log_format = CliLogFormat::Console;
        cli.log_file = Some(PathBuf::from("run.log"));
        assert_eq!(
            CliConfigBuilder::tracing_config(&cli).is_ok(),
            cfg!(feature = "tracing-files")
        );
    }

    #[test]
    fn test_invalid_arguments() {
        let mut cli = create_test_cli();
        cli.execution_provider = "invalid:provider".to_string();
        assert!(CliConfigBuilder::from_cli(&cli).is_err());

        let mut cli = create_test_cli();
        cli.delegate_options = vec!["no-equals-sign".to_string()];
        let err = CliConfigBuilder::from_cli(&cli).unwrap_err();
        assert!(format!("{err:#}").contains("no-equals-sign"));

        // Tract has no delegate to pass options to
        let mut cli = create_test_cli();
        cli.execution_provider = "tract:cpu".to_string();
        cli.delegate_options = vec!["device_id=0".to_string()];
        assert!(CliConfigBuilder::from_cli(&cli).is_err());
    }

    #[test]
    fn test_cli_validation() {
        let mut cli = create_test_cli();
        assert!(CliConfigBuilder::validate_cli(&cli).is_ok());

        cli.inspect = true;
        assert!(CliConfigBuilder::validate_cli(&cli).is_err());

        cli.input = None;
        cli.output = None;
        assert!(CliConfigBuilder::validate_cli(&cli).is_ok());
    }
}
