//! Command-line argument parsing for the tokenizer demo
//!
//! Supports:
//! - Loading grammars and a theme from JSON files
//! - Picking the root scope explicitly or from the file extension
//! - Plain, JSON or packed-attribute output

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::TokenizerConfig;

/// Tokenize a file with TextMate grammars
#[derive(Parser, Debug)]
#[command(name = "tmscope", version, about = "Tokenize a file with TextMate grammars")]
pub struct CliArgs {
    /// File to tokenize
    #[arg(value_name = "FILE", required_unless_present = "log_path")]
    pub file: Option<PathBuf>,

    /// Grammar JSON file (repeatable)
    #[arg(short = 'g', long = "grammar", value_name = "PATH")]
    pub grammars: Vec<PathBuf>,

    /// Theme JSON file
    #[arg(short = 't', long, value_name = "PATH")]
    pub theme: Option<PathBuf>,

    /// Root scope name (e.g. source.js)
    #[arg(short = 's', long, value_name = "SCOPE")]
    pub scope: Option<String>,

    /// Per-line time budget in milliseconds
    #[arg(long, value_name = "N")]
    pub time_limit_ms: Option<u64>,

    /// Print packed token attributes
    #[arg(long, conflicts_with = "json")]
    pub binary: bool,

    /// Print one JSON object per line
    #[arg(long)]
    pub json: bool,

    /// Print the current log file path and exit
    #[arg(long)]
    pub log_path: bool,
}

/// How tokens are printed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Byte range, text, scopes and resolved style per token
    Plain,
    /// One JSON object per line
    Json,
    /// Decoded packed attributes per token
    Binary,
}

/// Command-line arguments merged with the config file
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub file: PathBuf,
    /// Command-line grammars first, then those from the config file
    pub grammars: Vec<PathBuf>,
    pub theme: Option<PathBuf>,
    pub scope: Option<String>,
    pub time_limit: Option<Duration>,
    pub output: OutputMode,
}

impl CliArgs {
    /// Merge with `config`; command-line values win
    pub fn into_config(self, config: TokenizerConfig) -> Result<RunConfig, String> {
        let file = self.file.ok_or_else(|| "No input file given".to_string())?;

        let mut grammars = self.grammars;
        for path in &config.grammars {
            if !grammars.contains(path) {
                grammars.push(path.clone());
            }
        }
        if grammars.is_empty() {
            return Err("No grammar given (use --grammar or the config file)".to_string());
        }

        let time_limit = match self.time_limit_ms {
            Some(0) => None,
            Some(ms) => Some(Duration::from_millis(ms)),
            None => config.time_limit(),
        };

        let output = if self.json {
            OutputMode::Json
        } else if self.binary || config.binary {
            OutputMode::Binary
        } else {
            OutputMode::Plain
        };

        Ok(RunConfig {
            file,
            grammars,
            theme: self.theme.or(config.theme),
            scope: self.scope,
            time_limit,
            output,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(file: Option<&str>, grammars: &[&str]) -> CliArgs {
        CliArgs {
            file: file.map(PathBuf::from),
            grammars: grammars.iter().map(PathBuf::from).collect(),
            theme: None,
            scope: None,
            time_limit_ms: None,
            binary: false,
            json: false,
            log_path: false,
        }
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let result = args(None, &["a.json"]).into_config(TokenizerConfig::default());
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_grammar_is_an_error() {
        let result = args(Some("x.demo"), &[]).into_config(TokenizerConfig::default());
        assert!(result.is_err());
    }

    #[test]
    fn test_config_grammars_are_appended() {
        let config = TokenizerConfig {
            grammars: vec![PathBuf::from("a.json"), PathBuf::from("b.json")],
            ..TokenizerConfig::default()
        };
        let run = args(Some("x.demo"), &["a.json"]).into_config(config).unwrap();
        assert_eq!(
            run.grammars,
            vec![PathBuf::from("a.json"), PathBuf::from("b.json")]
        );
    }

    #[test]
    fn test_time_limit_precedence() {
        let config = TokenizerConfig {
            time_limit_ms: 50,
            ..TokenizerConfig::default()
        };

        let run = args(Some("x"), &["a.json"]).into_config(config.clone()).unwrap();
        assert_eq!(run.time_limit, Some(Duration::from_millis(50)));

        let mut unlimited = args(Some("x"), &["a.json"]);
        unlimited.time_limit_ms = Some(0);
        assert_eq!(unlimited.into_config(config).unwrap().time_limit, None);
    }

    #[test]
    fn test_output_mode() {
        let mut json = args(Some("x"), &["a.json"]);
        json.json = true;
        assert_eq!(
            json.into_config(TokenizerConfig::default()).unwrap().output,
            OutputMode::Json
        );

        let config = TokenizerConfig {
            binary: true,
            ..TokenizerConfig::default()
        };
        let run = args(Some("x"), &["a.json"]).into_config(config).unwrap();
        assert_eq!(run.output, OutputMode::Binary);
    }

    #[test]
    fn test_parse_from_command_line() {
        let args = CliArgs::try_parse_from([
            "tmscope",
            "--grammar",
            "a.json",
            "-g",
            "b.json",
            "--scope",
            "source.demo",
            "main.demo",
        ])
        .unwrap();
        assert_eq!(args.grammars.len(), 2);
        assert_eq!(args.scope.as_deref(), Some("source.demo"));
        assert_eq!(args.file, Some(PathBuf::from("main.demo")));
    }
}
