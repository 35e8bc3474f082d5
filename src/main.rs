use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;

use tmscope::cli::{CliArgs, OutputMode, RunConfig};
use tmscope::config::TokenizerConfig;
use tmscope::grammar::{attributes, StateStack};
use tmscope::raw::RawTheme;
use tmscope::registry::{Registry, StaticRegistryOptions};
use tmscope::theme::Theme;

fn main() -> Result<()> {
    let args = CliArgs::parse();
    tmscope::tracing::init();

    if args.log_path {
        match tmscope::config_paths::log_file() {
            Some(path) => println!("{}", path.display()),
            None => println!("No config directory available"),
        }
        return Ok(());
    }

    let config = args
        .into_config(TokenizerConfig::load())
        .map_err(anyhow::Error::msg)?;
    run(&config)
}

fn run(config: &RunConfig) -> Result<()> {
    let mut options = StaticRegistryOptions::new();
    let mut first_scope = None;
    for path in &config.grammars {
        let scope = options
            .add_grammar_file(path)
            .with_context(|| format!("Failed to load grammar {}", path.display()))?;
        first_scope.get_or_insert(scope);
    }

    let scope = config
        .scope
        .clone()
        .or_else(|| options.scope_for_path(&config.file))
        .or(first_scope)
        .context("No grammar loaded")?;

    if let Some(theme_path) = &config.theme {
        load_theme(&mut options, theme_path)?;
    }

    let text = std::fs::read_to_string(&config.file)
        .with_context(|| format!("Failed to read {}", config.file.display()))?;

    let mut registry = Registry::new(options);
    let theme = registry.theme().clone();
    let grammar = registry.load_grammar(&scope)?;
    tracing::info!("Tokenizing {} as {}", config.file.display(), scope);

    let mut state: Option<StateStack> = None;
    for (index, line) in text.lines().enumerate() {
        let line_number = index + 1;
        let stopped_early = match config.output {
            OutputMode::Plain => {
                let result = grammar.tokenize_line(line, state.as_ref(), config.time_limit);
                for token in &result.tokens {
                    let style = theme.resolve_style(&token.scopes);
                    println!(
                        "{:>4} {:>4}..{:<4} {:<20} {} [{}{}{}]",
                        line_number,
                        token.start_index,
                        token.end_index,
                        format!("{:?}", line.get(token.start_index..token.end_index).unwrap_or("")),
                        token.scopes.join(" "),
                        style.foreground.as_deref().unwrap_or("-"),
                        style
                            .background
                            .as_deref()
                            .map(|bg| format!(" on {}", bg))
                            .unwrap_or_default(),
                        font_style_suffix(style.font_style),
                    );
                }
                state = Some(result.rule_stack);
                result.stopped_early
            }
            OutputMode::Json => {
                let result = grammar.tokenize_line(line, state.as_ref(), config.time_limit);
                let value = serde_json::json!({
                    "line": line_number,
                    "tokens": result.tokens,
                    "stoppedEarly": result.stopped_early,
                });
                println!("{}", serde_json::to_string(&value)?);
                state = Some(result.rule_stack);
                result.stopped_early
            }
            OutputMode::Binary => {
                let result = grammar.tokenize_line2(line, state.as_ref(), config.time_limit);
                for pair in result.tokens.chunks_exact(2) {
                    println!("{:>4} {:>4} {}", line_number, pair[0], describe_attributes(&theme, pair[1]));
                }
                state = Some(result.rule_stack);
                result.stopped_early
            }
        };

        if stopped_early {
            tracing::warn!("Line {} exceeded the time limit", line_number);
        }
    }

    if config.output == OutputMode::Plain && !theme.gui_colors().is_empty() {
        println!();
        for (key, color) in theme.gui_colors() {
            println!("{:<40} {}", key, color);
        }
    }

    Ok(())
}

/// Register the theme and, if it has one, its include from the same directory
fn load_theme(options: &mut StaticRegistryOptions, path: &Path) -> Result<()> {
    let raw = RawTheme::from_json_file(path)
        .with_context(|| format!("Failed to load theme {}", path.display()))?;

    if let Some(include) = &raw.include {
        let include_path = path.parent().unwrap_or(Path::new(".")).join(include);
        match RawTheme::from_json_file(&include_path) {
            Ok(included) => options.add_theme(include, included),
            Err(e) => tracing::warn!("Theme include {} not loaded: {}", include_path.display(), e),
        }
    }

    options.set_default_theme(raw);
    Ok(())
}

fn font_style_suffix(font_style: tmscope::grammar::FontStyle) -> String {
    if font_style.is_empty() {
        String::new()
    } else {
        format!(" {:?}", font_style)
    }
}

fn describe_attributes(theme: &Theme, encoded: u32) -> String {
    format!(
        "lang={} type={:?} brackets={} style={:?} fg={} bg={} ({})",
        attributes::language_id(encoded),
        attributes::token_type(encoded),
        attributes::contains_balanced_brackets(encoded),
        attributes::font_style(encoded),
        theme.color(attributes::foreground(encoded)).unwrap_or("-"),
        theme.color(attributes::background(encoded)).unwrap_or("-"),
        attributes::to_binary_str(encoded),
    )
}
