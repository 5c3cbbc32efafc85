use {anyhow::Result, clap::Subcommand};

use lockbox_config::{LockboxConfig, Severity, ValidationResult};

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the effective configuration (file, defaults and env overrides).
    Show {
        /// Output format: toml or json.
        #[arg(long, default_value = "toml")]
        format: String,
    },
    /// Validate the configuration file and report errors/warnings.
    Check {
        /// Show informational diagnostics in addition to errors and warnings.
        #[arg(long)]
        verbose: bool,
    },
    /// Write the effective configuration to the config directory.
    Save,
}

pub fn handle_config(config: &LockboxConfig, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show { format } => {
            println!("{}", render(config, &format)?);
            Ok(())
        },
        ConfigAction::Check { verbose } => check(config, verbose),
        ConfigAction::Save => {
            let path = lockbox_config::save_config(config)?;
            eprintln!("Saved {}", path.display());
            Ok(())
        },
    }
}

fn render(config: &LockboxConfig, format: &str) -> Result<String> {
    match format {
        "toml" => Ok(toml::to_string_pretty(config)?),
        "json" => Ok(serde_json::to_string_pretty(config)?),
        other => anyhow::bail!("unsupported format: {other} (expected toml or json)"),
    }
}

/// Diagnostics that only make sense against the raw file.
const FILE_CATEGORIES: &[&str] = &["syntax", "unknown-field", "type-error"];

/// ANSI color codes.
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

fn check(config: &LockboxConfig, verbose: bool) -> Result<()> {
    // Semantic checks run on the effective config so env overrides count.
    let file = lockbox_config::validate_file(None);
    let mut result = ValidationResult {
        config_path: file.config_path,
        diagnostics: file
            .diagnostics
            .into_iter()
            .filter(|d| d.severity == Severity::Info || FILE_CATEGORIES.contains(&d.category))
            .collect(),
    };
    result
        .diagnostics
        .extend(lockbox_config::validate(config).diagnostics);

    if let Some(ref path) = result.config_path {
        eprintln!("Checking {}\n", path.display());
    } else {
        eprintln!("No config file found; checking defaults.\n");
    }

    let mut shown = 0;
    for d in &result.diagnostics {
        if d.severity == Severity::Info && !verbose {
            continue;
        }

        let color = match d.severity {
            Severity::Error => RED,
            Severity::Warning => YELLOW,
            Severity::Info => CYAN,
        };

        if d.path.is_empty() {
            eprintln!("  {BOLD}{color}{}{RESET} {}", d.severity, d.message);
        } else {
            eprintln!("  {BOLD}{color}{}{RESET} {}: {}", d.severity, d.path, d.message);
        }
        shown += 1;
    }

    let errors = result.count(Severity::Error);
    let warnings = result.count(Severity::Warning);

    if shown > 0 {
        eprintln!();
    }

    if errors == 0 && warnings == 0 {
        eprintln!("No issues found.");
    } else {
        eprintln!("{errors} error(s), {warnings} warning(s)");
    }

    if errors > 0 {
        std::process::exit(1);
    }

    Ok(())
}
