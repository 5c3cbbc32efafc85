//! Configuration validation.
//!
//! Checks config files for syntax errors, unknown or misspelled fields, and
//! values the vault would reject or that weaken it.

use std::path::{Path, PathBuf};

use crate::{env_subst::substitute_env, schema::LockboxConfig};

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
            Self::Info => write!(f, "info"),
        }
    }
}

/// A single validation diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Category: "syntax", "unknown-field", "type-error", "range",
    /// "security", "file-ref"
    pub category: &'static str,
    /// Dotted path, e.g. "kdf.m_cost"
    pub path: String,
    pub message: String,
}

impl Diagnostic {
    fn new(
        severity: Severity,
        category: &'static str,
        path: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            category,
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Result of validating a configuration.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
    pub config_path: Option<PathBuf>,
}

impl ValidationResult {
    /// Returns `true` if any diagnostic is an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    /// Count diagnostics by severity.
    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }
}

/// Sections and their fields.
const KNOWN_FIELDS: &[(&str, &[&str])] = &[
    ("session", &["timeout_secs"]),
    ("kdf", &["m_cost", "t_cost", "p_cost"]),
    ("storage", &["database"]),
    ("metrics", &["enabled"]),
];

/// Argon2 needs at least 8 KiB of memory per lane.
const ARGON2_MIN_M_COST_PER_LANE: u32 = 8;
/// Argon2's lane limit.
const ARGON2_MAX_P_COST: u32 = 0x00ff_ffff;
/// Below 19 MiB Argon2id falls under common interactive-login guidance.
const WEAK_M_COST: u32 = 19 * 1024;
/// Sessions longer than this keep the key resident for a long time.
const LONG_SESSION_SECS: u64 = 24 * 60 * 60;

// ── Levenshtein distance ────────────────────────────────────────────────────

/// Compute the Levenshtein edit distance between two strings.
fn levenshtein(a: &str, b: &str) -> usize {
    let b_len = b.chars().count();
    let mut prev: Vec<usize> = (0..=b_len).collect();
    let mut curr = vec![0; b_len + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.chars().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b_len]
}

/// Closest candidate within `max_distance` edits.
fn suggest<'a>(needle: &str, candidates: &[&'a str], max_distance: usize) -> Option<&'a str> {
    candidates
        .iter()
        .map(|&c| (c, levenshtein(needle, c)))
        .filter(|&(_, d)| d > 0 && d <= max_distance)
        .min_by_key(|&(_, d)| d)
        .map(|(c, _)| c)
}

// ── Core validation ─────────────────────────────────────────────────────────

/// Validate a config file at the given path, or the discovered config file
/// when `path` is `None`.
#[must_use]
pub fn validate_file(path: Option<&Path>) -> ValidationResult {
    let config_path = match path {
        Some(p) => Some(p.to_path_buf()),
        None => crate::loader::find_config_file(),
    };

    let Some(actual_path) = config_path else {
        return ValidationResult {
            diagnostics: vec![Diagnostic::new(
                Severity::Info,
                "file-ref",
                "",
                "no config file found; using defaults",
            )],
            config_path: None,
        };
    };

    let mut result = match std::fs::read_to_string(&actual_path) {
        Ok(content) => validate_str(&substitute_env(&content), &actual_path),
        Err(e) => ValidationResult {
            diagnostics: vec![Diagnostic::new(
                Severity::Error,
                "syntax",
                "",
                format!("failed to read config file: {e}"),
            )],
            config_path: None,
        },
    };
    result.config_path = Some(actual_path);
    result
}

/// Validate raw config text. The format is taken from `path`'s extension.
#[must_use]
pub fn validate_str(raw: &str, path: &Path) -> ValidationResult {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    let value: Result<serde_json::Value, String> = match ext {
        "toml" => toml::from_str::<toml::Value>(raw)
            .map_err(|e| e.to_string())
            .and_then(|v| serde_json::to_value(v).map_err(|e| e.to_string())),
        "yaml" | "yml" => serde_yaml::from_str(raw).map_err(|e| e.to_string()),
        "json" => serde_json::from_str(raw).map_err(|e| e.to_string()),
        other => Err(format!("unsupported config format: .{other}")),
    };

    let value = match value {
        Ok(v) => v,
        Err(message) => {
            return ValidationResult {
                diagnostics: vec![Diagnostic::new(Severity::Error, "syntax", "", message)],
                config_path: None,
            };
        },
    };

    let mut diagnostics = Vec::new();
    check_unknown_fields(&value, &mut diagnostics);

    // An empty YAML document parses as null and means "all defaults".
    let value = if value.is_null() {
        serde_json::Value::Object(serde_json::Map::new())
    } else {
        value
    };
    match serde_json::from_value::<LockboxConfig>(value) {
        Ok(config) => diagnostics.extend(validate(&config).diagnostics),
        // Unknown fields were reported above with better paths.
        Err(_) if diagnostics.iter().any(|d| d.category == "unknown-field") => {},
        Err(e) => diagnostics.push(Diagnostic::new(
            Severity::Error,
            "type-error",
            "",
            format!("type error: {e}"),
        )),
    }

    ValidationResult {
        diagnostics,
        config_path: None,
    }
}

/// Semantic checks on a loaded config.
#[must_use]
pub fn validate(config: &LockboxConfig) -> ValidationResult {
    let mut diagnostics = Vec::new();

    let timeout = config.session.timeout_secs;
    if timeout == 0 {
        diagnostics.push(Diagnostic::new(
            Severity::Error,
            "range",
            "session.timeout_secs",
            "must be greater than zero",
        ));
    } else if timeout > LONG_SESSION_SECS {
        diagnostics.push(Diagnostic::new(
            Severity::Warning,
            "security",
            "session.timeout_secs",
            "sessions longer than a day keep the vault key in memory for a long time",
        ));
    }

    let kdf = &config.kdf;
    if kdf.t_cost == 0 {
        diagnostics.push(Diagnostic::new(
            Severity::Error,
            "range",
            "kdf.t_cost",
            "must be at least 1",
        ));
    }
    if kdf.p_cost == 0 || kdf.p_cost > ARGON2_MAX_P_COST {
        diagnostics.push(Diagnostic::new(
            Severity::Error,
            "range",
            "kdf.p_cost",
            format!("must be between 1 and {ARGON2_MAX_P_COST}"),
        ));
    }
    let min_m_cost = ARGON2_MIN_M_COST_PER_LANE.saturating_mul(kdf.p_cost.max(1));
    if kdf.m_cost < min_m_cost {
        diagnostics.push(Diagnostic::new(
            Severity::Error,
            "range",
            "kdf.m_cost",
            format!("must be at least {min_m_cost} KiB for {} lane(s)", kdf.p_cost),
        ));
    } else if kdf.m_cost < WEAK_M_COST {
        diagnostics.push(Diagnostic::new(
            Severity::Warning,
            "security",
            "kdf.m_cost",
            format!("{} KiB is weak for a master passphrase; use at least {WEAK_M_COST}", kdf.m_cost),
        ));
    }

    if let Some(db) = &config.storage.database {
        if db.as_os_str().is_empty() {
            diagnostics.push(Diagnostic::new(
                Severity::Error,
                "file-ref",
                "storage.database",
                "must not be empty",
            ));
        } else if db.is_relative() {
            diagnostics.push(Diagnostic::new(
                Severity::Warning,
                "file-ref",
                "storage.database",
                "relative path is resolved against the working directory",
            ));
        }
    }

    ValidationResult {
        diagnostics,
        config_path: None,
    }
}

fn check_unknown_fields(value: &serde_json::Value, diagnostics: &mut Vec<Diagnostic>) {
    let Some(root) = value.as_object() else {
        if !value.is_null() {
            diagnostics.push(Diagnostic::new(
                Severity::Error,
                "type-error",
                "",
                "config root must be a table",
            ));
        }
        return;
    };

    let sections: Vec<&str> = KNOWN_FIELDS.iter().map(|(s, _)| *s).collect();
    for (key, child) in root {
        let Some((_, fields)) = KNOWN_FIELDS.iter().find(|(s, _)| s == key) else {
            diagnostics.push(unknown_field(key.clone(), key, &sections, "at top level "));
            continue;
        };
        let Some(table) = child.as_object() else {
            // Type error, reported by deserialization.
            continue;
        };
        for field in table.keys() {
            if !fields.contains(&field.as_str()) {
                diagnostics.push(unknown_field(format!("{key}.{field}"), field, fields, ""));
            }
        }
    }
}

fn unknown_field(path: String, key: &str, candidates: &[&str], level: &str) -> Diagnostic {
    let message = match suggest(key, candidates, 3) {
        Some(s) => format!("unknown field {level}(did you mean \"{s}\"?)"),
        None => format!("unknown field {level}"),
    };
    Diagnostic::new(Severity::Error, "unknown-field", path, message.trim())
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    fn toml(raw: &str) -> ValidationResult {
        validate_str(raw, Path::new("lockbox.toml"))
    }

    #[test]
    fn defaults_are_clean() {
        let result = validate(&LockboxConfig::default());
        assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
    }

    #[test]
    fn empty_file_is_clean() {
        assert!(toml("").diagnostics.is_empty());
        assert!(
            validate_str("{}", Path::new("lockbox.json"))
                .diagnostics
                .is_empty()
        );
    }

    #[rstest]
    #[case("[session]\ntimeout_secs = 0\n", "session.timeout_secs", Severity::Error)]
    #[case("[session]\ntimeout_secs = 604800\n", "session.timeout_secs", Severity::Warning)]
    #[case("[kdf]\nt_cost = 0\n", "kdf.t_cost", Severity::Error)]
    #[case("[kdf]\np_cost = 0\n", "kdf.p_cost", Severity::Error)]
    #[case("[kdf]\nm_cost = 16\np_cost = 4\n", "kdf.m_cost", Severity::Error)]
    #[case("[kdf]\nm_cost = 4096\n", "kdf.m_cost", Severity::Warning)]
    #[case("[storage]\ndatabase = \"lockbox.db\"\n", "storage.database", Severity::Warning)]
    #[case("[storage]\ndatabase = \"\"\n", "storage.database", Severity::Error)]
    fn semantic_diagnostics(#[case] raw: &str, #[case] path: &str, #[case] severity: Severity) {
        let result = toml(raw);
        assert_eq!(result.diagnostics.len(), 1, "{:?}", result.diagnostics);
        assert_eq!(result.diagnostics[0].path, path);
        assert_eq!(result.diagnostics[0].severity, severity);
        assert_eq!(result.has_errors(), severity == Severity::Error);
    }

    #[test]
    fn misspelled_field_gets_suggestion() {
        let result = toml("[session]\ntimeout_sec = 60\n");
        assert_eq!(result.count(Severity::Error), 1);
        let d = &result.diagnostics[0];
        assert_eq!(d.category, "unknown-field");
        assert_eq!(d.path, "session.timeout_sec");
        assert!(d.message.contains("timeout_secs"));
    }

    #[test]
    fn unknown_section_at_top_level() {
        let result = toml("[sesion]\ntimeout_secs = 60\n");
        let d = &result.diagnostics[0];
        assert_eq!(d.path, "sesion");
        assert!(d.message.contains("at top level"));
        assert!(d.message.contains("\"session\""));
    }

    #[test]
    fn syntax_error() {
        let result = toml("[session\n");
        assert!(result.has_errors());
        assert_eq!(result.diagnostics[0].category, "syntax");
    }

    #[test]
    fn type_error() {
        let result = toml("[session]\ntimeout_secs = \"soon\"\n");
        assert_eq!(result.diagnostics[0].category, "type-error");
    }

    #[test]
    fn json_and_yaml_checked_too() {
        let json = validate_str(r#"{"kdf": {"m_cots": 1}}"#, Path::new("lockbox.json"));
        assert_eq!(json.diagnostics[0].path, "kdf.m_cots");
        let yaml = validate_str("session:\n  timeout_secs: 0\n", Path::new("lockbox.yml"));
        assert!(yaml.has_errors());
    }

    #[test]
    fn validate_file_reads_and_records_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lockbox.toml");
        std::fs::write(&path, "[kdf]\nt_cost = 0\n").unwrap();
        let result = validate_file(Some(&path));
        assert_eq!(result.config_path.as_deref(), Some(path.as_path()));
        assert!(result.has_errors());
    }

    #[test]
    fn validate_file_missing_is_error() {
        let result = validate_file(Some(Path::new("/nonexistent/lockbox.toml")));
        assert!(result.has_errors());
    }

    #[rstest]
    #[case("kitten", "sitting", 3)]
    #[case("", "abc", 3)]
    #[case("m_cost", "m_cost", 0)]
    fn levenshtein_distance(#[case] a: &str, #[case] b: &str, #[case] expected: usize) {
        assert_eq!(levenshtein(a, b), expected);
    }
}
