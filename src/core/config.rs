/// Environment validation for .env files
///
/// Confirms required secrets are present and not left at their template placeholder.
/// Reading never exports anything into the process environment.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Somewhere secrets can be looked up
pub trait EnvSource: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    /// Human-readable origin for diagnostics
    fn describe(&self) -> String;
}

/// Parsed .env file
#[derive(Debug, Clone)]
pub struct DotEnvFile {
    path: PathBuf,
    values: HashMap<String, String>,
}

impl DotEnvFile {
    /// Load a .env file without touching the process environment
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let iter = dotenv::from_path_iter(&path)
            .with_context(|| format!("Failed to open {}", path.display()))?;

        let mut values = HashMap::new();
        for item in iter {
            let (key, value) = item.with_context(|| format!("Failed to parse {}", path.display()))?;
            values.insert(key, value);
        }

        Ok(Self { path, values })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl EnvSource for DotEnvFile {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// The current process environment
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }

    fn describe(&self) -> String {
        "process environment".to_string()
    }
}

impl EnvSource for HashMap<String, String> {
    fn get(&self, key: &str) -> Option<String> {
        HashMap::get(self, key).cloned()
    }

    fn describe(&self) -> String {
        "in-memory map".to_string()
    }
}

/// First source that has the key wins
#[derive(Default)]
pub struct LayeredEnv {
    layers: Vec<Box<dyn EnvSource>>,
}

impl LayeredEnv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, source: impl EnvSource + 'static) -> Self {
        self.layers.push(Box::new(source));
        self
    }
}

impl EnvSource for LayeredEnv {
    fn get(&self, key: &str) -> Option<String> {
        self.layers.iter().find_map(|layer| layer.get(key))
    }

    fn describe(&self) -> String {
        let names: Vec<String> = self.layers.iter().map(|l| l.describe()).collect();
        names.join(" > ")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvFailureReason {
    Missing,
    Placeholder,
}

impl EnvFailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnvFailureReason::Missing => "missing",
            EnvFailureReason::Placeholder => "placeholder-not-configured",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvFailure {
    pub key: String,
    pub reason: EnvFailureReason,
    pub required: bool,
}

impl fmt::Display for EnvFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.required { "required" } else { "optional" };
        write!(f, "{} ({}): {}", self.key, kind, self.reason.as_str())
    }
}

/// Outcome of one validation pass
#[derive(Debug, Clone, Default)]
pub struct EnvCheck {
    pub ok: bool,
    pub failures: Vec<EnvFailure>,
}

impl EnvCheck {
    pub fn reasons(&self) -> Vec<String> {
        self.failures.iter().map(|f| f.to_string()).collect()
    }
}

/// Keys to validate and the placeholder values that count as unset
#[derive(Debug, Clone, Default)]
pub struct EnvRequirements {
    pub required: Vec<String>,
    pub optional: Vec<String>,
    pub placeholders: Vec<String>,
}

pub struct EnvironmentValidator {
    source: Box<dyn EnvSource>,
    requirements: EnvRequirements,
}

impl EnvironmentValidator {
    pub fn new(source: Box<dyn EnvSource>, requirements: EnvRequirements) -> Self {
        Self { source, requirements }
    }

    pub fn source(&self) -> String {
        self.source.describe()
    }

    /// `ok` is false when any required key fails; optional failures are listed but don't count
    pub fn validate(&self) -> EnvCheck {
        let mut failures = Vec::new();

        let keys = self
            .requirements
            .required
            .iter()
            .map(|k| (k, true))
            .chain(self.requirements.optional.iter().map(|k| (k, false)));

        for (key, required) in keys {
            if let Some(reason) = self.inspect(key) {
                tracing::debug!(key = %key, reason = reason.as_str(), required, "environment key failed");
                failures.push(EnvFailure {
                    key: key.clone(),
                    reason,
                    required,
                });
            }
        }

        let ok = failures.iter().all(|f| !f.required);
        EnvCheck { ok, failures }
    }

    fn inspect(&self, key: &str) -> Option<EnvFailureReason> {
        let value = match self.source.get(key) {
            Some(v) if !v.trim().is_empty() => v,
            _ => return Some(EnvFailureReason::Missing),
        };

        let value = value.trim();
        let is_placeholder = self
            .requirements
            .placeholders
            .iter()
            .any(|p| p.eq_ignore_ascii_case(value));

        is_placeholder.then_some(EnvFailureReason::Placeholder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn requirements(required: &[&str], optional: &[&str]) -> EnvRequirements {
        EnvRequirements {
            required: required.iter().map(|s| s.to_string()).collect(),
            optional: optional.iter().map(|s| s.to_string()).collect(),
            placeholders: vec!["your_huggingface_api_key_here".to_string(), "changeme".to_string()],
        }
    }

    fn map(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_configured_key_passes() {
        let source = map(&[("HUGGINGFACE_API_KEY", "hf_abcdef123456")]);
        let validator = EnvironmentValidator::new(Box::new(source), requirements(&["HUGGINGFACE_API_KEY"], &[]));

        let check = validator.validate();
        assert!(check.ok);
        assert!(check.failures.is_empty());
    }

    #[test]
    fn test_missing_and_placeholder() {
        let source = map(&[("HUGGINGFACE_API_KEY", "your_huggingface_api_key_here"), ("BLANK", "  ")]);
        let validator = EnvironmentValidator::new(
            Box::new(source),
            requirements(&["HUGGINGFACE_API_KEY", "REDIS_URL", "BLANK"], &[]),
        );

        let check = validator.validate();
        assert!(!check.ok);
        assert_eq!(
            check.reasons(),
            vec![
                "HUGGINGFACE_API_KEY (required): placeholder-not-configured",
                "REDIS_URL (required): missing",
                "BLANK (required): missing",
            ]
        );
    }

    #[test]
    fn test_optional_failures_do_not_fail_check() {
        let source = map(&[("HUGGINGFACE_API_KEY", "hf_real")]);
        let validator = EnvironmentValidator::new(
            Box::new(source),
            requirements(&["HUGGINGFACE_API_KEY"], &["SPOONACULAR_API_KEY"]),
        );

        let check = validator.validate();
        assert!(check.ok);
        assert_eq!(check.failures.len(), 1);
        assert!(!check.failures[0].required);
        assert_eq!(check.failures[0].reason, EnvFailureReason::Missing);
    }

    #[test]
    fn test_dotenv_file_is_not_exported() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "# Test configuration").unwrap();
        writeln!(file, "STACKCHECK_TEST_SECRET=\"s3cret\"").unwrap();
        writeln!(file, "HUGGINGFACE_API_KEY=your_huggingface_api_key_here").unwrap();

        let env = DotEnvFile::load(file.path()).unwrap();
        assert_eq!(env.get("STACKCHECK_TEST_SECRET").as_deref(), Some("s3cret"));
        assert_eq!(env.len(), 2);
        assert!(std::env::var("STACKCHECK_TEST_SECRET").is_err());

        let validator = EnvironmentValidator::new(Box::new(env), requirements(&["HUGGINGFACE_API_KEY"], &[]));
        let check = validator.validate();
        assert_eq!(check.failures[0].reason, EnvFailureReason::Placeholder);
    }

    #[test]
    fn test_layered_lookup_prefers_first_layer() {
        let layered = LayeredEnv::new()
            .with(map(&[("API_KEY", "from-file")]))
            .with(map(&[("API_KEY", "from-env"), ("OTHER", "x")]));

        assert_eq!(layered.get("API_KEY").as_deref(), Some("from-file"));
        assert_eq!(layered.get("OTHER").as_deref(), Some("x"));
        assert_eq!(layered.get("NOPE"), None);
    }

    #[test]
    fn test_missing_dotenv_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        assert!(DotEnvFile::load(dir.path().join(".env")).is_err());
    }
}
