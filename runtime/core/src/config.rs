use std::path::Path;
use std::{fs, path::PathBuf};

use config_validator::schema::{Config, DeviceRecord};
use config_validator::{
    parse_config_str, validate_config, ConfigError, Location, Severity, ValidationIssue,
};
use thiserror::Error;

use crate::binding::BindingGraph;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticSeverity {
    Error,
    Warning,
    Info,
}

impl From<Severity> for DiagnosticSeverity {
    fn from(value: Severity) -> Self {
        match value {
            Severity::Error => DiagnosticSeverity::Error,
            Severity::Warning => DiagnosticSeverity::Warning,
            Severity::Info => DiagnosticSeverity::Info,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub path: String,
    pub message: String,
    pub location: Option<Location>,
    pub severity: DiagnosticSeverity,
}

#[derive(Debug)]
pub struct LoadedConfig {
    pub path: Option<PathBuf>,
    pub config: Config,
    pub diagnostics: Vec<Diagnostic>,
}

impl LoadedConfig {
    pub fn device_records(&self) -> &[DeviceRecord] {
        &self.config.devices
    }

    /// Fresh binding graph with every message handle unset.
    pub fn binding_graph(&self) -> BindingGraph {
        BindingGraph::from_specs(&self.config.collections)
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("I/O error while reading config: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] ConfigError),
    #[error("Validation errors prevented loading")]
    Validation(Vec<Diagnostic>),
}

pub fn load_from_path(path: impl AsRef<Path>) -> Result<LoadedConfig, LoadError> {
    let path_ref = path.as_ref();
    let content = fs::read_to_string(path_ref)?;
    let mut loaded = load_from_str(&content)?;
    loaded.path = Some(path_ref.to_path_buf());
    Ok(loaded)
}

pub fn load_from_str(content: &str) -> Result<LoadedConfig, LoadError> {
    let config = parse_config_str(content)?;
    let diagnostics = convert_issues(validate_config(&config, content));

    if diagnostics
        .iter()
        .any(|diag| diag.severity == DiagnosticSeverity::Error)
    {
        return Err(LoadError::Validation(diagnostics));
    }

    Ok(LoadedConfig {
        path: None,
        config,
        diagnostics,
    })
}

fn convert_issues(issues: Vec<ValidationIssue>) -> Vec<Diagnostic> {
    issues.into_iter().map(convert_issue).collect()
}

fn convert_issue(issue: ValidationIssue) -> Diagnostic {
    Diagnostic {
        path: issue.path,
        message: issue.message,
        location: issue.location,
        severity: DiagnosticSeverity::from(issue.severity),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_devices_and_bindings() {
        let yaml = r#"version: 1
devices:
  - name: Synth
    active: 1
  - name: Pads
    thru: Synth
collections:
  - name: Main
    bindings:
      - name: Scene
        messages:
          - device: Synth
          - device: Pads
"#;
        let loaded = load_from_str(yaml).expect("should load");
        let names: Vec<_> = loaded
            .device_records()
            .iter()
            .map(|r| r.name.as_str())
            .collect();
        assert_eq!(names, vec!["Synth", "Pads"]);
        assert_eq!(loaded.device_records()[1].thru, "Synth");
        assert!(loaded.diagnostics.is_empty());

        let graph = loaded.binding_graph();
        let scene = graph.binding("Scene").expect("binding");
        assert_eq!(scene.messages().len(), 2);
        assert!(graph.messages().all(|m| m.device().is_none()));
    }

    #[test]
    fn warnings_do_not_block_loading() {
        let yaml = r#"version: 1
devices:
  - name: Synth
    active: 9
"#;
        let loaded = load_from_str(yaml).expect("should load");
        assert_eq!(loaded.diagnostics.len(), 1);
        assert_eq!(loaded.diagnostics[0].severity, DiagnosticSeverity::Warning);
    }

    #[test]
    fn invalid_device_errors() {
        let yaml = r#"version: 1
devices:
  - name: ""
"#;
        let err = load_from_str(yaml).unwrap_err();
        match err {
            LoadError::Validation(diags) => {
                assert_eq!(diags.len(), 1);
                assert_eq!(diags[0].severity, DiagnosticSeverity::Error);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn malformed_yaml_is_a_parse_error() {
        let err = load_from_str("version: [").unwrap_err();
        assert!(matches!(err, LoadError::Parse(_)));
    }
}
