use std::collections::HashSet;

use crate::schema::{ACTIVE_MASK, Config};

#[derive(Debug, Clone, Copy)]
pub struct Location {
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone)]
pub struct ValidationIssue {
    pub path: String,
    pub message: String,
    pub location: Option<Location>,
    pub severity: Severity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl ValidationIssue {
    pub fn new(path: String, message: String, severity: Severity) -> Self {
        Self {
            path,
            message,
            location: None,
            severity,
        }
    }
}

pub fn validate_config(config: &Config, source: &str) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    if config.version != 1 {
        issues.push(ValidationIssue::new(
            "version".into(),
            format!("Unsupported schema version {} (expected 1)", config.version),
            Severity::Error,
        ));
    }

    let declared: HashSet<&str> = config
        .devices
        .iter()
        .map(|device| device.name.as_str())
        .filter(|name| !name.trim().is_empty())
        .collect();

    let mut seen = HashSet::new();
    for (idx, device) in config.devices.iter().enumerate() {
        let path = format!("devices[{idx}]");

        if device.name.trim().is_empty() {
            issues.push(ValidationIssue::new(
                format!("{path}.name"),
                "Device name must not be empty".into(),
                Severity::Error,
            ));
            continue;
        }

        if !seen.insert(device.name.as_str()) {
            issues.push(ValidationIssue::new(
                format!("{path}.name"),
                format!(
                    "Duplicate device `{}` will update the earlier entry in place",
                    device.name
                ),
                Severity::Warning,
            ));
        }

        if device.active & !ACTIVE_MASK != 0 {
            issues.push(ValidationIssue::new(
                format!("{path}.active"),
                format!(
                    "Active bitmask {} is outside 0..=3; extra bits are ignored",
                    device.active
                ),
                Severity::Warning,
            ));
        }

        if !device.thru.is_empty() {
            if device.thru == device.name {
                issues.push(ValidationIssue::new(
                    format!("{path}.thru"),
                    format!("Device `{}` routes thru to itself", device.name),
                    Severity::Warning,
                ));
            } else if !declared.contains(device.thru.as_str()) {
                issues.push(ValidationIssue::new(
                    format!("{path}.thru"),
                    format!("Thru target `{}` is not a declared device", device.thru),
                    Severity::Warning,
                ));
            }
        }
    }

    for (c_idx, collection) in config.collections.iter().enumerate() {
        for (b_idx, binding) in collection.bindings.iter().enumerate() {
            let binding_path = format!("collections[{c_idx}].bindings[{b_idx}]");

            if binding.messages.is_empty() {
                issues.push(ValidationIssue::new(
                    format!("{binding_path}.messages"),
                    format!("Binding `{}` has no messages", binding.name),
                    Severity::Warning,
                ));
            }

            for (m_idx, message) in binding.messages.iter().enumerate() {
                if message.device.is_empty() || declared.contains(message.device.as_str()) {
                    continue;
                }
                issues.push(ValidationIssue::new(
                    format!("{binding_path}.messages[{m_idx}].device"),
                    format!(
                        "Device `{}` is not declared; the message stays unresolved until it is added",
                        message.device
                    ),
                    Severity::Info,
                ));
            }
        }
    }

    attach_locations(source, issues)
}

fn attach_locations(source: &str, mut issues: Vec<ValidationIssue>) -> Vec<ValidationIssue> {
    for issue in &mut issues {
        issue.location = find_location(source, &issue.path);
    }
    issues
}

/// Best-effort lookup of the line holding the last path segment's key.
fn find_location(source: &str, path: &str) -> Option<Location> {
    let last = path.split('.').last()?;
    let key = last.split('[').next().unwrap_or(last);
    let needle = format!("{key}:");
    for (idx, line) in source.lines().enumerate() {
        if let Some(column) = line.find(&needle) {
            return Some(Location {
                line: idx + 1,
                column: column + 1,
            });
        }
    }
    None
}
