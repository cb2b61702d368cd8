//! Content file loading and validation.
//!
//! A content directory holds JSON files, each describing named templates
//! with their schedule, priority, and timing constraints. Files are
//! validated wholesale before producing any entries so a bad file never
//! contributes half its templates. A bad file disables only itself.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::{error, info};

use flap_board::{Format, Truncation, VariableMap};

#[derive(Error, Debug)]
pub enum ContentError {
    #[error("{file}: {source}")]
    Parse {
        file: String,
        source: serde_json::Error,
    },

    #[error("{template}: priority must be between 0 and 10, got {got}")]
    PriorityOutOfRange { template: String, got: u8 },

    #[error("{template}: schedule.cron must be a five-field expression, got {got:?}")]
    BadCron { template: String, got: String },

    #[error("{template}: must have \"templates\" and/or \"integration\"")]
    NoContent { template: String },

    #[error("reading {file}: {source}")]
    Io {
        file: String,
        source: std::io::Error,
    },
}

#[derive(Debug, Deserialize)]
struct ContentFile {
    #[serde(default)]
    variables: VariableMap,
    templates: HashMap<String, TemplateDef>,
}

#[derive(Debug, Deserialize)]
struct TemplateDef {
    schedule: ScheduleDef,
    priority: u8,
    #[serde(default = "default_public")]
    public: bool,
    #[serde(default)]
    truncation: Truncation,
    #[serde(default)]
    templates: Vec<Format>,
    integration: Option<String>,
}

/// Timing block. `cron` is absent for webhook-triggered templates, which
/// only use hold/timeout.
#[derive(Debug, Deserialize)]
struct ScheduleDef {
    cron: Option<String>,
    hold: u64,
    timeout: u64,
}

fn default_public() -> bool {
    true
}

/// A validated template ready for scheduling or webhook dispatch.
#[derive(Debug, Clone)]
pub struct TemplateEntry {
    /// `<file stem>.<template name>`, unique across the content dir.
    pub id: String,
    pub name: String,
    pub cron: Option<String>,
    pub priority: u8,
    pub hold: Duration,
    pub timeout: Duration,
    pub truncation: Truncation,
    pub formats: Vec<Format>,
    /// Static variables from the file, overridden by provider output.
    pub variables: VariableMap,
    pub integration: Option<String>,
}

fn validate(id: &str, def: &TemplateDef) -> Result<(), ContentError> {
    if def.priority > 10 {
        return Err(ContentError::PriorityOutOfRange {
            template: id.to_string(),
            got: def.priority,
        });
    }
    if let Some(cron) = &def.schedule.cron {
        if cron.split_whitespace().count() != 5 {
            return Err(ContentError::BadCron {
                template: id.to_string(),
                got: cron.clone(),
            });
        }
    }
    if def.templates.is_empty() && def.integration.is_none() {
        return Err(ContentError::NoContent {
            template: id.to_string(),
        });
    }
    Ok(())
}

/// Parse one content file into template entries. `public_only` drops
/// templates not marked public.
pub fn load_file(path: &Path, public_only: bool) -> Result<Vec<TemplateEntry>, ContentError> {
    let file_name = path.display().to_string();
    let raw = std::fs::read_to_string(path).map_err(|e| ContentError::Io {
        file: file_name.clone(),
        source: e,
    })?;
    let content: ContentFile = serde_json::from_str(&raw).map_err(|e| ContentError::Parse {
        file: file_name.clone(),
        source: e,
    })?;

    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    // Validate everything before emitting anything.
    let mut names: Vec<&String> = content.templates.keys().collect();
    names.sort();
    for name in &names {
        validate(&format!("{stem}.{name}"), &content.templates[*name])?;
    }

    let mut entries = Vec::new();
    for name in names {
        let def = &content.templates[name];
        if public_only && !def.public {
            continue;
        }
        entries.push(TemplateEntry {
            id: format!("{stem}.{name}"),
            name: name.clone(),
            cron: def.schedule.cron.clone(),
            priority: def.priority,
            hold: Duration::from_secs(def.schedule.hold),
            timeout: Duration::from_secs(def.schedule.timeout),
            truncation: def.truncation,
            formats: def.templates.clone(),
            variables: content.variables.clone(),
            integration: def.integration.clone(),
        });
    }
    Ok(entries)
}

/// Load every `*.json` in the content directory, in name order. A file that
/// fails to parse or validate is logged and skipped; the rest still load.
pub fn load_dir(dir: &Path, public_only: bool) -> Vec<TemplateEntry> {
    let mut paths: Vec<_> = match std::fs::read_dir(dir) {
        Ok(rd) => rd
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .collect(),
        Err(e) => {
            error!(dir = %dir.display(), error = %e, "cannot read content directory");
            return Vec::new();
        }
    };
    paths.sort();

    let mut entries = Vec::new();
    for path in paths {
        match load_file(&path, public_only) {
            Ok(mut file_entries) => {
                info!(
                    file = %path.display(),
                    templates = file_entries.len(),
                    "content loaded"
                );
                entries.append(&mut file_entries);
            }
            Err(e) => error!(error = %e, "skipping content file"),
        }
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn content_json(priority: u8, public: bool, truncation: Option<&str>) -> String {
        let trunc = truncation
            .map(|t| format!(r#""truncation": "{t}","#))
            .unwrap_or_default();
        format!(
            r#"{{
              "variables": {{"greeting": [["HELLO"], ["HI"]]}},
              "templates": {{
                "tmpl": {{
                  "schedule": {{"cron": "0 8 * * 1-5", "hold": 60, "timeout": 60}},
                  "priority": {priority},
                  "public": {public},
                  {trunc}
                  "templates": [{{"format": ["{{greeting}}"]}}]
                }}
              }}
            }}"#
        )
    }

    fn write_file(dir: &TempDir, name: &str, body: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(body.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_load_file_valid() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "test.json", &content_json(5, true, None));
        let entries = load_file(&path, false).unwrap();
        assert_eq!(entries.len(), 1);
        let e = &entries[0];
        assert_eq!(e.id, "test.tmpl");
        assert_eq!(e.priority, 5);
        assert_eq!(e.hold, Duration::from_secs(60));
        assert_eq!(e.cron.as_deref(), Some("0 8 * * 1-5"));
        assert!(e.variables.contains_key("greeting"));
    }

    #[test]
    fn test_priority_out_of_range_rejected() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "bad.json", &content_json(11, true, None));
        assert!(matches!(
            load_file(&path, false),
            Err(ContentError::PriorityOutOfRange { .. })
        ));
    }

    #[test]
    fn test_invalid_truncation_rejected() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "bad.json", &content_json(5, true, Some("bogus")));
        assert!(matches!(load_file(&path, false), Err(ContentError::Parse { .. })));
    }

    #[test]
    fn test_bad_cron_rejected() {
        let dir = TempDir::new().unwrap();
        let body = content_json(5, true, None).replace("0 8 * * 1-5", "0 8 * *");
        let path = write_file(&dir, "bad.json", &body);
        assert!(matches!(load_file(&path, false), Err(ContentError::BadCron { .. })));
    }

    #[test]
    fn test_template_without_content_rejected() {
        let dir = TempDir::new().unwrap();
        let body = r#"{
          "templates": {
            "tmpl": {
              "schedule": {"cron": "0 8 * * *", "hold": 60, "timeout": 60},
              "priority": 5
            }
          }
        }"#;
        let path = write_file(&dir, "bad.json", body);
        assert!(matches!(load_file(&path, false), Err(ContentError::NoContent { .. })));
    }

    #[test]
    fn test_public_mode_filters_private() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "test.json", &content_json(5, false, None));
        assert!(load_file(&path, true).unwrap().is_empty());
        assert_eq!(load_file(&path, false).unwrap().len(), 1);
    }

    #[test]
    fn test_webhook_template_without_cron() {
        let dir = TempDir::new().unwrap();
        let body = r#"{
          "templates": {
            "now_playing": {
              "schedule": {"hold": 0, "timeout": 30},
              "priority": 6,
              "templates": [{"format": ["NOW PLAYING", "{show_name}"]}]
            }
          }
        }"#;
        let path = write_file(&dir, "plex.json", body);
        let entries = load_file(&path, false).unwrap();
        assert_eq!(entries[0].cron, None);
        assert_eq!(entries[0].name, "now_playing");
    }

    #[test]
    fn test_load_dir_skips_broken_file() {
        let dir = TempDir::new().unwrap();
        write_file(&dir, "a.json", &content_json(5, true, None));
        write_file(&dir, "b.json", "{not json");
        write_file(&dir, "ignored.txt", "nope");
        let entries = load_dir(dir.path(), false);
        assert_eq!(entries.len(), 1);
    }
}
