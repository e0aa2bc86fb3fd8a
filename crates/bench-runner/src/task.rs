use crate::error::{BenchError, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::Path;
use walkdir::WalkDir;

/// One benchmark task as read from a task file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    /// Fields the runner does not interpret (ground truth etc).
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl Task {
    pub fn new(id: &str, description: &str) -> Self {
        Self {
            id: id.to_string(),
            name: None,
            description: description.to_string(),
            priority: None,
            extra: serde_json::Map::new(),
        }
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

fn generated_task_id() -> String {
    format!("task-{}", Utc::now().timestamp_millis())
}

pub fn parse_task(raw: &str) -> std::result::Result<Task, String> {
    let mut value: Value = serde_json::from_str(raw).map_err(|e| e.to_string())?;
    let obj = value
        .as_object_mut()
        .ok_or_else(|| "task file must contain a JSON object".to_string())?;
    let has_id = obj
        .get("id")
        .and_then(|v| v.as_str())
        .map(|s| !s.trim().is_empty())
        .unwrap_or(false);
    if !has_id {
        obj.insert("id".to_string(), Value::String(generated_task_id()));
    }
    serde_json::from_value(value).map_err(|e| e.to_string())
}

pub fn load_task(path: &Path) -> Result<Task> {
    let raw = fs::read_to_string(path).map_err(|e| BenchError::TaskLoad {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    parse_task(&raw).map_err(|message| BenchError::TaskLoad {
        path: path.to_path_buf(),
        message,
    })
}

/// The `*.json` files directly inside `dir`, ordered by file name.
pub fn task_files(dir: &Path) -> Result<Vec<std::path::PathBuf>> {
    if !dir.is_dir() {
        return Err(BenchError::TaskLoad {
            path: dir.to_path_buf(),
            message: "task directory not found".to_string(),
        });
    }
    let mut files = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|e| BenchError::Other(e.into()))?;
        let is_json = entry.path().extension().and_then(|s| s.to_str()) == Some("json");
        if entry.file_type().is_file() && is_json {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_without_id_gets_generated_one() {
        let task = parse_task(r#"{"name": "Add login", "description": "wire it up"}"#)
            .expect("parse");
        assert!(task.id.starts_with("task-"));
        assert_eq!(task.display_name(), "Add login");
        assert_eq!(task.description, "wire it up");
    }

    #[test]
    fn unknown_fields_are_kept() {
        let task = parse_task(
            r#"{"id": "t1", "description": "d", "priority": "high", "expected_files": ["a.ts"]}"#,
        )
        .expect("parse");
        assert_eq!(task.id, "t1");
        assert_eq!(task.priority.as_deref(), Some("high"));
        assert!(task.extra.contains_key("expected_files"));
        let back = serde_json::to_value(&task).expect("serialize");
        assert_eq!(back["expected_files"][0], "a.ts");
    }

    #[test]
    fn non_object_task_is_rejected() {
        assert!(parse_task("[1, 2]").is_err());
        assert!(parse_task("not json").is_err());
    }

    #[test]
    fn task_files_are_sorted_json_only() {
        let dir = tempfile::tempdir().expect("tempdir");
        for name in ["b.json", "a.json", "notes.md", "c.json"] {
            fs::write(dir.path().join(name), "{}").expect("write");
        }
        fs::create_dir(dir.path().join("nested.json")).expect("mkdir");
        let names: Vec<String> = task_files(dir.path())
            .expect("list")
            .iter()
            .map(|p| p.file_name().expect("name").to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.json", "b.json", "c.json"]);
    }

    #[test]
    fn missing_task_file_is_a_task_load_error() {
        let err = load_task(Path::new("/nonexistent/task.json")).expect_err("missing");
        assert!(matches!(err, BenchError::TaskLoad { .. }));
    }
}
