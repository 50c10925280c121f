use std::fs::{File, OpenOptions};
use std::io::Write;

use chrono::Utc;
use serde_json::{Value, json};
use tracing::warn;

#[derive(Debug)]
pub enum MessageLogMode {
    Full,
    Diffed,
}

/// NDJSON log of wire traffic: outbound requests and long-poll bodies.
/// Diffed mode records only the changed paths of each poll against the
/// previous one, keeping capture files readable on chatty firmware.
#[derive(Debug)]
pub(crate) struct MessageLogger {
    mode: MessageLogMode,
    file: File,
    previous_state: Option<Value>,
}

impl MessageLogger {
    pub fn new(mode: MessageLogMode, path: &str) -> std::io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            mode,
            file,
            previous_state: None,
        })
    }

    pub fn log_request(&mut self, method: &str, path: &str, body: Option<&Value>) {
        let entry = json!({
            "ts": Utc::now().to_rfc3339(),
            "dir": "req",
            "method": method,
            "path": path,
            "body": body,
        });
        self.write_line(&entry);
    }

    pub fn log_poll(&mut self, status: u16, body: &Value) {
        if status == 204 {
            let entry = json!({
                "ts": Utc::now().to_rfc3339(),
                "dir": "poll",
                "status": 204,
            });
            self.write_line(&entry);
            return;
        }

        match self.mode {
            MessageLogMode::Full => {
                let entry = json!({
                    "ts": Utc::now().to_rfc3339(),
                    "dir": "poll",
                    "status": status,
                    "body": body,
                });
                self.write_line(&entry);
            }
            MessageLogMode::Diffed => match &self.previous_state {
                None => {
                    let entry = json!({
                        "ts": Utc::now().to_rfc3339(),
                        "dir": "poll",
                        "status": status,
                        "full": true,
                        "body": body,
                    });
                    self.write_line(&entry);
                    self.previous_state = Some(body.clone());
                }
                Some(prev) => {
                    let mut changes = Vec::new();
                    diff_json(prev, body, "", &mut changes);

                    let change_entries: Vec<Value> = changes
                        .iter()
                        .map(|(path, old, new)| json!({ "path": path, "old": old, "new": new }))
                        .collect();

                    let entry = json!({
                        "ts": Utc::now().to_rfc3339(),
                        "dir": "poll",
                        "status": status,
                        "changes": change_entries,
                    });
                    self.write_line(&entry);
                    self.previous_state = Some(body.clone());
                }
            },
        }
    }

    fn write_line(&mut self, entry: &Value) {
        if let Ok(line) = serde_json::to_string(entry)
            && let Err(e) = writeln!(self.file, "{line}")
        {
            warn!("failed to write log entry: {e}");
        }
    }
}

/// Structural diff between two JSON trees; leaf changes and additions only.
fn diff_json(previous: &Value, current: &Value, path_prefix: &str, changes: &mut Vec<(String, Value, Value)>) {
    match (previous, current) {
        (Value::Object(prev_map), Value::Object(curr_map)) => {
            for (key, curr_val) in curr_map {
                let path = if path_prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{path_prefix}.{key}")
                };
                match prev_map.get(key) {
                    Some(prev_val) => diff_json(prev_val, curr_val, &path, changes),
                    None => {
                        if curr_val.is_object() {
                            diff_json(
                                &Value::Object(serde_json::Map::new()),
                                curr_val,
                                &path,
                                changes,
                            );
                        } else {
                            changes.push((path, Value::Null, curr_val.clone()));
                        }
                    }
                }
            }
        }
        (prev, curr) if prev != curr => {
            changes.push((path_prefix.to_string(), prev.clone(), curr.clone()));
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::NamedTempFile;

    #[test]
    fn log_request_writes_ndjson() {
        let tmp = NamedTempFile::new().unwrap();
        let path = tmp.path().to_str().unwrap();
        let mut logger = MessageLogger::new(MessageLogMode::Full, path).unwrap();
        logger.log_request("POST", "/Messages/Publish", Some(&json!({"Data": {}})));

        let mut contents = String::new();
        std::fs::File::open(path)
            .unwrap()
            .read_to_string(&mut contents)
            .unwrap();
        let line: Value = serde_json::from_str(contents.trim()).unwrap();
        assert_eq!(line["dir"], "req");
        assert_eq!(line["method"], "POST");
        assert_eq!(line["path"], "/Messages/Publish");
        assert!(line["ts"].as_str().is_some());
    }

    #[test]
    fn diffed_mode_logs_full_first_then_changes() {
        let tmp = NamedTempFile::new().unwrap();
        let path = tmp.path().to_str().unwrap();
        let mut logger = MessageLogger::new(MessageLogMode::Diffed, path).unwrap();

        let body1 = json!({"zones": {"0": {"status": {"temperature": 71}}}});
        logger.log_poll(200, &body1);

        let body2 = json!({"zones": {"0": {"status": {"temperature": 72}}}});
        logger.log_poll(200, &body2);

        let mut contents = String::new();
        std::fs::File::open(path)
            .unwrap()
            .read_to_string(&mut contents)
            .unwrap();
        let lines: Vec<Value> = contents
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();

        assert_eq!(lines[0]["full"], true);
        assert!(lines[0]["body"].is_object());
        assert!(lines[1].get("changes").is_some());
        assert!(!lines[1]["changes"].as_array().unwrap().is_empty());
    }

    #[test]
    fn log_poll_204() {
        let tmp = NamedTempFile::new().unwrap();
        let path = tmp.path().to_str().unwrap();
        let mut logger = MessageLogger::new(MessageLogMode::Full, path).unwrap();
        logger.log_poll(204, &json!(null));

        let mut contents = String::new();
        std::fs::File::open(path)
            .unwrap()
            .read_to_string(&mut contents)
            .unwrap();
        let line: Value = serde_json::from_str(contents.trim()).unwrap();
        assert_eq!(line["dir"], "poll");
        assert_eq!(line["status"], 204);
    }

    #[test]
    fn diff_detects_leaf_change_and_addition() {
        let prev = json!({"status": {"temperature": 71.0}});
        let curr = json!({"status": {"temperature": 72.0, "humidity": 45.0}});
        let mut changes = vec![];
        diff_json(&prev, &curr, "", &mut changes);
        assert_eq!(changes.len(), 2);
        assert!(changes.iter().any(|(p, _, _)| p == "status.temperature"));
        assert!(changes.iter().any(|(p, old, _)| p == "status.humidity" && old.is_null()));
    }

    #[test]
    fn diff_ignores_unchanged() {
        let val = json!({"status": {"temperature": 71.0, "humidity": 45.0}});
        let mut changes = vec![];
        diff_json(&val, &val, "", &mut changes);
        assert!(changes.is_empty());
    }
}
