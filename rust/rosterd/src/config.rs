use anyhow::Context;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::db;
use crate::roster::IdFormat;

pub const ROSTER_SETTINGS_KEY: &str = "setup.roster";
pub const EXAM_BANK_SETTINGS_KEY: &str = "setup.examBank";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RosterSettings {
    pub storage_key: String,
    pub id_separator: String,
    pub display_id_prefix: String,
    pub display_id_digits: u32,
    pub release_exam_slots_on_remove: bool,
    pub max_write_attempts: u32,
}

impl Default for RosterSettings {
    fn default() -> Self {
        Self {
            storage_key: "classLists".to_string(),
            id_separator: "_".to_string(),
            display_id_prefix: "STU".to_string(),
            display_id_digits: 4,
            release_exam_slots_on_remove: true,
            max_write_attempts: 3,
        }
    }
}

impl RosterSettings {
    pub fn id_format(&self) -> IdFormat {
        IdFormat {
            separator: self.id_separator.clone(),
            display_prefix: self.display_id_prefix.clone(),
            display_digits: self.display_id_digits as usize,
        }
    }

    pub fn apply_patch(&mut self, patch: &Map<String, Value>) -> Result<(), String> {
        for (k, v) in patch {
            match k.as_str() {
                "storageKey" => {
                    let s = parse_string_max(v, k, 64)?;
                    if s.is_empty() {
                        return Err("storageKey must not be empty".into());
                    }
                    self.storage_key = s;
                }
                "idSeparator" => {
                    // Whitespace is a legal separator; only length is bounded.
                    let s = v
                        .as_str()
                        .ok_or_else(|| format!("{} must be string", k))?;
                    if s.len() > 4 {
                        return Err(format!("{} length must be <= 4", k));
                    }
                    self.id_separator = s.to_string();
                }
                "displayIdPrefix" => {
                    self.display_id_prefix = parse_string_max(v, k, 8)?;
                }
                "displayIdDigits" => {
                    self.display_id_digits = parse_u32_range(v, k, 1, 12)?;
                }
                "releaseExamSlotsOnRemove" => {
                    self.release_exam_slots_on_remove = parse_bool(v, k)?;
                }
                "maxWriteAttempts" => {
                    self.max_write_attempts = parse_u32_range(v, k, 1, 10)?;
                }
                _ => return Err(format!("unknown roster field: {}", k)),
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExamBankSettings {
    pub terms: u32,
    pub components: Vec<String>,
}

impl Default for ExamBankSettings {
    fn default() -> Self {
        Self {
            terms: 3,
            components: vec![
                "firstTest".to_string(),
                "secondTest".to_string(),
                "exam".to_string(),
            ],
        }
    }
}

impl ExamBankSettings {
    pub fn apply_patch(&mut self, patch: &Map<String, Value>) -> Result<(), String> {
        for (k, v) in patch {
            match k.as_str() {
                "terms" => {
                    self.terms = parse_u32_range(v, k, 1, 4)?;
                }
                "components" => {
                    let arr = v
                        .as_array()
                        .ok_or_else(|| format!("{} must be an array", k))?;
                    if arr.is_empty() || arr.len() > 8 {
                        return Err(format!("{} must have 1..=8 entries", k));
                    }
                    let mut out: Vec<String> = Vec::with_capacity(arr.len());
                    for item in arr {
                        let s = parse_string_max(item, "components[]", 24)?;
                        if s.is_empty() {
                            return Err("components[] must not be empty".into());
                        }
                        if out.contains(&s) {
                            return Err(format!("duplicate component: {}", s));
                        }
                        out.push(s);
                    }
                    self.components = out;
                }
                _ => return Err(format!("unknown examBank field: {}", k)),
            }
        }
        Ok(())
    }
}

fn parse_bool(v: &Value, key: &str) -> Result<bool, String> {
    v.as_bool()
        .ok_or_else(|| format!("{} must be boolean", key))
}

fn parse_u32_range(v: &Value, key: &str, min: u32, max: u32) -> Result<u32, String> {
    let n = v
        .as_u64()
        .ok_or_else(|| format!("{} must be a non-negative integer", key))?;
    if !(u64::from(min)..=u64::from(max)).contains(&n) {
        return Err(format!("{} must be in {}..={}", key, min, max));
    }
    Ok(n as u32)
}

fn parse_string_max(v: &Value, key: &str, max_len: usize) -> Result<String, String> {
    let s = v.as_str().ok_or_else(|| format!("{} must be string", key))?;
    let s = s.trim();
    if s.len() > max_len {
        return Err(format!("{} length must be <= {}", key, max_len));
    }
    Ok(s.to_string())
}

/// Applies a saved section one field at a time over the defaults. A bad
/// historical field is skipped on its own and must not lock the roster.
fn merge_saved(
    key: &str,
    saved: Option<Value>,
    mut apply: impl FnMut(&Map<String, Value>) -> Result<(), String>,
) {
    let Some(Value::Object(fields)) = saved else {
        return;
    };
    for (field, value) in fields {
        let mut one = Map::new();
        one.insert(field.clone(), value);
        if let Err(msg) = apply(&one) {
            tracing::warn!(key, %field, %msg, "ignoring invalid saved setting");
        }
    }
}

pub fn load_roster_settings(conn: &Connection) -> anyhow::Result<RosterSettings> {
    let mut current = RosterSettings::default();
    let saved = db::settings_get_json(conn, ROSTER_SETTINGS_KEY)?;
    merge_saved(ROSTER_SETTINGS_KEY, saved, |one| current.apply_patch(one));
    Ok(current)
}

pub fn load_exam_bank_settings(conn: &Connection) -> anyhow::Result<ExamBankSettings> {
    let mut current = ExamBankSettings::default();
    let saved = db::settings_get_json(conn, EXAM_BANK_SETTINGS_KEY)?;
    merge_saved(EXAM_BANK_SETTINGS_KEY, saved, |one| current.apply_patch(one));
    Ok(current)
}

pub fn save_roster_settings(conn: &Connection, settings: &RosterSettings) -> anyhow::Result<()> {
    let value = serde_json::to_value(settings).context("failed to serialize roster settings")?;
    db::settings_set_json(conn, ROSTER_SETTINGS_KEY, &value)
}

pub fn save_exam_bank_settings(
    conn: &Connection,
    settings: &ExamBankSettings,
) -> anyhow::Result<()> {
    let value =
        serde_json::to_value(settings).context("failed to serialize exam bank settings")?;
    db::settings_set_json(conn, EXAM_BANK_SETTINGS_KEY, &value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(v: Value) -> Map<String, Value> {
        v.as_object().cloned().expect("object")
    }

    #[test]
    fn roster_patch_validates_ranges() {
        let mut s = RosterSettings::default();
        s.apply_patch(&obj(json!({ "displayIdDigits": 6, "maxWriteAttempts": 5 })))
            .expect("valid patch");
        assert_eq!(s.display_id_digits, 6);
        assert_eq!(s.max_write_attempts, 5);

        let e = s
            .apply_patch(&obj(json!({ "displayIdDigits": 0 })))
            .expect_err("out of range");
        assert!(e.contains("displayIdDigits"));
        assert!(s.apply_patch(&obj(json!({ "storageKey": "  " }))).is_err());
        assert!(s.apply_patch(&obj(json!({ "nope": 1 }))).is_err());
    }

    #[test]
    fn exam_bank_patch_rejects_duplicate_components() {
        let mut s = ExamBankSettings::default();
        let e = s
            .apply_patch(&obj(json!({ "components": ["exam", "exam"] })))
            .expect_err("duplicate");
        assert!(e.contains("duplicate"));
        s.apply_patch(&obj(json!({ "terms": 2, "components": ["ca", "exam"] })))
            .expect("valid");
        assert_eq!(s.terms, 2);
        assert_eq!(s.components, vec!["ca".to_string(), "exam".to_string()]);
    }

    #[test]
    fn saved_settings_merge_over_defaults() {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        db::create_schema(&conn).expect("schema");

        assert_eq!(
            load_roster_settings(&conn).expect("load"),
            RosterSettings::default()
        );

        let mut s = RosterSettings::default();
        s.display_id_prefix = "PUP".into();
        save_roster_settings(&conn, &s).expect("save");
        assert_eq!(load_roster_settings(&conn).expect("load").display_id_prefix, "PUP");

        // Garbage in the saved row falls back to defaults rather than failing.
        db::settings_set_json(&conn, ROSTER_SETTINGS_KEY, &json!({ "maxWriteAttempts": 99 }))
            .expect("save raw");
        assert_eq!(load_roster_settings(&conn).expect("load").max_write_attempts, 3);
    }

    #[test]
    fn one_bad_saved_field_does_not_drop_the_others() {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        db::create_schema(&conn).expect("schema");

        // Fields load in key order, so the bad one comes first here.
        db::settings_set_json(
            &conn,
            ROSTER_SETTINGS_KEY,
            &json!({
                "displayIdDigits": 0,
                "displayIdPrefix": "PUP",
                "maxWriteAttempts": 5
            }),
        )
        .expect("save raw");
        let roster = load_roster_settings(&conn).expect("load");
        assert_eq!(roster.display_id_digits, 4);
        assert_eq!(roster.display_id_prefix, "PUP");
        assert_eq!(roster.max_write_attempts, 5);

        db::settings_set_json(
            &conn,
            EXAM_BANK_SETTINGS_KEY,
            &json!({ "components": [], "terms": 2 }),
        )
        .expect("save raw");
        let bank = load_exam_bank_settings(&conn).expect("load");
        assert_eq!(bank.terms, 2);
        assert_eq!(bank.components, ExamBankSettings::default().components);
    }
}
