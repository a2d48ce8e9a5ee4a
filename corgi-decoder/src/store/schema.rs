//! Dataset file schema and row conversion
//!
//! The SQLite and query-service backends issue the same statements and turn
//! rows into the same types through the helpers here.

use rusqlite::{Connection, Row};
use serde_json::{Map, Value};

use crate::patterns::rule::PatternRule;
use crate::store::{DatasetInfo, WmiRecord};

/// Dataset schema, usable to build datasets and test fixtures
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS wmi (
    code TEXT NOT NULL,
    extension TEXT,                 -- positions 12-14 prefix, NULL for plain records
    manufacturer TEXT NOT NULL,
    make TEXT NOT NULL,
    country TEXT,
    region TEXT,
    vehicle_type TEXT
);

CREATE TABLE IF NOT EXISTS pattern_rules (
    id INTEGER PRIMARY KEY,         -- insertion order, last tie-break
    wmi TEXT NOT NULL,
    element TEXT NOT NULL,
    pattern TEXT NOT NULL,
    value TEXT NOT NULL,
    value_id TEXT,
    priority INTEGER NOT NULL DEFAULT 0,
    year_from INTEGER,
    year_to INTEGER
);

CREATE INDEX IF NOT EXISTS idx_wmi_code ON wmi (code);
CREATE INDEX IF NOT EXISTS idx_rules_wmi ON pattern_rules (wmi);
"#;

pub(crate) const SELECT_META: &str = "SELECT key, value FROM meta";

pub(crate) const SELECT_WMI: &str = "SELECT code, extension, manufacturer, make, country, region, vehicle_type \
     FROM wmi WHERE code = ?1";

pub(crate) const SELECT_ALL_WMI: &str =
    "SELECT code, extension, manufacturer, make, country, region, vehicle_type FROM wmi";

pub(crate) const SELECT_RULES: &str = "SELECT id, wmi, element, pattern, value, value_id, priority, year_from, year_to \
     FROM pattern_rules WHERE wmi = ?1 ORDER BY id";

pub(crate) const SELECT_ALL_RULES: &str = "SELECT id, wmi, element, pattern, value, value_id, priority, year_from, year_to \
     FROM pattern_rules ORDER BY id";

/// A `pattern_rules` row before its pattern is parsed
#[derive(Debug, Clone)]
pub(crate) struct RuleRow {
    pub id: i64,
    pub wmi: String,
    pub element: String,
    pub pattern: String,
    pub value: String,
    pub value_id: Option<String>,
    pub priority: i32,
    pub year_from: Option<u16>,
    pub year_to: Option<u16>,
}

impl RuleRow {
    /// Parse the pattern; malformed rows are skipped with a warning
    pub fn into_rule(self) -> Option<PatternRule> {
        match PatternRule::new(self.id, self.wmi, self.element, &self.pattern, self.value) {
            Ok(rule) => {
                let mut rule = rule
                    .with_priority(self.priority)
                    .with_years(self.year_from, self.year_to);
                rule.value_id = self.value_id;
                Some(rule)
            }
            Err(e) => {
                log::warn!("Skipping rule {}: {}", self.id, e);
                None
            }
        }
    }
}

pub(crate) fn wmi_from_row(row: &Row<'_>) -> rusqlite::Result<WmiRecord> {
    Ok(WmiRecord {
        code: row.get(0)?,
        extension: row.get(1)?,
        manufacturer: row.get(2)?,
        make: row.get(3)?,
        country: row.get(4)?,
        region: row.get(5)?,
        vehicle_type: row.get(6)?,
    })
}

pub(crate) fn rule_from_row(row: &Row<'_>) -> rusqlite::Result<RuleRow> {
    Ok(RuleRow {
        id: row.get(0)?,
        wmi: row.get(1)?,
        element: row.get(2)?,
        pattern: row.get(3)?,
        value: row.get(4)?,
        value_id: row.get(5)?,
        priority: row.get(6)?,
        year_from: row.get(7)?,
        year_to: row.get(8)?,
    })
}

/// Read the `meta` table
pub(crate) fn read_info(conn: &Connection) -> rusqlite::Result<DatasetInfo> {
    let mut stmt = conn.prepare(SELECT_META)?;
    let pairs = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(info_from_pairs(pairs))
}

/// Load the whole dataset
pub(crate) fn load_all(conn: &Connection) -> rusqlite::Result<(Vec<WmiRecord>, Vec<PatternRule>)> {
    let mut stmt = conn.prepare(SELECT_ALL_WMI)?;
    let wmis = stmt
        .query_map([], wmi_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut stmt = conn.prepare(SELECT_ALL_RULES)?;
    let rules = stmt
        .query_map([], rule_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?
        .into_iter()
        .filter_map(RuleRow::into_rule)
        .collect();

    Ok((wmis, rules))
}

pub(crate) fn info_from_pairs(pairs: impl IntoIterator<Item = (String, String)>) -> DatasetInfo {
    let mut info = DatasetInfo::default();
    for (key, value) in pairs {
        match key.as_str() {
            "schema_version" => info.schema_version = Some(value),
            "vintage" => info.vintage = Some(value),
            _ => {}
        }
    }
    info
}

fn json_string(row: &Map<String, Value>, column: &str) -> Result<String, String> {
    json_opt_string(row, column)?.ok_or_else(|| format!("missing column '{}'", column))
}

fn json_opt_string(row: &Map<String, Value>, column: &str) -> Result<Option<String>, String> {
    match row.get(column) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(format!("column '{}' has unexpected value {}", column, other)),
    }
}

fn json_opt_i64(row: &Map<String, Value>, column: &str) -> Result<Option<i64>, String> {
    match row.get(column) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_i64()
            .map(Some)
            .ok_or_else(|| format!("column '{}' is not an integer", column)),
        Some(Value::String(s)) => s
            .parse()
            .map(Some)
            .map_err(|_| format!("column '{}' is not an integer", column)),
        Some(other) => Err(format!("column '{}' has unexpected value {}", column, other)),
    }
}

fn json_opt_year(row: &Map<String, Value>, column: &str) -> Result<Option<u16>, String> {
    json_opt_i64(row, column)?
        .map(|v| u16::try_from(v).map_err(|_| format!("column '{}' is out of range", column)))
        .transpose()
}

pub(crate) fn wmi_from_json(row: &Map<String, Value>) -> Result<WmiRecord, String> {
    Ok(WmiRecord {
        code: json_string(row, "code")?,
        extension: json_opt_string(row, "extension")?,
        manufacturer: json_string(row, "manufacturer")?,
        make: json_string(row, "make")?,
        country: json_opt_string(row, "country")?,
        region: json_opt_string(row, "region")?,
        vehicle_type: json_opt_string(row, "vehicle_type")?,
    })
}

pub(crate) fn rule_from_json(row: &Map<String, Value>) -> Result<RuleRow, String> {
    let priority = json_opt_i64(row, "priority")?.unwrap_or(0);
    Ok(RuleRow {
        id: json_opt_i64(row, "id")?.ok_or_else(|| "missing column 'id'".to_string())?,
        wmi: json_string(row, "wmi")?,
        element: json_string(row, "element")?,
        pattern: json_string(row, "pattern")?,
        value: json_string(row, "value")?,
        value_id: json_opt_string(row, "value_id")?,
        priority: i32::try_from(priority).map_err(|_| "column 'priority' is out of range".to_string())?,
        year_from: json_opt_year(row, "year_from")?,
        year_to: json_opt_year(row, "year_to")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_schema_and_row_conversion() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA).unwrap();
        conn.execute_batch(
            "INSERT INTO meta VALUES ('schema_version', '2'), ('vintage', '2025-06');
             INSERT INTO wmi VALUES ('KM8', NULL, 'Hyundai Motor Co', 'Hyundai', 'South Korea', 'Asia', 'MPV');
             INSERT INTO pattern_rules VALUES (1, 'KM8', 'model', 'K2C', 'Kona', '1234', 0, 2018, NULL);
             INSERT INTO pattern_rules VALUES (2, 'KM8', 'model', 'K[2', 'Broken', NULL, 0, NULL, NULL);",
        )
        .unwrap();

        let info = read_info(&conn).unwrap();
        assert_eq!(info.schema_version.as_deref(), Some("2"));
        assert_eq!(info.vintage.as_deref(), Some("2025-06"));

        let (wmis, rules) = load_all(&conn).unwrap();
        assert_eq!(wmis.len(), 1);
        assert_eq!(wmis[0].vehicle_type.as_deref(), Some("MPV"));
        // The malformed pattern is skipped
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].value_id.as_deref(), Some("1234"));
        assert_eq!(rules[0].year_from, Some(2018));
    }

    #[test]
    fn test_json_rows() {
        let row = json!({
            "id": 7, "wmi": "KM8", "element": "model", "pattern": "K2C",
            "value": "Kona", "value_id": null, "priority": "2", "year_from": 2018, "year_to": null
        });
        let rule = rule_from_json(row.as_object().unwrap()).unwrap().into_rule().unwrap();
        assert_eq!(rule.id, 7);
        assert_eq!(rule.priority, 2);
        assert_eq!(rule.year_from, Some(2018));

        let row = json!({ "code": "KM8", "manufacturer": "Hyundai Motor Co" });
        assert!(wmi_from_json(row.as_object().unwrap()).is_err());
    }
}
