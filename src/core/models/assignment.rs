//! Legacy "assignment" documents and their conversion into job specs.

use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::Value;

use super::{JobSpec, Params, Task};

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConversionError {
    #[error("subtask {index}: adapterType is required")]
    MissingAdapterType { index: usize },
    #[error("subtask {index}: adapterParams must be a JSON object, got {found}")]
    ParamsNotObject { index: usize, found: String },
    #[error("schedule.endAt is not a valid time: {0}")]
    InvalidEndAt(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssignmentSpec {
    pub assignment: Assignment,
    #[serde(default)]
    pub schedule: Option<Schedule>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Assignment {
    #[serde(default)]
    pub subtasks: Vec<Subtask>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subtask {
    #[serde(default)]
    pub adapter_type: Option<String>,
    #[serde(default = "empty_params")]
    pub adapter_params: Value,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    /// Unix seconds (string or number) or an RFC 3339 timestamp.
    #[serde(default)]
    pub end_at: Option<Value>,
}

fn empty_params() -> Value {
    Value::Object(serde_json::Map::new())
}

impl AssignmentSpec {
    /// Builds an unsaved job spec with one task per subtask, in order.
    pub fn convert_to_job_spec(&self) -> Result<JobSpec, ConversionError> {
        let mut spec = JobSpec::new();
        spec.tasks = self
            .assignment
            .subtasks
            .iter()
            .enumerate()
            .map(|(index, subtask)| subtask.to_task(index))
            .collect::<Result<_, _>>()?;

        if let Some(end_at) = self.schedule.as_ref().and_then(|s| s.end_at.as_ref()) {
            spec.end_at = parse_end_at(end_at)?;
        }
        Ok(spec)
    }
}

impl Subtask {
    fn to_task(&self, index: usize) -> Result<Task, ConversionError> {
        let adapter_type = self
            .adapter_type
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(ConversionError::MissingAdapterType { index })?;

        let params = Params::try_from(self.adapter_params.clone()).map_err(|found| {
            ConversionError::ParamsNotObject {
                index,
                found: found.to_string(),
            }
        })?;

        Ok(Task::new(adapter_type, params))
    }
}

fn parse_end_at(value: &Value) -> Result<Option<DateTime<Utc>>, ConversionError> {
    let invalid = || ConversionError::InvalidEndAt(value.to_string());
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => n
            .as_i64()
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
            .map(Some)
            .ok_or_else(invalid),
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(s) => {
            let s = s.trim();
            if let Ok(secs) = s.parse::<i64>() {
                return Utc
                    .timestamp_opt(secs, 0)
                    .single()
                    .map(Some)
                    .ok_or_else(invalid);
            }
            DateTime::parse_from_rfc3339(s)
                .map(|t| Some(t.with_timezone(&Utc)))
                .map_err(|_| invalid())
        }
        _ => Err(invalid()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(input: Value) -> AssignmentSpec {
        serde_json::from_value(input).expect("assignment should parse")
    }

    #[test]
    fn converts_basic_assignment() {
        let a = parse(json!({
            "assignment": {"subtasks": [{"adapterType": "noOp", "adapterParams": {"foo": "bar"}}]}
        }));
        let spec = a.convert_to_job_spec().unwrap();

        assert!(!spec.is_persisted());
        assert_eq!(spec.tasks.len(), 1);
        assert_eq!(spec.tasks[0].r#type, "noop");
        assert_eq!(
            serde_json::to_value(&spec.tasks[0].params).unwrap(),
            json!({"foo": "bar"})
        );
        assert_eq!(
            serde_json::to_value(&spec.tasks).unwrap(),
            json!([{"type": "noop", "foo": "bar"}])
        );
    }

    #[test]
    fn preserves_subtask_order_and_params() {
        let a = parse(json!({
            "assignment": {"subtasks": [
                {"adapterType": "HttpGet", "adapterParams": {"url": "https://example.com", "nested": {"a": [1, 2]}}},
                {"adapterType": "JsonParse", "adapterParams": {"path": ["last"]}},
                {"adapterType": "ethUint256"}
            ]}
        }));
        let spec = a.convert_to_job_spec().unwrap();

        let types: Vec<_> = spec.tasks.iter().map(|t| t.r#type.as_str()).collect();
        assert_eq!(types, ["httpget", "jsonparse", "ethuint256"]);

        let padded = parse(json!({"assignment": {"subtasks": [{"adapterType": " NoOp "}]}}));
        assert_eq!(padded.convert_to_job_spec().unwrap().tasks[0].r#type, "noop");
        assert_eq!(
            serde_json::to_value(&spec.tasks[0].params).unwrap()["nested"],
            json!({"a": [1, 2]})
        );
        assert_eq!(spec.tasks[2].params, Params::default());
    }

    #[test]
    fn empty_subtasks_yield_empty_spec() {
        let spec = parse(json!({"assignment": {"subtasks": []}}))
            .convert_to_job_spec()
            .unwrap();
        assert!(spec.tasks.is_empty());

        let spec = parse(json!({"assignment": {}})).convert_to_job_spec().unwrap();
        assert!(spec.tasks.is_empty());
    }

    #[test]
    fn missing_or_blank_adapter_type_fails() {
        let a = parse(json!({
            "assignment": {"subtasks": [{"adapterType": "noop"}, {"adapterParams": {}}]}
        }));
        assert_eq!(
            a.convert_to_job_spec().unwrap_err(),
            ConversionError::MissingAdapterType { index: 1 }
        );

        let a = parse(json!({"assignment": {"subtasks": [{"adapterType": "  "}]}}));
        assert_eq!(
            a.convert_to_job_spec().unwrap_err(),
            ConversionError::MissingAdapterType { index: 0 }
        );
    }

    #[test]
    fn non_object_params_fail() {
        for bad in [json!([1, 2]), json!("text"), json!(null), json!(3)] {
            let a = parse(json!({
                "assignment": {"subtasks": [{"adapterType": "noop", "adapterParams": bad}]}
            }));
            assert!(matches!(
                a.convert_to_job_spec(),
                Err(ConversionError::ParamsNotObject { index: 0, .. })
            ));
        }
    }

    #[test]
    fn schedule_end_at_accepts_unix_and_rfc3339() {
        let a = parse(json!({
            "assignment": {"subtasks": []},
            "schedule": {"endAt": "1700000000"}
        }));
        let spec = a.convert_to_job_spec().unwrap();
        assert_eq!(spec.end_at.unwrap().timestamp(), 1_700_000_000);

        let a = parse(json!({
            "assignment": {"subtasks": []},
            "schedule": {"endAt": "2023-11-14T22:13:20Z"}
        }));
        let spec = a.convert_to_job_spec().unwrap();
        assert_eq!(spec.end_at.unwrap().timestamp(), 1_700_000_000);

        let a = parse(json!({
            "assignment": {"subtasks": []},
            "schedule": {"endAt": "next tuesday"}
        }));
        assert!(matches!(
            a.convert_to_job_spec(),
            Err(ConversionError::InvalidEndAt(_))
        ));
    }
}
