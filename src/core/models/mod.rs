pub mod assignment;

use chrono::{DateTime, SubsecRound, Utc};
use serde::de::{self, Deserializer};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Current time truncated to the precision the store keeps.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Adapter parameters of a task: always a JSON object, compared structurally.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Params(Map<String, Value>);

impl Params {
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }
}

impl From<Map<String, Value>> for Params {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl TryFrom<Value> for Params {
    type Error = Value;

    /// Hands the value back when it is not an object.
    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(other),
        }
    }
}

/// One adapter invocation in a job pipeline.
///
/// On the wire a task is a flat object: `type` plus the adapter parameters
/// at the same level, e.g. `{"type":"httpget","url":"https://example.com"}`.
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub r#type: String,
    pub params: Params,
}

impl Task {
    pub fn new(adapter_type: &str, params: Params) -> Self {
        Self {
            r#type: adapter_type.trim().to_lowercase(),
            params,
        }
    }
}

impl Serialize for Task {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("type", &self.r#type)?;
        for (key, value) in self.params.iter() {
            // `type` is reserved for the adapter name.
            if key != "type" {
                map.serialize_entry(key, value)?;
            }
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Task {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mut object = Map::<String, Value>::deserialize(deserializer)?;
        let adapter_type = match object.remove("type") {
            Some(Value::String(s)) => s,
            Some(other) => {
                return Err(de::Error::custom(format!(
                    "task type must be a string, got {}",
                    other
                )));
            }
            None => return Err(de::Error::missing_field("type")),
        };
        Ok(Task::new(&adapter_type, Params::from(object)))
    }
}

/// Canonical job specification: an ordered pipeline of adapter tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSpec {
    #[serde(skip_deserializing, default)]
    pub id: String,
    #[serde(skip_deserializing, default = "now")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_at: Option<DateTime<Utc>>,
}

impl Default for JobSpec {
    fn default() -> Self {
        Self::new()
    }
}

impl JobSpec {
    /// An unsaved spec with no identity yet.
    pub fn new() -> Self {
        Self {
            id: String::new(),
            created_at: now(),
            tasks: Vec::new(),
            start_at: None,
            end_at: None,
        }
    }

    pub fn is_persisted(&self) -> bool {
        !self.id.is_empty()
    }

    pub fn started(&self, at: DateTime<Utc>) -> bool {
        self.start_at.is_none_or(|start| start <= at)
    }

    pub fn ended(&self, at: DateTime<Utc>) -> bool {
        self.end_at.is_some_and(|end| end <= at)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    InProgress,
    Completed,
    Errored,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::InProgress => "in_progress",
            RunStatus::Completed => "completed",
            RunStatus::Errored => "errored",
        }
    }

    pub fn from_status(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(RunStatus::Pending),
            "in_progress" => Some(RunStatus::InProgress),
            "completed" => Some(RunStatus::Completed),
            "errored" => Some(RunStatus::Errored),
            _ => None,
        }
    }
}

/// One recorded execution of a job spec.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRun {
    pub id: String,
    pub job_id: String,
    pub status: RunStatus,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// An external adapter reachable over HTTP, referenced by name from tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeType {
    pub name: String,
    pub url: String,
}

impl BridgeType {
    pub fn new(name: &str, url: &str) -> Self {
        Self {
            name: name.trim().to_lowercase(),
            url: url.trim().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn task_type_is_lower_cased_on_parse() {
        let task: Task = serde_json::from_value(json!({"type": "HttpGet", "url": "x"})).unwrap();
        assert_eq!(task.r#type, "httpget");
        assert_eq!(serde_json::to_value(&task.params).unwrap()["url"], json!("x"));
        assert!(serde_json::to_value(&task.params).unwrap().get("type").is_none());
    }

    #[test]
    fn task_type_ignores_surrounding_whitespace() {
        assert_eq!(Task::new(" NoOp ", Params::default()).r#type, "noop");
        let task: Task = serde_json::from_value(json!({"type": "\tHttpGet\n"})).unwrap();
        assert_eq!(task.r#type, "httpget");
    }

    #[test]
    fn task_wire_form_merges_params() {
        let mut params = Map::new();
        params.insert("foo".to_string(), json!("bar"));
        let task = Task::new("noOp", Params::from(params));
        assert_eq!(
            serde_json::to_value(&task).unwrap(),
            json!({"type": "noop", "foo": "bar"})
        );
    }

    #[test]
    fn task_without_type_is_rejected() {
        let err = serde_json::from_value::<Task>(json!({"url": "x"})).unwrap_err();
        assert!(err.to_string().contains("type"));
    }

    #[test]
    fn task_with_numeric_type_is_rejected() {
        assert!(serde_json::from_value::<Task>(json!({"type": 7})).is_err());
    }

    #[test]
    fn job_spec_ignores_client_supplied_identity() {
        let spec: JobSpec = serde_json::from_value(json!({
            "id": "chosen-by-client",
            "createdAt": "2001-01-01T00:00:00Z",
            "tasks": [{"type": "noop"}]
        }))
        .unwrap();
        assert!(spec.id.is_empty());
        assert!(spec.created_at.timestamp() > 978_307_200);
        assert_eq!(spec.tasks.len(), 1);
    }

    #[test]
    fn params_equality_is_structural() {
        let a = Params::try_from(json!({"a": 1, "b": [1, 2]})).unwrap();
        let b = Params::try_from(json!({"b": [1, 2], "a": 1})).unwrap();
        assert_eq!(a, b);
        assert!(Params::try_from(json!("scalar")).is_err());
    }

    #[test]
    fn window_checks() {
        let mut spec = JobSpec::new();
        let t = now();
        assert!(spec.started(t));
        assert!(!spec.ended(t));
        spec.start_at = Some(t + chrono::Duration::hours(1));
        spec.end_at = Some(t - chrono::Duration::hours(1));
        assert!(!spec.started(t));
        assert!(spec.ended(t));
    }

    #[test]
    fn run_status_round_trips_through_text() {
        for status in [
            RunStatus::Pending,
            RunStatus::InProgress,
            RunStatus::Completed,
            RunStatus::Errored,
        ] {
            assert_eq!(RunStatus::from_status(status.as_str()), Some(status));
        }
        assert_eq!(RunStatus::from_status("bogus"), None);
    }
}
