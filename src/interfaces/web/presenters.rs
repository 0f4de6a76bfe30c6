use std::collections::BTreeMap;

use super::jsonapi::{
    MarshalError, Relationship, Resource, ResourceIdentifier, ToResource, attributes_of,
};
use crate::core::models::{JobRun, JobSpec};

const SPECS: &str = "specs";
const RUNS: &str = "runs";

/// Public view of a job spec together with the runs the caller chose to embed.
pub struct JobSpecPresenter {
    spec: JobSpec,
    runs: Vec<JobRunPresenter>,
}

impl JobSpecPresenter {
    pub fn with_runs(spec: JobSpec, runs: Vec<JobRun>) -> Self {
        Self {
            spec,
            runs: runs.into_iter().map(JobRunPresenter::new).collect(),
        }
    }

    /// Listing and creation responses never embed runs.
    pub fn without_runs(spec: JobSpec) -> Self {
        Self {
            spec,
            runs: Vec::new(),
        }
    }
}

impl ToResource for JobSpecPresenter {
    fn resource(&self) -> Result<Resource, MarshalError> {
        let run_ids = self
            .runs
            .iter()
            .map(|r| ResourceIdentifier {
                kind: RUNS,
                id: r.0.id.clone(),
            })
            .collect();
        let mut relationships = BTreeMap::new();
        relationships.insert(RUNS, Relationship { data: run_ids });

        Ok(Resource {
            kind: SPECS,
            id: self.spec.id.clone(),
            attributes: attributes_of(&self.spec)?,
            relationships,
        })
    }

    fn included(&self) -> Result<Vec<Resource>, MarshalError> {
        self.runs.iter().map(ToResource::resource).collect()
    }
}

pub struct JobRunPresenter(JobRun);

impl JobRunPresenter {
    pub fn new(run: JobRun) -> Self {
        Self(run)
    }
}

impl ToResource for JobRunPresenter {
    fn resource(&self) -> Result<Resource, MarshalError> {
        Ok(Resource {
            kind: RUNS,
            id: self.0.id.clone(),
            attributes: attributes_of(&self.0)?,
            relationships: BTreeMap::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::{Params, RunStatus, Task, now};
    use crate::interfaces::web::jsonapi::marshal_one;
    use serde_json::json;

    fn saved_spec() -> JobSpec {
        let mut spec = JobSpec::new();
        spec.id = "abc".to_string();
        spec.tasks = vec![Task::new(
            "httpget",
            Params::try_from(json!({"url": "https://example.com"})).unwrap(),
        )];
        spec
    }

    fn run(id: &str) -> JobRun {
        JobRun {
            id: id.to_string(),
            job_id: "abc".to_string(),
            status: RunStatus::Completed,
            created_at: now(),
            completed_at: Some(now()),
        }
    }

    #[test]
    fn spec_without_runs_has_empty_relationship() {
        let doc = marshal_one(&JobSpecPresenter::without_runs(saved_spec())).unwrap();
        let v = serde_json::to_value(&doc).unwrap();

        assert_eq!(v["data"]["type"], "specs");
        assert_eq!(v["data"]["id"], "abc");
        assert!(v["data"]["attributes"].get("id").is_none());
        assert_eq!(
            v["data"]["attributes"]["tasks"],
            json!([{"type": "httpget", "url": "https://example.com"}])
        );
        assert!(v["data"]["attributes"]["createdAt"].is_string());
        assert_eq!(v["data"]["relationships"]["runs"]["data"], json!([]));
        assert!(v.get("included").is_none());
    }

    #[test]
    fn spec_with_runs_links_and_includes_them() {
        let doc =
            marshal_one(&JobSpecPresenter::with_runs(saved_spec(), vec![run("r1"), run("r2")]))
                .unwrap();
        let v = serde_json::to_value(&doc).unwrap();

        assert_eq!(
            v["data"]["relationships"]["runs"]["data"],
            json!([{"type": "runs", "id": "r1"}, {"type": "runs", "id": "r2"}])
        );
        let included = v["included"].as_array().unwrap();
        assert_eq!(included.len(), 2);
        assert_eq!(included[0]["type"], "runs");
        assert_eq!(included[0]["attributes"]["jobId"], "abc");
        assert_eq!(included[0]["attributes"]["status"], "completed");
    }
}
