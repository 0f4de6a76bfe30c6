use crate::core::models::JobSpec;
use crate::core::store::SpecStore;

/// Adapters compiled into the node. Anything else must be a registered bridge.
pub const BUILTIN_ADAPTERS: &[&str] = &[
    "ethbytes32",
    "ethint256",
    "ethuint256",
    "ethtx",
    "httpget",
    "httppost",
    "jsonparse",
    "multiply",
    "noop",
    "nooppend",
    "sleep",
];

#[derive(Debug, thiserror::Error, PartialEq)]
#[error("{}", .0.join("; "))]
pub struct ValidationError(pub Vec<String>);

/// Checks a spec against the domain rules, reporting every violation at once.
pub async fn validate_job(spec: &JobSpec, store: &dyn SpecStore) -> Result<(), ValidationError> {
    let mut problems = Vec::new();

    if spec.tasks.is_empty() {
        problems.push("Must have at least one Task".to_string());
    }

    for (index, task) in spec.tasks.iter().enumerate() {
        if task.r#type.is_empty() {
            problems.push(format!("Task {}: type is required", index));
            continue;
        }
        if BUILTIN_ADAPTERS.contains(&task.r#type.as_str()) {
            continue;
        }
        match store.bridge_registered(&task.r#type).await {
            Ok(true) => {}
            Ok(false) => problems.push(format!(
                "Task {}: {} is not a supported adapter type",
                index, task.r#type
            )),
            Err(e) => problems.push(format!(
                "Task {}: unable to look up adapter {}: {}",
                index, task.r#type, e
            )),
        }
    }

    if let (Some(start), Some(end)) = (spec.start_at, spec.end_at)
        && end <= start
    {
        problems.push("endAt must be after startAt".to_string());
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(ValidationError(problems))
    }
}
