use crate::workflow::{OutputCategory, TaskSequence};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub category: OutputCategory,
    pub agent: String,
    pub task: String,
    /// Stored exactly as received.
    pub payload: String,
    pub received_at: DateTime<Utc>,
}

/// Latest artifact per output category. A newer artifact replaces the older
/// one for the same category.
#[derive(Debug, Clone, Default)]
pub struct OutputStore {
    sequence: TaskSequence,
    artifacts: BTreeMap<OutputCategory, Artifact>,
}

impl OutputStore {
    pub fn new(sequence: TaskSequence) -> Self {
        Self {
            sequence,
            artifacts: BTreeMap::new(),
        }
    }

    /// The task mapping wins over whatever type the producer declared.
    pub fn resolve_category(&self, task: &str, declared: Option<&str>) -> Option<OutputCategory> {
        self.sequence
            .category_for(task)
            .or_else(|| declared.and_then(|raw| raw.parse().ok()))
    }

    /// Returns the category the payload was rendered into, or `None` when it
    /// maps to no known category and was dropped.
    pub fn update(
        &mut self,
        agent: &str,
        task: &str,
        payload: &str,
        declared: Option<&str>,
    ) -> Option<OutputCategory> {
        self.update_at(agent, task, payload, declared, Utc::now())
    }

    pub fn update_at(
        &mut self,
        agent: &str,
        task: &str,
        payload: &str,
        declared: Option<&str>,
        received_at: DateTime<Utc>,
    ) -> Option<OutputCategory> {
        let Some(category) = self.resolve_category(task, declared) else {
            debug!(
                "output_dropped: task={task} declared={}",
                declared.unwrap_or("-")
            );
            return None;
        };
        self.artifacts.insert(
            category,
            Artifact {
                category,
                agent: agent.to_string(),
                task: task.to_string(),
                payload: payload.to_string(),
                received_at,
            },
        );
        Some(category)
    }

    pub fn get(&self, category: OutputCategory) -> Option<&Artifact> {
        self.artifacts.get(&category)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Artifact> {
        self.artifacts.values()
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    pub fn clear_all(&mut self) {
        self.artifacts.clear();
    }
}

/// Display form of a payload: JSON is pretty-printed, markup and anything
/// that does not parse is returned as-is.
pub fn render_payload(category: OutputCategory, payload: &str) -> String {
    if category.is_markup() {
        return payload.to_string();
    }
    match serde_json::from_str::<Value>(payload) {
        Ok(value) => serde_json::to_string_pretty(&value).unwrap_or_else(|_| payload.to_string()),
        Err(_) => payload.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newer_backend_output_replaces_older_one() {
        let mut store = OutputStore::default();
        assert_eq!(
            store.update("BE", "backend_development_task", r#"{"a":1}"#, Some("json")),
            Some(OutputCategory::BackendApi)
        );
        assert_eq!(
            store.update("BE", "backend_development_task", r#"{"a":2}"#, Some("json")),
            Some(OutputCategory::BackendApi)
        );
        assert_eq!(store.len(), 1);
        let artifact = store.get(OutputCategory::BackendApi).expect("artifact");
        assert_eq!(artifact.payload, r#"{"a":2}"#);
        assert_eq!(artifact.agent, "BE");
    }

    #[test]
    fn task_mapping_wins_over_declared_type() {
        let store = OutputStore::default();
        assert_eq!(
            store.resolve_category("frontend_development_task", Some("product_spec")),
            Some(OutputCategory::Html)
        );
        assert_eq!(
            store.resolve_category("ad_hoc_task", Some("wireframe")),
            Some(OutputCategory::Wireframe)
        );
    }

    #[test]
    fn unmapped_output_is_dropped() {
        let mut store = OutputStore::default();
        assert_eq!(store.update("QA", "qa_task", "notes", Some("text")), None);
        assert_eq!(store.update("QA", "qa_task", "notes", None), None);
        assert!(store.is_empty());
    }

    #[test]
    fn clear_all_empties_every_category() {
        let mut store = OutputStore::default();
        store.update("PM", "product_design_task", "{}", None);
        store.update("FE", "frontend_development_task", "<html></html>", None);
        assert_eq!(store.len(), 2);
        store.clear_all();
        assert!(OutputCategory::ALL
            .iter()
            .all(|category| store.get(*category).is_none()));
    }

    #[test]
    fn rendering_pretty_prints_json_only() {
        assert_eq!(
            render_payload(OutputCategory::ProductSpec, r#"{"a":1}"#),
            "{\n  \"a\": 1\n}"
        );
        assert_eq!(
            render_payload(OutputCategory::Wireframe, "plain text"),
            "plain text"
        );
        assert_eq!(
            render_payload(OutputCategory::Html, r#"{"a":1}"#),
            r#"{"a":1}"#
        );
    }
}
