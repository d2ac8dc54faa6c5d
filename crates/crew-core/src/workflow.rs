use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum OutputCategory {
    ProductSpec,
    Wireframe,
    BackendApi,
    Html,
}

impl OutputCategory {
    pub const ALL: [OutputCategory; 4] = [
        OutputCategory::ProductSpec,
        OutputCategory::Wireframe,
        OutputCategory::BackendApi,
        OutputCategory::Html,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OutputCategory::ProductSpec => "product_spec",
            OutputCategory::Wireframe => "wireframe",
            OutputCategory::BackendApi => "backend_api",
            OutputCategory::Html => "html",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            OutputCategory::ProductSpec => "Product Spec",
            OutputCategory::Wireframe => "Wireframe",
            OutputCategory::BackendApi => "Backend API",
            OutputCategory::Html => "HTML",
        }
    }

    pub fn file_extension(&self) -> &'static str {
        match self {
            OutputCategory::Html => "html",
            _ => "json",
        }
    }

    pub fn is_markup(&self) -> bool {
        matches!(self, OutputCategory::Html)
    }
}

impl fmt::Display for OutputCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputCategory {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let normalized = input.trim().to_lowercase().replace('-', "_");
        match normalized.as_str() {
            "product_spec" => Ok(OutputCategory::ProductSpec),
            "wireframe" => Ok(OutputCategory::Wireframe),
            "backend_api" => Ok(OutputCategory::BackendApi),
            "html" | "html_output" => Ok(OutputCategory::Html),
            other => Err(format!("Unknown output category: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Active,
    Completed,
    Error,
}

impl Default for TaskStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Active => "active",
            TaskStatus::Completed => "completed",
            TaskStatus::Error => "error",
        }
    }

    /// Badge text shown next to a task.
    pub fn label(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "Pending",
            TaskStatus::Active => "Working...",
            TaskStatus::Completed => "Completed",
            TaskStatus::Error => "Error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Error)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let normalized = input.trim().to_lowercase();
        match normalized.as_str() {
            "pending" => Ok(TaskStatus::Pending),
            "active" | "working" => Ok(TaskStatus::Active),
            "completed" | "complete" | "done" => Ok(TaskStatus::Completed),
            "error" | "failed" => Ok(TaskStatus::Error),
            other => Err(format!("Unknown status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskDef {
    pub key: String,
    pub display_name: String,
    #[serde(default)]
    pub category: Option<OutputCategory>,
}

impl TaskDef {
    pub fn new(key: &str, display_name: &str, category: Option<OutputCategory>) -> Self {
        Self {
            key: key.to_string(),
            display_name: display_name.to_string(),
            category,
        }
    }
}

/// Ordered list of workflow stages. Positional progress is derived from the
/// index of a task in this list, so the order is part of the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSequence {
    tasks: Vec<TaskDef>,
}

impl TaskSequence {
    pub fn new(tasks: Vec<TaskDef>) -> Self {
        Self { tasks }
    }

    pub fn feature_development() -> Self {
        Self::new(vec![
            TaskDef::new(
                "product_design_task",
                "Product Manager",
                Some(OutputCategory::ProductSpec),
            ),
            TaskDef::new(
                "uiux_design_task",
                "UI/UX Designer",
                Some(OutputCategory::Wireframe),
            ),
            TaskDef::new(
                "backend_development_task",
                "Backend Engineer",
                Some(OutputCategory::BackendApi),
            ),
            TaskDef::new(
                "frontend_development_task",
                "Frontend Engineer",
                Some(OutputCategory::Html),
            ),
        ])
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TaskDef> {
        self.tasks.iter()
    }

    pub fn position(&self, key: &str) -> Option<usize> {
        self.tasks.iter().position(|task| task.key == key)
    }

    pub fn get(&self, key: &str) -> Option<&TaskDef> {
        self.tasks.iter().find(|task| task.key == key)
    }

    pub fn category_for(&self, key: &str) -> Option<OutputCategory> {
        self.get(key).and_then(|task| task.category)
    }

    pub fn display_name<'a>(&'a self, key: &'a str) -> &'a str {
        self.get(key)
            .map(|task| task.display_name.as_str())
            .unwrap_or(key)
    }
}

impl Default for TaskSequence {
    fn default() -> Self {
        Self::feature_development()
    }
}
