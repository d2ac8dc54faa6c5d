use crate::protocol::{CrewMessage, WorkflowKind};
use crate::workflow::{TaskSequence, TaskStatus};
use tracing::debug;

pub const READY_STATUS: &str = "Ready to start";

#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Success { execution_time: Option<f64> },
    Failure { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskProgress {
    pub key: String,
    pub display_name: String,
    pub status: TaskStatus,
    pub error: Option<String>,
}

/// Per-task status plus the overall percentage of the current run.
///
/// Percentages are positional: starting the task at index `i` of `n` means
/// `i / n`, completing `k` tasks means `k / n`. The value never goes down
/// until [`ProgressTracker::reset`].
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    sequence: TaskSequence,
    tasks: Vec<TaskProgress>,
    progress: u8,
    current_task: Option<String>,
    current_agent: Option<String>,
    status_text: String,
    outcome: Option<RunOutcome>,
}

impl ProgressTracker {
    pub fn new(sequence: TaskSequence) -> Self {
        let tasks = sequence
            .iter()
            .map(|task| TaskProgress {
                key: task.key.clone(),
                display_name: task.display_name.clone(),
                status: TaskStatus::Pending,
                error: None,
            })
            .collect();
        Self {
            sequence,
            tasks,
            progress: 0,
            current_task: None,
            current_agent: None,
            status_text: READY_STATUS.to_string(),
            outcome: None,
        }
    }

    pub fn apply(&mut self, message: &CrewMessage) {
        let agent = message.agent_name();
        let task = message.task_name();
        match message.kind {
            WorkflowKind::AgentStart => self.agent_start(agent, task),
            WorkflowKind::AgentThinking => {
                self.agent_thinking(agent, message.thought().unwrap_or_default())
            }
            WorkflowKind::AgentOutput => self.agent_output(agent, task),
            WorkflowKind::TaskComplete => {
                self.task_complete(task, agent, message.explicit_progress())
            }
            WorkflowKind::CrewComplete => {
                let outcome = message.crew_outcome();
                self.crew_complete(
                    outcome.success,
                    outcome.execution_time,
                    outcome.error_message.as_deref(),
                )
            }
            WorkflowKind::Error => {
                self.error(&message.error_text(), message.agent.as_deref(), message.task.as_deref())
            }
        }
    }

    pub fn agent_start(&mut self, agent: &str, task: &str) {
        self.status_text = format!("{agent} started working...");
        let Some(index) = self.sequence.position(task) else {
            debug!("agent_start_unknown_task: {task}");
            return;
        };
        if self.tasks[index].status.is_terminal() {
            debug!("agent_start_on_finished_task: {task}");
            return;
        }
        for (other, entry) in self.tasks.iter_mut().enumerate() {
            if other != index && entry.status == TaskStatus::Active {
                entry.status = TaskStatus::Pending;
            }
        }
        self.tasks[index].status = TaskStatus::Active;
        self.current_task = Some(task.to_string());
        self.current_agent = Some(agent.to_string());
        self.raise_progress(percent(index, self.tasks.len()));
    }

    pub fn agent_thinking(&mut self, agent: &str, _thought: &str) {
        if self.current_task.is_some() && self.current_agent.as_deref() == Some(agent) {
            self.status_text = format!("{agent} is thinking...");
        }
    }

    /// Output from an agent also counts as completion of its task.
    pub fn agent_output(&mut self, agent: &str, task: &str) {
        self.complete(task, agent, None);
    }

    pub fn task_complete(&mut self, task: &str, agent: &str, explicit_progress: Option<f64>) {
        self.complete(task, agent, explicit_progress);
    }

    pub fn crew_complete(
        &mut self,
        success: bool,
        execution_time: Option<f64>,
        error_message: Option<&str>,
    ) {
        if success {
            for entry in self.tasks.iter_mut() {
                if entry.status == TaskStatus::Active {
                    entry.status = TaskStatus::Completed;
                }
            }
            self.raise_progress(100.0);
            self.status_text = "All tasks completed successfully!".to_string();
            self.outcome = Some(RunOutcome::Success { execution_time });
            return;
        }

        let message = error_message.unwrap_or("Unknown error").to_string();
        if let Some(index) = self.active_index() {
            self.mark_error(index, &message);
        }
        self.status_text = format!("Execution failed: {message}");
        self.outcome = Some(RunOutcome::Failure { message });
    }

    pub fn error(&mut self, message: &str, _agent: Option<&str>, task: Option<&str>) {
        if let Some(index) = task.and_then(|key| self.sequence.position(key)) {
            self.mark_error(index, message);
        }
        self.status_text = format!("Error: {message}");
    }

    pub fn reset(&mut self) {
        for entry in self.tasks.iter_mut() {
            entry.status = TaskStatus::Pending;
            entry.error = None;
        }
        self.progress = 0;
        self.current_task = None;
        self.current_agent = None;
        self.status_text = READY_STATUS.to_string();
        self.outcome = None;
    }

    pub fn progress(&self) -> u8 {
        self.progress
    }

    pub fn tasks(&self) -> &[TaskProgress] {
        &self.tasks
    }

    pub fn status_of(&self, task: &str) -> Option<TaskStatus> {
        self.tasks
            .iter()
            .find(|entry| entry.key == task)
            .map(|entry| entry.status)
    }

    pub fn active_count(&self) -> usize {
        self.tasks
            .iter()
            .filter(|entry| entry.status == TaskStatus::Active)
            .count()
    }

    pub fn completed_count(&self) -> usize {
        self.tasks
            .iter()
            .filter(|entry| entry.status == TaskStatus::Completed)
            .count()
    }

    pub fn current_task(&self) -> Option<&str> {
        self.current_task.as_deref()
    }

    pub fn current_agent(&self) -> Option<&str> {
        self.current_agent.as_deref()
    }

    pub fn status_text(&self) -> &str {
        &self.status_text
    }

    pub fn outcome(&self) -> Option<&RunOutcome> {
        self.outcome.as_ref()
    }

    fn complete(&mut self, task: &str, agent: &str, explicit_progress: Option<f64>) {
        let Some(index) = self.sequence.position(task) else {
            // Run-wide progress frames name no workflow task.
            debug!("complete_unknown_task: {task}");
            if let Some(value) = explicit_progress {
                self.raise_progress(value);
            }
            self.status_text = format!("{agent} completed {task}");
            return;
        };
        if self.tasks[index].status != TaskStatus::Error {
            self.tasks[index].status = TaskStatus::Completed;
        }
        let computed = percent(self.completed_count(), self.tasks.len());
        self.raise_progress(explicit_progress.unwrap_or(computed));
        self.status_text = format!(
            "{agent} completed {} task",
            self.tasks[index].display_name
        );
    }

    fn active_index(&self) -> Option<usize> {
        self.tasks
            .iter()
            .position(|entry| entry.status == TaskStatus::Active)
    }

    fn mark_error(&mut self, index: usize, message: &str) {
        let entry = &mut self.tasks[index];
        if entry.status.is_terminal() {
            return;
        }
        entry.status = TaskStatus::Error;
        entry.error = Some(message.to_string());
    }

    fn raise_progress(&mut self, value: f64) {
        if !value.is_finite() {
            return;
        }
        let clamped = value.clamp(0.0, 100.0).round() as u8;
        if clamped > self.progress {
            self.progress = clamped;
        }
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new(TaskSequence::default())
    }
}

fn percent(part: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    part as f64 * 100.0 / total as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{decode_inbound, Inbound};

    const TASKS: [&str; 4] = [
        "product_design_task",
        "uiux_design_task",
        "backend_development_task",
        "frontend_development_task",
    ];

    fn feed(tracker: &mut ProgressTracker, raw: &str) {
        match decode_inbound(raw).expect("decode") {
            Inbound::Workflow(message) => tracker.apply(&message),
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn start_then_explicit_completion() {
        let mut tracker = ProgressTracker::default();
        feed(
            &mut tracker,
            r#"{"type":"agent_start","agent":"PM","task":"product_design_task","data":{}}"#,
        );
        assert_eq!(tracker.status_of("product_design_task"), Some(TaskStatus::Active));
        assert_eq!(tracker.progress(), 0);

        feed(
            &mut tracker,
            r#"{"type":"task_complete","task":"product_design_task","agent":"PM","progress":25,"data":{}}"#,
        );
        assert_eq!(
            tracker.status_of("product_design_task"),
            Some(TaskStatus::Completed)
        );
        assert_eq!(tracker.progress(), 25);
        assert_eq!(tracker.status_text(), "PM completed Product Manager task");
    }

    #[test]
    fn successful_crew_completes_active_tasks() {
        let mut tracker = ProgressTracker::default();
        tracker.agent_start("FE", "frontend_development_task");
        feed(
            &mut tracker,
            r#"{"type":"crew_complete","data":{"success":true,"execution_time":12.3}}"#,
        );
        assert_eq!(tracker.progress(), 100);
        assert_eq!(tracker.active_count(), 0);
        assert_eq!(
            tracker.status_of("frontend_development_task"),
            Some(TaskStatus::Completed)
        );
        assert_eq!(
            tracker.outcome(),
            Some(&RunOutcome::Success {
                execution_time: Some(12.3)
            })
        );
    }

    #[test]
    fn failed_crew_marks_active_task_error_and_keeps_progress() {
        let mut tracker = ProgressTracker::default();
        tracker.task_complete("product_design_task", "PM", None);
        tracker.task_complete("uiux_design_task", "UX", None);
        tracker.agent_start("BE", "backend_development_task");
        let before = tracker.progress();

        feed(
            &mut tracker,
            r#"{"type":"crew_complete","data":{"success":false,"error_message":"boom"}}"#,
        );
        assert_eq!(
            tracker.status_of("backend_development_task"),
            Some(TaskStatus::Error)
        );
        assert_eq!(tracker.tasks()[2].error.as_deref(), Some("boom"));
        assert_eq!(tracker.progress(), before);
        assert_eq!(tracker.status_text(), "Execution failed: boom");
    }

    #[test]
    fn server_failure_frame_reports_final_result() {
        let mut tracker = ProgressTracker::default();
        tracker.task_complete("product_design_task", "PM", None);
        tracker.agent_start("BE", "backend_development_task");
        let before = tracker.progress();

        feed(
            &mut tracker,
            r#"{"type":"crew_complete","data":{"success":false,"final_result":"boom"},"progress":100}"#,
        );
        assert_eq!(
            tracker.status_of("backend_development_task"),
            Some(TaskStatus::Error)
        );
        assert_eq!(tracker.tasks()[2].error.as_deref(), Some("boom"));
        assert_eq!(tracker.progress(), before);
        assert_eq!(
            tracker.outcome(),
            Some(&RunOutcome::Failure {
                message: "boom".to_string()
            })
        );
    }

    #[test]
    fn start_demotes_previous_active_task() {
        let mut tracker = ProgressTracker::default();
        tracker.agent_start("PM", "product_design_task");
        tracker.agent_start("UX", "uiux_design_task");
        assert_eq!(tracker.status_of("product_design_task"), Some(TaskStatus::Pending));
        assert_eq!(tracker.status_of("uiux_design_task"), Some(TaskStatus::Active));
        assert_eq!(tracker.progress(), 25);
        assert_eq!(tracker.current_agent(), Some("UX"));
    }

    #[test]
    fn output_and_task_complete_are_idempotent_completion_signals() {
        let mut tracker = ProgressTracker::default();
        tracker.agent_start("PM", "product_design_task");
        tracker.agent_output("PM", "product_design_task");
        tracker.task_complete("product_design_task", "PM", None);
        tracker.agent_output("PM", "product_design_task");
        assert_eq!(tracker.completed_count(), 1);
        assert_eq!(tracker.progress(), 25);
    }

    #[test]
    fn error_marks_named_task_without_touching_progress() {
        let mut tracker = ProgressTracker::default();
        tracker.task_complete("product_design_task", "PM", None);
        feed(
            &mut tracker,
            r#"{"type":"error","agent":"UX","task":"uiux_design_task","data":{"error":"rate limited"}}"#,
        );
        assert_eq!(tracker.status_of("uiux_design_task"), Some(TaskStatus::Error));
        assert_eq!(tracker.progress(), 25);
        assert_eq!(tracker.status_text(), "Error: rate limited");

        feed(&mut tracker, r#"{"type":"error","message":"Invalid JSON format"}"#);
        assert_eq!(tracker.status_text(), "Error: Invalid JSON format");
    }

    #[test]
    fn finished_tasks_never_move_backwards() {
        let mut tracker = ProgressTracker::default();
        tracker.task_complete("product_design_task", "PM", None);
        tracker.agent_start("PM", "product_design_task");
        tracker.error("late failure", None, Some("product_design_task"));
        assert_eq!(
            tracker.status_of("product_design_task"),
            Some(TaskStatus::Completed)
        );

        tracker.error("broken", None, Some("uiux_design_task"));
        tracker.task_complete("uiux_design_task", "UX", None);
        assert_eq!(tracker.status_of("uiux_design_task"), Some(TaskStatus::Error));
    }

    #[test]
    fn crew_progress_stream_moves_the_bar_without_touching_tasks() {
        let mut tracker = ProgressTracker::default();
        for progress in [5, 12, 25, 35] {
            feed(
                &mut tracker,
                &format!(
                    r#"{{"type":"task_complete","task":"crew_progress","agent":"Crew","progress":{progress}}}"#
                ),
            );
        }
        assert_eq!(tracker.progress(), 35);
        assert_eq!(tracker.status_text(), "Crew completed crew_progress");
        assert_eq!(tracker.completed_count(), 0);
        assert!(tracker
            .tasks()
            .iter()
            .all(|entry| entry.status == TaskStatus::Pending));

        feed(
            &mut tracker,
            r#"{"type":"task_complete","task":"crew_progress","agent":"Crew","progress":20}"#,
        );
        assert_eq!(tracker.progress(), 35);
    }

    #[test]
    fn unknown_task_start_is_ignored() {
        let mut tracker = ProgressTracker::default();
        tracker.agent_start("QA", "qa_task");
        assert_eq!(tracker.progress(), 0);
        assert_eq!(tracker.active_count(), 0);
        assert_eq!(tracker.current_task(), None);
    }

    #[test]
    fn thinking_only_updates_the_current_agent() {
        let mut tracker = ProgressTracker::default();
        tracker.agent_thinking("PM", "hmm");
        assert_eq!(tracker.status_text(), READY_STATUS);
        tracker.agent_start("PM", "product_design_task");
        tracker.agent_thinking("UX", "hmm");
        assert_eq!(tracker.status_text(), "PM started working...");
        tracker.agent_thinking("PM", "hmm");
        assert_eq!(tracker.status_text(), "PM is thinking...");
    }

    #[test]
    fn reset_restores_initial_state_from_anywhere() {
        let mut tracker = ProgressTracker::default();
        tracker.agent_start("PM", "product_design_task");
        tracker.task_complete("product_design_task", "PM", Some(25.0));
        tracker.agent_start("UX", "uiux_design_task");
        tracker.error("x", None, Some("backend_development_task"));
        tracker.crew_complete(false, None, Some("boom"));

        tracker.reset();
        assert!(tracker
            .tasks()
            .iter()
            .all(|entry| entry.status == TaskStatus::Pending && entry.error.is_none()));
        assert_eq!(tracker.progress(), 0);
        assert_eq!(tracker.current_task(), None);
        assert_eq!(tracker.current_agent(), None);
        assert_eq!(tracker.outcome(), None);
        assert_eq!(tracker.status_text(), READY_STATUS);
    }

    #[derive(Clone, Copy, Debug)]
    enum Op {
        Start(usize),
        Output(usize),
        Complete(usize, Option<f64>),
        Fail(usize),
    }

    fn apply_op(tracker: &mut ProgressTracker, op: Op) {
        match op {
            Op::Start(i) => tracker.agent_start("agent", TASKS[i]),
            Op::Output(i) => tracker.agent_output("agent", TASKS[i]),
            Op::Complete(i, explicit) => tracker.task_complete(TASKS[i], "agent", explicit),
            Op::Fail(i) => tracker.error("failed", None, Some(TASKS[i])),
        }
    }

    fn all_ops() -> Vec<Op> {
        let mut ops = Vec::new();
        for i in 0..TASKS.len() {
            ops.push(Op::Start(i));
            ops.push(Op::Output(i));
            ops.push(Op::Complete(i, None));
            ops.push(Op::Complete(i, Some(10.0)));
            ops.push(Op::Fail(i));
        }
        ops
    }

    #[test]
    fn every_three_step_sequence_keeps_one_active_and_monotonic_progress() {
        let ops = all_ops();
        for a in &ops {
            for b in &ops {
                for c in &ops {
                    let mut tracker = ProgressTracker::default();
                    let mut last = tracker.progress();
                    for op in [*a, *b, *c] {
                        let before: Vec<TaskStatus> =
                            tracker.tasks().iter().map(|entry| entry.status).collect();
                        apply_op(&mut tracker, op);
                        assert!(tracker.active_count() <= 1, "{a:?} {b:?} {c:?}");
                        assert!(tracker.progress() >= last, "{a:?} {b:?} {c:?}");
                        last = tracker.progress();
                        for (prior, entry) in before.iter().zip(tracker.tasks()) {
                            if prior.is_terminal() {
                                assert_eq!(*prior, entry.status, "{a:?} {b:?} {c:?}");
                            }
                        }
                    }
                }
            }
        }
    }
}
