use thiserror::Error;

pub const MIN_REQUEST_CHARS: usize = 11;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RunRejection {
    #[error("Please enter a feature request")]
    EmptyRequest,
    #[error("Feature request must be longer than 10 characters")]
    RequestTooShort,
    #[error("Crew is already running")]
    AlreadyRunning,
    #[error("No crew is currently running")]
    NotRunning,
    #[error("Cannot clear while crew is running. Please stop first.")]
    ClearWhileRunning,
}

/// Where a locally started run stands before the server reports it running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum PendingStart {
    #[default]
    None,
    /// The start command is in flight.
    Requested,
    /// The server accepted the command but may not have spawned the run yet.
    Accepted,
}

/// Tracks whether a run is in progress so that at most one is ever started.
#[derive(Debug, Clone, Default)]
pub struct RunGuard {
    running: bool,
    pending: PendingStart,
}

impl RunGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the trimmed request when it is long enough to submit.
    pub fn validate_request(text: &str) -> Result<&str, RunRejection> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(RunRejection::EmptyRequest);
        }
        if trimmed.chars().count() < MIN_REQUEST_CHARS {
            return Err(RunRejection::RequestTooShort);
        }
        Ok(trimmed)
    }

    /// Validates the request and marks the run as started.
    pub fn begin<'a>(&mut self, text: &'a str) -> Result<&'a str, RunRejection> {
        let request = Self::validate_request(text)?;
        if self.running {
            return Err(RunRejection::AlreadyRunning);
        }
        self.running = true;
        self.pending = PendingStart::Requested;
        Ok(request)
    }

    /// Records that the server accepted the start command.
    pub fn accept(&mut self) {
        if self.pending == PendingStart::Requested {
            self.pending = PendingStart::Accepted;
        }
    }

    /// Undoes `begin` after the start command failed.
    pub fn rollback(&mut self) {
        self.running = false;
        self.pending = PendingStart::None;
    }

    pub fn ensure_stoppable(&self) -> Result<(), RunRejection> {
        if self.running {
            Ok(())
        } else {
            Err(RunRejection::NotRunning)
        }
    }

    pub fn ensure_clearable(&self) -> Result<(), RunRejection> {
        if self.running {
            Err(RunRejection::ClearWhileRunning)
        } else {
            Ok(())
        }
    }

    pub fn finish(&mut self) {
        self.running = false;
        self.pending = PendingStart::None;
    }

    /// Adopts the server's view, e.g. after a reconnect.
    ///
    /// The server only reports a run once its background task is up, so an
    /// idle report is ignored while the start command is in flight and once
    /// right after it was accepted.
    pub fn sync(&mut self, running: bool) {
        if running {
            self.running = true;
            self.pending = PendingStart::None;
            return;
        }
        match self.pending {
            PendingStart::Requested => {}
            PendingStart::Accepted => self.pending = PendingStart::None,
            PendingStart::None => self.running = false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requests_are_trimmed_and_length_checked() {
        assert_eq!(
            RunGuard::validate_request("   "),
            Err(RunRejection::EmptyRequest)
        );
        assert_eq!(
            RunGuard::validate_request("  short  "),
            Err(RunRejection::RequestTooShort)
        );
        assert_eq!(
            RunGuard::validate_request("0123456789"),
            Err(RunRejection::RequestTooShort)
        );
        assert_eq!(
            RunGuard::validate_request("  add a login page \n"),
            Ok("add a login page")
        );
    }

    #[test]
    fn second_start_is_rejected_until_finished() {
        let mut guard = RunGuard::new();
        assert!(guard.begin("build a todo list app").is_ok());
        assert_eq!(
            guard.begin("build another todo app"),
            Err(RunRejection::AlreadyRunning)
        );
        assert_eq!(guard.ensure_clearable(), Err(RunRejection::ClearWhileRunning));
        guard.finish();
        assert!(guard.begin("build another todo app").is_ok());
    }

    #[test]
    fn invalid_request_does_not_mark_running() {
        let mut guard = RunGuard::new();
        assert_eq!(guard.begin(""), Err(RunRejection::EmptyRequest));
        assert!(!guard.is_running());
        assert_eq!(guard.ensure_stoppable(), Err(RunRejection::NotRunning));
    }

    #[test]
    fn rollback_and_sync() {
        let mut guard = RunGuard::new();
        guard.begin("build a todo list app").expect("begin");
        guard.rollback();
        assert!(!guard.is_running());
        guard.sync(true);
        assert!(guard.ensure_stoppable().is_ok());
        guard.sync(false);
        assert!(!guard.is_running());
    }

    #[test]
    fn idle_report_does_not_release_a_pending_start() {
        let mut guard = RunGuard::new();
        guard.begin("build a settings page").expect("begin");
        guard.sync(false);
        assert_eq!(
            guard.begin("build another settings page"),
            Err(RunRejection::AlreadyRunning)
        );

        guard.accept();
        guard.sync(false);
        assert!(guard.is_running());
        guard.sync(false);
        assert!(!guard.is_running());
    }

    #[test]
    fn server_confirmation_ends_the_pending_phase() {
        let mut guard = RunGuard::new();
        guard.begin("build a settings page").expect("begin");
        guard.accept();
        guard.sync(true);
        guard.sync(false);
        assert!(!guard.is_running());
        assert!(guard.begin("build another settings page").is_ok());
    }
}
