use crew_client::ConnectionState;
use crew_core::activity::ActivityLevel;
use crew_core::workflow::TaskStatus;
use ratatui::style::{Color, Modifier, Style};

#[derive(Clone, Copy)]
pub struct Theme {
    pub bg: Color,
    pub surface: Color,
    pub border: Color,
    pub title: Color,
    pub text: Color,
    pub muted: Color,
    pub accent: Color,
    pub ok: Color,
    pub warn: Color,
    pub critical: Color,
    pub info: Color,
}

pub fn console_theme() -> Theme {
    Theme {
        bg: Color::Rgb(11, 18, 32),
        surface: Color::Rgb(17, 26, 46),
        border: Color::Rgb(71, 85, 105),
        title: Color::Rgb(191, 219, 254),
        text: Color::Rgb(226, 232, 240),
        muted: Color::Rgb(148, 163, 184),
        accent: Color::Rgb(56, 189, 248),
        ok: Color::Rgb(34, 197, 94),
        warn: Color::Rgb(245, 158, 11),
        critical: Color::Rgb(239, 68, 68),
        info: Color::Rgb(59, 130, 246),
    }
}

impl Theme {
    pub fn title_style(&self) -> Style {
        Style::default()
            .fg(self.title)
            .add_modifier(Modifier::BOLD)
    }

    pub fn section_style(&self) -> Style {
        Style::default()
            .fg(self.accent)
            .add_modifier(Modifier::BOLD)
    }

    pub fn level_color(&self, level: ActivityLevel) -> Color {
        match level {
            ActivityLevel::Info => self.info,
            ActivityLevel::Success => self.ok,
            ActivityLevel::Warning => self.warn,
            ActivityLevel::Error => self.critical,
        }
    }

    pub fn status_color(&self, status: TaskStatus) -> Color {
        match status {
            TaskStatus::Pending => self.muted,
            TaskStatus::Active => self.info,
            TaskStatus::Completed => self.ok,
            TaskStatus::Error => self.critical,
        }
    }

    pub fn connection_color(&self, state: ConnectionState) -> Color {
        match state {
            ConnectionState::Open => self.ok,
            ConnectionState::Connecting => self.warn,
            ConnectionState::Closing | ConnectionState::Closed => self.critical,
        }
    }
}

pub mod icons {
    pub const DONE: &str = "x";
    pub const PENDING: &str = ".";
    pub const ACTIVE: &str = ">";
    pub const FAILED: &str = "!";
}

pub fn status_icon(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Pending => icons::PENDING,
        TaskStatus::Active => icons::ACTIVE,
        TaskStatus::Completed => icons::DONE,
        TaskStatus::Error => icons::FAILED,
    }
}
