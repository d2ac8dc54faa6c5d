use crate::export::{export_artifact, export_file_name};
use crew_client::{ConnectionState, Session};
use crew_core::activity::ActivityLevel;
use crew_core::workflow::OutputCategory;
use crossterm::event::{Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tab {
    Overview,
    ProductSpec,
    Wireframe,
    BackendApi,
    Html,
}

impl Tab {
    pub const ALL: [Tab; 5] = [
        Tab::Overview,
        Tab::ProductSpec,
        Tab::Wireframe,
        Tab::BackendApi,
        Tab::Html,
    ];

    pub fn title(self) -> &'static str {
        match self.category() {
            Some(category) => category.title(),
            None => "Overview",
        }
    }

    pub fn next(self) -> Self {
        match self {
            Tab::Overview => Tab::ProductSpec,
            Tab::ProductSpec => Tab::Wireframe,
            Tab::Wireframe => Tab::BackendApi,
            Tab::BackendApi => Tab::Html,
            Tab::Html => Tab::Overview,
        }
    }

    pub fn index(self) -> usize {
        Self::ALL.iter().position(|tab| *tab == self).unwrap_or(0)
    }

    pub fn category(self) -> Option<OutputCategory> {
        match self {
            Tab::Overview => None,
            Tab::ProductSpec => Some(OutputCategory::ProductSpec),
            Tab::Wireframe => Some(OutputCategory::Wireframe),
            Tab::BackendApi => Some(OutputCategory::BackendApi),
            Tab::Html => Some(OutputCategory::Html),
        }
    }

    pub fn for_category(category: OutputCategory) -> Self {
        match category {
            OutputCategory::ProductSpec => Tab::ProductSpec,
            OutputCategory::Wireframe => Tab::Wireframe,
            OutputCategory::BackendApi => Tab::BackendApi,
            OutputCategory::Html => Tab::Html,
        }
    }

    fn from_digit(ch: char) -> Option<Self> {
        let index = ch.to_digit(10)? as usize;
        Self::ALL.get(index.checked_sub(1)?).copied()
    }
}

/// What the event loop has to do after a key press. Work that needs the
/// connection or an HTTP round trip is handed back instead of done here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputAction {
    None,
    Quit,
    Start(String),
    Stop,
    Reconnect,
    /// Terminal regained focus.
    Resume,
}

pub struct App {
    pub session: Session,
    pub tab: Tab,
    pub scroll: u16,
    pub help_open: bool,
    pub editing: bool,
    pub input: String,
    pub connection: ConnectionState,
    pub reconnect_attempts: u32,
    pub server: String,
    pub export_dir: PathBuf,
}

impl App {
    pub fn new(session: Session, server: String, export_dir: PathBuf) -> Self {
        Self {
            session,
            tab: Tab::Overview,
            scroll: 0,
            help_open: false,
            editing: false,
            input: String::new(),
            connection: ConnectionState::Closed,
            reconnect_attempts: 0,
            server,
            export_dir,
        }
    }

    pub fn select_tab(&mut self, tab: Tab) {
        self.tab = tab;
        self.scroll = 0;
    }

    /// Jumps to an artifact the session asked to show, e.g. the final HTML.
    pub fn take_focus(&mut self) {
        let focus = self.session.state().focus.take();
        if let Some(category) = focus {
            self.select_tab(Tab::for_category(category));
        }
    }

    pub fn clear(&mut self) {
        if self.session.clear().is_ok() {
            self.input.clear();
            self.scroll = 0;
        }
    }

    pub fn export_current(&mut self) {
        let Some(category) = self.tab.category() else {
            self.session
                .state()
                .notify(ActivityLevel::Warning, "Select an output tab to export");
            return;
        };
        let artifact = self.session.state().outputs.get(category).cloned();
        let Some(artifact) = artifact else {
            self.session.state().notify(
                ActivityLevel::Warning,
                format!("No {} output to export yet", category.title()),
            );
            return;
        };
        match export_artifact(&self.export_dir, &artifact) {
            Ok(path) => {
                info!("artifact_exported: {}", path.display());
                self.session.state().notify(
                    ActivityLevel::Success,
                    format!("Downloaded {}", export_file_name(category)),
                );
            }
            Err(err) => {
                warn!("artifact_export_error: {err:#}");
                self.session
                    .state()
                    .notify(ActivityLevel::Error, format!("Export failed: {err:#}"));
            }
        }
    }
}

pub fn handle_input(event: Event, app: &mut App) -> InputAction {
    match event {
        Event::Key(key) if key.kind == KeyEventKind::Press => handle_key(key, app),
        Event::FocusGained => InputAction::Resume,
        _ => InputAction::None,
    }
}

fn handle_key(key: KeyEvent, app: &mut App) -> InputAction {
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        return InputAction::Quit;
    }
    if app.editing {
        return handle_edit_key(key, app);
    }
    if matches!(key.code, KeyCode::Char('?') | KeyCode::F(1)) {
        app.help_open = !app.help_open;
        return InputAction::None;
    }
    if key.code == KeyCode::Esc && app.help_open {
        app.help_open = false;
        return InputAction::None;
    }
    if app.help_open {
        return InputAction::None;
    }

    match key.code {
        KeyCode::Char('q') => InputAction::Quit,
        KeyCode::Char('i') => {
            app.editing = true;
            InputAction::None
        }
        KeyCode::Char('s') => InputAction::Start(app.input.clone()),
        KeyCode::Char('x') => InputAction::Stop,
        KeyCode::Char('c') => {
            app.clear();
            InputAction::None
        }
        KeyCode::Char('r') => InputAction::Reconnect,
        KeyCode::Char('e') => {
            app.export_current();
            InputAction::None
        }
        KeyCode::Char(ch @ '1'..='5') => {
            if let Some(tab) = Tab::from_digit(ch) {
                app.select_tab(tab);
            }
            InputAction::None
        }
        KeyCode::Tab => {
            app.select_tab(app.tab.next());
            InputAction::None
        }
        KeyCode::Down | KeyCode::Char('j') => {
            app.scroll = app.scroll.saturating_add(1);
            InputAction::None
        }
        KeyCode::Up | KeyCode::Char('k') => {
            app.scroll = app.scroll.saturating_sub(1);
            InputAction::None
        }
        KeyCode::Char('g') => {
            app.scroll = 0;
            InputAction::None
        }
        _ => InputAction::None,
    }
}

fn handle_edit_key(key: KeyEvent, app: &mut App) -> InputAction {
    match key.code {
        KeyCode::Enter => {
            app.editing = false;
            InputAction::Start(app.input.clone())
        }
        KeyCode::Esc => {
            app.editing = false;
            InputAction::None
        }
        KeyCode::Backspace => {
            app.input.pop();
            InputAction::None
        }
        KeyCode::Char(ch) => {
            app.input.push(ch);
            InputAction::None
        }
        _ => InputAction::None,
    }
}
