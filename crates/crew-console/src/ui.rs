use crate::app::{App, Tab};
use crate::theme::{console_theme, status_icon, Theme};
use crew_client::SessionState;
use crew_core::outputs::render_payload;
use crew_core::progress::RunOutcome;
use crew_core::workflow::OutputCategory;
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, Gauge, List, ListItem, Paragraph, Tabs, Wrap},
    Frame,
};

pub fn render_ui(frame: &mut Frame, app: &App) {
    let size = frame.size();
    let theme = console_theme();
    let state = app.session.state();
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(4),
            Constraint::Length(3),
            Constraint::Min(0),
            Constraint::Length(3),
        ])
        .split(size);

    frame.render_widget(render_header(app, &state, theme), layout[0]);
    frame.render_widget(render_tabs(app, &state, theme), layout[1]);
    match app.tab.category() {
        None => render_overview(frame, app, &state, theme, layout[2]),
        Some(category) => {
            frame.render_widget(render_artifact(app, &state, category, theme), layout[2])
        }
    }
    frame.render_widget(render_footer(app, &state, theme), layout[3]);
    if app.help_open {
        render_help_overlay(frame, theme);
    }
}

fn panel<'a>(title: &'a str, theme: Theme) -> Block<'a> {
    Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(theme.border))
        .style(Style::default().bg(theme.surface))
        .title(Span::styled(title, theme.title_style()))
}

fn render_header(app: &App, state: &SessionState, theme: Theme) -> Paragraph<'static> {
    let mut link = vec![
        Span::styled("Link: ", Style::default().fg(theme.muted)),
        Span::styled(
            app.connection.as_str(),
            Style::default()
                .fg(theme.connection_color(app.connection))
                .add_modifier(Modifier::BOLD),
        ),
    ];
    if app.reconnect_attempts > 0 {
        link.push(Span::styled(
            format!(" (retry {})", app.reconnect_attempts),
            Style::default().fg(theme.warn),
        ));
    }
    link.push(Span::styled(
        format!("  Server: {}", app.server),
        Style::default().fg(theme.muted),
    ));
    if state.connected {
        if let Some(clients) = state.server_connections() {
            link.push(Span::styled(
                format!("  Clients: {clients}"),
                Style::default().fg(theme.muted),
            ));
        }
    } else if let Some(close) = &state.last_close {
        let detail = if close.reason.is_empty() {
            format!("  Last close: {}", close.code)
        } else {
            format!("  Last close: {} {}", close.code, close.reason)
        };
        link.push(Span::styled(detail, Style::default().fg(theme.warn)));
    }

    let run = if state.run.is_running() {
        Span::styled(
            "Crew: running",
            Style::default()
                .fg(theme.info)
                .add_modifier(Modifier::BOLD),
        )
    } else {
        Span::styled("Crew: idle", Style::default().fg(theme.muted))
    };
    let status = Line::from(vec![
        run,
        Span::raw("  "),
        Span::styled(
            state.tracker.status_text().to_string(),
            Style::default().fg(theme.text),
        ),
    ]);

    Paragraph::new(Text::from(vec![Line::from(link), status]))
        .style(Style::default().fg(theme.text).bg(theme.bg))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(theme.border))
                .style(Style::default().bg(theme.bg))
                .title(Span::styled("Crew Console", theme.title_style())),
        )
}

fn render_tabs(app: &App, state: &SessionState, theme: Theme) -> Tabs<'static> {
    let titles: Vec<Line<'static>> = Tab::ALL
        .iter()
        .enumerate()
        .map(|(index, tab)| {
            let ready = tab
                .category()
                .map(|category| state.outputs.get(category).is_some())
                .unwrap_or(false);
            let marker = if ready { " *" } else { "" };
            Line::from(format!("{} {}{marker}", index + 1, tab.title()))
        })
        .collect();
    Tabs::new(titles)
        .select(app.tab.index())
        .style(Style::default().fg(theme.muted))
        .highlight_style(
            Style::default()
                .fg(theme.accent)
                .add_modifier(Modifier::BOLD),
        )
        .block(panel("Views", theme))
}

fn render_overview(frame: &mut Frame, app: &App, state: &SessionState, theme: Theme, area: Rect) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(state.tracker.tasks().len() as u16 + 2),
            Constraint::Min(0),
        ])
        .split(area);

    let progress = state.tracker.progress();
    let gauge_color = match state.tracker.outcome() {
        Some(RunOutcome::Failure { .. }) => theme.critical,
        Some(RunOutcome::Success { .. }) => theme.ok,
        None => theme.info,
    };
    frame.render_widget(
        Gauge::default()
            .block(panel("Progress", theme))
            .gauge_style(Style::default().fg(gauge_color).bg(theme.bg))
            .percent(u16::from(progress))
            .label(format!(
                "{progress}%  {}/{} tasks",
                state.tracker.completed_count(),
                state.tracker.tasks().len()
            )),
        rows[0],
    );

    frame.render_widget(task_list(state, theme), rows[1]);
    frame.render_widget(activity_list(app, state, theme), rows[2]);
}

fn task_list(state: &SessionState, theme: Theme) -> List<'static> {
    let items: Vec<ListItem<'static>> = state
        .tracker
        .tasks()
        .iter()
        .map(|task| {
            let color = theme.status_color(task.status);
            let mut spans = vec![
                Span::styled(
                    format!("[{}] ", status_icon(task.status)),
                    Style::default().fg(color),
                ),
                Span::styled(
                    format!("{:<20}", task.display_name),
                    Style::default().fg(theme.text),
                ),
                Span::styled(
                    format!("{:<12}", task.status.label()),
                    Style::default().fg(color).add_modifier(Modifier::BOLD),
                ),
            ];
            if let Some(error) = &task.error {
                spans.push(Span::styled(
                    error.clone(),
                    Style::default().fg(theme.critical),
                ));
            }
            ListItem::new(Line::from(spans))
        })
        .collect();
    List::new(items).block(panel("Tasks", theme))
}

fn activity_list(app: &App, state: &SessionState, theme: Theme) -> List<'static> {
    let items: Vec<ListItem<'static>> = state
        .activity
        .iter()
        .skip(app.scroll as usize)
        .map(|entry| {
            ListItem::new(Line::from(vec![
                Span::styled(
                    format!("{} ", entry.clock()),
                    Style::default().fg(theme.muted),
                ),
                Span::styled(
                    format!("{:<8}", entry.level.as_str()),
                    Style::default().fg(theme.level_color(entry.level)),
                ),
                Span::styled(entry.text.clone(), Style::default().fg(theme.text)),
            ]))
        })
        .collect();
    let items = if items.is_empty() {
        vec![ListItem::new(Span::styled(
            "No activity yet. Press i to enter a feature request.",
            Style::default().fg(theme.muted),
        ))]
    } else {
        items
    };
    List::new(items).block(panel("Activity", theme))
}

fn render_artifact(
    app: &App,
    state: &SessionState,
    category: OutputCategory,
    theme: Theme,
) -> Paragraph<'static> {
    let lines: Vec<Line<'static>> = match state.outputs.get(category) {
        Some(artifact) => {
            let mut lines = vec![
                Line::from(Span::styled(
                    format!(
                        "{} / {}  received {}",
                        artifact.agent,
                        artifact.task,
                        artifact.received_at.format("%H:%M:%S")
                    ),
                    Style::default().fg(theme.muted),
                )),
                Line::from(""),
            ];
            lines.extend(
                render_payload(category, &artifact.payload)
                    .lines()
                    .map(|line| Line::from(line.to_string())),
            );
            lines
        }
        None => vec![Line::from(Span::styled(
            format!("No {} output yet.", category.title()),
            Style::default().fg(theme.muted),
        ))],
    };
    Paragraph::new(Text::from(lines))
        .style(Style::default().fg(theme.text).bg(theme.surface))
        .block(panel(category.title(), theme))
        .wrap(Wrap { trim: false })
        .scroll((app.scroll, 0))
}

fn render_footer(app: &App, state: &SessionState, theme: Theme) -> Paragraph<'static> {
    let (title, line) = if app.editing {
        (
            "Feature request (Enter start, Esc cancel)",
            Line::from(vec![
                Span::styled(app.input.clone(), Style::default().fg(theme.text)),
                Span::styled("_", Style::default().fg(theme.accent)),
            ]),
        )
    } else if let Some(note) = &state.notification {
        (
            "Notice",
            Line::from(Span::styled(
                note.text.clone(),
                Style::default().fg(theme.level_color(note.level)),
            )),
        )
    } else if !app.input.is_empty() {
        (
            "Feature request",
            Line::from(Span::styled(
                app.input.clone(),
                Style::default().fg(theme.muted),
            )),
        )
    } else {
        (
            "Notice",
            Line::from(Span::styled(
                "ready (i request, s start, x stop, ? help)",
                Style::default().fg(theme.muted),
            )),
        )
    };
    Paragraph::new(line)
        .style(Style::default().fg(theme.text).bg(theme.bg))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(theme.border))
                .style(Style::default().bg(theme.bg))
                .title(Span::styled(title, theme.title_style())),
        )
}

fn render_help_overlay(frame: &mut Frame, theme: Theme) {
    let area = centered_rect(70, 70, frame.size());
    let lines = vec![
        Line::from(Span::styled("Controls", theme.title_style())),
        Line::from(Span::styled("Run", theme.section_style())),
        Line::from("  i        edit feature request (Enter start, Esc cancel)"),
        Line::from("  s        start crew with current request"),
        Line::from("  x        stop running crew"),
        Line::from("  c        clear progress, outputs and activity"),
        Line::from(""),
        Line::from(Span::styled("Views", theme.section_style())),
        Line::from("  1-5      Overview/Product Spec/Wireframe/Backend API/HTML"),
        Line::from("  Tab      cycle views"),
        Line::from("  j/k      scroll, g to top"),
        Line::from("  e        export current output to a file"),
        Line::from(""),
        Line::from(Span::styled("Connection & Exit", theme.section_style())),
        Line::from("  r        reconnect to the server"),
        Line::from("  ? or F1  toggle this help"),
        Line::from("  q        quit"),
    ];
    frame.render_widget(Clear, area);
    frame.render_widget(
        Paragraph::new(Text::from(lines))
            .style(Style::default().fg(theme.text).bg(theme.surface))
            .block(panel("Help", theme))
            .wrap(Wrap { trim: false }),
        area,
    );
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100u16.saturating_sub(percent_y)) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100u16.saturating_sub(percent_y)) / 2),
        ])
        .split(area);
    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100u16.saturating_sub(percent_x)) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100u16.saturating_sub(percent_x)) / 2),
        ])
        .split(vertical[1])[1]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crew_client::{CommandClient, Session};
    use crew_core::dispatch::{ClientEvent, CloseInfo};
    use crew_core::workflow::TaskSequence;
    use ratatui::{backend::TestBackend, Terminal};
    use serde_json::json;
    use std::path::PathBuf;
    use std::time::Duration;
    use url::Url;

    fn test_app() -> App {
        let commands = CommandClient::new(
            Url::parse("http://127.0.0.1:9").expect("url"),
            Duration::from_millis(200),
        )
        .expect("client");
        App::new(
            Session::new(TaskSequence::default(), commands),
            "http://127.0.0.1:9".to_string(),
            PathBuf::from("."),
        )
    }

    fn screen(app: &App) -> String {
        let mut terminal = Terminal::new(TestBackend::new(100, 30)).expect("terminal");
        terminal
            .draw(|frame| render_ui(frame, app))
            .expect("draw");
        let buffer = terminal.backend().buffer();
        let mut out = String::new();
        for y in 0..buffer.area.height {
            for x in 0..buffer.area.width {
                out.push_str(buffer.get(x, y).symbol());
            }
            out.push('\n');
        }
        out
    }

    #[test]
    fn overview_shows_tasks_and_activity() {
        let app = test_app();
        {
            let mut state = app.session.state();
            state.begin_start("build a settings page").expect("start");
            state.tracker.agent_start("Product Manager", "product_design_task");
        }
        let text = screen(&app);
        assert!(text.contains("Crew: running"));
        assert!(text.contains("Product Manager"));
        assert!(text.contains("Working..."));
        assert!(text.contains("Starting crew execution..."));
    }

    #[test]
    fn header_reports_server_clients_and_last_close() {
        let app = test_app();
        {
            let mut state = app.session.state();
            state.apply_event(&ClientEvent::Connected);
            state.apply_event(&ClientEvent::Status(json!({
                "type": "status",
                "connections": 3,
            })));
        }
        assert!(screen(&app).contains("Clients: 3"));

        app.session
            .state()
            .apply_event(&ClientEvent::Disconnected(CloseInfo {
                code: 1006,
                reason: "connection reset".to_string(),
                clean: false,
            }));
        let text = screen(&app);
        assert!(!text.contains("Clients: 3"));
        assert!(text.contains("Last close: 1006 connection reset"));
    }

    #[test]
    fn artifact_tab_renders_pretty_json() {
        let mut app = test_app();
        app.session.state().outputs.update(
            "Backend Engineer",
            "backend_development_task",
            r#"{"routes":["/settings"]}"#,
            None,
        );
        app.select_tab(Tab::BackendApi);
        let text = screen(&app);
        assert!(text.contains(r#""routes": ["#));
        assert!(text.contains(r#""/settings""#));
    }

    #[test]
    fn help_overlay_lists_controls() {
        let mut app = test_app();
        app.help_open = true;
        let text = screen(&app);
        assert!(text.contains("Controls"));
        assert!(text.contains("reconnect to the server"));
    }

    #[test]
    fn centered_rect_stays_inside_area() {
        let area = Rect::new(0, 0, 100, 40);
        let inner = centered_rect(70, 70, area);
        assert!(inner.width <= 70 && inner.height <= 28);
        assert!(inner.x >= 15 && inner.y >= 6);
    }
}
