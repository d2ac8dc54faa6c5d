mod app;
mod config;
mod export;
mod logging;
mod theme;
mod ui;

use app::{handle_input, App, InputAction};
use clap::Parser;
use config::{load_config, Args, RuntimeConfig};
use crew_client::{CommandClient, ConnectionManager, ConnectionState, Session};
use crew_core::dispatch::{ConnectionEvent, Dispatcher};
use crew_core::workflow::TaskSequence;
use crossterm::{
    event::{DisableFocusChange, EnableFocusChange, EventStream},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use futures_util::StreamExt;
use ratatui::{backend::CrosstermBackend, Terminal};
use serde_json::json;
use std::error::Error;
use std::io;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

const REDRAW_INTERVAL: Duration = Duration::from_millis(250);

type ConsoleTerminal = Terminal<CrosstermBackend<io::Stdout>>;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let config = load_config(Args::parse())?;
    if config.probe {
        return probe(&config).await;
    }
    let _log_guard = logging::init_logging(&config);
    info!(
        "console_start: server={} ws={}",
        config.client.server_url, config.client.connection.url
    );

    let commands = CommandClient::new(
        config.client.server_url.clone(),
        config.client.request_timeout,
    )?;
    let session = Session::new(TaskSequence::default(), commands);
    let mut dispatcher = Dispatcher::new();
    session.subscribe(&mut dispatcher);
    let (mut manager, conn_rx) = ConnectionManager::new(config.client.connection.clone());
    manager.connect();

    let mut app = App::new(
        session,
        config.client.server_url.to_string(),
        config.export_dir.clone(),
    );
    let mut terminal = setup_terminal()?;
    let result = run_app(&mut terminal, &mut app, &mut manager, &mut dispatcher, conn_rx).await;
    manager.close().await;
    restore_terminal(&mut terminal)?;

    if let Err(err) = &result {
        warn!("console_error: {err}");
    }
    info!("console_stop");
    result
}

async fn probe(config: &RuntimeConfig) -> Result<(), Box<dyn Error>> {
    let commands = CommandClient::new(
        config.client.server_url.clone(),
        config.client.request_timeout,
    )?;
    let health = commands.health().await?;
    let status = commands.status().await?;
    println!(
        "{}",
        serde_json::to_string_pretty(&json!({ "health": health, "status": status }))?
    );
    Ok(())
}

fn setup_terminal() -> io::Result<ConsoleTerminal> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableFocusChange)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout))?;
    terminal.clear()?;
    Ok(terminal)
}

fn restore_terminal(terminal: &mut ConsoleTerminal) -> io::Result<()> {
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        DisableFocusChange,
        LeaveAlternateScreen
    )?;
    terminal.show_cursor()
}

async fn run_app(
    terminal: &mut ConsoleTerminal,
    app: &mut App,
    manager: &mut ConnectionManager,
    dispatcher: &mut Dispatcher,
    mut conn_rx: mpsc::Receiver<ConnectionEvent>,
) -> Result<(), Box<dyn Error>> {
    let mut events = EventStream::new();
    let mut redraw = tokio::time::interval(REDRAW_INTERVAL);

    loop {
        app.connection = manager.state();
        app.reconnect_attempts = manager.reconnect_attempts();
        app.take_focus();
        terminal.draw(|frame| ui::render_ui(frame, app))?;

        tokio::select! {
            _ = redraw.tick() => {}
            Some(event) = conn_rx.recv() => {
                let connected = event == ConnectionEvent::Connected;
                dispatcher.handle(event);
                if connected {
                    manager.request_status();
                    let session = app.session.clone();
                    tokio::spawn(async move {
                        session.resync().await;
                    });
                }
            }
            maybe_event = events.next() => {
                let event = match maybe_event {
                    Some(Ok(event)) => event,
                    Some(Err(err)) => {
                        warn!("input_error: {err}");
                        continue;
                    }
                    None => break,
                };
                match handle_input(event, app) {
                    InputAction::None => {}
                    InputAction::Quit => break,
                    InputAction::Start(text) => {
                        let session = app.session.clone();
                        tokio::spawn(async move {
                            let _ = session.start_run(&text).await;
                        });
                    }
                    InputAction::Stop => {
                        let session = app.session.clone();
                        tokio::spawn(async move {
                            let _ = session.stop_run().await;
                        });
                    }
                    InputAction::Reconnect => {
                        info!("manual_reconnect");
                        manager.disconnect();
                        manager.connect();
                    }
                    InputAction::Resume => {
                        if manager.state() == ConnectionState::Closed {
                            info!("resume_reconnect");
                            manager.connect();
                        }
                    }
                }
            }
        }
    }
    Ok(())
}
