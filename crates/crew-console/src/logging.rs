use crate::config::RuntimeConfig;
use std::env;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tracing_subscriber::{fmt::writer::BoxMakeWriter, EnvFilter};

type SharedFile = Arc<Mutex<File>>;

/// Keeps the log file open for the life of the process.
pub struct LogGuard {
    pub path: Option<PathBuf>,
    file: Option<SharedFile>,
}

struct MultiWriter {
    stdout_enabled: bool,
    file: Option<SharedFile>,
}

/// The terminal belongs to the UI, so logs go to a file unless
/// CREW_LOG_STDOUT asks for a copy on stdout.
pub fn init_logging(config: &RuntimeConfig) -> Option<LogGuard> {
    let level = env::var("CREW_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let guard = match open_log_file(&config.log_dir) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("log_file_error: {err}");
            LogGuard {
                path: None,
                file: None,
            }
        }
    };
    let file = guard.file.clone();
    let stdout_enabled = config.log_stdout;
    let make_writer = BoxMakeWriter::new(move || MultiWriter::new(file.clone(), stdout_enabled));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(make_writer)
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        return None;
    }
    Some(guard)
}

fn open_log_file(log_dir: &str) -> io::Result<LogGuard> {
    if log_dir.trim().is_empty() {
        return Ok(LogGuard {
            path: None,
            file: None,
        });
    }
    let dir = Path::new(log_dir);
    fs::create_dir_all(dir)?;
    let path = dir.join(log_file_name(std::process::id()));
    let file = OpenOptions::new().create(true).append(true).open(&path)?;
    Ok(LogGuard {
        path: Some(path),
        file: Some(Arc::new(Mutex::new(file))),
    })
}

fn log_file_name(pid: u32) -> String {
    format!("crew-console-{pid}.log")
}

impl MultiWriter {
    fn new(file: Option<SharedFile>, stdout_enabled: bool) -> Self {
        Self {
            stdout_enabled,
            file,
        }
    }
}

impl Write for MultiWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.stdout_enabled {
            let _ = io::stdout().write_all(buf);
        }
        if let Some(file) = &self.file {
            let mut file = file.lock().unwrap_or_else(PoisonError::into_inner);
            let _ = file.write_all(buf);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.stdout_enabled {
            let _ = io::stdout().flush();
        }
        if let Some(file) = &self.file {
            let mut file = file.lock().unwrap_or_else(PoisonError::into_inner);
            let _ = file.flush();
        }
        Ok(())
    }
}
