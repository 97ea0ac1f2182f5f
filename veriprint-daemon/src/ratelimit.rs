//! Startup rate limiter.
//!
//! A crash-looping daemon would hammer the sensor on every restart, so
//! each start is recorded in a persisted log (one floating-point Unix
//! timestamp per line) and startup is refused once the 60-second
//! sliding window holds too many starts. This runs before any hardware
//! access.

use std::io;
use std::path::Path;

/// Sliding-window length in seconds.
pub const WINDOW_SECS: f64 = 60.0;

/// Maximum starts tolerated inside the window.
pub const MAX_STARTS: usize = 10;

#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    /// Startup refused: `count` starts inside the window.
    #[error("{count} restarts within {WINDOW_SECS}s, refusing to start")]
    TooManyRestarts { count: usize },

    #[error("failed to access restart log {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> RateLimitError + '_ {
    move |source| RateLimitError::Io { path: path.display().to_string(), source }
}

/// Record this start in the log at `path` and enforce the threshold.
///
/// Entries older than the window are pruned before the new timestamp is
/// appended. The appended timestamp is persisted even when the
/// threshold is exceeded, so it counts against subsequent attempts.
pub fn record_start(path: &Path, now: f64) -> Result<usize, RateLimitError> {
    let mut log = read_log(path)?;
    log.retain(|&ts| now - ts <= WINDOW_SECS);
    log.push(now);
    write_log(path, &log)?;

    let count = log.len();
    if count > MAX_STARTS {
        return Err(RateLimitError::TooManyRestarts { count });
    }
    tracing::debug!(count, "restart budget ok");
    Ok(count)
}

fn read_log(path: &Path) -> Result<Vec<f64>, RateLimitError> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(io_err(path)(e)),
    };

    let mut log = Vec::new();
    for line in raw.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match line.parse::<f64>() {
            Ok(ts) => log.push(ts),
            Err(_) => tracing::warn!(line, "skipping malformed restart-log entry"),
        }
    }
    Ok(log)
}

fn write_log(path: &Path, log: &[f64]) -> Result<(), RateLimitError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(io_err(path))?;
    }
    let mut out = String::new();
    for ts in log {
        out.push_str(&format!("{ts}\n"));
    }
    std::fs::write(path, out).map_err(io_err(path))
}
