use crate::{
    config::Config,
    log::{log_level::LogLevel, log_msg::LogMsg, logger_handle::LoggerHandle},
};

use std::{
    fs::{self, OpenOptions},
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
    sync::mpsc::{self, Receiver, TrySendError},
    thread,
    time::{SystemTime, UNIX_EPOCH},
};

/// Lines between flushes. Debug builds flush often so a crash leaves a useful tail.
#[cfg(feature = "log-debug")]
const FLUSH_EVERY: u32 = 100;
#[cfg(not(feature = "log-debug"))]
const FLUSH_EVERY: u32 = 1_000;

const DEFAULT_APP_NAME: &str = "rustygate";
const DEFAULT_LEVEL: LogLevel = LogLevel::Info;
/// Lines at or above this level are mirrored to stderr.
const STDERR_LEVEL: LogLevel = LogLevel::Warn;

/// Per-process log file fed by a bounded queue.
///
/// Producers (poll loops, DTLS workers, the executor) log through cloned
/// [`LoggerHandle`]s and never block: a full queue drops the line. One
/// writer thread formats lines, appends them to the file and mirrors
/// warnings and errors to stderr. Dropping every handle ends the writer.
pub struct Logger {
    handle: LoggerHandle,
    _thread: Option<thread::JoinHandle<()>>,
    file_path: PathBuf,
}

impl Logger {
    /// Starts from the `[Logging]` section: `log_path` (directory, `~`
    /// expanded), `log_filename` (prefix) and `level`.
    #[must_use]
    pub fn start(cap: usize, config: &Config) -> Self {
        let app_name = config
            .get_non_empty("Logging", "log_filename")
            .unwrap_or(DEFAULT_APP_NAME);
        let level = match config.parse_value::<LogLevel>("Logging", "level") {
            Ok(level) => level.unwrap_or(DEFAULT_LEVEL),
            Err(e) => {
                eprintln!("{e}; logging at {DEFAULT_LEVEL}");
                DEFAULT_LEVEL
            }
        };
        let dir = config
            .get_non_empty("Logging", "log_path")
            .map_or_else(default_dir, expand_path);
        Self::start_with(dir, app_name, cap, level)
    }

    /// Logs into `logs/` next to the executable at the default level.
    #[must_use]
    pub fn start_default(app_name: &str, cap: usize) -> Self {
        Self::start_with(default_dir(), app_name, cap, DEFAULT_LEVEL)
    }

    pub fn start_in_dir<D: AsRef<Path>>(dir: D, app_name: &str, cap: usize) -> Self {
        Self::start_with(dir, app_name, cap, DEFAULT_LEVEL)
    }

    /// Creates `dir` if needed and opens `<app>-<YYYYMMDD_HHMMSS>-pid<N>.log`.
    pub fn start_with<D: AsRef<Path>>(
        dir: D,
        app_name: &str,
        cap: usize,
        min_level: LogLevel,
    ) -> Self {
        let dir = dir.as_ref().to_path_buf();
        let _ = fs::create_dir_all(&dir);
        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        let file_path = dir.join(format!(
            "{app_name}-{}-pid{}.log",
            filename_stamp(stamp),
            std::process::id()
        ));

        let (tx, rx) = mpsc::sync_channel::<LogMsg>(cap.max(1));
        let path = file_path.clone();
        let _thread = thread::Builder::new()
            .name("logger-worker".into())
            .spawn(move || write_lines(rx, open_writer(&path)))
            .ok();

        Self {
            handle: LoggerHandle { tx, min_level },
            _thread,
            file_path,
        }
    }

    /// Enqueues a line without blocking.
    ///
    /// # Errors
    /// See [`LoggerHandle::try_log`].
    pub fn try_log<S: Into<String>>(
        &self,
        level: LogLevel,
        text: S,
        target: &'static str,
    ) -> Result<(), TrySendError<LogMsg>> {
        self.handle.try_log(level, text, target)
    }

    #[must_use]
    pub fn handle(&self) -> LoggerHandle {
        self.handle.clone()
    }

    #[must_use]
    pub fn file_path(&self) -> &Path {
        &self.file_path
    }
}

/// Target file, then a temp-dir fallback, then nowhere.
fn open_writer(path: &Path) -> Box<dyn Write + Send> {
    let open = |p: &Path| OpenOptions::new().create(true).append(true).open(p);
    match open(path) {
        Ok(f) => Box::new(f),
        Err(_) => match open(&std::env::temp_dir().join("rustygate-fallback.log")) {
            Ok(f) => Box::new(f),
            Err(_) => Box::new(io::sink()),
        },
    }
}

fn write_lines(rx: Receiver<LogMsg>, writer: Box<dyn Write + Send>) {
    let mut out = BufWriter::new(writer);
    let mut since_flush: u32 = 0;
    while let Ok(m) = rx.recv() {
        let line = format_line(&m);
        let _ = writeln!(out, "{line}");
        if m.level >= STDERR_LEVEL {
            eprintln!("{line}");
        }
        since_flush += 1;
        if since_flush >= FLUSH_EVERY || m.level == LogLevel::Error {
            let _ = out.flush();
            since_flush = 0;
        }
    }
    let _ = out.flush();
}

/// `2026-01-31 23:59:59.123 WARN  rustygate::ice [ICE] ...`
fn format_line(m: &LogMsg) -> String {
    let secs = u64::try_from(m.ts_ms / 1000).unwrap_or_default();
    let millis = m.ts_ms % 1000;
    let time = civil_from_unix(secs).map_or_else(
        || format!("unix {secs}.{millis:03}"),
        |t| {
            format!(
                "{:04}-{:02}-{:02} {:02}:{:02}:{:02}.{millis:03}",
                t.year, t.mon, t.day, t.hour, t.min, t.sec
            )
        },
    );
    format!("{time} {:<5} {} {}", m.level.as_str(), m.target, m.text)
}

fn filename_stamp(secs: u64) -> String {
    civil_from_unix(secs).map_or_else(
        || format!("unix_{secs}"),
        |t| {
            format!(
                "{:04}{:02}{:02}_{:02}{:02}{:02}",
                t.year, t.mon, t.day, t.hour, t.min, t.sec
            )
        },
    )
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct CivilTime {
    year: i32,
    mon: u32,
    day: u32,
    hour: u32,
    min: u32,
    sec: u32,
}

/// UTC calendar fields from UNIX seconds (days-to-civil, proleptic Gregorian).
#[allow(clippy::many_single_char_names)]
fn civil_from_unix(secs: u64) -> Option<CivilTime> {
    let days = secs / 86_400;
    let rem = secs % 86_400;
    let hour = u32::try_from(rem / 3_600).ok()?;
    let min = u32::try_from(rem % 3_600 / 60).ok()?;
    let sec = u32::try_from(rem % 60).ok()?;

    let z = i128::from(days) + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1_460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = doy - (153 * mp + 2) / 5 + 1;
    let m = if mp < 10 { mp + 3 } else { mp - 9 };
    let y = yoe + era * 400 + i128::from(m <= 2);

    Some(CivilTime {
        year: i32::try_from(y).ok()?,
        mon: u32::try_from(m).ok()?,
        day: u32::try_from(d).ok()?,
        hour,
        min,
        sec,
    })
}

fn default_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(Path::to_path_buf))
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."))
        .join("logs")
}

/// `~` and `~/rest` become the home directory (`HOME`, then `USERPROFILE`).
fn expand_path(raw: &str) -> PathBuf {
    let home = || {
        std::env::var_os("HOME")
            .or_else(|| std::env::var_os("USERPROFILE"))
            .map(PathBuf::from)
    };
    match raw.strip_prefix('~') {
        Some("") => home().unwrap_or_else(|| PathBuf::from(raw)),
        Some(rest) if rest.starts_with('/') || rest.starts_with('\\') => {
            home().map_or_else(|| PathBuf::from(raw), |h| h.join(&rest[1..]))
        }
        _ => PathBuf::from(raw),
    }
}
