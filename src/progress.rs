//! Progress reporting for the walk, hash and clone phases.
//!
//! Pipeline stages report through the [`ProgressCallback`] trait. Two
//! implementations ship with the crate:
//!
//! - [`Progress`]: indicatif bars, used when stderr is a terminal
//! - [`LogProgress`]: one `info` log line per whole-percent change, used
//!   when output is redirected or bars are disabled
//!
//! Hash workers call [`ProgressCallback::on_progress`] concurrently, so
//! implementations must be `Send + Sync`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

/// Phase name for directory enumeration.
pub const PHASE_WALK: &str = "walking";
/// Phase name for candidate hashing.
pub const PHASE_HASH: &str = "hashing";
/// Phase name for clone replacement.
pub const PHASE_CLONE: &str = "cloning";

/// Receives progress updates from pipeline stages.
pub trait ProgressCallback: Send + Sync {
    /// A phase begins with `total` items (0 when unknown).
    fn on_phase_start(&self, phase: &str, total: usize);

    /// `current` items of the active phase are done; `path` is the latest.
    fn on_progress(&self, current: usize, path: &str);

    /// An item of `bytes` bytes finished processing.
    fn on_item_completed(&self, _bytes: u64) {}

    /// The phase finished.
    fn on_phase_end(&self, phase: &str);

    /// Free-form status line.
    fn on_message(&self, _message: &str) {}
}

/// Whole percentage of `done` out of `total`, clamped to 0..=100.
///
/// An empty job is reported as complete.
#[must_use]
pub fn percent_complete(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    let pct = (done as u128 * 100) / total as u128;
    pct.min(100) as u8
}

/// Terminal progress bars.
pub struct Progress {
    multi: MultiProgress,
    active: Mutex<Option<ProgressBar>>,
}

impl Default for Progress {
    fn default() -> Self {
        Self::new()
    }
}

impl Progress {
    /// Create a reporter drawing to stderr.
    #[must_use]
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            active: Mutex::new(None),
        }
    }

    fn spinner_style() -> ProgressStyle {
        ProgressStyle::with_template("{spinner:.green} {msg} [{elapsed_precise}] {pos} files")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
    }

    fn bar_style() -> ProgressStyle {
        ProgressStyle::with_template(
            "[{elapsed_precise}] [{bar:40.green/blue}] {pos}/{len} ({percent}%) {msg} (ETA: {eta})",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█>-")
    }

    fn with_active(&self, f: impl FnOnce(&ProgressBar)) {
        let guard = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(pb) = guard.as_ref() {
            f(pb);
        }
    }
}

impl ProgressCallback for Progress {
    fn on_phase_start(&self, phase: &str, total: usize) {
        let pb = if phase == PHASE_WALK || total == 0 {
            let pb = self.multi.add(ProgressBar::new_spinner());
            pb.set_style(Self::spinner_style());
            pb.enable_steady_tick(Duration::from_millis(100));
            pb
        } else {
            let pb = self.multi.add(ProgressBar::new(total as u64));
            pb.set_style(Self::bar_style());
            pb
        };
        pb.set_message(phase_label(phase));

        let previous = self
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(pb);
        if let Some(previous) = previous {
            previous.finish_and_clear();
        }
    }

    fn on_progress(&self, current: usize, path: &str) {
        self.with_active(|pb| {
            pb.set_position(current as u64);
            pb.set_message(truncate_path(path, 30));
        });
    }

    fn on_phase_end(&self, phase: &str) {
        let finished = self
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(pb) = finished {
            pb.finish_with_message(format!("{} complete", phase_label(phase)));
        }
    }

    fn on_message(&self, message: &str) {
        self.with_active(|pb| pb.set_message(message.to_string()));
    }
}

/// Logs "Hashing: N% complete" style lines as whole percentages change.
///
/// Each percentage is logged at most once per phase even when many workers
/// report concurrently.
#[derive(Debug, Default)]
pub struct LogProgress {
    total: AtomicUsize,
    last_percent: AtomicUsize,
    phase: Mutex<String>,
}

impl LogProgress {
    /// Create a log-based reporter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProgressCallback for LogProgress {
    fn on_phase_start(&self, phase: &str, total: usize) {
        self.total.store(total, Ordering::SeqCst);
        self.last_percent.store(0, Ordering::SeqCst);
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner) = phase_label(phase);
        if total > 0 {
            log::info!("{}: {} items", phase_label(phase), total);
        }
    }

    fn on_progress(&self, current: usize, _path: &str) {
        let total = self.total.load(Ordering::SeqCst);
        if total == 0 {
            return;
        }
        let pct = usize::from(percent_complete(current, total));
        let previous = self.last_percent.fetch_max(pct, Ordering::SeqCst);
        if pct > previous {
            let phase = self.phase.lock().unwrap_or_else(PoisonError::into_inner);
            log::info!("{}: {}% complete", phase, pct);
        }
    }

    fn on_phase_end(&self, phase: &str) {
        log::debug!("{} finished", phase_label(phase));
    }

    fn on_message(&self, message: &str) {
        log::info!("{}", message);
    }
}

fn phase_label(phase: &str) -> String {
    let mut chars = phase.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Shorten a path to at most `max_len` characters, keeping the file name.
fn truncate_path(path: &str, max_len: usize) -> String {
    if path.chars().count() <= max_len {
        return path.to_string();
    }

    let file_name = std::path::Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let name_len = file_name.chars().count();
    if name_len + 4 > max_len {
        let keep = max_len.saturating_sub(3);
        let tail: String = file_name.chars().skip(name_len.saturating_sub(keep)).collect();
        return format!("...{tail}");
    }

    format!(".../{file_name}")
}
