use crate::engine::JobState;
use crate::ui::sinks::{ProgressEvent, ProgressSink};
use std::io::{self, Write};
use std::sync::Mutex;
use std::time::{Duration, Instant};

pub(crate) const SPINNER_FRAMES: [&str; 4] = ["·", "˚", "•", "˚"];

const GREEN: &str = "\x1b[38;5;82m";
const GRAY: &str = "\x1b[38;5;240m";
const CYAN: &str = "\x1b[38;5;51m";
const RED: &str = "\x1b[38;5;196m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

pub struct ProgressBar {
    width: usize,
    frame: usize,
    start: Instant,
    first_render: bool,
}

impl ProgressBar {
    /// width = number of bar character slots (not including the brackets)
    pub fn new(width: usize) -> Self {
        Self {
            width,
            frame: 0,
            start: Instant::now(),
            first_render: true,
        }
    }

    /// Build the two display lines for an event: status line, then the bar
    pub fn lines(&self, event: &ProgressEvent) -> (String, String) {
        let pct = if event.percent.is_nan() {
            0.0
        } else {
            event.percent.clamp(0.0, 100.0)
        };

        let filled = ((pct / 100.0) * self.width as f64).round() as usize;
        let empty = self.width.saturating_sub(filled);
        let fill_color = if event.state == JobState::Failed {
            RED
        } else {
            GREEN
        };
        let bar = format!(
            "{}{}{}{}{}{}{}",
            BOLD,
            fill_color,
            "█".repeat(filled),
            RESET,
            GRAY,
            "░".repeat(empty),
            RESET
        );

        let pass = if event.total_passes > 0 {
            format!("pass {}/{}", event.pass_number, event.total_passes)
        } else {
            "pass -/-".to_string()
        };
        let elapsed = Duration::from_secs(self.start.elapsed().as_secs());
        let status = format!(
            "{:?} {} {}  {}",
            event.state,
            pass,
            SPINNER_FRAMES[self.frame % SPINNER_FRAMES.len()],
            event.message
        );
        let info = format!(
            "{}{:.1}%{}  {}elapsed {}{}",
            BOLD,
            pct,
            RESET,
            CYAN,
            humantime::format_duration(elapsed),
            RESET
        );

        (status, format!("[{}] {}", bar, info))
    }

    /// Render the event, redrawing over the previous two lines
    pub fn render(&mut self, event: &ProgressEvent) {
        self.frame = (self.frame + 1) % SPINNER_FRAMES.len();
        let (status, bar) = self.lines(event);

        let mut out = io::stdout().lock();
        if self.first_render {
            let _ = write!(out, "{}\n{}\n", status, bar);
            self.first_render = false;
        } else {
            // \x1b[2A moves up 2 lines, \x1b[2K clears line
            let _ = write!(out, "\x1b[2A\x1b[2K\r{}\n\x1b[2K\r{}\n", status, bar);
        }
        let _ = out.flush();
    }
}

/// Progress sink that draws a `ProgressBar` on the terminal
pub struct TerminalProgress {
    bar: Mutex<ProgressBar>,
}

impl TerminalProgress {
    pub fn new(width: usize) -> Self {
        Self {
            bar: Mutex::new(ProgressBar::new(width)),
        }
    }
}

impl ProgressSink for TerminalProgress {
    fn emit(&self, event: &ProgressEvent) {
        if let Ok(mut bar) = self.bar.lock() {
            bar.render(event);
        }
    }
}

/// Convert bytes/sec to readable string
pub fn human_bytes(bps: f64) -> String {
    let units = ["B", "KB", "MB", "GB", "TB"];
    if bps <= 0.0 {
        return "0B".to_string();
    }
    let mut val = bps;
    let mut i = 0usize;
    while val >= 1024.0 && i + 1 < units.len() {
        val /= 1024.0;
        i += 1;
    }
    format!("{:.2}{}", val, units[i])
}
