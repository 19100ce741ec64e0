//! Progress reporting through Termux notifications.
//!
//! A [`ProgressLog`] keeps two views over the same append-only event
//! sequence: a bounded window of recent lines, rendered as the body of one
//! persistent ("ongoing") notification that is refreshed on every event,
//! and the unbounded full history, wired into the notification as a
//! drill-down action that opens a confirmation dialog. At the end of the
//! run the notification is re-rendered once without the ongoing flag.
//!
//! All three Termux surface commands (`termux-notification`,
//! `termux-dialog`, `termux-toast`) are optional; when absent, rendering
//! silently does nothing. Every event is also mirrored to the `log` facade,
//! so the diagnostic stream stays useful off-device.
//!
//! Orchestration is sequential, so exclusive `&mut` access is all the
//! serialization the buffers need. Parallel downloads would have to put
//! this behind a mutex or a single owning task to keep renders ordered.

use std::collections::VecDeque;

use crate::tools::{self, ToolRun};

/// Notification command for the persistent, updating message.
const NOTIFICATION_CMD: &str = "termux-notification";
/// Dialog command the drill-down action is rendered against.
const DIALOG_CMD: &str = "termux-dialog";
/// Command for short one-shot toasts.
const TOAST_CMD: &str = "termux-toast";

/// Severity of one logged event.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Severity {
    Debug,
    Info,
    Warn,
    Error,
}

impl Severity {
    /// Prefix under which the event appears in the notification body.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
        }
    }
}

/// Progress logger backing one persistent notification.
///
/// Constructed once per run and threaded as an explicit dependency into
/// every component that emits events. Two states: active (accepting
/// [`log`](Self::log) calls, notification ongoing) and finalized (terminal;
/// reached exactly once through [`finalize`](Self::finalize), which the
/// caller must arrange to hit even on early error paths).
#[derive(Debug)]
pub struct ProgressLog {
    /// Notification id, also the program name.
    prog_name: String,
    /// Human title: the program name with dashes as spaces.
    prog_label: String,
    /// Capacity of the recent window.
    max_recent: usize,
    /// Last `max_recent` lines, oldest first.
    recent: VecDeque<String>,
    /// Every line logged during this run.
    history: Vec<String>,
    finalized: bool,
}

impl ProgressLog {
    /// Creates an active logger whose notification body shows the last
    /// `max_recent` lines.
    #[must_use]
    pub fn new(prog_name: &str, max_recent: usize) -> Self {
        Self {
            prog_name: prog_name.to_string(),
            prog_label: prog_name.replace('-', " "),
            max_recent,
            recent: VecDeque::with_capacity(max_recent),
            history: Vec::new(),
            finalized: false,
        }
    }

    /// Appends one event and refreshes the ongoing notification.
    ///
    /// The event is mirrored to the `log` facade, appended to the full
    /// history, and rotated into the recent window (evicting the oldest
    /// line at capacity). Ignored after [`finalize`](Self::finalize).
    pub async fn log(&mut self, severity: Severity, text: &str) {
        if self.finalized {
            debug!("dropping log event after finalize: {text}");
            return;
        }

        match severity {
            Severity::Debug => debug!("{text}"),
            Severity::Info => info!("{text}"),
            Severity::Warn => warn!("{text}"),
            Severity::Error => error!("{text}"),
        }

        self.push(format!("{}: {}", severity.label(), text));
        self.show(true).await;
    }

    /// Logs a debug event.
    pub async fn debug(&mut self, text: &str) {
        self.log(Severity::Debug, text).await;
    }

    /// Logs an info event.
    pub async fn info(&mut self, text: &str) {
        self.log(Severity::Info, text).await;
    }

    /// Logs a warning event.
    pub async fn warn(&mut self, text: &str) {
        self.log(Severity::Warn, text).await;
    }

    /// Logs an error event.
    pub async fn error(&mut self, text: &str) {
        self.log(Severity::Error, text).await;
    }

    /// Logs an info event and shows a green success toast.
    pub async fn success(&mut self, text: &str) {
        self.log(Severity::Info, text).await;
        toast(text, "green", "black", "bottom").await;
    }

    /// Logs an error event and shows a red failure toast.
    pub async fn failure(&mut self, text: &str) {
        self.log(Severity::Error, text).await;
        toast(text, "red", "black", "bottom").await;
    }

    /// Logs a warning event and shows an orange warning toast.
    pub async fn warn_toast(&mut self, text: &str) {
        self.log(Severity::Warn, text).await;
        toast(text, "orange", "black", "bottom").await;
    }

    /// Ends the run: re-renders the notification without the ongoing flag.
    ///
    /// Transitions to the terminal state exactly once; repeated calls are
    /// no-ops. When nothing was logged, no notification exists and nothing
    /// is rendered.
    pub async fn finalize(&mut self) {
        if self.finalized {
            return;
        }
        self.finalized = true;

        if !self.history.is_empty() {
            self.show(false).await;
        }
    }

    /// Rotates a line into both views.
    fn push(&mut self, line: String) {
        if self.recent.len() == self.max_recent {
            self.recent.pop_front();
        }
        if self.max_recent > 0 {
            self.recent.push_back(line.clone());
        }
        self.history.push(line);
    }

    /// Shell command string that opens the full history in a dialog.
    ///
    /// Attached to the notification as its tap action; only ever executed by
    /// Termux on user interaction, never by this process.
    fn dialog_action(&self) -> String {
        let title = format!("{} - All Logs", self.prog_label);
        let content = self.history.join("\n");
        format!(
            "{DIALOG_CMD} confirm -t {} -i {}",
            shell_quote(&title),
            shell_quote(&content),
        )
    }

    /// Builds the full notification argv, or `None` when there is nothing
    /// to render.
    fn render_args(&self, ongoing: bool) -> Option<Vec<String>> {
        if self.recent.is_empty() {
            return None;
        }

        let content = self
            .recent
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("\n");

        let mut args = Vec::with_capacity(10);
        if ongoing {
            args.push("--ongoing".to_string());
        }
        args.extend([
            "--alert-once".to_string(),
            "--action".to_string(),
            self.dialog_action(),
            "--id".to_string(),
            self.prog_name.clone(),
            "--title".to_string(),
            self.prog_label.clone(),
            "--content".to_string(),
            content,
        ]);
        Some(args)
    }

    /// Renders the notification, skipping silently when the surface command
    /// is absent. The same full window content is sent every time; rendering
    /// is idempotent per call.
    async fn show(&self, ongoing: bool) {
        let Some(args) = self.render_args(ongoing) else {
            return;
        };

        match tools::run(NOTIFICATION_CMD, &args).await {
            // a missing surface or an unhappy exit both degrade to nothing
            Ok(ToolRun::Unavailable | ToolRun::Finished(_)) => {}
            Err(e) => debug!("notification render failed: {e}"),
        }
    }
}

/// Shows a one-shot toast, skipping silently when `termux-toast` is absent.
pub async fn toast(message: &str, background: &str, foreground: &str, position: &str) {
    let args = ["-b", background, "-c", foreground, "-g", position, message];
    if let Err(e) = tools::run(TOAST_CMD, args).await {
        debug!("toast failed: {e}");
    }
}

/// Quotes one string for safe use inside a POSIX shell command line.
fn shell_quote(text: &str) -> String {
    format!("'{}'", text.replace('\'', "'\\''"))
}
