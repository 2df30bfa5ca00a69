//! Progress bar fed by pipeline status events.

use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc::UnboundedReceiver;
use vitabundle::pipeline::StatusEvent;

/// Terminal rendering of the status stream.
///
/// Status text is printed above the bar; the bar shows the current stage
/// percentage and the first line of the latest text.
#[derive(Clone)]
pub struct StatusView {
    bar: ProgressBar,
}

impl StatusView {
    /// Create a hidden-until-used bar spanning 0..=100.
    pub fn new() -> Self {
        let bar = ProgressBar::new(100);
        let bar_style = ProgressStyle::default_bar()
            .template("[{bar:40.cyan/blue}] {pos:>3}% {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-");
        bar.set_style(bar_style);
        Self { bar }
    }

    /// Render one event.
    pub fn apply(&self, event: StatusEvent) {
        match event {
            StatusEvent::Text(text) => {
                self.bar.println(format!("{} {}", style("::").cyan().bold(), text));
                self.bar.set_message(headline(&text).to_string());
            }
            StatusEvent::Percent(percent) => {
                self.bar.set_position(u64::from(percent));
            }
        }
    }

    /// Render events until every sender is gone.
    pub async fn follow(self, mut rx: UnboundedReceiver<StatusEvent>) {
        while let Some(event) = rx.recv().await {
            self.apply(event);
        }
    }

    /// Leave the bar at its final position.
    pub fn finish(&self) {
        self.bar.finish();
    }

    /// Stop the bar after a failure.
    pub fn abandon(&self) {
        self.bar.abandon();
    }

    /// Current percentage shown.
    pub fn position(&self) -> u64 {
        self.bar.position()
    }
}

impl Default for StatusView {
    fn default() -> Self {
        Self::new()
    }
}

/// First non-empty line of a status text.
pub fn headline(text: &str) -> &str {
    text.lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("")
}
