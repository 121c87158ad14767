//! Terminal progress bar for downloads.

use std::io::{self, IsTerminal};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use updraft::ProgressSink;

/// Download progress rendered with `indicatif`; hidden when stderr is not a terminal.
#[derive(Clone)]
pub struct TerminalProgress {
    bar: ProgressBar,
}

impl TerminalProgress {
    /// Bar labelled `label`.
    #[must_use]
    pub fn new(label: &str) -> Self {
        let bar = if io::stderr().is_terminal() {
            ProgressBar::no_length()
        } else {
            ProgressBar::hidden()
        };
        bar.set_message(label.to_string());
        Self { bar }
    }
}

impl ProgressSink for TerminalProgress {
    fn start(&self, total: Option<u64>) {
        match total {
            Some(total) => {
                self.bar.set_length(total);
                if let Ok(style) = ProgressStyle::with_template(
                    "{msg:<12} [{bar:30.cyan/blue}] {bytes}/{total_bytes} {bytes_per_sec} {eta}",
                ) {
                    self.bar.set_style(style.progress_chars("=>-"));
                }
            }
            None => {
                if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg} {bytes}") {
                    self.bar.set_style(style);
                }
                self.bar.enable_steady_tick(Duration::from_millis(80));
            }
        }
        self.bar.reset();
    }

    fn advance(&self, bytes: u64) {
        self.bar.inc(bytes);
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}
