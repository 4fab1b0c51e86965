//! Spinner shown while the matrix runs

use super::context::UiContext;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Elapsed-time spinner in a terminal, a single plain line in CI
pub struct RunSpinner {
    bar: Option<ProgressBar>,
}

impl RunSpinner {
    pub fn start(ctx: &UiContext, message: &str) -> Self {
        let bar = if ctx.use_fancy_output() {
            let bar = ProgressBar::new_spinner();
            let template = ProgressStyle::default_spinner()
                .template("  {spinner:.cyan} {msg}  {elapsed:.dim}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ");
            bar.set_style(template);
            bar.set_message(message.to_string());
            bar.enable_steady_tick(Duration::from_millis(120));
            Some(bar)
        } else {
            println!("{} {}", style("...").dim(), message);
            None
        };
        Self { bar }
    }

    pub fn set_message(&self, message: &str) {
        if let Some(bar) = &self.bar {
            bar.set_message(message.to_string());
        }
    }

    /// Stop and clear the spinner line
    pub fn finish(self) {
        if let Some(bar) = self.bar {
            bar.finish_and_clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_spinner() {
        let spinner = RunSpinner::start(&UiContext::non_interactive(), "Running 3 platforms");
        spinner.set_message("still running");
        spinner.finish();
    }
}
