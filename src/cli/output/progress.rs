//! Spinners for long-running commands.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::Duration;

const SPINNER_TEMPLATE: &str = "[{elapsed_precise}] {spinner:.green} {msg}";
const SPINNER_CHARS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏";

/// Create a spinner on stderr; hidden in JSON mode so stdout stays parseable.
pub fn create_spinner(message: impl Into<String>, json_mode: bool) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    if json_mode || !console::Term::stderr().is_term() {
        spinner.set_draw_target(ProgressDrawTarget::hidden());
    } else {
        spinner.set_draw_target(ProgressDrawTarget::stderr());
    }
    if let Ok(style) = ProgressStyle::default_spinner().template(SPINNER_TEMPLATE) {
        spinner.set_style(style.tick_chars(SPINNER_CHARS));
    }
    spinner.set_message(message.into());
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spinner_hidden_in_json_mode() {
        let spinner = create_spinner("working", true);
        assert!(spinner.is_hidden());
        assert_eq!(spinner.message(), "working");
        spinner.finish_and_clear();
    }
}
