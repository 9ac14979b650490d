use indicatif::{ProgressBar, ProgressStyle};

use crate::ui::{OutputFormat, get_output_format};

/// Spinner for a running package manager invocation. Hidden in JSON mode so
/// event lines stay machine readable.
pub fn create_spinner(message: String) -> ProgressBar {
    if get_output_format() == OutputFormat::Json {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner} {msg} [{elapsed}]") {
        pb.set_style(style.tick_chars("⠁⠉⠙⠚⠒⠂⠂⠒⠲⠴⠤⠄⠄⠤⠠⠠⠤⠦⠖⠒⠐⠐⠒⠓⠋ "));
    }
    pb.set_message(message);
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}
