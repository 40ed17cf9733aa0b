use crate::output::is_quiet;
use indicatif::{HumanDuration, ProgressBar};
use std::time::Duration;

pub struct Spinner {
    pb: ProgressBar,
}

impl Spinner {
    pub fn new(message: &str) -> Self {
        let pb = if is_quiet() || !console::Term::stderr().is_term() {
            ProgressBar::hidden()
        } else {
            ProgressBar::new_spinner()
        };
        pb.set_message(message.to_string());
        if !pb.is_hidden() {
            pb.enable_steady_tick(Duration::from_millis(100));
        }
        Self { pb }
    }

    pub fn finish_and_clear(&self) {
        self.pb.finish_and_clear();
    }
}

/// Human-readable duration, e.g. `3 seconds`
pub fn elapsed(duration: Duration) -> String {
    HumanDuration(duration).to_string()
}
