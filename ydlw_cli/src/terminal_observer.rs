use indicatif::{ProgressBar, ProgressStyle};

use ydlw_core::{Callback, CallbackError, Message};

/// Renders session messages in the terminal.
///
/// Progress messages drive a single percent bar whose message is the status
/// line; plain text lines are printed above the bar.
#[derive(Clone)]
pub struct TerminalProgressObserver {
    bar: ProgressBar,
}

impl TerminalProgressObserver {
    pub fn new() -> Self {
        let style = ProgressStyle::with_template("[{bar:30.cyan/blue}] {pos:>3}% {msg}")
            .map(|s| s.progress_chars("=>-"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());

        let bar = ProgressBar::new(100);
        bar.set_style(style);
        Self { bar }
    }

    pub fn on_message(&self, msg: &Message) -> bool {
        match msg {
            Message::Progress(p) => {
                self.bar.set_position(u64::from(p.percent().min(100)));
                self.bar.set_message(p.text().to_string());
            }
            Message::Text(line) => self.bar.println(line.trim_end()),
        }
        true
    }

    /// Session callback that forwards to this observer.
    pub fn callback(&self) -> Callback {
        let observer = self.clone();
        Box::new(move |msg: &Message| -> Result<bool, CallbackError> {
            Ok(observer.on_message(msg))
        })
    }

    pub fn finish(&self, message: String) {
        self.bar.finish_with_message(message);
    }

    pub fn abandon(&self, message: String) {
        self.bar.abandon_with_message(message);
    }
}
