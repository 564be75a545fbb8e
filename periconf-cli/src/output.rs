//! Terminal rendering of session output.
//!
//! Device data (text, settings reports, binary previews) goes to stdout so it
//! can be piped; everything about the session itself goes to stderr.

use {
    console::style,
    periconf::{OutputLine, OutputSink},
};

/// [`OutputSink`] writing to the terminal.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleSink {
    quiet: bool,
}

impl ConsoleSink {
    /// With `quiet` set, sent commands and status notices are not shown.
    pub fn new(quiet: bool) -> Self {
        Self { quiet }
    }
}

impl OutputSink for ConsoleSink {
    fn emit(&mut self, line: OutputLine) {
        match &line {
            OutputLine::Text(text) => println!("{text}"),
            OutputLine::Setting(text) => println!("{}", style(text).cyan()),
            OutputLine::Binary(_) => println!("{}", style(&line).dim()),
            OutputLine::Sent(_) => {
                if !self.quiet {
                    eprintln!(
                        "{}",
                        style(&line)
                            .for_stderr()
                            .dim()
                    );
                }
            },
            OutputLine::Status(text) => {
                if !self.quiet {
                    eprintln!("{} {text}", style("ℹ").for_stderr().blue());
                }
            },
            OutputLine::Error(text) => {
                eprintln!(
                    "{} {text}",
                    style("✗")
                        .for_stderr()
                        .red()
                );
            },
        }
    }
}
