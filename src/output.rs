use std::io::{self, Stderr, Stdout, Write};

use crate::logging::log_trace;
use crate::orchestrator::{TurnEvent, TurnOutcome};
use crate::tools::ToolResult;

/// Width used for catalogue listings
pub const LISTING_WIDTH: usize = 100;

/// Wrap each line to `width`, continuing at the line's own indentation
pub fn wrap_text(text: &str, width: usize) -> String {
    text.lines()
        .map(|line| {
            if line.trim().is_empty() {
                return String::new();
            }
            let indent_len = line.len() - line.trim_start().len();
            let indent = &line[..indent_len];
            let options = textwrap::Options::new(width).subsequent_indent(indent);
            textwrap::fill(line, &options)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Status line shown after a tool call
pub fn tool_status_line(result: &ToolResult) -> String {
    match &result.outcome {
        Ok(text) => format!(
            "[{} finished in {}ms, {} chars]",
            result.operation,
            result.elapsed.as_millis(),
            text.chars().count()
        ),
        Err(err) => format!("[{} failed: {}]", result.operation, err),
    }
}

/// Renders turn events: the answer goes to `out`, tool progress to `status`.
pub struct StreamPrinter<W: Write, S: Write> {
    out: W,
    status: S,
    at_line_start: bool,
}

impl StreamPrinter<Stdout, Stderr> {
    pub fn stdio() -> Self {
        Self::new(io::stdout(), io::stderr())
    }
}

impl<W: Write, S: Write> StreamPrinter<W, S> {
    pub fn new(out: W, status: S) -> Self {
        Self {
            out,
            status,
            at_line_start: true,
        }
    }

    /// Display errors are not worth aborting the turn over
    pub fn handle(&mut self, event: TurnEvent<'_>) {
        if let Err(e) = self.write_event(event) {
            log_trace(&format!("Failed to write output: {}", e));
        }
    }

    fn write_event(&mut self, event: TurnEvent<'_>) -> io::Result<()> {
        match event {
            TurnEvent::Chunk(chunk) => {
                self.out.write_all(chunk.as_bytes())?;
                self.out.flush()?;
                if let Some(last) = chunk.chars().last() {
                    self.at_line_start = last == '\n';
                }
            }
            TurnEvent::ToolStarted(call) => {
                self.end_line()?;
                writeln!(self.status, "[Executing tool: {}]", call.operation)?;
            }
            TurnEvent::ToolFinished(result) => {
                writeln!(self.status, "{}", tool_status_line(result))?;
            }
        }
        Ok(())
    }

    fn end_line(&mut self) -> io::Result<()> {
        if !self.at_line_start {
            writeln!(self.out)?;
            self.out.flush()?;
            self.at_line_start = true;
        }
        Ok(())
    }

    /// Close the answer line and show any loop notice
    pub fn finish(&mut self, outcome: &TurnOutcome) -> io::Result<()> {
        self.end_line()?;
        if let Some(notice) = outcome.notice() {
            writeln!(self.status, "\nNotice: {}", notice)?;
        }
        Ok(())
    }

    #[cfg(test)]
    fn into_parts(self) -> (W, S) {
        (self.out, self.status)
    }
}
