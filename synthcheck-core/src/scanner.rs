//! Startup marker discovery
//!
//! The synthesizer announces its OSC port on stderr with a line of the form
//! `lo server running on <port>`. Everything else it prints there is noise
//! as far as we are concerned.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};
use tracing::{debug, warn};
use winnow::ModalResult;
use winnow::ascii::digit1;
use winnow::combinator::preceded;
use winnow::prelude::*;

const MARKER_PREFIX: &str = "lo server running on ";

/// Longest line we keep in memory. The marker is far shorter than this, so
/// anything longer is skipped in chunks.
pub const MAX_LINE_LEN: usize = 64 * 1024;

fn marker(input: &mut &str) -> ModalResult<u16> {
    preceded(
        MARKER_PREFIX,
        digit1
            .try_map(str::parse::<u16>)
            .verify(|port: &u16| *port != 0),
    )
    .parse_next(input)
}

/// Extract the port from a startup marker line
///
/// The whole line has to match; a trailing `\n` or `\r\n` is ignored.
pub fn parse_marker(line: &str) -> Option<u16> {
    let line = line.strip_suffix('\n').unwrap_or(line);
    let line = line.strip_suffix('\r').unwrap_or(line);
    marker.parse(line).ok()
}

/// Reads a diagnostic stream until the startup marker shows up
pub struct LineScanner<R> {
    reader: R,
    line: Vec<u8>,
    lines_seen: usize,
}

impl<R: AsyncBufRead + Unpin> LineScanner<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: Vec::new(),
            lines_seen: 0,
        }
    }

    /// Consume lines until one matches the startup marker
    ///
    /// Returns `Ok(None)` when the stream ends first. Nothing past the
    /// matching line is read.
    pub async fn scan(&mut self) -> std::io::Result<Option<u16>> {
        let mut discarding = false;

        loop {
            self.line.clear();
            let read = (&mut self.reader)
                .take(MAX_LINE_LEN as u64)
                .read_until(b'\n', &mut self.line)
                .await?;

            if read == 0 {
                return Ok(None);
            }

            let terminated = self.line.last() == Some(&b'\n');
            if discarding {
                discarding = !terminated;
                continue;
            }
            if !terminated && read == MAX_LINE_LEN {
                warn!("Skipping diagnostic line longer than {} bytes", MAX_LINE_LEN);
                discarding = true;
                continue;
            }

            self.lines_seen += 1;
            let text = String::from_utf8_lossy(&self.line);
            if let Some(port) = parse_marker(&text) {
                debug!("Startup marker found after {} line(s)", self.lines_seen);
                return Ok(Some(port));
            }
            debug!(line = %text.trim_end(), "Ignoring diagnostic line");
        }
    }

    /// Number of complete lines examined so far
    pub fn lines_seen(&self) -> usize {
        self.lines_seen
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}
