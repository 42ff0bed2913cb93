//! Duplex Pipe Peer
//!
//! Joining side of the demo pair. Each input line is validated as JSON, sent
//! through the channel, and answered by exactly one reply line.

use std::{
    io::{BufRead, Write},
    path::PathBuf,
};

use anyhow::{bail, Context, Result};
use duplexpipe::StreamNames;
use serde_json::Value;

/// Builds the owner's names from the announced paths. Unix channels are two
/// FIFOs, so both paths are required; a Windows channel is one pipe and the
/// outbound path defaults to the inbound one.
pub fn stream_names(inbound: PathBuf, outbound: Option<PathBuf>) -> Result<StreamNames> {
    match outbound {
        Some(outbound) => Ok(StreamNames::new(inbound, outbound)),
        None if cfg!(unix) => bail!("Both the In: and Out: paths are needed to join a FIFO channel"),
        None => Ok(StreamNames::single(inbound)),
    }
}

/// Relays JSON lines from `input` to `requests`, copying one reply line from
/// `replies` to `output` after each. Blank input lines are skipped. Returns
/// the number of completed round trips.
pub fn relay<I, O, C, W>(input: I, mut output: O, mut replies: C, mut requests: W) -> Result<usize>
where
    I: BufRead,
    O: Write,
    C: BufRead,
    W: Write,
{
    let mut trips = 0;

    for line in input.lines() {
        let line = line.context("Failed to read input")?;
        if line.trim().is_empty() {
            continue;
        }

        let request: Value =
            serde_json::from_str(&line).with_context(|| format!("Not valid JSON: {line}"))?;
        serde_json::to_writer(&mut requests, &request).context("Failed to send request")?;
        requests.write_all(b"\n").context("Failed to send request")?;
        requests.flush().context("Failed to flush request")?;
        tracing::debug!(%request, "sent");

        let mut reply = String::new();
        if replies.read_line(&mut reply).context("Failed to read reply")? == 0 {
            bail!("Channel closed before replying to {request}");
        }
        let reply: Value = serde_json::from_str(&reply).context("Reply was not valid JSON")?;

        writeln!(output, "{reply}").context("Failed to write output")?;
        trips += 1;
    }

    Ok(trips)
}
