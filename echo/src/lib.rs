//! Duplex Pipe Echo
//!
//! Owner side of the demo pair: reads a stream of JSON values off a duplex
//! channel and writes each one back on its own line.

use std::io::{Read, Write};

use anyhow::{Context, Result};
use serde_json::{Deserializer, Value};

/// Echoes every JSON value read from `reader` to `writer`, one per line,
/// until the reader reaches end of stream. Returns the number of values
/// echoed.
pub fn echo_values<R: Read, W: Write>(reader: R, mut writer: W) -> Result<usize> {
    let mut echoed = 0;

    for value in Deserializer::from_reader(reader).into_iter::<Value>() {
        let value = value.context("Failed to decode JSON value from pipe")?;
        tracing::info!(%value, "received");

        serde_json::to_writer(&mut writer, &value).context("Failed to encode reply")?;
        writer.write_all(b"\n").context("Failed to write reply")?;
        writer.flush().context("Failed to flush reply")?;
        echoed += 1;
    }

    tracing::info!(echoed, "input stream closed");
    Ok(echoed)
}
