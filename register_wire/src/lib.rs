//! Line-delimited JSON framing for the two replica RPCs
//!
//! Every message is a single JSON document terminated by a newline, wrapped in a [`Message`]
//! envelope that carries the source, destination and request/reply ids.

use std::io::{BufRead, BufReader, BufWriter, Read, Stdin, Stdout, Write};

pub mod workflow;
pub use workflow::{register, Message, MessageBody};

/// Errors produced while reading or writing framed messages
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("i/o error on message stream")]
    Io(#[from] std::io::Error),
    #[error("malformed message: {0}")]
    Json(#[from] serde_json::Error),
    #[error("message stream was closed")]
    Closed,
}

pub struct Receiver<R> {
    reader: BufReader<R>,
}

pub struct Sender<W>
where
    W: Write,
{
    writer: BufWriter<W>,
}

impl<W> Sender<W>
where
    W: Write,
{
    pub fn new(writer: W) -> Self {
        Self {
            writer: BufWriter::new(writer),
        }
    }

    /// Writes the message as one line and flushes it
    pub fn send<B>(&mut self, msg: &Message<B>) -> Result<(), WireError>
    where
        B: serde::Serialize,
    {
        serde_json::to_writer(&mut self.writer, msg)?;
        writeln!(self.writer)?;
        self.writer.flush()?;
        Ok(())
    }

    /// Writes an already encoded message, adding the newline
    pub fn send_line(&mut self, line: &str) -> Result<(), WireError> {
        writeln!(self.writer, "{}", line.trim_end())?;
        self.writer.flush()?;
        Ok(())
    }
}

impl<R> Receiver<R>
where
    R: Read,
{
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
        }
    }

    /// Reads the next line and decodes it, returning [`WireError::Closed`] once the input is
    /// exhausted
    pub fn recv<B>(&mut self) -> Result<Message<B>, WireError>
    where
        B: serde::de::DeserializeOwned,
    {
        let line = self.recv_line()?;
        decode(&line)
    }

    /// Reads the next non-empty line without decoding it
    pub fn recv_line(&mut self) -> Result<String, WireError> {
        let mut line = String::new();
        loop {
            line.clear();
            if self.reader.read_line(&mut line)? == 0 {
                return Err(WireError::Closed);
            }
            if !line.trim().is_empty() {
                return Ok(line);
            }
        }
    }
}

/// Encodes a message into a single line, without the trailing newline
pub fn encode<B>(msg: &Message<B>) -> Result<String, WireError>
where
    B: serde::Serialize,
{
    Ok(serde_json::to_string(msg)?)
}

/// Decodes a single line into a message
pub fn decode<B>(line: &str) -> Result<Message<B>, WireError>
where
    B: serde::de::DeserializeOwned,
{
    Ok(serde_json::from_str(line.trim_end())?)
}

pub fn io_recv_send() -> (Sender<Stdout>, Receiver<Stdin>) {
    let stdout = std::io::stdout();
    let stdin = std::io::stdin();

    (Sender::new(stdout), Receiver::new(stdin))
}
