//! Response serialization helpers for the dispatch loop.
//!
//! Every RPC answer is a stream of tagged JSONL messages. Streaming methods
//! interleave `stream` messages carrying stdout/stderr data; every call ends
//! with exactly one terminal message, either `response` with the method's
//! result body or `error` with a message.

use std::io::Write;

use serde::Serialize;

use super::errors::DispatchError;

/// Target stream for output messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamTarget {
    /// Standard output stream.
    Stdout,
    /// Standard error stream.
    Stderr,
}

/// Response messages sent to the engine.
///
/// Each message is serialized as a single JSONL line. The engine reads lines
/// until it receives a terminal `response` or `error` message.
#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HostMessage {
    /// Streamed output data directed at stdout or stderr.
    Stream {
        /// Target stream on the engine side.
        stream: StreamTarget,
        /// Text payload to write.
        data: String,
    },
    /// Terminal message carrying the method result.
    Response {
        /// Method-specific result body.
        body: serde_json::Value,
    },
    /// Terminal message signalling failure.
    Error {
        /// Human-readable failure description.
        message: String,
    },
}

impl HostMessage {
    /// Creates a stdout stream message.
    pub fn stdout(data: impl Into<String>) -> Self {
        Self::Stream {
            stream: StreamTarget::Stdout,
            data: data.into(),
        }
    }

    /// Creates a stderr stream message.
    pub fn stderr(data: impl Into<String>) -> Self {
        Self::Stream {
            stream: StreamTarget::Stderr,
            data: data.into(),
        }
    }
}

/// Writer that serializes host messages to a stream.
///
/// The writer handles JSONL framing (appending newlines) and provides
/// convenience methods for common message patterns.
pub struct ResponseWriter<W> {
    writer: W,
}

impl<W: Write> ResponseWriter<W> {
    /// Creates a new response writer wrapping the given output stream.
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Writes a host message as a JSONL line.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn write_message(&mut self, message: &HostMessage) -> Result<(), DispatchError> {
        serde_json::to_writer(&mut self.writer, message)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }

    /// Writes a stream message to stdout.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn write_stdout(&mut self, data: impl Into<String>) -> Result<(), DispatchError> {
        self.write_message(&HostMessage::stdout(data))
    }

    /// Writes a stream message to stderr.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn write_stderr(&mut self, data: impl Into<String>) -> Result<(), DispatchError> {
        self.write_message(&HostMessage::stderr(data))
    }

    /// Writes the terminal response message for a successful call.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn write_response(&mut self, body: &impl Serialize) -> Result<(), DispatchError> {
        let body = serde_json::to_value(body)?;
        self.write_message(&HostMessage::Response { body })
    }

    /// Writes the terminal error message for a failed call.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn write_error(&mut self, error: &DispatchError) -> Result<(), DispatchError> {
        self.write_message(&HostMessage::Error {
            message: error.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_response_message() {
        let mut output = Vec::new();
        let mut writer = ResponseWriter::new(&mut output);
        writer
            .write_response(&serde_json::json!({"version": "1.0.0"}))
            .expect("write response");

        let line = String::from_utf8(output).expect("utf8");
        assert!(line.contains(r#""kind":"response""#));
        assert!(line.contains(r#""version":"1.0.0""#));
        assert!(line.ends_with('\n'));
    }

    #[test]
    fn writes_stream_messages() {
        let mut output = Vec::new();
        let mut writer = ResponseWriter::new(&mut output);
        writer.write_stdout("progress\n").expect("write stdout");
        writer.write_stderr("warning\n").expect("write stderr");

        let lines = String::from_utf8(output).expect("utf8");
        assert!(lines.contains(r#""stream":"stdout""#));
        assert!(lines.contains(r#""stream":"stderr""#));
    }

    #[test]
    fn write_error_carries_message() {
        let mut output = Vec::new();
        let mut writer = ResponseWriter::new(&mut output);
        let error = DispatchError::unknown_method("bogus");
        writer.write_error(&error).expect("write error");

        let line = String::from_utf8(output).expect("utf8");
        assert!(line.contains(r#""kind":"error""#));
        assert!(line.contains("unknown method"));
    }
}
