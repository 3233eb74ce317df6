// Agent Line Codec
//
// Newline framing for agent sessions. Wraps `LinesCodec` so an overlong or
// non-UTF-8 line comes out as a frame of its own instead of a decoder error:
// `FramedRead` stops for good after the first error, and one bad line must
// not cost the agent its session.

use bytes::BytesMut;
use std::io;
use tokio_util::codec::{Decoder, LinesCodec, LinesCodecError};

use crate::protocol::MAX_LINE_LEN;

/// One frame read from an agent
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentLine {
    Text(String),
    /// Longer than the limit; the rest of it up to the newline is discarded
    TooLong,
    NotUtf8,
}

#[derive(Debug)]
pub struct AgentLineCodec {
    inner: LinesCodec,
}

impl AgentLineCodec {
    pub fn new() -> Self {
        Self::with_max_length(MAX_LINE_LEN)
    }

    pub fn with_max_length(max_length: usize) -> Self {
        Self {
            inner: LinesCodec::new_with_max_length(max_length),
        }
    }
}

impl Default for AgentLineCodec {
    fn default() -> Self {
        Self::new()
    }
}

fn frame(result: Result<Option<String>, LinesCodecError>) -> io::Result<Option<AgentLine>> {
    match result {
        Ok(line) => Ok(line.map(AgentLine::Text)),
        Err(LinesCodecError::MaxLineLengthExceeded) => Ok(Some(AgentLine::TooLong)),
        // The bad line has already been consumed from the buffer.
        Err(LinesCodecError::Io(e)) if e.kind() == io::ErrorKind::InvalidData => {
            Ok(Some(AgentLine::NotUtf8))
        }
        Err(LinesCodecError::Io(e)) => Err(e),
    }
}

impl Decoder for AgentLineCodec {
    type Item = AgentLine;
    type Error = io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> io::Result<Option<AgentLine>> {
        frame(self.inner.decode(buf))
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> io::Result<Option<AgentLine>> {
        frame(self.inner.decode_eof(buf))
    }
}
