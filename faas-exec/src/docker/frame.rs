//! Decoder for Docker's multiplexed log stream.
//!
//! When a container runs without a TTY, the attach and logs endpoints
//! interleave stdout and stderr on one connection. Every chunk of payload is
//! preceded by an 8 byte header:
//!
//! ```text
//! +--------+--------+--------+--------+--------+--------+--------+--------+
//! | stream |   0    |   0    |   0    |        payload length (BE u32)    |
//! +--------+--------+--------+--------+--------+--------+--------+--------+
//! ```
//!
//! where `stream` is 0 (stdin), 1 (stdout) or 2 (stderr).

use bytes::{Buf, Bytes, BytesMut};
use std::io;
use tokio_util::codec::Decoder;

pub const HEADER_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdin,
    Stdout,
    Stderr,
}

impl TryFrom<u8> for StreamKind {
    type Error = io::Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(StreamKind::Stdin),
            1 => Ok(StreamKind::Stdout),
            2 => Ok(StreamKind::Stderr),
            other => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unknown log stream type {}", other),
            )),
        }
    }
}

/// One demultiplexed chunk of container output, header removed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFrame {
    pub stream: StreamKind,
    pub payload: Bytes,
}

#[derive(Debug, Default)]
pub struct LogFrameDecoder;

impl Decoder for LogFrameDecoder {
    type Item = LogFrame;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < HEADER_LEN {
            src.reserve(HEADER_LEN - src.len());
            return Ok(None);
        }

        let stream = StreamKind::try_from(src[0])?;
        let len = u32::from_be_bytes([src[4], src[5], src[6], src[7]]) as usize;

        if src.len() < HEADER_LEN + len {
            src.reserve(HEADER_LEN + len - src.len());
            return Ok(None);
        }

        src.advance(HEADER_LEN);
        let payload = src.split_to(len).freeze();
        Ok(Some(LogFrame { stream, payload }))
    }
}

#[cfg(test)]
pub(crate) fn encode_frame(stream: u8, payload: &[u8]) -> Vec<u8> {
    let mut frame = vec![stream, 0, 0, 0];
    frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    frame.extend_from_slice(payload);
    frame
}
