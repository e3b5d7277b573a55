//! `tokio_util` codec over the frame layout in [`crate::frame`].
//!
//! The decoder never fails on a bad frame: unknown tags and malformed
//! payloads are logged and dropped so one broken message does not tear
//! down the channel. Only I/O errors end the stream.

use std::fmt;
use std::marker::PhantomData;

use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::warn;

use crate::error::ReclinkError;
use crate::frame::{Decoded, LENGTH_PREFIX_SIZE, decode_next, encode_frame};
use crate::message::{Command, Event, Message};

/// Decodes `In` frames and encodes `Out` frames.
pub struct FrameCodec<In, Out> {
    skipped: u64,
    _marker: PhantomData<fn(Out) -> In>,
}

/// Worker side: commands in, events out.
pub type WorkerCodec = FrameCodec<Command, Event>;

/// Host side: events in, commands out.
pub type HostCodec = FrameCodec<Event, Command>;

impl<In, Out> FrameCodec<In, Out> {
    pub fn new() -> Self {
        Self {
            skipped: 0,
            _marker: PhantomData,
        }
    }

    /// Number of frames dropped as unknown or malformed so far.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }
}

impl<In, Out> Default for FrameCodec<In, Out> {
    fn default() -> Self {
        Self::new()
    }
}

impl<In, Out> fmt::Debug for FrameCodec<In, Out> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameCodec")
            .field("skipped", &self.skipped)
            .finish()
    }
}

impl<In: Message, Out> Decoder for FrameCodec<In, Out> {
    type Item = In;
    type Error = ReclinkError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            match decode_next::<In>(src) {
                Decoded::Message { message, consumed } => {
                    src.advance(consumed);
                    return Ok(Some(message));
                }
                Decoded::Skipped {
                    consumed,
                    tag,
                    error,
                } => {
                    self.skipped += 1;
                    warn!(
                        direction = In::DIRECTION,
                        ?tag,
                        bytes = consumed,
                        %error,
                        "dropping frame"
                    );
                    src.advance(consumed);
                }
                Decoded::NeedMoreData => {
                    if src.len() >= LENGTH_PREFIX_SIZE {
                        let body = u16::from_le_bytes([src[0], src[1]]) as usize;
                        src.reserve(LENGTH_PREFIX_SIZE + body - src.len());
                    }
                    return Ok(None);
                }
            }
        }
    }
}

impl<In, Out: Message> Encoder<Out> for FrameCodec<In, Out> {
    type Error = ReclinkError;

    fn encode(&mut self, item: Out, dst: &mut BytesMut) -> Result<(), Self::Error> {
        encode_frame(&item, dst)?;
        Ok(())
    }
}
