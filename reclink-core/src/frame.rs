//! Frame layout: `[u16 length][u8 tag][payload]`, little-endian.
//!
//! `length` counts the bytes after the prefix (tag + payload), so the
//! smallest valid frame is three bytes long.

use bytes::{BufMut, BytesMut};

use crate::error::ProtocolError;
use crate::message::{Message, Tag};
use crate::wire::WireReader;

/// Size of the little-endian length prefix.
pub const LENGTH_PREFIX_SIZE: usize = 2;

/// Largest body (tag + payload) the length prefix can describe.
pub const MAX_FRAME_BODY: usize = u16::MAX as usize;

/// Largest payload that still fits a frame.
pub const MAX_PAYLOAD_SIZE: usize = MAX_FRAME_BODY - 1;

/// Result of looking at the front of a receive buffer.
#[derive(Debug, PartialEq)]
pub enum Decoded<M> {
    /// A complete, well-formed frame.
    Message { message: M, consumed: usize },

    /// A complete frame that could not be turned into a message. The
    /// caller drops `consumed` bytes and carries on with the next frame.
    Skipped {
        consumed: usize,
        tag: Option<u8>,
        error: ProtocolError,
    },

    /// The buffer ends in the middle of a frame.
    NeedMoreData,
}

/// Decode the first frame in `src` without consuming anything.
pub fn decode_next<M: Message>(src: &[u8]) -> Decoded<M> {
    if src.len() < LENGTH_PREFIX_SIZE {
        return Decoded::NeedMoreData;
    }
    let body_len = u16::from_le_bytes([src[0], src[1]]) as usize;
    let consumed = LENGTH_PREFIX_SIZE + body_len;
    if src.len() < consumed {
        return Decoded::NeedMoreData;
    }
    if body_len == 0 {
        return Decoded::Skipped {
            consumed,
            tag: None,
            error: ProtocolError::EmptyFrame,
        };
    }

    let raw_tag = src[LENGTH_PREFIX_SIZE];
    let payload = &src[LENGTH_PREFIX_SIZE + 1..consumed];

    let decoded = Tag::try_from(raw_tag).and_then(|tag| {
        let mut reader = WireReader::new(payload);
        let message = M::decode_payload(tag, &mut reader)?;
        reader.finish()?;
        Ok(message)
    });

    match decoded {
        Ok(message) => Decoded::Message { message, consumed },
        Err(error) => Decoded::Skipped {
            consumed,
            tag: Some(raw_tag),
            error,
        },
    }
}

/// Append one complete frame for `message` to `dst`.
///
/// On error `dst` is left exactly as it was.
pub fn encode_frame<M: Message>(message: &M, dst: &mut BytesMut) -> Result<(), ProtocolError> {
    let start = dst.len();
    dst.put_u16_le(0);
    dst.put_u8(message.tag() as u8);

    if let Err(e) = message.encode_payload(dst) {
        dst.truncate(start);
        return Err(e);
    }

    let body_len = dst.len() - start - LENGTH_PREFIX_SIZE;
    if body_len > MAX_FRAME_BODY {
        dst.truncate(start);
        return Err(ProtocolError::FrameTooLarge {
            size: body_len - 1,
            max: MAX_PAYLOAD_SIZE,
        });
    }
    dst[start..start + LENGTH_PREFIX_SIZE].copy_from_slice(&(body_len as u16).to_le_bytes());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Command, ErrorKind, Event, Rect, Size};
    use std::path::PathBuf;

    fn encoded<M: Message>(message: &M) -> BytesMut {
        let mut buf = BytesMut::new();
        encode_frame(message, &mut buf).unwrap();
        buf
    }

    fn all_commands() -> Vec<Command> {
        vec![
            Command::Init {
                config_path: PathBuf::from("/var/lib/reclink/config"),
                title: "Classroom — 教室".into(),
                screen_size: Size::new(1920, 1080),
                crop_rect: Rect::new(0, 40, 1600, 900),
            },
            Command::ScaleVideo {
                size: Size::new(1280, 720),
            },
            Command::CropVideo {
                rect: Rect::new(-8, -8, 1936, 1056),
            },
            Command::UpdateVideoConfig {
                cursor: true,
                compatibility: false,
            },
            Command::ResetAudioInput {
                device_id: "{0.0.1.00000000}".into(),
                device_desc: "USB Microphone".into(),
            },
            Command::ResetAudioOutput {
                device_id: String::new(),
                device_desc: "Speakers".into(),
            },
            Command::DownmixMonoInput { enable: true },
            Command::DownmixMonoOutput { enable: false },
            Command::MuteAudioInput { mute: true },
            Command::MuteAudioOutput { mute: false },
            Command::StartRecording {
                output_path: PathBuf::from("/tmp/lesson.mp4"),
            },
            Command::StopRecording { force: true },
            Command::StartStreaming {
                server: "rtmp://live.example.com/app".into(),
                key: "secret".into(),
            },
            Command::StopStreaming { force: false },
            Command::LogStreamStats,
        ]
    }

    #[test]
    fn every_command_survives_the_wire() {
        for command in all_commands() {
            let buf = encoded(&command);
            match decode_next::<Command>(&buf) {
                Decoded::Message { message, consumed } => {
                    assert_eq!(message, command);
                    assert_eq!(consumed, buf.len());
                }
                other => panic!("{command:?} decoded as {other:?}"),
            }
        }
    }

    #[test]
    fn header_layout_is_exact() {
        let buf = encoded(&Command::StopRecording { force: true });
        // length = tag + 1 payload byte
        assert_eq!(&buf[..], &[2, 0, 11, 1]);

        let buf = encoded(&Event::Initialized);
        assert_eq!(&buf[..], &[1, 0, 14]);

        let buf = encoded(&Command::ScaleVideo {
            size: Size::new(1280, 720),
        });
        assert_eq!(&buf[..], &[9, 0, 1, 0x00, 0x05, 0, 0, 0xD0, 0x02, 0, 0]);
    }

    #[test]
    fn partial_frame_needs_more_data() {
        let buf = encoded(&Command::StartRecording {
            output_path: PathBuf::from("/tmp/out.mp4"),
        });
        for cut in 0..buf.len() {
            assert_eq!(decode_next::<Command>(&buf[..cut]), Decoded::NeedMoreData);
        }
    }

    #[test]
    fn only_first_frame_is_consumed() {
        let mut buf = encoded(&Command::MuteAudioInput { mute: true });
        let first = buf.len();
        buf.extend_from_slice(&encoded(&Command::LogStreamStats));
        match decode_next::<Command>(&buf) {
            Decoded::Message { message, consumed } => {
                assert_eq!(message, Command::MuteAudioInput { mute: true });
                assert_eq!(consumed, first);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn unknown_tag_is_skipped_whole() {
        let buf = [3u8, 0, 0xEE, 1, 2];
        assert_eq!(
            decode_next::<Command>(&buf),
            Decoded::Skipped {
                consumed: 5,
                tag: Some(0xEE),
                error: ProtocolError::UnknownTag(0xEE)
            }
        );
    }

    #[test]
    fn empty_frame_is_skipped() {
        let buf = [0u8, 0, 1, 0, 20];
        assert_eq!(
            decode_next::<Command>(&buf),
            Decoded::Skipped {
                consumed: 2,
                tag: None,
                error: ProtocolError::EmptyFrame
            }
        );
    }

    #[test]
    fn trailing_payload_bytes_are_malformed() {
        // StopStreaming with two payload bytes instead of one.
        let buf = [3u8, 0, 13, 0, 0];
        assert!(matches!(
            decode_next::<Command>(&buf),
            Decoded::Skipped {
                consumed: 5,
                error: ProtocolError::TrailingBytes(1),
                ..
            }
        ));
    }

    #[test]
    fn oversized_frame_is_rejected_and_buffer_untouched() {
        let mut buf = BytesMut::from(&b"keep"[..]);
        let event = Event::ErrorOccurred {
            kind: ErrorKind::Client,
            message: "x".repeat(MAX_PAYLOAD_SIZE),
        };
        let err = encode_frame(&event, &mut buf).unwrap_err();
        assert!(matches!(err, ProtocolError::FrameTooLarge { .. }));
        assert_eq!(&buf[..], b"keep");
    }

    #[test]
    fn events_decode_on_the_host_side() {
        let event = Event::RecordingStopped {
            path: PathBuf::from("/tmp/lesson.mp4"),
        };
        let buf = encoded(&event);
        assert!(matches!(
            decode_next::<Event>(&buf),
            Decoded::Message { message, .. } if message == event
        ));
    }
}
