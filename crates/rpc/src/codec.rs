//! Frame codec: a big-endian `u32` length followed by that many body bytes.

use std::io;

use bytes::{Bytes, BytesMut};
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{Framed, LengthDelimitedCodec, LengthDelimitedCodecError};

use crate::error::RpcError;

/// Largest accepted frame body.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

pub type FramedStream<T> = Framed<T, LengthDelimitedCodec>;

/// Wrap a byte stream in the control-plane frame codec.
pub fn framed<T: AsyncRead + AsyncWrite>(io: T) -> FramedStream<T> {
    LengthDelimitedCodec::builder()
        .big_endian()
        .length_field_length(4)
        .max_frame_length(MAX_FRAME_LEN)
        .new_framed(io)
}

pub async fn send_frame<T>(framed: &mut FramedStream<T>, body: Vec<u8>) -> Result<(), RpcError>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    framed.send(Bytes::from(body)).await.map_err(frame_error)
}

/// Next frame from the peer. `Ok(None)` on a clean end of stream.
pub async fn next_frame<T>(framed: &mut FramedStream<T>) -> Result<Option<BytesMut>, RpcError>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    framed.next().await.transpose().map_err(frame_error)
}

fn frame_error(e: io::Error) -> RpcError {
    let too_large = e
        .get_ref()
        .is_some_and(|inner| inner.is::<LengthDelimitedCodecError>());
    if too_large {
        RpcError::FrameTooLarge(MAX_FRAME_LEN)
    } else {
        RpcError::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn frames_are_length_prefixed() {
        let (a, mut b) = tokio::io::duplex(1024);
        let mut writer = framed(a);
        send_frame(&mut writer, b"hello".to_vec()).await.unwrap();
        drop(writer);

        let mut wire = Vec::new();
        b.read_to_end(&mut wire).await.unwrap();
        assert_eq!(wire, [0, 0, 0, 5, b'h', b'e', b'l', b'l', b'o']);
    }

    #[tokio::test]
    async fn empty_frames_and_clean_eof() {
        let (a, b) = tokio::io::duplex(1024);
        let mut writer = framed(a);
        let mut reader = framed(b);
        send_frame(&mut writer, b"hello".to_vec()).await.unwrap();
        send_frame(&mut writer, Vec::new()).await.unwrap();
        drop(writer);

        assert_eq!(next_frame(&mut reader).await.unwrap().as_deref(), Some(&b"hello"[..]));
        assert_eq!(next_frame(&mut reader).await.unwrap().as_deref(), Some(&b""[..]));
        assert!(next_frame(&mut reader).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn oversized_length_is_rejected() {
        let (mut a, b) = tokio::io::duplex(64);
        let mut reader = framed(b);
        a.write_u32((MAX_FRAME_LEN + 1) as u32).await.unwrap();
        assert!(matches!(next_frame(&mut reader).await, Err(RpcError::FrameTooLarge(_))));
    }

    #[tokio::test]
    async fn truncated_body_is_an_error() {
        let (mut a, b) = tokio::io::duplex(64);
        let mut reader = framed(b);
        a.write_u32(10).await.unwrap();
        a.write_all(b"abc").await.unwrap();
        drop(a);
        assert!(next_frame(&mut reader).await.is_err());
    }
}
