//! Incremental msgpack-rpc framing.
//!
//! Frames carry no length header, so decoding first walks the msgpack markers
//! at the front of the buffer to find where the value ends, and reports
//! `Ok(None)` while it is still truncated. The walk resumes where it stopped on
//! the next read. The buffer is only advanced once a whole frame is present.

use std::io;

use bytes::BytesMut;
use rmpv::Value;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::codec::{Decoder, Encoder};

use crate::message::{Message, NOTIFICATION, REQUEST, RESPONSE, Response};
use crate::scan::FrameScan;

/// Largest frame accepted, complete or not, before the peer is considered
/// broken.
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

const READ_CHUNK: usize = 8 * 1024;

pub type Result<T> = std::result::Result<T, CodecError>;

#[derive(Debug, Error)]
pub enum CodecError {
	/// A frame could not be serialized.
	#[error("encoding failed: {0}")]
	Encoding(String),

	/// The peer sent bytes that do not form a valid envelope.
	#[error("protocol violation: {0}")]
	Protocol(String),

	/// The stream ended or failed in the middle of a frame.
	#[error("transport failed: {0}")]
	Transport(String),

	#[error(transparent)]
	Io(#[from] io::Error),
}

fn encoding<E: std::fmt::Display>(err: E) -> CodecError {
	CodecError::Encoding(err.to_string())
}

/// Appends one request envelope `[0, id, method, args]` to `dst`.
pub fn encode_request(dst: &mut BytesMut, id: u32, method: &str, args: &[Value]) -> Result<()> {
	let mut frame = Vec::with_capacity(16 + method.len());
	rmp::encode::write_array_len(&mut frame, 4).map_err(encoding)?;
	rmp::encode::write_uint(&mut frame, REQUEST).map_err(encoding)?;
	rmp::encode::write_uint(&mut frame, u64::from(id)).map_err(encoding)?;
	rmp::encode::write_str(&mut frame, method).map_err(encoding)?;
	write_values(&mut frame, args)?;
	dst.extend_from_slice(&frame);
	Ok(())
}

/// Appends any envelope to `dst`.
pub fn encode_message(dst: &mut BytesMut, message: &Message) -> Result<()> {
	let mut frame = Vec::new();
	match message {
		Message::Request(req) => return encode_request(dst, req.id, &req.method, &req.args),
		Message::Response(resp) => {
			rmp::encode::write_array_len(&mut frame, 4).map_err(encoding)?;
			rmp::encode::write_uint(&mut frame, RESPONSE).map_err(encoding)?;
			rmp::encode::write_uint(&mut frame, u64::from(resp.id)).map_err(encoding)?;
			rmpv::encode::write_value(&mut frame, &resp.error).map_err(encoding)?;
			rmpv::encode::write_value(&mut frame, &resp.result).map_err(encoding)?;
		}
		Message::Notification(note) => {
			rmp::encode::write_array_len(&mut frame, 3).map_err(encoding)?;
			rmp::encode::write_uint(&mut frame, NOTIFICATION).map_err(encoding)?;
			rmp::encode::write_str(&mut frame, &note.method).map_err(encoding)?;
			write_values(&mut frame, &note.params)?;
		}
	}
	dst.extend_from_slice(&frame);
	Ok(())
}

fn write_values(frame: &mut Vec<u8>, values: &[Value]) -> Result<()> {
	let len = u32::try_from(values.len())
		.map_err(|_| CodecError::Encoding(format!("too many arguments: {}", values.len())))?;
	rmp::encode::write_array_len(frame, len).map_err(encoding)?;
	for value in values {
		rmpv::encode::write_value(frame, value).map_err(encoding)?;
	}
	Ok(())
}

/// Decodes one envelope from the front of `src`.
///
/// Returns `Ok(None)` and leaves `src` untouched when the frame is incomplete.
/// Each call measures the frame from its first byte; streams should go
/// through [`MsgpackRpcCodec`], which remembers its progress.
pub fn decode_message(src: &mut BytesMut) -> Result<Option<Message>> {
	decode_with(&mut FrameScan::default(), src)
}

fn decode_with(scan: &mut FrameScan, src: &mut BytesMut) -> Result<Option<Message>> {
	let Some(len) = scan.frame_len(src)? else {
		return Ok(None);
	};
	let frame = src.split_to(len);
	let value = rmpv::decode::read_value(&mut &frame[..])
		.map_err(|err| CodecError::Protocol(err.to_string()))?;
	Message::from_value(value).map(Some)
}

/// Decodes one envelope from `src`, requiring it to be a response.
pub fn decode_response(src: &mut BytesMut) -> Result<Option<Response>> {
	match decode_message(src)? {
		Some(Message::Response(response)) => Ok(Some(response)),
		Some(other) => Err(CodecError::Protocol(format!(
			"expected a response, got {other:?}"
		))),
		None => Ok(None),
	}
}

/// Reads from `reader` until one full envelope is buffered, then decodes it.
///
/// Bytes past the end of the frame stay in `buf` for the next call.
pub async fn read_message<R>(reader: &mut R, buf: &mut BytesMut) -> Result<Message>
where
	R: AsyncRead + Unpin,
{
	let mut scan = FrameScan::default();
	loop {
		if let Some(message) = decode_with(&mut scan, buf)? {
			return Ok(message);
		}

		buf.reserve(READ_CHUNK);
		let read = reader
			.read_buf(buf)
			.await
			.map_err(|e| CodecError::Transport(e.to_string()))?;
		if read == 0 {
			return Err(if buf.is_empty() {
				CodecError::Transport("stream closed".to_string())
			} else {
				CodecError::Transport(format!("stream closed mid-frame ({} bytes buffered)", buf.len()))
			});
		}
	}
}

/// Blocks until one response envelope has been read.
pub async fn read_response<R>(reader: &mut R, buf: &mut BytesMut) -> Result<Response>
where
	R: AsyncRead + Unpin,
{
	match read_message(reader, buf).await? {
		Message::Response(response) => Ok(response),
		other => Err(CodecError::Protocol(format!(
			"expected a response, got {other:?}"
		))),
	}
}

/// [`Decoder`]/[`Encoder`] pair for use with `tokio_util::codec` framing.
#[derive(Debug, Default, Clone)]
pub struct MsgpackRpcCodec {
	scan: FrameScan,
}

impl Decoder for MsgpackRpcCodec {
	type Item = Message;
	type Error = CodecError;

	fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Message>> {
		decode_with(&mut self.scan, src)
	}

	fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Message>> {
		match self.decode(src)? {
			Some(message) => Ok(Some(message)),
			None if src.is_empty() => Ok(None),
			None => Err(CodecError::Transport(format!(
				"stream closed mid-frame ({} bytes buffered)",
				src.len()
			))),
		}
	}
}

impl Encoder<Message> for MsgpackRpcCodec {
	type Error = CodecError;

	fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<()> {
		encode_message(dst, &item)
	}
}
