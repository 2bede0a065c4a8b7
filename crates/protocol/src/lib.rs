//! Wire types for the Neovim msgpack-rpc control channel.
//!
//! Every frame is a single msgpack array:
//!
//! ```text
//! request       [0, id, method, args]
//! response      [1, id, error, result]
//! notification  [2, method, params]
//! ```
//!
//! There is no length prefix; a frame ends where its msgpack value ends.
//! [`codec`] does the incremental decoding needed to pull frames off a byte
//! stream.

pub mod codec;
pub mod message;
mod scan;

pub use codec::{
	CodecError, MAX_FRAME_SIZE, MsgpackRpcCodec, Result, decode_message, decode_response,
	encode_message, encode_request, read_message, read_response,
};
pub use message::{Message, Notification, Request, Response, error_message, handle_id};
pub use rmpv::Value;
