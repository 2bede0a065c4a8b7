//! Envelope types and conversion from decoded msgpack values.

use rmpv::Value;

use crate::codec::{CodecError, Result};

/// Type tag of a request envelope.
pub const REQUEST: u64 = 0;
/// Type tag of a response envelope.
pub const RESPONSE: u64 = 1;
/// Type tag of a notification envelope.
pub const NOTIFICATION: u64 = 2;

/// Request sent by either peer, expecting exactly one [`Response`].
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
	pub id: u32,
	pub method: String,
	pub args: Vec<Value>,
}

/// Response to a [`Request`] with the same `id`.
///
/// `error` is `Nil` on success; otherwise `result` is meaningless.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
	pub id: u32,
	pub error: Value,
	pub result: Value,
}

impl Response {
	pub fn ok(id: u32, result: Value) -> Self {
		Self {
			id,
			error: Value::Nil,
			result,
		}
	}

	pub fn err(id: u32, message: impl Into<String>) -> Self {
		Self {
			id,
			error: Value::from(message.into()),
			result: Value::Nil,
		}
	}

	/// Splits the envelope into the success value or the raw error payload.
	pub fn into_result(self) -> std::result::Result<Value, Value> {
		if self.error.is_nil() {
			Ok(self.result)
		} else {
			Err(self.error)
		}
	}
}

/// Fire-and-forget message, used by the host to deliver events.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
	pub method: String,
	pub params: Vec<Value>,
}

/// One decoded frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
	Request(Request),
	Response(Response),
	Notification(Notification),
}

impl Message {
	/// Interprets a decoded msgpack value as an envelope.
	///
	/// Fails with [`CodecError::Protocol`] when the value is not an array, the
	/// type tag is unknown, or the array length does not match the tag.
	pub fn from_value(value: Value) -> Result<Self> {
		let Value::Array(items) = value else {
			return Err(CodecError::Protocol(format!(
				"envelope is not an array: {value}"
			)));
		};

		let kind = items
			.first()
			.and_then(Value::as_u64)
			.ok_or_else(|| CodecError::Protocol("envelope has no type tag".to_string()))?;

		match kind {
			REQUEST => {
				let [_, id, method, args] = expect_len::<4>(items, "request")?;
				Ok(Message::Request(Request {
					id: msg_id(&id)?,
					method: method_name(method)?,
					args: arg_list(args, "request arguments")?,
				}))
			}
			RESPONSE => {
				let [_, id, error, result] = expect_len::<4>(items, "response")?;
				Ok(Message::Response(Response {
					id: msg_id(&id)?,
					error,
					result,
				}))
			}
			NOTIFICATION => {
				let [_, method, params] = expect_len::<3>(items, "notification")?;
				Ok(Message::Notification(Notification {
					method: method_name(method)?,
					params: arg_list(params, "notification parameters")?,
				}))
			}
			other => Err(CodecError::Protocol(format!("unknown message type {other}"))),
		}
	}
}

fn expect_len<const N: usize>(items: Vec<Value>, kind: &str) -> Result<[Value; N]> {
	let len = items.len();
	items.try_into().map_err(|_| {
		CodecError::Protocol(format!("{kind} envelope has {len} elements, expected {N}"))
	})
}

fn msg_id(value: &Value) -> Result<u32> {
	value
		.as_u64()
		.and_then(|id| u32::try_from(id).ok())
		.ok_or_else(|| CodecError::Protocol(format!("invalid message id: {value}")))
}

fn method_name(value: Value) -> Result<String> {
	match value {
		Value::String(s) => s
			.into_str()
			.ok_or_else(|| CodecError::Protocol("method name is not valid UTF-8".to_string())),
		Value::Binary(bytes) => String::from_utf8(bytes)
			.map_err(|_| CodecError::Protocol("method name is not valid UTF-8".to_string())),
		other => Err(CodecError::Protocol(format!(
			"method name is not a string: {other}"
		))),
	}
}

fn arg_list(value: Value, what: &str) -> Result<Vec<Value>> {
	match value {
		Value::Array(items) => Ok(items),
		other => Err(CodecError::Protocol(format!("{what} are not an array: {other}"))),
	}
}

/// Reads a host object handle (buffer, window, tabpage).
///
/// Neovim sends handles as msgpack ext values whose payload is a msgpack
/// integer; handles passed through Lua arrive as plain integers.
pub fn handle_id(value: &Value) -> Option<i64> {
	match value {
		Value::Integer(n) => n.as_i64(),
		Value::Ext(_, data) => rmp::decode::read_int::<i64, _>(&mut data.as_slice()).ok(),
		_ => None,
	}
}

/// Extracts a readable message from a response error payload.
///
/// Neovim reports errors as `[kind, message]`.
pub fn error_message(error: &Value) -> String {
	match error {
		Value::Array(items) => match items.as_slice() {
			[_, Value::String(message)] => message.as_str().unwrap_or_default().to_string(),
			_ => error.to_string(),
		},
		Value::String(message) => message.as_str().unwrap_or_default().to_string(),
		other => other.to_string(),
	}
}
