//! Resumable measurement of msgpack frame boundaries.

use rmp::Marker;

use crate::codec::{CodecError, MAX_FRAME_SIZE, Result};

/// Deepest array/map nesting accepted inside one frame.
const MAX_DEPTH: usize = 1024;

/// Walks the msgpack value at the front of a buffer across partial reads.
///
/// Progress survives between calls, so each byte of a frame is examined once
/// however many reads it arrives in. The buffer may only grow between calls
/// until a length is returned.
#[derive(Debug, Default, Clone)]
pub(crate) struct FrameScan {
	offset: usize,
	/// Values still owed to each open array or map, innermost last.
	open: Vec<u64>,
}

enum Item {
	/// A value of `len` bytes including its marker.
	Scalar(usize),
	/// An array or map header followed by `items` values.
	Container { header: usize, items: u64 },
}

impl FrameScan {
	/// Returns the byte length of the first frame in `buf` once it is fully
	/// buffered, and resets for the next frame.
	pub(crate) fn frame_len(&mut self, buf: &[u8]) -> Result<Option<usize>> {
		loop {
			let Some(item) = item_at(&buf[self.offset..])? else {
				return Ok(None);
			};
			let (len, items) = match item {
				Item::Scalar(len) => (len, 0),
				Item::Container { header, items } => (header, items),
			};

			let end = self.offset.saturating_add(len);
			if end > MAX_FRAME_SIZE {
				return Err(CodecError::Protocol(format!(
					"frame exceeds {MAX_FRAME_SIZE} bytes"
				)));
			}
			if end > buf.len() {
				return Ok(None);
			}
			self.offset = end;

			if items > 0 {
				if self.open.len() == MAX_DEPTH {
					return Err(CodecError::Protocol(format!(
						"frame nested deeper than {MAX_DEPTH} levels"
					)));
				}
				self.open.push(items);
				continue;
			}

			// A value just ended; close every container it completes.
			loop {
				let Some(left) = self.open.last_mut() else {
					let len = self.offset;
					self.offset = 0;
					return Ok(Some(len));
				};
				*left -= 1;
				if *left > 0 {
					break;
				}
				self.open.pop();
			}
		}
	}
}

fn item_at(rest: &[u8]) -> Result<Option<Item>> {
	let Some(&first) = rest.first() else {
		return Ok(None);
	};
	let item = match Marker::from_u8(first) {
		Marker::FixPos(_) | Marker::FixNeg(_) | Marker::Null | Marker::True | Marker::False => {
			Item::Scalar(1)
		}
		Marker::U8 | Marker::I8 => Item::Scalar(2),
		Marker::U16 | Marker::I16 => Item::Scalar(3),
		Marker::U32 | Marker::I32 | Marker::F32 => Item::Scalar(5),
		Marker::U64 | Marker::I64 | Marker::F64 => Item::Scalar(9),
		Marker::FixStr(len) => Item::Scalar(1 + usize::from(len)),
		Marker::Str8 | Marker::Bin8 => return Ok(sized(rest, 1, 0)),
		Marker::Str16 | Marker::Bin16 => return Ok(sized(rest, 2, 0)),
		Marker::Str32 | Marker::Bin32 => return Ok(sized(rest, 4, 0)),
		Marker::FixExt1 => Item::Scalar(3),
		Marker::FixExt2 => Item::Scalar(4),
		Marker::FixExt4 => Item::Scalar(6),
		Marker::FixExt8 => Item::Scalar(10),
		Marker::FixExt16 => Item::Scalar(18),
		Marker::Ext8 => return Ok(sized(rest, 1, 1)),
		Marker::Ext16 => return Ok(sized(rest, 2, 1)),
		Marker::Ext32 => return Ok(sized(rest, 4, 1)),
		Marker::FixArray(len) => Item::Container {
			header: 1,
			items: u64::from(len),
		},
		Marker::Array16 => return Ok(counted(rest, 2, 1)),
		Marker::Array32 => return Ok(counted(rest, 4, 1)),
		Marker::FixMap(len) => Item::Container {
			header: 1,
			items: 2 * u64::from(len),
		},
		Marker::Map16 => return Ok(counted(rest, 2, 2)),
		Marker::Map32 => return Ok(counted(rest, 4, 2)),
		Marker::Reserved => {
			return Err(CodecError::Protocol(format!("reserved msgpack marker {first:#04x}")));
		}
	};
	Ok(Some(item))
}

/// Big-endian length of `width` bytes following the marker.
fn length(rest: &[u8], width: usize) -> Option<u64> {
	let bytes = rest.get(1..1 + width)?;
	Some(bytes.iter().fold(0, |acc, &b| (acc << 8) | u64::from(b)))
}

/// A str, bin or ext whose payload length follows the marker. `extra` covers
/// the ext type byte.
fn sized(rest: &[u8], width: usize, extra: usize) -> Option<Item> {
	let len = usize::try_from(length(rest, width)?).unwrap_or(usize::MAX);
	Some(Item::Scalar(len.saturating_add(1 + width + extra)))
}

fn counted(rest: &[u8], width: usize, per_entry: u64) -> Option<Item> {
	let entries = length(rest, width)?;
	Some(Item::Container {
		header: 1 + width,
		items: entries * per_entry,
	})
}
