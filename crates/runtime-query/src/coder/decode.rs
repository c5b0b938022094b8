// SPDX-License-Identifier: GPL-3.0

use super::{Composite, Field, Primitive, TypeDef, TypeId, TypeRegistry, Value};
use crate::error::DecodeError;
use scale::{Compact, Decode};

/// Nesting limit for the type graph walk. Guards against self-referential types that consume no
/// input.
pub(crate) const MAX_DEPTH: usize = 256;

/// Reads values out of a SCALE byte stream by walking the type graph.
///
/// A decoder is a cursor: each successful [`Decoder::decode`] consumes exactly the bytes of one
/// value, so several values can be read back to back (as when recovering key components).
pub struct Decoder<'a> {
	registry: &'a TypeRegistry,
	input: &'a [u8],
}

impl<'a> Decoder<'a> {
	pub fn new(registry: &'a TypeRegistry, input: &'a [u8]) -> Self {
		Self { registry, input }
	}

	/// The bytes not consumed yet.
	pub fn remaining(&self) -> &'a [u8] {
		self.input
	}

	pub fn is_empty(&self) -> bool {
		self.input.is_empty()
	}

	/// Decode one value of type `ty` from the front of the stream.
	pub fn decode(&mut self, ty: TypeId) -> Result<Value, DecodeError> {
		self.value(ty, 0)
	}

	/// Decode one value of type `ty` that must span the whole remaining stream.
	pub fn decode_all(mut self, ty: TypeId) -> Result<Value, DecodeError> {
		let value = self.decode(ty)?;
		if !self.input.is_empty() {
			return Err(mismatch(ty, format!("{} trailing bytes", self.input.len())));
		}
		Ok(value)
	}

	/// Advance past one value of type `ty`, returning the bytes it occupied.
	pub fn skip(&mut self, ty: TypeId) -> Result<&'a [u8], DecodeError> {
		let start = self.input;
		self.decode(ty)?;
		Ok(&start[..start.len() - self.input.len()])
	}

	fn value(&mut self, ty: TypeId, depth: usize) -> Result<Value, DecodeError> {
		if depth > MAX_DEPTH {
			return Err(mismatch(ty, "type graph nested too deep".into()));
		}
		let depth = depth + 1;
		let registry = self.registry;
		match registry.get(ty)? {
			TypeDef::Primitive(primitive) => self.primitive(ty, *primitive),
			TypeDef::Compact(inner) => {
				let raw = self.compact(ty)?;
				// Range errors name the compact type, like malformed prefixes do.
				self.compact_value(*inner, raw, depth).map_err(|e| match e {
					DecodeError::InvalidCompact(_) => DecodeError::InvalidCompact(ty),
					e => e,
				})
			},
			TypeDef::Fixed { len, elem } => self.elements(*elem, *len as usize, depth),
			TypeDef::Sequence(elem) => {
				let len = self.compact(ty)?;
				let len = usize::try_from(len)
					.map_err(|_| mismatch(ty, format!("sequence length {len} too large")))?;
				self.elements(*elem, len, depth)
			},
			TypeDef::Struct { fields } => Ok(Value::Composite(self.fields(fields, depth)?)),
			TypeDef::Variant { cases } => {
				let index = self.take(ty, 1)?[0];
				let case = cases
					.iter()
					.find(|case| case.index == index)
					.ok_or(DecodeError::InvalidVariant { ty, index })?;
				Ok(Value::Variant { name: case.name.clone(), fields: self.fields(&case.fields, depth)? })
			},
			TypeDef::Option(inner) => match self.take(ty, 1)?[0] {
				0 => Ok(Value::Option(None)),
				1 => Ok(Value::Option(Some(Box::new(self.value(*inner, depth)?)))),
				index => Err(DecodeError::InvalidVariant { ty, index }),
			},
			TypeDef::BitSequence { store } => {
				let word = store_width(registry, *store)?;
				let bits = self.compact(ty)?;
				let len = u32::try_from(bits)
					.map_err(|_| mismatch(ty, format!("bit sequence length {bits} too large")))?;
				let word_bits = 8 * word as u32;
				let bytes = len.div_ceil(word_bits) as usize * word;
				Ok(Value::BitSequence { len, data: self.take(ty, bytes)?.to_vec() })
			},
		}
	}

	fn primitive(&mut self, ty: TypeId, primitive: Primitive) -> Result<Value, DecodeError> {
		match primitive {
			Primitive::Bool => match self.take(ty, 1)?[0] {
				0 => Ok(Value::Bool(false)),
				1 => Ok(Value::Bool(true)),
				index => Err(DecodeError::InvalidVariant { ty, index }),
			},
			Primitive::Char => {
				let bytes = self.take(ty, 4)?;
				let code = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
				char::from_u32(code).map(Value::Char).ok_or(DecodeError::InvalidUtf8(ty))
			},
			Primitive::Str => {
				let len = self.compact(ty)?;
				let len = usize::try_from(len)
					.map_err(|_| mismatch(ty, format!("string length {len} too large")))?;
				let bytes = self.take(ty, len)?;
				String::from_utf8(bytes.to_vec())
					.map(Value::Str)
					.map_err(|_| DecodeError::InvalidUtf8(ty))
			},
			Primitive::U256 | Primitive::I256 => Ok(Value::Bytes(self.take(ty, 32)?.to_vec())),
			p if p.is_unsigned() => {
				let width = p.width().unwrap_or(16);
				let mut buf = [0u8; 16];
				buf[..width].copy_from_slice(self.take(ty, width)?);
				Ok(Value::UInt(u128::from_le_bytes(buf)))
			},
			p => {
				let width = p.width().unwrap_or(16);
				let bytes = self.take(ty, width)?;
				let fill = if bytes[width - 1] & 0x80 != 0 { 0xff } else { 0x00 };
				let mut buf = [fill; 16];
				buf[..width].copy_from_slice(bytes);
				Ok(Value::Int(i128::from_le_bytes(buf)))
			},
		}
	}

	/// Interpret an already decoded compact integer as a value of `ty`.
	fn compact_value(&self, ty: TypeId, raw: u128, depth: usize) -> Result<Value, DecodeError> {
		if depth > MAX_DEPTH {
			return Err(mismatch(ty, "type graph nested too deep".into()));
		}
		match self.registry.get(ty)? {
			TypeDef::Primitive(p) if p.is_unsigned() => {
				let bits = 8 * p.width().unwrap_or(16) as u32;
				if bits < 128 && raw >> bits != 0 {
					return Err(DecodeError::InvalidCompact(ty));
				}
				Ok(Value::UInt(raw))
			},
			TypeDef::Struct { fields } if fields.len() == 1 => {
				let inner = self.compact_value(fields[0].ty, raw, depth + 1)?;
				Ok(Value::Composite(match &fields[0].name {
					Some(name) => Composite::Named(vec![(name.clone(), inner)]),
					None => Composite::Unnamed(vec![inner]),
				}))
			},
			_ => Err(mismatch(ty, "compact encoding of a non-integer type".into())),
		}
	}

	fn elements(&mut self, elem: TypeId, len: usize, depth: usize) -> Result<Value, DecodeError> {
		if matches!(self.registry.get(elem)?, TypeDef::Primitive(Primitive::U8)) {
			return Ok(Value::Bytes(self.take(elem, len)?.to_vec()));
		}
		let mut values = Vec::with_capacity(len.min(self.input.len()));
		for _ in 0..len {
			values.push(self.value(elem, depth)?);
		}
		Ok(Value::Sequence(values))
	}

	fn fields(&mut self, fields: &[Field], depth: usize) -> Result<Composite, DecodeError> {
		if !fields.is_empty() && fields.iter().all(|f| f.name.is_some()) {
			let mut named = Vec::with_capacity(fields.len());
			for field in fields {
				let name = field.name.clone().unwrap_or_default();
				named.push((name, self.value(field.ty, depth)?));
			}
			Ok(Composite::Named(named))
		} else {
			let mut values = Vec::with_capacity(fields.len());
			for field in fields {
				values.push(self.value(field.ty, depth)?);
			}
			Ok(Composite::Unnamed(values))
		}
	}

	/// Read a canonical compact integer.
	fn compact(&mut self, ty: TypeId) -> Result<u128, DecodeError> {
		let Some(&prefix) = self.input.first() else {
			return Err(mismatch(ty, "need a compact prefix, 0 bytes left".into()));
		};
		let len = match prefix & 0b11 {
			0b00 => 1,
			0b01 => 2,
			0b10 => 4,
			_ => (prefix >> 2) as usize + 5,
		};
		let mut bytes = self.take(ty, len)?;
		Compact::<u128>::decode(&mut bytes)
			.map(|compact| compact.0)
			.map_err(|_| DecodeError::InvalidCompact(ty))
	}

	fn take(&mut self, ty: TypeId, len: usize) -> Result<&'a [u8], DecodeError> {
		if self.input.len() < len {
			return Err(mismatch(ty, format!("need {len} bytes, {} left", self.input.len())));
		}
		let (head, tail) = self.input.split_at(len);
		self.input = tail;
		Ok(head)
	}
}

/// Byte width of a bit sequence store word.
pub(crate) fn store_width(registry: &TypeRegistry, store: TypeId) -> Result<usize, DecodeError> {
	match registry.get(store)? {
		TypeDef::Primitive(p @ (Primitive::U8 | Primitive::U16 | Primitive::U32 | Primitive::U64)) =>
			Ok(p.width().unwrap_or(1)),
		_ => Err(mismatch(store, "bit sequence store must be u8, u16, u32 or u64".into())),
	}
}

fn mismatch(ty: TypeId, detail: String) -> DecodeError {
	DecodeError::SchemaMismatch { ty, detail }
}
