// SPDX-License-Identifier: GPL-3.0

use super::{Composite, Field, Primitive, TypeDef, TypeId, TypeRegistry, Value, decode::MAX_DEPTH};
use crate::error::EncodeError;
use scale::{Compact, Encode};

/// Writes values into a SCALE byte buffer by walking the type graph.
///
/// The output is canonical: compact integers always use their smallest mode, so encoding the
/// same value twice yields identical bytes.
pub struct Encoder<'a> {
	registry: &'a TypeRegistry,
	out: Vec<u8>,
}

impl<'a> Encoder<'a> {
	pub fn new(registry: &'a TypeRegistry) -> Self {
		Self { registry, out: Vec::new() }
	}

	/// Append `value` encoded as type `ty`.
	///
	/// On error the buffer is left as it was before the call.
	pub fn encode(&mut self, ty: TypeId, value: &Value) -> Result<&mut Self, EncodeError> {
		let mark = self.out.len();
		if let Err(e) = self.value(ty, value, 0) {
			self.out.truncate(mark);
			return Err(e);
		}
		Ok(self)
	}

	/// Append bytes that are already SCALE encoded.
	pub fn append_encoded(&mut self, bytes: &[u8]) -> &mut Self {
		self.out.extend_from_slice(bytes);
		self
	}

	pub fn len(&self) -> usize {
		self.out.len()
	}

	pub fn is_empty(&self) -> bool {
		self.out.is_empty()
	}

	pub fn into_bytes(self) -> Vec<u8> {
		self.out
	}

	fn value(&mut self, ty: TypeId, value: &Value, depth: usize) -> Result<(), EncodeError> {
		if depth > MAX_DEPTH {
			return Err(EncodeError::ValueMismatch { ty, expected: "a finite type graph" });
		}
		let depth = depth + 1;
		let registry = self.registry;
		match registry.resolve(ty).ok_or(EncodeError::UnknownType(ty))? {
			TypeDef::Primitive(primitive) => self.primitive(ty, *primitive, value),
			TypeDef::Compact(inner) => {
				let raw = compact_integer(registry, *inner, value, depth)?;
				Compact(raw).encode_to(&mut self.out);
				Ok(())
			},
			TypeDef::Fixed { len, elem } => {
				let len = *len as usize;
				let actual = match value {
					Value::Bytes(bytes) => bytes.len(),
					Value::Sequence(values) => values.len(),
					_ => return Err(EncodeError::ValueMismatch { ty, expected: "an array" }),
				};
				if actual != len {
					return Err(EncodeError::LengthMismatch { ty, expected: len, actual });
				}
				self.elements(ty, *elem, value, depth)
			},
			TypeDef::Sequence(elem) => {
				let len = match value {
					Value::Bytes(bytes) => bytes.len(),
					Value::Sequence(values) => values.len(),
					_ => return Err(EncodeError::ValueMismatch { ty, expected: "a sequence" }),
				};
				Compact(len as u64).encode_to(&mut self.out);
				self.elements(ty, *elem, value, depth)
			},
			TypeDef::Struct { fields } => match value {
				Value::Composite(composite) => self.fields(ty, fields, composite, depth),
				// Newtype wrappers accept their inner value directly.
				inner if fields.len() == 1 => self.value(fields[0].ty, inner, depth),
				_ => Err(EncodeError::ValueMismatch { ty, expected: "a composite" }),
			},
			TypeDef::Variant { cases } => {
				let Value::Variant { name, fields } = value else {
					return Err(EncodeError::ValueMismatch { ty, expected: "a variant" });
				};
				let case = cases
					.iter()
					.find(|case| &case.name == name)
					.ok_or_else(|| EncodeError::VariantNotFound { ty, name: name.clone() })?;
				self.out.push(case.index);
				self.fields(ty, &case.fields, fields, depth)
			},
			TypeDef::Option(inner) => match value {
				Value::Option(None) => {
					self.out.push(0);
					Ok(())
				},
				Value::Option(Some(value)) => {
					self.out.push(1);
					self.value(*inner, value, depth)
				},
				_ => Err(EncodeError::ValueMismatch { ty, expected: "an option" }),
			},
			TypeDef::BitSequence { store } => {
				let Value::BitSequence { len, data } = value else {
					return Err(EncodeError::ValueMismatch { ty, expected: "a bit sequence" });
				};
				let word = super::decode::store_width(registry, *store)
					.map_err(|_| EncodeError::UnknownType(*store))?;
				let expected = len.div_ceil(8 * word as u32) as usize * word;
				if data.len() != expected {
					return Err(EncodeError::LengthMismatch { ty, expected, actual: data.len() });
				}
				Compact(*len).encode_to(&mut self.out);
				self.out.extend_from_slice(data);
				Ok(())
			},
		}
	}

	fn primitive(&mut self, ty: TypeId, primitive: Primitive, value: &Value) -> Result<(), EncodeError> {
		match (primitive, value) {
			(Primitive::Bool, Value::Bool(v)) => v.encode_to(&mut self.out),
			(Primitive::Char, Value::Char(v)) => (*v as u32).encode_to(&mut self.out),
			(Primitive::Str, Value::Str(v)) => v.encode_to(&mut self.out),
			(Primitive::U256 | Primitive::I256, Value::Bytes(bytes)) => {
				if bytes.len() != 32 {
					return Err(EncodeError::LengthMismatch { ty, expected: 32, actual: bytes.len() });
				}
				self.out.extend_from_slice(bytes);
			},
			(Primitive::U256, Value::UInt(v)) => {
				self.out.extend_from_slice(&v.to_le_bytes());
				self.out.extend_from_slice(&[0u8; 16]);
			},
			(Primitive::I256, Value::Int(v)) => {
				let fill = if *v < 0 { 0xff } else { 0x00 };
				self.out.extend_from_slice(&v.to_le_bytes());
				self.out.extend_from_slice(&[fill; 16]);
			},
			(p, Value::UInt(_) | Value::Int(_)) if p.is_unsigned() => {
				let v = value.as_u128().ok_or(EncodeError::OutOfRange(ty))?;
				let width = p.width().unwrap_or(16);
				if width < 16 && v >> (8 * width) != 0 {
					return Err(EncodeError::OutOfRange(ty));
				}
				self.out.extend_from_slice(&v.to_le_bytes()[..width]);
			},
			(p, Value::UInt(_) | Value::Int(_)) if p.is_signed() => {
				let v = match value {
					Value::Int(v) => *v,
					Value::UInt(v) => i128::try_from(*v).map_err(|_| EncodeError::OutOfRange(ty))?,
					_ => return Err(EncodeError::OutOfRange(ty)),
				};
				let width = p.width().unwrap_or(16);
				if width < 16 {
					let bits = 8 * width as u32;
					let (min, max) = (-(1i128 << (bits - 1)), (1i128 << (bits - 1)) - 1);
					if v < min || v > max {
						return Err(EncodeError::OutOfRange(ty));
					}
				}
				self.out.extend_from_slice(&v.to_le_bytes()[..width]);
			},
			(p, _) => return Err(EncodeError::ValueMismatch { ty, expected: primitive_kind(p) }),
		}
		Ok(())
	}

	fn elements(&mut self, ty: TypeId, elem: TypeId, value: &Value, depth: usize) -> Result<(), EncodeError> {
		match value {
			Value::Bytes(bytes) => {
				let registry = self.registry;
				match registry.resolve(elem).ok_or(EncodeError::UnknownType(elem))? {
					TypeDef::Primitive(Primitive::U8) => {
						self.out.extend_from_slice(bytes);
						Ok(())
					},
					_ => Err(EncodeError::ValueMismatch { ty, expected: "a sequence of values" }),
				}
			},
			Value::Sequence(values) => {
				for value in values {
					self.value(elem, value, depth)?;
				}
				Ok(())
			},
			_ => Err(EncodeError::ValueMismatch { ty, expected: "a sequence" }),
		}
	}

	fn fields(
		&mut self,
		ty: TypeId,
		fields: &[Field],
		value: &Composite,
		depth: usize,
	) -> Result<(), EncodeError> {
		if value.len() != fields.len() {
			return Err(EncodeError::LengthMismatch { ty, expected: fields.len(), actual: value.len() });
		}
		match value {
			Composite::Named(_) if fields.iter().all(|f| f.name.is_some()) =>
				for field in fields {
					let name = field.name.as_deref().unwrap_or_default();
					let value = value
						.field(name)
						.ok_or_else(|| EncodeError::MissingField { ty, name: name.to_owned() })?;
					self.value(field.ty, value, depth)?;
				},
			_ =>
				for (field, value) in fields.iter().zip(value.values()) {
					self.value(field.ty, value, depth)?;
				},
		}
		Ok(())
	}
}

/// The integer carried by a value destined for a compact encoding of `ty`.
fn compact_integer(
	registry: &TypeRegistry,
	ty: TypeId,
	value: &Value,
	depth: usize,
) -> Result<u128, EncodeError> {
	if depth > MAX_DEPTH {
		return Err(EncodeError::ValueMismatch { ty, expected: "a finite type graph" });
	}
	match registry.resolve(ty).ok_or(EncodeError::UnknownType(ty))? {
		TypeDef::Primitive(p) if p.is_unsigned() => {
			let v = value.as_u128().ok_or(EncodeError::ValueMismatch { ty, expected: "an unsigned integer" })?;
			let width = p.width().unwrap_or(16);
			if width < 16 && v >> (8 * width) != 0 {
				return Err(EncodeError::OutOfRange(ty));
			}
			Ok(v)
		},
		TypeDef::Struct { fields } if fields.len() == 1 => {
			let inner = match value {
				Value::Composite(composite) if composite.len() == 1 =>
					composite.values().next().unwrap_or(value),
				other => other,
			};
			compact_integer(registry, fields[0].ty, inner, depth + 1)
		},
		_ => Err(EncodeError::ValueMismatch { ty, expected: "an unsigned integer type" }),
	}
}

fn primitive_kind(primitive: Primitive) -> &'static str {
	match primitive {
		Primitive::Bool => "a bool",
		Primitive::Char => "a char",
		Primitive::Str => "a string",
		Primitive::U256 | Primitive::I256 => "32 bytes",
		p if p.is_unsigned() => "an unsigned integer",
		_ => "a signed integer",
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::coder::Case;

	fn registry() -> (TypeRegistry, [TypeId; 7]) {
		let mut registry = TypeRegistry::new();
		let u8 = registry.register_named("u8", TypeDef::Primitive(Primitive::U8));
		let u32 = registry.register_named("u32", TypeDef::Primitive(Primitive::U32));
		let i8 = registry.register_named("i8", TypeDef::Primitive(Primitive::I8));
		let account = registry.register_named("AccountId32", TypeDef::Fixed { len: 32, elem: u8 });
		let compact = registry.register(None, TypeDef::Compact(u32));
		let status = registry.register_named(
			"Status",
			TypeDef::Variant {
				cases: vec![
					Case::new(0, "Idle", vec![]),
					Case::new(1, "Busy", vec![Field::named("since", u32)]),
				],
			},
		);
		let pair = registry.register(
			None,
			TypeDef::Struct { fields: vec![Field::named("a", u8), Field::named("b", u32)] },
		);
		(registry, [u8, u32, i8, account, compact, status, pair])
	}

	fn encode(registry: &TypeRegistry, ty: TypeId, value: &Value) -> Result<Vec<u8>, EncodeError> {
		let mut encoder = Encoder::new(registry);
		encoder.encode(ty, value)?;
		Ok(encoder.into_bytes())
	}

	#[test]
	fn encodes_integers_little_endian() {
		let (registry, [_, u32, i8, ..]) = registry();
		assert_eq!(encode(&registry, u32, &Value::UInt(0x01020304)).unwrap(), [4, 3, 2, 1]);
		assert_eq!(encode(&registry, i8, &Value::Int(-1)).unwrap(), [0xff]);
	}

	#[test]
	fn out_of_range_integers_fail() {
		let (registry, [u8, _, i8, ..]) = registry();
		assert_eq!(encode(&registry, u8, &Value::UInt(256)), Err(EncodeError::OutOfRange(u8)));
		assert_eq!(encode(&registry, i8, &Value::Int(128)), Err(EncodeError::OutOfRange(i8)));
		assert_eq!(encode(&registry, u8, &Value::Int(-1)), Err(EncodeError::OutOfRange(u8)));
	}

	#[test]
	fn compact_uses_smallest_mode() {
		let (registry, [.., compact, _, _]) = registry();
		assert_eq!(encode(&registry, compact, &Value::UInt(63)).unwrap(), [63 << 2]);
		assert_eq!(encode(&registry, compact, &Value::UInt(64)).unwrap(), Compact(64u32).encode());
		assert_eq!(
			encode(&registry, compact, &Value::UInt(1 << 30)).unwrap(),
			Compact(1u32 << 30).encode()
		);
	}

	#[test]
	fn fixed_arrays_check_length() {
		let (registry, [.., account, _, _, _]) = registry();
		assert_eq!(encode(&registry, account, &Value::Bytes(vec![7; 32])).unwrap(), vec![7; 32]);
		assert_eq!(
			encode(&registry, account, &Value::Bytes(vec![7; 20])),
			Err(EncodeError::LengthMismatch { ty: account, expected: 32, actual: 20 })
		);
	}

	#[test]
	fn variants_are_selected_by_name() {
		let (registry, [.., status, _]) = registry();
		let busy = Value::variant("Busy", Composite::Named(vec![("since".into(), Value::UInt(5))]));
		assert_eq!(encode(&registry, status, &busy).unwrap(), [1, 5, 0, 0, 0]);
		assert_eq!(
			encode(&registry, status, &Value::unit_variant("Gone")),
			Err(EncodeError::VariantNotFound { ty: status, name: "Gone".into() })
		);
	}

	#[test]
	fn named_fields_follow_declaration_order() {
		let (registry, [.., pair]) = registry();
		let value = Value::named([("b", Value::UInt(2)), ("a", Value::UInt(1))]);
		assert_eq!(encode(&registry, pair, &value).unwrap(), [1, 2, 0, 0, 0]);
		let missing = Value::named([("a", Value::UInt(1)), ("c", Value::UInt(2))]);
		assert_eq!(
			encode(&registry, pair, &missing),
			Err(EncodeError::MissingField { ty: pair, name: "b".into() })
		);
	}

	#[test]
	fn failed_encode_leaves_buffer_untouched() {
		let (registry, [u8, _, _, _, _, _, pair]) = registry();
		let mut encoder = Encoder::new(&registry);
		encoder.encode(u8, &Value::UInt(9)).unwrap();
		let bad = Value::unnamed([Value::UInt(1), Value::Str("x".into())]);
		assert!(encoder.encode(pair, &bad).is_err());
		assert_eq!(encoder.into_bytes(), [9]);
	}

	#[test]
	fn mismatched_kind_fails() {
		let (registry, [_, u32, ..]) = registry();
		assert_eq!(
			encode(&registry, u32, &Value::Bool(true)),
			Err(EncodeError::ValueMismatch { ty: u32, expected: "an unsigned integer" })
		);
	}
}
