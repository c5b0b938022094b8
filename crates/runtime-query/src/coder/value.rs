// SPDX-License-Identifier: GPL-3.0

use std::fmt;

/// A dynamically typed on-chain value.
///
/// Values produced by a [`Decoder`](super::Decoder) are canonical: byte arrays and byte vectors
/// are [`Value::Bytes`], structs with named fields are [`Composite::Named`], tuples and tuple
/// structs are [`Composite::Unnamed`].
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Value {
	Bool(bool),
	Char(char),
	Str(String),
	UInt(u128),
	Int(i128),
	/// `u8` arrays and sequences, and little-endian 256-bit integers.
	Bytes(Vec<u8>),
	Composite(Composite),
	Variant {
		name: String,
		fields: Composite,
	},
	Sequence(Vec<Value>),
	Option(Option<Box<Value>>),
	BitSequence {
		len: u32,
		data: Vec<u8>,
	},
}

/// The fields of a struct, tuple or variant case.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Composite {
	Named(Vec<(String, Value)>),
	Unnamed(Vec<Value>),
}

impl Composite {
	pub fn len(&self) -> usize {
		match self {
			Composite::Named(fields) => fields.len(),
			Composite::Unnamed(values) => values.len(),
		}
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Field values in declaration order, names dropped.
	pub fn values(&self) -> Box<dyn Iterator<Item = &Value> + '_> {
		match self {
			Composite::Named(fields) => Box::new(fields.iter().map(|(_, v)| v)),
			Composite::Unnamed(values) => Box::new(values.iter()),
		}
	}

	/// Look up a named field.
	pub fn field(&self, name: &str) -> Option<&Value> {
		match self {
			Composite::Named(fields) => fields.iter().find(|(n, _)| n == name).map(|(_, v)| v),
			Composite::Unnamed(_) => None,
		}
	}
}

impl Value {
	pub fn named<S: Into<String>>(fields: impl IntoIterator<Item = (S, Value)>) -> Self {
		Value::Composite(Composite::Named(fields.into_iter().map(|(n, v)| (n.into(), v)).collect()))
	}

	pub fn unnamed(values: impl IntoIterator<Item = Value>) -> Self {
		Value::Composite(Composite::Unnamed(values.into_iter().collect()))
	}

	pub fn variant(name: impl Into<String>, fields: Composite) -> Self {
		Value::Variant { name: name.into(), fields }
	}

	/// A variant case without fields.
	pub fn unit_variant(name: impl Into<String>) -> Self {
		Value::Variant { name: name.into(), fields: Composite::Unnamed(Vec::new()) }
	}

	pub fn some(value: Value) -> Self {
		Value::Option(Some(Box::new(value)))
	}

	pub fn none() -> Self {
		Value::Option(None)
	}

	pub fn as_u128(&self) -> Option<u128> {
		match self {
			Value::UInt(v) => Some(*v),
			Value::Int(v) => u128::try_from(*v).ok(),
			_ => None,
		}
	}

	pub fn as_bytes(&self) -> Option<&[u8]> {
		match self {
			Value::Bytes(bytes) => Some(bytes),
			_ => None,
		}
	}

	pub fn as_str(&self) -> Option<&str> {
		match self {
			Value::Str(s) => Some(s),
			_ => None,
		}
	}

	/// Look up a named field of a struct or variant value.
	pub fn field(&self, name: &str) -> Option<&Value> {
		match self {
			Value::Composite(composite) | Value::Variant { fields: composite, .. } =>
				composite.field(name),
			_ => None,
		}
	}

	/// Follow a path of named fields, e.g. `["data", "free"]`.
	pub fn at(&self, path: &[&str]) -> Option<&Value> {
		path.iter().try_fold(self, |value, name| value.field(name))
	}
}

macro_rules! from_unsigned {
	($($t:ty),*) => {
		$(impl From<$t> for Value {
			fn from(value: $t) -> Self {
				Value::UInt(value.into())
			}
		})*
	};
}

macro_rules! from_signed {
	($($t:ty),*) => {
		$(impl From<$t> for Value {
			fn from(value: $t) -> Self {
				Value::Int(value.into())
			}
		})*
	};
}

from_unsigned!(u8, u16, u32, u64, u128);
from_signed!(i8, i16, i32, i64, i128);

impl From<bool> for Value {
	fn from(value: bool) -> Self {
		Value::Bool(value)
	}
}

impl From<&str> for Value {
	fn from(value: &str) -> Self {
		Value::Str(value.to_owned())
	}
}

impl From<String> for Value {
	fn from(value: String) -> Self {
		Value::Str(value)
	}
}

impl From<Vec<u8>> for Value {
	fn from(value: Vec<u8>) -> Self {
		Value::Bytes(value)
	}
}

impl<const N: usize> From<[u8; N]> for Value {
	fn from(value: [u8; N]) -> Self {
		Value::Bytes(value.to_vec())
	}
}

impl fmt::Display for Value {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Value::Bool(v) => write!(f, "{v}"),
			Value::Char(v) => write!(f, "'{v}'"),
			Value::Str(v) => write!(f, "{v:?}"),
			Value::UInt(v) => write!(f, "{v}"),
			Value::Int(v) => write!(f, "{v}"),
			Value::Bytes(bytes) => write!(f, "0x{}", hex::encode(bytes)),
			Value::Composite(composite) => write!(f, "{composite}"),
			Value::Variant { name, fields } if fields.is_empty() => write!(f, "{name}"),
			Value::Variant { name, fields } => write!(f, "{name}{fields}"),
			Value::Sequence(values) => {
				write!(f, "[")?;
				for (i, value) in values.iter().enumerate() {
					if i > 0 {
						write!(f, ", ")?;
					}
					write!(f, "{value}")?;
				}
				write!(f, "]")
			},
			Value::Option(None) => write!(f, "None"),
			Value::Option(Some(value)) => write!(f, "Some({value})"),
			Value::BitSequence { len, data } => write!(f, "bits({len}, 0x{})", hex::encode(data)),
		}
	}
}

impl fmt::Display for Composite {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Composite::Named(fields) => {
				write!(f, "{{ ")?;
				for (i, (name, value)) in fields.iter().enumerate() {
					if i > 0 {
						write!(f, ", ")?;
					}
					write!(f, "{name}: {value}")?;
				}
				write!(f, " }}")
			},
			Composite::Unnamed(values) => {
				write!(f, "(")?;
				for (i, value) in values.iter().enumerate() {
					if i > 0 {
						write!(f, ", ")?;
					}
					write!(f, "{value}")?;
				}
				write!(f, ")")
			},
		}
	}
}
