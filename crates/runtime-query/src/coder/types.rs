// SPDX-License-Identifier: GPL-3.0

//! The runtime type graph.
//!
//! Every on-chain type is a [`TypeDef`] node addressed by a [`TypeId`]. Nodes reference each
//! other by id, so the graph may be recursive; it is only ever walked as deep as a concrete byte
//! stream or value requires.

use crate::error::{DecodeError, MetadataError};
use scale_info::{PortableRegistry, TypeDef as ScaleTypeDef, TypeDefPrimitive, form::PortableForm};
use std::{collections::HashMap, fmt};

/// Reference to a node in a [`TypeRegistry`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(pub u32);

impl fmt::Display for TypeId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "#{}", self.0)
	}
}

/// Built-in scalar types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Primitive {
	Bool,
	Char,
	Str,
	U8,
	U16,
	U32,
	U64,
	U128,
	U256,
	I8,
	I16,
	I32,
	I64,
	I128,
	I256,
}

impl Primitive {
	/// Encoded width in bytes, `None` for variable-length primitives.
	pub fn width(&self) -> Option<usize> {
		use Primitive::*;
		match self {
			Bool | U8 | I8 => Some(1),
			U16 | I16 => Some(2),
			Char | U32 | I32 => Some(4),
			U64 | I64 => Some(8),
			U128 | I128 => Some(16),
			U256 | I256 => Some(32),
			Str => None,
		}
	}

	/// Whether values of this primitive are carried as [`Value::UInt`](super::Value::UInt).
	pub fn is_unsigned(&self) -> bool {
		matches!(self, Primitive::U8 | Primitive::U16 | Primitive::U32 | Primitive::U64 | Primitive::U128)
	}

	/// Whether values of this primitive are carried as [`Value::Int`](super::Value::Int).
	pub fn is_signed(&self) -> bool {
		matches!(self, Primitive::I8 | Primitive::I16 | Primitive::I32 | Primitive::I64 | Primitive::I128)
	}
}

/// A named or positional member of a struct or variant case.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Field {
	pub name: Option<String>,
	pub ty: TypeId,
}

impl Field {
	pub fn named(name: impl Into<String>, ty: TypeId) -> Self {
		Self { name: Some(name.into()), ty }
	}

	pub fn unnamed(ty: TypeId) -> Self {
		Self { name: None, ty }
	}
}

/// One case of an enum-like type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Case {
	pub index: u8,
	pub name: String,
	pub fields: Vec<Field>,
}

impl Case {
	pub fn new(index: u8, name: impl Into<String>, fields: Vec<Field>) -> Self {
		Self { index, name: name.into(), fields }
	}
}

/// The shape of a type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TypeDef {
	Primitive(Primitive),
	/// Compact encoding of an unsigned integer (or a single-field wrapper of one).
	Compact(TypeId),
	/// Fixed-length array.
	Fixed { len: u32, elem: TypeId },
	/// Struct or tuple. Tuples have unnamed fields.
	Struct { fields: Vec<Field> },
	/// Tagged union, one byte discriminant followed by the case fields.
	Variant { cases: Vec<Case> },
	/// Compact length prefix followed by the elements.
	Sequence(TypeId),
	/// `0x00` for none, `0x01` followed by the value for some.
	Option(TypeId),
	/// Compact bit count followed by the packed store words.
	BitSequence { store: TypeId },
}

#[derive(Clone, Debug)]
struct TypeEntry {
	name: Option<String>,
	def: TypeDef,
}

/// Catalog of every type a runtime declares.
#[derive(Clone, Debug, Default)]
pub struct TypeRegistry {
	types: Vec<Option<TypeEntry>>,
	names: HashMap<String, TypeId>,
}

impl TypeRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Append a type and return its id.
	pub fn register(&mut self, name: Option<&str>, def: TypeDef) -> TypeId {
		let id = TypeId(self.types.len() as u32);
		self.insert(id, name.map(str::to_owned), def);
		id
	}

	/// Append a named type and return its id.
	pub fn register_named(&mut self, name: &str, def: TypeDef) -> TypeId {
		self.register(Some(name), def)
	}

	fn insert(&mut self, id: TypeId, name: Option<String>, def: TypeDef) {
		let index = id.0 as usize;
		if self.types.len() <= index {
			self.types.resize(index + 1, None);
		}
		if let Some(name) = &name {
			self.names.entry(name.clone()).or_insert(id);
		}
		self.types[index] = Some(TypeEntry { name, def });
	}

	/// Resolve a type reference.
	pub fn resolve(&self, id: TypeId) -> Option<&TypeDef> {
		self.types.get(id.0 as usize).and_then(Option::as_ref).map(|entry| &entry.def)
	}

	/// Resolve a type reference, failing with [`DecodeError::UnknownType`].
	pub fn get(&self, id: TypeId) -> Result<&TypeDef, DecodeError> {
		self.resolve(id).ok_or(DecodeError::UnknownType(id))
	}

	/// The declared name of a type, if any.
	pub fn name(&self, id: TypeId) -> Option<&str> {
		self.types.get(id.0 as usize).and_then(Option::as_ref).and_then(|e| e.name.as_deref())
	}

	/// Find a type by name. Both the full path (`sp_core::crypto::AccountId32`) and the last
	/// segment (`AccountId32`) are indexed; the first type registered under a name wins.
	pub fn lookup(&self, name: &str) -> Result<TypeId, DecodeError> {
		self.names.get(name).copied().ok_or_else(|| DecodeError::UnknownTypeName(name.to_owned()))
	}

	pub fn len(&self) -> usize {
		self.types.iter().filter(|t| t.is_some()).count()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Convert a portable `scale-info` registry, keeping its type ids.
	pub fn from_portable(registry: &PortableRegistry) -> Result<Self, MetadataError> {
		let mut types = Self::new();
		for portable in &registry.types {
			let ty = &portable.ty;
			let id = TypeId(portable.id);
			let def = match &ty.type_def {
				ScaleTypeDef::Composite(composite) =>
					TypeDef::Struct { fields: composite.fields.iter().map(convert_field).collect() },
				ScaleTypeDef::Variant(_) if ty.path.segments == ["Option"] => {
					let inner = ty
						.type_params
						.first()
						.and_then(|param| param.ty)
						.ok_or_else(|| MetadataError::UnsupportedType(format!("Option {id} without parameter")))?;
					TypeDef::Option(TypeId(inner.id))
				},
				ScaleTypeDef::Variant(variant) => TypeDef::Variant {
					cases: variant
						.variants
						.iter()
						.map(|v| Case {
							index: v.index,
							name: v.name.clone(),
							fields: v.fields.iter().map(convert_field).collect(),
						})
						.collect(),
				},
				ScaleTypeDef::Sequence(sequence) => TypeDef::Sequence(TypeId(sequence.type_param.id)),
				ScaleTypeDef::Array(array) =>
					TypeDef::Fixed { len: array.len, elem: TypeId(array.type_param.id) },
				ScaleTypeDef::Tuple(tuple) => TypeDef::Struct {
					fields: tuple.fields.iter().map(|f| Field::unnamed(TypeId(f.id))).collect(),
				},
				ScaleTypeDef::Primitive(primitive) => TypeDef::Primitive(convert_primitive(primitive)),
				ScaleTypeDef::Compact(compact) => TypeDef::Compact(TypeId(compact.type_param.id)),
				ScaleTypeDef::BitSequence(bits) =>
					TypeDef::BitSequence { store: TypeId(bits.bit_store_type.id) },
			};
			let name = (!ty.path.segments.is_empty()).then(|| ty.path.segments.join("::"));
			if let Some(last) = ty.path.segments.last() {
				types.names.entry(last.clone()).or_insert(id);
			}
			types.insert(id, name, def);
		}
		Ok(types)
	}
}

fn convert_field(field: &scale_info::Field<PortableForm>) -> Field {
	Field { name: field.name.clone(), ty: TypeId(field.ty.id) }
}

fn convert_primitive(primitive: &TypeDefPrimitive) -> Primitive {
	match primitive {
		TypeDefPrimitive::Bool => Primitive::Bool,
		TypeDefPrimitive::Char => Primitive::Char,
		TypeDefPrimitive::Str => Primitive::Str,
		TypeDefPrimitive::U8 => Primitive::U8,
		TypeDefPrimitive::U16 => Primitive::U16,
		TypeDefPrimitive::U32 => Primitive::U32,
		TypeDefPrimitive::U64 => Primitive::U64,
		TypeDefPrimitive::U128 => Primitive::U128,
		TypeDefPrimitive::U256 => Primitive::U256,
		TypeDefPrimitive::I8 => Primitive::I8,
		TypeDefPrimitive::I16 => Primitive::I16,
		TypeDefPrimitive::I32 => Primitive::I32,
		TypeDefPrimitive::I64 => Primitive::I64,
		TypeDefPrimitive::I128 => Primitive::I128,
		TypeDefPrimitive::I256 => Primitive::I256,
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use scale_info::{MetaType, Registry, TypeInfo};

	#[derive(TypeInfo)]
	#[allow(dead_code)]
	struct AccountData {
		free: u128,
		frozen: Option<u64>,
	}

	#[derive(TypeInfo)]
	#[allow(dead_code)]
	enum Status {
		Idle,
		Busy(u32),
	}

	fn portable<T: TypeInfo + 'static>() -> (PortableRegistry, u32) {
		let mut registry = Registry::new();
		let id = registry.register_type(&MetaType::new::<T>()).id;
		(registry.into(), id)
	}

	#[test]
	fn register_and_lookup_by_name() {
		let mut registry = TypeRegistry::new();
		let u32_ty = registry.register_named("u32", TypeDef::Primitive(Primitive::U32));
		let seq = registry.register(None, TypeDef::Sequence(u32_ty));
		assert_eq!(registry.lookup("u32").unwrap(), u32_ty);
		assert_eq!(registry.resolve(seq), Some(&TypeDef::Sequence(u32_ty)));
		assert_eq!(registry.len(), 2);
		assert!(matches!(registry.lookup("u64"), Err(DecodeError::UnknownTypeName(name)) if name == "u64"));
		assert_eq!(registry.get(TypeId(42)), Err(DecodeError::UnknownType(TypeId(42))));
	}

	#[test]
	fn converts_portable_struct_with_option() {
		let (portable, id) = portable::<AccountData>();
		let registry = TypeRegistry::from_portable(&portable).unwrap();
		let TypeDef::Struct { fields } = registry.get(TypeId(id)).unwrap() else {
			panic!("expected a struct");
		};
		assert_eq!(fields.len(), 2);
		assert_eq!(fields[0].name.as_deref(), Some("free"));
		assert_eq!(registry.get(fields[0].ty).unwrap(), &TypeDef::Primitive(Primitive::U128));
		let TypeDef::Option(inner) = registry.get(fields[1].ty).unwrap() else {
			panic!("expected an option");
		};
		assert_eq!(registry.get(*inner).unwrap(), &TypeDef::Primitive(Primitive::U64));
		assert_eq!(registry.lookup("AccountData").unwrap(), TypeId(id));
	}

	#[test]
	fn converts_portable_variant() {
		let (portable, id) = portable::<Status>();
		let registry = TypeRegistry::from_portable(&portable).unwrap();
		let TypeDef::Variant { cases } = registry.get(TypeId(id)).unwrap() else {
			panic!("expected a variant");
		};
		assert_eq!(cases.len(), 2);
		assert_eq!((cases[0].index, cases[0].name.as_str()), (0, "Idle"));
		assert_eq!((cases[1].index, cases[1].name.as_str()), (1, "Busy"));
		assert_eq!(cases[1].fields.len(), 1);
	}
}
