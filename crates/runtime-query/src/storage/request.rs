// SPDX-License-Identifier: GPL-3.0

//! Declarative storage request descriptors.

use crate::{coder::Value, metadata::StorageCodingPath};
use scale::Encode;
use sp_core::H256;
use std::time::Duration;

/// One storage key component.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum KeyParam {
	/// A dynamic value, encoded against the type the metadata declares for the component.
	Value(Value),
	/// Bytes that are already SCALE encoded, used verbatim.
	Encoded(Vec<u8>),
}

impl KeyParam {
	/// A component from any statically typed SCALE value.
	pub fn encoded<E: Encode>(value: &E) -> Self {
		KeyParam::Encoded(value.encode())
	}
}

impl From<Value> for KeyParam {
	fn from(value: Value) -> Self {
		KeyParam::Value(value)
	}
}

/// Key components of an n-map request, stored as one list per key position.
///
/// Column `i` holds the `i`-th component of every requested key, so all columns must have the
/// same length. The requested keys are the rows.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NMapKeys {
	columns: Vec<Vec<KeyParam>>,
}

impl NMapKeys {
	pub fn from_columns(columns: Vec<Vec<KeyParam>>) -> Self {
		Self { columns }
	}

	/// Build from complete keys. Rows shorter than the longest leave their columns short, which
	/// fails validation when the request is performed.
	pub fn from_rows(rows: Vec<Vec<KeyParam>>) -> Self {
		let width = rows.iter().map(Vec::len).max().unwrap_or_default();
		let mut columns: Vec<Vec<KeyParam>> = (0..width).map(|_| Vec::with_capacity(rows.len())).collect();
		for row in rows {
			for (column, param) in columns.iter_mut().zip(row) {
				column.push(param);
			}
		}
		Self { columns }
	}

	pub fn columns(&self) -> &[Vec<KeyParam>] {
		&self.columns
	}

	/// Number of key components per row.
	pub fn width(&self) -> usize {
		self.columns.len()
	}

	/// Number of keys, or `None` when the columns disagree.
	pub fn row_count(&self) -> Option<usize> {
		let first = self.columns.first().map(Vec::len).unwrap_or_default();
		self.columns.iter().all(|c| c.len() == first).then_some(first)
	}

	/// The keys in input order. Empty when the columns disagree.
	pub fn rows(&self) -> Vec<Vec<&KeyParam>> {
		let Some(count) = self.row_count() else { return Vec::new() };
		(0..count).map(|row| self.columns.iter().map(|column| &column[row]).collect()).collect()
	}
}

/// Key parameters attached to a request.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum StorageParams {
	/// Plain entries, or a prefix scan over the whole entry.
	#[default]
	None,
	/// One single-component key.
	Encodable(KeyParam),
	/// One single-component key per item; for prefix scans, the leading components of the key.
	EncodableList(Vec<KeyParam>),
	/// Multi-component keys.
	NMap(NMapKeys),
}

/// How many values a request yields.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Cardinality {
	Single,
	Multiple,
	Prefix,
}

/// A storage query: which entry, which keys, and how many results.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StorageRequest {
	pub path: StorageCodingPath,
	pub params: StorageParams,
	pub cardinality: Cardinality,
	/// Block to query at; the best block when `None`.
	pub at: Option<H256>,
	/// Deadline for each RPC call of the request; the engine default when `None`.
	pub timeout: Option<Duration>,
}

impl StorageRequest {
	fn new(path: StorageCodingPath, params: StorageParams, cardinality: Cardinality) -> Self {
		Self { path, params, cardinality, at: None, timeout: None }
	}

	/// Read a plain entry.
	pub fn plain(path: StorageCodingPath) -> Self {
		Self::new(path, StorageParams::None, Cardinality::Single)
	}

	/// Read one key of a map.
	pub fn single(path: StorageCodingPath, key: impl Into<KeyParam>) -> Self {
		Self::new(path, StorageParams::Encodable(key.into()), Cardinality::Single)
	}

	/// Read one multi-component key.
	pub fn single_n_map(path: StorageCodingPath, key: Vec<KeyParam>) -> Self {
		Self::new(path, StorageParams::NMap(NMapKeys::from_rows(vec![key])), Cardinality::Single)
	}

	/// Read several keys of a map, one result per key.
	pub fn multiple<K: Into<KeyParam>>(path: StorageCodingPath, keys: impl IntoIterator<Item = K>) -> Self {
		let keys = keys.into_iter().map(Into::into).collect();
		Self::new(path, StorageParams::EncodableList(keys), Cardinality::Multiple)
	}

	/// Read several multi-component keys, one result per row.
	pub fn n_map(path: StorageCodingPath, keys: NMapKeys) -> Self {
		Self::new(path, StorageParams::NMap(keys), Cardinality::Multiple)
	}

	/// Enumerate every key of an entry.
	pub fn prefix(path: StorageCodingPath) -> Self {
		Self::new(path, StorageParams::None, Cardinality::Prefix)
	}

	/// Enumerate the keys of an entry that start with the given components.
	pub fn prefix_with(path: StorageCodingPath, leading: Vec<KeyParam>) -> Self {
		Self::new(path, StorageParams::EncodableList(leading), Cardinality::Prefix)
	}

	pub fn at(mut self, block: H256) -> Self {
		self.at = Some(block);
		self
	}

	pub fn with_timeout(mut self, timeout: Duration) -> Self {
		self.timeout = Some(timeout);
		self
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn param(v: u32) -> KeyParam {
		KeyParam::Value(Value::from(v))
	}

	#[test]
	fn rows_transpose_columns_in_order() {
		let keys = NMapKeys::from_columns(vec![vec![param(1), param(2)], vec![param(10), param(20)]]);
		assert_eq!(keys.row_count(), Some(2));
		assert_eq!(keys.rows(), vec![vec![&param(1), &param(10)], vec![&param(2), &param(20)]]);
	}

	#[test]
	fn from_rows_round_trips() {
		let rows = vec![vec![param(1), param(10)], vec![param(2), param(20)], vec![param(3), param(30)]];
		let keys = NMapKeys::from_rows(rows);
		assert_eq!(keys.width(), 2);
		assert_eq!(keys.columns()[0], vec![param(1), param(2), param(3)]);
		assert_eq!(keys.columns()[1], vec![param(10), param(20), param(30)]);
	}

	#[test]
	fn unequal_columns_have_no_rows() {
		let keys = NMapKeys::from_columns(vec![vec![param(1), param(2)], vec![param(10)]]);
		assert_eq!(keys.row_count(), None);
		assert!(keys.rows().is_empty());
		let ragged = NMapKeys::from_rows(vec![vec![param(1), param(10)], vec![param(2)]]);
		assert_eq!(ragged.row_count(), None);
	}

	#[test]
	fn builders_set_cardinality() {
		let path = StorageCodingPath::SYSTEM_ACCOUNT;
		assert_eq!(StorageRequest::plain(path.clone()).cardinality, Cardinality::Single);
		let request = StorageRequest::multiple(path.clone(), [Value::from(1u8), Value::from(2u8)]);
		assert_eq!(request.cardinality, Cardinality::Multiple);
		assert!(matches!(request.params, StorageParams::EncodableList(ref keys) if keys.len() == 2));
		let request = StorageRequest::prefix(path).at(H256::repeat_byte(1)).with_timeout(Duration::from_secs(1));
		assert_eq!(request.cardinality, Cardinality::Prefix);
		assert_eq!(request.at, Some(H256::repeat_byte(1)));
		assert_eq!(request.timeout, Some(Duration::from_secs(1)));
	}

	#[test]
	fn encoded_params_use_scale() {
		assert_eq!(KeyParam::encoded(&7u32), KeyParam::Encoded(vec![7, 0, 0, 0]));
	}
}
