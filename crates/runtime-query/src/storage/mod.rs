// SPDX-License-Identifier: GPL-3.0

//! Storage requests: descriptors, key derivation, workers and the performer façade.

mod cache;
mod key;
mod performer;
mod request;
mod worker;

pub use cache::{MemoryStorageCache, StorageCache};
pub use key::{StorageKeyEncoder, StoragePrefix};
pub use performer::StorageRequestPerformer;
pub use request::{Cardinality, KeyParam, NMapKeys, StorageParams, StorageRequest};
