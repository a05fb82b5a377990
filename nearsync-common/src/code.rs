// Copyright 2026 nearsync Project Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Key and value coding.
//!
//! Keys are cached by their serialized form, the same opaque representation the cluster uses in
//! invalidation events, so a locally built key and a key received from the wire match byte by byte.

use bytes::Bytes;
use serde::{de::DeserializeOwned, Serialize};

use crate::error::Result;

/// Serialized, opaque representation of a key.
pub type KeyData = Bytes;

/// Key that can be cached by a near cache.
pub trait Key: Serialize + Send + Sync + 'static {}
impl<T: Serialize + Send + Sync + 'static> Key for T {}

/// Value that can be cached by a near cache.
pub trait Value: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}
impl<T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static> Value for T {}

/// Encode a key into its [`KeyData`].
pub fn key_data<K>(key: &K) -> Result<KeyData>
where
    K: Serialize + ?Sized,
{
    let buf = bincode::serialize(key)?;
    Ok(Bytes::from(buf))
}

/// Encode a value into bytes.
pub fn encode<V>(value: &V) -> Result<Bytes>
where
    V: Serialize + ?Sized,
{
    let buf = bincode::serialize(value)?;
    Ok(Bytes::from(buf))
}

/// Decode a value from bytes.
pub fn decode<V>(buf: &[u8]) -> Result<V>
where
    V: DeserializeOwned,
{
    let v = bincode::deserialize(buf)?;
    Ok(v)
}
