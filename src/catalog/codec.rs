use std::fmt;
use std::marker::PhantomData;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::utils::error::CodecError;

/// Converts a structured payload to and from its binary wire body.
pub trait MessageCodec: Send + Sync + fmt::Debug {
    fn encode(&self, payload: &Value) -> Result<Vec<u8>, CodecError>;

    fn decode(&self, body: &[u8]) -> Result<Value, CodecError>;
}

/// `bincode` over a typed serde schema.
///
/// The payload is first checked against `T`; a payload missing a field or with
/// a wrongly typed field fails with `CodecError::Schema` instead of producing a
/// frame the receiver cannot read.
///
/// Decoding rebuilds the payload from `T`, so it comes back in the schema's
/// canonical JSON form rather than byte-for-byte as it went in: an integer
/// given for a float field (`"frameRate": 30`) decodes as `30.0`. Compare
/// decoded payloads through `T`, not as raw `Value`s.
pub struct BincodeCodec<T> {
    type_name: &'static str,
    _schema: PhantomData<fn() -> T>,
}

impl<T> BincodeCodec<T> {
    pub fn new(type_name: &'static str) -> Self {
        Self {
            type_name,
            _schema: PhantomData,
        }
    }
}

impl<T> fmt::Debug for BincodeCodec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BincodeCodec")
            .field("type_name", &self.type_name)
            .finish()
    }
}

impl<T> MessageCodec for BincodeCodec<T>
where
    T: Serialize + DeserializeOwned,
{
    fn encode(&self, payload: &Value) -> Result<Vec<u8>, CodecError> {
        let typed = T::deserialize(payload).map_err(|source| CodecError::Schema {
            type_name: self.type_name.to_string(),
            source,
        })?;
        bincode::serialize(&typed).map_err(|source| CodecError::Binary {
            type_name: self.type_name.to_string(),
            source,
        })
    }

    fn decode(&self, body: &[u8]) -> Result<Value, CodecError> {
        let typed: T = bincode::deserialize(body).map_err(|source| CodecError::Binary {
            type_name: self.type_name.to_string(),
            source,
        })?;
        Ok(serde_json::to_value(typed)?)
    }
}
