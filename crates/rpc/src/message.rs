use serde::{Deserialize, Serialize};

/// Request envelope. `payload` is the MessagePack-encoded argument struct,
/// empty for argument-less methods.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Fully qualified method, e.g. `Collector.QueryCurrent`.
    pub method: String,
    /// Echoed back in the matching [`Response`].
    pub seq: u64,
    #[serde(with = "serde_bytes")]
    pub payload: Vec<u8>,
}

/// Response envelope. `error` is set when the call failed; `payload` is then
/// empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub seq: u64,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(with = "serde_bytes")]
    pub payload: Vec<u8>,
}

impl Request {
    /// Build a request, encoding `args` with named fields.
    pub fn new<T: Serialize>(
        method: impl Into<String>,
        seq: u64,
        args: &T,
    ) -> Result<Self, rmp_serde::encode::Error> {
        Ok(Self { method: method.into(), seq, payload: rmp_serde::to_vec_named(args)? })
    }

    /// A request without arguments.
    pub fn empty(method: impl Into<String>, seq: u64) -> Self {
        Self { method: method.into(), seq, payload: Vec::new() }
    }

    pub fn decode<T: for<'de> Deserialize<'de>>(&self) -> Result<T, rmp_serde::decode::Error> {
        rmp_serde::from_slice(&self.payload)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, rmp_serde::encode::Error> {
        rmp_serde::to_vec_named(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, rmp_serde::decode::Error> {
        rmp_serde::from_slice(bytes)
    }
}

impl Response {
    pub fn ok<T: Serialize>(seq: u64, reply: &T) -> Result<Self, rmp_serde::encode::Error> {
        Ok(Self { seq, error: None, payload: rmp_serde::to_vec_named(reply)? })
    }

    pub fn empty(seq: u64) -> Self {
        Self { seq, error: None, payload: Vec::new() }
    }

    pub fn error(seq: u64, message: impl Into<String>) -> Self {
        Self { seq, error: Some(message.into()), payload: Vec::new() }
    }

    pub fn decode<T: for<'de> Deserialize<'de>>(&self) -> Result<T, rmp_serde::decode::Error> {
        rmp_serde::from_slice(&self.payload)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, rmp_serde::encode::Error> {
        rmp_serde::to_vec_named(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, rmp_serde::decode::Error> {
        rmp_serde::from_slice(bytes)
    }
}

/// Helper module for serde to handle `Vec<u8>` as raw bytes in MessagePack.
mod serde_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_bytes(bytes)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let bytes: &[u8] = Deserialize::deserialize(d)?;
        Ok(bytes.to_vec())
    }
}
