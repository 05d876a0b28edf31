use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// A type that can travel over a channel
///
/// Every message is serde-serializable so it can use the structured formats.
/// Types that are plain byte buffers additionally set `BYTES_COMPATIBLE` and
/// implement the raw conversions, which lets them travel untouched under
/// [`Format::Bytes`](courier_core::Format::Bytes).
pub trait Message: Serialize + DeserializeOwned + Send + Sync + 'static {
    const BYTES_COMPATIBLE: bool = false;

    fn to_raw(&self) -> Option<Vec<u8>> {
        None
    }

    /// Rebuild from raw bytes, handing them back if this type has no raw form
    fn from_raw(bytes: Vec<u8>) -> Result<Self, Vec<u8>> {
        Err(bytes)
    }

    fn type_name() -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Opaque byte payload
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BytesMessage(pub Vec<u8>);

impl BytesMessage {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.0
    }
}

impl From<Vec<u8>> for BytesMessage {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl Message for BytesMessage {
    const BYTES_COMPATIBLE: bool = true;

    fn to_raw(&self) -> Option<Vec<u8>> {
        Some(self.0.clone())
    }

    fn from_raw(bytes: Vec<u8>) -> Result<Self, Vec<u8>> {
        Ok(Self(bytes))
    }
}

impl Message for Vec<u8> {
    const BYTES_COMPATIBLE: bool = true;

    fn to_raw(&self) -> Option<Vec<u8>> {
        Some(self.clone())
    }

    fn from_raw(bytes: Vec<u8>) -> Result<Self, Vec<u8>> {
        Ok(bytes)
    }
}

impl Message for String {}

impl Message for serde_json::Value {}
