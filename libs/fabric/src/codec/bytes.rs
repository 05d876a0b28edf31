use serde::{Deserialize, Serialize};

use crate::codec::Codec;
use crate::error::{Error, Result};

/// Pass-through codec for payloads that are already bytes
///
/// Only accepts values that serialize as a sequence of bytes; anything else
/// is a codec error. Messages that implement
/// [`Message::to_raw`](crate::message::Message::to_raw) skip serde entirely.
#[derive(Debug, Clone, Copy, Default)]
pub struct BytesCodec;

impl Codec for BytesCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        match serde_json::to_value(value).map_err(|e| Error::Codec(e.to_string()))? {
            serde_json::Value::Array(items) => items
                .into_iter()
                .map(|item| {
                    item.as_u64()
                        .and_then(|b| u8::try_from(b).ok())
                        .ok_or_else(|| Error::Codec("bytes codec: element is not a byte".into()))
                })
                .collect(),
            _ => Err(Error::Codec("bytes codec: value is not a byte sequence".into())),
        }
    }

    fn decode<T: for<'de> Deserialize<'de>>(&self, bytes: &[u8]) -> Result<T> {
        serde_json::from_value(serde_json::Value::from(bytes.to_vec()))
            .map_err(|e| Error::Codec(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_vectors_pass_through_unchanged() {
        let encoded = BytesCodec.encode(&vec![1u8, 2, 3]).unwrap();
        assert_eq!(encoded, vec![1, 2, 3]);
        let decoded: Vec<u8> = BytesCodec.decode(&encoded).unwrap();
        assert_eq!(decoded, vec![1, 2, 3]);
    }

    #[test]
    fn structured_values_are_rejected() {
        assert!(matches!(
            BytesCodec.encode(&"text"),
            Err(Error::Codec(_))
        ));
        assert!(matches!(
            BytesCodec.encode(&vec![300u32]),
            Err(Error::Codec(_))
        ));
    }
}
