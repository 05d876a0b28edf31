use std::fmt;
use std::marker::PhantomData;

use courier_core::Format;

use crate::codec::{BincodeCodec, BytesCodec, Codec, JsonCodec};
use crate::error::{Error, Result};
use crate::message::Message;

/// Translates between wire bytes and typed messages for one channel
pub struct MessagePipeline<M> {
    format: Format,
    _message: PhantomData<fn() -> M>,
}

impl<M: Message> MessagePipeline<M> {
    /// Fails if `format` cannot carry `M`, so a bad pairing is caught before
    /// any transport is opened.
    pub fn new(format: Format) -> Result<Self> {
        if format == Format::Bytes && !M::BYTES_COMPATIBLE {
            return Err(Error::Codec(format!(
                "{} cannot be carried as raw bytes",
                M::type_name()
            )));
        }
        Ok(Self {
            format,
            _message: PhantomData,
        })
    }

    pub fn format(&self) -> Format {
        self.format
    }

    pub fn encode(&self, message: &M) -> Result<Vec<u8>> {
        match self.format {
            Format::Bytes => match message.to_raw() {
                Some(raw) => Ok(raw),
                None => BytesCodec.encode(message),
            },
            Format::Json => JsonCodec.encode(message),
            Format::Bincode => BincodeCodec.encode(message),
        }
    }

    pub fn decode(&self, bytes: Vec<u8>) -> Result<M> {
        match self.format {
            Format::Bytes => match M::from_raw(bytes) {
                Ok(message) => Ok(message),
                Err(bytes) => BytesCodec.decode(&bytes),
            },
            Format::Json => JsonCodec.decode(&bytes),
            Format::Bincode => BincodeCodec.decode(&bytes),
        }
    }
}

impl<M> fmt::Debug for MessagePipeline<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessagePipeline")
            .field("format", &self.format)
            .field("message", &std::any::type_name::<M>())
            .finish()
    }
}
