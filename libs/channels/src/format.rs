use courier_core::{Format, Metadata};
use courier_fabric::Message;

/// Pick the wire format for a channel of `M`
///
/// An explicit `Metadata::Format` wins. Otherwise byte-compatible message
/// types go over the wire raw and everything else as JSON. The result
/// depends only on `M` and `metadata`.
pub fn resolve_format<M: Message>(metadata: &[Metadata]) -> Format {
    Metadata::find_format(metadata).unwrap_or(if M::BYTES_COMPATIBLE {
        Format::Bytes
    } else {
        Format::Json
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_fabric::BytesMessage;
    use serde_json::Value;

    #[test]
    fn bytes_messages_default_to_raw_bytes() {
        assert_eq!(resolve_format::<BytesMessage>(&[]), Format::Bytes);
        assert_eq!(resolve_format::<Vec<u8>>(&[]), Format::Bytes);
    }

    #[test]
    fn structured_messages_default_to_json() {
        assert_eq!(resolve_format::<Value>(&[]), Format::Json);
        assert_eq!(resolve_format::<String>(&[Metadata::tag("k", "v")]), Format::Json);
    }

    #[test]
    fn explicit_format_overrides_default() {
        let metadata = [Metadata::Format(Format::Bincode)];
        assert_eq!(resolve_format::<BytesMessage>(&metadata), Format::Bincode);
        assert_eq!(resolve_format::<Value>(&metadata), Format::Bincode);
    }
}
