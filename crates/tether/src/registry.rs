//! The embedder's message boundary: payload codec and type registry.
//!
//! The endpoint never interprets payload bytes. Embedders implement
//! [`Message`] for their payload types and register each one under a numeric
//! type id; the registry maps ids to constructors on the receive path and
//! back to ids on the send path.

use std::any::{Any, TypeId};
use std::collections::HashMap;

use thiserror::Error;

/// Payload decode failure reported by a message codec.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct DecodeError(String);

impl DecodeError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

/// A typed protocol message.
pub trait Message: Send {
    /// Encoded payload length in bytes. Goes out in the frame's size field.
    fn encoded_len(&self) -> usize;

    /// Serializes the payload.
    fn serialize(&self) -> Vec<u8>;

    /// Replaces `self` with the message decoded from `payload`.
    fn parse(&mut self, payload: &[u8]) -> Result<(), DecodeError>;

    /// Escape hatch for consumers recovering the concrete message type.
    fn as_any(&self) -> &dyn Any;
}

type Constructor = fn() -> Box<dyn Message>;

fn construct<M: Message + Default + 'static>() -> Box<dyn Message> {
    Box::<M>::default()
}

/// Maps numeric type ids to message constructors and back.
#[derive(Default)]
pub struct MessageTypeTable {
    constructors: HashMap<u32, Constructor>,
    ids: HashMap<TypeId, u32>,
}

impl MessageTypeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `M` under `id`. Re-registering the same pair is a no-op;
    /// registering a different type under an existing id replaces it.
    pub fn register<M: Message + Default + 'static>(&mut self, id: u32) {
        self.constructors.insert(id, construct::<M>);
        self.ids.insert(TypeId::of::<M>(), id);
    }

    /// Returns true if `id` has a registered constructor.
    pub fn has_type(&self, id: u32) -> bool {
        self.constructors.contains_key(&id)
    }

    /// Constructs an empty message for `id`.
    pub fn create(&self, id: u32) -> Option<Box<dyn Message>> {
        self.constructors.get(&id).map(|construct| construct())
    }

    /// Looks up the type id registered for `message`'s concrete type.
    pub fn id_of(&self, message: &dyn Message) -> Option<u32> {
        self.ids.get(&message.as_any().type_id()).copied()
    }
}

/// Message types shared by the crate's tests.
#[cfg(test)]
pub(crate) mod tests_support {
    use super::*;

    /// A message whose payload is its raw bytes, for wire-level tests.
    #[derive(Debug, Clone, Default, PartialEq, Eq)]
    pub struct Blob {
        pub data: Vec<u8>,
    }

    impl From<Vec<u8>> for Blob {
        fn from(data: Vec<u8>) -> Self {
            Self { data }
        }
    }

    impl Message for Blob {
        fn encoded_len(&self) -> usize {
            self.data.len()
        }

        fn serialize(&self) -> Vec<u8> {
            self.data.clone()
        }

        fn parse(&mut self, payload: &[u8]) -> Result<(), DecodeError> {
            self.data = payload.to_vec();
            Ok(())
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    /// A structured message carried as bincode, for codec-boundary tests.
    #[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
    pub struct Telemetry {
        pub seq: u32,
        pub label: String,
    }

    impl Message for Telemetry {
        fn encoded_len(&self) -> usize {
            bincode::serialized_size(self).map(|n| n as usize).unwrap_or(0)
        }

        fn serialize(&self) -> Vec<u8> {
            bincode::serialize(self).expect("telemetry serializes")
        }

        fn parse(&mut self, payload: &[u8]) -> Result<(), DecodeError> {
            *self = bincode::deserialize(payload).map_err(|e| DecodeError::new(e.to_string()))?;
            Ok(())
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }
}

#[cfg(test)]
mod registry_tests {
    use super::tests_support::{Blob, Telemetry};
    use super::*;

    #[test]
    fn create_and_id_of_roundtrip() {
        let mut table = MessageTypeTable::new();
        table.register::<Blob>(5);
        table.register::<Telemetry>(2);

        assert!(table.has_type(5));
        assert!(table.has_type(2));
        assert!(!table.has_type(9999));

        let msg = table.create(5).expect("constructor");
        assert_eq!(table.id_of(&*msg), Some(5));

        let telemetry = Telemetry {
            seq: 1,
            label: "t".into(),
        };
        assert_eq!(table.id_of(&telemetry), Some(2));
    }

    #[test]
    fn unregistered_type_has_no_id() {
        let table = MessageTypeTable::new();
        let blob = Blob::default();
        assert_eq!(table.id_of(&blob), None);
        assert!(table.create(5).is_none());
    }

    #[test]
    fn re_register_is_idempotent() {
        let mut table = MessageTypeTable::new();
        table.register::<Blob>(5);
        table.register::<Blob>(5);

        assert!(table.has_type(5));
        assert_eq!(table.id_of(&Blob::default()), Some(5));
    }

    #[test]
    fn codec_roundtrip_through_dyn_message() {
        let original = Telemetry {
            seq: 7,
            label: "roundtrip".into(),
        };
        let payload = original.serialize();
        assert_eq!(payload.len(), original.encoded_len());

        let mut table = MessageTypeTable::new();
        table.register::<Telemetry>(2);

        let mut decoded = table.create(2).expect("constructor");
        decoded.parse(&payload).expect("parse");

        let telemetry = decoded
            .as_any()
            .downcast_ref::<Telemetry>()
            .expect("telemetry");
        assert_eq!(*telemetry, original);
    }

    #[test]
    fn decode_error_reports_reason() {
        let mut telemetry = Telemetry::default();
        let err = telemetry.parse(&[0x00]).expect_err("truncated payload");
        assert!(!err.to_string().is_empty());
    }
}
