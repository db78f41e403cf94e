//! Channel catalog
//!
//! Static table from message type name to wire encoding. The relay consults
//! it once per delivery to pick between a binary frame (schema codec) and a
//! JSON text envelope; clients consult the same table to decode binary frames.
//!
//! Adding a message type means adding one entry here.

pub mod codec;
pub mod messages;
pub mod need;

use std::collections::HashMap;
use std::sync::Arc;

pub use codec::{BincodeCodec, MessageCodec};
pub use need::NeedKind;

use crate::utils::error::CatalogError;
use messages::{CameraFrameMessage, DepthCameraFrameMessage};

/// How a message type travels over the wire.
#[derive(Debug, Clone)]
pub enum Framing {
    /// Fixed-layout binary body produced by the codec.
    Binary(Arc<dyn MessageCodec>),
    /// `{type, topic, data}` JSON envelope.
    Text,
}

#[derive(Debug, Clone)]
pub struct ChannelSpec {
    pub type_name: String,
    pub framing: Framing,
}

impl ChannelSpec {
    pub fn is_binary_framed(&self) -> bool {
        matches!(self.framing, Framing::Binary(_))
    }

    pub fn codec(&self) -> Option<&Arc<dyn MessageCodec>> {
        match &self.framing {
            Framing::Binary(codec) => Some(codec),
            Framing::Text => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ChannelCatalog {
    entries: HashMap<String, ChannelSpec>,
}

impl ChannelCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// The table for every type a built-in need kind consumes.
    ///
    /// Camera and depth camera frames are payload-heavy and high-rate, so they
    /// are binary-framed; everything else goes out as JSON.
    pub fn builtin() -> Self {
        let mut catalog = Self::new();
        catalog.register_binary::<CameraFrameMessage>(messages::CAMERA_FRAME_MESSAGE);
        catalog.register_binary::<DepthCameraFrameMessage>(messages::DEPTH_CAMERA_FRAME_MESSAGE);
        for kind in NeedKind::ALL {
            if !catalog.contains(kind.message_type()) {
                catalog.register_text(kind.message_type());
            }
        }
        catalog
    }

    pub fn register(&mut self, type_name: &str, framing: Framing) {
        self.entries.insert(
            type_name.to_string(),
            ChannelSpec {
                type_name: type_name.to_string(),
                framing,
            },
        );
    }

    pub fn register_binary<T>(&mut self, type_name: &'static str)
    where
        T: serde::Serialize + serde::de::DeserializeOwned + 'static,
    {
        self.register(
            type_name,
            Framing::Binary(Arc::new(BincodeCodec::<T>::new(type_name))),
        );
    }

    pub fn register_text(&mut self, type_name: &str) {
        self.register(type_name, Framing::Text);
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.entries.contains_key(type_name)
    }

    pub fn classify(&self, type_name: &str) -> Result<&ChannelSpec, CatalogError> {
        self.entries
            .get(type_name)
            .ok_or_else(|| CatalogError::UnknownType {
                type_name: type_name.to_string(),
            })
    }
}

#[cfg(test)]
mod tests;
