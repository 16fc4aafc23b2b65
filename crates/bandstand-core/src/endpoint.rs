//! Endpoint identity and type descriptions.

use std::fmt;

/// Stable string identity of an endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct EndpointId(String);

impl EndpointId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EndpointId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EndpointKind {
    /// Per-sample frames.
    Stream,
    /// Timestamped discrete values.
    Event,
    /// A held control value.
    Value,
}

/// Shape of one frame (or one event payload) on an endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameType {
    Float,
    FloatVector(u32),
    /// Packed short MIDI message object.
    Midi,
}

impl FrameType {
    #[inline]
    pub fn num_channels(&self) -> u32 {
        match *self {
            FrameType::Float => 1,
            FrameType::FloatVector(size) => size,
            FrameType::Midi => 0,
        }
    }

    #[inline]
    pub fn is_float(&self) -> bool {
        matches!(*self, FrameType::Float | FrameType::FloatVector(_))
    }
}

#[derive(Clone, Debug)]
pub struct EndpointDetails {
    pub id: EndpointId,
    pub name: String,
    pub kind: EndpointKind,
    pub frame_type: FrameType,
}

impl EndpointDetails {
    pub fn stream(id: impl Into<String>, frame_type: FrameType) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id: EndpointId::new(id),
            kind: EndpointKind::Stream,
            frame_type,
        }
    }

    pub fn event(id: impl Into<String>, frame_type: FrameType) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id: EndpointId::new(id),
            kind: EndpointKind::Event,
            frame_type,
        }
    }

    pub fn value(id: impl Into<String>, frame_type: FrameType) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id: EndpointId::new(id),
            kind: EndpointKind::Value,
            frame_type,
        }
    }

    #[inline]
    pub fn is_stream(&self) -> bool {
        self.kind == EndpointKind::Stream
    }

    #[inline]
    pub fn is_event(&self) -> bool {
        self.kind == EndpointKind::Event
    }

    /// An event endpoint whose payload is a MIDI message object.
    #[inline]
    pub fn is_midi_event(&self) -> bool {
        self.is_event() && self.frame_type == FrameType::Midi
    }
}

/// Finds an endpoint description by id.
pub fn find_details<'a>(
    list: &'a [EndpointDetails],
    id: &EndpointId,
) -> Option<&'a EndpointDetails> {
    list.iter().find(|details| &details.id == id)
}

/// Opaque token obtained by resolving an [`EndpointId`] against a loaded
/// performer. Valid only while that performer stays loaded.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EndpointHandle(u32);

impl EndpointHandle {
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u32 {
        self.0
    }
}

/// A device-side endpoint: its description plus where it sits on the device.
#[derive(Clone, Debug)]
pub struct EndpointInfo {
    pub details: EndpointDetails,
    /// First device audio channel this endpoint maps to (streams only).
    pub audio_channel_index: u32,
    pub is_midi: bool,
}
