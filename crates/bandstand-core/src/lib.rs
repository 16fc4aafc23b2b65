//! Realtime hosting core: binds compiled performer programs to a physical
//! audio/MIDI device and drives them in blocks on its realtime callback.
//!
//! # Primary API
//!
//! - [`Venue`] / [`VenueBuilder`]: one audio device, many sessions
//! - [`Session`]: a performer instance with its own state machine
//! - [`Performer`] / [`PerformerFactory`]: the compiled-program back-end
//! - [`RenderContext`]: one device block and its sub-block iterator
//!
//! # Example
//!
//! ```ignore
//! use bandstand_core::{Requirements, Venue};
//!
//! let venue = Venue::builder()
//!     .requirements(Requirements::default())
//!     .performer_factory(factory)
//!     .build()?;
//!
//! let session = venue.create_session();
//! session.load(&mut messages, &program);
//! session.connect_session_output_endpoint(&"out".into(), &"defaultOut".into());
//! session.link(&mut messages, &settings);
//! session.start();
//! ```

// Error types
pub mod error;
pub use error::{Error, Result};

// Buffer views
pub mod buffer;
pub use buffer::{copy_intersection_and_clear_outside, ChannelArrayMut, ChannelArrayRef};

// MIDI wire types
pub mod midi;
pub use midi::{midi_input_queue, MidiEvent, MidiInputConsumer, MidiInputProducer};

// Endpoint model
pub mod endpoint;
pub use endpoint::{
    find_details, EndpointDetails, EndpointHandle, EndpointId, EndpointInfo, EndpointKind,
    FrameType,
};

// Event/value payloads
pub mod value;
pub use value::Value;

// Performer facade
pub mod performer;
pub use performer::{
    BuildSettings, CompileMessage, CompileMessageList, MessageSeverity, Performer,
    PerformerFactory, Program, ProgramData,
};

// Block rendering
pub mod render;
pub use render::{MidiOutBuffer, RenderContext, SubBlock};

// Connections and the per-block plan
pub mod ops;
pub use ops::{Connection, ConnectionKind, OperationList};

// Sessions
pub mod session;
pub use session::{EndpointServiceFn, Session, SessionState, SessionStatus, StateChangeFn};

// The device facade
pub mod venue;
pub use venue::{
    Venue, VenueBuilder, DEFAULT_IN_ID, DEFAULT_MIDI_IN_ID, DEFAULT_MIDI_OUT_ID, DEFAULT_OUT_ID,
};

// Device traits and the cpal implementation
pub mod device;
pub use device::{AudioSystem, RenderCallback, Requirements};

pub mod cpal_backend;
pub use cpal_backend::CpalAudioSystem;

// Callback metering
pub mod meter;
pub use meter::CallbackMeter;

// Lock-free primitives
pub(crate) mod lockfree;
pub use lockfree::AtomicFloat;
