//! # Bandstand - Realtime Audio Host
//!
//! Binds compiled signal-processing programs ("performers") to a physical
//! audio/MIDI device and drives them in blocks on its realtime callback.
//!
//! ## Architecture
//!
//! Bandstand is an umbrella crate that coordinates:
//! - **bandstand-core** - The hosting core (Venue, Session, render plumbing,
//!   device endpoints, cpal device backend)
//! - **bandstand-patch** - The patch facade (manifest refresh, descriptions,
//!   player compilation)
//!
//! ## Quick Start
//!
//! ```ignore
//! use bandstand::prelude::*;
//!
//! // Open the default device and bind it to a performer back-end.
//! let venue = Venue::builder()
//!     .requirements(Requirements::default())
//!     .performer_factory(factory)
//!     .build()?;
//!
//! // Compile a patch into a program.
//! let mut patch = PatchInstance::new(factory, compiler, NativeFile::new("drum.patch"));
//! let player = patch.compile_new_player(&PlayerConfig::default(), CompileHooks::default());
//!
//! // Run it.
//! let session = venue.create_session();
//! let mut messages = CompileMessageList::new();
//! session.load(&mut messages, player.program());
//! session.connect_session_output_endpoint(&"out".into(), &"defaultOut".into());
//! session.link(&mut messages, &BuildSettings::default());
//! session.start();
//! ```

/// Re-export of bandstand-core for direct access
pub use bandstand_core as core;

/// Re-export of bandstand-patch for direct access
pub use bandstand_patch as patch;

// Hosting core
pub use bandstand_core::{
    copy_intersection_and_clear_outside,
    find_details,
    midi_input_queue,
    AtomicFloat,
    AudioSystem,
    BuildSettings,
    CallbackMeter,
    ChannelArrayMut,
    ChannelArrayRef,
    CompileMessage,
    CompileMessageList,
    Connection,
    ConnectionKind,
    CpalAudioSystem,
    EndpointDetails,
    EndpointHandle,
    EndpointId,
    EndpointInfo,
    EndpointKind,
    EndpointServiceFn,
    Error,
    FrameType,
    MessageSeverity,
    MidiEvent,
    MidiInputConsumer,
    MidiInputProducer,
    MidiOutBuffer,
    OperationList,
    Performer,
    PerformerFactory,
    Program,
    ProgramData,
    RenderCallback,
    RenderContext,
    Requirements,
    Result,
    Session,
    SessionState,
    SessionStatus,
    StateChangeFn,
    SubBlock,
    Value,
    Venue,
    VenueBuilder,
    DEFAULT_IN_ID,
    DEFAULT_MIDI_IN_ID,
    DEFAULT_MIDI_OUT_ID,
    DEFAULT_OUT_ID,
};

// Patch facade
pub use bandstand_patch::{
    parse_manifest, source_set_key, CompileHooks, CompilerCache, ConsoleMessageHandler,
    Description, ExternalDataProvider, FileList, Manifest, NativeFile, PatchError, PatchInstance,
    PatchPlayer, PlayerConfig, ProgramCompiler, SourceFile, SourceFilePreprocessor, VirtualFile,
    MANIFEST_SUFFIX,
};

/// Convenience prelude for common imports
pub mod prelude {
    pub use crate::core::{
        BuildSettings, CompileMessageList, EndpointDetails, EndpointId, FrameType, MidiEvent,
        Performer, PerformerFactory, Program, ProgramData, Requirements, Session, SessionState,
        Value, Venue,
    };
    pub use crate::patch::{
        CompileHooks, NativeFile, PatchInstance, PatchPlayer, PlayerConfig, ProgramCompiler,
    };
}
