//! The performer façade: the executable form of a compiled program.
//!
//! The compiler back-end that produces [`Program`]s and the engine that
//! executes them live outside this crate; sessions drive whatever implements
//! [`Performer`] through the three-phase block protocol (prepare, mutate
//! endpoints, advance, read back).

use crate::endpoint::{EndpointDetails, EndpointHandle, EndpointId};
use crate::value::Value;
use std::sync::Arc;

/// Opaque compiled artifact with typed input and output endpoints.
/// Immutable once built; cheap to clone.
#[derive(Clone, Debug, Default)]
pub struct Program {
    inner: Option<Arc<ProgramData>>,
}

/// Payload behind a [`Program`] handle, produced by the compiler back-end.
#[derive(Debug)]
pub struct ProgramData {
    pub name: String,
    pub inputs: Vec<EndpointDetails>,
    pub outputs: Vec<EndpointDetails>,
}

impl Program {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new(data: ProgramData) -> Self {
        Self {
            inner: Some(Arc::new(data)),
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.is_none()
    }

    pub fn data(&self) -> Option<&ProgramData> {
        self.inner.as_deref()
    }

    pub fn name(&self) -> Option<&str> {
        self.inner.as_deref().map(|data| data.name.as_str())
    }
}

/// Settings handed to the performer when linking.
#[derive(Clone, Copy, Debug)]
pub struct BuildSettings {
    pub sample_rate: f64,
    pub max_block_size: u32,
}

impl Default for BuildSettings {
    fn default() -> Self {
        Self {
            sample_rate: 44_100.0,
            max_block_size: 1024,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageSeverity {
    Error,
    Warning,
    Note,
}

/// One diagnostic produced while loading, compiling or linking.
#[derive(Clone, Debug)]
pub struct CompileMessage {
    pub severity: MessageSeverity,
    pub description: String,
    pub full_message: String,
}

impl CompileMessage {
    pub fn error(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            severity: MessageSeverity::Error,
            description: text.clone(),
            full_message: text,
        }
    }

    pub fn warning(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            severity: MessageSeverity::Warning,
            description: text.clone(),
            full_message: text,
        }
    }

    #[inline]
    pub fn is_error(&self) -> bool {
        self.severity == MessageSeverity::Error
    }
}

/// Accumulates diagnostics across a load/link attempt.
#[derive(Clone, Debug, Default)]
pub struct CompileMessageList {
    messages: Vec<CompileMessage>,
}

impl CompileMessageList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: CompileMessage) {
        self.messages.push(message);
    }

    pub fn add_error(&mut self, text: impl Into<String>) {
        self.messages.push(CompileMessage::error(text));
    }

    pub fn has_errors(&self) -> bool {
        self.messages.iter().any(CompileMessage::is_error)
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn messages(&self) -> &[CompileMessage] {
        &self.messages
    }

    pub fn extend(&mut self, other: CompileMessageList) {
        self.messages.extend(other.messages);
    }
}

/// Executable form of a compiled program.
///
/// Per-block protocol: `prepare(n)`, then per-endpoint mutations, then
/// `advance()`, then post-advance readbacks. Allocation is expected only
/// during load and link.
pub trait Performer: Send {
    fn load(&mut self, messages: &mut CompileMessageList, program: &Program) -> bool;
    fn link(&mut self, messages: &mut CompileMessageList, settings: &BuildSettings) -> bool;
    fn is_linked(&self) -> bool;
    fn unload(&mut self);

    fn input_endpoints(&self) -> &[EndpointDetails];
    fn output_endpoints(&self) -> &[EndpointDetails];

    /// Resolves an endpoint id to a handle valid while this performer stays
    /// loaded.
    fn endpoint_handle(&mut self, id: &EndpointId) -> Option<EndpointHandle>;
    fn is_endpoint_active(&self, id: &EndpointId) -> bool;

    /// Reserves internal state for the coming block.
    fn prepare(&mut self, num_frames: u32);

    /// Hands the next block of interleaved input frames to a stream endpoint.
    fn set_next_input_stream_frames(&mut self, handle: EndpointHandle, interleaved: &[f32]);
    fn set_sparse_input_stream_target(
        &mut self,
        handle: EndpointHandle,
        target: &Value,
        frames_to_reach: u32,
    );
    fn set_input_value(&mut self, handle: EndpointHandle, value: &Value);
    fn add_input_event(&mut self, handle: EndpointHandle, event: &Value);

    /// Runs the program for the prepared frame count.
    fn advance(&mut self);

    /// Interleaved output frames produced by the last `advance` on a stream
    /// endpoint.
    fn output_stream_frames(&mut self, handle: EndpointHandle) -> &[f32];
    fn iterate_output_events(
        &mut self,
        handle: EndpointHandle,
        handler: &mut dyn FnMut(u32, &Value),
    );

    /// Performer-side missed deadlines.
    fn xruns(&self) -> u32;
}

pub trait PerformerFactory: Send + Sync {
    fn create_performer(&self) -> Box<dyn Performer>;
}
