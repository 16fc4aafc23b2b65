//! One performer bound to a venue: state machine, connections and the
//! realtime block processor.

use crate::endpoint::{EndpointDetails, EndpointHandle, EndpointId, EndpointInfo};
use crate::ops::{Connection, ConnectionKind, OperationList};
use crate::performer::{BuildSettings, CompileMessageList, Performer, Program};
use crate::render::RenderContext;
use crate::value::Value;
use crate::venue::VenueInner;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// The render thread never hands the performer more than this many frames at
/// once, regardless of the linked block size.
pub(crate) const MAX_FRAMES_PER_RENDER_QUANTUM: u32 = 512;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Empty,
    Loaded,
    Linked,
    Running,
}

/// Snapshot of a session's health.
#[derive(Clone, Copy, Debug)]
pub struct SessionStatus {
    pub state: SessionState,
    /// Smoothed device callback load in [0, 1].
    pub cpu: f64,
    pub sample_rate: f64,
    pub block_size: u32,
    /// Performer xruns plus device xruns (when the device reports them).
    pub xruns: u32,
}

/// Callback invoked from the render thread to service an endpoint between
/// the pre/post phases. It receives the performer's endpoint I/O surface
/// only, so it cannot re-enter the session state machine.
pub type EndpointServiceFn = Box<dyn FnMut(&mut dyn Performer, EndpointHandle) + Send>;

pub type StateChangeFn = Box<dyn FnMut(SessionState) + Send>;

struct EndpointCallback {
    handle: EndpointHandle,
    callback: EndpointServiceFn,
}

pub(crate) struct SessionCore {
    pub(crate) performer: Box<dyn Performer>,
    max_block_size: u32,
    connections: Vec<Connection>,
    ops: OperationList,
    input_callbacks: Vec<EndpointCallback>,
    output_callbacks: Vec<EndpointCallback>,
    state: SessionState,
}

impl SessionCore {
    /// Moves to `new_state`, reporting whether anything changed so the
    /// caller can fire the state-change callback once its locks are gone.
    fn set_state(&mut self, new_state: SessionState) -> Option<SessionState> {
        if self.state == new_state {
            return None;
        }
        self.state = new_state;
        Some(new_state)
    }

    /// Renders one device block on the realtime thread, splitting it into
    /// performer-sized sub-blocks.
    pub(crate) fn process_block(&mut self, frame_counter: &AtomicU64, mut context: RenderContext<'_>) {
        debug_assert!(self.max_block_size > 0);
        let max_frames = self.max_block_size.min(MAX_FRAMES_PER_RENDER_QUANTUM);
        let block_frames = u64::from(context.outputs.num_frames());
        let rendered_before = frame_counter.load(Ordering::Relaxed);
        context.total_frames_rendered = rendered_before;

        let core = &mut *self;
        context.iterate_in_blocks(max_frames, |mut sub| {
            core.performer.prepare(sub.num_frames());

            core.ops.run_pre(core.performer.as_mut(), &sub);
            for service in core.input_callbacks.iter_mut() {
                (service.callback)(core.performer.as_mut(), service.handle);
            }

            core.performer.advance();

            core.ops.run_post(core.performer.as_mut(), &mut sub);
            for service in core.output_callbacks.iter_mut() {
                (service.callback)(core.performer.as_mut(), service.handle);
            }
        });

        frame_counter.store(rendered_before + block_frames, Ordering::Release);
    }
}

pub(crate) struct SessionInner {
    pub(crate) core: Mutex<SessionCore>,
    state_callback: Mutex<Option<StateChangeFn>>,
    pub(crate) total_frames_rendered: AtomicU64,
}

/// One instance of a performer bound to a venue.
///
/// Owned by the host; dropping it unloads (and therefore stops) it.
/// Mutation methods must not be called concurrently with each other on the
/// same session, but are safe against the venue's render callback.
pub struct Session {
    inner: Arc<SessionInner>,
    venue: Arc<VenueInner>,
}

impl Session {
    pub(crate) fn new(venue: Arc<VenueInner>, performer: Box<dyn Performer>) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                core: Mutex::new(SessionCore {
                    performer,
                    max_block_size: 0,
                    connections: Vec::new(),
                    ops: OperationList::default(),
                    input_callbacks: Vec::new(),
                    output_callbacks: Vec::new(),
                    state: SessionState::Empty,
                }),
                state_callback: Mutex::new(None),
                total_frames_rendered: AtomicU64::new(0),
            }),
            venue,
        }
    }

    /// Fires the registered state-change callback on the current thread.
    /// Called only once the core lock has been released.
    fn notify_state_change(&self, change: Option<SessionState>) {
        let Some(state) = change else { return };
        let callback = self.inner.state_callback.lock().take();
        if let Some(mut callback) = callback {
            callback(state);
            let mut slot = self.inner.state_callback.lock();
            // The callback may have installed a replacement meanwhile.
            if slot.is_none() {
                *slot = Some(callback);
            }
        }
    }

    pub fn set_state_change_callback(&self, callback: StateChangeFn) {
        *self.inner.state_callback.lock() = Some(callback);
    }

    pub fn state(&self) -> SessionState {
        self.inner.core.lock().state
    }

    pub fn is_running(&self) -> bool {
        self.state() == SessionState::Running
    }

    pub fn total_frames_rendered(&self) -> u64 {
        self.inner.total_frames_rendered.load(Ordering::Acquire)
    }

    /// Loads a program, unloading anything already present first. Returns
    /// false (leaving the session empty) for an empty program or a load
    /// failure.
    pub fn load(&self, messages: &mut CompileMessageList, program: &Program) -> bool {
        if program.is_empty() {
            return false;
        }

        self.unload();

        let (loaded, change) = {
            let mut core = self.inner.core.lock();
            if core.performer.load(messages, program) {
                let change = core.set_state(SessionState::Loaded);
                (true, change)
            } else {
                (false, None)
            }
        };
        self.notify_state_change(change);
        loaded
    }

    /// Compiles the connection plan and links the performer. Legal only from
    /// `Loaded`; failure keeps the session loaded. The plan is rebuilt from
    /// the current connection table on every call, legal or not.
    pub fn link(&self, messages: &mut CompileMessageList, settings: &BuildSettings) -> bool {
        let (linked, change) = {
            let mut guard = self.inner.core.lock();
            let core = &mut *guard;
            core.max_block_size = settings.max_block_size;

            match OperationList::build(&core.connections, core.performer.as_mut(), core.max_block_size)
            {
                Ok(ops) => core.ops = ops,
                Err(err) => {
                    core.ops.clear();
                    tracing::warn!("failed to build connection plan: {err}");
                    messages.add_error(err.to_string());
                    return false;
                }
            }

            if core.state != SessionState::Loaded {
                return false;
            }

            if core.performer.link(messages, settings) {
                let change = core.set_state(SessionState::Linked);
                (true, change)
            } else {
                (false, None)
            }
        };
        self.notify_state_change(change);
        linked
    }

    /// Starts rendering. Legal only from `Linked`; the session receives its
    /// first `process_block` on the next device callback.
    pub fn start(&self) -> bool {
        {
            let core = self.inner.core.lock();
            if core.state != SessionState::Linked {
                return core.state == SessionState::Running;
            }
            debug_assert!(core.performer.is_linked());
        }

        self.venue.start_session(&self.inner);

        let change = {
            let mut core = self.inner.core.lock();
            if core.state == SessionState::Linked {
                core.set_state(SessionState::Running)
            } else {
                None
            }
        };
        self.notify_state_change(change);
        self.is_running()
    }

    /// Stops rendering and zeroes the frame counter. Idempotent; once this
    /// returns, no further `process_block` reaches the session.
    pub fn stop(&self) {
        if !self.is_running() {
            return;
        }

        self.venue.stop_session(&self.inner);

        let change = {
            let mut core = self.inner.core.lock();
            if core.state == SessionState::Running {
                core.set_state(SessionState::Linked)
            } else {
                None
            }
        };
        self.inner.total_frames_rendered.store(0, Ordering::Release);
        self.notify_state_change(change);
    }

    /// Returns the session to `Empty`, stopping first if needed. Connections
    /// and the operation plan are dropped with the program.
    pub fn unload(&self) {
        self.stop();

        let change = {
            let mut core = self.inner.core.lock();
            core.performer.unload();
            core.ops.clear();
            core.connections.clear();
            core.input_callbacks.clear();
            core.output_callbacks.clear();
            core.set_state(SessionState::Empty)
        };
        self.notify_state_change(change);
    }

    pub fn status(&self) -> SessionStatus {
        let (state, performer_xruns) = {
            let core = self.inner.core.lock();
            (core.state, core.performer.xruns())
        };
        let audio = self.venue.audio_system();
        let device_xruns = audio.xrun_count();

        SessionStatus {
            state,
            cpu: audio.cpu_load(),
            sample_rate: audio.sample_rate(),
            block_size: audio.max_block_size(),
            xruns: performer_xruns + device_xruns.max(0) as u32,
        }
    }

    pub fn input_endpoints(&self) -> Vec<EndpointDetails> {
        self.inner.core.lock().performer.input_endpoints().to_vec()
    }

    pub fn output_endpoints(&self) -> Vec<EndpointDetails> {
        self.inner.core.lock().performer.output_endpoints().to_vec()
    }

    /// Resolves the endpoint's handle, which is all that activation needs.
    pub fn set_endpoint_active(&self, endpoint: &EndpointId) {
        let _ = self.inner.core.lock().performer.endpoint_handle(endpoint);
    }

    pub fn is_endpoint_active(&self, endpoint: &EndpointId) -> bool {
        self.inner.core.lock().performer.is_endpoint_active(endpoint)
    }

    pub fn endpoint_handle(&self, endpoint: &EndpointId) -> Option<EndpointHandle> {
        self.inner.core.lock().performer.endpoint_handle(endpoint)
    }

    pub fn set_next_input_stream_frames(&self, handle: EndpointHandle, interleaved: &[f32]) {
        self.inner
            .core
            .lock()
            .performer
            .set_next_input_stream_frames(handle, interleaved);
    }

    pub fn set_sparse_input_stream_target(
        &self,
        handle: EndpointHandle,
        target: &Value,
        frames_to_reach: u32,
    ) {
        self.inner
            .core
            .lock()
            .performer
            .set_sparse_input_stream_target(handle, target, frames_to_reach);
    }

    pub fn set_input_value(&self, handle: EndpointHandle, value: &Value) {
        self.inner.core.lock().performer.set_input_value(handle, value);
    }

    pub fn add_input_event(&self, handle: EndpointHandle, event: &Value) {
        self.inner.core.lock().performer.add_input_event(handle, event);
    }

    pub fn with_output_stream_frames<R>(
        &self,
        handle: EndpointHandle,
        reader: impl FnOnce(&[f32]) -> R,
    ) -> R {
        reader(self.inner.core.lock().performer.output_stream_frames(handle))
    }

    pub fn iterate_output_events(
        &self,
        handle: EndpointHandle,
        handler: &mut dyn FnMut(u32, &Value),
    ) {
        self.inner
            .core
            .lock()
            .performer
            .iterate_output_events(handle, handler);
    }

    /// Connects a performer input endpoint to one of the venue's sources.
    /// Returns false (adding nothing) when either endpoint is unknown or the
    /// shapes don't match.
    pub fn connect_session_input_endpoint(
        &self,
        input: &EndpointId,
        venue_source: &EndpointId,
    ) -> bool {
        match self.venue.find_source_endpoint(venue_source) {
            Some(info) => self.connect_input_endpoint(&info, input),
            None => false,
        }
    }

    /// Connects a performer output endpoint to one of the venue's sinks.
    pub fn connect_session_output_endpoint(
        &self,
        output: &EndpointId,
        venue_sink: &EndpointId,
    ) -> bool {
        match self.venue.find_sink_endpoint(venue_sink) {
            Some(info) => self.connect_output_endpoint(&info, output),
            None => false,
        }
    }

    fn connect_input_endpoint(&self, external: &EndpointInfo, input: &EndpointId) -> bool {
        let mut guard = self.inner.core.lock();
        let core = &mut *guard;

        for details in core.performer.input_endpoints() {
            if &details.id != input {
                continue;
            }
            if details.is_stream() && !external.is_midi {
                core.connections.push(Connection {
                    kind: ConnectionKind::AudioIn {
                        channel: external.audio_channel_index,
                    },
                    endpoint: details.id.clone(),
                });
                return true;
            }
            if details.is_event() && external.is_midi {
                core.connections.push(Connection {
                    kind: ConnectionKind::MidiIn,
                    endpoint: details.id.clone(),
                });
                return true;
            }
        }

        false
    }

    fn connect_output_endpoint(&self, external: &EndpointInfo, output: &EndpointId) -> bool {
        let mut guard = self.inner.core.lock();
        let core = &mut *guard;

        for details in core.performer.output_endpoints() {
            if &details.id != output {
                continue;
            }
            if details.is_stream() && !external.is_midi {
                core.connections.push(Connection {
                    kind: ConnectionKind::AudioOut {
                        channel: external.audio_channel_index,
                    },
                    endpoint: details.id.clone(),
                });
                return true;
            }
        }

        false
    }

    /// Registers a callback serviced between the pre-render phase and
    /// `advance` on every sub-block. False when the endpoint is unknown.
    pub fn set_input_endpoint_service_callback(
        &self,
        endpoint: &EndpointId,
        callback: EndpointServiceFn,
    ) -> bool {
        let mut guard = self.inner.core.lock();
        let core = &mut *guard;
        if !core
            .performer
            .input_endpoints()
            .iter()
            .any(|d| &d.id == endpoint)
        {
            return false;
        }
        match core.performer.endpoint_handle(endpoint) {
            Some(handle) => {
                core.input_callbacks.push(EndpointCallback { handle, callback });
                true
            }
            None => false,
        }
    }

    /// Registers a callback serviced after the post-render phase on every
    /// sub-block.
    pub fn set_output_endpoint_service_callback(
        &self,
        endpoint: &EndpointId,
        callback: EndpointServiceFn,
    ) -> bool {
        let mut guard = self.inner.core.lock();
        let core = &mut *guard;
        if !core
            .performer
            .output_endpoints()
            .iter()
            .any(|d| &d.id == endpoint)
        {
            return false;
        }
        match core.performer.endpoint_handle(endpoint) {
            Some(handle) => {
                core.output_callbacks.push(EndpointCallback { handle, callback });
                true
            }
            None => false,
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.unload();
    }
}
