//! The venue: a shared façade over one audio/MIDI device, multiplexing any
//! number of sessions onto its realtime callback.

use crate::buffer::{ChannelArrayMut, ChannelArrayRef};
use crate::cpal_backend::CpalAudioSystem;
use crate::device::{AudioSystem, RenderCallback, Requirements};
use crate::endpoint::{EndpointDetails, EndpointId, EndpointInfo, FrameType};
use crate::error::{Error, Result};
use crate::midi::MidiEvent;
use crate::performer::PerformerFactory;
use crate::render::{MidiOutBuffer, RenderContext};
use crate::session::{Session, SessionInner};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};

/// Stable ids of the device endpoint catalog.
pub const DEFAULT_IN_ID: &str = "defaultIn";
pub const DEFAULT_OUT_ID: &str = "defaultOut";
pub const DEFAULT_MIDI_IN_ID: &str = "defaultMidiIn";
pub const DEFAULT_MIDI_OUT_ID: &str = "defaultMidiOut";

const MIDI_OUT_CAPACITY: usize = 1024;

struct ActiveSet {
    sessions: Vec<Arc<SessionInner>>,
    midi_out: MidiOutBuffer,
}

pub(crate) struct VenueInner {
    self_ref: Weak<VenueInner>,
    audio_system: Box<dyn AudioSystem>,
    performer_factory: Box<dyn PerformerFactory>,
    source_endpoints: Vec<EndpointInfo>,
    sink_endpoints: Vec<EndpointInfo>,
    active: Mutex<ActiveSet>,
}

impl VenueInner {
    /// Adds a session to the active set and arms the device callback. The
    /// session is picked up by the next callback, not one already in flight.
    pub(crate) fn start_session(&self, session: &Arc<SessionInner>) -> bool {
        let mut active = self.active.lock();
        if !active.sessions.iter().any(|s| Arc::ptr_eq(s, session)) {
            active.sessions.push(session.clone());
        }

        if let Some(venue) = self.self_ref.upgrade() {
            let callback: Arc<dyn RenderCallback> = venue;
            self.audio_system.set_callback(Some(callback));
        }
        true
    }

    /// Removes a session; when the set empties, the device callback is
    /// detached. Blocks against a render in flight, so once this returns the
    /// session sees no further `process_block`.
    pub(crate) fn stop_session(&self, session: &Arc<SessionInner>) -> bool {
        let mut active = self.active.lock();
        active.sessions.retain(|s| !Arc::ptr_eq(s, session));

        if active.sessions.is_empty() {
            self.audio_system.set_callback(None);
        }
        true
    }

    pub(crate) fn audio_system(&self) -> &dyn AudioSystem {
        self.audio_system.as_ref()
    }

    pub(crate) fn find_source_endpoint(&self, id: &EndpointId) -> Option<EndpointInfo> {
        find_endpoint(&self.source_endpoints, id)
    }

    pub(crate) fn find_sink_endpoint(&self, id: &EndpointId) -> Option<EndpointInfo> {
        find_endpoint(&self.sink_endpoints, id)
    }
}

impl RenderCallback for VenueInner {
    fn render_starting(&self, _sample_rate: f64, _max_block_size: u32) {}

    fn render_stopped(&self) {}

    fn render(
        &self,
        inputs: ChannelArrayRef<'_>,
        mut outputs: ChannelArrayMut<'_>,
        midi_in: &[MidiEvent],
    ) {
        let mut guard = self.active.lock();
        let active = &mut *guard;
        active.midi_out.clear();

        for session in &active.sessions {
            let mut core = session.core.lock();
            core.process_block(
                &session.total_frames_rendered,
                RenderContext {
                    total_frames_rendered: 0,
                    inputs,
                    outputs: outputs.reborrow(),
                    midi_in,
                    midi_out: &mut active.midi_out,
                    frame_offset: 0,
                },
            );
        }
    }
}

fn find_endpoint(endpoints: &[EndpointInfo], id: &EndpointId) -> Option<EndpointInfo> {
    endpoints.iter().find(|e| &e.details.id == id).cloned()
}

fn device_endpoints(num_inputs: u32, num_outputs: u32) -> (Vec<EndpointInfo>, Vec<EndpointInfo>) {
    let mut sources = Vec::new();
    let mut sinks = Vec::new();

    if num_inputs > 0 {
        sources.push(EndpointInfo {
            details: EndpointDetails::stream(DEFAULT_IN_ID, FrameType::FloatVector(num_inputs)),
            audio_channel_index: 0,
            is_midi: false,
        });
    }

    if num_outputs > 0 {
        sinks.push(EndpointInfo {
            details: EndpointDetails::stream(DEFAULT_OUT_ID, FrameType::FloatVector(num_outputs)),
            audio_channel_index: 0,
            is_midi: false,
        });
    }

    sources.push(EndpointInfo {
        details: EndpointDetails::event(DEFAULT_MIDI_IN_ID, FrameType::Midi),
        audio_channel_index: 0,
        is_midi: true,
    });

    // Declared for API stability; no connection routes MIDI output yet.
    sinks.push(EndpointInfo {
        details: EndpointDetails::event(DEFAULT_MIDI_OUT_ID, FrameType::Midi),
        audio_channel_index: 0,
        is_midi: true,
    });

    (sources, sinks)
}

/// Owns one audio device and the performer factory, and hands out sessions
/// bound to them.
pub struct Venue {
    inner: Arc<VenueInner>,
}

impl Venue {
    pub fn builder() -> VenueBuilder {
        VenueBuilder::default()
    }

    /// A fresh session wrapping a new performer from the factory.
    pub fn create_session(&self) -> Session {
        let performer = self.inner.performer_factory.create_performer();
        Session::new(self.inner.clone(), performer)
    }

    pub fn source_endpoints(&self) -> Vec<EndpointDetails> {
        self.inner
            .source_endpoints
            .iter()
            .map(|e| e.details.clone())
            .collect()
    }

    pub fn sink_endpoints(&self) -> Vec<EndpointDetails> {
        self.inner
            .sink_endpoints
            .iter()
            .map(|e| e.details.clone())
            .collect()
    }

    pub fn audio_system(&self) -> &dyn AudioSystem {
        self.inner.audio_system()
    }
}

impl Drop for Venue {
    fn drop(&mut self) {
        {
            let active = self.inner.active.lock();
            if !active.sessions.is_empty() {
                tracing::warn!(
                    sessions = active.sessions.len(),
                    "venue dropped while sessions are still active"
                );
            }
            debug_assert!(active.sessions.is_empty(), "venue dropped with active sessions");
        }
        self.inner.audio_system.set_callback(None);
    }
}

/// Builder for [`Venue`].
#[derive(Default)]
pub struct VenueBuilder {
    requirements: Requirements,
    audio_system: Option<Box<dyn AudioSystem>>,
    performer_factory: Option<Box<dyn PerformerFactory>>,
}

impl VenueBuilder {
    pub fn requirements(mut self, requirements: Requirements) -> Self {
        self.requirements = requirements;
        self
    }

    /// Substitutes a prebuilt device; without this the builder opens the
    /// default cpal device per the requirements.
    pub fn audio_system(mut self, audio_system: Box<dyn AudioSystem>) -> Self {
        self.audio_system = Some(audio_system);
        self
    }

    pub fn performer_factory(mut self, factory: Box<dyn PerformerFactory>) -> Self {
        self.performer_factory = Some(factory);
        self
    }

    pub fn build(self) -> Result<Venue> {
        let performer_factory = self.performer_factory.ok_or_else(|| {
            Error::InvalidRequirements("a performer factory is required".into())
        })?;

        let audio_system = match self.audio_system {
            Some(system) => system,
            None => Box::new(CpalAudioSystem::new(&self.requirements)?),
        };

        let (source_endpoints, sink_endpoints) = device_endpoints(
            audio_system.num_input_channels(),
            audio_system.num_output_channels(),
        );

        tracing::info!(
            sample_rate = audio_system.sample_rate(),
            max_block_size = audio_system.max_block_size(),
            inputs = audio_system.num_input_channels(),
            outputs = audio_system.num_output_channels(),
            "venue ready"
        );

        let inner = Arc::new_cyclic(|self_ref| VenueInner {
            self_ref: self_ref.clone(),
            audio_system,
            performer_factory,
            source_endpoints,
            sink_endpoints,
            active: Mutex::new(ActiveSet {
                sessions: Vec::new(),
                midi_out: MidiOutBuffer::with_capacity(MIDI_OUT_CAPACITY),
            }),
        });

        Ok(Venue { inner })
    }
}
