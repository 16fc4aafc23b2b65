//! Shared test doubles: a scriptable performer back-end and a hand-driven
//! audio system.
#![allow(dead_code)]

use bandstand::core::{
    AudioSystem, BuildSettings, ChannelArrayMut, ChannelArrayRef, CompileMessageList,
    EndpointDetails, EndpointHandle, EndpointId, MidiEvent, Performer, PerformerFactory, Program,
    RenderCallback, Value,
};
use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Everything the scripted performers record, shared with the test body.
#[derive(Default)]
pub struct PerformerLog {
    /// (performer name, frames) per `prepare` call.
    pub prepares: Mutex<Vec<(String, u32)>>,
    /// (performer name, sub-block ordinal, packed bytes) per input event.
    pub events: Mutex<Vec<(String, usize, u32)>>,
    /// Interleaved input stream blocks, as handed to the performer.
    pub streams: Mutex<Vec<Vec<f32>>>,
    /// Performer names in `advance` order, across all sessions.
    pub advances: Mutex<Vec<String>>,
}

impl PerformerLog {
    pub fn prepare_sizes(&self) -> Vec<u32> {
        self.prepares.lock().unwrap().iter().map(|(_, n)| *n).collect()
    }

    pub fn advance_order(&self) -> Vec<String> {
        self.advances.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.prepares.lock().unwrap().clear();
        self.events.lock().unwrap().clear();
        self.streams.lock().unwrap().clear();
        self.advances.lock().unwrap().clear();
    }
}

/// A performer that records every call and plays back a constant sample
/// value on its output streams.
pub struct ScriptedPerformer {
    name: String,
    inputs: Vec<EndpointDetails>,
    outputs: Vec<EndpointDetails>,
    loaded: bool,
    linked: bool,
    prepared: u32,
    sub_block: usize,
    out_buffer: Vec<f32>,
    fill_value: f32,
    xruns: u32,
    log: Arc<PerformerLog>,
}

impl ScriptedPerformer {
    fn handle_for(&self, id: &EndpointId) -> Option<EndpointHandle> {
        self.inputs
            .iter()
            .chain(&self.outputs)
            .position(|d| &d.id == id)
            .map(|i| EndpointHandle::new(i as u32))
    }

    fn output_channels(&self) -> u32 {
        self.outputs
            .iter()
            .map(|d| d.frame_type.num_channels())
            .max()
            .unwrap_or(0)
    }
}

impl Performer for ScriptedPerformer {
    fn load(&mut self, messages: &mut CompileMessageList, program: &Program) -> bool {
        match program.data() {
            Some(data) => {
                self.inputs = data.inputs.clone();
                self.outputs = data.outputs.clone();
                self.loaded = true;
                true
            }
            None => {
                messages.add_error("empty program");
                false
            }
        }
    }

    fn link(&mut self, _messages: &mut CompileMessageList, _settings: &BuildSettings) -> bool {
        self.linked = self.loaded;
        self.linked
    }

    fn is_linked(&self) -> bool {
        self.linked
    }

    fn unload(&mut self) {
        self.loaded = false;
        self.linked = false;
        self.inputs.clear();
        self.outputs.clear();
    }

    fn input_endpoints(&self) -> &[EndpointDetails] {
        &self.inputs
    }

    fn output_endpoints(&self) -> &[EndpointDetails] {
        &self.outputs
    }

    fn endpoint_handle(&mut self, id: &EndpointId) -> Option<EndpointHandle> {
        self.handle_for(id)
    }

    fn is_endpoint_active(&self, id: &EndpointId) -> bool {
        self.handle_for(id).is_some()
    }

    fn prepare(&mut self, num_frames: u32) {
        self.prepared = num_frames;
        self.sub_block += 1;
        self.log
            .prepares
            .lock()
            .unwrap()
            .push((self.name.clone(), num_frames));

        let samples = (num_frames * self.output_channels()) as usize;
        self.out_buffer.clear();
        self.out_buffer.resize(samples, self.fill_value);
    }

    fn set_next_input_stream_frames(&mut self, _handle: EndpointHandle, interleaved: &[f32]) {
        self.log.streams.lock().unwrap().push(interleaved.to_vec());
    }

    fn set_sparse_input_stream_target(
        &mut self,
        _handle: EndpointHandle,
        _target: &Value,
        _frames_to_reach: u32,
    ) {
    }

    fn set_input_value(&mut self, _handle: EndpointHandle, _value: &Value) {}

    fn add_input_event(&mut self, _handle: EndpointHandle, event: &Value) {
        if let Some(packed) = event.as_midi_message() {
            self.log
                .events
                .lock()
                .unwrap()
                .push((self.name.clone(), self.sub_block, packed));
        }
    }

    fn advance(&mut self) {
        self.log.advances.lock().unwrap().push(self.name.clone());
    }

    fn output_stream_frames(&mut self, _handle: EndpointHandle) -> &[f32] {
        &self.out_buffer
    }

    fn iterate_output_events(
        &mut self,
        _handle: EndpointHandle,
        _handler: &mut dyn FnMut(u32, &Value),
    ) {
    }

    fn xruns(&self) -> u32 {
        self.xruns
    }
}

/// Factory producing [`ScriptedPerformer`]s named `p0`, `p1`, ... that all
/// share one [`PerformerLog`].
pub struct ScriptedFactory {
    pub log: Arc<PerformerLog>,
    pub fill_value: f32,
    pub xruns: u32,
    counter: AtomicUsize,
}

impl ScriptedFactory {
    pub fn new() -> Self {
        Self {
            log: Arc::new(PerformerLog::default()),
            fill_value: 0.5,
            xruns: 0,
            counter: AtomicUsize::new(0),
        }
    }

    pub fn with_fill_value(mut self, fill_value: f32) -> Self {
        self.fill_value = fill_value;
        self
    }

    pub fn with_xruns(mut self, xruns: u32) -> Self {
        self.xruns = xruns;
        self
    }
}

impl PerformerFactory for ScriptedFactory {
    fn create_performer(&self) -> Box<dyn Performer> {
        let index = self.counter.fetch_add(1, Ordering::Relaxed);
        Box::new(ScriptedPerformer {
            name: format!("p{index}"),
            inputs: Vec::new(),
            outputs: Vec::new(),
            loaded: false,
            linked: false,
            prepared: 0,
            sub_block: 0,
            out_buffer: Vec::new(),
            fill_value: self.fill_value,
            xruns: self.xruns,
            log: self.log.clone(),
        })
    }
}

/// State behind [`MockAudioSystem`], kept by the test to drive callbacks.
pub struct MockDevice {
    pub callback: Mutex<Option<Arc<dyn RenderCallback>>>,
    pub xruns: AtomicI32,
    pub num_output_channels: u32,
}

impl MockDevice {
    pub fn has_callback(&self) -> bool {
        self.callback.lock().unwrap().is_some()
    }

    /// Drives one device callback, returning the rendered output as a
    /// channel-major buffer.
    pub fn render(
        &self,
        input: &[f32],
        num_input_channels: u32,
        frames: u32,
        midi: &[MidiEvent],
    ) -> Vec<f32> {
        let mut output = vec![0.0f32; (self.num_output_channels * frames) as usize];
        let callback = self.callback.lock().unwrap().clone();
        if let Some(callback) = callback {
            let inputs = if num_input_channels == 0 {
                ChannelArrayRef::empty(frames)
            } else {
                ChannelArrayRef::new(input, num_input_channels, frames)
            };
            callback.render(
                inputs,
                ChannelArrayMut::new(&mut output, self.num_output_channels, frames),
                midi,
            );
        }
        output
    }

    pub fn render_silent_input(&self, frames: u32, midi: &[MidiEvent]) -> Vec<f32> {
        self.render(&[], 0, frames, midi)
    }
}

pub struct MockAudioSystem {
    state: Arc<MockDevice>,
    num_input_channels: u32,
    sample_rate: f64,
    max_block_size: u32,
}

pub fn mock_audio_system(
    num_input_channels: u32,
    num_output_channels: u32,
    max_block_size: u32,
) -> (MockAudioSystem, Arc<MockDevice>) {
    let state = Arc::new(MockDevice {
        callback: Mutex::new(None),
        xruns: AtomicI32::new(0),
        num_output_channels,
    });
    (
        MockAudioSystem {
            state: state.clone(),
            num_input_channels,
            sample_rate: 48_000.0,
            max_block_size,
        },
        state,
    )
}

impl AudioSystem for MockAudioSystem {
    fn num_input_channels(&self) -> u32 {
        self.num_input_channels
    }

    fn num_output_channels(&self) -> u32 {
        self.state.num_output_channels
    }

    fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    fn max_block_size(&self) -> u32 {
        self.max_block_size
    }

    fn cpu_load(&self) -> f64 {
        0.0
    }

    fn xrun_count(&self) -> i32 {
        self.state.xruns.load(Ordering::Relaxed)
    }

    fn set_callback(&self, callback: Option<Arc<dyn RenderCallback>>) {
        *self.state.callback.lock().unwrap() = callback;
    }
}
