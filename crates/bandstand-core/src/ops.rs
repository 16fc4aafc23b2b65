//! Declarative connections and the per-block operation plan built from them.
//!
//! Connections are recorded while a session is being wired up; `link`
//! compiles them into a flat list of operation records that the render
//! thread replays for every sub-block. All buffers are sized here, at link
//! time, so the render path never allocates.

use crate::endpoint::{find_details, EndpointHandle, EndpointId};
use crate::error::{Error, Result};
use crate::performer::Performer;
use crate::render::SubBlock;
use crate::value::Value;

/// A declarative edge between a device endpoint and a performer endpoint.
#[derive(Clone, Debug)]
pub struct Connection {
    pub kind: ConnectionKind,
    pub endpoint: EndpointId,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionKind {
    /// Device MIDI into a performer event endpoint.
    MidiIn,
    /// Device audio channels into a performer input stream.
    AudioIn { channel: u32 },
    /// Performer output stream onto device audio channels.
    AudioOut { channel: u32 },
}

#[derive(Debug)]
enum PreRenderOp {
    /// Forward each due MIDI event to the performer as an input event.
    ForwardMidi { handle: EndpointHandle },
    /// Interleave a device channel range into `scratch` and hand it to the
    /// performer as the next input stream frames.
    CopyInputStream {
        handle: EndpointHandle,
        start_channel: u32,
        num_channels: u32,
        scratch: Vec<f32>,
    },
}

#[derive(Debug)]
enum PostRenderOp {
    /// Write the performer's output frames onto a device channel range,
    /// clearing whatever the performer did not cover.
    CopyOutputStream {
        handle: EndpointHandle,
        start_channel: u32,
        num_channels: u32,
    },
}

/// The compiled per-block plan. Rebuilt from scratch on every link and
/// dropped on unload.
#[derive(Debug, Default)]
pub struct OperationList {
    pre: Vec<PreRenderOp>,
    post: Vec<PostRenderOp>,
}

impl OperationList {
    /// Compiles `connections` against a loaded performer. Stream endpoints
    /// with a frame shape other than float or vector-of-float are a hard
    /// link error.
    pub fn build(
        connections: &[Connection],
        performer: &mut dyn Performer,
        max_block_size: u32,
    ) -> Result<OperationList> {
        let mut list = OperationList::default();

        for connection in connections {
            let handle = performer
                .endpoint_handle(&connection.endpoint)
                .ok_or_else(|| Error::UnknownEndpoint(connection.endpoint.to_string()))?;

            match connection.kind {
                ConnectionKind::MidiIn => {
                    let is_midi = find_details(performer.input_endpoints(), &connection.endpoint)
                        .is_some_and(|details| details.is_midi_event());
                    if is_midi {
                        list.pre.push(PreRenderOp::ForwardMidi { handle });
                    }
                }

                ConnectionKind::AudioIn { channel } => {
                    let details = find_details(performer.input_endpoints(), &connection.endpoint)
                        .ok_or_else(|| Error::UnknownEndpoint(connection.endpoint.to_string()))?;
                    if !details.frame_type.is_float() {
                        return Err(Error::UnsupportedFrameType(connection.endpoint.to_string()));
                    }
                    let num_channels = details.frame_type.num_channels();
                    list.pre.push(PreRenderOp::CopyInputStream {
                        handle,
                        start_channel: channel,
                        num_channels,
                        scratch: vec![0.0; (num_channels * max_block_size) as usize],
                    });
                }

                ConnectionKind::AudioOut { channel } => {
                    let details = find_details(performer.output_endpoints(), &connection.endpoint)
                        .ok_or_else(|| Error::UnknownEndpoint(connection.endpoint.to_string()))?;
                    if !details.frame_type.is_float() {
                        return Err(Error::UnsupportedFrameType(connection.endpoint.to_string()));
                    }
                    list.post.push(PostRenderOp::CopyOutputStream {
                        handle,
                        start_channel: channel,
                        num_channels: details.frame_type.num_channels(),
                    });
                }
            }
        }

        Ok(list)
    }

    pub fn clear(&mut self) {
        self.pre.clear();
        self.post.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.pre.is_empty() && self.post.is_empty()
    }

    pub fn num_pre_render_ops(&self) -> usize {
        self.pre.len()
    }

    pub fn num_post_render_ops(&self) -> usize {
        self.post.len()
    }

    /// Runs the pre-render plan for one sub-block.
    pub fn run_pre(&mut self, performer: &mut dyn Performer, sub: &SubBlock<'_>) {
        let frames = sub.num_frames() as usize;

        for op in &mut self.pre {
            match op {
                PreRenderOp::ForwardMidi { handle } => {
                    for event in sub.midi_in {
                        performer.add_input_event(*handle, &Value::MidiMessage(event.packed));
                    }
                }

                PreRenderOp::CopyInputStream {
                    handle,
                    start_channel,
                    num_channels,
                    scratch,
                } => {
                    let channels = *num_channels as usize;
                    let used = &mut scratch[..frames * channels];
                    used.fill(0.0);
                    for ch in 0..*num_channels {
                        let device_channel = *start_channel + ch;
                        if device_channel >= sub.inputs.num_channels() {
                            break;
                        }
                        let samples = sub.inputs.channel(device_channel);
                        for (frame, sample) in samples.iter().enumerate() {
                            used[frame * channels + ch as usize] = *sample;
                        }
                    }
                    performer.set_next_input_stream_frames(*handle, used);
                }
            }
        }
    }

    /// Runs the post-render plan for one sub-block.
    pub fn run_post(&mut self, performer: &mut dyn Performer, sub: &mut SubBlock<'_>) {
        for op in &self.post {
            match op {
                PostRenderOp::CopyOutputStream {
                    handle,
                    start_channel,
                    num_channels,
                } => {
                    let available = sub.outputs.num_channels().saturating_sub(*start_channel);
                    let count = (*num_channels).min(available);
                    if count == 0 {
                        continue;
                    }
                    let frames = performer.output_stream_frames(*handle);
                    let mut dest = sub.outputs.channel_range_mut(*start_channel, count);
                    crate::buffer::copy_intersection_and_clear_outside(
                        &mut dest,
                        frames,
                        *num_channels,
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{ChannelArrayMut, ChannelArrayRef};
    use crate::endpoint::{EndpointDetails, FrameType};
    use crate::midi::MidiEvent;
    use crate::performer::{BuildSettings, CompileMessageList, Program};
    use crate::render::{MidiOutBuffer, RenderContext};

    /// Minimal performer that records endpoint traffic.
    struct RecordingPerformer {
        inputs: Vec<EndpointDetails>,
        outputs: Vec<EndpointDetails>,
        received_events: Vec<(EndpointHandle, Value)>,
        received_frames: Vec<Vec<f32>>,
        output_frames: Vec<f32>,
    }

    impl RecordingPerformer {
        fn new(inputs: Vec<EndpointDetails>, outputs: Vec<EndpointDetails>) -> Self {
            Self {
                inputs,
                outputs,
                received_events: Vec::new(),
                received_frames: Vec::new(),
                output_frames: Vec::new(),
            }
        }

        fn handle_for(&self, id: &EndpointId) -> Option<EndpointHandle> {
            self.inputs
                .iter()
                .chain(&self.outputs)
                .position(|d| &d.id == id)
                .map(|i| EndpointHandle::new(i as u32 + 1))
        }
    }

    impl Performer for RecordingPerformer {
        fn load(&mut self, _m: &mut CompileMessageList, _p: &Program) -> bool {
            true
        }
        fn link(&mut self, _m: &mut CompileMessageList, _s: &BuildSettings) -> bool {
            true
        }
        fn is_linked(&self) -> bool {
            true
        }
        fn unload(&mut self) {}

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

        fn prepare(&mut self, _num_frames: u32) {}
        fn set_next_input_stream_frames(&mut self, _handle: EndpointHandle, frames: &[f32]) {
            self.received_frames.push(frames.to_vec());
        }
        fn set_sparse_input_stream_target(&mut self, _h: EndpointHandle, _t: &Value, _n: u32) {}
        fn set_input_value(&mut self, _h: EndpointHandle, _v: &Value) {}
        fn add_input_event(&mut self, handle: EndpointHandle, event: &Value) {
            self.received_events.push((handle, *event));
        }
        fn advance(&mut self) {}

        fn output_stream_frames(&mut self, _handle: EndpointHandle) -> &[f32] {
            &self.output_frames
        }
        fn iterate_output_events(
            &mut self,
            _handle: EndpointHandle,
            _handler: &mut dyn FnMut(u32, &Value),
        ) {
        }

        fn xruns(&self) -> u32 {
            0
        }
    }

    fn midi_connection(id: &str) -> Connection {
        Connection {
            kind: ConnectionKind::MidiIn,
            endpoint: EndpointId::from(id),
        }
    }

    #[test]
    fn builds_one_op_per_connection() {
        let mut performer = RecordingPerformer::new(
            vec![
                EndpointDetails::event("midiIn", FrameType::Midi),
                EndpointDetails::stream("audioIn", FrameType::FloatVector(2)),
            ],
            vec![EndpointDetails::stream("audioOut", FrameType::FloatVector(2))],
        );
        let connections = vec![
            midi_connection("midiIn"),
            Connection {
                kind: ConnectionKind::AudioIn { channel: 0 },
                endpoint: EndpointId::from("audioIn"),
            },
            Connection {
                kind: ConnectionKind::AudioOut { channel: 0 },
                endpoint: EndpointId::from("audioOut"),
            },
        ];
        let list = OperationList::build(&connections, &mut performer, 512).unwrap();
        assert_eq!(list.num_pre_render_ops(), 2);
        assert_eq!(list.num_post_render_ops(), 1);
    }

    #[test]
    fn non_float_stream_is_a_hard_error() {
        let mut performer = RecordingPerformer::new(
            vec![EndpointDetails::stream("weird", FrameType::Midi)],
            vec![],
        );
        let connections = vec![Connection {
            kind: ConnectionKind::AudioIn { channel: 0 },
            endpoint: EndpointId::from("weird"),
        }];
        let err = OperationList::build(&connections, &mut performer, 512).unwrap_err();
        assert!(matches!(err, Error::UnsupportedFrameType(_)));
    }

    #[test]
    fn unknown_endpoint_is_an_error() {
        let mut performer = RecordingPerformer::new(vec![], vec![]);
        let connections = vec![midi_connection("missing")];
        assert!(matches!(
            OperationList::build(&connections, &mut performer, 512),
            Err(Error::UnknownEndpoint(_))
        ));
    }

    #[test]
    fn forwards_due_midi_as_input_events() {
        let mut performer = RecordingPerformer::new(
            vec![EndpointDetails::event("midiIn", FrameType::Midi)],
            vec![],
        );
        let connections = vec![midi_connection("midiIn")];
        let mut list = OperationList::build(&connections, &mut performer, 64).unwrap();

        let input = vec![0.0; 64];
        let mut output = vec![0.0; 64];
        let midi = vec![MidiEvent::new(0, 0x903C64), MidiEvent::new(0, 0x803C00)];
        let mut midi_out = MidiOutBuffer::with_capacity(4);
        let mut context = RenderContext {
            total_frames_rendered: 0,
            inputs: ChannelArrayRef::new(&input, 1, 64),
            outputs: ChannelArrayMut::new(&mut output, 1, 64),
            midi_in: &midi,
            midi_out: &mut midi_out,
            frame_offset: 0,
        };
        context.iterate_in_blocks(64, |sub| {
            list.run_pre(&mut performer, &sub);
        });

        let packed: Vec<u32> = performer
            .received_events
            .iter()
            .filter_map(|(_, v)| v.as_midi_message())
            .collect();
        assert_eq!(packed, vec![0x903C64, 0x803C00]);
    }

    #[test]
    fn interleaves_input_channels_for_the_performer() {
        let mut performer = RecordingPerformer::new(
            vec![EndpointDetails::stream("in", FrameType::FloatVector(2))],
            vec![],
        );
        let connections = vec![Connection {
            kind: ConnectionKind::AudioIn { channel: 0 },
            endpoint: EndpointId::from("in"),
        }];
        let mut list = OperationList::build(&connections, &mut performer, 8).unwrap();

        // channel 0: 1 2 3, channel 1: 10 20 30
        let input = vec![1.0, 2.0, 3.0, 10.0, 20.0, 30.0];
        let mut output = vec![0.0; 3];
        let mut midi_out = MidiOutBuffer::with_capacity(4);
        let mut context = RenderContext {
            total_frames_rendered: 0,
            inputs: ChannelArrayRef::new(&input, 2, 3),
            outputs: ChannelArrayMut::new(&mut output, 1, 3),
            midi_in: &[],
            midi_out: &mut midi_out,
            frame_offset: 0,
        };
        context.iterate_in_blocks(8, |sub| {
            list.run_pre(&mut performer, &sub);
        });

        assert_eq!(
            performer.received_frames,
            vec![vec![1.0, 10.0, 2.0, 20.0, 3.0, 30.0]]
        );
    }

    #[test]
    fn writes_output_frames_and_clears_uncovered() {
        let mut performer = RecordingPerformer::new(
            vec![],
            vec![EndpointDetails::stream("out", FrameType::FloatVector(2))],
        );
        // Interleaved stereo, 2 frames; performer covers both channels.
        performer.output_frames = vec![0.5, -0.5, 0.25, -0.25];

        let connections = vec![Connection {
            kind: ConnectionKind::AudioOut { channel: 0 },
            endpoint: EndpointId::from("out"),
        }];
        let mut list = OperationList::build(&connections, &mut performer, 8).unwrap();

        let input = vec![0.0; 2];
        let mut output = vec![9.0; 2 * 2];
        let mut midi_out = MidiOutBuffer::with_capacity(4);
        let mut context = RenderContext {
            total_frames_rendered: 0,
            inputs: ChannelArrayRef::new(&input, 1, 2),
            outputs: ChannelArrayMut::new(&mut output, 2, 2),
            midi_in: &[],
            midi_out: &mut midi_out,
            frame_offset: 0,
        };
        context.iterate_in_blocks(8, |mut sub| {
            list.run_post(&mut performer, &mut sub);
        });

        assert_eq!(output, vec![0.5, 0.25, -0.5, -0.25]);
    }
}
