//! cpal-backed audio system.
//!
//! Owns the device streams and adapts their interleaved buffers to the
//! channel-major views the hosting core renders into. All scratch space is
//! allocated up front; the realtime closures only move samples.

use crate::buffer::{ChannelArrayMut, ChannelArrayRef};
use crate::device::{AudioSystem, RenderCallback, Requirements};
use crate::error::{Error, Result};
use crate::meter::CallbackMeter;
use crate::midi::{midi_input_queue, MidiEvent, MidiInputConsumer, MidiInputProducer};
use arc_swap::ArcSwapOption;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::Sample;
use parking_lot::Mutex;
use ringbuf::{traits::*, HeapCons, HeapProd, HeapRb};
use std::sync::Arc;
use std::time::Instant;

const DEFAULT_MAX_BLOCK_SIZE: u32 = 512;
const MIDI_SCRATCH_CAPACITY: usize = 256;
/// Blocks of input the interleaved ring can hold before dropping.
const INPUT_RING_BLOCKS: usize = 8;

/// Wrapper to hold a `cpal::Stream` in a `Send + Sync` context.
///
/// `cpal::Stream` is `!Send` due to platform internals. This is safe because
/// the stream is never touched again after construction; it lives for the
/// lifetime of the system and is dropped with it.
struct StreamHandle(#[allow(dead_code)] cpal::Stream);

unsafe impl Send for StreamHandle {}
unsafe impl Sync for StreamHandle {}

struct CallbackSlot {
    callback: Arc<dyn RenderCallback>,
}

struct SharedState {
    slot: ArcSwapOption<CallbackSlot>,
    meter: CallbackMeter,
}

/// The default-device audio system used by the venue builder.
pub struct CpalAudioSystem {
    shared: Arc<SharedState>,
    midi_producer: Mutex<MidiInputProducer>,
    sample_rate: f64,
    max_block_size: u32,
    num_input_channels: u32,
    num_output_channels: u32,
    _output_stream: StreamHandle,
    _input_stream: Option<StreamHandle>,
}

impl CpalAudioSystem {
    pub fn new(requirements: &Requirements) -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| Error::InvalidDevice("no output device available".into()))?;
        let default_config = device.default_output_config()?;

        let sample_rate = requirements
            .sample_rate
            .map(cpal::SampleRate)
            .unwrap_or_else(|| default_config.sample_rate());
        let num_output_channels = if requirements.num_output_channels > 0 {
            requirements.num_output_channels
        } else {
            u32::from(default_config.channels())
        };
        let num_input_channels = requirements.num_input_channels;
        let max_block_size = requirements.block_size.unwrap_or(DEFAULT_MAX_BLOCK_SIZE);
        if max_block_size == 0 {
            return Err(Error::InvalidRequirements("block size must be non-zero".into()));
        }

        let buffer_size = match requirements.block_size {
            Some(frames) => cpal::BufferSize::Fixed(frames),
            None => cpal::BufferSize::Default,
        };
        let output_config = cpal::StreamConfig {
            channels: num_output_channels as u16,
            sample_rate,
            buffer_size,
        };

        let shared = Arc::new(SharedState {
            slot: ArcSwapOption::const_empty(),
            meter: CallbackMeter::new(f64::from(sample_rate.0)),
        });

        let (midi_producer, midi_consumer) = midi_input_queue();

        let input_ring_len =
            (max_block_size as usize * num_input_channels as usize * INPUT_RING_BLOCKS).max(1);
        let (input_producer, input_consumer) = HeapRb::<f32>::new(input_ring_len).split();

        let output_stream = match default_config.sample_format() {
            cpal::SampleFormat::F32 => build_output_stream::<f32>(
                &device,
                &output_config,
                shared.clone(),
                RenderScratch::new(
                    num_input_channels,
                    num_output_channels,
                    max_block_size,
                    midi_consumer,
                    input_consumer,
                ),
            )?,
            cpal::SampleFormat::I16 => build_output_stream::<i16>(
                &device,
                &output_config,
                shared.clone(),
                RenderScratch::new(
                    num_input_channels,
                    num_output_channels,
                    max_block_size,
                    midi_consumer,
                    input_consumer,
                ),
            )?,
            cpal::SampleFormat::U16 => build_output_stream::<u16>(
                &device,
                &output_config,
                shared.clone(),
                RenderScratch::new(
                    num_input_channels,
                    num_output_channels,
                    max_block_size,
                    midi_consumer,
                    input_consumer,
                ),
            )?,
            format => {
                return Err(Error::InvalidRequirements(format!(
                    "unsupported sample format: {format:?}"
                )));
            }
        };
        output_stream.0.play()?;

        let input_stream = if num_input_channels > 0 {
            Some(Self::open_input_stream(
                &host,
                num_input_channels,
                sample_rate,
                buffer_size,
                input_producer,
            )?)
        } else {
            None
        };

        tracing::info!(
            sample_rate = sample_rate.0,
            max_block_size,
            inputs = num_input_channels,
            outputs = num_output_channels,
            "audio device running"
        );

        Ok(Self {
            shared,
            midi_producer: Mutex::new(midi_producer),
            sample_rate: f64::from(sample_rate.0),
            max_block_size,
            num_input_channels,
            num_output_channels,
            _output_stream: output_stream,
            _input_stream: input_stream,
        })
    }

    fn open_input_stream(
        host: &cpal::Host,
        num_channels: u32,
        sample_rate: cpal::SampleRate,
        buffer_size: cpal::BufferSize,
        producer: HeapProd<f32>,
    ) -> Result<StreamHandle> {
        let device = host
            .default_input_device()
            .ok_or_else(|| Error::InvalidDevice("no input device available".into()))?;
        let default_config = device.default_input_config()?;
        let config = cpal::StreamConfig {
            channels: num_channels as u16,
            sample_rate,
            buffer_size,
        };

        match default_config.sample_format() {
            cpal::SampleFormat::F32 => build_input_stream::<f32>(&device, &config, producer),
            cpal::SampleFormat::I16 => build_input_stream::<i16>(&device, &config, producer),
            cpal::SampleFormat::U16 => build_input_stream::<u16>(&device, &config, producer),
            format => Err(Error::InvalidRequirements(format!(
                "unsupported sample format: {format:?}"
            ))),
        }
    }

    /// Queues a MIDI event for the next device block. Push in time order;
    /// returns false when the queue is full.
    pub fn add_midi_event(&self, event: MidiEvent) -> bool {
        self.midi_producer.lock().push(event)
    }
}

impl AudioSystem for CpalAudioSystem {
    fn num_input_channels(&self) -> u32 {
        self.num_input_channels
    }

    fn num_output_channels(&self) -> u32 {
        self.num_output_channels
    }

    fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    fn max_block_size(&self) -> u32 {
        self.max_block_size
    }

    fn cpu_load(&self) -> f64 {
        self.shared.meter.load()
    }

    fn xrun_count(&self) -> i32 {
        self.shared.meter.overruns() as i32
    }

    fn set_callback(&self, callback: Option<Arc<dyn RenderCallback>>) {
        let previous = match callback {
            Some(callback) => {
                callback.render_starting(self.sample_rate, self.max_block_size);
                self.shared
                    .slot
                    .swap(Some(Arc::new(CallbackSlot { callback })))
            }
            None => self.shared.slot.swap(None),
        };
        if let Some(previous) = previous {
            previous.callback.render_stopped();
        }
    }
}

/// Preallocated working space moved into the output stream closure.
struct RenderScratch {
    num_input_channels: u32,
    max_block_size: u32,
    input_interleaved: Vec<f32>,
    input_planar: Vec<f32>,
    output_planar: Vec<f32>,
    midi: Vec<MidiEvent>,
    midi_consumer: MidiInputConsumer,
    input_consumer: HeapCons<f32>,
}

impl RenderScratch {
    fn new(
        num_input_channels: u32,
        num_output_channels: u32,
        max_block_size: u32,
        midi_consumer: MidiInputConsumer,
        input_consumer: HeapCons<f32>,
    ) -> Self {
        let input_len = (num_input_channels * max_block_size) as usize;
        Self {
            num_input_channels,
            max_block_size,
            input_interleaved: vec![0.0; input_len],
            input_planar: vec![0.0; input_len],
            output_planar: vec![0.0; (num_output_channels * max_block_size) as usize],
            midi: Vec::with_capacity(MIDI_SCRATCH_CAPACITY),
            midi_consumer,
            input_consumer,
        }
    }

    /// Renders one chunk of at most `max_block_size` frames into
    /// `output_planar`.
    fn render_chunk(&mut self, callback: &dyn RenderCallback, frames: u32, out_channels: u32) {
        let in_channels = self.num_input_channels as usize;
        let frame_count = frames as usize;

        let inputs = if in_channels == 0 {
            ChannelArrayRef::empty(frames)
        } else {
            let interleaved = &mut self.input_interleaved[..frame_count * in_channels];
            let got = self.input_consumer.pop_slice(interleaved);
            interleaved[got..].fill(0.0);
            for ch in 0..in_channels {
                for frame in 0..frame_count {
                    self.input_planar[ch * frame_count + frame] =
                        interleaved[frame * in_channels + ch];
                }
            }
            ChannelArrayRef::new(
                &self.input_planar[..frame_count * in_channels],
                self.num_input_channels,
                frames,
            )
        };

        self.midi_consumer.drain_into(&mut self.midi, frames);

        let out = &mut self.output_planar[..frame_count * out_channels as usize];
        out.fill(0.0);
        callback.render(
            inputs,
            ChannelArrayMut::new(out, out_channels, frames),
            &self.midi,
        );
    }
}

fn build_output_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    shared: Arc<SharedState>,
    mut scratch: RenderScratch,
) -> Result<StreamHandle>
where
    T: cpal::SizedSample + cpal::FromSample<f32>,
{
    let out_channels = config.channels as usize;

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            let started = Instant::now();
            let total_frames = data.len() / out_channels;

            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                let slot = shared.slot.load_full();
                let mut done = 0usize;

                while done < total_frames {
                    let frames =
                        (total_frames - done).min(scratch.max_block_size as usize) as u32;

                    match &slot {
                        Some(slot) => scratch.render_chunk(
                            slot.callback.as_ref(),
                            frames,
                            out_channels as u32,
                        ),
                        None => {
                            scratch.output_planar[..frames as usize * out_channels].fill(0.0);
                        }
                    }

                    for frame in 0..frames as usize {
                        for ch in 0..out_channels {
                            data[(done + frame) * out_channels + ch] = T::from_sample(
                                scratch.output_planar[ch * frames as usize + frame],
                            );
                        }
                    }
                    done += frames as usize;
                }
            }));

            if result.is_err() {
                // Panic in the render path - output silence.
                for sample in data.iter_mut() {
                    *sample = T::from_sample(0.0);
                }
            }

            shared.meter.record(total_frames as u32, started.elapsed());
        },
        |_err| {
            // Stream error - cannot log from the device thread.
        },
        None,
    )?;

    Ok(StreamHandle(stream))
}

fn build_input_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut producer: HeapProd<f32>,
) -> Result<StreamHandle>
where
    T: cpal::SizedSample,
    f32: cpal::FromSample<T>,
{
    let stream = device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            for sample in data {
                // Drop samples when the ring is full; the render side
                // zero-fills the shortfall.
                let _ = producer.try_push(f32::from_sample(*sample));
            }
        },
        |_err| {},
        None,
    )?;
    stream.play()?;

    Ok(StreamHandle(stream))
}
