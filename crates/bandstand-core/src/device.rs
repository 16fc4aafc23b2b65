//! Device-facing traits: what the hosting core consumes from an audio
//! system, and the configuration used to bring one up.

use crate::buffer::{ChannelArrayMut, ChannelArrayRef};
use crate::midi::MidiEvent;
use std::sync::Arc;

/// Requested device configuration. `None` fields take the device default.
#[derive(Clone, Debug)]
pub struct Requirements {
    pub sample_rate: Option<u32>,
    pub block_size: Option<u32>,
    pub num_input_channels: u32,
    pub num_output_channels: u32,
}

impl Default for Requirements {
    fn default() -> Self {
        Self {
            sample_rate: None,
            block_size: None,
            num_input_channels: 0,
            num_output_channels: 2,
        }
    }
}

/// Installed into an [`AudioSystem`]; invoked on the device's realtime
/// thread. `render` must never block, allocate or unwind.
pub trait RenderCallback: Send + Sync {
    fn render_starting(&self, sample_rate: f64, max_block_size: u32);
    fn render_stopped(&self);

    /// MIDI events are sorted by frame index, non-decreasing.
    fn render(
        &self,
        inputs: ChannelArrayRef<'_>,
        outputs: ChannelArrayMut<'_>,
        midi_in: &[MidiEvent],
    );
}

/// A running audio/MIDI device. The venue owns exactly one.
pub trait AudioSystem: Send + Sync {
    fn num_input_channels(&self) -> u32;
    fn num_output_channels(&self) -> u32;
    fn sample_rate(&self) -> f64;
    fn max_block_size(&self) -> u32;

    /// Smoothed callback CPU load in [0, 1].
    fn cpu_load(&self) -> f64;

    /// Device-side missed deadlines; negative when the device cannot report
    /// them.
    fn xrun_count(&self) -> i32;

    fn set_callback(&self, callback: Option<Arc<dyn RenderCallback>>);
}
