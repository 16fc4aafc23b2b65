//! One device block's worth of render state, and the sub-block iterator that
//! slices it to respect performer block limits and MIDI event boundaries.

use crate::buffer::{ChannelArrayMut, ChannelArrayRef};
use crate::midi::MidiEvent;

/// Capacity-bounded MIDI output buffer. The count accumulates across
/// sub-blocks within one device block.
#[derive(Debug)]
pub struct MidiOutBuffer {
    events: Vec<MidiEvent>,
}

impl MidiOutBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: Vec::with_capacity(capacity),
        }
    }

    /// Drops the event when full rather than growing, so pushing is safe on
    /// the render thread.
    #[inline]
    pub fn push(&mut self, event: MidiEvent) -> bool {
        if self.events.len() == self.events.capacity() {
            return false;
        }
        self.events.push(event);
        true
    }

    pub fn events(&self) -> &[MidiEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

/// Everything a session needs to render one device block. Built fresh for
/// each session on every device callback; never shared across threads.
pub struct RenderContext<'a> {
    /// Session frame counter at the start of this block.
    pub total_frames_rendered: u64,
    pub inputs: ChannelArrayRef<'a>,
    pub outputs: ChannelArrayMut<'a>,
    /// Sorted by `frame_index`, non-decreasing.
    pub midi_in: &'a [MidiEvent],
    pub midi_out: &'a mut MidiOutBuffer,
    /// Position inside the device block; frame indices in `midi_in` are
    /// relative to the same origin.
    pub frame_offset: u32,
}

/// One window of the device block handed to the render closure.
pub struct SubBlock<'s> {
    pub total_frames_rendered: u64,
    pub frame_offset: u32,
    pub inputs: ChannelArrayRef<'s>,
    pub outputs: ChannelArrayMut<'s>,
    /// Only the events due at this sub-block's start.
    pub midi_in: &'s [MidiEvent],
    pub midi_out: &'s mut MidiOutBuffer,
}

impl SubBlock<'_> {
    #[inline]
    pub fn num_frames(&self) -> u32 {
        self.inputs.num_frames()
    }
}

impl<'a> RenderContext<'a> {
    /// Splits `[frame_offset, N)` into consecutive sub-blocks and invokes
    /// `render` on each. A sub-block ends at `max_frames_per_block` frames or
    /// at the next MIDI event beyond the current offset, whichever comes
    /// first; that event is then delivered at the start of the following
    /// sub-block. Events already due (`frame_index <= frame_offset`) are
    /// consumed into the current sub-block's prefix.
    ///
    /// The sub-block frame counts always sum to the block's frame count.
    pub fn iterate_in_blocks<F>(&mut self, max_frames_per_block: u32, mut render: F)
    where
        F: FnMut(SubBlock<'_>),
    {
        debug_assert!(max_frames_per_block > 0);
        let mut frames_remaining = self.inputs.num_frames().saturating_sub(self.frame_offset);

        while frames_remaining != 0 {
            let mut frames_to_do = max_frames_per_block.min(frames_remaining);

            let pending = self.midi_in;
            let mut due = 0;
            for event in pending {
                if event.frame_index > self.frame_offset {
                    frames_to_do = frames_to_do.min(event.frame_index - self.frame_offset);
                    break;
                }
                due += 1;
            }
            let (prefix, rest) = pending.split_at(due);
            self.midi_in = rest;

            render(SubBlock {
                total_frames_rendered: self.total_frames_rendered,
                frame_offset: self.frame_offset,
                inputs: self
                    .inputs
                    .frame_range(self.frame_offset, self.frame_offset + frames_to_do),
                outputs: self
                    .outputs
                    .frame_range_mut(self.frame_offset, self.frame_offset + frames_to_do),
                midi_in: prefix,
                midi_out: &mut *self.midi_out,
            });

            self.frame_offset += frames_to_do;
            frames_remaining -= frames_to_do;
            self.total_frames_rendered += u64::from(frames_to_do);
        }
    }
}
