//! Per-channel effects over interleaved RGBA pixels.
//!
//! Each effect runs as one parallel-for over a single colour channel,
//! viewed as a 4-byte-strided `u8` slice of the pixel buffer. The three
//! channel views of one buffer are disjoint, so R, G and B may be
//! scheduled either as a chain or side by side.

use bytemuck::{Pod, Zeroable};
use weft_buffer::Buffer;
use weft_core::{AccessMode, BufferError, ScheduleError};
use weft_sched::{Scheduler, Task, TaskHandle};

/// One 8-bit RGBA pixel.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Pod, Zeroable)]
pub struct Rgba32 {
    /// Red.
    pub r: u8,
    /// Green.
    pub g: u8,
    /// Blue.
    pub b: u8,
    /// Alpha.
    pub a: u8,
}

impl Rgba32 {
    /// Build from components.
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// The value of one colour channel.
    pub fn channel(self, channel: Channel) -> u8 {
        match channel {
            Channel::Red => self.r,
            Channel::Green => self.g,
            Channel::Blue => self.b,
        }
    }
}

/// A colour channel of an [`Rgba32`] pixel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Byte 0.
    Red,
    /// Byte 1.
    Green,
    /// Byte 2.
    Blue,
}

impl Channel {
    /// All colour channels in scheduling order.
    pub const ALL: [Channel; 3] = [Channel::Red, Channel::Green, Channel::Blue];

    /// Byte offset of the channel within a pixel.
    pub fn byte_offset(self) -> usize {
        match self {
            Self::Red => 0,
            Self::Green => 1,
            Self::Blue => 2,
        }
    }
}

/// What to do to a channel value that exceeds its threshold.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChannelEffect {
    /// Bitwise not.
    Complement,
    /// Shift left by the value itself.
    LeftShift,
    /// Shift right by the value itself.
    RightShift,
    /// Xor with the threshold.
    ExclusiveOr,
    /// Xor with the value itself, i.e. clear it.
    ExclusiveOrSelf,
}

impl ChannelEffect {
    /// Apply the effect to `value` if it is strictly above `threshold`.
    ///
    /// Shift amounts are taken modulo 32 on a widened value and the result
    /// truncated back to a byte.
    pub fn apply(self, value: u8, threshold: u8) -> u8 {
        if value <= threshold {
            return value;
        }
        let wide = u32::from(value);
        let shift = wide & 31;
        match self {
            Self::Complement => !value,
            Self::LeftShift => (wide << shift) as u8,
            Self::RightShift => (wide >> shift) as u8,
            Self::ExclusiveOr => value ^ threshold,
            Self::ExclusiveOrSelf => 0,
        }
    }
}

/// Image dimensions in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageSize {
    /// Pixels per row.
    pub width: u32,
    /// Number of rows.
    pub height: u32,
}

impl ImageSize {
    /// Number of pixels.
    pub fn pixels(self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// Clamp a requested line skip to one of the supported values 1, 2 or 4.
pub fn normalize_line_skip(requested: u32) -> u32 {
    match requested {
        0 | 1 => 1,
        2 | 3 => 2,
        _ => 4,
    }
}

/// Parameters of a three-channel effect pass.
#[derive(Clone, Debug)]
pub struct ChannelParams {
    /// The effect applied to every channel.
    pub effect: ChannelEffect,
    /// Per-channel thresholds; `a` is ignored.
    pub thresholds: Rgba32,
    /// Requested line skip, normalised with [`normalize_line_skip`].
    pub line_skip: u32,
    /// Image dimensions.
    pub size: ImageSize,
    /// Pixels per batch.
    pub batch_width: usize,
}

impl ChannelParams {
    /// Default pixels per batch.
    pub const DEFAULT_BATCH_WIDTH: usize = 256;

    /// An effect with no line skip and the default batch width.
    pub fn new(effect: ChannelEffect, thresholds: Rgba32, size: ImageSize) -> Self {
        Self {
            effect,
            thresholds,
            line_skip: 1,
            size,
            batch_width: Self::DEFAULT_BATCH_WIDTH,
        }
    }
}

/// How the three channel tasks of one pass relate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelOrder {
    /// Green after red, blue after green.
    Chained,
    /// All three after the same prerequisites.
    Concurrent,
}

/// Build one task applying `effect` to `channel` of every pixel.
///
/// With a line skip above 1, pixel `i` is processed only when
/// `i % height < width / line_skip`.
pub fn channel_task(
    pixels: &Buffer<Rgba32>,
    channel: Channel,
    threshold: u8,
    params: &ChannelParams,
) -> Result<Task, BufferError> {
    let view = pixels.field_view::<u8>(channel.byte_offset(), AccessMode::ReadWrite)?;
    let effect = params.effect;
    let label = format!("{effect:?}/{channel:?}");
    let skip = normalize_line_skip(params.line_skip);
    let task = if skip == 1 {
        Task::parallel_for(label, view.len(), view, move |i, v| {
            v.update(i, |x| effect.apply(x, threshold));
        })
    } else {
        let height = params.size.height.max(1) as usize;
        let processed = (params.size.width / skip) as usize;
        Task::parallel_for(label, view.len(), view, move |i, v| {
            if i % height < processed {
                v.update(i, |x| effect.apply(x, threshold));
            }
        })
    };
    Ok(task)
}

/// Schedule the effect on R, G and B of `pixels`, after `prerequisites`.
///
/// Returns a handle that completes once all three channels are done.
pub fn schedule_rgb(
    scheduler: &Scheduler,
    pixels: &Buffer<Rgba32>,
    params: &ChannelParams,
    order: ChannelOrder,
    prerequisites: &[TaskHandle],
) -> Result<TaskHandle, ScheduleError> {
    let mut handles = Vec::with_capacity(Channel::ALL.len());
    for channel in Channel::ALL {
        let task = channel_task(pixels, channel, params.thresholds.channel(channel), params)?;
        let after = match (order, handles.last()) {
            (ChannelOrder::Chained, Some(previous)) => std::slice::from_ref(previous),
            _ => prerequisites,
        };
        let handle = scheduler.schedule(task, params.batch_width, after)?;
        handles.push(handle);
    }
    tracing::trace!(effect = ?params.effect, ?order, skip = normalize_line_skip(params.line_skip), "rgb pass scheduled");
    match (order, handles.last()) {
        (ChannelOrder::Chained, Some(last)) => Ok(last.clone()),
        _ => scheduler.combine(&handles),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_at_or_below_threshold_are_untouched() {
        for effect in [
            ChannelEffect::Complement,
            ChannelEffect::LeftShift,
            ChannelEffect::RightShift,
            ChannelEffect::ExclusiveOr,
            ChannelEffect::ExclusiveOrSelf,
        ] {
            assert_eq!(effect.apply(100, 100), 100);
            assert_eq!(effect.apply(3, 200), 3);
        }
    }

    #[test]
    fn effects_above_threshold() {
        assert_eq!(ChannelEffect::Complement.apply(0xF0, 0), 0x0F);
        assert_eq!(ChannelEffect::ExclusiveOr.apply(0b1100, 0b0110), 0b1010);
        assert_eq!(ChannelEffect::ExclusiveOrSelf.apply(77, 10), 0);
        // 3 << 3 = 24; 200 << (200 & 31 = 8) truncates to 0.
        assert_eq!(ChannelEffect::LeftShift.apply(3, 0), 24);
        assert_eq!(ChannelEffect::LeftShift.apply(200, 0), 0);
        // 40 >> 8 = 0; 33 >> 1 = 16.
        assert_eq!(ChannelEffect::RightShift.apply(40, 0), 0);
        assert_eq!(ChannelEffect::RightShift.apply(33, 0), 16);
    }

    #[test]
    fn line_skip_is_normalised() {
        let got: Vec<u32> = (0..7).map(normalize_line_skip).collect();
        assert_eq!(got, vec![1, 1, 2, 2, 4, 4, 4]);
    }
}
