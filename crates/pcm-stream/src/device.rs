//! Output device discovery and stream configuration on CPAL.

use anyhow::{Context, Result, anyhow};
use cpal::traits::{DeviceTrait, HostTrait};

/// Pick the first output device whose name contains `needle` (case-insensitive),
/// or the host default when `needle` is `None`.
pub fn pick_device(host: &cpal::Host, needle: Option<&str>) -> Result<cpal::Device> {
    if let Some(needle) = needle {
        let mut devices = host.output_devices().context("No output devices")?;
        return devices
            .find(|d| {
                d.description()
                    .ok()
                    .map(|n| matches_device_name(&n.name(), needle))
                    .unwrap_or(false)
            })
            .ok_or_else(|| anyhow!("No output device matched: {needle}"));
    }

    host.default_output_device()
        .ok_or_else(|| anyhow!("No default output device"))
}

/// Find a config that plays `channels` at exactly `sample_rate`.
///
/// The input is raw PCM with no resampling stage, so near matches are refused.
/// Only formats the output can render are considered; earlier entries of
/// [`RENDERABLE_FORMATS`] win.
pub fn pick_output_config(
    device: &cpal::Device,
    channels: u16,
    sample_rate: u32,
) -> Result<cpal::SupportedStreamConfig> {
    let ranges: Vec<cpal::SupportedStreamConfigRange> =
        device.supported_output_configs()?.collect();
    if ranges.is_empty() {
        return Err(anyhow!("No supported output configs"));
    }

    ranges
        .into_iter()
        .filter(|r| {
            r.channels() == channels
                && rate_in_range(r.min_sample_rate(), r.max_sample_rate(), sample_rate)
        })
        .filter_map(|r| render_preference(r.sample_format()).map(|rank| (rank, r)))
        .min_by_key(|(rank, _)| *rank)
        .map(|(_, r)| r.with_sample_rate(sample_rate))
        .ok_or_else(|| anyhow!("Device cannot play {channels} channel(s) at {sample_rate} Hz"))
}

/// Device period no longer than one pool buffer, so every callback can finish
/// at least one buffer's worth of work.
///
/// Returns `None` when the device only supports its default size.
pub fn pick_buffer_size(
    config: &cpal::SupportedStreamConfig,
    buffer_frames: u32,
) -> Option<cpal::BufferSize> {
    match config.buffer_size() {
        cpal::SupportedBufferSize::Range { min, max } => {
            Some(cpal::BufferSize::Fixed(clamp_period(*min, *max, buffer_frames)))
        }
        cpal::SupportedBufferSize::Unknown => None,
    }
}

/// Print available output devices to stdout.
pub fn list_devices(host: &cpal::Host) -> Result<()> {
    let devices = host.output_devices().context("No output devices")?;
    for (i, d) in devices.enumerate() {
        println!("#{i}: {}", d.description()?);
    }
    Ok(())
}

fn rate_in_range(min: u32, max: u32, rate: u32) -> bool {
    min <= rate && rate <= max
}

fn clamp_period(min: u32, max: u32, wanted: u32) -> u32 {
    wanted.max(min).min(max.max(min))
}

/// Device sample types the data callback is built for, best first.
pub(crate) const RENDERABLE_FORMATS: [cpal::SampleFormat; 4] = [
    cpal::SampleFormat::F32,
    cpal::SampleFormat::I32,
    cpal::SampleFormat::I16,
    cpal::SampleFormat::U16,
];

fn render_preference(format: cpal::SampleFormat) -> Option<usize> {
    RENDERABLE_FORMATS.iter().position(|f| *f == format)
}

fn matches_device_name(name: &str, needle: &str) -> bool {
    let needle = needle.trim();
    if needle.is_empty() {
        return false;
    }
    name.to_lowercase().contains(&needle.to_lowercase())
}
