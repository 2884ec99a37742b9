//! WAV files as audio inputs
//!
//! A device id names a file `<dir>/<id>.wav`; the decoded samples back a
//! single audio track. Useful for scripted sessions where no microphone
//! exists.

use super::{AudioTrack, MediaDevices, MediaSource};
use crate::error::MediaError;
use anyhow::{Context, Result};
use hound::WavReader;
use std::path::{Path, PathBuf};
use tracing::info;

/// Decoded WAV input
pub struct WavSource {
    pub path: String,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<i16>,
    live: bool,
}

impl WavSource {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening audio input: {}", path.display());

        let reader = WavReader::open(path).context("Failed to open WAV file")?;

        let spec = reader.spec();
        let samples: Vec<i16> = reader
            .into_samples::<i16>()
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to read audio samples")?;

        let duration_seconds =
            samples.len() as f64 / (spec.sample_rate as f64 * spec.channels as f64);

        info!(
            "Audio input loaded: {:.1}s, {}Hz, {} channels",
            duration_seconds, spec.sample_rate, spec.channels
        );

        Ok(Self {
            path: path.display().to_string(),
            duration_seconds,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            samples,
            live: true,
        })
    }
}

impl MediaSource for WavSource {
    fn tracks(&self) -> Vec<AudioTrack> {
        vec![AudioTrack {
            id: format!("wav:{}", self.path),
            label: self.path.clone(),
            sample_rate: self.sample_rate,
            channels: self.channels,
        }]
    }

    fn stop(&mut self) {
        if self.live {
            self.live = false;
            self.samples = Vec::new();
        }
    }

    fn is_live(&self) -> bool {
        self.live
    }
}

/// Directory of WAV files exposed as audio input devices
pub struct WavDevices {
    dir: PathBuf,
    default_device: String,
}

impl WavDevices {
    pub fn new(dir: impl Into<PathBuf>, default_device: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            default_device: default_device.into(),
        }
    }

    fn path_for(&self, device_id: &str) -> PathBuf {
        self.dir.join(format!("{}.wav", device_id))
    }
}

#[async_trait::async_trait]
impl MediaDevices for WavDevices {
    async fn acquire(&self, device_id: Option<&str>) -> Result<Box<dyn MediaSource>, MediaError> {
        let device_id = device_id.unwrap_or(&self.default_device);
        let path = self.path_for(device_id);
        if !path.exists() {
            return Err(MediaError::DeviceUnavailable(device_id.to_string()));
        }

        let source = WavSource::open(&path).map_err(|e| MediaError::Other(format!("{:#}", e)))?;
        Ok(Box::new(source))
    }
}
