use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Basic technical properties of an audio file as reported by the analysis tool
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AudioInfo {
    /// Seconds
    pub duration: f64,
    /// Hz
    pub samplerate: u32,
    /// Bit depth
    pub bits: u32,
    pub channels: u32,
}

/// Compressed, user-facing derivative of the canonical file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "codec", rename_all = "lowercase")]
pub enum DistributionFormat {
    /// Average bitrate MP3
    Mp3 { bitrate_kbps: u32 },
    /// Vorbis quality level 0-10
    Ogg { quality: u8 },
}

impl DistributionFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            DistributionFormat::Mp3 { .. } => "mp3",
            DistributionFormat::Ogg { .. } => "ogg",
        }
    }
}

impl fmt::Display for DistributionFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DistributionFormat::Mp3 { bitrate_kbps } => write!(f, "mp3@{}k", bitrate_kbps),
            DistributionFormat::Ogg { quality } => write!(f, "ogg@q{}", quality),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversionFormat {
    CanonicalWav,
    Distribution(DistributionFormat),
}

/// Outcome of one converter invocation. The output file belongs to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionResult {
    pub source_path: PathBuf,
    pub output_path: PathBuf,
    pub format: ConversionFormat,
    pub success: bool,
}

/// Container type of an uploaded file, resolved from its extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SoundType {
    Wav,
    Aiff,
    Flac,
    Ogg,
    Mp3,
    M4a,
    Unknown,
}

const SOUND_TYPES: &[(&str, SoundType)] = &[
    ("wav", SoundType::Wav),
    ("wave", SoundType::Wav),
    ("aif", SoundType::Aiff),
    ("aiff", SoundType::Aiff),
    ("flac", SoundType::Flac),
    ("ogg", SoundType::Ogg),
    ("mp3", SoundType::Mp3),
    ("m4a", SoundType::M4a),
];

impl SoundType {
    pub fn from_extension(extension: &str) -> Self {
        let extension = extension.trim_start_matches('.').to_lowercase();
        SOUND_TYPES
            .iter()
            .find(|(ext, _)| *ext == extension)
            .map(|(_, sound_type)| *sound_type)
            .unwrap_or(SoundType::Unknown)
    }

    pub fn from_path(path: &Path) -> Self {
        path.extension()
            .and_then(|e| e.to_str())
            .map(Self::from_extension)
            .unwrap_or(SoundType::Unknown)
    }

    pub fn is_lossy(&self) -> bool {
        matches!(self, SoundType::Mp3 | SoundType::Ogg | SoundType::M4a)
    }
}
