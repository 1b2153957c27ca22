//! Native frame and descriptor types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Timecode value asking the SDK to synthesize one from the wall clock.
pub const TIMECODE_SYNTHESIZE: i64 = i64::MAX;

/// Default for both clocking flags when the caller leaves them unset.
pub const DEFAULT_CLOCKING: bool = true;

const fn fourcc(code: &[u8; 4]) -> u32 {
    (code[0] as u32) | (code[1] as u32) << 8 | (code[2] as u32) << 16 | (code[3] as u32) << 24
}

/// Video pixel layout (FourCC).
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VideoFourCc {
    /// 4:2:2 packed, U0 Y0 V0 Y1.
    Uyvy = fourcc(b"UYVY"),

    /// UYVY followed by an 8-bit alpha plane.
    Uyva = fourcc(b"UYVA"),

    /// 16-bit semi-planar 4:2:2.
    P216 = fourcc(b"P216"),

    /// P216 followed by a 16-bit alpha plane.
    Pa16 = fourcc(b"PA16"),

    /// Planar 4:2:0, V before U.
    Yv12 = fourcc(b"YV12"),

    /// Planar 4:2:0, U before V.
    I420 = fourcc(b"I420"),

    /// Semi-planar 4:2:0.
    Nv12 = fourcc(b"NV12"),

    Bgra = fourcc(b"BGRA"),
    Bgrx = fourcc(b"BGRX"),
    Rgba = fourcc(b"RGBA"),
    Rgbx = fourcc(b"RGBX"),
}

impl VideoFourCc {
    /// All supported layouts.
    pub const ALL: [VideoFourCc; 11] = [
        Self::Uyvy,
        Self::Uyva,
        Self::P216,
        Self::Pa16,
        Self::Yv12,
        Self::I420,
        Self::Nv12,
        Self::Bgra,
        Self::Bgrx,
        Self::Rgba,
        Self::Rgbx,
    ];

    /// Look up a layout by its packed code.
    pub fn from_code(code: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.code() == code)
    }

    /// The packed four-character code.
    pub fn code(self) -> u32 {
        self as u32
    }

    /// Typical line stride for a tightly packed frame of the given width.
    pub fn packed_line_stride(self, xres: usize) -> usize {
        match self {
            Self::Uyvy | Self::Uyva | Self::P216 | Self::Pa16 => xres * 2,
            Self::Yv12 | Self::I420 | Self::Nv12 => xres,
            Self::Bgra | Self::Bgrx | Self::Rgba | Self::Rgbx => xres * 4,
        }
    }

    /// Minimum number of bytes the SDK reads for a frame with this layout.
    pub fn min_buffer_len(self, line_stride: usize, xres: usize, yres: usize) -> usize {
        let plane = line_stride * yres;
        match self {
            Self::Uyvy | Self::Bgra | Self::Bgrx | Self::Rgba | Self::Rgbx => plane,
            // Alpha plane is tightly packed at one byte per pixel.
            Self::Uyva => plane + xres * yres,
            Self::P216 => plane * 2,
            Self::Pa16 => plane * 3,
            Self::Yv12 | Self::I420 | Self::Nv12 => plane + plane / 2,
        }
    }
}

impl fmt::Display for VideoFourCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bytes = self.code().to_le_bytes();
        f.write_str(&String::from_utf8_lossy(&bytes))
    }
}

/// Audio sample layout (FourCC).
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AudioFourCc {
    /// Planar 32-bit float, one plane per channel.
    Fltp = fourcc(b"FLTp"),
}

impl AudioFourCc {
    /// Look up a layout by its packed code.
    pub fn from_code(code: u32) -> Option<Self> {
        (code == Self::Fltp.code()).then_some(Self::Fltp)
    }

    /// The packed four-character code.
    pub fn code(self) -> u32 {
        self as u32
    }

    /// Bytes per sample.
    pub fn sample_size(self) -> usize {
        match self {
            Self::Fltp => 4,
        }
    }

    /// Minimum number of bytes the SDK reads for a frame with this layout.
    pub fn min_buffer_len(self, channel_stride: usize, channels: usize) -> usize {
        match self {
            Self::Fltp => channel_stride * channels,
        }
    }
}

/// Field layout of a video frame.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FrameFormat {
    Interleaved = 0,
    Progressive = 1,
    Field0 = 2,
    Field1 = 3,
}

impl FrameFormat {
    /// Look up a frame format by its SDK value.
    pub fn from_value(value: i32) -> Option<Self> {
        match value {
            0 => Some(Self::Interleaved),
            1 => Some(Self::Progressive),
            2 => Some(Self::Field0),
            3 => Some(Self::Field1),
            _ => None,
        }
    }

    /// SDK value.
    pub fn value(self) -> i32 {
        self as i32
    }
}

/// Parameters for creating a sender.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendCreateDesc {
    /// Sender name advertised for discovery.
    pub ndi_name: String,

    /// Comma separated discovery groups (None for the default group).
    pub groups: Option<String>,

    /// Rate-limit video sends to the frame rate.
    pub clock_video: bool,

    /// Rate-limit audio sends to the sample rate.
    pub clock_audio: bool,
}

impl SendCreateDesc {
    /// Create a descriptor with SDK default clocking.
    pub fn new(ndi_name: impl Into<String>) -> Self {
        Self {
            ndi_name: ndi_name.into(),
            groups: None,
            clock_video: DEFAULT_CLOCKING,
            clock_audio: DEFAULT_CLOCKING,
        }
    }
}

/// Downstream routing state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tally {
    /// A receiver has the source on program (on air).
    pub on_program: bool,

    /// A receiver has the source on preview.
    pub on_preview: bool,
}

/// One outbound video frame, borrowing its pixel data.
#[derive(Debug, Clone, Copy)]
pub struct VideoFrame<'a> {
    pub xres: i32,
    pub yres: i32,
    pub fourcc: VideoFourCc,
    pub frame_rate_n: i32,
    pub frame_rate_d: i32,
    pub picture_aspect_ratio: f32,
    pub frame_format: FrameFormat,

    /// Timecode in 100ns units, or [`TIMECODE_SYNTHESIZE`].
    pub timecode: i64,

    pub line_stride_bytes: i32,
    pub data: &'a [u8],
}

/// One outbound audio frame, borrowing its sample data.
#[derive(Debug, Clone, Copy)]
pub struct AudioFrame<'a> {
    pub sample_rate: i32,
    pub no_channels: i32,
    pub no_samples: i32,

    /// Timecode in 100ns units, or [`TIMECODE_SYNTHESIZE`].
    pub timecode: i64,

    pub fourcc: AudioFourCc,
    pub channel_stride_bytes: i32,
    pub data: &'a [u8],
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fourcc_codes_are_little_endian() {
        assert_eq!(VideoFourCc::Uyvy.code(), 0x5956_5955);
        assert_eq!(VideoFourCc::Bgra.to_string(), "BGRA");
        assert_eq!(AudioFourCc::Fltp.code(), 0x7054_4c46);
    }

    #[test]
    fn test_fourcc_lookup() {
        for format in VideoFourCc::ALL {
            assert_eq!(VideoFourCc::from_code(format.code()), Some(format));
        }
        assert_eq!(VideoFourCc::from_code(0), None);
        assert_eq!(AudioFourCc::from_code(AudioFourCc::Fltp.code()), Some(AudioFourCc::Fltp));
        assert_eq!(AudioFourCc::from_code(1), None);
    }

    #[test]
    fn test_min_buffer_len() {
        assert_eq!(VideoFourCc::Bgra.min_buffer_len(7680, 1920, 1080), 7680 * 1080);
        assert_eq!(VideoFourCc::Uyvy.min_buffer_len(3840, 1920, 1080), 3840 * 1080);
        assert_eq!(VideoFourCc::Nv12.min_buffer_len(1920, 1920, 1080), 1920 * 1080 * 3 / 2);
        assert_eq!(
            VideoFourCc::Uyva.min_buffer_len(3840, 1920, 1080),
            3840 * 1080 + 1920 * 1080
        );
        assert_eq!(AudioFourCc::Fltp.min_buffer_len(1600 * 4, 2), 12_800);
    }

    #[test]
    fn test_frame_format_values() {
        assert_eq!(FrameFormat::from_value(1), Some(FrameFormat::Progressive));
        assert_eq!(FrameFormat::from_value(4), None);
        assert_eq!(FrameFormat::Field1.value(), 3);
    }

    #[test]
    fn test_tally_serializes_camel_case() {
        let tally = Tally {
            on_program: true,
            on_preview: false,
        };
        let json = serde_json::to_value(tally).unwrap();
        assert_eq!(json["onProgram"], true);
        assert_eq!(json["onPreview"], false);
    }
}
