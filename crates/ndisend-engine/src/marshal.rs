//! Frame descriptor marshalling.
//!
//! Converts host objects into typed sender configurations and frame
//! descriptors. Every field is checked for presence and type; only the
//! timecode and the sender's clocking flags have defaults. Buffers are
//! borrowed, never copied.

use bytes::Bytes;

use ndisend_host::{HostType, HostValue};
use ndisend_sdk::{
    AudioFourCc, AudioFrame, FrameFormat, VideoFourCc, VideoFrame, TIMECODE_SYNTHESIZE,
};

use crate::config::SenderConfig;
use crate::error::SendError;
use crate::SendResult;

/// Default frame rate for typed descriptors (29.97).
const DEFAULT_FRAME_RATE: (i32, i32) = (30000, 1001);

/// One outbound video frame.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoFrameDescriptor {
    pub xres: i32,
    pub yres: i32,
    pub frame_rate_n: i32,
    pub frame_rate_d: i32,

    /// Picture aspect ratio (0 lets the receiver use xres/yres).
    pub picture_aspect_ratio: f32,

    /// Timecode in 100ns units, or [`TIMECODE_SYNTHESIZE`].
    pub timecode: i64,

    pub frame_format: FrameFormat,

    /// Bytes per line of the first plane (0 for tightly packed).
    pub line_stride_bytes: i32,

    /// Caller-owned pixel data.
    pub data: Bytes,

    pub fourcc: VideoFourCc,
}

impl VideoFrameDescriptor {
    /// Create a progressive 29.97 frame with packed lines and a synthesized
    /// timecode.
    pub fn new(xres: i32, yres: i32, fourcc: VideoFourCc, data: Bytes) -> Self {
        let stride = fourcc.packed_line_stride(usize::try_from(xres).unwrap_or(0));
        Self {
            xres,
            yres,
            frame_rate_n: DEFAULT_FRAME_RATE.0,
            frame_rate_d: DEFAULT_FRAME_RATE.1,
            picture_aspect_ratio: if yres > 0 {
                xres as f32 / yres as f32
            } else {
                0.0
            },
            timecode: TIMECODE_SYNTHESIZE,
            frame_format: FrameFormat::Progressive,
            line_stride_bytes: i32::try_from(stride).unwrap_or(0),
            data,
            fourcc,
        }
    }

    /// Set the frame rate.
    pub fn with_frame_rate(mut self, numerator: i32, denominator: i32) -> Self {
        self.frame_rate_n = numerator;
        self.frame_rate_d = denominator;
        self
    }

    /// Set the line stride.
    pub fn with_line_stride(mut self, line_stride_bytes: i32) -> Self {
        self.line_stride_bytes = line_stride_bytes;
        self
    }

    /// Set an explicit timecode.
    pub fn with_timecode(mut self, timecode: i64) -> Self {
        self.timecode = timecode;
        self
    }

    /// Set the field layout.
    pub fn with_frame_format(mut self, frame_format: FrameFormat) -> Self {
        self.frame_format = frame_format;
        self
    }

    /// Line stride used for the buffer size check.
    pub fn effective_line_stride(&self) -> usize {
        match usize::try_from(self.line_stride_bytes) {
            Ok(0) | Err(_) => self
                .fourcc
                .packed_line_stride(usize::try_from(self.xres).unwrap_or(0)),
            Ok(stride) => stride,
        }
    }

    /// Bytes the SDK will read for this frame.
    pub fn required_len(&self) -> usize {
        self.fourcc.min_buffer_len(
            self.effective_line_stride(),
            usize::try_from(self.xres).unwrap_or(0),
            usize::try_from(self.yres).unwrap_or(0),
        )
    }

    /// Check value ranges and the buffer size.
    pub fn validate(&self) -> SendResult<()> {
        positive("xres", self.xres)?;
        positive("yres", self.yres)?;
        positive("frameRateN", self.frame_rate_n)?;
        positive("frameRateD", self.frame_rate_d)?;
        if !self.picture_aspect_ratio.is_finite() || self.picture_aspect_ratio < 0.0 {
            return Err(SendError::InvalidFieldType {
                field: "pictureAspectRatio",
                expected: "a finite non-negative number",
            });
        }
        // Each line is read in full from its start, whatever the stride.
        let packed = self.fourcc.packed_line_stride(self.xres as usize);
        if self.line_stride_bytes < 0
            || (self.line_stride_bytes > 0 && (self.line_stride_bytes as usize) < packed)
        {
            return Err(SendError::InvalidFieldType {
                field: "lineStrideBytes",
                expected: "0 or at least the bytes of one packed line",
            });
        }

        let required = self.required_len();
        if self.data.len() < required {
            return Err(SendError::BufferTooSmall {
                field: "data",
                required,
                actual: self.data.len(),
            });
        }
        Ok(())
    }

    /// Borrow `data` as a native frame with this descriptor's parameters.
    pub fn to_native<'a>(&self, data: &'a [u8]) -> VideoFrame<'a> {
        VideoFrame {
            xres: self.xres,
            yres: self.yres,
            fourcc: self.fourcc,
            frame_rate_n: self.frame_rate_n,
            frame_rate_d: self.frame_rate_d,
            picture_aspect_ratio: self.picture_aspect_ratio,
            frame_format: self.frame_format,
            timecode: self.timecode,
            line_stride_bytes: self.line_stride_bytes,
            data,
        }
    }
}

/// One outbound audio frame.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrameDescriptor {
    pub sample_rate: i32,
    pub no_channels: i32,
    pub no_samples: i32,

    /// Timecode in 100ns units, or [`TIMECODE_SYNTHESIZE`].
    pub timecode: i64,

    /// Bytes between channel planes (0 for tightly packed).
    pub channel_stride_bytes: i32,

    /// Caller-owned sample data.
    pub data: Bytes,

    pub fourcc: AudioFourCc,
}

impl AudioFrameDescriptor {
    /// Create a planar float frame with packed channels and a synthesized
    /// timecode.
    pub fn new(sample_rate: i32, no_channels: i32, no_samples: i32, data: Bytes) -> Self {
        let fourcc = AudioFourCc::Fltp;
        let stride = usize::try_from(no_samples).unwrap_or(0) * fourcc.sample_size();
        Self {
            sample_rate,
            no_channels,
            no_samples,
            timecode: TIMECODE_SYNTHESIZE,
            channel_stride_bytes: i32::try_from(stride).unwrap_or(0),
            data,
            fourcc,
        }
    }

    /// Set an explicit timecode.
    pub fn with_timecode(mut self, timecode: i64) -> Self {
        self.timecode = timecode;
        self
    }

    /// Channel stride used for the buffer size check.
    pub fn effective_channel_stride(&self) -> usize {
        match usize::try_from(self.channel_stride_bytes) {
            Ok(0) | Err(_) => {
                usize::try_from(self.no_samples).unwrap_or(0) * self.fourcc.sample_size()
            }
            Ok(stride) => stride,
        }
    }

    /// Bytes the SDK will read for this frame.
    pub fn required_len(&self) -> usize {
        self.fourcc.min_buffer_len(
            self.effective_channel_stride(),
            usize::try_from(self.no_channels).unwrap_or(0),
        )
    }

    /// Check value ranges and the buffer size.
    pub fn validate(&self) -> SendResult<()> {
        positive("sampleRate", self.sample_rate)?;
        positive("noChannels", self.no_channels)?;
        positive("noSamples", self.no_samples)?;
        let packed = self.no_samples as usize * self.fourcc.sample_size();
        if self.channel_stride_bytes < 0
            || (self.channel_stride_bytes > 0 && (self.channel_stride_bytes as usize) < packed)
        {
            return Err(SendError::InvalidFieldType {
                field: "channelStrideBytes",
                expected: "0 or at least the bytes of one channel",
            });
        }

        let required = self.required_len();
        if self.data.len() < required {
            return Err(SendError::BufferTooSmall {
                field: "data",
                required,
                actual: self.data.len(),
            });
        }
        Ok(())
    }

    /// Borrow `data` as a native frame with this descriptor's parameters.
    pub fn to_native<'a>(&self, data: &'a [u8]) -> AudioFrame<'a> {
        AudioFrame {
            sample_rate: self.sample_rate,
            no_channels: self.no_channels,
            no_samples: self.no_samples,
            timecode: self.timecode,
            fourcc: self.fourcc,
            channel_stride_bytes: self.channel_stride_bytes,
            data,
        }
    }
}

/// Parse a sender configuration object.
pub fn sender_config(value: &HostValue) -> SendResult<SenderConfig> {
    expect_object(
        value,
        "Sender must be created with an object containing at least a 'name' property.",
        "Single argument must be an object, not an array, containing at least a 'name' property.",
    )?;

    let name = match required(value, "name")? {
        HostValue::String(name) => name.clone(),
        _ => {
            return Err(SendError::InvalidFieldType {
                field: "name",
                expected: "a string",
            })
        }
    };

    let config = SenderConfig {
        name,
        groups: optional_string(value, "groups")?,
        clock_video: optional_bool(value, "clockVideo")?,
        clock_audio: optional_bool(value, "clockAudio")?,
    };
    config.validate()?;
    Ok(config)
}

/// Parse a video frame object.
pub fn video_frame(value: &HostValue) -> SendResult<VideoFrameDescriptor> {
    expect_object(
        value,
        "frame must be an object",
        "Argument to video send cannot be an array.",
    )?;

    let xres = int32(value, "xres")?;
    let yres = int32(value, "yres")?;
    let frame_rate_n = int32(value, "frameRateN")?;
    let frame_rate_d = int32(value, "frameRateD")?;
    let picture_aspect_ratio = float32(value, "pictureAspectRatio")?;
    let timecode = timecode(value)?;

    let format_value = int32(value, "frameFormatType")?;
    let frame_format =
        FrameFormat::from_value(format_value).ok_or(SendError::InvalidFieldType {
            field: "frameFormatType",
            expected: "a frame format type (0-3)",
        })?;

    let line_stride_bytes = int32(value, "lineStrideBytes")?;
    let data = buffer(value, "data")?;

    let code = fourcc_code(value)?;
    let fourcc = VideoFourCc::from_code(code).ok_or(SendError::InvalidFieldType {
        field: "fourCC",
        expected: "a supported video FourCC code",
    })?;

    let frame = VideoFrameDescriptor {
        xres,
        yres,
        frame_rate_n,
        frame_rate_d,
        picture_aspect_ratio,
        timecode,
        frame_format,
        line_stride_bytes,
        data,
        fourcc,
    };
    frame.validate()?;
    Ok(frame)
}

/// Parse an audio frame object.
pub fn audio_frame(value: &HostValue) -> SendResult<AudioFrameDescriptor> {
    expect_object(
        value,
        "frame must be an object",
        "Argument to audio send cannot be an array.",
    )?;

    let sample_rate = int32(value, "sampleRate")?;
    let no_channels = int32(value, "noChannels")?;
    let no_samples = int32(value, "noSamples")?;
    let timecode = timecode(value)?;
    let channel_stride_bytes = int32(value, "channelStrideBytes")?;
    let data = buffer(value, "data")?;

    let code = fourcc_code(value)?;
    let fourcc = AudioFourCc::from_code(code).ok_or(SendError::InvalidFieldType {
        field: "fourCC",
        expected: "a supported audio FourCC code",
    })?;

    let frame = AudioFrameDescriptor {
        sample_rate,
        no_channels,
        no_samples,
        timecode,
        channel_stride_bytes,
        data,
        fourcc,
    };
    frame.validate()?;
    Ok(frame)
}

fn expect_object(value: &HostValue, not_object: &str, is_array: &str) -> SendResult<()> {
    match value.host_type() {
        HostType::Object => Ok(()),
        HostType::Array => Err(SendError::InvalidArgs(is_array.to_string())),
        _ => Err(SendError::InvalidArgs(not_object.to_string())),
    }
}

fn required<'a>(value: &'a HostValue, field: &'static str) -> SendResult<&'a HostValue> {
    let param = value.get(field);
    if param.is_undefined() {
        return Err(SendError::MissingField { field });
    }
    Ok(param)
}

fn int32(value: &HostValue, field: &'static str) -> SendResult<i32> {
    let wrong_type = SendError::InvalidFieldType {
        field,
        expected: "an integer number",
    };
    match required(value, field)? {
        HostValue::Number(n)
            if n.is_finite()
                && n.fract() == 0.0
                && *n >= f64::from(i32::MIN)
                && *n <= f64::from(i32::MAX) =>
        {
            Ok(*n as i32)
        }
        _ => Err(wrong_type),
    }
}

fn float32(value: &HostValue, field: &'static str) -> SendResult<f32> {
    match required(value, field)? {
        HostValue::Number(n) if n.is_finite() => Ok(*n as f32),
        _ => Err(SendError::InvalidFieldType {
            field,
            expected: "a finite number",
        }),
    }
}

/// 2^63 as a double; integral doubles below it convert to i64 exactly.
const I64_BOUND: f64 = 9_223_372_036_854_775_808.0;

fn timecode(value: &HostValue) -> SendResult<i64> {
    let wrong_type = SendError::InvalidFieldType {
        field: "timecode",
        expected: "an integer number or bigint",
    };
    match value.get("timecode") {
        HostValue::Undefined => Ok(TIMECODE_SYNTHESIZE),
        HostValue::BigInt(tc) => Ok(*tc),
        HostValue::Number(n) if n.fract() == 0.0 && *n >= -I64_BOUND && *n < I64_BOUND => {
            Ok(*n as i64)
        }
        _ => Err(wrong_type),
    }
}

fn fourcc_code(value: &HostValue) -> SendResult<u32> {
    match required(value, "fourCC")? {
        HostValue::Number(n) if n.fract() == 0.0 && *n >= 0.0 && *n <= f64::from(u32::MAX) => {
            Ok(*n as u32)
        }
        _ => Err(SendError::InvalidFieldType {
            field: "fourCC",
            expected: "a FourCC code number",
        }),
    }
}

fn buffer(value: &HostValue, field: &'static str) -> SendResult<Bytes> {
    match value.get(field) {
        HostValue::Buffer(data) => Ok(data.clone()),
        _ => Err(SendError::InvalidBufferType { field }),
    }
}

fn optional_bool(value: &HostValue, field: &'static str) -> SendResult<Option<bool>> {
    match value.get(field) {
        HostValue::Undefined => Ok(None),
        HostValue::Bool(b) => Ok(Some(*b)),
        _ => Err(SendError::InvalidFieldType {
            field,
            expected: "a boolean",
        }),
    }
}

fn optional_string(value: &HostValue, field: &'static str) -> SendResult<Option<String>> {
    match value.get(field) {
        HostValue::Undefined => Ok(None),
        HostValue::String(s) => Ok(Some(s.clone())),
        _ => Err(SendError::InvalidFieldType {
            field,
            expected: "a string",
        }),
    }
}

fn positive(field: &'static str, value: i32) -> SendResult<()> {
    if value <= 0 {
        return Err(SendError::InvalidFieldType {
            field,
            expected: "a positive integer",
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn hd_frame() -> HostValue {
        HostValue::object([
            ("xres", HostValue::from(1920)),
            ("yres", HostValue::from(1080)),
            ("frameRateN", HostValue::from(30000)),
            ("frameRateD", HostValue::from(1001)),
            ("pictureAspectRatio", HostValue::from(1.7778)),
            ("frameFormatType", HostValue::from(1)),
            ("lineStrideBytes", HostValue::from(7680)),
            ("fourCC", HostValue::from(VideoFourCc::Bgra.code())),
            ("data", HostValue::from(vec![0u8; 7680 * 1080])),
        ])
    }

    fn stereo_frame() -> HostValue {
        HostValue::object([
            ("sampleRate", HostValue::from(48000)),
            ("noChannels", HostValue::from(2)),
            ("noSamples", HostValue::from(1600)),
            ("channelStrideBytes", HostValue::from(6400)),
            ("fourCC", HostValue::from(AudioFourCc::Fltp.code())),
            ("data", HostValue::from(vec![0u8; 12_800])),
        ])
    }

    #[test]
    fn test_video_frame_parsed() {
        let frame = video_frame(&hd_frame()).unwrap();
        assert_eq!(frame.xres, 1920);
        assert_eq!(frame.yres, 1080);
        assert_eq!(frame.frame_rate_n, 30000);
        assert_eq!(frame.frame_rate_d, 1001);
        assert!((frame.picture_aspect_ratio - 1.7778).abs() < 1e-6);
        assert_eq!(frame.frame_format, FrameFormat::Progressive);
        assert_eq!(frame.fourcc, VideoFourCc::Bgra);
        assert_eq!(frame.timecode, TIMECODE_SYNTHESIZE);
        assert_eq!(frame.data.len(), 7680 * 1080);
    }

    #[test]
    fn test_video_buffer_is_borrowed() {
        let data = Bytes::from(vec![1u8; 7680 * 1080]);
        let frame = video_frame(&hd_frame().with("data", data.clone())).unwrap();
        assert_eq!(frame.data.as_ptr(), data.as_ptr());
    }

    #[test]
    fn test_missing_field_is_named() {
        let err = video_frame(&hd_frame().without("yres")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingField);
        assert_eq!(err.field(), Some("yres"));
        assert!(err.to_string().contains("yres"));
    }

    #[test]
    fn test_wrong_type_is_named() {
        let err = video_frame(&hd_frame().with("frameRateN", "30000")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidFieldType);
        assert_eq!(err.field(), Some("frameRateN"));

        let err = video_frame(&hd_frame().with("xres", 1920.5)).unwrap_err();
        assert_eq!(err.field(), Some("xres"));
    }

    #[test]
    fn test_first_bad_field_wins() {
        let frame = hd_frame().without("xres").without("yres");
        assert_eq!(video_frame(&frame).unwrap_err().field(), Some("xres"));
    }

    #[test]
    fn test_buffer_must_be_bytes() {
        let err = video_frame(&hd_frame().with("data", "pixels")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidBufferType);

        let err = video_frame(&hd_frame().without("data")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidBufferType);
    }

    #[test]
    fn test_short_buffer_rejected() {
        let err = video_frame(&hd_frame().with("data", vec![0u8; 100])).unwrap_err();
        match err {
            SendError::BufferTooSmall {
                field,
                required,
                actual,
            } => {
                assert_eq!(field, "data");
                assert_eq!(required, 7680 * 1080);
                assert_eq!(actual, 100);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_stride_shorter_than_line_rejected() {
        let frame = hd_frame()
            .with("lineStrideBytes", 4)
            .with("data", vec![0u8; 4320]);
        let err = video_frame(&frame).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidFieldType);
        assert_eq!(err.field(), Some("lineStrideBytes"));

        let err = video_frame(&hd_frame().with("lineStrideBytes", 7679)).unwrap_err();
        assert_eq!(err.field(), Some("lineStrideBytes"));

        let padded = hd_frame()
            .with("lineStrideBytes", 8192)
            .with("data", vec![0u8; 8192 * 1080]);
        assert!(video_frame(&padded).is_ok());

        let packed = hd_frame().with("lineStrideBytes", 0);
        assert_eq!(video_frame(&packed).unwrap().required_len(), 7680 * 1080);
    }

    #[test]
    fn test_stride_shorter_than_channel_rejected() {
        let frame = stereo_frame()
            .with("channelStrideBytes", 4)
            .with("data", vec![0u8; 8]);
        let err = audio_frame(&frame).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidFieldType);
        assert_eq!(err.field(), Some("channelStrideBytes"));

        let typed = AudioFrameDescriptor::new(48000, 2, 480, Bytes::from(vec![0u8; 3840]));
        let err = AudioFrameDescriptor {
            channel_stride_bytes: 1919,
            ..typed
        }
        .validate()
        .unwrap_err();
        assert_eq!(err.field(), Some("channelStrideBytes"));
    }

    #[test]
    fn test_timecode_number_or_bigint() {
        let frame = video_frame(&hd_frame().with("timecode", 1_000_000)).unwrap();
        assert_eq!(frame.timecode, 1_000_000);

        let frame = video_frame(&hd_frame().with("timecode", HostValue::bigint(i64::MIN))).unwrap();
        assert_eq!(frame.timecode, i64::MIN);

        let err = video_frame(&hd_frame().with("timecode", "now")).unwrap_err();
        assert_eq!(err.field(), Some("timecode"));
    }

    #[test]
    fn test_unknown_codes_rejected() {
        let err = video_frame(&hd_frame().with("fourCC", 1234)).unwrap_err();
        assert_eq!(err.field(), Some("fourCC"));

        let err = video_frame(&hd_frame().with("frameFormatType", 7)).unwrap_err();
        assert_eq!(err.field(), Some("frameFormatType"));
    }

    #[test]
    fn test_non_positive_resolution_rejected() {
        let err = video_frame(&hd_frame().with("xres", 0)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidFieldType);
        assert_eq!(err.field(), Some("xres"));
    }

    #[test]
    fn test_frame_shape_errors() {
        let err = video_frame(&HostValue::Array(vec![])).unwrap_err();
        assert!(matches!(err, SendError::InvalidArgs(ref m) if m.contains("array")));

        let err = audio_frame(&HostValue::from(5)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgs);
    }

    #[test]
    fn test_audio_frame_parsed() {
        let frame = audio_frame(&stereo_frame()).unwrap();
        assert_eq!(frame.sample_rate, 48000);
        assert_eq!(frame.no_channels, 2);
        assert_eq!(frame.no_samples, 1600);
        assert_eq!(frame.fourcc, AudioFourCc::Fltp);
        assert_eq!(frame.timecode, TIMECODE_SYNTHESIZE);
    }

    #[test]
    fn test_audio_missing_and_short() {
        let err = audio_frame(&stereo_frame().without("noSamples")).unwrap_err();
        assert_eq!(err.field(), Some("noSamples"));

        let err = audio_frame(&stereo_frame().with("data", vec![0u8; 6400])).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BufferTooSmall);
    }

    #[test]
    fn test_sender_config_parsed() {
        let config = sender_config(&HostValue::object([
            ("name", HostValue::from("Studio")),
            ("clockVideo", HostValue::from(false)),
        ]))
        .unwrap();
        assert_eq!(config.name, "Studio");
        assert_eq!(config.clock_video, Some(false));
        assert_eq!(config.clock_audio, None);
    }

    #[test]
    fn test_sender_config_errors() {
        let err = sender_config(&HostValue::object([("clockVideo", true)])).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingField);
        assert_eq!(err.field(), Some("name"));

        let err = sender_config(&HostValue::object([("name", 5)])).unwrap_err();
        assert_eq!(err.field(), Some("name"));

        let err = sender_config(&HostValue::object([
            ("name", HostValue::from("Studio")),
            ("clockAudio", HostValue::from("yes")),
        ]))
        .unwrap_err();
        assert_eq!(err.field(), Some("clockAudio"));

        let err = sender_config(&HostValue::Array(vec![])).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgs);
    }

    #[test]
    fn test_typed_descriptor_defaults() {
        let frame = VideoFrameDescriptor::new(
            1280,
            720,
            VideoFourCc::Uyvy,
            Bytes::from(vec![0u8; 2560 * 720]),
        );
        assert_eq!(frame.line_stride_bytes, 2560);
        assert_eq!(frame.timecode, TIMECODE_SYNTHESIZE);
        assert!(frame.validate().is_ok());

        let audio = AudioFrameDescriptor::new(48000, 2, 480, Bytes::from(vec![0u8; 3840]));
        assert_eq!(audio.channel_stride_bytes, 1920);
        assert!(audio.validate().is_ok());
    }
}
