//! Backend driving the vendor NDI runtime.

mod sys;

use std::ffi::{c_void, CStr, CString};
use std::ptr;

use tracing::{debug, info};

use crate::error::SdkError;
use crate::frame::{AudioFrame, SendCreateDesc, Tally, VideoFrame};
use crate::{NativeHandle, SdkResult, SendSdk};

/// [`SendSdk`] backed by the NDI runtime library.
///
/// Initializes the runtime on construction and tears it down on drop; keep
/// it alive for as long as any sender it created.
pub struct NdiSdk {
    _private: (),
}

impl NdiSdk {
    /// Initialize the NDI runtime.
    pub fn new() -> SdkResult<Self> {
        // SAFETY: no preconditions; returns false on unsupported CPUs.
        if !unsafe { sys::NDIlib_initialize() } {
            return Err(SdkError::NotInitialized);
        }
        info!("NDI runtime initialized");
        Ok(Self { _private: () })
    }

    fn instance(handle: NativeHandle) -> sys::NDIlib_send_instance_t {
        handle.as_raw() as *mut c_void
    }
}

impl Drop for NdiSdk {
    fn drop(&mut self) {
        // SAFETY: paired with the successful initialize in `new`.
        unsafe { sys::NDIlib_destroy() };
        debug!("NDI runtime released");
    }
}

fn to_cstring(value: &str) -> SdkResult<CString> {
    CString::new(value).map_err(|_| SdkError::InvalidString(value.to_string()))
}

impl SendSdk for NdiSdk {
    fn create(&self, desc: &SendCreateDesc) -> SdkResult<NativeHandle> {
        let name = to_cstring(&desc.ndi_name)?;
        let groups = desc.groups.as_deref().map(to_cstring).transpose()?;

        let settings = sys::NDIlib_send_create_t {
            p_ndi_name: name.as_ptr(),
            p_groups: groups.as_ref().map_or(ptr::null(), |g| g.as_ptr()),
            clock_video: desc.clock_video,
            clock_audio: desc.clock_audio,
        };

        // SAFETY: `settings` and the strings it points into outlive the call;
        // the SDK copies them.
        let instance = unsafe { sys::NDIlib_send_create(&settings) };
        if instance.is_null() {
            return Err(SdkError::CreateFailed("NDIlib_send_create returned null".into()));
        }
        Ok(NativeHandle::from_raw(instance as usize))
    }

    fn destroy(&self, handle: NativeHandle) {
        // SAFETY: the engine destroys each live handle exactly once.
        unsafe { sys::NDIlib_send_destroy(Self::instance(handle)) };
    }

    fn send_video(&self, handle: NativeHandle, frame: &VideoFrame<'_>) -> SdkResult<()> {
        let raw = sys::NDIlib_video_frame_v2_t {
            xres: frame.xres,
            yres: frame.yres,
            FourCC: frame.fourcc.code(),
            frame_rate_N: frame.frame_rate_n,
            frame_rate_D: frame.frame_rate_d,
            picture_aspect_ratio: frame.picture_aspect_ratio,
            frame_format_type: frame.frame_format.value(),
            timecode: frame.timecode,
            // The SDK only reads from the buffer on send.
            p_data: frame.data.as_ptr() as *mut u8,
            line_stride_in_bytes: frame.line_stride_bytes,
            p_metadata: ptr::null(),
            timestamp: 0,
        };

        // SAFETY: handle is live and `frame.data` outlives this synchronous call.
        unsafe { sys::NDIlib_send_send_video_v2(Self::instance(handle), &raw) };
        Ok(())
    }

    fn send_audio(&self, handle: NativeHandle, frame: &AudioFrame<'_>) -> SdkResult<()> {
        let raw = sys::NDIlib_audio_frame_v3_t {
            sample_rate: frame.sample_rate,
            no_channels: frame.no_channels,
            no_samples: frame.no_samples,
            timecode: frame.timecode,
            FourCC: frame.fourcc.code(),
            p_data: frame.data.as_ptr() as *mut u8,
            channel_stride_in_bytes: frame.channel_stride_bytes,
            p_metadata: ptr::null(),
            timestamp: 0,
        };

        // SAFETY: handle is live and `frame.data` outlives this synchronous call.
        unsafe { sys::NDIlib_send_send_audio_v3(Self::instance(handle), &raw) };
        Ok(())
    }

    fn connection_count(&self, handle: NativeHandle, timeout_ms: u32) -> i32 {
        // SAFETY: handle is live.
        unsafe { sys::NDIlib_send_get_no_connections(Self::instance(handle), timeout_ms) }
    }

    fn tally(&self, handle: NativeHandle, timeout_ms: u32) -> (bool, Tally) {
        let mut raw = sys::NDIlib_tally_t::default();
        // SAFETY: handle is live and `raw` is a valid out pointer.
        let changed =
            unsafe { sys::NDIlib_send_get_tally(Self::instance(handle), &mut raw, timeout_ms) };
        (
            changed,
            Tally {
                on_program: raw.on_program,
                on_preview: raw.on_preview,
            },
        )
    }

    fn source_name(&self, handle: NativeHandle) -> SdkResult<String> {
        // SAFETY: handle is live; the returned source is owned by the
        // instance and valid until it is destroyed.
        unsafe {
            let source = sys::NDIlib_send_get_source_name(Self::instance(handle));
            if source.is_null() || (*source).p_ndi_name.is_null() {
                return Err(SdkError::UnknownHandle(handle.as_raw()));
            }
            Ok(CStr::from_ptr((*source).p_ndi_name)
                .to_string_lossy()
                .into_owned())
        }
    }

    fn name(&self) -> &'static str {
        "ndi"
    }
}
