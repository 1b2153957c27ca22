//! Raw FFI bindings to the NDI runtime (Processing.NDI.Lib.h).
//!
//! Covers the send subset only. Layouts match the v5/v6 SDK headers.
//!
//! # Safety
//!
//! All functions here are `unsafe extern "C"`. [`NdiSdk`](super::NdiSdk)
//! upholds the handle and pointer lifetime rules.

#![allow(non_camel_case_types, non_snake_case, dead_code)]

use std::ffi::c_void;
use std::os::raw::{c_char, c_float, c_int};

/// Opaque send instance.
pub type NDIlib_send_instance_t = *mut c_void;

pub type NDIlib_FourCC_video_type_e = u32;
pub type NDIlib_FourCC_audio_type_e = u32;
pub type NDIlib_frame_format_type_e = c_int;

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct NDIlib_send_create_t {
    pub p_ndi_name: *const c_char,
    pub p_groups: *const c_char,
    pub clock_video: bool,
    pub clock_audio: bool,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct NDIlib_video_frame_v2_t {
    pub xres: c_int,
    pub yres: c_int,
    pub FourCC: NDIlib_FourCC_video_type_e,
    pub frame_rate_N: c_int,
    pub frame_rate_D: c_int,
    pub picture_aspect_ratio: c_float,
    pub frame_format_type: NDIlib_frame_format_type_e,
    pub timecode: i64,
    pub p_data: *mut u8,
    /// Union with `data_size_in_bytes` for compressed formats.
    pub line_stride_in_bytes: c_int,
    pub p_metadata: *const c_char,
    pub timestamp: i64,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct NDIlib_audio_frame_v3_t {
    pub sample_rate: c_int,
    pub no_channels: c_int,
    pub no_samples: c_int,
    pub timecode: i64,
    pub FourCC: NDIlib_FourCC_audio_type_e,
    pub p_data: *mut u8,
    /// Union with `data_size_in_bytes` for compressed formats.
    pub channel_stride_in_bytes: c_int,
    pub p_metadata: *const c_char,
    pub timestamp: i64,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct NDIlib_tally_t {
    pub on_program: bool,
    pub on_preview: bool,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct NDIlib_source_t {
    pub p_ndi_name: *const c_char,
    /// Union with `p_ip_address`.
    pub p_url_address: *const c_char,
}

#[cfg_attr(
    all(windows, target_pointer_width = "64"),
    link(name = "Processing.NDI.Lib.x64")
)]
#[cfg_attr(
    all(windows, target_pointer_width = "32"),
    link(name = "Processing.NDI.Lib.x86")
)]
#[cfg_attr(not(windows), link(name = "ndi"))]
extern "C" {
    pub fn NDIlib_initialize() -> bool;
    pub fn NDIlib_destroy();

    pub fn NDIlib_send_create(p_create_settings: *const NDIlib_send_create_t)
        -> NDIlib_send_instance_t;
    pub fn NDIlib_send_destroy(p_instance: NDIlib_send_instance_t);
    pub fn NDIlib_send_send_video_v2(
        p_instance: NDIlib_send_instance_t,
        p_video_data: *const NDIlib_video_frame_v2_t,
    );
    pub fn NDIlib_send_send_audio_v3(
        p_instance: NDIlib_send_instance_t,
        p_audio_data: *const NDIlib_audio_frame_v3_t,
    );
    pub fn NDIlib_send_get_no_connections(
        p_instance: NDIlib_send_instance_t,
        timeout_in_ms: u32,
    ) -> c_int;
    pub fn NDIlib_send_get_tally(
        p_instance: NDIlib_send_instance_t,
        p_tally: *mut NDIlib_tally_t,
        timeout_in_ms: u32,
    ) -> bool;
    pub fn NDIlib_send_get_source_name(p_instance: NDIlib_send_instance_t)
        -> *const NDIlib_source_t;
}
