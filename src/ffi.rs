// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Flat `extern "C"` entry points of the in-process backend.
//!
//! The engine is reached through an opaque [`EngineHandle`] pointer. Requests
//! and replies cross the boundary as `bincode` frames of
//! [`crate::protocol::Request`] and [`crate::protocol::Reply`]; a failure is
//! reported through the return code with a framed
//! [`crate::errors::DpfError`] in the out-params. Panics never unwind across
//! the boundary.
//!
//! ```text
//! dpf_engine_new ─► dpf_call* ─► dpf_buffer_free (each reply) ─► dpf_engine_free
//! ```

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::ptr::{self, NonNull};

use crate::engine::{Engine, EngineOptions};
use crate::errors::{DpfError, ErrorKind, Result};
use crate::protocol::{Reply, Request, SessionId};

/// The reply frame holds a `Reply`.
pub const DPF_OK: i32 = 0;
/// The reply frame holds a `DpfError`.
pub const DPF_ERROR: i32 = 1;
/// Null handle or out-params; nothing was written.
pub const DPF_INVALID_ARGUMENT: i32 = -1;

/// Opaque engine owned by the caller of [`dpf_engine_new`].
pub struct EngineHandle {
    engine: Engine,
}

fn into_buffer(frame: Vec<u8>) -> (*mut u8, usize) {
    let len = frame.len();
    let raw = Box::into_raw(frame.into_boxed_slice());
    (raw as *mut u8, len)
}

fn panic_error(payload: Box<dyn std::any::Any + Send>) -> DpfError {
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    DpfError::new(ErrorKind::EvaluationFailed, format!("backend panicked: {detail}"))
}

/// Create an engine from a `bincode` frame of [`EngineOptions`], or with
/// default options when `options` is null.
///
/// Returns null when the options cannot be decoded.
///
/// # Safety
/// `options` must be null or point to `options_len` readable bytes.
#[no_mangle]
pub unsafe extern "C" fn dpf_engine_new(options: *const u8, options_len: usize) -> *mut EngineHandle {
    let options = if options.is_null() {
        EngineOptions::default()
    } else {
        let frame = std::slice::from_raw_parts(options, options_len);
        match bincode::deserialize::<EngineOptions>(frame) {
            Ok(options) => options,
            Err(err) => {
                tracing::error!(error = %err, "cannot decode engine options");
                return ptr::null_mut();
            }
        }
    };
    match catch_unwind(|| Engine::new(options)) {
        Ok(engine) => Box::into_raw(Box::new(EngineHandle { engine })),
        Err(_) => ptr::null_mut(),
    }
}

/// Close every session and free the engine.
///
/// # Safety
/// `handle` must come from [`dpf_engine_new`] and not be used afterwards.
#[no_mangle]
pub unsafe extern "C" fn dpf_engine_free(handle: *mut EngineHandle) {
    if !handle.is_null() {
        drop(Box::from_raw(handle));
    }
}

/// Answer one request frame on behalf of `session`.
///
/// On [`DPF_OK`] or [`DPF_ERROR`] a newly allocated frame is written to
/// `out`/`out_len`; release it with [`dpf_buffer_free`].
///
/// # Safety
/// `handle` must be a live engine, `request` must point to `request_len`
/// readable bytes, and `out`/`out_len` must be writable.
#[no_mangle]
pub unsafe extern "C" fn dpf_call(
    handle: *const EngineHandle,
    session: u64,
    request: *const u8,
    request_len: usize,
    out: *mut *mut u8,
    out_len: *mut usize,
) -> i32 {
    if handle.is_null() || request.is_null() || out.is_null() || out_len.is_null() {
        return DPF_INVALID_ARGUMENT;
    }
    let engine = &(*handle).engine;
    let frame = std::slice::from_raw_parts(request, request_len);

    let outcome = catch_unwind(AssertUnwindSafe(|| -> Result<Reply> {
        let request: Request = bincode::deserialize(frame)?;
        engine.handle(session, request)
    }))
    .unwrap_or_else(|payload| Err(panic_error(payload)));

    let (code, encoded) = match outcome {
        Ok(reply) => (DPF_OK, bincode::serialize(&reply)),
        Err(error) => (DPF_ERROR, bincode::serialize(&error)),
    };
    let encoded = match encoded {
        Ok(bytes) => bytes,
        Err(err) => {
            let error = DpfError::transport(format!("cannot encode reply: {err}"));
            match bincode::serialize(&error) {
                Ok(bytes) => return write_out(DPF_ERROR, bytes, out, out_len),
                Err(_) => return DPF_INVALID_ARGUMENT,
            }
        }
    };
    write_out(code, encoded, out, out_len)
}

unsafe fn write_out(code: i32, frame: Vec<u8>, out: *mut *mut u8, out_len: *mut usize) -> i32 {
    let (ptr, len) = into_buffer(frame);
    *out = ptr;
    *out_len = len;
    code
}

/// Free a frame written by [`dpf_call`].
///
/// # Safety
/// `ptr`/`len` must be exactly what [`dpf_call`] wrote, freed once.
#[no_mangle]
pub unsafe extern "C" fn dpf_buffer_free(ptr: *mut u8, len: usize) {
    if !ptr.is_null() {
        drop(Box::from_raw(ptr::slice_from_raw_parts_mut(ptr, len)));
    }
}

/// Owning Rust view of an engine behind the C entry points.
pub(crate) struct FfiEngine {
    handle: NonNull<EngineHandle>,
}

// The engine synchronizes its own state; the pointer is only freed on drop.
unsafe impl Send for FfiEngine {}
unsafe impl Sync for FfiEngine {}

impl FfiEngine {
    pub fn new(options: &EngineOptions) -> Result<Self> {
        let frame = bincode::serialize(options)?;
        let raw = unsafe { dpf_engine_new(frame.as_ptr(), frame.len()) };
        NonNull::new(raw)
            .map(|handle| Self { handle })
            .ok_or_else(|| DpfError::transport("in-process engine could not be created"))
    }

    pub fn call(&self, session: SessionId, request: &Request) -> Result<Reply> {
        let frame = bincode::serialize(request)?;
        let mut out: *mut u8 = ptr::null_mut();
        let mut out_len = 0usize;
        let code = unsafe {
            dpf_call(
                self.handle.as_ptr(),
                session,
                frame.as_ptr(),
                frame.len(),
                &mut out,
                &mut out_len,
            )
        };
        if code == DPF_INVALID_ARGUMENT {
            return Err(DpfError::transport("in-process call rejected its arguments"));
        }
        let reply = unsafe { std::slice::from_raw_parts(out, out_len) }.to_vec();
        unsafe { dpf_buffer_free(out, out_len) };
        if code == DPF_OK {
            Ok(bincode::deserialize::<Reply>(&reply)?)
        } else {
            Err(bincode::deserialize::<DpfError>(&reply)?)
        }
    }
}

impl Drop for FfiEngine {
    fn drop(&mut self) {
        unsafe { dpf_engine_free(self.handle.as_ptr()) };
    }
}
