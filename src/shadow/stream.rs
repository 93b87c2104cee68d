//! Sequential byte stream, in both directions
//!
//! `StreamCallback` + `StreamShadow` expose a Rust stream to foreign callers;
//! `SequentialStream` consumes a foreign one. `MemoryStream` is a ready-made
//! callback backed by a growable buffer.

use super::{dispatch, Callback, ShadowFacet, ShadowInterface, Vtbl};
use crate::abi::{self, BASE_SLOT_COUNT};
use crate::error::{InteropError, Result};
use crate::guid::Guid;
use crate::result::ResultCode;
use core::ffi::c_void;
use core::{mem, slice};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::io::{self, Read, Write};
use std::sync::Arc;

pub const IID_SEQUENTIAL_STREAM: Guid = Guid::from_u128(0x0c733a30_2a1c_11ce_ade5_00aa0044773d);

pub const READ_SLOT: usize = BASE_SLOT_COUNT;
pub const WRITE_SLOT: usize = BASE_SLOT_COUNT + 1;

pub type ReadFn = unsafe extern "system" fn(
    this: *mut c_void,
    buffer: *mut c_void,
    size: u32,
    bytes_read: *mut u32,
) -> i32;

pub type WriteFn = unsafe extern "system" fn(
    this: *mut c_void,
    buffer: *const c_void,
    size: u32,
    bytes_written: *mut u32,
) -> i32;

/// Rust side of a byte stream
pub trait StreamCallback: Send + Sync {
    /// Fill `buffer`, returning the number of bytes read (0 at end)
    fn read(&self, buffer: &mut [u8]) -> Result<u32>;

    fn write(&self, data: &[u8]) -> Result<u32>;
}

static STREAM_VTBL: Lazy<Vtbl> = Lazy::new(|| stream_vtbl(0));

/// Stream slots followed by room for `number_of_methods` derived slots
pub fn stream_vtbl(number_of_methods: usize) -> Vtbl {
    let mut vtbl = Vtbl::new(number_of_methods + 2);
    vtbl.add_method(read_impl as ReadFn as *const c_void);
    vtbl.add_method(write_impl as WriteFn as *const c_void);
    vtbl
}

pub struct StreamShadow;

impl ShadowInterface for StreamShadow {
    const IID: Guid = IID_SEQUENTIAL_STREAM;
    const NAME: &'static str = "ISequentialStream";

    fn vtbl() -> &'static Vtbl {
        &STREAM_VTBL
    }
}

/// Expose `stream` as `ISequentialStream`
pub fn stream_facet(stream: Arc<dyn StreamCallback>) -> ShadowFacet {
    ShadowFacet::of::<StreamShadow, _>(stream)
}

unsafe extern "system" fn read_impl(
    this: *mut c_void,
    buffer: *mut c_void,
    size: u32,
    bytes_read: *mut u32,
) -> i32 {
    if !bytes_read.is_null() {
        *bytes_read = 0;
    }

    dispatch(this, "ISequentialStream::Read", |shadow| {
        let stream = shadow.callback::<Arc<dyn StreamCallback>>()?;
        let target: &mut [u8] = if size == 0 {
            &mut []
        } else if buffer.is_null() {
            return Err(InteropError::NullPointer);
        } else {
            slice::from_raw_parts_mut(buffer.cast::<u8>(), size as usize)
        };

        let read = stream.read(target)?;
        if !bytes_read.is_null() {
            *bytes_read = read;
        }
        Ok(())
    })
}

unsafe extern "system" fn write_impl(
    this: *mut c_void,
    buffer: *const c_void,
    size: u32,
    bytes_written: *mut u32,
) -> i32 {
    if !bytes_written.is_null() {
        *bytes_written = 0;
    }

    dispatch(this, "ISequentialStream::Write", |shadow| {
        let stream = shadow.callback::<Arc<dyn StreamCallback>>()?;
        let data: &[u8] = if size == 0 {
            &[]
        } else if buffer.is_null() {
            return Err(InteropError::NullPointer);
        } else {
            slice::from_raw_parts(buffer.cast::<u8>(), size as usize)
        };

        let written = stream.write(data)?;
        if !bytes_written.is_null() {
            *bytes_written = written;
        }
        Ok(())
    })
}

crate::foreign_interface! {
    /// Foreign `ISequentialStream`
    pub struct SequentialStream = IID_SEQUENTIAL_STREAM, "ISequentialStream";
}

impl SequentialStream {
    /// Read into `buffer`; a callee claiming more bytes than fit is an error
    pub fn read(&self, buffer: &mut [u8]) -> Result<u32> {
        let this = self.native_pointer();
        if this.is_null() {
            return Err(InteropError::NullPointer);
        }
        let size = buffer_len(buffer.len())?;

        let mut read = 0u32;
        // SAFETY: a live ISequentialStream has Read at READ_SLOT
        let code = unsafe {
            let method = mem::transmute::<*const c_void, ReadFn>(abi::slot(this, READ_SLOT));
            method(this, buffer.as_mut_ptr().cast(), size, &mut read)
        };

        ResultCode(code).check()?;
        if read > size {
            return Err(InteropError::InvalidArgument(format!(
                "stream reported {} bytes read into a {}-byte buffer",
                read, size
            )));
        }
        Ok(read)
    }

    pub fn write(&self, data: &[u8]) -> Result<u32> {
        let this = self.native_pointer();
        if this.is_null() {
            return Err(InteropError::NullPointer);
        }
        let size = buffer_len(data.len())?;

        let mut written = 0u32;
        // SAFETY: a live ISequentialStream has Write at WRITE_SLOT
        let code = unsafe {
            let method = mem::transmute::<*const c_void, WriteFn>(abi::slot(this, WRITE_SLOT));
            method(this, data.as_ptr().cast(), size, &mut written)
        };

        ResultCode(code).check()?;
        if written > size {
            return Err(InteropError::InvalidArgument(format!(
                "stream reported {} bytes written from a {}-byte buffer",
                written, size
            )));
        }
        Ok(written)
    }

    /// Write all of `data`, failing if the stream stops accepting bytes
    pub fn write_all(&self, mut data: &[u8]) -> Result<()> {
        while !data.is_empty() {
            let written = self.write(data)? as usize;
            if written == 0 {
                return Err(InteropError::callback(
                    ResultCode::FAIL,
                    "stream accepted no bytes",
                ));
            }
            data = &data[written..];
        }
        Ok(())
    }

    /// Read until the stream reports end of data
    pub fn read_to_end(&self, output: &mut Vec<u8>) -> Result<usize> {
        let mut chunk = [0u8; 4096];
        let mut total = 0;
        loop {
            let read = self.read(&mut chunk)? as usize;
            if read == 0 {
                return Ok(total);
            }
            output.extend_from_slice(&chunk[..read]);
            total += read;
        }
    }
}

fn buffer_len(len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| {
        InteropError::InvalidArgument(format!("buffer of {} bytes exceeds u32::MAX", len))
    })
}

/// In-memory stream with a shared read/write cursor
#[derive(Debug, Default)]
pub struct MemoryStream {
    inner: Mutex<io::Cursor<Vec<u8>>>,
}

impl MemoryStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stream positioned at the start of `data`
    pub fn with_data(data: Vec<u8>) -> Self {
        Self {
            inner: Mutex::new(io::Cursor::new(data)),
        }
    }

    pub fn contents(&self) -> Vec<u8> {
        self.inner.lock().get_ref().clone()
    }

    pub fn position(&self) -> u64 {
        self.inner.lock().position()
    }

    pub fn rewind(&self) {
        self.inner.lock().set_position(0);
    }
}

impl StreamCallback for MemoryStream {
    fn read(&self, buffer: &mut [u8]) -> Result<u32> {
        let read = self.inner.lock().read(buffer)?;
        Ok(read as u32)
    }

    fn write(&self, data: &[u8]) -> Result<u32> {
        let written = self.inner.lock().write(data)?;
        Ok(written as u32)
    }
}

impl Callback for MemoryStream {
    fn shadows(self: Arc<Self>) -> Vec<ShadowFacet> {
        vec![stream_facet(self)]
    }
}
