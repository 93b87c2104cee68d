//! Shadow mechanism tests: vtable layout, identity slots, dispatch and teardown

use super::container::{add_ref_impl, query_interface_impl};
use super::stream::{MemoryStream, SequentialStream, IID_SEQUENTIAL_STREAM};
use super::*;
use crate::abi;
use crate::config::InteropConfig;
use crate::foreign::ForeignObject;
use crate::guid::IID_IUNKNOWN;
use crate::interface::{Interface, QueryInterfaceManaged};
use std::sync::atomic::{AtomicU32, Ordering};
use std::thread;

// Test helpers

const IID_COUNTER: Guid = Guid::from_u128(0x6b1e4c2a_93d0_4f7e_8a55_0c9d2e7f1a40);
const IID_COUNTER_BASE: Guid = Guid::from_u128(0x6b1e4c2a_93d0_4f7e_8a55_0c9d2e7f1a41);

const MODE_OK: u32 = 0;
const MODE_DENIED: u32 = 1;
const MODE_PANIC: u32 = 2;

type BumpFn = unsafe extern "system" fn(this: *mut c_void, hits: *mut u32) -> i32;

#[derive(Default)]
struct Counter {
    hits: AtomicU32,
    mode: AtomicU32,
}

impl Counter {
    fn with_mode(mode: u32) -> Arc<Self> {
        let counter = Arc::new(Self::default());
        counter.mode.store(mode, Ordering::Relaxed);
        counter
    }
}

struct CounterShadow;

static COUNTER_VTBL: Lazy<Vtbl> = Lazy::new(|| {
    let mut vtbl = Vtbl::new(1);
    vtbl.add_method(bump_impl as BumpFn as *const c_void);
    vtbl
});

impl ShadowInterface for CounterShadow {
    const IID: Guid = IID_COUNTER;
    const NAME: &'static str = "ICounter";
    const ALSO: &'static [Guid] = &[IID_COUNTER_BASE];

    fn vtbl() -> &'static Vtbl {
        &COUNTER_VTBL
    }
}

unsafe extern "system" fn bump_impl(this: *mut c_void, hits: *mut u32) -> i32 {
    dispatch(this, "ICounter::Bump", |shadow| {
        let counter = shadow.callback::<Arc<Counter>>()?;
        match counter.mode.load(Ordering::Relaxed) {
            MODE_DENIED => Err(InteropError::callback(ResultCode::ACCESS_DENIED, "denied")),
            MODE_PANIC => panic!("counter exploded"),
            _ => {
                let total = counter.hits.fetch_add(1, Ordering::Relaxed) + 1;
                if !hits.is_null() {
                    *hits = total;
                }
                Ok(())
            }
        }
    })
}

impl Callback for Counter {
    fn shadows(self: Arc<Self>) -> Vec<ShadowFacet> {
        vec![ShadowFacet::of::<CounterShadow, _>(self)]
    }
}

unsafe fn bump(pointer: *mut c_void, hits: &mut u32) -> i32 {
    let method = mem::transmute::<*const c_void, BumpFn>(abi::slot(pointer, 3));
    method(pointer, hits)
}

fn counter_ptr(object: &CallbackObject) -> *mut c_void {
    object
        .shadow_ptr(&IID_COUNTER)
        .map(NonNull::as_ptr)
        .expect("counter facet")
}

// Vtable construction

#[test]
fn test_vtbl_layers() {
    let mut vtbl = Vtbl::new(2);
    assert_eq!(vtbl.len(), 3);
    assert_eq!(vtbl.declared(), 5);
    assert!(!vtbl.is_complete());

    vtbl.add_method(bump_impl as BumpFn as *const c_void);
    vtbl.add_method(bump_impl as BumpFn as *const c_void);
    assert!(vtbl.is_complete());
    assert_eq!(vtbl.slot(3), Some(bump_impl as BumpFn as *const c_void));
    assert_eq!(vtbl.slot(5), None);
}

#[test]
fn test_vtbl_base_slots_shared() {
    let base = Vtbl::new(0);
    let stream = stream::stream_vtbl(0);
    for index in 0..abi::BASE_SLOT_COUNT {
        assert_eq!(base.slot(index), stream.slot(index));
    }
    assert_eq!(stream.len(), 5);
    assert!(stream.is_complete());
}

#[test]
#[should_panic(expected = "vtable overflow")]
fn test_vtbl_overflow_panics() {
    let mut vtbl = Vtbl::new(0);
    vtbl.add_method(bump_impl as BumpFn as *const c_void);
}

#[test]
#[should_panic(expected = "declared slots")]
fn test_incomplete_vtbl_rejected() {
    static PARTIAL: Lazy<Vtbl> = Lazy::new(|| Vtbl::new(1));
    let _ = ShadowFacet::new(IID_COUNTER, "ICounter", &PARTIAL, ());
}

// Identity slots

#[test]
fn test_bound_on_creation() {
    let object = CallbackObject::new(Counter::with_mode(MODE_OK));
    assert_eq!(object.state(), ShadowState::Bound);
    assert_eq!(object.ref_count(), 1);
    assert_eq!(object.facet_count(), 1);
    assert!(is_registered(object.identity_ptr()));
    assert!(is_registered(counter_ptr(&object)));
    assert!(registered_count() >= 2);
}

#[test]
fn test_query_unknown_never_consults_callback() {
    let counter = Counter::with_mode(MODE_PANIC);
    let object = CallbackObject::new(Arc::clone(&counter));
    let facet = counter_ptr(&object);

    unsafe {
        let (code, found) = abi::query_interface(facet, &IID_IUNKNOWN);
        assert_eq!(code, ResultCode::OK);
        assert_eq!(found, object.identity_ptr());
        assert_eq!(object.ref_count(), 2);
        abi::release(found);
    }

    assert_eq!(counter.hits.load(Ordering::Relaxed), 0);
    assert_eq!(object.ref_count(), 1);
}

#[test]
fn test_query_declared_facet() {
    let object = CallbackObject::new(Counter::with_mode(MODE_OK));

    unsafe {
        let (code, found) = abi::query_interface(object.identity_ptr(), &IID_COUNTER);
        assert_eq!(code, ResultCode::OK);
        assert_eq!(found, counter_ptr(&object));

        let (code, base) = abi::query_interface(object.identity_ptr(), &IID_COUNTER_BASE);
        assert_eq!(code, ResultCode::OK);
        assert_eq!(base, found);

        assert_eq!(object.ref_count(), 3);
        abi::release(found);
        abi::release(base);
    }
    assert_eq!(object.ref_count(), 1);
}

#[test]
fn test_query_unsupported() {
    let object = CallbackObject::new(Counter::with_mode(MODE_OK));

    unsafe {
        let (code, found) = abi::query_interface(object.identity_ptr(), &IID_SEQUENTIAL_STREAM);
        assert_eq!(code, ResultCode::NO_INTERFACE);
        assert!(found.is_null());
    }
    assert_eq!(object.ref_count(), 1);

    let error = object.query_interface_raw(&IID_SEQUENTIAL_STREAM).unwrap_err();
    assert_eq!(error, InteropError::no_interface(IID_SEQUENTIAL_STREAM));
    assert!(object.query_interface_raw_or_null(&IID_SEQUENTIAL_STREAM).is_null());
}

#[test]
fn test_query_null_arguments() {
    let object = CallbackObject::new(Counter::with_mode(MODE_OK));

    unsafe {
        let code = query_interface_impl(object.identity_ptr(), &IID_IUNKNOWN, ptr::null_mut());
        assert_eq!(code, ResultCode::POINTER.code());

        let mut out = object.identity_ptr();
        let code = query_interface_impl(object.identity_ptr(), ptr::null(), &mut out);
        assert_eq!(code, ResultCode::POINTER.code());
        assert!(out.is_null());
    }
    assert_eq!(object.ref_count(), 1);
}

#[test]
fn test_shared_count_across_shadows() {
    let object = CallbackObject::new(Counter::with_mode(MODE_OK));
    let facet = counter_ptr(&object);

    unsafe {
        assert_eq!(abi::add_ref(facet), 2);
        assert_eq!(abi::add_ref(object.identity_ptr()), 3);
        assert_eq!(abi::release(object.identity_ptr()), 2);
        assert_eq!(abi::release(facet), 1);
    }
    assert_eq!(object.state(), ShadowState::Bound);
}

// Teardown

#[test]
fn test_teardown_at_zero() {
    let object = CallbackObject::new(Counter::with_mode(MODE_OK));
    let identity = object.identity_ptr();
    let facet = counter_ptr(&object);
    let observer = ShadowRef::from_this(identity).unwrap();

    let raw = object.into_raw();
    assert_eq!(raw, identity);
    assert!(is_registered(raw));

    assert_eq!(unsafe { abi::release(raw) }, 0);
    assert_eq!(observer.container().state(), ShadowState::Disposed);
    assert!(!is_registered(identity));
    assert!(!is_registered(facet));
    assert!(observer.container().find(&IID_IUNKNOWN).is_none());

    // Stale addresses are lookup misses, not reads
    assert_eq!(unsafe { add_ref_impl(identity) }, 0);
    assert!(matches!(
        ShadowRef::from_this(facet),
        Err(InteropError::ShadowNotFound(_))
    ));
}

#[test]
fn test_drop_last_handle_disposes() {
    let object = CallbackObject::new(Counter::with_mode(MODE_OK));
    let identity = object.identity_ptr();
    let copy = object.clone();
    assert_eq!(object.ref_count(), 2);

    drop(object);
    assert!(is_registered(identity));
    drop(copy);
    assert!(!is_registered(identity));
}

#[test]
fn test_release_does_not_underflow() {
    let object = CallbackObject::new(Counter::with_mode(MODE_OK));
    let observer = ShadowRef::from_this(object.identity_ptr()).unwrap();
    drop(object);

    assert_eq!(observer.container().release(), 0);
    assert_eq!(observer.container().ref_count(), 0);
}

#[test]
fn test_raw_round_trip_keeps_reference() {
    let object = CallbackObject::new(Counter::with_mode(MODE_OK));
    let identity = object.identity_ptr();
    let raw = object.into_raw();

    let restored = unsafe { CallbackObject::from_raw(raw) }.expect("registered");
    assert_eq!(restored.identity_ptr(), identity);
    assert_eq!(restored.ref_count(), 1);
    assert!(unsafe { CallbackObject::from_raw(ptr::null_mut()) }.is_none());
}

// Dispatch

#[test]
fn test_callback_success() {
    let counter = Counter::with_mode(MODE_OK);
    let object = CallbackObject::new(Arc::clone(&counter));

    let mut hits = 0;
    assert_eq!(unsafe { bump(counter_ptr(&object), &mut hits) }, 0);
    assert_eq!(unsafe { bump(counter_ptr(&object), &mut hits) }, 0);
    assert_eq!(hits, 2);
    assert_eq!(counter.hits.load(Ordering::Relaxed), 2);
}

#[test]
fn test_callback_error_becomes_code() {
    let object = CallbackObject::new(Counter::with_mode(MODE_DENIED));

    let mut hits = 0;
    let code = unsafe { bump(counter_ptr(&object), &mut hits) };
    assert_eq!(code, ResultCode::ACCESS_DENIED.code());
    assert!(code < 0);
    assert_eq!(hits, 0);
}

#[test]
fn test_callback_panic_becomes_code() {
    let object = CallbackObject::new(Counter::with_mode(MODE_PANIC));

    let mut hits = 0;
    let code = unsafe { bump(counter_ptr(&object), &mut hits) };
    assert_eq!(code, ResultCode::UNEXPECTED.code());

    // Still usable afterwards
    assert_eq!(object.state(), ShadowState::Bound);
    assert_eq!(object.ref_count(), 1);
}

#[test]
fn test_dispatch_unknown_address() {
    let mut slot = 0usize;
    let code = dispatch(&mut slot as *mut usize as *mut c_void, "Test::Call", |_| Ok(()));
    assert_eq!(code, ResultCode::POINTER.code());
}

#[test]
fn test_callback_type_mismatch() {
    let object = CallbackObject::new(Counter::with_mode(MODE_OK));
    let shadow = ShadowRef::from_this(counter_ptr(&object)).unwrap();
    assert_eq!(shadow.iid(), IID_COUNTER);
    assert_eq!(shadow.name(), "ICounter");
    assert!(shadow.callback::<Arc<Counter>>().is_ok());
    assert!(matches!(
        shadow.callback::<String>(),
        Err(InteropError::CallbackType(_))
    ));

    let identity = ShadowRef::from_this(object.identity_ptr()).unwrap();
    assert!(identity.callback::<Arc<Counter>>().is_err());
}

#[test]
fn test_managed_cast() {
    let counter = Counter::with_mode(MODE_OK);
    let object = CallbackObject::new(Arc::clone(&counter));

    let back = object.callback::<Counter>().expect("owner");
    assert!(Arc::ptr_eq(&back, &counter));
    assert!(object.callback::<MemoryStream>().is_none());

    let bare = CallbackObject::from_facets(vec![]);
    assert!(bare.callback::<Counter>().is_none());
}

#[test]
fn test_facet_answers_extra_id() {
    let facet = ShadowFacet::of::<CounterShadow, _>(Counter::with_mode(MODE_OK))
        .answers(IID_SEQUENTIAL_STREAM)
        .answers(IID_COUNTER);
    assert_eq!(
        facet.iids(),
        &[IID_COUNTER, IID_COUNTER_BASE, IID_SEQUENTIAL_STREAM]
    );

    let object = CallbackObject::from_facets(vec![facet]);
    assert_eq!(
        object.shadow_ptr(&IID_SEQUENTIAL_STREAM),
        object.shadow_ptr(&IID_COUNTER)
    );
}

// Concurrency

#[test]
fn test_concurrent_add_ref_release() {
    let object = CallbackObject::new(Counter::with_mode(MODE_OK));
    let identity = object.identity_ptr() as usize;
    let facet = counter_ptr(&object) as usize;

    let handles: Vec<_> = (0..8)
        .map(|worker| {
            thread::spawn(move || {
                let target = (if worker % 2 == 0 { identity } else { facet }) as *mut c_void;
                for _ in 0..1000 {
                    unsafe {
                        abi::add_ref(target);
                        abi::release(target);
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(object.ref_count(), 1);
    assert_eq!(object.state(), ShadowState::Bound);
}

#[test]
fn test_concurrent_callbacks() {
    let counter = Counter::with_mode(MODE_OK);
    let object = CallbackObject::new(Arc::clone(&counter));
    let facet = counter_ptr(&object) as usize;

    let handles: Vec<_> = (0..4)
        .map(|_| {
            thread::spawn(move || {
                let mut hits = 0;
                for _ in 0..250 {
                    assert_eq!(unsafe { bump(facet as *mut c_void, &mut hits) }, 0);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(counter.hits.load(Ordering::Relaxed), 1000);
}

// Stream shadow

#[test]
fn test_stream_read_write_through_vtable() {
    let stream = Arc::new(MemoryStream::with_data(b"hello".to_vec()));
    let object = CallbackObject::new(Arc::clone(&stream));
    let config = InteropConfig::default();

    let unknown = ForeignObject::from_callback_with_config(&object, config);
    assert_eq!(object.ref_count(), 2);

    let sequential: SequentialStream = unknown.query_interface().unwrap();
    assert_eq!(object.ref_count(), 3);
    assert_eq!(
        sequential.native_pointer(),
        object.shadow_ptr(&IID_SEQUENTIAL_STREAM).unwrap().as_ptr()
    );

    let mut output = Vec::new();
    assert_eq!(sequential.read_to_end(&mut output).unwrap(), 5);
    assert_eq!(output, b"hello");

    sequential.write_all(b" world").unwrap();
    assert_eq!(stream.contents(), b"hello world");

    stream.rewind();
    let mut buffer = [0u8; 4];
    assert_eq!(sequential.read(&mut buffer).unwrap(), 4);
    assert_eq!(&buffer, b"hell");

    drop(sequential);
    drop(unknown);
    assert_eq!(object.ref_count(), 1);
}

#[test]
fn test_stream_null_buffer_rejected() {
    let object = CallbackObject::new(Arc::new(MemoryStream::with_data(vec![1, 2, 3])));
    let facet = object
        .shadow_ptr(&IID_SEQUENTIAL_STREAM)
        .unwrap()
        .as_ptr();

    let mut read = 7u32;
    let code = unsafe {
        let method = mem::transmute::<*const c_void, stream::ReadFn>(abi::slot(
            facet,
            stream::READ_SLOT,
        ));
        method(facet, ptr::null_mut(), 3, &mut read)
    };
    assert_eq!(code, ResultCode::POINTER.code());
    assert_eq!(read, 0);
}

struct Boastful;

impl stream::StreamCallback for Boastful {
    fn read(&self, _buffer: &mut [u8]) -> Result<u32> {
        Ok(10_000)
    }

    fn write(&self, _data: &[u8]) -> Result<u32> {
        Ok(10_000)
    }
}

#[test]
fn test_stream_overreported_count_rejected() {
    let object = CallbackObject::from_facets(vec![stream::stream_facet(Arc::new(Boastful))]);
    let unknown = ForeignObject::from_callback_with_config(&object, InteropConfig::default());
    let sequential: SequentialStream = unknown.query_interface().unwrap();

    let mut buffer = [0u8; 16];
    assert!(matches!(
        sequential.read(&mut buffer),
        Err(InteropError::InvalidArgument(_))
    ));

    let mut output = Vec::new();
    assert!(matches!(
        sequential.read_to_end(&mut output),
        Err(InteropError::InvalidArgument(_))
    ));
    assert!(output.is_empty());

    assert!(matches!(
        sequential.write_all(b"abc"),
        Err(InteropError::InvalidArgument(_))
    ));
}

#[test]
fn test_stream_on_null_wrapper() {
    let stream = SequentialStream::from_object(ForeignObject::null());
    let mut buffer = [0u8; 1];
    assert_eq!(stream.read(&mut buffer), Err(InteropError::NullPointer));
    assert_eq!(stream.write(b"x"), Err(InteropError::NullPointer));
}
