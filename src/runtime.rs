//! Runtime handles.
//!
//! `Isolate` owns the executable-memory runtime; `Program` owns a compiled
//! entry point plus a strong reference to that runtime. Both are manually
//! reference-counted handles sharing the process-wide null singletons: the
//! singletons sit at refcount 0, add-ref skips them, and release destroys an
//! allocation at the 1 -> 0 transition. The inner pointer of a handle only
//! ever changes through an atomic exchange.

use std::ffi::c_void;
use std::sync::atomic::{AtomicPtr, AtomicU32, Ordering};
use std::sync::Mutex;

use crate::errors::{Error, Result};

// ---------------------------------------------------------------------
// Executable memory
// ---------------------------------------------------------------------

struct Mapping {
    ptr: *mut u8,
    size: usize,
}

unsafe impl Send for Mapping {}

/// Allocates executable memory and releases it by entry pointer. The
/// backend treats this as a black box; swapping the mapping calls is a
/// port, not a redesign.
pub struct CodeRuntime {
    mappings: Mutex<Vec<Mapping>>,
}

impl CodeRuntime {
    fn new() -> Self {
        Self {
            mappings: Mutex::new(vec![]),
        }
    }

    pub fn install(&self, code: &[u8]) -> Result<*const u8> {
        if code.is_empty() {
            return Err(Error::JITFailed);
        }

        let page = 4096usize;
        let size = (code.len() + page - 1) & !(page - 1);

        unsafe {
            let ptr = libc::mmap(
                std::ptr::null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            );
            if ptr == libc::MAP_FAILED {
                return Err(Error::NoMemory);
            }
            let ptr = ptr as *mut u8;
            std::ptr::copy_nonoverlapping(code.as_ptr(), ptr, code.len());
            if libc::mprotect(ptr as *mut c_void, size, libc::PROT_READ | libc::PROT_EXEC) != 0 {
                libc::munmap(ptr as *mut c_void, size);
                return Err(Error::JITFailed);
            }

            self.mappings.lock().unwrap().push(Mapping { ptr, size });
            Ok(ptr as *const u8)
        }
    }

    pub fn release(&self, entry: *const u8) {
        if entry.is_null() {
            return;
        }
        let mut mappings = self.mappings.lock().unwrap();
        if let Some(index) = mappings.iter().position(|m| m.ptr as *const u8 == entry) {
            let mapping = mappings.swap_remove(index);
            unsafe {
                libc::munmap(mapping.ptr as *mut c_void, mapping.size);
            }
        }
    }
}

impl Drop for CodeRuntime {
    fn drop(&mut self) {
        for mapping in self.mappings.lock().unwrap().drain(..) {
            unsafe {
                libc::munmap(mapping.ptr as *mut c_void, mapping.size);
            }
        }
    }
}

// ---------------------------------------------------------------------
// Reference-counted impls
// ---------------------------------------------------------------------

pub(crate) struct RuntimeData {
    ref_count: AtomicU32,
    pub(crate) runtime: CodeRuntime,
}

fn rt_add_ref(rt: *mut RuntimeData) -> *mut RuntimeData {
    unsafe {
        if (*rt).ref_count.load(Ordering::Relaxed) != 0 {
            (*rt).ref_count.fetch_add(1, Ordering::Relaxed);
        }
    }
    rt
}

fn rt_release(rt: *mut RuntimeData) {
    if rt.is_null() {
        return;
    }
    unsafe {
        if (*rt).ref_count.load(Ordering::Relaxed) != 0
            && (*rt).ref_count.fetch_sub(1, Ordering::AcqRel) == 1
        {
            drop(Box::from_raw(rt));
        }
    }
}

pub(crate) struct IsolateImpl {
    ref_count: AtomicU32,
    rt: *mut RuntimeData,
}

unsafe impl Sync for IsolateImpl {}
unsafe impl Send for IsolateImpl {}

pub(crate) struct ProgramImpl {
    ref_count: AtomicU32,
    rt: *mut RuntimeData,
    main: *const u8,
}

unsafe impl Sync for ProgramImpl {}
unsafe impl Send for ProgramImpl {}

static ISOLATE_NULL: IsolateImpl = IsolateImpl {
    ref_count: AtomicU32::new(0),
    rt: std::ptr::null_mut(),
};

static PROGRAM_NULL: ProgramImpl = ProgramImpl {
    ref_count: AtomicU32::new(0),
    rt: std::ptr::null_mut(),
    main: std::ptr::null(),
};

fn isolate_null() -> *mut IsolateImpl {
    &ISOLATE_NULL as *const IsolateImpl as *mut IsolateImpl
}

fn program_null() -> *mut ProgramImpl {
    &PROGRAM_NULL as *const ProgramImpl as *mut ProgramImpl
}

fn isolate_add_ref(d: *mut IsolateImpl) -> *mut IsolateImpl {
    unsafe {
        if (*d).ref_count.load(Ordering::Relaxed) != 0 {
            (*d).ref_count.fetch_add(1, Ordering::Relaxed);
        }
    }
    d
}

fn isolate_release(d: *mut IsolateImpl) {
    unsafe {
        if (*d).ref_count.load(Ordering::Relaxed) != 0
            && (*d).ref_count.fetch_sub(1, Ordering::AcqRel) == 1
        {
            rt_release((*d).rt);
            drop(Box::from_raw(d));
        }
    }
}

fn program_add_ref(d: *mut ProgramImpl) -> *mut ProgramImpl {
    unsafe {
        if (*d).ref_count.load(Ordering::Relaxed) != 0 {
            (*d).ref_count.fetch_add(1, Ordering::Relaxed);
        }
    }
    d
}

fn program_release(d: *mut ProgramImpl) {
    unsafe {
        if (*d).ref_count.load(Ordering::Relaxed) != 0
            && (*d).ref_count.fetch_sub(1, Ordering::AcqRel) == 1
        {
            (*(*d).rt).runtime.release((*d).main);
            rt_release((*d).rt);
            drop(Box::from_raw(d));
        }
    }
}

// ---------------------------------------------------------------------
// Public handles
// ---------------------------------------------------------------------

/// Compilation context owning an executable-memory runtime.
pub struct Isolate {
    d: AtomicPtr<IsolateImpl>,
}

unsafe impl Send for Isolate {}
unsafe impl Sync for Isolate {}

impl Isolate {
    /// The empty handle; every operation on it is a no-op.
    pub fn none() -> Self {
        Self {
            d: AtomicPtr::new(isolate_null()),
        }
    }

    pub fn create() -> Self {
        let rt = Box::into_raw(Box::new(RuntimeData {
            ref_count: AtomicU32::new(1),
            runtime: CodeRuntime::new(),
        }));
        let d = Box::into_raw(Box::new(IsolateImpl {
            ref_count: AtomicU32::new(1),
            rt,
        }));
        Self {
            d: AtomicPtr::new(d),
        }
    }

    pub fn is_none(&self) -> bool {
        self.d.load(Ordering::Acquire) == isolate_null()
    }

    /// Swaps the inner pointer for the null singleton and releases the old
    /// allocation.
    pub fn reset(&self) -> Result<()> {
        isolate_release(self.d.swap(isolate_null(), Ordering::AcqRel));
        Ok(())
    }

    /// Reserved; currently succeeds without copying anything.
    pub fn try_clone(&self) -> Result<()> {
        Ok(())
    }

    /// Reserved; currently succeeds without freezing anything.
    pub fn freeze(&self) -> Result<()> {
        Ok(())
    }

    pub(crate) fn runtime_data(&self) -> *mut RuntimeData {
        unsafe { (*self.d.load(Ordering::Acquire)).rt }
    }

    #[cfg(test)]
    pub(crate) fn ref_count(&self) -> u32 {
        unsafe {
            (*self.d.load(Ordering::Acquire))
                .ref_count
                .load(Ordering::Relaxed)
        }
    }
}

impl Clone for Isolate {
    fn clone(&self) -> Self {
        Self {
            d: AtomicPtr::new(isolate_add_ref(self.d.load(Ordering::Acquire))),
        }
    }
}

impl Drop for Isolate {
    fn drop(&mut self) {
        isolate_release(self.d.load(Ordering::Acquire));
    }
}

impl Default for Isolate {
    fn default() -> Self {
        Self::none()
    }
}

/// A compiled program: a callable entry point plus a strong reference to
/// the isolate runtime that owns its code.
pub struct Program {
    d: AtomicPtr<ProgramImpl>,
}

unsafe impl Send for Program {}
unsafe impl Sync for Program {}

impl Program {
    pub fn new() -> Self {
        Self {
            d: AtomicPtr::new(program_null()),
        }
    }

    pub fn is_none(&self) -> bool {
        self.d.load(Ordering::Acquire) == program_null()
    }

    pub fn reset(&self) -> Result<()> {
        program_release(self.d.swap(program_null(), Ordering::AcqRel));
        Ok(())
    }

    /// Invokes the compiled `main`.
    ///
    /// `args` points at one pointer per argument slot (plus the trailing
    /// output pointer when `main` returns a value). The caller guarantees
    /// the records match the layouts the program was compiled against.
    /// Running the empty handle does nothing.
    ///
    /// # Safety
    ///
    /// The argument pointers must be valid and correctly laid out; the
    /// emitted code reads and writes through them.
    pub unsafe fn run(&self, args: *mut *mut c_void) {
        let d = self.d.load(Ordering::Acquire);
        let main = (*d).main;
        if main.is_null() {
            return;
        }
        let entry: unsafe extern "C" fn(*mut *mut c_void) = std::mem::transmute(main);
        entry(args);
    }

    #[cfg(test)]
    pub(crate) fn ref_count(&self) -> u32 {
        unsafe {
            (*self.d.load(Ordering::Acquire))
                .ref_count
                .load(Ordering::Relaxed)
        }
    }

    /// Installs freshly emitted code. When this handle holds the only
    /// reference to an impl tied to the same runtime, the entry point is
    /// replaced in place; otherwise a fresh impl is swapped in and the old
    /// one released.
    pub(crate) fn install(&self, rt: *mut RuntimeData, code: &[u8]) -> Result<()> {
        unsafe {
            let main = (*rt).runtime.install(code)?;

            let d = self.d.load(Ordering::Acquire);
            if (*d).ref_count.load(Ordering::Relaxed) == 1 && (*d).rt == rt {
                (*rt).runtime.release((*d).main);
                (*d).main = main;
                return Ok(());
            }

            let fresh = Box::into_raw(Box::new(ProgramImpl {
                ref_count: AtomicU32::new(1),
                rt: rt_add_ref(rt),
                main,
            }));
            program_release(self.d.swap(fresh, Ordering::AcqRel));
            Ok(())
        }
    }
}

impl Clone for Program {
    fn clone(&self) -> Self {
        Self {
            d: AtomicPtr::new(program_add_ref(self.d.load(Ordering::Acquire))),
        }
    }
}

impl Drop for Program {
    fn drop(&mut self) {
        program_release(self.d.load(Ordering::Acquire));
    }
}

impl Default for Program {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_null_singletons_are_inert() {
        let isolate = Isolate::none();
        assert!(isolate.is_none());
        isolate.reset().unwrap();
        drop(isolate.clone());
        drop(isolate);

        let program = Program::new();
        assert!(program.is_none());
        assert_eq!(program.ref_count(), 0);
        program.reset().unwrap();
        drop(program.clone());
        assert_eq!(program.ref_count(), 0);
        unsafe { program.run(std::ptr::null_mut()) };
    }

    #[test]
    fn test_ref_counting() {
        let isolate = Isolate::create();
        assert_eq!(isolate.ref_count(), 1);

        let copy = isolate.clone();
        assert_eq!(isolate.ref_count(), 2);

        copy.reset().unwrap();
        assert_eq!(isolate.ref_count(), 1);
        assert!(copy.is_none());

        drop(isolate);
    }

    #[test]
    fn test_handles_cross_threads() {
        let isolate = Isolate::create();
        let copy = isolate.clone();
        std::thread::spawn(move || drop(copy)).join().unwrap();
        assert_eq!(isolate.ref_count(), 1);
    }
}
