use dynasmrt::mmap::{ExecutableBuffer, MutableBuffer};
use dynasmrt::AssemblyOffset;

use crate::arch::SimdKind;
use crate::compiler::{self, AssembleOptions, Generated};
use crate::error::{Error, Result};
use crate::functable::FunctionTable;

/// Native entry point: constants base, locals base, function-table addresses.
pub type EntryFn = unsafe extern "sysv64" fn(consts: *const f32, locals: *mut f32, table: *const usize);

fn page_size() -> usize {
    // SAFETY: sysconf has no preconditions.
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size > 0 { size as usize } else { 4096 }
}

/// A page-aligned mapping holding finished machine code.
///
/// The mapping is filled while writable and then flipped to read+execute;
/// it is never both at once. Dropping it unmaps the pages.
pub struct CodePage {
    buf: ExecutableBuffer,
    size: usize,
}

impl CodePage {
    /// Map enough whole pages for `code`, copy it in, and make it executable.
    pub fn new(code: &[u8]) -> Result<CodePage> {
        let page = page_size();
        let size = code.len().max(1).div_ceil(page) * page;

        let mut buf = MutableBuffer::new(size)?;
        buf.set_len(code.len());
        buf[..code.len()].copy_from_slice(code);
        let buf = buf.make_exec()?;

        tracing::debug!(bytes = code.len(), mapped = size, "code page mapped");
        Ok(CodePage { buf, size })
    }

    /// Mapped size in bytes, a multiple of the page size.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn code(&self) -> &[u8] {
        &self.buf
    }

    pub fn ptr(&self) -> *const u8 {
        self.buf.ptr(AssemblyOffset(0))
    }
}

impl Drop for CodePage {
    fn drop(&mut self) {
        tracing::debug!(mapped = self.size, "code page released");
        self.size = 0;
    }
}

/// A compiled program: its executable code plus everything needed to call it.
///
/// Not `Clone`: each artifact owns its mapping exactly once.
pub struct Executable {
    page: CodePage,
    entry: EntryFn,
    kind: SimdKind,
    consts: Vec<f32>,
    nconsts: usize,
    nlocals: usize,
    table: &'static FunctionTable,
}

// SAFETY: the code page is immutable after construction and the generated
// code only touches the buffers handed to each call.
unsafe impl Send for Executable {}
unsafe impl Sync for Executable {}

impl Executable {
    /// Place generated code into executable memory.
    pub fn from_generated(generated: Generated, table: &'static FunctionTable) -> Result<Self> {
        let page = CodePage::new(&generated.code)?;
        // SAFETY: the page starts with code following the `EntryFn` convention.
        let entry = unsafe { std::mem::transmute::<*const u8, EntryFn>(page.ptr()) };
        Ok(Executable {
            page,
            entry,
            kind: generated.kind,
            consts: generated.consts,
            nconsts: generated.nconsts,
            nlocals: generated.nlocals,
            table,
        })
    }

    pub fn kind(&self) -> SimdKind {
        self.kind
    }

    pub fn lanes(&self) -> usize {
        self.kind.lanes()
    }

    /// Number of constants the program reads.
    pub fn const_count(&self) -> usize {
        self.nconsts
    }

    /// Number of local vector slots the program reads or writes.
    pub fn local_count(&self) -> usize {
        self.nlocals
    }

    /// Floats a locals buffer must hold.
    pub fn locals_len(&self) -> usize {
        self.nlocals * self.lanes()
    }

    /// The constant pool parsed from `const` lines.
    pub fn consts(&self) -> &[f32] {
        &self.consts
    }

    /// The machine code.
    pub fn code(&self) -> &[u8] {
        self.page.code()
    }

    /// Mapped size of the code page.
    pub fn page_size(&self) -> usize {
        self.page.size()
    }

    pub fn function_table(&self) -> &'static FunctionTable {
        self.table
    }

    /// Call the entry point directly.
    ///
    /// # Safety
    /// `consts` must point to at least `const_count()` floats, `locals` to at
    /// least `locals_len()` writable floats, and `table` to the address array
    /// for this artifact's kind.
    pub unsafe fn call_raw(&self, consts: *const f32, locals: *mut f32, table: *const usize) {
        unsafe { (self.entry)(consts, locals, table) }
    }

    /// Run once with the artifact's own constant pool.
    pub fn run(&self, locals: &mut [f32]) -> Result<()> {
        self.run_with(&self.consts, locals)
    }

    /// Run once with a host-supplied constant pool.
    pub fn run_with(&self, consts: &[f32], locals: &mut [f32]) -> Result<()> {
        check_len("constants", self.nconsts, consts.len())?;
        check_len("locals", self.locals_len(), locals.len())?;
        let table = self.table.addresses(self.kind);
        // SAFETY: buffer lengths are checked above; the table matches our kind.
        unsafe { self.call_raw(consts.as_ptr(), locals.as_mut_ptr(), table.as_ptr()) };
        Ok(())
    }

    /// Run once per `stride`-float chunk of `locals`.
    ///
    /// A trailing partial chunk is an error. Returns the number of calls made.
    pub fn run_batched(&self, locals: &mut [f32], stride: usize) -> Result<usize> {
        check_len("locals stride", self.locals_len(), stride)?;
        if stride == 0 {
            return Ok(0);
        }
        if locals.len() % stride != 0 {
            return Err(Error::BufferTooSmall {
                what: "trailing locals chunk",
                needed: stride,
                got: locals.len() % stride,
            });
        }
        let mut calls = 0;
        for chunk in locals.chunks_exact_mut(stride) {
            self.run(chunk)?;
            calls += 1;
        }
        Ok(calls)
    }
}

fn check_len(what: &'static str, needed: usize, got: usize) -> Result<()> {
    if got < needed {
        return Err(Error::BufferTooSmall { what, needed, got });
    }
    Ok(())
}

/// Compile program text into an [`Executable`] using [`AssembleOptions::from_env`].
pub fn assemble(text: &str) -> Result<Executable> {
    assemble_with(text, &AssembleOptions::from_env())
}

/// Compile program text into an [`Executable`].
pub fn assemble_with(text: &str, options: &AssembleOptions) -> Result<Executable> {
    let table = FunctionTable::global();
    let generated = compiler::Compiler::new(options, table).compile(text)?;
    Executable::from_generated(generated, table)
}
