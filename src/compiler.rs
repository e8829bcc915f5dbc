use crate::arch::{Gpr, SimdBuilder, SimdKind};
use crate::asm_parse::{self, Inst, Slot};
use crate::error::{Error, Result};
use crate::functable::FunctionTable;

/// Largest constant pool a program may declare, in floats.
pub const MAX_CONSTS: u32 = 1 << 16;

/// Knobs for one compilation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssembleOptions {
    /// Vector kind for the whole program.
    pub kind: SimdKind,
    /// Log the encoded bytes and slot counts at debug level.
    pub dump_code: bool,
}

impl AssembleOptions {
    pub fn new(kind: SimdKind) -> Self {
        AssembleOptions {
            kind,
            dump_code: false,
        }
    }

    /// Defaults overridden by `VEXJIT_KIND` (`xmm`/`ymm`) and
    /// `VEXJIT_DUMP_CODE=1`.
    pub fn from_env() -> Self {
        let mut opts = AssembleOptions::default();
        if let Ok(v) = std::env::var("VEXJIT_KIND") {
            match v.parse() {
                Ok(kind) => opts.kind = kind,
                Err(e) => tracing::warn!("ignoring VEXJIT_KIND: {e}"),
            }
        }
        opts.dump_code = std::env::var("VEXJIT_DUMP_CODE").is_ok_and(|v| v == "1");
        opts
    }
}

/// Output of a code generation pass, before it is placed in executable memory.
#[derive(Debug, Clone)]
pub struct Generated {
    pub kind: SimdKind,
    pub code: Vec<u8>,
    /// Constant pool, `nconsts` long. Ids never set by `const` hold 0.0.
    pub consts: Vec<f32>,
    pub nconsts: usize,
    pub nlocals: usize,
}

/// Single-pass code generator from instruction text to machine code.
pub struct Compiler {
    builder: SimdBuilder,
    table: &'static FunctionTable,
    dump_code: bool,
    consts: Vec<f32>,
    nconsts: usize,
    nlocals: usize,
}

impl Compiler {
    pub fn new(options: &AssembleOptions, table: &'static FunctionTable) -> Self {
        Compiler {
            builder: SimdBuilder::new(options.kind),
            table,
            dump_code: options.dump_code,
            consts: Vec::new(),
            nconsts: 0,
            nlocals: 0,
        }
    }

    fn kind(&self) -> SimdKind {
        self.builder.kind()
    }

    /// Run the whole pass. Any error discards everything emitted so far.
    pub fn compile(mut self, text: &str) -> Result<Generated> {
        let kind = self.kind();
        if !kind.is_supported() {
            return Err(Error::UnsupportedKind(kind));
        }

        for line in asm_parse::parse_program(text, self.table)? {
            self.emit(line.number, &line.inst)?;
        }
        self.builder.ret();

        let Compiler {
            builder,
            dump_code,
            mut consts,
            nconsts,
            nlocals,
            ..
        } = self;
        let code = builder.finish()?;
        consts.resize(nconsts, 0.0);

        tracing::debug!(
            %kind,
            nconsts,
            nlocals,
            code_bytes = code.len(),
            "generated"
        );
        if dump_code {
            let hex: Vec<String> = code.iter().map(|b| format!("{b:02X}")).collect();
            tracing::debug!("variables: {nlocals} slots");
            tracing::debug!("consts: {nconsts} values");
            tracing::debug!("insts: {}", hex.join(" "));
        }

        Ok(Generated {
            kind,
            code,
            consts,
            nconsts,
            nlocals,
        })
    }

    fn emit(&mut self, line: usize, inst: &Inst) -> Result<()> {
        match *inst {
            Inst::Const { id, value } => {
                self.const_offset(line, id)?;
                let slot = id as usize;
                self.see_const(id);
                if self.consts.len() <= slot {
                    self.consts.resize(slot + 1, 0.0);
                }
                self.consts[slot] = value;
            }
            Inst::LoadConst { dst, id } => {
                let offset = self.const_offset(line, id)?;
                self.see_const(id);
                self.builder.broadcast_const(dst, offset);
            }
            Inst::LoadLocal { dst, id } => {
                self.see_local(id);
                let offset = self.offset(line, id, self.kind().vector_bytes())?;
                self.builder.load_local(dst, offset);
            }
            Inst::StoreLocal { src, id } => {
                self.see_local(id);
                let offset = self.offset(line, id, self.kind().vector_bytes())?;
                self.builder.store_local(src, offset);
            }
            Inst::Binary { op, dst, lhs, rhs } => self.builder.binary(op, dst, lhs, rhs),
            Inst::Sqrt { dst, src } => self.builder.sqrt(dst, src),
            Inst::Mov { dst, src } => self.builder.mov(dst, src),
            Inst::Round { mode, dst, src } => self.builder.round(dst, src, mode),
            Inst::Call1 { func, dst, src } => self.emit_call(func, dst, &[src]),
            Inst::Call2 {
                func,
                dst,
                lhs,
                rhs,
            } => self.emit_call(func, dst, &[lhs, rhs]),
        }
        Ok(())
    }

    fn see_const(&mut self, id: u32) {
        self.nconsts = self.nconsts.max(id as usize + 1);
    }

    fn see_local(&mut self, id: u32) {
        self.nlocals = self.nlocals.max(id as usize + 1);
    }

    /// Displacement of constant `id`, which must be below [`MAX_CONSTS`].
    fn const_offset(&self, line: usize, id: u32) -> Result<i32> {
        if id >= MAX_CONSTS {
            return Err(Error::IndexOutOfRange { line, index: id });
        }
        self.offset(line, id, self.kind().scalar_bytes())
    }

    /// Byte displacement `id * scale`, which must fit a 32-bit disp.
    fn offset(&self, line: usize, id: u32, scale: usize) -> Result<i32> {
        (id as usize)
            .checked_mul(scale)
            .and_then(|off| i32::try_from(off).ok())
            .ok_or(Error::IndexOutOfRange { line, index: id })
    }

    /// Lower a call to table entry `func` with one or two vector arguments.
    ///
    /// The base registers are pushed, the arguments are spilled to scratch
    /// space on the stack with the first argument at the lowest address, and
    /// the helper overwrites the first argument with its result. Three pushes
    /// plus whole vectors keep `rsp` 16-byte aligned at the call.
    fn emit_call(&mut self, func: usize, dst: Slot, args: &[Slot]) {
        const ARG_REGS: [Gpr; 2] = [Gpr::Rdi, Gpr::Rsi];
        let size = self.kind().vector_bytes() as i32;
        let offset = (func * std::mem::size_of::<usize>()) as i32;
        let b = &mut self.builder;

        b.push(Gpr::Rdi);
        b.push(Gpr::Rsi);
        b.push(Gpr::Rdx);
        // Last argument first so the first one ends up at rsp.
        for (i, &arg) in args.iter().enumerate().rev() {
            b.adjust_stack(-size);
            b.store_stack(arg);
            b.arg_from_stack(ARG_REGS[i]);
        }
        b.call_table(offset);
        b.load_stack(dst);
        b.adjust_stack(size * args.len() as i32);
        b.pop(Gpr::Rdx);
        b.pop(Gpr::Rsi);
        b.pop(Gpr::Rdi);
    }
}

/// Run code generation with the global function table.
pub fn generate(text: &str, options: &AssembleOptions) -> Result<Generated> {
    Compiler::new(options, FunctionTable::global()).compile(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn avx() -> bool {
        SimdKind::Xmm.is_supported()
    }

    #[test]
    fn counts_track_high_water_marks() {
        if !avx() {
            return;
        }
        let g = generate(
            "const 3 1.5\nldp 0 1\nldl 1 4\nstl 1 2\n",
            &AssembleOptions::default(),
        )
        .unwrap();
        assert_eq!(g.nconsts, 4);
        assert_eq!(g.nlocals, 5);
        assert_eq!(g.consts, vec![0.0, 0.0, 0.0, 1.5]);
    }

    #[test]
    fn const_without_load_still_sizes_pool() {
        if !avx() {
            return;
        }
        let g = generate("const 2 7\n", &AssembleOptions::default()).unwrap();
        assert_eq!(g.consts, vec![0.0, 0.0, 7.0]);
        assert_eq!(g.nlocals, 0);
    }

    #[test]
    fn empty_program_is_just_return() {
        if !avx() {
            return;
        }
        let g = generate("", &AssembleOptions::default()).unwrap();
        assert_eq!(g.code, vec![0xC3]);
        assert_eq!(g.nconsts, 0);
        assert!(g.consts.is_empty());
    }

    #[test]
    fn ymm_code_is_distinct() {
        if !avx() {
            return;
        }
        let text = "ldl 0 0\nadd 0 0 0\nstl 0 1\n";
        let x = generate(text, &AssembleOptions::new(SimdKind::Xmm)).unwrap();
        let y = generate(text, &AssembleOptions::new(SimdKind::Ymm)).unwrap();
        assert_ne!(x.code, y.code);
        assert_eq!(x.nlocals, 2);
        assert_eq!(y.nlocals, 2);
    }

    #[test]
    fn huge_index_is_rejected() {
        if !avx() {
            return;
        }
        let err = generate("ldl 0 4000000000\n", &AssembleOptions::default()).unwrap_err();
        assert!(matches!(err, Error::IndexOutOfRange { line: 1, .. }));
    }

    #[test]
    fn huge_constant_id_is_rejected() {
        if !avx() {
            return;
        }
        for text in ["ldp 0 536870911\n", "const 536870911 1.0\n", "ldl 0 0\nldp 0 65536\n"] {
            let err = generate(text, &AssembleOptions::default()).unwrap_err();
            assert!(matches!(err, Error::IndexOutOfRange { .. }), "{text}: {err}");
        }
        let text = format!("ldp 0 {}\n", MAX_CONSTS - 1);
        let g = generate(&text, &AssembleOptions::default()).unwrap();
        assert_eq!(g.nconsts, MAX_CONSTS as usize);
    }

    #[test]
    fn call_sequence_balances_stack() {
        if !avx() {
            return;
        }
        // push x3 / pop x3 bracket every call.
        let g = generate("exp 1 0\n", &AssembleOptions::default()).unwrap();
        assert_eq!(&g.code[..3], &[0x57, 0x56, 0x52]);
        let n = g.code.len();
        assert_eq!(&g.code[n - 4..], &[0x5A, 0x5E, 0x5F, 0xC3]);
    }

    #[test]
    fn options_from_env_defaults() {
        // Neither variable is set by the test harness.
        if std::env::var_os("VEXJIT_KIND").is_none() && std::env::var_os("VEXJIT_DUMP_CODE").is_none()
        {
            assert_eq!(AssembleOptions::from_env(), AssembleOptions::default());
        }
    }
}
