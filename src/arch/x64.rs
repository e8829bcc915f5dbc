use dynasmrt::x64::X64Relocation;
use dynasmrt::{dynasm, DynasmApi, VecAssembler};

use super::{BinOp, RoundMode, SimdKind};
use crate::error::{Error, Result};

pub type Assembler = VecAssembler<X64Relocation>;

// Register assignments (System V AMD64 ABI, set by the caller):
//   rdi = constants base
//   rsi = locals base
//   rdx = function table address array
//
// All three are caller-saved, so they are pushed around every helper call.
// SIMD slot N is xmmN / ymmN directly.
//
// Arguments to helpers:
//   rdi = pointer to the first argument vector (also receives the result)
//   rsi = pointer to the second argument vector (binary helpers only)

/// General-purpose registers the builder moves around.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gpr {
    Rdi,
    Rsi,
    Rdx,
}

/// `vop dst, lhs, rhs` for the builder's kind.
macro_rules! vex3 {
    ($ops:ident, $kind:expr, $mnem:ident, $d:ident, $a:ident, $b:ident) => {
        match $kind {
            SimdKind::Xmm => dynasm!($ops ; .arch x64 ; $mnem Rx($d), Rx($a), Rx($b)),
            SimdKind::Ymm => dynasm!($ops ; .arch x64 ; $mnem Ry($d), Ry($a), Ry($b)),
        }
    };
}

/// `vop dst, src` for the builder's kind.
macro_rules! vex2 {
    ($ops:ident, $kind:expr, $mnem:ident, $d:ident, $s:ident) => {
        match $kind {
            SimdKind::Xmm => dynasm!($ops ; .arch x64 ; $mnem Rx($d), Rx($s)),
            SimdKind::Ymm => dynasm!($ops ; .arch x64 ; $mnem Ry($d), Ry($s)),
        }
    };
}

/// Emits raw AVX, stack and call instructions into a growable byte buffer.
///
/// The builder does no validation: slot numbers must already be below
/// [`super::NUM_SLOTS`] and offsets must be the final byte displacements.
pub struct SimdBuilder {
    ops: Assembler,
    kind: SimdKind,
}

impl SimdBuilder {
    pub fn new(kind: SimdKind) -> Self {
        SimdBuilder {
            ops: Assembler::new(0),
            kind,
        }
    }

    pub fn kind(&self) -> SimdKind {
        self.kind
    }

    /// Bytes emitted so far.
    pub fn len(&self) -> usize {
        self.ops.offset().0
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // ─── Memory ─────────────────────────────────────────────────────────────

    /// `vbroadcastss dst, [rdi + offset]`
    pub fn broadcast_const(&mut self, dst: u8, offset: i32) {
        let ops = &mut self.ops;
        match self.kind {
            SimdKind::Xmm => dynasm!(ops ; .arch x64 ; vbroadcastss Rx(dst), DWORD [rdi + offset]),
            SimdKind::Ymm => dynasm!(ops ; .arch x64 ; vbroadcastss Ry(dst), DWORD [rdi + offset]),
        }
    }

    /// `vmovups dst, [rsi + offset]`
    pub fn load_local(&mut self, dst: u8, offset: i32) {
        let ops = &mut self.ops;
        match self.kind {
            SimdKind::Xmm => dynasm!(ops ; .arch x64 ; vmovups Rx(dst), [rsi + offset]),
            SimdKind::Ymm => dynasm!(ops ; .arch x64 ; vmovups Ry(dst), [rsi + offset]),
        }
    }

    /// `vmovups [rsi + offset], src`
    pub fn store_local(&mut self, src: u8, offset: i32) {
        let ops = &mut self.ops;
        match self.kind {
            SimdKind::Xmm => dynasm!(ops ; .arch x64 ; vmovups [rsi + offset], Rx(src)),
            SimdKind::Ymm => dynasm!(ops ; .arch x64 ; vmovups [rsi + offset], Ry(src)),
        }
    }

    // ─── Arithmetic ─────────────────────────────────────────────────────────

    /// Elementwise `dst = lhs <op> rhs`. Bitwise ops act on the raw bits.
    pub fn binary(&mut self, op: BinOp, dst: u8, lhs: u8, rhs: u8) {
        let ops = &mut self.ops;
        let kind = self.kind;
        match op {
            BinOp::Add => vex3!(ops, kind, vaddps, dst, lhs, rhs),
            BinOp::Sub => vex3!(ops, kind, vsubps, dst, lhs, rhs),
            BinOp::Mul => vex3!(ops, kind, vmulps, dst, lhs, rhs),
            BinOp::Div => vex3!(ops, kind, vdivps, dst, lhs, rhs),
            BinOp::Min => vex3!(ops, kind, vminps, dst, lhs, rhs),
            BinOp::Max => vex3!(ops, kind, vmaxps, dst, lhs, rhs),
            BinOp::And => vex3!(ops, kind, vandps, dst, lhs, rhs),
            BinOp::AndNot => vex3!(ops, kind, vandnps, dst, lhs, rhs),
            BinOp::Or => vex3!(ops, kind, vorps, dst, lhs, rhs),
            BinOp::Xor => vex3!(ops, kind, vxorps, dst, lhs, rhs),
        }
    }

    pub fn sqrt(&mut self, dst: u8, src: u8) {
        let ops = &mut self.ops;
        vex2!(ops, self.kind, vsqrtps, dst, src);
    }

    /// Register copy.
    pub fn mov(&mut self, dst: u8, src: u8) {
        let ops = &mut self.ops;
        vex2!(ops, self.kind, vmovaps, dst, src);
    }

    pub fn round(&mut self, dst: u8, src: u8, mode: RoundMode) {
        let ops = &mut self.ops;
        let imm = mode.imm8();
        match self.kind {
            SimdKind::Xmm => dynasm!(ops ; .arch x64 ; vroundps Rx(dst), Rx(src), imm),
            SimdKind::Ymm => dynasm!(ops ; .arch x64 ; vroundps Ry(dst), Ry(src), imm),
        }
    }

    // ─── Stack and calls ────────────────────────────────────────────────────

    pub fn push(&mut self, reg: Gpr) {
        let ops = &mut self.ops;
        match reg {
            Gpr::Rdi => dynasm!(ops ; .arch x64 ; push rdi),
            Gpr::Rsi => dynasm!(ops ; .arch x64 ; push rsi),
            Gpr::Rdx => dynasm!(ops ; .arch x64 ; push rdx),
        }
    }

    pub fn pop(&mut self, reg: Gpr) {
        let ops = &mut self.ops;
        match reg {
            Gpr::Rdi => dynasm!(ops ; .arch x64 ; pop rdi),
            Gpr::Rsi => dynasm!(ops ; .arch x64 ; pop rsi),
            Gpr::Rdx => dynasm!(ops ; .arch x64 ; pop rdx),
        }
    }

    /// Move the stack top by `delta` bytes (negative reserves space).
    pub fn adjust_stack(&mut self, delta: i32) {
        let ops = &mut self.ops;
        if delta < 0 {
            let n = -delta;
            dynasm!(ops ; .arch x64 ; sub rsp, n);
        } else if delta > 0 {
            dynasm!(ops ; .arch x64 ; add rsp, delta);
        }
    }

    /// `vmovups [rsp], src`
    pub fn store_stack(&mut self, src: u8) {
        let ops = &mut self.ops;
        match self.kind {
            SimdKind::Xmm => dynasm!(ops ; .arch x64 ; vmovups [rsp], Rx(src)),
            SimdKind::Ymm => dynasm!(ops ; .arch x64 ; vmovups [rsp], Ry(src)),
        }
    }

    /// `vmovups dst, [rsp]`
    pub fn load_stack(&mut self, dst: u8) {
        let ops = &mut self.ops;
        match self.kind {
            SimdKind::Xmm => dynasm!(ops ; .arch x64 ; vmovups Rx(dst), [rsp]),
            SimdKind::Ymm => dynasm!(ops ; .arch x64 ; vmovups Ry(dst), [rsp]),
        }
    }

    /// `mov reg, rsp`: point an argument register at the stack top.
    pub fn arg_from_stack(&mut self, reg: Gpr) {
        let ops = &mut self.ops;
        match reg {
            Gpr::Rdi => dynasm!(ops ; .arch x64 ; mov rdi, rsp),
            Gpr::Rsi => dynasm!(ops ; .arch x64 ; mov rsi, rsp),
            Gpr::Rdx => dynasm!(ops ; .arch x64 ; mov rdx, rsp),
        }
    }

    /// `call [rdx + offset]` through the function table.
    ///
    /// On ymm the upper halves are cleared first: the helpers are plain
    /// SSE code and every vector register is clobbered by the call anyway.
    pub fn call_table(&mut self, offset: i32) {
        let ops = &mut self.ops;
        if self.kind == SimdKind::Ymm {
            dynasm!(ops ; .arch x64 ; vzeroupper);
        }
        dynasm!(ops ; .arch x64 ; call QWORD [rdx + offset]);
    }

    pub fn ret(&mut self) {
        let ops = &mut self.ops;
        if self.kind == SimdKind::Ymm {
            dynasm!(ops ; .arch x64 ; vzeroupper);
        }
        dynasm!(ops ; .arch x64 ; ret);
    }

    /// Resolve relocations and hand back the encoded bytes.
    pub fn finish(self) -> Result<Vec<u8>> {
        self.ops.finalize().map_err(|e| Error::Encode(e.to_string()))
    }
}
