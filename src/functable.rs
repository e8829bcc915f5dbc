//! Built-in math functions that generated code calls through a table.
//!
//! Generated code addresses an entry as `[rdx + index * 8]`, so the position
//! of a name in [`FUNC_NAMES`] is baked into every artifact. The table is
//! built once per process and never changes afterwards.

use std::sync::OnceLock;

use crate::arch::SimdKind;

/// Signature of every table entry: a pointer to one (unary) or two
/// contiguous (binary) argument vectors. The result overwrites the first.
pub type VectorFn = unsafe extern "sysv64" fn(args: *mut f32);

/// Supported function names, in call-offset order.
pub const FUNC_NAMES: &[&str] = &[
    "sin", "cos", "tan", "asin", "acos", "atan", "sinh", "cosh", "tanh", "exp", "log", "log2",
    "log10", "cbrt", "abs", "rsqrt", "pow", "atan2", "fmod", "hypot",
];

/// Names before this index take one argument, the rest take two.
const FIRST_BINARY: usize = 16;

/// Resolved entry addresses, one array per kind.
pub struct FunctionTable {
    xmm: Vec<usize>,
    ymm: Vec<usize>,
}

static GLOBAL: OnceLock<FunctionTable> = OnceLock::new();

impl FunctionTable {
    /// The process-wide table, built on first use.
    pub fn global() -> &'static FunctionTable {
        GLOBAL.get_or_init(|| {
            let table = FunctionTable::build();
            tracing::debug!(entries = FUNC_NAMES.len(), "function table built");
            table
        })
    }

    fn build() -> FunctionTable {
        FunctionTable {
            xmm: entries::<4>(),
            ymm: entries::<8>(),
        }
    }

    /// Position of `name` in the table, or `None` if it is not a built-in.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        FUNC_NAMES.iter().position(|n| *n == name)
    }

    /// Number of vector arguments the entry at `index` takes.
    pub fn arity(&self, index: usize) -> usize {
        if index < FIRST_BINARY { 1 } else { 2 }
    }

    pub fn len(&self) -> usize {
        FUNC_NAMES.len()
    }

    pub fn is_empty(&self) -> bool {
        FUNC_NAMES.is_empty()
    }

    /// The address array generated code of `kind` calls through.
    pub fn addresses(&self, kind: SimdKind) -> &[usize] {
        match kind {
            SimdKind::Xmm => &self.xmm,
            SimdKind::Ymm => &self.ymm,
        }
    }
}

fn entries<const N: usize>() -> Vec<usize> {
    let fns: [VectorFn; 20] = [
        unary::<N, Sin>,
        unary::<N, Cos>,
        unary::<N, Tan>,
        unary::<N, Asin>,
        unary::<N, Acos>,
        unary::<N, Atan>,
        unary::<N, Sinh>,
        unary::<N, Cosh>,
        unary::<N, Tanh>,
        unary::<N, Exp>,
        unary::<N, Ln>,
        unary::<N, Log2>,
        unary::<N, Log10>,
        unary::<N, Cbrt>,
        unary::<N, Abs>,
        unary::<N, Rsqrt>,
        binary::<N, Pow>,
        binary::<N, Atan2>,
        binary::<N, Fmod>,
        binary::<N, Hypot>,
    ];
    debug_assert_eq!(fns.len(), FUNC_NAMES.len());
    fns.iter().map(|f| *f as usize).collect()
}

// ─── Scalar kernels ─────────────────────────────────────────────────────────

trait Unary {
    fn apply(x: f32) -> f32;
}

trait Binary {
    fn apply(x: f32, y: f32) -> f32;
}

macro_rules! unary_kernels {
    ($($name:ident => |$x:ident| $body:expr;)*) => {
        $(
            struct $name;
            impl Unary for $name {
                fn apply($x: f32) -> f32 { $body }
            }
        )*
    };
}

macro_rules! binary_kernels {
    ($($name:ident => |$x:ident, $y:ident| $body:expr;)*) => {
        $(
            struct $name;
            impl Binary for $name {
                fn apply($x: f32, $y: f32) -> f32 { $body }
            }
        )*
    };
}

unary_kernels! {
    Sin => |x| x.sin();
    Cos => |x| x.cos();
    Tan => |x| x.tan();
    Asin => |x| x.asin();
    Acos => |x| x.acos();
    Atan => |x| x.atan();
    Sinh => |x| x.sinh();
    Cosh => |x| x.cosh();
    Tanh => |x| x.tanh();
    Exp => |x| x.exp();
    Ln => |x| x.ln();
    Log2 => |x| x.log2();
    Log10 => |x| x.log10();
    Cbrt => |x| x.cbrt();
    Abs => |x| x.abs();
    Rsqrt => |x| 1.0 / x.sqrt();
}

binary_kernels! {
    Pow => |x, y| x.powf(y);
    Atan2 => |x, y| x.atan2(y);
    Fmod => |x, y| x % y;
    Hypot => |x, y| x.hypot(y);
}

unsafe extern "sysv64" fn unary<const N: usize, F: Unary>(args: *mut f32) {
    // SAFETY: generated code passes a pointer to N writable lanes on its stack.
    let lanes = unsafe { std::slice::from_raw_parts_mut(args, N) };
    for x in lanes {
        *x = F::apply(*x);
    }
}

unsafe extern "sysv64" fn binary<const N: usize, F: Binary>(args: *mut f32) {
    // SAFETY: generated code lays out lhs then rhs, N lanes each.
    let (lhs, rhs) = unsafe { std::slice::from_raw_parts_mut(args, 2 * N) }.split_at_mut(N);
    for (x, y) in lhs.iter_mut().zip(rhs.iter()) {
        *x = F::apply(*x, *y);
    }
}
