use std::fmt;
use std::str::FromStr;

#[cfg(target_arch = "x86_64")]
mod x64;

#[cfg(target_arch = "x86_64")]
pub use x64::*;

#[cfg(not(target_arch = "x86_64"))]
compile_error!("vexjit only emits x86-64 AVX code");

/// Number of vector registers a program may name, for every kind.
pub const NUM_SLOTS: u32 = 16;

/// Element width × lane count, fixed for a whole program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SimdKind {
    /// 4 × f32 in an xmm register.
    #[default]
    Xmm,
    /// 8 × f32 in a ymm register.
    Ymm,
}

impl SimdKind {
    pub const ALL: [SimdKind; 2] = [SimdKind::Xmm, SimdKind::Ymm];

    pub fn lanes(self) -> usize {
        match self {
            SimdKind::Xmm => 4,
            SimdKind::Ymm => 8,
        }
    }

    /// Size of one lane in bytes.
    pub fn scalar_bytes(self) -> usize {
        std::mem::size_of::<f32>()
    }

    /// Size of a whole vector in bytes.
    pub fn vector_bytes(self) -> usize {
        self.lanes() * self.scalar_bytes()
    }

    /// Whether the running CPU can execute code of this kind.
    pub fn is_supported(self) -> bool {
        // Both kinds are VEX-encoded.
        std::arch::is_x86_feature_detected!("avx")
    }
}

impl fmt::Display for SimdKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimdKind::Xmm => write!(f, "xmm"),
            SimdKind::Ymm => write!(f, "ymm"),
        }
    }
}

impl FromStr for SimdKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "xmm" | "xmmps" | "4" => Ok(SimdKind::Xmm),
            "ymm" | "ymmps" | "8" => Ok(SimdKind::Ymm),
            other => Err(format!("unknown SIMD kind `{other}`")),
        }
    }
}

/// Elementwise two-operand vector operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Min,
    Max,
    And,
    /// `!lhs & rhs`
    AndNot,
    Or,
    Xor,
}

/// Rounding mode for `round`/`floor`/`ceil`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundMode {
    Nearest,
    Floor,
    Ceil,
}

impl RoundMode {
    /// ROUNDPS immediate: mode in bits 0-1, bit 3 suppresses the precision
    /// exception.
    pub fn imm8(self) -> i8 {
        let mode = match self {
            RoundMode::Nearest => 0,
            RoundMode::Floor => 1,
            RoundMode::Ceil => 2,
        };
        mode | 8
    }
}
