//! Parser for the slot-based instruction text.
//!
//! One instruction per line, tokens separated by spaces:
//!
//! ```text
//! const 0 2.0
//! ldp 0 0
//! ldl 1 0
//! mul 2 0 1
//! stl 2 0
//! ```
//!
//! Lines are parsed independently. Order in the text is execution order; the
//! parser does not check that slots are written before they are read.

use crate::arch::{BinOp, NUM_SLOTS, RoundMode};
use crate::error::{Error, Result};
use crate::functable::FunctionTable;

/// A SIMD slot number, already checked against [`NUM_SLOTS`].
pub type Slot = u8;

/// One parsed instruction line.
#[derive(Debug, Clone, PartialEq)]
pub enum Inst {
    /// `const <id> <literal>`
    Const { id: u32, value: f32 },
    /// `ldp <dst> <id>`
    LoadConst { dst: Slot, id: u32 },
    /// `ldl <dst> <id>`
    LoadLocal { dst: Slot, id: u32 },
    /// `stl <src> <id>`
    StoreLocal { src: Slot, id: u32 },
    Binary { op: BinOp, dst: Slot, lhs: Slot, rhs: Slot },
    Sqrt { dst: Slot, src: Slot },
    Mov { dst: Slot, src: Slot },
    Round { mode: RoundMode, dst: Slot, src: Slot },
    /// `<funcname> <dst> <src>`
    Call1 { func: usize, dst: Slot, src: Slot },
    /// `<funcname> <dst> <lhs> <rhs>`
    Call2 { func: usize, dst: Slot, lhs: Slot, rhs: Slot },
}

/// An instruction with the 1-based line it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Line {
    pub number: usize,
    pub inst: Inst,
}

fn binop(mnemonic: &str) -> Option<BinOp> {
    Some(match mnemonic {
        "add" => BinOp::Add,
        "sub" => BinOp::Sub,
        "mul" => BinOp::Mul,
        "div" => BinOp::Div,
        "min" => BinOp::Min,
        "max" => BinOp::Max,
        "and" => BinOp::And,
        "andnot" => BinOp::AndNot,
        "or" => BinOp::Or,
        "xor" => BinOp::Xor,
        _ => return None,
    })
}

fn round_mode(mnemonic: &str) -> Option<RoundMode> {
    Some(match mnemonic {
        "round" => RoundMode::Nearest,
        "floor" => RoundMode::Floor,
        "ceil" => RoundMode::Ceil,
        _ => return None,
    })
}

/// Operand cursor over one line's tokens.
struct Operands<'a> {
    line: usize,
    mnemonic: &'a str,
    tokens: &'a [&'a str],
}

impl<'a> Operands<'a> {
    /// Require exactly `n` operands.
    fn expect(&self, n: usize) -> Result<()> {
        let got = self.tokens.len();
        if got == n {
            return Ok(());
        }
        let what = if got < n { "too few" } else { "too many" };
        Err(Error::Parse {
            line: self.line,
            message: format!("`{}` takes {n} operands, {what} given ({got})", self.mnemonic),
        })
    }

    fn index(&self, i: usize) -> Result<u32> {
        let tok = self.tokens[i];
        let digits = !tok.is_empty() && tok.bytes().all(|b| b.is_ascii_digit());
        digits.then(|| tok.parse::<u32>().ok()).flatten().ok_or_else(|| Error::Parse {
            line: self.line,
            message: format!("expected a non-negative integer, found `{tok}`"),
        })
    }

    fn slot(&self, i: usize) -> Result<Slot> {
        let slot = self.index(i)?;
        if slot >= NUM_SLOTS {
            return Err(Error::SlotOutOfRange {
                line: self.line,
                slot,
                max: NUM_SLOTS,
            });
        }
        Ok(slot as Slot)
    }

    fn literal(&self, i: usize) -> Result<f32> {
        let tok = self.tokens[i];
        tok.parse::<f32>().map_err(|_| Error::BadLiteral {
            line: self.line,
            literal: tok.to_owned(),
        })
    }
}

/// Parse one non-empty line.
pub fn parse_line(number: usize, text: &str, table: &FunctionTable) -> Result<Inst> {
    let tokens: Vec<&str> = text.split(' ').filter(|t| !t.is_empty()).collect();
    let Some((&mnemonic, rest)) = tokens.split_first() else {
        return Err(Error::Parse {
            line: number,
            message: "empty instruction".into(),
        });
    };
    let ops = Operands {
        line: number,
        mnemonic,
        tokens: rest,
    };

    let inst = match mnemonic {
        "const" => {
            ops.expect(2)?;
            Inst::Const {
                id: ops.index(0)?,
                value: ops.literal(1)?,
            }
        }
        "ldp" => {
            ops.expect(2)?;
            Inst::LoadConst {
                dst: ops.slot(0)?,
                id: ops.index(1)?,
            }
        }
        "ldl" => {
            ops.expect(2)?;
            Inst::LoadLocal {
                dst: ops.slot(0)?,
                id: ops.index(1)?,
            }
        }
        "stl" => {
            ops.expect(2)?;
            Inst::StoreLocal {
                src: ops.slot(0)?,
                id: ops.index(1)?,
            }
        }
        "sqrt" => {
            ops.expect(2)?;
            Inst::Sqrt {
                dst: ops.slot(0)?,
                src: ops.slot(1)?,
            }
        }
        "mov" => {
            ops.expect(2)?;
            Inst::Mov {
                dst: ops.slot(0)?,
                src: ops.slot(1)?,
            }
        }
        m => {
            if let Some(op) = binop(m) {
                ops.expect(3)?;
                Inst::Binary {
                    op,
                    dst: ops.slot(0)?,
                    lhs: ops.slot(1)?,
                    rhs: ops.slot(2)?,
                }
            } else if let Some(mode) = round_mode(m) {
                ops.expect(2)?;
                Inst::Round {
                    mode,
                    dst: ops.slot(0)?,
                    src: ops.slot(1)?,
                }
            } else if let Some(func) = table.index_of(m) {
                match table.arity(func) {
                    1 => {
                        ops.expect(2)?;
                        Inst::Call1 {
                            func,
                            dst: ops.slot(0)?,
                            src: ops.slot(1)?,
                        }
                    }
                    _ => {
                        ops.expect(3)?;
                        Inst::Call2 {
                            func,
                            dst: ops.slot(0)?,
                            lhs: ops.slot(1)?,
                            rhs: ops.slot(2)?,
                        }
                    }
                }
            } else {
                return Err(Error::UnknownMnemonic {
                    line: number,
                    mnemonic: m.to_owned(),
                });
            }
        }
    };

    Ok(inst)
}

/// Parse a whole program, skipping empty lines. Stops at the first error.
pub fn parse_program(text: &str, table: &FunctionTable) -> Result<Vec<Line>> {
    let mut lines = Vec::new();
    for (i, raw) in text.split('\n').enumerate() {
        let raw = raw.strip_suffix('\r').unwrap_or(raw);
        if raw.trim().is_empty() {
            continue;
        }
        let number = i + 1;
        let inst = parse_line(number, raw, table)?;
        tracing::trace!(line = number, ?inst, "parsed");
        lines.push(Line { number, inst });
    }
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Result<Vec<Inst>> {
        parse_program(text, FunctionTable::global())
            .map(|lines| lines.into_iter().map(|l| l.inst).collect())
    }

    #[test]
    fn parse_every_form() {
        let insts = parse(
            "const 0 2.5\n\
             ldp 0 0\n\
             ldl 1 3\n\
             andnot 2 0 1\n\
             sqrt 3 2\n\
             mov 4 3\n\
             floor 5 4\n\
             sin 6 5\n\
             pow 7 6 5\n\
             stl 7 1\n",
        )
        .unwrap();

        let t = FunctionTable::global();
        assert_eq!(
            insts,
            vec![
                Inst::Const { id: 0, value: 2.5 },
                Inst::LoadConst { dst: 0, id: 0 },
                Inst::LoadLocal { dst: 1, id: 3 },
                Inst::Binary { op: BinOp::AndNot, dst: 2, lhs: 0, rhs: 1 },
                Inst::Sqrt { dst: 3, src: 2 },
                Inst::Mov { dst: 4, src: 3 },
                Inst::Round { mode: RoundMode::Floor, dst: 5, src: 4 },
                Inst::Call1 { func: t.index_of("sin").unwrap(), dst: 6, src: 5 },
                Inst::Call2 { func: t.index_of("pow").unwrap(), dst: 7, lhs: 6, rhs: 5 },
                Inst::StoreLocal { src: 7, id: 1 },
            ]
        );
    }

    #[test]
    fn blank_lines_and_crlf() {
        let lines = parse_program("\n\nconst 0 1\r\n\n  \nldp 0 0\n", FunctionTable::global())
            .unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].number, 3);
        assert_eq!(lines[1].number, 6);
    }

    #[test]
    fn literal_forms() {
        for (text, want) in [("1", 1.0f32), ("-0.25", -0.25), ("1e3", 1000.0), (".5", 0.5)] {
            let insts = parse(&format!("const 0 {text}\n")).unwrap();
            assert_eq!(insts, vec![Inst::Const { id: 0, value: want }]);
        }
    }

    #[test]
    fn unknown_mnemonic() {
        let err = parse("froboz 0 1 2\n").unwrap_err();
        assert!(matches!(
            err,
            Error::UnknownMnemonic { line: 1, ref mnemonic } if mnemonic == "froboz"
        ));
    }

    #[test]
    fn too_few_operands() {
        for text in ["const 0", "ldp 0", "add 0 1", "sqrt 0", "sin 0", "pow 0 1"] {
            let err = parse(text).unwrap_err();
            assert!(matches!(err, Error::Parse { line: 1, .. }), "{text}: {err}");
        }
    }

    #[test]
    fn too_many_operands() {
        let err = parse("mov 0 1 2").unwrap_err();
        assert!(err.to_string().contains("too many"), "{err}");
        assert!(parse("sin 0 1 2").is_err());
    }

    #[test]
    fn bad_literal() {
        let err = parse("const 0 two\n").unwrap_err();
        assert!(matches!(err, Error::BadLiteral { ref literal, .. } if literal == "two"));
    }

    #[test]
    fn bad_integer_operands() {
        assert!(matches!(parse("ldp x 0").unwrap_err(), Error::Parse { .. }));
        assert!(matches!(parse("ldl 0 -1").unwrap_err(), Error::Parse { .. }));
        assert!(matches!(parse("add 0 1 2.0").unwrap_err(), Error::Parse { .. }));
        assert!(matches!(parse("ldl +3 0").unwrap_err(), Error::Parse { .. }));
        assert!(matches!(parse("mov 0 +1").unwrap_err(), Error::Parse { .. }));
        assert!(matches!(parse("stl 0 0x1").unwrap_err(), Error::Parse { .. }));
    }

    #[test]
    fn slot_range_is_checked() {
        assert!(parse("mov 15 0").is_ok());
        let err = parse("const 0 1\nmov 16 0").unwrap_err();
        assert!(matches!(err, Error::SlotOutOfRange { line: 2, slot: 16, max: 16 }));
    }

    #[test]
    fn error_reports_first_bad_line() {
        let err = parse("mov 0 1\nbogus 1\nalsobogus 2\n").unwrap_err();
        assert!(matches!(err, Error::UnknownMnemonic { line: 2, .. }));
    }
}
