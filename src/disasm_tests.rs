use std::fmt::Write;

use yaxpeax_arch::{Decoder, LengthedInstruction, U8Reader};
use yaxpeax_x86::amd64::InstDecoder;

use crate::{AssembleOptions, Executable, SimdKind, assemble_with};

fn disasm_exe(exe: &Executable) -> String {
    disasm_bytes(exe.code())
}

/// One instruction per line, `offset: text`. Undecodable bytes are marked.
fn disasm_bytes(code: &[u8]) -> String {
    let mut out = String::new();
    let decoder = InstDecoder::default();
    let mut reader = U8Reader::new(code);
    let mut offset = 0usize;

    while offset < code.len() {
        match decoder.decode(&mut reader) {
            Ok(inst) => {
                let len = inst.len().to_const() as usize;
                writeln!(&mut out, "{offset:06x}:  {inst}").unwrap();
                offset += len;
            }
            Err(_) => {
                writeln!(&mut out, "{offset:06x}:  <decode error> (0x{:02x})", code[offset]).unwrap();
                break;
            }
        }
    }

    out
}

fn mnemonics(listing: &str) -> Vec<String> {
    listing
        .lines()
        .filter_map(|l| l.split_once(":  ").map(|(_, text)| text))
        .map(|text| text.split_whitespace().next().unwrap_or("").to_owned())
        .collect()
}

fn compile(text: &str, kind: SimdKind) -> Option<Executable> {
    if !kind.is_supported() {
        return None;
    }
    Some(assemble_with(text, &AssembleOptions::new(kind)).unwrap())
}

const EVERY_FORM: &str = "const 0 2.0\n\
    ldp 0 0\n\
    ldl 1 0\n\
    add 2 0 1\nsub 2 0 1\nmul 2 0 1\ndiv 2 0 1\n\
    min 2 0 1\nmax 2 0 1\nand 2 0 1\nandnot 2 0 1\nor 2 0 1\nxor 2 0 1\n\
    sqrt 3 2\nmov 4 3\nround 5 4\nfloor 6 5\nceil 7 6\n\
    stl 7 1\n";

#[test]
fn every_form_decodes_to_expected_mnemonics() {
    for kind in SimdKind::ALL {
        let Some(exe) = compile(EVERY_FORM, kind) else { return };
        let listing = disasm_exe(&exe);
        eprintln!("=== every form ({kind}) ===\n{listing}");
        assert!(!listing.contains("decode error"), "{listing}");

        let mut want = vec![
            "vbroadcastss", "vmovups", "vaddps", "vsubps", "vmulps", "vdivps", "vminps", "vmaxps",
            "vandps", "vandnps", "vorps", "vxorps", "vsqrtps", "vmovaps", "vroundps", "vroundps",
            "vroundps", "vmovups",
        ];
        if kind == SimdKind::Ymm {
            want.push("vzeroupper");
        }
        want.push("ret");
        assert_eq!(mnemonics(&listing), want, "{listing}");
    }
}

#[test]
fn ymm_uses_ymm_registers() {
    let Some(exe) = compile("ldl 9 0\nmul 15 9 9\nstl 15 1\n", SimdKind::Ymm) else { return };
    let listing = disasm_exe(&exe);
    eprintln!("=== ymm ===\n{listing}");
    assert!(listing.contains("ymm9"), "{listing}");
    assert!(listing.contains("ymm15"), "{listing}");
    assert!(!listing.contains("xmm"), "{listing}");
}

#[test]
fn unary_call_lowering_shape() {
    let Some(exe) = compile("sin 1 0\n", SimdKind::Xmm) else { return };
    let listing = disasm_exe(&exe);
    eprintln!("=== unary call ===\n{listing}");
    assert_eq!(
        mnemonics(&listing),
        vec![
            "push", "push", "push", "sub", "vmovups", "mov", "call", "vmovups", "add", "pop",
            "pop", "pop", "ret",
        ],
        "{listing}"
    );
}

#[test]
fn binary_call_lowering_shape() {
    let Some(exe) = compile("pow 2 0 1\n", SimdKind::Ymm) else { return };
    let listing = disasm_exe(&exe);
    eprintln!("=== binary call ===\n{listing}");
    assert_eq!(
        mnemonics(&listing),
        vec![
            "push", "push", "push", "sub", "vmovups", "mov", "sub", "vmovups", "mov",
            "vzeroupper", "call", "vmovups", "add", "pop", "pop", "pop", "vzeroupper", "ret",
        ],
        "{listing}"
    );
}
