#![allow(dead_code)]

use std::path::{Path, PathBuf};

use ollyscript::commands::{add_binary_command, init_project_command};

pub const IMAGE_BASE: u64 = 0x40_0000;
pub const TEXT_RVA: u32 = 0x1000;
pub const DATA_RVA: u32 = 0x2000;

/// push ebp; mov ebp, esp; xor eax, eax; pop ebp; ret
pub const CODE: &[u8] = &[0x55, 0x8B, 0xEC, 0x33, 0xC0, 0x5D, 0xC3];

/// Map export matching the fixture's two sections.
pub const SAMPLE_MAP: &str = "\
 Start         Length     Name                   Class
 0001:00000000 00000100H .text                   CODE
 0002:00000000 00000080H .data                   DATA


  Address         Publics by Value

 0001:00000000       _start
 0001:00000003       sub_401003
 0002:0000002A       dword_40202A

Program entry point at 0001:00000000
";

fn put_u16(buf: &mut [u8], at: usize, value: u16) {
    buf[at..at + 2].copy_from_slice(&value.to_le_bytes());
}

fn put_u32(buf: &mut [u8], at: usize, value: u32) {
    buf[at..at + 4].copy_from_slice(&value.to_le_bytes());
}

fn section_header(buf: &mut [u8], at: usize, name: &[u8], vsize: u32, rva: u32, raw: u32) {
    buf[at..at + name.len()].copy_from_slice(name);
    put_u32(buf, at + 8, vsize);
    put_u32(buf, at + 12, rva);
    put_u32(buf, at + 16, 0x200);
    put_u32(buf, at + 20, raw);
    put_u32(buf, at + 36, 0x6000_0020);
}

/// Minimal PE32 (i386) image with `.text` at RVA 0x1000 and `.data` at RVA 0x2000.
pub fn pe32_image() -> Vec<u8> {
    let mut buf = vec![0u8; 0x600];
    buf[0] = b'M';
    buf[1] = b'Z';
    put_u32(&mut buf, 0x3C, 0x80);

    buf[0x80..0x84].copy_from_slice(b"PE\0\0");
    let coff = 0x84;
    put_u16(&mut buf, coff, 0x014C);
    put_u16(&mut buf, coff + 2, 2);
    put_u16(&mut buf, coff + 16, 224);
    put_u16(&mut buf, coff + 18, 0x0102);

    let opt = coff + 20;
    put_u16(&mut buf, opt, 0x010B);
    put_u32(&mut buf, opt + 4, 0x200);
    put_u32(&mut buf, opt + 16, TEXT_RVA);
    put_u32(&mut buf, opt + 20, TEXT_RVA);
    put_u32(&mut buf, opt + 24, DATA_RVA);
    put_u32(&mut buf, opt + 28, IMAGE_BASE as u32);
    put_u32(&mut buf, opt + 32, 0x1000);
    put_u32(&mut buf, opt + 36, 0x200);
    put_u16(&mut buf, opt + 40, 4);
    put_u16(&mut buf, opt + 48, 4);
    put_u32(&mut buf, opt + 56, 0x3000);
    put_u32(&mut buf, opt + 60, 0x200);
    put_u16(&mut buf, opt + 68, 3);
    put_u32(&mut buf, opt + 72, 0x10_0000);
    put_u32(&mut buf, opt + 76, 0x1000);
    put_u32(&mut buf, opt + 80, 0x10_0000);
    put_u32(&mut buf, opt + 84, 0x1000);
    put_u32(&mut buf, opt + 92, 16);

    let sections = opt + 224;
    section_header(&mut buf, sections, b".text", 0x100, TEXT_RVA, 0x200);
    section_header(&mut buf, sections + 40, b".data", 0x80, DATA_RVA, 0x400);

    buf[0x200..0x200 + CODE.len()].copy_from_slice(CODE);
    buf
}

/// Initialize a project under `root` and register the fixture as `prog.exe`.
pub fn project_with_fixture(root: &Path) -> String {
    let root_str = root.to_string_lossy().to_string();
    init_project_command(&root_str, Some("Fixture".into())).expect("init project");
    let bin = write_fixture(root, "prog.exe");
    add_binary_command(&root_str, &bin.to_string_lossy(), None, None, None, false)
        .expect("add binary");
    root_str
}

pub fn write_fixture(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, pe32_image()).expect("write fixture");
    path
}
