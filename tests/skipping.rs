//! User-mode skipping.

mod common;

use common::*;
use stf::prelude::*;
use tempfile::tempdir;

/// instruction 1: enters supervisor mode (skipped from here on)
/// instructions 2-3: supervisor code, instruction 3 returns to user mode
/// instructions 4-6: user code
fn write_mode_trace(path: &std::path::Path) {
    let mut writer = inst_writer(path, 0x1000, &WriterOptions::default());

    writer.write_record(&nop()).unwrap();
    writer
        .write_record(&mode_change(ExecutionMode::Supervisor))
        .unwrap();

    writer.write_record(&nop()).unwrap();

    writer.write_record(&nop()).unwrap();
    writer
        .write_record(&mode_change(ExecutionMode::User))
        .unwrap();

    write_opcodes(&mut writer, NOP, 3);
    writer.close().unwrap();
}

#[test]
fn non_user_items_are_marked_skipped() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("modes.zstf");
    write_mode_trace(&path);

    let options = ReaderOptions {
        only_user_mode: true,
        ..ReaderOptions::default()
    };
    let mut reader = InstReader::open(&path, &options).unwrap();

    let mut skipped = Vec::new();
    let mut unskipped_indices = Vec::new();
    while let Some(inst) = reader.next_instruction().unwrap() {
        skipped.push(inst.skipped());
        if !inst.skipped() {
            unskipped_indices.push(inst.index());
        }
    }

    // The mode change lands on instruction 1, so 1-3 are skipped; the
    // return to user mode on instruction 3 unskips from instruction 4.
    assert_eq!(skipped, vec![true, true, true, false, false, false]);
    // Unskipped items keep a dense 1-based index sequence.
    assert_eq!(unskipped_indices, vec![1, 2, 3]);
}

#[test]
fn skipping_applies_to_branches() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("branch_modes.zstf");
    let mut writer = inst_writer(&path, 0x1000, &WriterOptions::default());

    // A user-mode branch, then a trap into supervisor code containing a
    // branch, then back to user code with one more branch.
    writer.write_record(&opcode32(0x008000ef)).unwrap(); // JAL +8 @0x1000
    writer.write_record(&pc_target(0x1008)).unwrap();

    writer.write_record(&nop()).unwrap(); // @0x1008
    writer
        .write_record(&mode_change(ExecutionMode::Supervisor))
        .unwrap();

    writer.write_record(&opcode32(0x008000ef)).unwrap(); // JAL +8 @0x100c
    writer.write_record(&pc_target(0x1014)).unwrap();

    writer.write_record(&nop()).unwrap(); // @0x1014
    writer
        .write_record(&mode_change(ExecutionMode::User))
        .unwrap();

    writer.write_record(&opcode32(0x008000ef)).unwrap(); // JAL +8 @0x1018
    writer.write_record(&pc_target(0x1020)).unwrap();
    writer.write_record(&nop()).unwrap(); // @0x1020
    writer.close().unwrap();

    let options = ReaderOptions {
        only_user_mode: true,
        ..ReaderOptions::default()
    };
    let mut reader = BranchReader::open(&path, &options).unwrap();

    let first = reader.next_branch().unwrap().unwrap();
    assert!(!first.skipped());
    assert_eq!(first.pc(), 0x1000);
    assert_eq!(first.index(), 1);

    let second = reader.next_branch().unwrap().unwrap();
    assert!(second.skipped());
    assert_eq!(second.pc(), 0x100c);
    // Skipped items repeat the previous unskipped index.
    assert_eq!(second.index(), 1);

    let third = reader.next_branch().unwrap().unwrap();
    assert!(!third.skipped());
    assert_eq!(third.pc(), 0x1018);
    assert_eq!(third.index(), 2);

    assert!(reader.next_branch().unwrap().is_none());
}

#[test]
fn skipping_disables_fast_seek_but_stays_correct() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("seek_skip.zstf");
    let options = WriterOptions {
        chunk_markers: 8,
        ..WriterOptions::default()
    };
    let mut writer = inst_writer(&path, 0x1000, &options);
    write_opcodes(&mut writer, NOP, 100);
    writer.close().unwrap();

    let reader_options = ReaderOptions {
        only_user_mode: true,
        buffer_size: 16,
        force_single_threaded: true,
        ..ReaderOptions::default()
    };
    let mut reader = InstReader::open(&path, &reader_options).unwrap();
    // With skipping enabled the seek must take the slow path; the result
    // is still exact.
    let cursor = reader.seek_from_beginning(80).unwrap();
    let inst = reader.item(&cursor).unwrap().unwrap();
    assert_eq!(inst.pc(), 0x1000 + 4 * 79);
}
