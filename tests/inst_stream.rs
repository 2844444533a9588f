//! Instruction iteration, seeking, filtering, and container equivalence.

mod common;

use common::*;
use stf::prelude::*;
use stf::stf_records::{
    EventRecord,
    InstMemAccessRecord,
    InstMemContentRecord,
    OperandType,
};
use stf::stf_types::MemAccessType;
use tempfile::tempdir;

#[test]
fn ten_instructions_with_sequential_pcs() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("ten.zstf");
    let mut writer = inst_writer(&path, 0x1000, &WriterOptions::default());
    write_opcodes(&mut writer, 0xdead_beef, 10);
    writer.close().unwrap();

    let mut reader = InstReader::open(&path, &ReaderOptions::default()).unwrap();
    let mut expected_index = 1;
    while let Some(inst) = reader.next_instruction().unwrap() {
        assert_eq!(inst.index(), expected_index);
        assert_eq!(inst.opcode(), 0xdead_beef);
        assert_eq!(inst.pc(), 0x1000 + 4 * (expected_index - 1));
        assert!(!inst.skipped());
        expected_index += 1;
    }
    assert_eq!(expected_index, 11);
    assert_eq!(reader.num_insts_read(), 10);
    assert_eq!(reader.num_marker_records(), 10);
}

#[test]
fn records_attach_to_the_preceding_opcode() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("attach.zstf");
    let mut writer = inst_writer(&path, 0x1000, &WriterOptions::default());

    writer.write_record(&nop()).unwrap();
    writer
        .write_record(&int_operand(OperandType::Source, 5, 0x1234))
        .unwrap();
    writer
        .write_record(&Record::InstMemAccess(InstMemAccessRecord {
            va: 0x9000_0000,
            size: 8,
            attr: 0,
            access_type: MemAccessType::Write,
        }))
        .unwrap();
    writer
        .write_record(&Record::InstMemContent(InstMemContentRecord {
            data: vec![1, 2, 3, 4, 5, 6, 7, 8],
        }))
        .unwrap();
    writer.write_record(&nop()).unwrap();
    writer.close().unwrap();

    let mut reader = InstReader::open(&path, &ReaderOptions::default()).unwrap();
    let first = reader.next_instruction().unwrap().unwrap();
    assert_eq!(first.operands().len(), 1);
    assert_eq!(first.operands()[0].reg, 5);
    assert_eq!(first.mem_accesses().len(), 1);
    assert_eq!(first.mem_accesses()[0].access.va, 0x9000_0000);
    assert_eq!(
        first.mem_accesses()[0].content.as_ref().unwrap().data,
        vec![1, 2, 3, 4, 5, 6, 7, 8]
    );

    let second = reader.next_instruction().unwrap().unwrap();
    assert!(second.operands().is_empty());
    assert!(second.mem_accesses().is_empty());
    assert!(reader.next_instruction().unwrap().is_none());
}

#[test]
fn marker_seek_lands_on_the_requested_item() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("seek.zstf");
    // Small chunks so the seek crosses chunk boundaries.
    let options = WriterOptions {
        chunk_markers: 16,
        ..WriterOptions::default()
    };
    let mut writer = inst_writer(&path, 0x1000, &options);
    write_opcodes(&mut writer, NOP, 200);
    writer.close().unwrap();

    for k in [1u64, 15, 16, 17, 100, 199] {
        // Single-threaded mode exercises the chunk-index fast path.
        let reader_options = ReaderOptions {
            force_single_threaded: true,
            ..ReaderOptions::default()
        };
        let mut reader = InstReader::open(&path, &reader_options).unwrap();
        let cursor = reader.seek_from_beginning(k).unwrap();
        let inst = reader.item(&cursor).unwrap().unwrap();
        assert_eq!(inst.index(), k, "seek to {k}");
        assert_eq!(inst.pc(), 0x1000 + 4 * (k - 1));

        let mut cursor = cursor;
        assert!(reader.advance(&mut cursor).unwrap());
        let next = reader.item(&cursor).unwrap().unwrap();
        assert_eq!(next.index(), k + 1);
    }
}

#[test]
fn mid_iteration_seek_matches_linear_iteration() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("seek2.zstf");
    let options = WriterOptions {
        chunk_markers: 8,
        ..WriterOptions::default()
    };
    let mut writer = inst_writer(&path, 0x4000, &options);
    write_opcodes(&mut writer, NOP, 120);
    writer.close().unwrap();

    let reader_options = ReaderOptions {
        buffer_size: 16,
        force_single_threaded: true,
        ..ReaderOptions::default()
    };
    let mut reader = InstReader::open(&path, &reader_options).unwrap();
    let mut cursor = reader.begin().unwrap();
    for _ in 0..5 {
        reader.advance(&mut cursor).unwrap();
    }
    assert_eq!(reader.item(&cursor).unwrap().unwrap().index(), 6);

    // Far beyond the window: takes the chunk-skip path.
    reader.seek(&mut cursor, 90).unwrap();
    let inst = reader.item(&cursor).unwrap().unwrap();
    assert_eq!(inst.index(), 96);
    assert_eq!(inst.pc(), 0x4000 + 4 * 95);
}

#[test]
fn window_allows_local_rewind() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("rewind.zstf");
    let mut writer = inst_writer(&path, 0, &WriterOptions::default());
    write_opcodes(&mut writer, NOP, 64);
    writer.close().unwrap();

    let options = ReaderOptions {
        buffer_size: 16,
        ..ReaderOptions::default()
    };
    let mut reader = InstReader::open(&path, &options).unwrap();
    let mut cursor = reader.begin().unwrap();
    let saved = cursor;

    // Rewind by up to half the window is guaranteed to stay valid.
    for _ in 0..8 {
        reader.advance(&mut cursor).unwrap();
    }
    assert!(reader.is_valid(&saved));
    assert_eq!(reader.item(&saved).unwrap().unwrap().index(), 1);

    // Far past the window the old cursor goes stale.
    for _ in 0..40 {
        reader.advance(&mut cursor).unwrap();
    }
    assert!(!reader.is_valid(&saved));
    assert!(matches!(reader.item(&saved), Err(StfError::StaleCursor)));
}

#[test]
fn filtered_records_never_reach_items() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("filter.zstf");
    let mut writer = inst_writer(&path, 0, &WriterOptions::default());
    writer.write_record(&nop()).unwrap();
    writer
        .write_record(&Record::Event(EventRecord {
            event: EventKind::UserEcall,
            data: vec![93],
        }))
        .unwrap();
    writer.write_record(&nop()).unwrap();
    writer.close().unwrap();

    let mut reader = RecordReader::open(&path, &ReaderOptions::default()).unwrap();
    reader.filter_mut().filter(Descriptor::Event).unwrap();
    let mut seen = Vec::new();
    while let Some(record) = reader.next_record().unwrap() {
        seen.push(record.descriptor());
    }
    assert_eq!(
        seen,
        vec![Descriptor::InstOpcode32, Descriptor::InstOpcode32]
    );
}

#[test]
fn compressed_and_plain_streams_are_identical() {
    let dir = tempdir().unwrap();
    let plain = dir.path().join("trace.stf");
    let chunked = dir.path().join("trace.zstf");

    for (path, compress) in [(&plain, false), (&chunked, true)] {
        let options = WriterOptions {
            compress,
            chunk_markers: 8,
            ..WriterOptions::default()
        };
        let mut writer = inst_writer(path, 0x1000, &options);
        for i in 0..40u64 {
            writer.write_record(&nop()).unwrap();
            writer
                .write_record(&int_operand(OperandType::Dest, (i % 31) as u16 + 1, i))
                .unwrap();
        }
        writer.close().unwrap();
    }

    // Background decompression must observe the same record sequence.
    for force_single_threaded in [true, false] {
        let options = ReaderOptions {
            force_single_threaded,
            ..ReaderOptions::default()
        };
        let mut plain_reader = RecordReader::open(&plain, &options).unwrap();
        let mut chunked_reader = RecordReader::open(&chunked, &options).unwrap();
        loop {
            let a = plain_reader.next_record().unwrap().map(|r| r.into_record());
            let b = chunked_reader
                .next_record()
                .unwrap()
                .map(|r| r.into_record());
            assert_eq!(a, b);
            if a.is_none() {
                break;
            }
        }
    }
}

#[test]
fn pool_recycles_without_leaking() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("pool.zstf");
    let mut writer = inst_writer(&path, 0, &WriterOptions::default());
    for i in 0..100u64 {
        writer.write_record(&nop()).unwrap();
        writer
            .write_record(&int_operand(OperandType::Source, 1, i))
            .unwrap();
    }
    writer.close().unwrap();

    let mut reader = RecordReader::open(&path, &ReaderOptions::default()).unwrap();
    while let Some(record) = reader.next_record().unwrap() {
        drop(record);
    }

    let pool = reader.pool();
    let (taken, recycled, freed) = pool.stats();
    // No handles are alive, so everything recycled and not re-taken is
    // still cached.
    assert_eq!(recycled - taken, pool.cached() as u64);
    assert_eq!(freed, 0);
    // The per-descriptor caches actually got reused.
    assert!(taken > 0);
}
