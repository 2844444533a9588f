//! Header round-trip and header validation.

mod common;

use stf::prelude::*;
use stf::stf_records::TraceInfoRecord;
use tempfile::tempdir;

#[test]
fn header_round_trip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("header.zstf");

    let mut writer = TraceWriter::create(&path, &WriterOptions::default()).unwrap();
    writer.set_version(42, 0).unwrap();
    writer.add_comment("hello").unwrap();
    writer
        .add_trace_info(TraceInfoRecord {
            generator: "t".into(),
            major_version: 1,
            minor_version: 0,
            comment: String::new(),
        })
        .unwrap();
    writer
        .set_features(TraceFeatures::from_bits_retain(0x3))
        .unwrap();
    writer.set_iem(Iem::Rv64).unwrap();
    writer.set_initial_pc(0x1000).unwrap();
    writer.finalize_header().unwrap();
    writer.close().unwrap();

    let reader = RecordReader::open(&path, &ReaderOptions::default()).unwrap();
    let header = reader.header();
    assert_eq!(header.version, (42, 0));
    assert_eq!(header.iem, Some(Iem::Rv64));
    assert_eq!(header.initial_pc, 0x1000);
    assert_eq!(header.features.bits(), 0x3);
    assert_eq!(header.comments, vec!["hello".to_string()]);
    assert_eq!(header.trace_info.len(), 1);
    assert_eq!(header.trace_info[0].generator, "t");
    assert_eq!(header.trace_info[0].major_version, 1);
}

#[test]
fn empty_body_reads_as_end_of_trace() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("empty.zstf");
    let writer = common::inst_writer(&path, 0x1000, &WriterOptions::default());
    writer.close().unwrap();

    let mut reader = RecordReader::open(&path, &ReaderOptions::default()).unwrap();
    assert!(reader.next_record().unwrap().is_none());
}

#[test]
fn non_stf_file_is_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("garbage.bin");
    std::fs::write(&path, b"\x7fELF some random bytes").unwrap();

    assert!(matches!(
        RecordReader::open(&path, &ReaderOptions::default()),
        Err(StfError::InvalidMagic)
    ));
}

#[test]
fn truncated_header_is_fatal() {
    let dir = tempdir().unwrap();
    let full = dir.path().join("full.stf");

    // Plain container so the byte stream can be cut directly.
    let options = WriterOptions {
        compress: false,
        ..WriterOptions::default()
    };
    let writer = common::inst_writer(&full, 0x1000, &options);
    writer.close().unwrap();

    let bytes = std::fs::read(&full).unwrap();
    let cut = dir.path().join("cut.stf");
    // Drop the END_HEADER record (one descriptor byte) and a bit more.
    std::fs::write(&cut, &bytes[..bytes.len() - 3]).unwrap();

    assert!(matches!(
        RecordReader::open(&cut, &ReaderOptions::default()),
        Err(StfError::IncompleteHeader)
    ));
}

#[test]
fn duplicate_feature_record_is_rejected_even_when_zero() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("dup_features.stf");

    // Hand-crafted plain stream: the writer never emits two feature
    // records, and an all-zero first occurrence must not mask the second.
    let mut bytes = Vec::new();
    bytes.push(1); // IDENTIFIER
    bytes.extend_from_slice(b"STF");
    bytes.push(2); // VERSION
    bytes.extend_from_slice(&1u32.to_le_bytes());
    bytes.extend_from_slice(&0u32.to_le_bytes());
    bytes.push(7); // TRACE_INFO_FEATURE, empty bitset
    bytes.extend_from_slice(&0u64.to_le_bytes());
    bytes.push(7); // TRACE_INFO_FEATURE again
    bytes.extend_from_slice(&3u64.to_le_bytes());
    bytes.push(19); // END_HEADER
    std::fs::write(&path, &bytes).unwrap();

    assert!(matches!(
        RecordReader::open(&path, &ReaderOptions::default()),
        Err(StfError::DuplicateHeaderRecord(Descriptor::TraceInfoFeature))
    ));
}

#[test]
fn protocol_expectations_are_enforced() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("inst.zstf");
    let writer = common::inst_writer(&path, 0x1000, &WriterOptions::default());
    writer.close().unwrap();

    // An instruction trace has no protocol at all.
    let options = ReaderOptions {
        expected_protocol: Some(ProtocolId::TileLink),
        ..ReaderOptions::default()
    };
    assert!(matches!(
        RecordReader::open(&path, &options),
        Err(StfError::MissingProtocolId)
    ));

    // A transaction trace with a matching protocol opens.
    let tx_path = dir.path().join("tx.zstf");
    let mut writer = TraceWriter::create(&tx_path, &WriterOptions::default()).unwrap();
    writer.set_protocol_id(ProtocolId::TileLink).unwrap();
    writer.finalize_header().unwrap();
    writer.close().unwrap();
    assert!(RecordReader::open(&tx_path, &options).is_ok());
}

#[test]
fn header_records_are_rejected_in_the_body() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("trace.zstf");
    let mut writer = common::inst_writer(&path, 0x1000, &WriterOptions::default());
    assert!(matches!(
        writer.write_record(&Record::InstIem(Default::default())),
        Err(StfError::UnexpectedRecord(Descriptor::InstIem))
    ));
}

#[test]
fn body_records_are_rejected_before_finalize() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("trace.zstf");
    let mut writer = TraceWriter::create(&path, &WriterOptions::default()).unwrap();
    assert!(matches!(
        writer.write_record(&common::nop()),
        Err(StfError::HeaderNotFinalized)
    ));
}
