//! Transaction traces: TileLink payloads, dependencies, clocks.

mod common;

use stf::prelude::*;
use stf::stf_records::{
    TransactionDependencyRecord,
    TransactionRecord,
};
use tempfile::tempdir;

fn channel_a() -> Channel {
    Channel::A(ChannelA {
        fields: DataFields {
            code: 0,
            param: 0,
            size: 6,
            source: 7,
            data: vec![0xde, 0xad, 0xbe, 0xef],
        },
        address: 0xabcd_0000,
        mask: vec![0xff],
    })
}

fn write_tx_trace(path: &std::path::Path) {
    let mut writer = TraceWriter::create(path, &WriterOptions::default()).unwrap();
    writer.set_version(1, 0).unwrap();
    writer.set_protocol_id(ProtocolId::TileLink).unwrap();
    writer.add_clock(1, "core_clk").unwrap();
    writer.finalize_header().unwrap();

    writer
        .write_record(&Record::Transaction(TransactionRecord {
            transaction_id: 1,
            cycle_delta: 100,
            clock_id: 1,
            metadata: 0,
            protocol_data: ProtocolData::TileLink(channel_a()),
            payload: Vec::new(),
        }))
        .unwrap();

    writer
        .write_record(&Record::Transaction(TransactionRecord {
            transaction_id: 2,
            cycle_delta: 7,
            clock_id: 1,
            metadata: 0xfeed,
            protocol_data: ProtocolData::TileLink(Channel::D(ChannelD {
                fields: DataFields {
                    code: 1,
                    param: 0,
                    size: 6,
                    source: 7,
                    data: vec![1, 2, 3, 4],
                },
                sink: 3,
            })),
            payload: vec![9, 9, 9],
        }))
        .unwrap();
    writer
        .write_record(&Record::TransactionDependency(TransactionDependencyRecord {
            dependency_id: 1,
            cycle_delta: 7,
            clock_id: 1,
        }))
        .unwrap();

    writer.close().unwrap();
}

#[test]
fn tilelink_channel_a_round_trip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("tx.zstf");
    write_tx_trace(&path);

    let options = ReaderOptions {
        expected_protocol: Some(ProtocolId::TileLink),
        ..ReaderOptions::default()
    };
    let mut reader = TransactionReader::open(&path, &options).unwrap();
    assert_eq!(reader.header().protocol_id, Some(ProtocolId::TileLink));

    let tx = reader.next_transaction().unwrap().unwrap();
    assert_eq!(tx.index(), 1);
    assert_eq!(tx.transaction_id(), 1);
    assert_eq!(tx.cycle_delta(), 100);
    assert_eq!(tx.clock_id(), 1);
    assert_eq!(tx.protocol_id(), ProtocolId::TileLink);

    let channel = tx.protocol_data().tilelink().unwrap();
    assert_eq!(channel.channel_type(), ChannelType::A);
    assert_eq!(channel, &channel_a());
    assert!(tx.dependencies().is_empty());
}

#[test]
fn dependencies_attach_to_the_preceding_transaction() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("tx.zstf");
    write_tx_trace(&path);

    let mut reader = TransactionReader::open(&path, &ReaderOptions::default()).unwrap();
    let _first = reader.next_transaction().unwrap().unwrap();
    let second = reader.next_transaction().unwrap().unwrap();
    assert_eq!(second.transaction_id(), 2);
    assert_eq!(second.metadata(), 0xfeed);
    assert_eq!(second.payload(), &[9, 9, 9]);
    assert_eq!(second.dependencies().len(), 1);
    assert_eq!(second.dependencies()[0].dependency_id, 1);
    assert!(reader.next_transaction().unwrap().is_none());
    assert_eq!(reader.num_transactions_read(), 2);

    // The clock registered by the header is visible process-wide.
    assert_eq!(stf::clock::clock_name(1).as_deref(), Some("core_clk"));
}

#[test]
fn stray_instruction_records_are_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bad.zstf");
    let mut writer = TraceWriter::create(&path, &WriterOptions::default()).unwrap();
    writer.set_protocol_id(ProtocolId::TileLink).unwrap();
    writer.finalize_header().unwrap();
    writer.write_record(&common::nop()).unwrap();
    writer.close().unwrap();

    let mut reader = TransactionReader::open(&path, &ReaderOptions::default()).unwrap();
    assert!(matches!(
        reader.next_transaction(),
        Err(StfError::UnexpectedRecord(Descriptor::InstOpcode32))
    ));
}

#[test]
fn transaction_seek_by_marker() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("many.zstf");
    let options = WriterOptions {
        chunk_markers: 8,
        ..WriterOptions::default()
    };
    let mut writer = TraceWriter::create(&path, &options).unwrap();
    writer.set_protocol_id(ProtocolId::TileLink).unwrap();
    writer.finalize_header().unwrap();
    for i in 1..=60u64 {
        writer
            .write_record(&Record::Transaction(TransactionRecord {
                transaction_id: i,
                cycle_delta: i,
                clock_id: 1,
                metadata: 0,
                protocol_data: ProtocolData::TileLink(Channel::E(ChannelE { sink: i })),
                payload: Vec::new(),
            }))
            .unwrap();
    }
    writer.close().unwrap();

    let reader_options = ReaderOptions {
        force_single_threaded: true,
        ..ReaderOptions::default()
    };
    let mut reader = TransactionReader::open(&path, &reader_options).unwrap();
    let cursor = reader.seek_from_beginning(42).unwrap();
    let tx = reader.item(&cursor).unwrap().unwrap();
    assert_eq!(tx.index(), 42);
    assert_eq!(tx.transaction_id(), 42);
}
