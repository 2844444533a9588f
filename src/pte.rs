//! Versioned VA→PA translation and the background page-table prefetcher.

use std::{
    collections::{
        BTreeMap,
        HashMap,
    },
    path::Path,
    sync::{
        atomic::{
            AtomicBool,
            Ordering,
        },
        Arc,
    },
    thread,
};

use parking_lot::{
    Condvar,
    Mutex,
};
use stf_records::{
    OperandType,
    PageTableWalkRecord,
    Record,
};
use stf_types::{
    bytes::bit_mask,
    ExecutionMode,
    Iem,
    Satp,
    VaMode,
    PAGE_OFFSET_BITS,
};
use tracing::{
    debug,
    warn,
};

use crate::{
    chunk::DEFAULT_CHUNK_MARKERS,
    error::{
        Result,
        StfError,
    },
    reader::{
        ReaderOptions,
        RecordReader,
    },
};

/// A decoded page-table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct DecodedPte {
    pa: u64,
    leaf: bool,
}

impl DecodedPte {
    fn new(pte: u64, phys_addr_mask: u64) -> Self {
        const PTE_TO_PHYS_PAGE_SHIFT: u32 = 10;
        // R or X permission marks a leaf.
        const LEAF_MASK: u64 = 0xa;
        Self {
            pa: ((pte >> PTE_TO_PHYS_PAGE_SHIFT) << PAGE_OFFSET_BITS) & phys_addr_mask,
            leaf: pte & LEAF_MASK != 0,
        }
    }
}

/// The page table built for one SATP value.
///
/// PTEs are kept per physical address, with one version per instruction
/// index at which a walk observed a new value. Rewrites are rare, so most
/// version maps hold a single entry.
#[derive(Debug)]
struct SatpTable {
    satp: Satp,
    pages: HashMap<u64, BTreeMap<u64, DecodedPte>>,
}

impl SatpTable {
    fn new(satp: Satp) -> Self {
        Self {
            satp,
            pages: HashMap::new(),
        }
    }

    fn update(&mut self, rec: &PageTableWalkRecord) -> Result<()> {
        let index = rec.first_access_index;
        let Some(props) = self.satp.va_mode().properties() else {
            // A walk while the SATP says translation is off.
            return Err(StfError::WalkWithoutSatp(index));
        };
        let phys_addr_mask = props.phys_addr_mask();

        for entry in &rec.entries {
            let decoded = DecodedPte::new(entry.pte, phys_addr_mask);
            let versions = self.pages.entry(entry.pa).or_default();
            match versions.range(..=index).next_back() {
                Some((_, current)) if *current == decoded => {}
                Some((at, _)) if *at == index => {
                    return Err(StfError::PteConflict {
                        pa: entry.pa,
                        index,
                    })
                }
                _ => {
                    versions.insert(index, decoded);
                }
            }
        }
        Ok(())
    }

    fn translate(&self, va: u64, index: u64) -> Result<u64> {
        let props = match self.satp.va_mode() {
            VaMode::NoTranslation => return Ok(va),
            mode => mode.properties().expect("translated modes have properties"),
        };
        let fail = || StfError::Translation { va, index };

        let vpn = (va & props.virt_addr_mask()) >> PAGE_OFFSET_BITS;
        let mut base = self.satp.base_addr();

        // The walk from the privileged architecture spec, against recorded
        // PTE versions instead of memory.
        for level in (0..props.levels()).rev() {
            let shift = level * props.vpn_bits;
            let pte_addr = base + (((vpn >> shift) & props.vpn_mask()) << props.pte_shift);
            let versions = self.pages.get(&pte_addr).ok_or_else(fail)?;
            let (_, pte) = versions.range(..=index).next_back().ok_or_else(fail)?;

            base = pte.pa;
            if pte.leaf {
                // A leaf above level 0 is a hugepage; the remaining VPN
                // bits stay part of the page offset.
                let offset_mask = bit_mask(shift + PAGE_OFFSET_BITS);
                return Ok(base | (va & offset_mask));
            }
        }

        Err(fail())
    }
}

/// Tracks page-table state by the instruction index at which it becomes
/// valid, answering translation queries for any point of the trace.
#[derive(Debug)]
pub struct PageTable {
    iem: Iem,
    /// Execution mode over time. Traces that never report a mode run in
    /// machine mode.
    modes: BTreeMap<u64, ExecutionMode>,
    /// SATP writes over time.
    satp_writes: BTreeMap<u64, u64>,
    /// One table per distinct SATP value; the value maps to the same
    /// table no matter how often it is rewritten.
    satp_tables: HashMap<u64, SatpTable>,
}

impl PageTable {
    /// An empty page table for the given encoding mode.
    pub fn new(iem: Iem) -> Self {
        let mut modes = BTreeMap::new();
        modes.insert(0, ExecutionMode::Machine);
        Self {
            iem,
            modes,
            satp_writes: BTreeMap::new(),
            satp_tables: HashMap::new(),
        }
    }

    /// Records an SATP write taking effect at `index`.
    pub fn update_satp(&mut self, value: u64, index: u64) -> Result<()> {
        if !self.satp_tables.contains_key(&value) {
            let satp = Satp::decode(self.iem, value)?;
            self.satp_tables.insert(value, SatpTable::new(satp));
        }
        self.satp_writes.entry(index).or_insert(value);
        Ok(())
    }

    /// Records an execution mode change taking effect at `index`.
    pub fn update_mode(&mut self, mode: ExecutionMode, index: u64) {
        self.modes.insert(index, mode);
    }

    /// Applies a page-table walk to the table active at its first-access
    /// index.
    pub fn update_walk(&mut self, rec: &PageTableWalkRecord) -> Result<()> {
        let index = rec.first_access_index;
        let (_, value) = self
            .satp_writes
            .range(..=index)
            .next_back()
            .ok_or(StfError::WalkWithoutSatp(index))?;
        self.satp_tables
            .get_mut(value)
            .expect("every SATP write has a table")
            .update(rec)
    }

    /// Translates `va` with the page-table state valid at `index`.
    ///
    /// Machine mode disables translation. Outside machine mode the active
    /// SATP's table is walked, selecting the latest PTE version at or
    /// before `index`.
    pub fn translate(&self, va: u64, index: u64) -> Result<u64> {
        let (_, mode) = self
            .modes
            .range(..=index)
            .next_back()
            .expect("mode map is seeded at index 0");
        if *mode == ExecutionMode::Machine {
            return Ok(va);
        }

        let (_, value) = self
            .satp_writes
            .range(..=index)
            .next_back()
            .ok_or(StfError::Translation { va, index })?;
        self.satp_tables
            .get(value)
            .expect("every SATP write has a table")
            .translate(va, index)
    }

    /// Drops all recorded state, keeping the encoding mode.
    pub fn clear(&mut self) {
        self.modes.clear();
        self.modes.insert(0, ExecutionMode::Machine);
        self.satp_writes.clear();
        self.satp_tables.clear();
    }
}

struct PteState {
    table: PageTable,
    last_valid_index: u64,
    done: bool,
}

struct PteShared {
    state: Mutex<PteState>,
    sync: Condvar,
    stop: AtomicBool,
}

/// Effective index of a record attached to the instruction after
/// `insts_read - 1` previous ones: state writes take effect at the
/// previous instruction, destination writes and mode changes at the
/// instruction after the current one.
fn effective_index(insts_read: u64, after_current: bool) -> u64 {
    let prev = insts_read.saturating_sub(1);
    if after_current {
        if prev == 0 {
            0
        } else {
            prev + 2
        }
    } else {
        prev
    }
}

/// How often the prefetcher publishes its progress, in instructions.
/// Roughly ten times per chunk keeps spurious wakeups down.
const INDEX_UPDATE_INTERVAL: u64 = DEFAULT_CHUNK_MARKERS / 10;

/// Reads only translation-related records from a trace on a helper
/// thread, answering `translate` queries as soon as the prefetcher has
/// passed the queried instruction index.
pub struct PteReader {
    shared: Arc<PteShared>,
    worker: Option<thread::JoinHandle<()>>,
}

impl PteReader {
    /// Opens the trace and starts the prefetch thread.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let options = ReaderOptions {
            force_single_threaded: true,
            ..ReaderOptions::default()
        };
        let reader = RecordReader::open(path, &options)?;
        let iem = reader.header().iem_or_default();
        let has_pte_info = reader.header().features.has_page_table_info();

        let shared = Arc::new(PteShared {
            state: Mutex::new(PteState {
                table: PageTable::new(iem),
                last_valid_index: 0,
                done: false,
            }),
            sync: Condvar::new(),
            stop: AtomicBool::new(false),
        });

        let worker_shared = Arc::clone(&shared);
        let worker = thread::spawn(move || {
            if has_pte_info {
                Self::run(reader, &worker_shared);
            }
            let mut state = worker_shared.state.lock();
            state.done = true;
            drop(state);
            worker_shared.sync.notify_all();
            debug!("page-table prefetch finished");
        });

        Ok(Self {
            shared,
            worker: Some(worker),
        })
    }

    fn run(mut reader: RecordReader, shared: &PteShared) {
        debug!("page-table prefetch started");
        while !shared.stop.load(Ordering::Relaxed) {
            let record = match reader.next_record() {
                Ok(Some(record)) => record,
                Ok(None) => break,
                Err(err) => {
                    warn!("page-table prefetch stopped: {err}");
                    break;
                }
            };

            let insts_read = reader.num_markers();
            let result = match &*record {
                Record::PageTableWalk(rec) => {
                    let mut state = shared.state.lock();
                    let result = state.table.update_walk(rec);
                    state.last_valid_index = insts_read;
                    drop(state);
                    shared.sync.notify_all();
                    result
                }
                Record::InstReg(rec) if rec.is_satp() => match rec.operand_type {
                    OperandType::State | OperandType::Dest => {
                        let index = effective_index(
                            insts_read,
                            rec.operand_type == OperandType::Dest,
                        );
                        let mut state = shared.state.lock();
                        state.table.update_satp(rec.scalar_data(), index)
                    }
                    OperandType::Source => Ok(()),
                },
                Record::Event(rec) => {
                    if let Some(mode) = rec.mode() {
                        let index = effective_index(insts_read, true);
                        let mut state = shared.state.lock();
                        state.table.update_mode(mode, index);
                    }
                    Ok(())
                }
                Record::InstOpcode16(_) | Record::InstOpcode32(_) => {
                    if insts_read % INDEX_UPDATE_INTERVAL == 0 {
                        let mut state = shared.state.lock();
                        state.last_valid_index = insts_read;
                        drop(state);
                        shared.sync.notify_all();
                    }
                    Ok(())
                }
                _ => Ok(()),
            };

            if let Err(err) = result {
                warn!("page-table prefetch stopped: {err}");
                break;
            }
        }
    }

    /// Translates `va` with the page-table state valid at instruction
    /// `index`, waiting for the prefetcher to pass `index` first.
    pub fn translate(&self, va: u64, index: u64) -> Result<u64> {
        let mut state = self.shared.state.lock();
        while index > state.last_valid_index && !state.done {
            self.shared.sync.wait(&mut state);
        }
        state.table.translate(va, index)
    }

    /// Stops the prefetch thread and waits for it to exit.
    pub fn close(&mut self) {
        self.shared.stop.store(true, Ordering::Relaxed);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl Drop for PteReader {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for PteReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("PteReader")
            .field("last_valid_index", &state.last_valid_index)
            .field("done", &state.done)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stf_records::WalkEntry;

    /// An SV39 SATP value with the given root page-table base.
    fn sv39_satp(base: u64) -> u64 {
        (8 << 60) | (base >> 12)
    }

    /// A leaf PTE mapping to `pa` (readable).
    fn leaf(pa: u64) -> u64 {
        ((pa >> 12) << 10) | 0xf
    }

    /// A non-leaf PTE pointing at the next level at `pa`.
    fn table(pa: u64) -> u64 {
        ((pa >> 12) << 10) | 0x1
    }

    fn walk(index: u64, entries: &[(u64, u64)]) -> PageTableWalkRecord {
        PageTableWalkRecord {
            first_access_index: index,
            entries: entries
                .iter()
                .map(|(pa, pte)| WalkEntry { pa: *pa, pte: *pte })
                .collect(),
        }
    }

    fn user_table() -> PageTable {
        let mut table = PageTable::new(Iem::Rv64);
        table.update_mode(ExecutionMode::Supervisor, 0);
        table
    }

    #[test]
    fn machine_mode_is_identity() {
        let table = PageTable::new(Iem::Rv64);
        assert_eq!(table.translate(0xdead_b000, 10).unwrap(), 0xdead_b000);
    }

    #[test]
    fn translate_without_satp_fails() {
        let table = user_table();
        assert!(matches!(
            table.translate(0x1000, 5),
            Err(StfError::Translation {
                va: 0x1000,
                index: 5
            })
        ));
    }

    #[test]
    fn sv39_three_level_walk() {
        let mut table = user_table();
        table.update_satp(sv39_satp(0x10000), 0).unwrap();

        // VA 0x1000: vpn2 = 0, vpn1 = 0, vpn0 = 1.
        table
            .update_walk(&walk(
                1,
                &[
                    (0x10000, self::table(0x11000)),
                    (0x11000, self::table(0x12000)),
                    (0x12000 + 8, leaf(0x40000)),
                ],
            ))
            .unwrap();

        assert_eq!(table.translate(0x1000, 5).unwrap(), 0x40000);
        assert_eq!(table.translate(0x1234, 5).unwrap(), 0x40234);
    }

    #[test]
    fn hugepage_offset_is_preserved() {
        let mut table = user_table();
        table.update_satp(sv39_satp(0x10000), 0).unwrap();

        // 2 MiB page: leaf at level 1. VA 0x0020_1234 has vpn2 = 0,
        // vpn1 = 1.
        table
            .update_walk(&walk(
                1,
                &[(0x10000, self::table(0x11000)), (0x11000 + 8, leaf(0x8000_0000))],
            ))
            .unwrap();

        assert_eq!(table.translate(0x0020_1234, 5).unwrap(), 0x8000_1234);
    }

    #[test]
    fn pte_versions_select_by_index() {
        let mut table = user_table();
        table.update_satp(sv39_satp(0x10000), 0).unwrap();

        // VA 0x1000 maps to 0x40000 at index 5 and 0x80000 at index 50.
        let entries_v1 = [
            (0x10000, self::table(0x11000)),
            (0x11000, self::table(0x12000)),
            (0x12000 + 8, leaf(0x40000)),
        ];
        let entries_v2 = [
            (0x10000, self::table(0x11000)),
            (0x11000, self::table(0x12000)),
            (0x12000 + 8, leaf(0x80000)),
        ];
        table.update_walk(&walk(5, &entries_v1)).unwrap();
        table.update_walk(&walk(50, &entries_v2)).unwrap();

        assert_eq!(table.translate(0x1000, 20).unwrap(), 0x40000);
        assert_eq!(table.translate(0x1000, 60).unwrap(), 0x80000);
        // Before the first walk there is nothing to translate with.
        assert!(table.translate(0x1000, 2).is_err());
    }

    #[test]
    fn conflicting_pte_at_same_index_is_rejected() {
        let mut table = user_table();
        table.update_satp(sv39_satp(0x10000), 0).unwrap();
        table
            .update_walk(&walk(5, &[(0x10000, leaf(0x40000))]))
            .unwrap();
        // Same walk again is fine.
        table
            .update_walk(&walk(5, &[(0x10000, leaf(0x40000))]))
            .unwrap();
        // A different value at the same index is not.
        assert!(matches!(
            table.update_walk(&walk(5, &[(0x10000, leaf(0x50000))])),
            Err(StfError::PteConflict { pa: 0x10000, index: 5 })
        ));
    }

    #[test]
    fn walk_without_satp_is_rejected() {
        let mut table = user_table();
        assert!(matches!(
            table.update_walk(&walk(5, &[(0x10000, leaf(0x40000))])),
            Err(StfError::WalkWithoutSatp(5))
        ));
    }

    #[test]
    fn mode_changes_toggle_translation() {
        let mut table = user_table();
        table.update_satp(sv39_satp(0x10000), 0).unwrap();
        table
            .update_walk(&walk(1, &[(0x10000 + 8, leaf(0x40000))]))
            .unwrap();
        table.update_mode(ExecutionMode::Machine, 100);

        // SV39 giga-page at vpn2 = 1: VA 0x4000_0000 maps through the
        // level-2 leaf, so the whole vpn is translated away.
        let va = 0x4000_0000;
        assert_eq!(table.translate(va, 50).unwrap(), 0x40000);
        // Back in machine mode the VA passes through.
        assert_eq!(table.translate(va, 150).unwrap(), va);
    }

    #[test]
    fn effective_index_arithmetic() {
        // A state operand on the first instruction takes effect at 0.
        assert_eq!(effective_index(1, false), 0);
        // A state operand on instruction 10 takes effect at 9.
        assert_eq!(effective_index(10, false), 9);
        // A destination operand on instruction 10 takes effect at 11.
        assert_eq!(effective_index(10, true), 11);
        // A mode change on the first instruction takes effect at 0.
        assert_eq!(effective_index(1, true), 0);
        assert_eq!(effective_index(0, true), 0);
    }
}
