//! Process-wide clock registry for transaction traces.
//!
//! Clock IDs are declared by CLOCK_ID header records. The registry is
//! global so that tools holding several readers over consistent traces
//! agree on clock names; registration is idempotent for identical
//! `(id, name)` pairs and fails on conflicts.

use std::sync::{
    Mutex,
    OnceLock,
};

use stf_records::{
    ClockId,
    INVALID_CLOCK_ID,
};

use crate::error::{
    Result,
    StfError,
};

#[derive(Default)]
struct Registry {
    default_clock: ClockId,
    clocks: Vec<(ClockId, String)>,
}

static REGISTRY: OnceLock<Mutex<Registry>> = OnceLock::new();

fn registry() -> &'static Mutex<Registry> {
    REGISTRY.get_or_init(Mutex::default)
}

/// Registers a clock, making the first registered clock the default.
///
/// Re-registering an ID with the same name is a no-op; a different name is
/// an error, as is the reserved ID 0.
pub fn register_clock(clock_id: ClockId, name: &str) -> Result<()> {
    if clock_id == INVALID_CLOCK_ID {
        return Err(StfError::InvalidClockId);
    }

    let mut registry = registry().lock().expect("clock registry poisoned");
    if let Some((_, existing)) = registry.clocks.iter().find(|(id, _)| *id == clock_id) {
        if existing != name {
            return Err(StfError::ClockConflict {
                id: clock_id,
                existing: existing.clone(),
                name: name.to_owned(),
            });
        }
        return Ok(());
    }

    if registry.clocks.is_empty() {
        registry.default_clock = clock_id;
    }
    registry.clocks.push((clock_id, name.to_owned()));
    registry.clocks.sort_by_key(|(id, _)| *id);
    Ok(())
}

/// The first clock registered from a trace header.
pub fn default_clock() -> Result<ClockId> {
    let registry = registry().lock().expect("clock registry poisoned");
    if registry.clocks.is_empty() {
        return Err(StfError::NoClocks);
    }
    Ok(registry.default_clock)
}

/// The name registered for `clock_id`, if any.
pub fn clock_name(clock_id: ClockId) -> Option<String> {
    let registry = registry().lock().expect("clock registry poisoned");
    registry
        .clocks
        .iter()
        .find(|(id, _)| *id == clock_id)
        .map(|(_, name)| name.clone())
}

/// All registered clocks, default first, the rest in ID order.
pub fn dump_clocks() -> Vec<(ClockId, String)> {
    let registry = registry().lock().expect("clock registry poisoned");
    let mut clocks = Vec::with_capacity(registry.clocks.len());
    if let Some(default) = registry
        .clocks
        .iter()
        .find(|(id, _)| *id == registry.default_clock)
    {
        clocks.push(default.clone());
    }
    for clock in &registry.clocks {
        if clock.0 != registry.default_clock {
            clocks.push(clock.clone());
        }
    }
    clocks
}

#[cfg(test)]
mod tests {
    use super::*;

    // The registry is process-wide, so all assertions live in one test to
    // avoid ordering hazards between test threads.
    #[test]
    fn registration_rules() {
        register_clock(7, "core_clk").unwrap();
        register_clock(9, "bus_clk").unwrap();

        // Idempotent for identical pairs.
        register_clock(7, "core_clk").unwrap();

        // Conflicting name fails.
        assert!(matches!(
            register_clock(7, "other_clk"),
            Err(StfError::ClockConflict { id: 7, .. })
        ));

        // ID 0 is reserved.
        assert!(matches!(
            register_clock(INVALID_CLOCK_ID, "bad"),
            Err(StfError::InvalidClockId)
        ));

        assert_eq!(default_clock().unwrap(), 7);
        assert_eq!(clock_name(9).as_deref(), Some("bus_clk"));
        assert_eq!(clock_name(100), None);

        let dumped = dump_clocks();
        assert_eq!(dumped[0].0, 7);
        assert!(dumped.iter().any(|(id, _)| *id == 9));
    }
}
