//! Function-pointer finite state machine engine.
//!
//! Classic embedded FSM pattern:
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │  StateTable                                               │
//! │  ┌────────────────┬──────────┬─────────┬────────────────┐ │
//! │  │ StateId        │ on_enter │ on_exit │ on_update      │ │
//! │  ├────────────────┼──────────┼─────────┼────────────────┤ │
//! │  │ Initialization │ fn(ctx)  │ fn(ctx) │ fn(ctx)->Opt<> │ │
//! │  │ Idle           │ fn(ctx)  │ fn(ctx) │ fn(ctx)->Opt<> │ │
//! │  │ ...            │          │         │                │ │
//! │  └────────────────┴──────────┴─────────┴────────────────┘ │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! Each tick the engine calls `on_update` for the current state.  If it
//! returns `Some(next_id)`, the engine runs `on_exit` for the current
//! state, then `on_enter` for the next, and updates the current pointer.
//! All handlers receive `&mut DeviceContext` which holds the input
//! snapshot, the persistent state store, config, and timing.  The engine
//! is generic over the record media so host tests run against an in-memory
//! image.

pub mod context;
pub mod states;

use context::DeviceContext;
use log::info;

use crate::store::RecordMedia;

// ---------------------------------------------------------------------------
// State identity
// ---------------------------------------------------------------------------

/// Enumeration of all system states.
/// Must stay in sync with the table built in [`states::build_state_table`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum StateId {
    Initialization = 0,
    Idle = 1,
    Sleeping = 2,
    Napping = 3,
    Connecting = 4,
    Reporting = 5,
    RespWait = 6,
    FirmwareUpdate = 7,
    Error = 8,
}

impl StateId {
    /// Total number of states, used to size the table array.
    pub const COUNT: usize = 9;

    /// Convert a table index back to a `StateId`.  Panics on out-of-range
    /// in debug builds; returns `Error` in release (safe fallback).
    pub fn from_index(idx: usize) -> Self {
        match idx {
            0 => Self::Initialization,
            1 => Self::Idle,
            2 => Self::Sleeping,
            3 => Self::Napping,
            4 => Self::Connecting,
            5 => Self::Reporting,
            6 => Self::RespWait,
            7 => Self::FirmwareUpdate,
            8 => Self::Error,
            _ => {
                debug_assert!(false, "invalid state index: {idx}");
                Self::Error
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Function-pointer type aliases
// ---------------------------------------------------------------------------

/// Signature for `on_enter` and `on_exit` actions.
/// These run exactly once on each state transition.
pub type StateActionFn<M> = fn(&mut DeviceContext<M>);

/// Signature for the per-tick update handler.
/// Returns `Some(next)` to trigger a transition, or `None` to stay.
pub type StateUpdateFn<M> = fn(&mut DeviceContext<M>) -> Option<StateId>;

// ---------------------------------------------------------------------------
// State descriptor (one row in the table)
// ---------------------------------------------------------------------------

/// Static descriptor for a single state.
/// Stored in a fixed-size array: no heap, no `dyn`.
pub struct StateDescriptor<M: RecordMedia> {
    pub id: StateId,
    pub name: &'static str,
    pub on_enter: Option<StateActionFn<M>>,
    pub on_exit: Option<StateActionFn<M>>,
    pub on_update: StateUpdateFn<M>,
}

// ---------------------------------------------------------------------------
// FSM engine
// ---------------------------------------------------------------------------

/// The finite state machine engine.
///
/// Owns the state table; the [`DeviceContext`] is owned by the service and
/// threaded through every handler call.
pub struct Fsm<M: RecordMedia> {
    /// Fixed-size table indexed by `StateId as usize`.
    table: [StateDescriptor<M>; StateId::COUNT],
    /// Index of the currently active state.
    current: usize,
    /// Monotonically increasing tick counter.
    tick_count: u64,
    /// Tick at which the current state was entered.
    state_entry_tick: u64,
}

impl<M: RecordMedia> Fsm<M> {
    /// Construct a new FSM with the given state table, starting in `initial`.
    pub fn new(table: [StateDescriptor<M>; StateId::COUNT], initial: StateId) -> Self {
        Self {
            table,
            current: initial as usize,
            tick_count: 0,
            state_entry_tick: 0,
        }
    }

    /// Run the initial `on_enter` for the starting state.
    /// Call once after construction, before the first `tick()`.
    pub fn start(&mut self, ctx: &mut DeviceContext<M>) {
        info!("FSM starting in state: {}", self.table[self.current].name);
        ctx.state_entered_ms = ctx.inputs.now_ms;
        if let Some(enter) = self.table[self.current].on_enter {
            enter(ctx);
        }
    }

    /// Advance the FSM by one tick.
    ///
    /// 1. Call `on_update` for the current state.
    /// 2. If it returns `Some(next)`, execute the transition:
    ///    `on_exit(current)` → update pointer → `on_enter(next)`.
    pub fn tick(&mut self, ctx: &mut DeviceContext<M>) {
        self.tick_count += 1;
        ctx.ticks_in_state = self.tick_count - self.state_entry_tick;
        ctx.total_ticks = self.tick_count;

        let next = (self.table[self.current].on_update)(ctx);

        if let Some(next_id) = next {
            self.transition(next_id, ctx);
        }
    }

    /// Force an immediate transition (used by the supervisor to jump to
    /// `Error` regardless of what `on_update` returned).
    pub fn force_transition(&mut self, next: StateId, ctx: &mut DeviceContext<M>) {
        if next as usize != self.current {
            self.transition(next, ctx);
        }
    }

    /// The current state's identity.
    pub fn current_state(&self) -> StateId {
        StateId::from_index(self.current)
    }

    /// How many ticks the FSM has been in the current state.
    pub fn ticks_in_current_state(&self) -> u64 {
        self.tick_count - self.state_entry_tick
    }

    // -----------------------------------------------------------------------
    // Internal
    // -----------------------------------------------------------------------

    fn transition(&mut self, next_id: StateId, ctx: &mut DeviceContext<M>) {
        let next_idx = next_id as usize;

        info!(
            "FSM transition: {} -> {}",
            self.table[self.current].name, self.table[next_idx].name
        );

        // Exit current state
        if let Some(exit) = self.table[self.current].on_exit {
            exit(ctx);
        }

        // Update pointer and timing
        self.current = next_idx;
        self.state_entry_tick = self.tick_count;
        ctx.ticks_in_state = 0;
        ctx.state_entered_ms = ctx.inputs.now_ms;

        // Enter new state
        if let Some(enter) = self.table[self.current].on_enter {
            enter(ctx);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::context::DeviceContext;
    use super::*;
    use crate::config::SystemConfig;
    use crate::store::DeviceStateStore;
    use crate::store::testutil::MemMedia;

    fn make_ctx() -> DeviceContext<MemMedia> {
        let mut state = DeviceStateStore::new(MemMedia::new(512), 0, 0);
        state.setup().unwrap();
        let mut ctx = DeviceContext::new(SystemConfig::default(), state);
        ctx.inputs.time_valid = true;
        ctx.inputs.now_epoch = 1_700_000_000;
        ctx
    }

    fn make_fsm() -> Fsm<MemMedia> {
        Fsm::new(states::build_state_table(), StateId::Initialization)
    }

    #[test]
    fn starts_in_initialization() {
        let fsm = make_fsm();
        assert_eq!(fsm.current_state(), StateId::Initialization);
    }

    #[test]
    fn tick_increments_counter() {
        let mut fsm = make_fsm();
        let mut ctx = make_ctx();
        // Unsynced clock parks the machine in Connecting; hold it there.
        ctx.inputs.time_valid = false;
        fsm.start(&mut ctx);
        fsm.tick(&mut ctx);
        assert_eq!(fsm.current_state(), StateId::Connecting);
        fsm.tick(&mut ctx);
        assert_eq!(fsm.ticks_in_current_state(), 1);
        fsm.tick(&mut ctx);
        assert_eq!(fsm.ticks_in_current_state(), 2);
    }

    #[test]
    fn state_id_from_index_roundtrip() {
        for i in 0..StateId::COUNT {
            let id = StateId::from_index(i);
            assert_eq!(id as usize, i);
        }
    }

    #[test]
    #[cfg(not(debug_assertions))]
    fn state_id_from_invalid_index_returns_error() {
        let id = StateId::from_index(99);
        assert_eq!(id, StateId::Error);
    }
}
