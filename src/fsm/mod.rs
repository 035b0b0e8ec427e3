//! Function-pointer finite state machine engine.
//!
//! Classic embedded FSM pattern ported to Rust:
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │  StateTable                                                    │
//! │  ┌─────────────────┬───────────┬──────────┬─────────────────┐  │
//! │  │ StateId         │ on_enter  │ on_exit  │ on_update       │  │
//! │  ├─────────────────┼───────────┼──────────┼─────────────────┤  │
//! │  │ WaitingForFlame │ fn(ctx)   │ fn(ctx)  │ fn(ctx)->Option │  │
//! │  │ FlameDetected   │ fn(ctx)   │ fn(ctx)  │ fn(ctx)->Option │  │
//! │  │ FlameLost       │ fn(ctx)   │ fn(ctx)  │ fn(ctx)->Option │  │
//! │  └─────────────────┴───────────┴──────────┴─────────────────┘  │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each tick the engine calls `on_update` for the **current** state.
//! If it returns `Some(next_id)`, the engine runs `on_exit` for the
//! current state, then `on_enter` for the next, and updates the
//! current pointer.  All functions receive `&mut FsmContext` which
//! holds the flame reading, debounce counter, thresholds and the
//! notification outbox.

pub mod context;
pub mod states;

use context::FsmContext;
use log::info;

use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// State identity
// ---------------------------------------------------------------------------

/// Flame presence as seen by the monitor.
/// Must stay in sync with the state table built in [`states::build_state_table`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum StateId {
    WaitingForFlame = 0,
    FlameDetected = 1,
    FlameLost = 2,
}

impl StateId {
    /// Total number of states, used to size the table array.
    pub const COUNT: usize = 3;

    /// Short operator-facing label.
    pub fn label(self) -> &'static str {
        match self {
            Self::WaitingForFlame => "Waiting for fire",
            Self::FlameDetected => "Fire detected",
            Self::FlameLost => "Loss of fire",
        }
    }
}

impl TryFrom<u8> for StateId {
    type Error = Error;

    fn try_from(code: u8) -> Result<Self> {
        match code {
            0 => Ok(Self::WaitingForFlame),
            1 => Ok(Self::FlameDetected),
            2 => Ok(Self::FlameLost),
            _ => Err(Error::StateInconsistency("unknown flame state code")),
        }
    }
}

// ---------------------------------------------------------------------------
// Function-pointer type aliases
// ---------------------------------------------------------------------------

/// Signature for `on_enter` and `on_exit` actions.
/// These run exactly once on each state transition.
pub type StateActionFn = fn(&mut FsmContext);

/// Signature for the per-tick update handler.
/// Returns `Some(next)` to trigger a transition, or `None` to stay.
pub type StateUpdateFn = fn(&mut FsmContext) -> Option<StateId>;

// ---------------------------------------------------------------------------
// State descriptor (one row in the table)
// ---------------------------------------------------------------------------

/// Static descriptor for a single FSM state.
/// Stored in a fixed-size array, no heap and no `dyn`.
pub struct StateDescriptor {
    pub id: StateId,
    pub name: &'static str,
    pub on_enter: Option<StateActionFn>,
    pub on_exit: Option<StateActionFn>,
    pub on_update: StateUpdateFn,
}

// ---------------------------------------------------------------------------
// FSM engine
// ---------------------------------------------------------------------------

/// The finite state machine engine.
///
/// Owns the state table (array of [`StateDescriptor`]) and threads a
/// caller-owned [`FsmContext`] through every handler call.
pub struct Fsm {
    /// Fixed-size table indexed by `StateId as usize`.
    table: [StateDescriptor; StateId::COUNT],
    current: StateId,
    /// Monotonically increasing tick counter.
    tick_count: u64,
    /// Tick at which the current state was entered.
    state_entry_tick: u64,
}

impl Fsm {
    /// Construct a new FSM with the given state table, starting in `initial`.
    ///
    /// Fails with [`Error::StateInconsistency`] when a row sits at an index
    /// that does not match its `id`.
    pub fn new(table: [StateDescriptor; StateId::COUNT], initial: StateId) -> Result<Self> {
        for (idx, row) in table.iter().enumerate() {
            let expected = StateId::try_from(idx as u8)?;
            if row.id != expected {
                return Err(Error::StateInconsistency("state table row out of order"));
            }
        }
        Ok(Self {
            table,
            current: initial,
            tick_count: 0,
            state_entry_tick: 0,
        })
    }

    /// Run the initial `on_enter` for the starting state.
    /// Call once after construction, before the first `tick()`.
    pub fn start(&mut self, ctx: &mut FsmContext) {
        info!("FSM starting in state: {}", self.row().name);
        if let Some(enter) = self.row().on_enter {
            enter(ctx);
        }
    }

    /// Advance the FSM by one tick.
    ///
    /// 1. Call `on_update` for the current state.
    /// 2. If it returns `Some(next)`, execute the transition:
    ///    `on_exit(current)` → update pointer → `on_enter(next)`.
    pub fn tick(&mut self, ctx: &mut FsmContext) {
        self.tick_count += 1;
        ctx.ticks_in_state = self.tick_count - self.state_entry_tick;

        if let Some(next_id) = (self.row().on_update)(ctx) {
            self.transition(next_id, ctx);
        }
    }

    /// Force an immediate transition regardless of what `on_update` would
    /// return.  A no-op when already in `next`.
    pub fn force_transition(&mut self, next: StateId, ctx: &mut FsmContext) {
        if next != self.current {
            self.transition(next, ctx);
        }
    }

    /// The current state's identity.
    pub fn current_state(&self) -> StateId {
        self.current
    }

    /// How many ticks the FSM has been in the current state.
    pub fn ticks_in_current_state(&self) -> u64 {
        self.tick_count - self.state_entry_tick
    }

    // -----------------------------------------------------------------------
    // Internal
    // -----------------------------------------------------------------------

    fn row(&self) -> &StateDescriptor {
        &self.table[self.current as usize]
    }

    fn transition(&mut self, next_id: StateId, ctx: &mut FsmContext) {
        info!(
            "FSM transition: {} -> {}",
            self.row().name,
            self.table[next_id as usize].name
        );

        if let Some(exit) = self.row().on_exit {
            exit(ctx);
        }

        self.current = next_id;
        self.state_entry_tick = self.tick_count;
        ctx.ticks_in_state = 0;

        if let Some(enter) = self.row().on_enter {
            enter(ctx);
        }
    }
}


#[cfg(test)]
mod proptests {
    use super::context::FsmContext;
    use super::*;
    use crate::app::events::Severity;
    use crate::config::SystemConfig;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn cold_burner_never_leaves_waiting(temps in proptest::collection::vec(-50.0f32..250.0, 1..400)) {
            let mut fsm = Fsm::new(states::build_state_table(), StateId::WaitingForFlame).unwrap();
            let mut ctx = FsmContext::new(&SystemConfig::default());
            fsm.start(&mut ctx);

            for t in temps {
                ctx.flame_temperature = t;
                fsm.tick(&mut ctx);
                prop_assert_eq!(fsm.current_state(), StateId::WaitingForFlame);
            }
            prop_assert!(ctx.outbox.is_empty());
        }

        #[test]
        fn sustained_heat_detects_exactly_once(
            extra in 0u32..500,
            temp in 251.0f32..900.0,
        ) {
            let mut fsm = Fsm::new(states::build_state_table(), StateId::WaitingForFlame).unwrap();
            let mut ctx = FsmContext::new(&SystemConfig::default());
            fsm.start(&mut ctx);

            ctx.flame_temperature = temp;
            let mut notices = 0;
            for _ in 0..ctx.debounce_ticks + extra {
                fsm.tick(&mut ctx);
                notices += ctx.outbox.iter().filter(|n| n.severity == Severity::Notice).count();
                ctx.outbox.clear();
            }
            prop_assert_eq!(fsm.current_state(), StateId::FlameDetected);
            prop_assert_eq!(notices, 1);
        }
    }
}
