//! Concrete state handler functions and table builder.
//!
//! Each state is defined by plain `fn` pointers: no closures, no dynamic
//! dispatch, no heap.
//!
//! ```text
//!  WAITING ──[> detect for debounce]──▶ DETECTED
//!     ▲                                    │
//!     │                         [< lost for debounce]
//!     │                                    ▼
//!     └────────────[light command]────── LOST ──┐
//!                                          ▲    │ [repeat interval]
//!                                          └────┘  re-notify
//! ```

use super::context::FsmContext;
use super::{StateDescriptor, StateId};
use crate::app::events::Notification;
use log::{info, warn};

// ═══════════════════════════════════════════════════════════════════════════
//  Table builder
// ═══════════════════════════════════════════════════════════════════════════

/// Build the static state table.  Called once at startup.
pub fn build_state_table() -> [StateDescriptor; StateId::COUNT] {
    [
        // Index 0 — WaitingForFlame
        StateDescriptor {
            id: StateId::WaitingForFlame,
            name: "WaitingForFlame",
            on_enter: Some(reset_debounce),
            on_exit: None,
            on_update: waiting_update,
        },
        // Index 1 — FlameDetected
        StateDescriptor {
            id: StateId::FlameDetected,
            name: "FlameDetected",
            on_enter: Some(detected_enter),
            on_exit: None,
            on_update: detected_update,
        },
        // Index 2 — FlameLost
        StateDescriptor {
            id: StateId::FlameLost,
            name: "FlameLost",
            on_enter: Some(lost_enter),
            on_exit: Some(lost_exit),
            on_update: lost_update,
        },
    ]
}

fn reset_debounce(ctx: &mut FsmContext) {
    ctx.debounce = 0;
}

/// Count one more tick of a held condition; `true` once it has held long enough.
fn debounced(ctx: &mut FsmContext, condition: bool) -> bool {
    if !condition {
        ctx.debounce = 0;
        return false;
    }
    ctx.debounce += 1;
    ctx.debounce >= ctx.debounce_ticks
}

// ═══════════════════════════════════════════════════════════════════════════
//  WAITING_FOR_FLAME
// ═══════════════════════════════════════════════════════════════════════════

fn waiting_update(ctx: &mut FsmContext) -> Option<StateId> {
    let present = ctx.flame_present();
    debounced(ctx, present).then_some(StateId::FlameDetected)
}

// ═══════════════════════════════════════════════════════════════════════════
//  FLAME_DETECTED
// ═══════════════════════════════════════════════════════════════════════════

fn detected_enter(ctx: &mut FsmContext) {
    reset_debounce(ctx);
    info!("Flame detected at {:.1}°F", ctx.flame_temperature);
    ctx.post(Notification::FLAME_DETECTED);
}

fn detected_update(ctx: &mut FsmContext) -> Option<StateId> {
    let absent = ctx.flame_absent();
    debounced(ctx, absent).then_some(StateId::FlameLost)
}

// ═══════════════════════════════════════════════════════════════════════════
//  FLAME_LOST — valve held closed until the operator re-lights
// ═══════════════════════════════════════════════════════════════════════════

fn lost_enter(ctx: &mut FsmContext) {
    reset_debounce(ctx);
    warn!("Flame lost at {:.1}°F, closing valve", ctx.flame_temperature);
    ctx.post(Notification::FLAME_LOST);
}

fn lost_exit(ctx: &mut FsmContext) {
    info!("Leaving FlameLost after {} ticks", ctx.ticks_in_state);
}

fn lost_update(ctx: &mut FsmContext) -> Option<StateId> {
    ctx.debounce += 1;
    if ctx.debounce >= ctx.repeat_ticks {
        ctx.debounce = 0;
        ctx.post(Notification::FLAME_LOST);
    }
    None
}
