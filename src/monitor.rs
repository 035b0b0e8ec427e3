//! Flame monitor: runs the flame FSM against the shared flame temperature.
//!
//! Per tick: read the flame temperature and any pending light request under
//! the lock, run the FSM outside it, deliver the notifications the handlers
//! queued, then publish the resulting state.

use log::{debug, info};

use crate::app::events::Notification;
use crate::app::ports::NotificationSink;
use crate::config::SystemConfig;
use crate::error::Result;
use crate::fsm::context::FsmContext;
use crate::fsm::states::build_state_table;
use crate::fsm::{Fsm, StateId};
use crate::state::{DebugFlags, SharedControl};

pub struct FlameMonitor {
    fsm: Fsm,
    ctx: FsmContext,
}

impl FlameMonitor {
    pub fn new(config: &SystemConfig) -> Result<Self> {
        Ok(Self {
            fsm: Fsm::new(build_state_table(), StateId::WaitingForFlame)?,
            ctx: FsmContext::new(config),
        })
    }

    /// Publish the initial state and announce startup.
    pub fn start(&mut self, shared: &SharedControl, sink: &mut impl NotificationSink) {
        self.fsm.start(&mut self.ctx);
        shared.publish_flame_state(self.fsm.current_state());
        sink.notify(&Notification::STARTING);
        self.deliver(sink);
    }

    pub fn tick(&mut self, shared: &SharedControl, sink: &mut impl NotificationSink) {
        let (flame_temperature, light, verbose) = {
            let mut s = shared.lock();
            let light = core::mem::take(&mut s.light_request);
            (s.flame_temperature, light, s.debug_flags.contains(DebugFlags::MONITOR))
        };

        if light {
            self.light();
            sink.notify(&Notification::LIGHTING);
        }

        self.ctx.flame_temperature = flame_temperature;
        self.fsm.tick(&mut self.ctx);
        if verbose {
            debug!(
                "Flame {:.1}°F, {} ({} ticks)",
                flame_temperature,
                self.fsm.current_state().label(),
                self.ctx.debounce
            );
        }
        self.deliver(sink);

        shared.publish_flame_state(self.fsm.current_state());
    }

    pub fn state(&self) -> StateId {
        self.fsm.current_state()
    }

    /// Operator is igniting the burner: wait for the flame again from scratch.
    fn light(&mut self) {
        info!("Light requested in state {}", self.fsm.current_state().label());
        self.fsm.force_transition(StateId::WaitingForFlame, &mut self.ctx);
        self.ctx.debounce = 0;
    }

    fn deliver(&mut self, sink: &mut impl NotificationSink) {
        for n in self.ctx.outbox.iter() {
            sink.notify(n);
        }
        self.ctx.outbox.clear();
    }
}
