//! Flame supervision end to end: ADC codes in, valve pulses and operator
//! notifications out.

use std::time::Duration;

use smokinpi::app::commands::AppCommand;
use smokinpi::app::events::Notification;
use smokinpi::drivers::task::ShutdownFlag;
use smokinpi::fsm::StateId;
use smokinpi::pins::CABINET_CHANNEL;

use crate::mock_hw::Rig;

fn secs(s: u64) -> Duration {
    Duration::from_secs(s)
}

/// Cold cabinet, burner comes up: wait with the valve open, then hand the
/// valve to the PID once the flame has held for the debounce period.
#[test]
fn lit_burner_is_detected_once_and_pid_takes_over() {
    let mut rig = Rig::new();
    rig.inputs.set_probe_f(CABINET_CHANNEL, 150.0);
    assert_eq!(rig.notes.sent, vec![Notification::STARTING]);

    rig.run_for(secs(2));
    assert_eq!(rig.monitor.state(), StateId::WaitingForFlame);
    assert_eq!(rig.position(), 1200);

    rig.inputs.set_flame_f(400.0);
    rig.run_for(secs(5));
    assert_eq!(
        rig.monitor.state(),
        StateId::WaitingForFlame,
        "flame must hold for the full debounce period"
    );
    assert_eq!(rig.position(), 1200);

    rig.run_for(secs(15));
    assert_eq!(rig.monitor.state(), StateId::FlameDetected);
    assert_eq!(rig.shared.get_flame_state(), StateId::FlameDetected);
    assert_eq!(rig.notes.count(Notification::FLAME_DETECTED), 1);

    let position = rig.position();
    assert_eq!(position, rig.pid_position());
    assert!(position > 620 && position < 1200, "PID position {position}");
    let pulses = &rig.control.servo().output().pulses;
    assert!(pulses.iter().any(|&p| p > 620 && p < 1200), "servo never left full open");
}

/// Burner warming up gradually: detection waits out the debounce period
/// after the reading crosses the threshold, then fires exactly once.
#[test]
fn ramped_flame_detected_after_debounce_past_threshold() {
    let mut rig = Rig::new();
    rig.inputs.set_probe_f(CABINET_CHANNEL, 150.0);
    let step = Duration::from_millis(100);

    let mut flame = 70.0f32;
    let mut elapsed = Duration::ZERO;
    let mut crossed_at = None;
    let mut detected_at = None;
    while elapsed < secs(60) {
        // +1 °F per 100 ms, 70 → 400 over 33 s.
        flame = (flame + 1.0).min(400.0);
        rig.inputs.set_flame_f(flame);
        rig.run_for(step);
        elapsed += step;

        if crossed_at.is_none() && flame > 250.0 {
            crossed_at = Some(elapsed);
        }
        match (rig.monitor.state(), detected_at) {
            (StateId::FlameDetected, None) => detected_at = Some(elapsed),
            (state, Some(_)) => assert_eq!(state, StateId::FlameDetected, "at {elapsed:?}"),
            (state, None) => {
                assert_eq!(state, StateId::WaitingForFlame, "at {elapsed:?}");
                assert_eq!(rig.position(), 1200);
            }
        }
    }

    let crossed = crossed_at.unwrap();
    let detected = detected_at.expect("ramped flame never detected");
    assert!(
        detected >= crossed + Duration::from_millis(9_500),
        "detected {detected:?} only {:?} after crossing",
        detected - crossed
    );
    assert!(detected <= crossed + secs(15), "detected late: {detected:?}");
    assert_eq!(rig.notes.count(Notification::FLAME_DETECTED), 1);
    assert_eq!(rig.position(), rig.pid_position());
}

#[test]
fn flame_out_closes_valve_and_repeats_warning() {
    let mut rig = Rig::new();
    rig.inputs.set_probe_f(CABINET_CHANNEL, 200.0);
    rig.inputs.set_flame_f(400.0);
    rig.run_for(secs(15));
    assert_eq!(rig.monitor.state(), StateId::FlameDetected);

    rig.inputs.set_flame_f(70.0);
    rig.run_for(secs(5));
    assert_eq!(rig.monitor.state(), StateId::FlameDetected);

    rig.run_for(secs(15));
    assert_eq!(rig.monitor.state(), StateId::FlameLost);
    assert_eq!(rig.position(), 600);
    assert_eq!(rig.notes.count(Notification::FLAME_LOST), 1);

    // Still out five minutes later: the warning goes out again.
    rig.run_for(secs(301));
    assert_eq!(rig.monitor.state(), StateId::FlameLost);
    assert_eq!(rig.notes.count(Notification::FLAME_LOST), 2);
    assert_eq!(rig.notes.count(Notification::FLAME_DETECTED), 1);
}

#[test]
fn forced_position_never_overrides_flame_loss() {
    let mut rig = Rig::new();
    rig.inputs.set_flame_f(400.0);
    rig.run_for(secs(12));
    assert_eq!(rig.monitor.state(), StateId::FlameDetected);

    rig.shared.force_actuator_position(1000).unwrap();
    rig.run_for(secs(1));
    assert_eq!(rig.position(), 1000);

    rig.inputs.set_flame_f(70.0);
    rig.run_for(secs(15));
    assert_eq!(rig.monitor.state(), StateId::FlameLost);
    assert_eq!(rig.position(), 600);
}

#[test]
fn light_command_reopens_valve_for_ignition() {
    let mut rig = Rig::new();
    rig.inputs.set_flame_f(400.0);
    rig.run_for(secs(12));
    rig.inputs.set_flame_f(70.0);
    rig.run_for(secs(15));
    assert_eq!(rig.monitor.state(), StateId::FlameLost);

    let shutdown = ShutdownFlag::new();
    let Ok(cmd) = "light".parse::<AppCommand>();
    cmd.apply(&rig.shared, &shutdown);
    rig.run_for(Duration::from_millis(200));

    assert_eq!(rig.monitor.state(), StateId::WaitingForFlame);
    assert_eq!(rig.notes.count(Notification::LIGHTING), 1);
    assert_eq!(rig.position(), 1200);

    // Operator lights it: detected again after the debounce.
    rig.inputs.set_flame_f(400.0);
    rig.run_for(secs(12));
    assert_eq!(rig.monitor.state(), StateId::FlameDetected);
    assert_eq!(rig.notes.count(Notification::FLAME_DETECTED), 2);
}

#[test]
fn flame_lost_needs_sustained_cold() {
    let mut rig = Rig::new();
    rig.inputs.set_flame_f(400.0);
    rig.run_for(secs(12));
    assert_eq!(rig.monitor.state(), StateId::FlameDetected);

    // A gust: cold long enough to cross the threshold, not long enough to
    // count as a loss.
    rig.inputs.set_flame_f(70.0);
    rig.run_for(secs(4));
    rig.inputs.set_flame_f(400.0);
    rig.run_for(secs(20));
    assert_eq!(rig.monitor.state(), StateId::FlameDetected);
    assert_eq!(rig.notes.count(Notification::FLAME_LOST), 0);
}
