//! Control loop against mock hardware: servo safety window, re-arm,
//! transport loss and operator commands.

use std::time::Duration;

use smokinpi::app::commands::AppCommand;
use smokinpi::drivers::task::ShutdownFlag;
use smokinpi::fsm::StateId;
use smokinpi::pins::{CABINET_CHANNEL, N_PROBE_CHANNELS};

use crate::mock_hw::Rig;

fn ms(m: u64) -> Duration {
    Duration::from_millis(m)
}

fn run_command(rig: &Rig, line: &str) -> String {
    let Ok(cmd) = line.parse::<AppCommand>();
    cmd.apply(&rig.shared, &ShutdownFlag::new())
}

fn lit_rig() -> Rig {
    let mut rig = Rig::new();
    rig.inputs.set_probe_f(CABINET_CHANNEL, 180.0);
    rig.inputs.set_flame_f(400.0);
    rig.run_for(ms(12_000));
    assert_eq!(rig.monitor.state(), StateId::FlameDetected);
    rig
}

#[test]
fn servo_deasserts_after_safety_window_and_rearms() {
    let mut rig = lit_rig();
    run_command(&rig, "SERVO=600");
    rig.run_for(ms(6_000));
    assert_eq!(rig.control.servo().output().last(), Some(0));

    run_command(&rig, "SERVO=900");
    rig.run_for(ms(500));
    assert_eq!(rig.control.servo().output().last(), Some(900));

    // 300 counts of travel buy 1.5 s of drive.
    rig.run_for(ms(1_500));
    assert_eq!(rig.control.servo().output().last(), Some(0));
    assert_eq!(rig.position(), 900, "published position is unaffected");

    // Re-arm 60 s after the first drive: five more seconds of pulses.
    rig.run_for(ms(41_000));
    assert_eq!(rig.control.servo().output().last(), Some(900));
    rig.run_for(ms(5_000));
    assert_eq!(rig.control.servo().output().last(), Some(0));
}

#[test]
fn servo_pulses_stay_in_physical_range() {
    let mut rig = lit_rig();
    run_command(&rig, "SERVO=5000");
    rig.run_for(ms(100));
    run_command(&rig, "SERVO=20");
    rig.run_for(ms(100));
    for &p in &rig.control.servo().output().pulses {
        assert!(p == 0 || (600..=1200).contains(&p), "pulse {p}");
    }
    assert_eq!(rig.position(), 600);
}

#[test]
fn auto_command_returns_valve_to_pid() {
    let mut rig = lit_rig();
    run_command(&rig, "SERVO=700");
    rig.run_for(ms(100));
    assert_eq!(rig.position(), 700);

    run_command(&rig, "servo!");
    rig.run_for(ms(100));
    assert_eq!(rig.shared.forced_position(), None);
    assert_eq!(rig.position(), rig.pid_position());
}

#[test]
fn adc_outage_keeps_last_readings() {
    let mut rig = lit_rig();
    let seq = rig.shared.lock().sample_seq;
    let temps = rig.shared.get_channel_temperatures();

    rig.inputs.set_link_down(true);
    rig.inputs.set_all_probes_f(250.0);
    rig.run_for(ms(1_000));
    assert_eq!(rig.shared.lock().sample_seq, seq);
    assert_eq!(rig.shared.get_channel_temperatures(), temps);
    assert_eq!(rig.monitor.state(), StateId::FlameDetected);

    rig.inputs.set_link_down(false);
    rig.run_for(ms(100));
    assert!(rig.shared.lock().sample_seq > seq);
    assert!(rig.shared.get_channel_temperatures()[CABINET_CHANNEL] > temps[CABINET_CHANNEL]);
}

#[test]
fn higher_setpoint_opens_valve_further() {
    let mut rig = lit_rig();
    rig.run_for(ms(100));
    let before = rig.position();

    let reply = run_command(&rig, "SETTEMP=300");
    assert!(reply.contains("300"), "{reply}");
    rig.run_for(ms(100));
    assert!(rig.position() > before, "{} <= {before}", rig.position());
}

#[test]
fn gain_commands_reach_the_pid() {
    let mut rig = lit_rig();
    run_command(&rig, "KP=8");
    run_command(&rig, "KL=100");
    rig.run_for(ms(100));
    let gains = rig.control.pid().gains();
    assert_eq!(gains.kp, 8.0);
    assert_eq!(gains.windup_guard, 100.0);
    assert!(rig.control.pid().integral().abs() <= 100.0);
}

#[test]
fn status_reports_every_probe() {
    let mut rig = lit_rig();
    run_command(&rig, "NAME=1,Brisket");
    rig.run_for(ms(100));
    let report = run_command(&rig, "status");
    assert!(report.contains("Fire detected"), "{report}");
    assert!(report.contains("Brisket"), "{report}");
    assert_eq!(report.lines().count(), 2 + N_PROBE_CHANNELS);
}
