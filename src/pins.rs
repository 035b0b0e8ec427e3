//! Pin / bus assignments for the Smokin'Pi main board.
//!
//! Single source of truth: every driver references this module rather than
//! hard-coding pin numbers or channel indices.

// ---------------------------------------------------------------------------
// pigpio daemon
// ---------------------------------------------------------------------------

/// Default address of the local `pigpiod` socket interface.
pub const PIGPIOD_DEFAULT_ADDR: &str = "127.0.0.1:8888";

// ---------------------------------------------------------------------------
// Needle-valve servo
// ---------------------------------------------------------------------------

/// BCM GPIO driving the servo PWM signal.
pub const SERVO_GPIO: u32 = 18;

// ---------------------------------------------------------------------------
// TLC1543 10-bit ADC on SPI0
// ---------------------------------------------------------------------------

/// SPI chip-select used by the ADC (CE0).
pub const ADC_SPI_CHANNEL: u32 = 0;
/// SPI clock for the ADC (Hz).
pub const ADC_SPI_BAUD: u32 = 2_000_000;
/// SPI mode 0 (CPOL = 0, CPHA = 0).
pub const ADC_SPI_FLAGS: u32 = 0;

// ---------------------------------------------------------------------------
// Analog channel map
// ---------------------------------------------------------------------------

/// Analog inputs scanned by the ADC.
pub const N_ADC_CHANNELS: usize = 11;
/// Thermistor probes (channels `0..N_PROBE_CHANNELS`).
pub const N_PROBE_CHANNELS: usize = 10;
/// Probe in the smoker cabinet, the controlled variable.
pub const CABINET_CHANNEL: usize = 0;
/// Thermocouple amplifier watching the burner.
pub const FLAME_CHANNEL: usize = N_ADC_CHANNELS - 1;
