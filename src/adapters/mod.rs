//! Adapters — concrete implementations of the port traits and the outer
//! command / logging surfaces.
//!
//! | Adapter     | Implements        | Connects to                     |
//! |-------------|-------------------|---------------------------------|
//! | `console`   |                   | stdin / named pipe commands     |
//! | `data_log`  |                   | daily CSV files                 |
//! | `log_sink`  | NotificationSink  | process log                     |
//! | `mail`      | NotificationSink  | system `mail` command           |
//! | `net`       |                   | framed TCP commands             |
//! | `notifier`  | NotificationSink  | bounded queue + delivery thread |
//! | `sim`       | SpiDevice         | simulated thermal plant         |
//! |             | ServoOutput       |                                 |

pub mod console;
pub mod data_log;
pub mod log_sink;
pub mod mail;
pub mod net;
pub mod notifier;
pub mod sim;
pub(crate) mod utils;
