//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter    | Implements              | Connects to                    |
//! |------------|-------------------------|--------------------------------|
//! | `fram`     | RecordMedia             | I2C FRAM / in-memory image     |
//! | `hardware` | SensorPort, PowerPort   | ToF sensor, accel, ADC, PMIC   |
//! | `network`  | NetworkPort             | WiFi STA + report webhook      |
//! | `clock`    | ClockPort               | High-res timer + wall clock    |
//! | `sleeper`  | SleepPort               | Deep/light sleep + wake cause  |
//! | `log_sink` | EventSink               | Serial log output              |

pub mod clock;
pub mod fram;
pub mod hardware;
pub mod log_sink;
pub mod network;
pub mod sleeper;
