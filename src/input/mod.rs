//! Input sampling
//!
//! ```text
//!   sampler thread (5 ms)                    control tick (50 ms)
//!   ┌───────────────────┐   send_replace     ┌──────────────────┐
//!   │ InputDevice::read │ ─────────────────► │ watch::Receiver  │
//!   └───────────────────┘  latest value only └──────────────────┘
//! ```
//!
//! The sampler never waits on the control loop and the control loop never
//! waits on the device.

mod device;
mod sampler;
mod snapshot;

pub use device::{DeviceKind, GilrsDevice, InputDevice};
pub use sampler::{InputSampler, SamplerHandle, SamplerSettings};
pub use snapshot::{clamp_axis, InputSnapshot, AXIS_COUNT, BUTTON_COUNT};

#[derive(Debug, thiserror::Error)]
pub enum InputError {
    #[error("Failed to open input device: {0}")]
    Open(String),

    #[error("No input device available: {0}")]
    NoDevice(String),

    #[error("Failed to read input device: {0}")]
    Read(String),
}
