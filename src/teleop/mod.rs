//! Teleoperation
//!
//! ```text
//!   watch<InputSnapshot> ──┐
//!                          ▼        every tick
//!   watch<SessionState> ─► TeleopController ─► JogStateMachine ──► CommandSink
//!                                           └► ButtonDispatcher ─┘
//! ```
//!
//! Hysteresis keeps a jog running while the axis stays outside the dead
//! band, so the controller only sees a start and a stop per deflection.

pub mod buttons;
pub mod controller;
pub mod jog;
pub mod mapping;
pub mod poses;

pub use buttons::{ButtonAction, ButtonChannel, ButtonDispatcher, EndEffector};
pub use controller::{TeleopController, TeleopSettings};
pub use jog::{ChannelState, JogCommand, JogStateMachine};
pub use mapping::{
    AxisAssignment, AxisMappingTable, Channel, Direction, JogAxis, JogTarget, MappingError,
    ModeBindings,
};
pub use poses::PoseLibrary;
