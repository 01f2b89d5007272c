//! Dobot dashboard wire protocol.
//!
//! One ASCII line per request, one line per reply:
//!
//! ```text
//!   client ──► "MoveJog(J1+,coordtype=0)\n"
//!   client ◄── "0,{},MoveJog(J1+,coordtype=0);"
//!               │   │  └─ echo of the request
//!               │   └─ value group
//!               └─ error id (0 = ok)
//! ```
//!
//! Requests carry no correlation id, so replies pair with requests strictly
//! in issue order. Keeping one request in flight is the transport's job.

mod command;
mod error;
mod reply;

pub use command::{Arg, Command, JogOptions};
pub use error::RobotError;
pub use reply::{Reply, CONTROL_MODE_VIOLATION};
