use chrono::{DateTime, Local};

pub const AXIS_COUNT: usize = 6;
pub const BUTTON_COUNT: usize = 2;

/// Latest reading of the 6-axis device plus its two buttons.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InputSnapshot {
    /// `X, Y, Z, Pitch, Roll, Yaw`, each in `[-1, 1]`
    pub axes: [f32; AXIS_COUNT],
    pub buttons: [bool; BUTTON_COUNT],
    pub sampled_at: DateTime<Local>,
}

impl InputSnapshot {
    pub fn new(axes: [f32; AXIS_COUNT], buttons: [bool; BUTTON_COUNT]) -> Self {
        Self {
            axes: axes.map(clamp_axis),
            buttons,
            sampled_at: Local::now(),
        }
    }

    /// All axes centred, no button held.
    pub fn neutral() -> Self {
        Self::new([0.0; AXIS_COUNT], [false; BUTTON_COUNT])
    }
}

impl Default for InputSnapshot {
    fn default() -> Self {
        Self::neutral()
    }
}

/// Clamps to `[-1, 1]`; NaN reads as centred.
pub fn clamp_axis(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(-1.0, 1.0)
    }
}
