use gilrs::{Axis, Button, Event, EventType, Gamepad, GamepadId, Gilrs};
use serde::{Deserialize, Serialize};
use tracing::{error, info, trace, warn};

use super::{InputError, InputSnapshot};

/// Source of [`InputSnapshot`]s. Opened once, then read in a tight loop on
/// the sampler thread.
pub trait InputDevice {
    fn name(&self) -> String;
    fn open(&mut self) -> Result<(), InputError>;
    fn read(&mut self) -> Result<InputSnapshot, InputError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DeviceKind {
    /// 6-axis spatial controller
    #[default]
    SpaceMouse,
    Joystick,
}

// Order matches X, Y, Z, Pitch, Roll, Yaw
const AXES: [Axis; 6] = [
    Axis::LeftStickX,
    Axis::LeftStickY,
    Axis::LeftZ,
    Axis::RightStickX,
    Axis::RightStickY,
    Axis::RightZ,
];

const BUTTONS: [Button; 2] = [Button::South, Button::East];

/// gilrs backed device for both supported kinds.
pub struct GilrsDevice {
    kind: DeviceKind,
    gamepad_index: usize,
    gilrs: Option<Gilrs>,
    active_gamepad: Option<GamepadId>,
}

impl GilrsDevice {
    pub fn new(kind: DeviceKind, gamepad_index: usize) -> Self {
        Self {
            kind,
            gamepad_index,
            gilrs: None,
            active_gamepad: None,
        }
    }

    fn select_gamepad(&mut self) {
        let Some(gilrs) = self.gilrs.as_ref() else {
            return;
        };
        let gamepads: Vec<(GamepadId, Gamepad<'_>)> = gilrs
            .gamepads()
            .filter(|(_, gamepad)| gamepad.is_connected())
            .collect();

        if gamepads.is_empty() {
            warn!("No {:?} connected, sampling neutral input", self.kind);
            self.active_gamepad = None;
            return;
        }

        info!("Found {} input device(s):", gamepads.len());
        for (idx, (id, gamepad)) in gamepads.iter().enumerate() {
            info!("  [{}] ID: {}, Name: {}", idx, id, gamepad.name());
        }

        let index = self.gamepad_index.min(gamepads.len() - 1);
        let (id, gamepad) = &gamepads[index];
        info!("Selected input device: {} ({})", gamepad.name(), id);
        self.active_gamepad = Some(*id);
    }
}

impl InputDevice for GilrsDevice {
    fn name(&self) -> String {
        format!("{:?}#{}", self.kind, self.gamepad_index)
    }

    fn open(&mut self) -> Result<(), InputError> {
        info!("Initializing gilrs for {:?}", self.kind);
        let gilrs = Gilrs::new().map_err(|e| {
            error!("Failed to initialize gilrs: {}", e);
            InputError::Open(e.to_string())
        })?;
        self.gilrs = Some(gilrs);
        self.select_gamepad();
        Ok(())
    }

    fn read(&mut self) -> Result<InputSnapshot, InputError> {
        let gilrs = self
            .gilrs
            .as_mut()
            .ok_or_else(|| InputError::Read("device not opened".to_string()))?;

        let mut reselect = false;
        while let Some(Event { id, event, .. }) = gilrs.next_event() {
            match event {
                EventType::Connected => {
                    info!("Input device {} connected", id);
                    reselect |= self.active_gamepad.is_none();
                }
                EventType::Disconnected => {
                    warn!("Input device {} disconnected", id);
                    reselect |= self.active_gamepad == Some(id);
                }
                _ => {}
            }
        }
        if reselect {
            self.select_gamepad();
        }

        let Some(id) = self.active_gamepad else {
            return Ok(InputSnapshot::neutral());
        };
        let Some(gilrs) = self.gilrs.as_ref() else {
            return Ok(InputSnapshot::neutral());
        };
        let gamepad = gilrs.gamepad(id);

        let mut axes = AXES.map(|axis| gamepad.value(axis));
        if self.kind == DeviceKind::Joystick {
            axes[1] = -axes[1];
        }
        let buttons = BUTTONS.map(|button| gamepad.is_pressed(button));
        trace!("Sampled axes {:?} buttons {:?}", axes, buttons);

        Ok(InputSnapshot::new(axes, buttons))
    }
}
