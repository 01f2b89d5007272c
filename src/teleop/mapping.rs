//! Channel to jog-token mapping per [`Mode`].
//!
//! Assignments are written as text in the config file, `"<axis>"` or
//! `"<axis> inverse"`, e.g. `"J1 inverse"` or `"Rz"`. `"None"` leaves a
//! channel unmapped.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::session::Mode;

/// Logical input channel, in snapshot order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Channel {
    X,
    Y,
    Z,
    Pitch,
    Roll,
    Yaw,
}

impl Channel {
    pub const ALL: [Channel; 6] = [
        Channel::X,
        Channel::Y,
        Channel::Z,
        Channel::Pitch,
        Channel::Roll,
        Channel::Yaw,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn is_translation(self) -> bool {
        matches!(self, Channel::X | Channel::Y | Channel::Z)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Positive,
    Negative,
}

impl Direction {
    pub fn of(value: f32) -> Self {
        if value < 0.0 {
            Direction::Negative
        } else {
            Direction::Positive
        }
    }

    pub fn flipped(self) -> Self {
        match self {
            Direction::Positive => Direction::Negative,
            Direction::Negative => Direction::Positive,
        }
    }

    fn suffix(self) -> char {
        match self {
            Direction::Positive => '+',
            Direction::Negative => '-',
        }
    }
}

/// Robot-side jog axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JogAxis {
    J1,
    J2,
    J3,
    J4,
    J5,
    J6,
    X,
    Y,
    Z,
    Rx,
    Ry,
    Rz,
}

impl JogAxis {
    const NAMES: [(JogAxis, &'static str); 12] = [
        (JogAxis::J1, "J1"),
        (JogAxis::J2, "J2"),
        (JogAxis::J3, "J3"),
        (JogAxis::J4, "J4"),
        (JogAxis::J5, "J5"),
        (JogAxis::J6, "J6"),
        (JogAxis::X, "X"),
        (JogAxis::Y, "Y"),
        (JogAxis::Z, "Z"),
        (JogAxis::Rx, "Rx"),
        (JogAxis::Ry, "Ry"),
        (JogAxis::Rz, "Rz"),
    ];

    pub fn name(self) -> &'static str {
        Self::NAMES
            .iter()
            .find(|(axis, _)| *axis == self)
            .map(|(_, name)| *name)
            .unwrap_or("?")
    }

    /// Jog token, e.g. `J1-` or `Rz+`.
    pub fn token(self, direction: Direction) -> String {
        format!("{}{}", self.name(), direction.suffix())
    }

    fn parse(text: &str) -> Option<JogAxis> {
        Self::NAMES
            .iter()
            .find(|(_, name)| name.eq_ignore_ascii_case(text))
            .map(|(axis, _)| *axis)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MappingError {
    #[error("Unknown jog axis '{0}'")]
    UnknownAxis(String),

    #[error("Unexpected token '{token}' in assignment '{assignment}'")]
    UnexpectedToken { token: String, assignment: String },
}

/// Target axis of one channel plus its inversion flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AxisAssignment {
    pub axis: Option<JogAxis>,
    pub inverse: bool,
}

impl AxisAssignment {
    pub const UNMAPPED: AxisAssignment = AxisAssignment {
        axis: None,
        inverse: false,
    };

    pub const fn to(axis: JogAxis) -> Self {
        Self {
            axis: Some(axis),
            inverse: false,
        }
    }

    pub const fn inverted(axis: JogAxis) -> Self {
        Self {
            axis: Some(axis),
            inverse: true,
        }
    }
}

impl FromStr for AxisAssignment {
    type Err = MappingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut words = s.split_whitespace();
        let axis = match words.next() {
            None => return Ok(Self::UNMAPPED),
            Some(word) if word.eq_ignore_ascii_case("none") => None,
            Some(word) => Some(
                JogAxis::parse(word).ok_or_else(|| MappingError::UnknownAxis(word.to_string()))?,
            ),
        };
        let inverse = match words.next() {
            None => false,
            Some(word) if word.eq_ignore_ascii_case("inverse") || word.eq_ignore_ascii_case("inverted") => true,
            Some(word) => {
                return Err(MappingError::UnexpectedToken {
                    token: word.to_string(),
                    assignment: s.to_string(),
                })
            }
        };
        if let Some(word) = words.next() {
            return Err(MappingError::UnexpectedToken {
                token: word.to_string(),
                assignment: s.to_string(),
            });
        }
        Ok(Self { axis, inverse })
    }
}

impl TryFrom<String> for AxisAssignment {
    type Error = MappingError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AxisAssignment> for String {
    fn from(value: AxisAssignment) -> Self {
        value.to_string()
    }
}

impl fmt::Display for AxisAssignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.axis, self.inverse) {
            (None, _) => write!(f, "None"),
            (Some(axis), false) => write!(f, "{}", axis.name()),
            (Some(axis), true) => write!(f, "{} inverse", axis.name()),
        }
    }
}

/// Assignments for one mode plus the coordinate system they jog in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModeBindings {
    pub coord_type: u8,
    pub channels: [AxisAssignment; 6],
}

impl ModeBindings {
    const CARTESIAN: [AxisAssignment; 6] = [
        AxisAssignment::to(JogAxis::X),
        AxisAssignment::to(JogAxis::Y),
        AxisAssignment::to(JogAxis::Z),
        AxisAssignment::to(JogAxis::Rx),
        AxisAssignment::to(JogAxis::Ry),
        AxisAssignment::to(JogAxis::Rz),
    ];

    pub fn joint() -> Self {
        Self {
            coord_type: 0,
            channels: [
                AxisAssignment::inverted(JogAxis::J1),
                AxisAssignment::to(JogAxis::J2),
                AxisAssignment::to(JogAxis::J3),
                AxisAssignment::to(JogAxis::J4),
                AxisAssignment::to(JogAxis::J5),
                AxisAssignment::to(JogAxis::J6),
            ],
        }
    }

    pub fn user() -> Self {
        Self {
            coord_type: 1,
            channels: Self::CARTESIAN,
        }
    }

    pub fn tool() -> Self {
        Self {
            coord_type: 2,
            channels: Self::CARTESIAN,
        }
    }
}

/// Resolved jog for one channel crossing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JogTarget {
    pub token: String,
    pub coord_type: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AxisMappingTable {
    pub joint: ModeBindings,
    pub user: ModeBindings,
    pub tool: ModeBindings,
    pub custom: ModeBindings,
}

impl Default for AxisMappingTable {
    fn default() -> Self {
        Self {
            joint: ModeBindings::joint(),
            user: ModeBindings::user(),
            tool: ModeBindings::tool(),
            custom: ModeBindings::user(),
        }
    }
}

impl AxisMappingTable {
    pub fn bindings(&self, mode: Mode) -> Option<&ModeBindings> {
        match mode {
            Mode::Simulation => None,
            Mode::Joint => Some(&self.joint),
            Mode::User => Some(&self.user),
            Mode::Tool => Some(&self.tool),
            Mode::Custom => Some(&self.custom),
        }
    }

    /// Jog for `channel` moving in `direction`, or `None` when the mode maps
    /// nothing there.
    pub fn target(&self, mode: Mode, channel: Channel, direction: Direction) -> Option<JogTarget> {
        let bindings = self.bindings(mode)?;
        let assignment = bindings.channels[channel.index()];
        let axis = assignment.axis?;
        let direction = if assignment.inverse {
            direction.flipped()
        } else {
            direction
        };
        Some(JogTarget {
            token: axis.token(direction),
            coord_type: bindings.coord_type,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joint_mode_inverts_base_rotation() {
        let table = AxisMappingTable::default();
        let target = table
            .target(Mode::Joint, Channel::X, Direction::Positive)
            .unwrap();
        assert_eq!(
            target,
            JogTarget {
                token: "J1-".to_string(),
                coord_type: 0
            }
        );
        let target = table
            .target(Mode::Joint, Channel::Yaw, Direction::Negative)
            .unwrap();
        assert_eq!(target.token, "J6-");
    }

    #[test]
    fn tool_mode_uses_tool_coordinates() {
        let table = AxisMappingTable::default();
        let target = table
            .target(Mode::Tool, Channel::Roll, Direction::Positive)
            .unwrap();
        assert_eq!(target.token, "Ry+");
        assert_eq!(target.coord_type, 2);
    }

    #[test]
    fn simulation_maps_nothing() {
        let table = AxisMappingTable::default();
        for channel in Channel::ALL {
            assert!(table
                .target(Mode::Simulation, channel, Direction::Positive)
                .is_none());
        }
    }

    #[test]
    fn parses_assignments() {
        assert_eq!(
            "X inverse".parse::<AxisAssignment>().unwrap(),
            AxisAssignment::inverted(JogAxis::X)
        );
        assert_eq!(
            "rz".parse::<AxisAssignment>().unwrap(),
            AxisAssignment::to(JogAxis::Rz)
        );
        assert_eq!(
            "None".parse::<AxisAssignment>().unwrap(),
            AxisAssignment::UNMAPPED
        );
        assert_eq!(
            "Q1".parse::<AxisAssignment>().unwrap_err(),
            MappingError::UnknownAxis("Q1".to_string())
        );
        assert!("X backwards".parse::<AxisAssignment>().is_err());
        assert_eq!(AxisAssignment::inverted(JogAxis::J3).to_string(), "J3 inverse");
    }

    #[test]
    fn unmapped_custom_channel_yields_nothing() {
        let mut table = AxisMappingTable::default();
        table.custom.channels[Channel::Z.index()] = AxisAssignment::UNMAPPED;
        assert!(table
            .target(Mode::Custom, Channel::Z, Direction::Positive)
            .is_none());
    }
}
