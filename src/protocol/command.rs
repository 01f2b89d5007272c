use serde::{Deserialize, Serialize};
use std::fmt;

/// A single argument inside `Verb(...)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Arg {
    /// Rendered verbatim, e.g. a jog token like `J1+`
    Token(String),
    Int(i64),
    Float(f64),
    /// Rendered as `{a,b,c}`
    Group(Vec<f64>),
    /// Rendered as `key=value`
    Keyword(String, Box<Arg>),
}

impl Arg {
    pub fn keyword(key: &str, value: Arg) -> Self {
        Arg::Keyword(key.to_string(), Box::new(value))
    }
}

impl fmt::Display for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::Token(token) => write!(f, "{}", token),
            Arg::Int(value) => write!(f, "{}", value),
            Arg::Float(value) => write!(f, "{}", value),
            Arg::Group(values) => {
                write!(f, "{{")?;
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}", value)?;
                }
                write!(f, "}}")
            }
            Arg::Keyword(key, value) => write!(f, "{}={}", key, value),
        }
    }
}

/// Options record for `MoveJog`.
///
/// Only the populated fields are rendered, in the order
/// `token, coordtype, user, tool`. A missing token renders the no-argument
/// stop command regardless of the other fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JogOptions {
    pub token: Option<String>,
    pub coord_type: Option<u8>,
    pub user: Option<u8>,
    pub tool: Option<u8>,
}

impl JogOptions {
    pub fn stop() -> Self {
        Self::default()
    }

    pub fn jog(token: impl Into<String>, coord_type: u8) -> Self {
        Self {
            token: Some(token.into()),
            coord_type: Some(coord_type),
            ..Self::default()
        }
    }
}

/// One controller command: a verb plus ordered arguments, rendered to a
/// single line `Verb(arg1,arg2,...)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    verb: String,
    args: Vec<Arg>,
}

impl Command {
    pub fn new(verb: impl Into<String>, args: Vec<Arg>) -> Self {
        Self {
            verb: verb.into(),
            args,
        }
    }

    /// Wraps caller supplied text.
    ///
    /// `Verb(...)` is kept as written. Bare text gets an empty argument list
    /// appended, so `"ClearError"` goes out as `ClearError()`.
    pub fn raw(text: &str) -> Self {
        let text = text.trim();
        match (text.find('('), text.ends_with(')')) {
            (Some(open), true) if open > 0 => {
                let verb = text[..open].trim();
                let inner = text[open + 1..text.len() - 1].trim();
                let args = if inner.is_empty() {
                    Vec::new()
                } else {
                    vec![Arg::Token(inner.to_string())]
                };
                Self::new(verb, args)
            }
            _ => Self::new(text, Vec::new()),
        }
    }

    pub fn verb(&self) -> &str {
        &self.verb
    }

    pub fn args(&self) -> &[Arg] {
        &self.args
    }

    pub fn enable_robot() -> Self {
        Self::new("EnableRobot", Vec::new())
    }

    pub fn disable_robot() -> Self {
        Self::new("DisableRobot", Vec::new())
    }

    pub fn clear_error() -> Self {
        Self::new("ClearError", Vec::new())
    }

    pub fn home() -> Self {
        Self::new("Home", Vec::new())
    }

    /// Point-to-point joint move, `MovJ(joint={j1,...,j6})`.
    pub fn move_joint_absolute(joints: [f64; 6]) -> Self {
        Self::new(
            "MovJ",
            vec![Arg::keyword("joint", Arg::Group(joints.to_vec()))],
        )
    }

    pub fn move_jog(options: &JogOptions) -> Self {
        let Some(token) = &options.token else {
            return Self::stop_jog();
        };
        let mut args = vec![Arg::Token(token.clone())];
        if let Some(coord_type) = options.coord_type {
            args.push(Arg::keyword("coordtype", Arg::Int(coord_type.into())));
        }
        if let Some(user) = options.user {
            args.push(Arg::keyword("user", Arg::Int(user.into())));
        }
        if let Some(tool) = options.tool {
            args.push(Arg::keyword("tool", Arg::Int(tool.into())));
        }
        Self::new("MoveJog", args)
    }

    pub fn stop_jog() -> Self {
        Self::new("MoveJog", Vec::new())
    }

    pub fn get_pose() -> Self {
        Self::new("GetPose", Vec::new())
    }

    pub fn get_angle() -> Self {
        Self::new("GetAngle", Vec::new())
    }

    pub fn robot_mode() -> Self {
        Self::new("RobotMode", Vec::new())
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.verb)?;
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}", arg)?;
        }
        write!(f, ")")
    }
}
