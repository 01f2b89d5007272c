use super::RobotError;

/// Text the controller puts in a reply when it is not in TCP control mode.
pub const CONTROL_MODE_VIOLATION: &str = "Control Mode Is Not Tcp";

/// A parsed reply line, `ErrorID,{values},Echo;`.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub code: i32,
    pub values: Vec<String>,
    pub echo: String,
    /// Trimmed line as received
    pub raw: String,
}

impl Reply {
    /// Parses one reply line.
    ///
    /// The control mode violation wins over everything else in the line. A
    /// non-zero error id becomes [`RobotError::Controller`] so callers only
    /// see successful replies in the `Ok` branch.
    pub fn parse(line: &str) -> Result<Reply, RobotError> {
        let raw = line.trim().to_string();

        if raw
            .to_ascii_lowercase()
            .contains(&CONTROL_MODE_VIOLATION.to_ascii_lowercase())
        {
            return Err(RobotError::ControlMode);
        }

        let body = raw.trim_end_matches(';').trim();
        let (code_text, rest) = match body.split_once(',') {
            Some((code, rest)) => (code.trim(), rest.trim()),
            None => (body, ""),
        };
        let code: i32 = code_text
            .parse()
            .map_err(|_| RobotError::MalformedReply(raw.clone()))?;

        let (values, echo) = split_values(rest);

        if code != 0 {
            return Err(RobotError::Controller { code, reply: raw });
        }

        Ok(Reply {
            code,
            values,
            echo,
            raw,
        })
    }

    pub fn is_ok(&self) -> bool {
        self.code == 0
    }

    /// Interprets the value group as numbers, as returned by `GetPose()`,
    /// `GetAngle()` and `RobotMode()`.
    pub fn floats(&self) -> Result<Vec<f64>, RobotError> {
        self.values
            .iter()
            .map(|value| {
                value
                    .parse::<f64>()
                    .map_err(|_| RobotError::MalformedReply(self.raw.clone()))
            })
            .collect()
    }
}

fn split_values(rest: &str) -> (Vec<String>, String) {
    let Some(open) = rest.find('{') else {
        return (Vec::new(), rest.to_string());
    };
    let Some(close) = rest.rfind('}').filter(|close| *close > open) else {
        return (Vec::new(), rest.to_string());
    };

    let values = rest[open + 1..close]
        .split(',')
        .map(|value| value.trim().trim_matches(|c| c == '{' || c == '}'))
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .collect();
    let echo = rest[close + 1..]
        .trim_start_matches(',')
        .trim()
        .to_string();

    (values, echo)
}
