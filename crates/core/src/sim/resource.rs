//! Script URL rules for the simulated loader.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;

/// What a fetch ends with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Behavior {
    Load,
    Fail,
    /// Neither load nor error ever fires.
    Hang,
}

/// How the simulated network answers a script URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resource {
    pub latency: Duration,
    pub behavior: Behavior,
}

impl Resource {
    pub const fn load(millis: u64) -> Self {
        Self {
            latency: Duration::from_millis(millis),
            behavior: Behavior::Load,
        }
    }

    pub const fn fail(millis: u64) -> Self {
        Self {
            latency: Duration::from_millis(millis),
            behavior: Behavior::Fail,
        }
    }

    pub const fn hang() -> Self {
        Self {
            latency: Duration::ZERO,
            behavior: Behavior::Hang,
        }
    }
}

impl Default for Resource {
    fn default() -> Self {
        Self::hang()
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.behavior {
            Behavior::Load => write!(f, "load:{}", self.latency.as_millis()),
            Behavior::Fail => write!(f, "fail:{}", self.latency.as_millis()),
            Behavior::Hang => write!(f, "hang"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceParseError(String);

impl fmt::Display for ResourceParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid resource rule: {}", self.0)
    }
}

impl std::error::Error for ResourceParseError {}

/// Parses `load`, `load:<ms>`, `fail`, `fail:<ms>` and `hang`.
impl FromStr for Resource {
    type Err = ResourceParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (name, millis) = match s.split_once(':') {
            Some((name, millis)) => {
                let millis = millis
                    .trim()
                    .parse::<u64>()
                    .map_err(|_| ResourceParseError(format!("bad latency in {:?}", s)))?;
                (name.trim(), Some(millis))
            }
            None => (s, None),
        };

        match (name.to_ascii_lowercase().as_str(), millis) {
            ("load", millis) => Ok(Self::load(millis.unwrap_or(0))),
            ("fail", millis) => Ok(Self::fail(millis.unwrap_or(0))),
            ("hang", None) => Ok(Self::hang()),
            ("hang", Some(_)) => Err(ResourceParseError(format!(
                "{:?}: hang takes no latency",
                s
            ))),
            _ => Err(ResourceParseError(format!(
                "{:?}: expected load[:ms], fail[:ms] or hang",
                s
            ))),
        }
    }
}

/// Parse a `SRC=RULE` pair. The rule is taken after the last `=`, so URLs
/// with query strings work.
pub fn parse_rule(rule: &str) -> Result<(String, Resource), ResourceParseError> {
    let (src, resource) = rule
        .rsplit_once('=')
        .ok_or_else(|| ResourceParseError(format!("{:?}: expected SRC=RULE", rule)))?;
    if src.is_empty() {
        return Err(ResourceParseError(format!("{:?}: empty source", rule)));
    }
    Ok((src.to_string(), resource.parse()?))
}
