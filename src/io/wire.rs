//! State message wire codec
//!
//! Messages are ASCII, newline-framed, one space-separated token per zone:
//! `zone_a=1 zone_b=0`. One message is sent per update cycle. Framing is
//! newline-delimited on both sides so partial or merged TCP reads never
//! split a message.

use crate::domain::types::ZoneLights;

/// Malformed state message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireError {
    pub reason: String,
}

impl WireError {
    fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }
}

impl std::fmt::Display for WireError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "malformed state message: {}", self.reason)
    }
}

impl std::error::Error for WireError {}

/// Encode a light vector as a single state message, without the trailing
/// newline (framing is the transport's concern)
pub fn encode_lights(lights: &ZoneLights) -> String {
    lights
        .iter()
        .map(|(name, lit)| format!("zone_{}={}", name, u8::from(*lit)))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parse a state message into (zone name, flag) pairs
///
/// Structurally malformed tokens fail the whole message; deciding which
/// zone names matter is the caller's business (names the receiver does
/// not recognize are simply ignored there).
pub fn parse_lights(line: &str) -> Result<Vec<(String, bool)>, WireError> {
    let line = line.trim();
    if line.is_empty() {
        return Err(WireError::new("empty message"));
    }

    let mut pairs = Vec::new();
    for token in line.split_whitespace() {
        let Some(rest) = token.strip_prefix("zone_") else {
            return Err(WireError::new(format!("token without zone_ prefix: {:?}", token)));
        };
        let Some((name, value)) = rest.split_once('=') else {
            return Err(WireError::new(format!("token without '=': {:?}", token)));
        };
        if name.is_empty() {
            return Err(WireError::new(format!("empty zone name: {:?}", token)));
        }
        let flag = match value {
            "0" => false,
            "1" => true,
            other => {
                return Err(WireError::new(format!("flag not 0/1: {:?}", other)));
            }
        };
        pairs.push((name.to_string(), flag));
    }
    Ok(pairs)
}
