//! Message addressing.
//!
//! A [`Selector`] travels with every send and tells the engine which sessions
//! may receive the message, how many of them, and how long to hold the message
//! if nobody matches yet.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::label::LabelOp;

/// Routing mode of a selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum SelectorMode {
    /// Delivered to the first matching session only.
    Unicast,
    /// Delivered to every matching session.
    Multicast,
}

impl From<SelectorMode> for u8 {
    fn from(mode: SelectorMode) -> Self {
        match mode {
            SelectorMode::Unicast => 0,
            SelectorMode::Multicast => 1,
        }
    }
}

impl TryFrom<u8> for SelectorMode {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Unicast),
            1 => Ok(Self::Multicast),
            other => Err(format!("invalid selector mode: {other}")),
        }
    }
}

impl std::fmt::Display for SelectorMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unicast => write!(f, "unicast"),
            Self::Multicast => write!(f, "multicast"),
        }
    }
}

/// Describes how a message is routed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selector {
    pub label_op: LabelOp,
    pub mode: SelectorMode,
    /// How long, in milliseconds, the engine may hold a message that matches
    /// no session. Zero drops unroutable messages immediately.
    pub ttl: u32,
}

impl Selector {
    pub fn unicast(label_op: impl Into<LabelOp>) -> Self {
        Self {
            label_op: label_op.into(),
            mode: SelectorMode::Unicast,
            ttl: 0,
        }
    }

    pub fn multicast(label_op: impl Into<LabelOp>) -> Self {
        Self {
            label_op: label_op.into(),
            mode: SelectorMode::Multicast,
            ttl: 0,
        }
    }

    /// Set the time to live in milliseconds.
    pub fn with_ttl(mut self, ttl_ms: u32) -> Self {
        self.ttl = ttl_ms;
        self
    }

    pub fn ttl_duration(&self) -> Duration {
        Duration::from_millis(u64::from(self.ttl))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_default_to_zero_ttl() {
        let s = Selector::unicast("cc");
        assert_eq!(s.mode, SelectorMode::Unicast);
        assert_eq!(s.ttl, 0);
        assert!(s.ttl_duration().is_zero());

        let m = Selector::multicast(LabelOp::True).with_ttl(250);
        assert_eq!(m.mode, SelectorMode::Multicast);
        assert_eq!(m.ttl_duration(), Duration::from_millis(250));
    }

    #[test]
    fn mode_serializes_as_wire_integer() {
        let json = serde_json::to_string(&Selector::multicast("a")).unwrap();
        assert!(json.contains("\"mode\":1"));
        assert!(json.contains("\"ttl\":0"));

        let parsed: Selector = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.mode, SelectorMode::Multicast);
    }

    #[test]
    fn unknown_mode_rejected() {
        let err = serde_json::from_str::<SelectorMode>("7").unwrap_err();
        assert!(err.to_string().contains("invalid selector mode"));
    }
}
