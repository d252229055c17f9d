use serde::{Deserialize, Serialize};

use crate::label::LabelSet;

/// Parameters for joining the bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Options {
    /// Identifier naming the bus, e.g. `com.myapp`.
    pub identifier: String,
    /// Labels through which messages can be routed to this session.
    pub label: LabelSet,
    /// Security token checked by the engine on join.
    pub token: String,
    /// Whether this session may become the bus controller.
    pub controller_affinity: bool,
}

impl Options {
    pub fn new(identifier: impl Into<String>, label: LabelSet, token: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            label,
            token: token.into(),
            controller_affinity: true,
        }
    }

    pub fn with_controller_affinity(mut self, affinity: bool) -> Self {
        self.controller_affinity = affinity;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::labels;

    #[test]
    fn new_defaults_to_controller_affinity() {
        let opts = Options::new("solar.com", labels!("cc"), "");
        assert!(opts.controller_affinity);
        assert!(!opts.with_controller_affinity(false).controller_affinity);
    }
}
