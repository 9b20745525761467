use crate::registry::TrapKind;

/// What the trap handler does with a `SIGTRAP` that no armed trap explains.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ForeignSignals {
    /// Forward to the disposition that was installed before ours.
    #[default]
    Chain,
    /// Return from the handler and carry on.
    Ignore,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracerConfig {
    /// Traps installed by `start`.
    pub armed: Vec<TrapKind>,
    pub foreign_signals: ForeignSignals,
}

impl TracerConfig {
    pub fn is_armed(&self, kind: TrapKind) -> bool {
        self.armed.contains(&kind)
    }
}

impl Default for TracerConfig {
    fn default() -> Self {
        Self {
            armed: vec![TrapKind::InNewTlab],
            foreign_signals: ForeignSignals::Chain,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_arms_new_tlab_only() {
        let config = TracerConfig::default();
        assert!(config.is_armed(TrapKind::InNewTlab));
        assert!(!config.is_armed(TrapKind::OutsideTlab));
        assert_eq!(config.foreign_signals, ForeignSignals::Chain);
    }
}
