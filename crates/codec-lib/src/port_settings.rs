use codec_types::CodecError;

/// Renegotiation of the output port after the decoded format changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum PortSettingsChange {
    #[default]
    None,
    AwaitingDisabled,
    AwaitingEnabled,
}

impl PortSettingsChange {
    pub fn begin(&mut self) {
        *self = PortSettingsChange::AwaitingDisabled;
    }

    pub fn is_pending(&self) -> bool {
        *self != PortSettingsChange::None
    }

    /// Advances on an output port enable/disable completion. Completions
    /// outside a settings change are ignored.
    pub fn on_enable_completed(&mut self, enabled: bool) -> Result<(), CodecError> {
        *self = match (*self, enabled) {
            (PortSettingsChange::None, _) => PortSettingsChange::None,
            (PortSettingsChange::AwaitingDisabled, false) => PortSettingsChange::AwaitingEnabled,
            (PortSettingsChange::AwaitingEnabled, true) => PortSettingsChange::None,
            (state, enabled) => {
                return Err(CodecError::ProtocolViolation(format!(
                    "Output port {} while port settings change is {:?}",
                    if enabled { "enabled" } else { "disabled" },
                    state
                )))
            }
        };
        Ok(())
    }
}
