// GyroWatch — System Events & Data Types

// ---------------------------------------------------------------------------
// Button Events — posted by the input task, drained by the main loop
// ---------------------------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonEvent {
    /// Single button click detected.
    SingleClick,
    /// Double button click detected.
    DoubleClick,
    /// Long button press detected.
    LongPress,
}

// ---------------------------------------------------------------------------
// Display views
// ---------------------------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ViewMode {
    /// Scrolling spectrogram of the rotation-angle signal.
    #[default]
    Spectrogram,
    /// Live angle trace plus a rotation dial.
    Scope,
}

impl ViewMode {
    pub fn toggle(self) -> Self {
        match self {
            Self::Spectrogram => Self::Scope,
            Self::Scope => Self::Spectrogram,
        }
    }
}
