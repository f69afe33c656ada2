use thiserror::Error;

/// A required platform permission is missing
#[derive(Debug, Error)]
pub enum PermissionError {
    /// Input Monitoring (needed to observe modifier keys globally)
    #[error(
        "Input Monitoring permission denied\n\n\
        Enable in: System Settings → Privacy & Security → Input Monitoring\n\
        Add and enable this app, then restart."
    )]
    InputMonitoring,

    /// Microphone access
    #[error("microphone permission denied - enable in System Settings > Privacy & Security > Microphone")]
    Microphone,
}

/// Check microphone permission before acknowledging a recording start
///
/// # Errors
/// Currently never returns error (macOS prompts on first capture)
#[allow(clippy::unnecessary_wraps)] // Consistent API with other permission checks
pub fn check_microphone_permission() -> Result<(), PermissionError> {
    tracing::debug!("checking microphone permission");

    // macOS prompts on first CoreAudio use; there is no cheap synchronous probe
    Ok(())
}

/// Check Input Monitoring permission (required for the modifier event taps)
///
/// # Errors
/// Returns error if Input Monitoring permission is denied (macOS only)
pub fn check_input_monitoring_permission() -> Result<(), PermissionError> {
    tracing::info!("checking input monitoring permission");

    #[cfg(target_os = "macos")]
    {
        use core_graphics::event::CGEvent;
        use core_graphics::event_source::{CGEventSource, CGEventSourceStateID};

        // Creating an HID-state source fails without Input Monitoring
        let source = CGEventSource::new(CGEventSourceStateID::HIDSystemState)
            .map_err(|()| PermissionError::InputMonitoring)?;
        CGEvent::new(source).map_err(|()| PermissionError::InputMonitoring)?;

        tracing::info!("input monitoring permission granted");
    }

    Ok(())
}
