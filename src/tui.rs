use crate::error::{KatError, Result};
use dialoguer::{theme::ColorfulTheme, Confirm};
use std::path::Path;

/// Asks whether `destination` may be overwritten. Defaults to no.
pub fn confirm_overwrite(destination: &Path) -> Result<bool> {
    let theme = ColorfulTheme::default();
    Confirm::with_theme(&theme)
        .with_prompt(format!(
            "{} already exist!! Would you like to overwrite it?",
            destination.display()
        ))
        .default(false)
        .interact()
        .map_err(|e| match e {
            dialoguer::Error::IO(io) if io.kind() == std::io::ErrorKind::Interrupted => {
                KatError::Interrupted
            }
            dialoguer::Error::IO(io) => KatError::Io(io),
        })
}
