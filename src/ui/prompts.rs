//! Confirmation prompts with CI fallback

use super::context::UiContext;
use crate::error::{ShipwrightError, ShipwrightResult};

/// Ask for confirmation; non-interactive sessions get `default`
pub async fn confirm(ctx: &UiContext, message: &str, default: bool) -> ShipwrightResult<bool> {
    if ctx.auto_yes() {
        println!("  {} (auto-approved)", message);
        return Ok(true);
    }
    if !ctx.is_interactive() {
        return Ok(default);
    }

    let message = message.to_string();
    tokio::task::spawn_blocking(move || {
        cliclack::confirm(&message)
            .initial_value(default)
            .interact()
    })
    .await
    .map_err(|e| ShipwrightError::User(format!("Prompt task failed: {}", e)))?
    .map_err(|e| ShipwrightError::User(format!("Prompt failed: {}", e)))
}
