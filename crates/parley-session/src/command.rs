//! In-band conversation commands.

const RESET_COMMANDS: [&str; 3] = ["clear", "reset", "delete"];

/// True when the prompt asks to drop the conversation instead of being
/// forwarded for generation. Surrounding whitespace and case are ignored.
pub fn is_reset_command(prompt: &str) -> bool {
    let normalized = prompt.trim().to_lowercase();
    RESET_COMMANDS.contains(&normalized.as_str())
}
