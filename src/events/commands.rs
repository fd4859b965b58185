//! Credential-command grammar.

use std::sync::LazyLock;

use regex::Regex;
use secrecy::SecretString;

/// Explicit credential-management commands a user can issue in chat.
#[derive(Debug, Clone)]
pub enum CredentialCommand {
    /// Store (or overwrite) the caller's inference API key.
    Register(SecretString),
    /// Echo the stored key back to the caller.
    Show,
    /// Remove the stored key.
    Delete,
}

static REGISTER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^register\s+(\S+)$").unwrap());

/// Parse a message text into a credential command.
///
/// The keyword is case-insensitive; the secret's case is preserved.
/// Returns `None` for anything that is not an exact command, which then
/// falls through to image or ignorable classification.
pub fn parse(text: &str) -> Option<CredentialCommand> {
    let trimmed = text.trim();
    if let Some(caps) = REGISTER.captures(trimmed) {
        return Some(CredentialCommand::Register(SecretString::from(
            caps[1].to_string(),
        )));
    }
    if trimmed.eq_ignore_ascii_case("show key") {
        return Some(CredentialCommand::Show);
    }
    if trimmed.eq_ignore_ascii_case("delete key") {
        return Some(CredentialCommand::Delete);
    }
    None
}
