// ABOUTME: Session id validation shared by the factory, every backend and the server
// ABOUTME: Ids become container names, host mount directories and URL path segments

use crate::error::{Result, SandboxError};

pub const MAX_SESSION_ID_LEN: usize = 128;

/// Accept `[A-Za-z0-9][A-Za-z0-9_.-]{0,127}`: always exactly one normal path component,
/// never `.` or `..`
pub fn validate_session_id(session_id: &str) -> Result<()> {
    let invalid = || SandboxError::InvalidSessionId(session_id.to_string());

    let mut chars = session_id.chars();
    let first = chars.next().ok_or_else(invalid)?;
    if !first.is_ascii_alphanumeric() || session_id.len() > MAX_SESSION_ID_LEN {
        return Err(invalid());
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')) {
        return Err(invalid());
    }
    Ok(())
}
