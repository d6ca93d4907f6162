//! Validation helpers for DTOs.

use validator::ValidationError;

/// Longest room code accepted from clients.
pub const MAX_ROOM_CODE_LEN: usize = 32;

/// Validates that a room code is 1 to [`MAX_ROOM_CODE_LEN`] ASCII alphanumerics, `-` or `_`.
///
/// # Examples
///
/// ```ignore
/// validate_room_code("ABC123")  // Ok
/// validate_room_code("")        // Err - empty
/// validate_room_code("ABC 123") // Err - space
/// ```
pub fn validate_room_code(code: &str) -> Result<(), ValidationError> {
    if code.is_empty() || code.len() > MAX_ROOM_CODE_LEN {
        let mut err = ValidationError::new("room_code_length");
        err.message = Some(
            format!(
                "Room code must be 1 to {MAX_ROOM_CODE_LEN} characters (got {})",
                code.len()
            )
            .into(),
        );
        return Err(err);
    }

    if !code
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        let mut err = ValidationError::new("room_code_format");
        err.message =
            Some("Room code must contain only ASCII letters, digits, '-' or '_'".into());
        return Err(err);
    }

    Ok(())
}
