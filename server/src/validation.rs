use crate::error::ApiError;

/// Maximum text length for speak requests
const MAX_TEXT_LENGTH: usize = 5000;
const MIN_SPEED: f32 = 0.5;
const MAX_SPEED: f32 = 2.0;
const MAX_VOICE_NAME_LENGTH: usize = 64;

/// Validate a speak request
pub fn validate_speak_request(text: &str, speed: Option<f32>) -> Result<(), ApiError> {
    if text.trim().is_empty() {
        return Err(ApiError::InvalidInput("Text cannot be empty".to_string()));
    }
    if text.len() > MAX_TEXT_LENGTH {
        return Err(ApiError::InvalidInput(format!(
            "Text too long (max {} characters)",
            MAX_TEXT_LENGTH
        )));
    }

    if let Some(speed) = speed {
        if !speed.is_finite() || !(MIN_SPEED..=MAX_SPEED).contains(&speed) {
            return Err(ApiError::InvalidInput(format!(
                "Speed must be between {} and {}",
                MIN_SPEED, MAX_SPEED
            )));
        }
    }

    Ok(())
}

/// Validate voice name format (e.g. expr-voice-2-f)
pub fn validate_voice_name(name: &str) -> Result<(), ApiError> {
    if name.is_empty() || name.len() > MAX_VOICE_NAME_LENGTH {
        return Err(ApiError::InvalidInput(format!(
            "Voice name must be 1-{} characters",
            MAX_VOICE_NAME_LENGTH
        )));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return Err(ApiError::InvalidInput(format!(
            "Invalid voice name: {}. Use letters, digits, '-', '_' or '.'",
            name
        )));
    }
    Ok(())
}
