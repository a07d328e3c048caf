use crate::error::CanvasError;

pub const DEFAULT_PANEL: &str = "default";
pub const MAX_PANEL_NAME_LEN: usize = 64;

/// Trims `raw` and checks it against `[A-Za-z0-9._-]{1,64}`.
pub fn normalize_panel_name(raw: &str) -> Result<String, CanvasError> {
    let name = raw.trim();
    if is_valid_panel_name(name) {
        Ok(name.to_string())
    } else {
        Err(CanvasError::InvalidName(raw.to_string()))
    }
}

/// Strict form used for keys read back from disk: no trimming.
pub fn is_valid_panel_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_PANEL_NAME_LEN
        && name
            .bytes()
            .all(|byte| byte.is_ascii_alphanumeric() || matches!(byte, b'.' | b'_' | b'-'))
}

pub(crate) fn name_or_default(raw: Option<&str>) -> Result<String, CanvasError> {
    match raw {
        Some(value) if !value.trim().is_empty() => normalize_panel_name(value),
        _ => Ok(DEFAULT_PANEL.to_string()),
    }
}
