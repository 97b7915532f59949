/// Reasons an uploaded filename is rejected.
#[derive(Debug, PartialEq, Eq)]
pub enum DisplayNameError {
    /// Empty, whitespace-only, or nothing left after stripping directories.
    Empty,
    /// `.` or `..`.
    PathTraversal,
    NullByte,
    /// Control characters (CR, LF, etc.).
    ControlCharacter,
    TooLong,
}

impl DisplayNameError {
    pub fn message(&self) -> &'static str {
        match self {
            Self::Empty => "Filename cannot be empty",
            Self::PathTraversal => "Invalid filename: '.' and '..' are not allowed",
            Self::NullByte => "Invalid filename: null bytes are not allowed",
            Self::ControlCharacter => "Invalid filename: control characters are not allowed",
            Self::TooLong => "Filename exceeds maximum length of 255 characters",
        }
    }
}

pub const MAX_DISPLAY_NAME_CHARS: usize = 255;

/// Reduce a client-supplied filename to a flat display name.
///
/// Browsers may send a full path (`C:\fakepath\a.txt`); only the last
/// component is kept.
pub fn normalize_display_name(raw: &str) -> Result<String, DisplayNameError> {
    if raw.contains('\0') {
        return Err(DisplayNameError::NullByte);
    }

    let name = raw
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();

    if name.is_empty() {
        return Err(DisplayNameError::Empty);
    }

    // CRLF would otherwise end up in Content-Disposition.
    if name.chars().any(|c| c.is_control()) {
        return Err(DisplayNameError::ControlCharacter);
    }

    if name == "." || name == ".." {
        return Err(DisplayNameError::PathTraversal);
    }

    if name.chars().count() > MAX_DISPLAY_NAME_CHARS {
        return Err(DisplayNameError::TooLong);
    }

    Ok(name.to_string())
}
