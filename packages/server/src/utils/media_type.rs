pub const FALLBACK_MEDIA_TYPE: &str = "application/octet-stream";

/// Media type recorded for an upload: the declared multipart content type,
/// else a guess from the file extension, else `application/octet-stream`.
pub fn resolve_media_type(declared: Option<&str>, display_name: &str) -> String {
    if let Some(declared) = declared.map(str::trim)
        && !declared.is_empty()
        && declared.parse::<mime_guess::Mime>().is_ok()
    {
        return declared.to_ascii_lowercase();
    }

    mime_guess::from_path(display_name)
        .first()
        .map(|m| m.to_string())
        .unwrap_or_else(|| FALLBACK_MEDIA_TYPE.to_string())
}
