use uuid::Uuid;

const MAX_KEY_LEN: usize = 255;
const MAX_EXTENSION_LEN: usize = 8;

/// Generates a fresh asset key `<uuid>.<ext>`, keeping a sanitised extension
/// of the uploaded file name.
pub fn generate_key(original_filename: &str) -> String {
    let uuid = Uuid::new_v4();
    let extension = original_filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| {
            !ext.is_empty()
                && ext.len() <= MAX_EXTENSION_LEN
                && ext.chars().all(|c| c.is_ascii_alphanumeric())
        });
    match extension {
        Some(ext) => format!("{}.{}", uuid, ext),
        None => uuid.to_string(),
    }
}

/// A key is a single, plain file name.
pub fn is_valid_key(key: &str) -> bool {
    !key.is_empty()
        && key.len() <= MAX_KEY_LEN
        && key != "."
        && key != ".."
        && !key.contains(['/', '\\', '\0'])
}

/// Reduces a stored image reference (a bare key, `/uploads/<file>`, or a URL
/// ending in the file name) to its key.
pub fn normalize_reference(reference: &str) -> Option<String> {
    let reference = reference.trim();
    let candidate = reference
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(reference);
    is_valid_key(candidate).then(|| candidate.to_string())
}

pub fn content_type_for(key: &str) -> &'static str {
    let extension = key
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "svg" => "image/svg+xml",
        "avif" => "image/avif",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_keys_are_unique_and_valid() {
        let a = generate_key("Twin Mill.JPG");
        let b = generate_key("Twin Mill.JPG");
        assert_ne!(a, b);
        assert!(a.ends_with(".jpg"));
        assert!(is_valid_key(&a));
    }

    #[test]
    fn test_generated_key_drops_odd_extensions() {
        let key = generate_key("photo.tar/../../x");
        assert!(!key.contains('.'));
        assert!(!generate_key("no_extension").contains('.'));
    }

    #[test]
    fn test_key_validation() {
        assert!(is_valid_key("1700000000000-deora.png"));
        assert!(!is_valid_key(""));
        assert!(!is_valid_key(".."));
        assert!(!is_valid_key("../etc/passwd"));
        assert!(!is_valid_key("a\\b"));
    }

    #[test]
    fn test_normalize_legacy_references() {
        assert_eq!(
            normalize_reference("/uploads/1700000000000-deora.png").as_deref(),
            Some("1700000000000-deora.png")
        );
        assert_eq!(
            normalize_reference("http://localhost:2105/uploads/a.png").as_deref(),
            Some("a.png")
        );
        assert_eq!(normalize_reference("a.png").as_deref(), Some("a.png"));
        assert_eq!(normalize_reference("/uploads/"), None);
    }

    #[test]
    fn test_content_type_for() {
        assert_eq!(content_type_for("x.JPEG"), "image/jpeg");
        assert_eq!(content_type_for("x.png"), "image/png");
        assert_eq!(content_type_for("x"), "application/octet-stream");
    }
}
