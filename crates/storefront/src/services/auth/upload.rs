//! Profile picture constraints, checked before any upload.

use std::path::Path;

use crate::error::UploadViolation;
use crate::gateway::ProfilePictureUpload;

/// Largest accepted profile picture (5 MiB).
pub const MAX_PROFILE_PICTURE_BYTES: usize = 5 * 1024 * 1024;

/// Accepted profile picture MIME types.
pub const ALLOWED_CONTENT_TYPES: &[&str] = &["image/jpeg", "image/png", "image/webp"];

/// Validate size and type of a profile picture.
///
/// # Errors
///
/// Returns the first [`UploadViolation`] found; size is checked first.
pub fn check_upload(upload: &ProfilePictureUpload) -> Result<(), UploadViolation> {
    if upload.size() > MAX_PROFILE_PICTURE_BYTES {
        return Err(UploadViolation::TooLarge {
            size: upload.size(),
            max: MAX_PROFILE_PICTURE_BYTES,
        });
    }

    let essence = upload
        .content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    if !ALLOWED_CONTENT_TYPES.contains(&essence.as_str()) {
        return Err(UploadViolation::UnsupportedType(upload.content_type.clone()));
    }

    Ok(())
}

/// Guess an accepted image MIME type from a file extension.
#[must_use]
pub fn content_type_for_path(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "webp" => Some("image/webp"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upload(size: usize, content_type: &str) -> ProfilePictureUpload {
        ProfilePictureUpload {
            file_name: "avatar".to_string(),
            content_type: content_type.to_string(),
            bytes: vec![0; size],
        }
    }

    #[test]
    fn test_accepts_allowed_types_at_limit() {
        for content_type in ALLOWED_CONTENT_TYPES {
            assert_eq!(check_upload(&upload(MAX_PROFILE_PICTURE_BYTES, content_type)), Ok(()));
        }
        assert_eq!(check_upload(&upload(10, "image/PNG; charset=binary")), Ok(()));
    }

    #[test]
    fn test_rejects_oversized() {
        assert_eq!(
            check_upload(&upload(6_000_000, "image/png")),
            Err(UploadViolation::TooLarge {
                size: 6_000_000,
                max: MAX_PROFILE_PICTURE_BYTES
            })
        );
    }

    #[test]
    fn test_rejects_other_types() {
        assert!(matches!(
            check_upload(&upload(10, "image/gif")),
            Err(UploadViolation::UnsupportedType(t)) if t == "image/gif"
        ));
    }

    #[test]
    fn test_content_type_for_path() {
        assert_eq!(content_type_for_path(Path::new("me.JPG")), Some("image/jpeg"));
        assert_eq!(content_type_for_path(Path::new("me.webp")), Some("image/webp"));
        assert_eq!(content_type_for_path(Path::new("me.gif")), None);
        assert_eq!(content_type_for_path(Path::new("me")), None);
    }
}
