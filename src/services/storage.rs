//! Filesystem object store for uploaded images and business documents.
//!
//! Objects live under `STORAGE_ROOT` at the paths built by [`ObjectPath`] and are
//! published as `{PUBLIC_BASE_URL}/api/files/{path}`.

use std::path::{Path, PathBuf};

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::Deserialize;
use thiserror::Error;
use tokio::fs;
use validator::Validate;

pub const FILES_ROUTE: &str = "/api/files/";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Invalid file name: {0}")]
    InvalidName(String),
    #[error("File data is not valid base64")]
    InvalidEncoding(#[from] base64::DecodeError),
    #[error("File is empty")]
    Empty,
    #[error("File exceeds the {limit} byte upload limit")]
    TooLarge { limit: usize },
    #[error("Unsupported file type: {0}")]
    UnsupportedType(String),
    #[error("Stored file not found: {0}")]
    NotFound(String),
    #[error("Storage I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    pub fn is_client_error(&self) -> bool {
        !matches!(self, StorageError::Io(_) | StorageError::NotFound(_))
    }
}

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "gif"];
const DOCUMENT_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "pdf"];

/// A file sent as base64 inside a JSON body.
#[derive(Debug, Deserialize, Validate)]
pub struct Upload {
    #[validate(length(min = 1, max = 200, message = "File name is required"))]
    pub file_name: String,
    #[validate(length(min = 1, message = "File data is required"))]
    pub data: String,
}

impl Upload {
    pub fn extension(&self) -> Option<String> {
        Path::new(&self.file_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
    }

    pub fn require_image(&self) -> Result<(), StorageError> {
        self.require_extension(IMAGE_EXTENSIONS)
    }

    pub fn require_document(&self) -> Result<(), StorageError> {
        self.require_extension(DOCUMENT_EXTENSIONS)
    }

    fn require_extension(&self, allowed: &[&str]) -> Result<(), StorageError> {
        match self.extension() {
            Some(ext) if allowed.contains(&ext.as_str()) => Ok(()),
            _ => Err(StorageError::UnsupportedType(self.file_name.clone())),
        }
    }

    pub fn decode(&self, limit: usize) -> Result<Vec<u8>, StorageError> {
        // Tolerate data URLs ("data:image/png;base64,....").
        let payload = match self.data.split_once(";base64,") {
            Some((_, rest)) => rest,
            None => self.data.as_str(),
        };
        let bytes = STANDARD.decode(payload.trim())?;
        if bytes.is_empty() {
            return Err(StorageError::Empty);
        }
        if bytes.len() > limit {
            return Err(StorageError::TooLarge { limit });
        }
        Ok(bytes)
    }
}

/// A relative, sanitised object key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectPath(String);

impl ObjectPath {
    pub fn profile_image(uid: &str, file_name: &str) -> Result<Self, StorageError> {
        Ok(Self(format!(
            "profile_images/{}/{}",
            segment(uid)?,
            segment(file_name)?
        )))
    }

    pub fn vehicle_image(uid: &str, vehicle_id: &str, file_name: &str) -> Result<Self, StorageError> {
        Ok(Self(format!(
            "vehicles/{}/{}/{}",
            segment(uid)?,
            segment(vehicle_id)?,
            segment(file_name)?
        )))
    }

    /// Directory holding every image of one vehicle.
    pub fn vehicle_dir(uid: &str, vehicle_id: &str) -> Result<Self, StorageError> {
        Ok(Self(format!("vehicles/{}/{}", segment(uid)?, segment(vehicle_id)?)))
    }

    pub fn settings_logo(timestamp_millis: i64, extension: &str) -> Result<Self, StorageError> {
        Ok(Self(format!(
            "settings/logo_{}.{}",
            timestamp_millis,
            segment(extension)?
        )))
    }

    pub fn business_permit(uid: &str) -> Result<Self, StorageError> {
        Ok(Self(format!("business-permits/{}", segment(uid)?)))
    }

    pub fn business_registration(uid: &str) -> Result<Self, StorageError> {
        Ok(Self(format!("business-registrations/{}", segment(uid)?)))
    }

    /// Parses a key taken from a request path; every segment must be clean.
    pub fn parse(raw: &str) -> Result<Self, StorageError> {
        let segments = raw
            .trim_matches('/')
            .split('/')
            .map(segment)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self(segments.join("/")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Turns a client-supplied name into a storable, unique segment.
pub fn unique_file_name(raw: &str, timestamp_millis: i64) -> String {
    let base = Path::new(raw)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("file");
    let cleaned: String = base
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') { c } else { '_' })
        .collect();
    format!("{}_{}", timestamp_millis, cleaned.trim_start_matches('.'))
}

fn segment(raw: &str) -> Result<&str, StorageError> {
    let valid = !raw.is_empty()
        && raw.len() <= 200
        && !raw.starts_with('.')
        && raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(raw)
    } else {
        Err(StorageError::InvalidName(raw.to_string()))
    }
}

#[derive(Debug, Clone)]
pub struct ObjectStore {
    root: PathBuf,
    public_base_url: String,
}

impl ObjectStore {
    pub fn new(root: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn local_path(&self, path: &ObjectPath) -> PathBuf {
        self.root.join(path.as_str())
    }

    pub fn url_for(&self, path: &ObjectPath) -> String {
        format!("{}{}{}", self.public_base_url, FILES_ROUTE, path.as_str())
    }

    /// Maps a URL this store handed out back to its key. Foreign URLs yield `None`.
    pub fn path_from_url(&self, raw_url: &str) -> Option<ObjectPath> {
        let url = url::Url::parse(raw_url).ok()?;
        let base = url::Url::parse(&self.public_base_url).ok()?;
        if url.origin() != base.origin() {
            return None;
        }
        let key = url.path().strip_prefix(FILES_ROUTE)?;
        ObjectPath::parse(key).ok()
    }

    /// Writes the object and returns its public URL.
    pub async fn put(&self, path: &ObjectPath, bytes: &[u8]) -> Result<String, StorageError> {
        let target = self.local_path(path);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&target, bytes).await?;
        log::debug!("Stored {} ({} bytes)", path.as_str(), bytes.len());
        Ok(self.url_for(path))
    }

    pub async fn read(&self, path: &ObjectPath) -> Result<Vec<u8>, StorageError> {
        match fs::read(self.local_path(path)).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(path.as_str().to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Deleting a missing object is not an error.
    pub async fn delete(&self, path: &ObjectPath) -> Result<(), StorageError> {
        match fs::remove_file(self.local_path(path)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn delete_dir(&self, path: &ObjectPath) -> Result<(), StorageError> {
        match fs::remove_dir_all(self.local_path(path)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Best-effort removal of an object we replaced; failures are only logged.
    pub async fn discard_url(&self, url: Option<&str>) {
        let Some(path) = url.and_then(|u| self.path_from_url(u)) else {
            return;
        };
        if let Err(e) = self.delete(&path).await {
            log::warn!("Failed to delete replaced object {}: {}", path.as_str(), e);
        }
    }
}

/// Content type for serving an object back, by extension.
pub fn content_type_for(path: &ObjectPath) -> &'static str {
    let ext = Path::new(path.as_str())
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        Some("pdf") => "application/pdf",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upload(file_name: &str, data: &str) -> Upload {
        Upload {
            file_name: file_name.to_string(),
            data: data.to_string(),
        }
    }

    #[test]
    fn paths_follow_the_storage_layout() {
        assert_eq!(
            ObjectPath::profile_image("u1", "me.png").unwrap().as_str(),
            "profile_images/u1/me.png"
        );
        assert_eq!(
            ObjectPath::vehicle_image("u1", "v9", "front.jpg").unwrap().as_str(),
            "vehicles/u1/v9/front.jpg"
        );
        assert_eq!(
            ObjectPath::settings_logo(1700000000000, "png").unwrap().as_str(),
            "settings/logo_1700000000000.png"
        );
        assert_eq!(
            ObjectPath::business_permit("u1").unwrap().as_str(),
            "business-permits/u1"
        );
        assert_eq!(
            ObjectPath::business_registration("u1").unwrap().as_str(),
            "business-registrations/u1"
        );
    }

    #[test]
    fn traversal_is_rejected() {
        assert!(ObjectPath::profile_image("u1", "../secret").is_err());
        assert!(ObjectPath::profile_image("..", "a.png").is_err());
        assert!(ObjectPath::parse("vehicles/../../etc/passwd").is_err());
        assert!(ObjectPath::parse("vehicles/u1/.hidden").is_err());
        assert!(ObjectPath::parse("vehicles/u1/v1/a.png").is_ok());
    }

    #[test]
    fn unique_names_are_prefixed_and_cleaned() {
        assert_eq!(unique_file_name("front view.JPG", 42), "42_front_view.JPG");
        assert_eq!(unique_file_name("../../etc/passwd", 7), "7_passwd");
        assert_eq!(unique_file_name(".env", 1), "1_env");
        assert!(ObjectPath::profile_image("u1", &unique_file_name("a b?.png", 3)).is_ok());
    }

    #[test]
    fn decode_accepts_data_urls_and_enforces_limit() {
        let encoded = STANDARD.encode(b"pngbytes");
        let plain = upload("a.png", &encoded);
        assert_eq!(plain.decode(1024).unwrap(), b"pngbytes");

        let data_url = upload("a.png", &format!("data:image/png;base64,{}", encoded));
        assert_eq!(data_url.decode(1024).unwrap(), b"pngbytes");

        assert!(matches!(
            plain.decode(4),
            Err(StorageError::TooLarge { limit: 4 })
        ));
        assert!(matches!(
            upload("a.png", "***").decode(1024),
            Err(StorageError::InvalidEncoding(_))
        ));
    }

    #[test]
    fn extension_checks() {
        assert!(upload("Car.JPG", "x").require_image().is_ok());
        assert!(upload("permit.pdf", "x").require_image().is_err());
        assert!(upload("permit.pdf", "x").require_document().is_ok());
        assert!(upload("noext", "x").require_document().is_err());
    }

    #[test]
    fn urls_map_back_to_paths_only_for_this_store() {
        let store = ObjectStore::new("/tmp/unused", "http://localhost:8080/");
        let path = ObjectPath::vehicle_image("u1", "v1", "a.png").unwrap();
        let url = store.url_for(&path);
        assert_eq!(url, "http://localhost:8080/api/files/vehicles/u1/v1/a.png");
        assert_eq!(store.path_from_url(&url), Some(path));
        assert_eq!(
            store.path_from_url("https://cdn.example.com/api/files/vehicles/u1/v1/a.png"),
            None
        );
    }

    #[tokio::test]
    async fn put_read_delete_roundtrip_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = ObjectStore::new(dir.path(), "http://localhost:8080");
        let path = ObjectPath::vehicle_image("u1", "v1", "a.png").unwrap();

        store.put(&path, b"img").await.unwrap();
        assert_eq!(store.read(&path).await.unwrap(), b"img");

        store
            .delete_dir(&ObjectPath::vehicle_dir("u1", "v1").unwrap())
            .await
            .unwrap();
        assert!(matches!(
            store.read(&path).await,
            Err(StorageError::NotFound(_))
        ));
        // Deleting again is a no-op.
        store.delete(&path).await.unwrap();
    }

    #[test]
    fn content_types() {
        let path = ObjectPath::parse("business-permits/u1").unwrap();
        assert_eq!(content_type_for(&path), "application/octet-stream");
        let path = ObjectPath::parse("settings/logo_1.PNG").unwrap();
        assert_eq!(content_type_for(&path), "image/png");
    }
}
