//! Filesystem storage for post images.

use std::error::Error as StdError;
use std::fmt::Write as FmtWrite;
use std::path::{Component, Path, PathBuf};

use bytes::Bytes;
use futures::{StreamExt, pin_mut, stream};
use sha2::{Digest, Sha256};
use slug::slugify;
use thiserror::Error;
use tokio::{fs, io::AsyncWriteExt};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ImageStoreError {
    #[error("invalid stored path")]
    InvalidPath,
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("uploaded image exceeds configured body limit")]
    PayloadTooLarge {
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
    #[error("uploaded image stream failed")]
    PayloadStream {
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
    #[error("uploaded image is empty")]
    EmptyPayload,
    #[error("uploaded image size exceeds supported range")]
    SizeOverflow,
}

/// Metadata for a stored image.
#[derive(Debug, Clone)]
pub struct StoredImage {
    pub stored_path: String,
    pub checksum: String,
    pub size_bytes: i64,
}

/// Filesystem-backed image storage rooted at the uploads directory.
#[derive(Debug)]
pub struct ImageStore {
    root: PathBuf,
}

impl ImageStore {
    /// Initialise storage rooted at the provided directory, creating it if necessary.
    pub fn new(root: PathBuf) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Stream the payload to disk and return metadata for the stored image.
    pub async fn store_stream<S>(
        &self,
        original_name: &str,
        stream: S,
    ) -> Result<StoredImage, ImageStoreError>
    where
        S: futures::Stream<Item = Result<Bytes, ImageStoreError>>,
    {
        let stored_path = self.build_stored_path(original_name);
        let absolute = self.resolve(&stored_path)?;

        if let Some(parent) = absolute.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut file = fs::File::create(&absolute).await?;
        let mut hasher = Sha256::new();
        let mut total_bytes: u64 = 0;
        let mut saw_payload = false;

        pin_mut!(stream);
        while let Some(chunk_result) = stream.next().await {
            let chunk = match chunk_result {
                Ok(chunk) => chunk,
                Err(err) => {
                    drop(file);
                    let _ = fs::remove_file(&absolute).await;
                    return Err(err);
                }
            };

            if chunk.is_empty() {
                continue;
            }

            saw_payload = true;
            total_bytes = total_bytes
                .checked_add(chunk.len() as u64)
                .ok_or(ImageStoreError::SizeOverflow)?;
            file.write_all(&chunk).await?;
            hasher.update(&chunk);
        }

        file.flush().await?;

        if !saw_payload {
            drop(file);
            let _ = fs::remove_file(&absolute).await;
            return Err(ImageStoreError::EmptyPayload);
        }

        let digest = hasher.finalize();
        let checksum = hex_from_bytes(&digest);
        let size_bytes = i64::try_from(total_bytes).map_err(|_| ImageStoreError::SizeOverflow)?;

        Ok(StoredImage {
            stored_path,
            checksum,
            size_bytes,
        })
    }

    /// Store a fully-buffered payload. Intended for tests and small assets.
    pub async fn store(
        &self,
        original_name: &str,
        data: Bytes,
    ) -> Result<StoredImage, ImageStoreError> {
        let stream = stream::once(async move { Ok::<_, ImageStoreError>(data) });
        self.store_stream(original_name, stream).await
    }

    /// Remove a stored payload. A missing file counts as already removed.
    pub async fn remove(&self, stored_path: &str) -> Result<(), ImageStoreError> {
        let absolute = self.resolve(stored_path)?;
        match fs::remove_file(absolute).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    /// Read the stored payload into memory.
    pub async fn read(&self, stored_path: &str) -> Result<Bytes, ImageStoreError> {
        let absolute = self.resolve(stored_path)?;
        let data = fs::read(absolute).await?;
        Ok(Bytes::from(data))
    }

    /// Resolve the absolute filesystem path for a stored image, rejecting
    /// absolute paths and parent-directory traversal.
    fn resolve(&self, stored_path: &str) -> Result<PathBuf, ImageStoreError> {
        let relative = Path::new(stored_path);
        if relative.is_absolute()
            || relative
                .components()
                .any(|component| matches!(component, Component::ParentDir | Component::Prefix(_)))
        {
            return Err(ImageStoreError::InvalidPath);
        }

        Ok(self.root.join(relative))
    }

    fn build_stored_path(&self, original_name: &str) -> String {
        let (year, month, day) = time::OffsetDateTime::now_utc().to_calendar_date();
        let directory = format!("{year}/{:02}/{:02}", month as u8, day);
        let identifier = Uuid::new_v4();
        let filename = sanitize_filename(original_name);
        format!("{directory}/{identifier}-{filename}")
    }
}

fn sanitize_filename(original: &str) -> String {
    let path = Path::new(original);
    let stem = path
        .file_stem()
        .and_then(|value| value.to_str())
        .unwrap_or("image");
    let mut base = slugify(stem);
    if base.is_empty() {
        base = "image".to_string();
    }

    let extension = path
        .extension()
        .and_then(|value| value.to_str())
        .map(|value| value.trim_matches('.').to_ascii_lowercase())
        .filter(|value| !value.is_empty());

    match extension {
        Some(ext) => format!("{base}.{ext}"),
        None => base,
    }
}

fn hex_from_bytes(bytes: &[u8]) -> String {
    let mut output = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let _ = FmtWrite::write_fmt(&mut output, format_args!("{byte:02x}"));
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filenames_are_slugified_and_keep_their_extension() {
        assert_eq!(sanitize_filename("Winter Scene.JPG"), "winter-scene.jpg");
        assert_eq!(sanitize_filename("...."), "image");
        assert_eq!(sanitize_filename("plain"), "plain");
    }

    #[tokio::test]
    async fn traversal_paths_are_rejected() {
        let dir = std::env::temp_dir().join(format!("brume-uploads-{}", Uuid::new_v4()));
        let store = ImageStore::new(dir.clone()).expect("create store");

        let err = store.read("../outside.png").await.expect_err("must reject");
        assert!(matches!(err, ImageStoreError::InvalidPath));

        let err = store.read("/etc/passwd").await.expect_err("must reject");
        assert!(matches!(err, ImageStoreError::InvalidPath));

        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn stored_images_round_trip() {
        let dir = std::env::temp_dir().join(format!("brume-uploads-{}", Uuid::new_v4()));
        let store = ImageStore::new(dir.clone()).expect("create store");

        let stored = store
            .store("photo.png", Bytes::from_static(b"pixels"))
            .await
            .expect("store image");
        assert!(stored.stored_path.ends_with("photo.png"));
        assert_eq!(stored.size_bytes, 6);

        let data = store.read(&stored.stored_path).await.expect("read back");
        assert_eq!(data, Bytes::from_static(b"pixels"));

        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn removal_deletes_the_file_and_is_idempotent() {
        let dir = std::env::temp_dir().join(format!("brume-uploads-{}", Uuid::new_v4()));
        let store = ImageStore::new(dir.clone()).expect("create store");

        let stored = store
            .store("photo.png", Bytes::from_static(b"pixels"))
            .await
            .expect("store image");

        store.remove(&stored.stored_path).await.expect("remove");
        assert!(store.read(&stored.stored_path).await.is_err());
        store
            .remove(&stored.stored_path)
            .await
            .expect("second remove is a no-op");

        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn empty_payloads_are_rejected() {
        let dir = std::env::temp_dir().join(format!("brume-uploads-{}", Uuid::new_v4()));
        let store = ImageStore::new(dir.clone()).expect("create store");

        let err = store
            .store("photo.png", Bytes::new())
            .await
            .expect_err("empty payload must fail");
        assert!(matches!(err, ImageStoreError::EmptyPayload));

        let _ = std::fs::remove_dir_all(dir);
    }
}
