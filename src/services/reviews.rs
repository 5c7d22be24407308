//! Patient reviews and the review image gallery.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::AsyncWriteExt;

use crate::constants::REVIEW_IMAGE_EXTENSIONS;
use crate::db::{NewReview, Review, Store};

const MAX_AUTHOR_CHARS: usize = 100;
const MAX_BODY_CHARS: usize = 2000;

#[derive(Debug, Error)]
pub enum ReviewError {
    #[error("Review not found: {0}")]
    NotFound(i32),

    #[error("Image not found: {0}")]
    ImageNotFound(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<anyhow::Error> for ReviewError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<std::io::Error> for ReviewError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModerationDecision {
    Accept,
    Reject,
}

impl ModerationDecision {
    #[must_use]
    pub const fn status(self) -> &'static str {
        match self {
            Self::Accept => "approved",
            Self::Reject => "rejected",
        }
    }
}

pub struct ReviewService {
    store: Store,
}

impl ReviewService {
    #[must_use]
    pub const fn new(store: Store) -> Self {
        Self { store }
    }

    /// Stores a review as pending. It stays hidden until an admin accepts it.
    pub async fn submit(&self, review: NewReview) -> Result<Review, ReviewError> {
        let author = review.author.trim().to_string();
        let body = review.body.trim().to_string();

        if author.is_empty() || body.is_empty() {
            return Err(ReviewError::Validation(
                "Name and review text are required".to_string(),
            ));
        }
        if author.chars().count() > MAX_AUTHOR_CHARS || body.chars().count() > MAX_BODY_CHARS {
            return Err(ReviewError::Validation("Review is too long".to_string()));
        }
        if !(1..=5).contains(&review.rating) {
            return Err(ReviewError::Validation(
                "Rating must be between 1 and 5".to_string(),
            ));
        }

        Ok(self
            .store
            .reviews()
            .insert(&NewReview {
                author,
                body,
                rating: review.rating,
            })
            .await?)
    }

    pub async fn list_approved(&self) -> Result<Vec<Review>, ReviewError> {
        Ok(self
            .store
            .reviews()
            .list_by_status(Some(ModerationDecision::Accept.status()))
            .await?)
    }

    pub async fn list_all(&self, status: Option<&str>) -> Result<Vec<Review>, ReviewError> {
        Ok(self.store.reviews().list_by_status(status).await?)
    }

    pub async fn moderate(
        &self,
        id: i32,
        decision: ModerationDecision,
    ) -> Result<Review, ReviewError> {
        let repo = self.store.reviews();
        if !repo.set_status(id, decision.status()).await? {
            return Err(ReviewError::NotFound(id));
        }
        repo.get(id).await?.ok_or(ReviewError::NotFound(id))
    }
}

/// Image files shown on the reviews page, kept in one flat directory.
pub struct ReviewImageStore {
    dir: PathBuf,
    max_bytes: usize,
}

impl ReviewImageStore {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, max_upload_mb: usize) -> Self {
        Self {
            dir: dir.into(),
            max_bytes: max_upload_mb * 1024 * 1024,
        }
    }

    #[must_use]
    pub const fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Allowed image files, sorted by name. A missing directory is empty.
    pub async fn list(&self) -> Result<Vec<String>, ReviewError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let file_name = entry.file_name();
            if let Some(name) = file_name.to_str()
                && has_allowed_extension(name)
            {
                names.push(name.to_string());
            }
        }

        names.sort();
        Ok(names)
    }

    /// Saves an upload and returns the name it was stored under. Taken names
    /// get a `-2`, `-3`, ... suffix.
    pub async fn save(&self, original_name: &str, bytes: &[u8]) -> Result<String, ReviewError> {
        let safe = sanitize_filename(original_name);
        if safe.is_empty() {
            return Err(ReviewError::Validation("Invalid filename".to_string()));
        }
        if !has_allowed_extension(&safe) {
            return Err(ReviewError::Validation(
                "Only PNG, JPG, JPEG, or WEBP files are allowed".to_string(),
            ));
        }
        if mime_guess::from_path(&safe).first_or_octet_stream().type_().as_str() != "image" {
            return Err(ReviewError::Validation("File is not an image".to_string()));
        }
        if bytes.is_empty() {
            return Err(ReviewError::Validation("No file selected".to_string()));
        }
        if bytes.len() > self.max_bytes {
            return Err(ReviewError::Validation(format!(
                "File too large. Maximum {}MB",
                self.max_bytes / (1024 * 1024)
            )));
        }

        tokio::fs::create_dir_all(&self.dir).await?;

        let (stem, ext) = split_extension(&safe);
        for attempt in 1u32.. {
            let candidate = if attempt == 1 {
                safe.clone()
            } else {
                format!("{stem}-{attempt}.{ext}")
            };

            // create_new makes the existence check and the create one step.
            let opened = tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(self.dir.join(&candidate))
                .await;

            match opened {
                Ok(mut file) => {
                    file.write_all(bytes).await?;
                    file.flush().await?;
                    tracing::info!(file = %candidate, size = bytes.len(), "Review image saved");
                    return Ok(candidate);
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
                Err(e) => return Err(e.into()),
            }
        }

        Err(ReviewError::Internal("No free file name".to_string()))
    }

    /// Deletes an image. Returns the sanitized name that was removed.
    pub async fn remove(&self, name: &str) -> Result<String, ReviewError> {
        let safe = sanitize_filename(name);
        if safe.is_empty() || !has_allowed_extension(&safe) {
            return Err(ReviewError::ImageNotFound(name.to_string()));
        }

        let target = self.dir.join(&safe);
        match tokio::fs::metadata(&target).await {
            Ok(meta) if meta.is_file() => {
                tokio::fs::remove_file(&target).await?;
                Ok(safe)
            }
            Ok(_) => Err(ReviewError::ImageNotFound(safe)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(ReviewError::ImageNotFound(safe))
            }
            Err(e) => Err(e.into()),
        }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

fn unsafe_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^A-Za-z0-9_.-]").expect("Invalid regex"))
}

/// Reduces a client supplied name to a plain file name with no path parts.
#[must_use]
pub fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let joined = base.split_whitespace().collect::<Vec<_>>().join("_");
    let cleaned = unsafe_chars().replace_all(&joined, "");
    cleaned.trim_matches(|c| c == '.' || c == '_').to_string()
}

fn has_allowed_extension(name: &str) -> bool {
    name.rsplit_once('.').is_some_and(|(_, ext)| {
        REVIEW_IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str())
    })
}

fn split_extension(name: &str) -> (&str, &str) {
    name.rsplit_once('.').unwrap_or((name, ""))
}
