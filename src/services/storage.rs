use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use actix_web::web::Bytes;
use futures::{Stream, StreamExt};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::config::StorageConfig;
use crate::error::{AppError, Result};

/// Local video store laid out as `<root>/<username>/<filename>`.
#[derive(Debug, Clone)]
pub struct Storage {
    root: PathBuf,
    max_file_size: usize,
    allowed_extensions: Vec<String>,
}

/// An upload written to a temporary file, not yet given its final name.
#[derive(Debug)]
pub struct StagedUpload {
    dir: PathBuf,
    part_path: PathBuf,
    filename: String,
    pub size: usize,
}

impl Storage {
    pub fn new(config: &StorageConfig) -> Self {
        Self {
            root: PathBuf::from(&config.upload_path),
            max_file_size: config.max_file_size,
            allowed_extensions: config
                .allowed_extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_lowercase())
                .collect(),
        }
    }

    pub fn user_dir(&self, username: &str) -> PathBuf {
        self.root.join(username)
    }

    pub fn video_path(&self, username: &str, filename: &str) -> PathBuf {
        self.user_dir(username).join(filename)
    }

    pub fn is_allowed(&self, filename: &str) -> bool {
        allowed_file(filename, &self.allowed_extensions)
    }

    /// Stream an uploaded file into the owner's directory under a
    /// temporary name. Rejects disallowed extensions before touching the
    /// disk and aborts once `max_file_size` is exceeded.
    pub async fn stage<S, E>(
        &self,
        username: &str,
        original_name: &str,
        mut stream: S,
    ) -> Result<StagedUpload>
    where
        S: Stream<Item = std::result::Result<Bytes, E>> + Unpin,
        AppError: From<E>,
    {
        let filename = sanitize_filename(original_name);
        if !self.is_allowed(&filename) {
            return Err(AppError::Validation(format!(
                "Only {} files can be uploaded",
                self.allowed_extensions.join(", ")
            )));
        }

        let dir = self.user_dir(username);
        fs::create_dir_all(&dir).await.map_err(|e| {
            log::error!("Failed to create upload directory {}: {}", dir.display(), e);
            AppError::Io(e)
        })?;

        let part_path = dir.join(format!(".{}.part", Uuid::new_v4()));
        let mut staged = StagedUpload {
            dir,
            part_path,
            filename,
            size: 0,
        };

        match self.write_part(&staged.part_path, &mut stream).await {
            Ok(size) => {
                staged.size = size;
                Ok(staged)
            }
            Err(e) => {
                self.discard(staged).await;
                Err(e)
            }
        }
    }

    async fn write_part<S, E>(&self, path: &Path, stream: &mut S) -> Result<usize>
    where
        S: Stream<Item = std::result::Result<Bytes, E>> + Unpin,
        AppError: From<E>,
    {
        let mut f = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .await?;

        let mut written = 0usize;
        while let Some(chunk) = stream.next().await {
            let data = chunk?;
            written += data.len();
            if written > self.max_file_size {
                return Err(AppError::PayloadTooLarge(self.max_file_size));
            }
            f.write_all(&data).await?;
        }

        f.sync_all().await?;
        Ok(written)
    }

    /// Move a staged upload to a free name (`stem.ext`, `stem_1.ext`, ...)
    /// and return that name.
    pub async fn commit(&self, staged: StagedUpload) -> Result<String> {
        let (path, name) = match reserve_unique(&staged.dir, &staged.filename).await {
            Ok(reserved) => reserved,
            Err(e) => {
                self.discard(staged).await;
                return Err(e);
            }
        };
        if let Err(e) = fs::rename(&staged.part_path, &path).await {
            log::error!("Failed to move upload into {}: {}", path.display(), e);
            let _ = fs::remove_file(&path).await;
            self.discard(staged).await;
            return Err(AppError::Io(e));
        }
        Ok(name)
    }

    pub async fn discard(&self, staged: StagedUpload) {
        if let Err(e) = fs::remove_file(&staged.part_path).await {
            if e.kind() != ErrorKind::NotFound {
                log::warn!("Failed to remove {}: {}", staged.part_path.display(), e);
            }
        }
    }

    /// Missing files are not an error; the row is the source of truth.
    pub async fn remove(&self, username: &str, filename: &str) {
        let path = self.video_path(username, filename);
        match fs::remove_file(&path).await {
            Ok(()) => log::debug!("Removed {}", path.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                log::warn!("Video file {} was already gone", path.display())
            }
            Err(e) => log::warn!("Failed to remove {}: {}", path.display(), e),
        }
    }
}

/// Whether `filename` has an extension from `allowed` (compared lower-cased).
pub fn allowed_file(filename: &str, allowed: &[String]) -> bool {
    match filename.rsplit_once('.') {
        Some((_, ext)) if !ext.is_empty() => {
            let ext = ext.to_lowercase();
            allowed.iter().any(|a| *a == ext)
        }
        _ => false,
    }
}

fn is_stem_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-' || ('\u{4e00}'..='\u{9fa5}').contains(&c)
}

/// Reduce a client-supplied name to something safe to join onto a
/// directory: no separators, no dots in the stem, CJK kept.
pub fn sanitize_filename(name: &str) -> String {
    let name = name.trim();
    let name = name.rsplit(['/', '\\']).next().unwrap_or(name);

    let (stem, ext) = match name.rsplit_once('.') {
        Some((stem, ext)) => (stem, ext),
        None => (name, ""),
    };

    let mut stem: String = stem
        .chars()
        .map(|c| if is_stem_char(c) { c } else { '_' })
        .collect();
    if stem.trim_matches('_').is_empty() {
        stem = "video".to_string();
    }

    let ext: String = ext
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect::<String>()
        .to_lowercase();

    if ext.is_empty() {
        stem
    } else {
        format!("{}.{}", stem, ext)
    }
}

fn candidate_name(filename: &str, n: usize) -> String {
    if n == 0 {
        return filename.to_string();
    }
    match filename.rsplit_once('.') {
        Some((stem, ext)) => format!("{}_{}.{}", stem, n, ext),
        None => format!("{}_{}", filename, n),
    }
}

// First free name among `name`, `stem_1.ext`, `stem_2.ext`, ... claimed
// with create_new so concurrent uploads never land on one file.
async fn reserve_unique(dir: &Path, filename: &str) -> Result<(PathBuf, String)> {
    let mut n = 0;
    loop {
        let name = candidate_name(filename, n);
        let path = dir.join(&name);
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(_) => return Ok((path, name)),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => n += 1,
            Err(e) => return Err(AppError::Io(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn storage(root: &Path, max: usize) -> Storage {
        Storage::new(&StorageConfig {
            upload_path: root.to_string_lossy().into_owned(),
            max_file_size: max,
            allowed_extensions: vec!["mp4".into(), ".MKV".into()],
        })
    }

    fn chunks(parts: &[&'static [u8]]) -> impl Stream<Item = std::result::Result<Bytes, AppError>> + Unpin {
        stream::iter(parts.iter().map(|p| Ok(Bytes::from_static(p))).collect::<Vec<_>>())
    }

    #[test]
    fn extension_whitelist() {
        let allowed = vec!["mp4".to_string(), "mkv".to_string()];
        assert!(allowed_file("a.mp4", &allowed));
        assert!(allowed_file("a.b.MKV", &allowed));
        assert!(!allowed_file("a.exe", &allowed));
        assert!(!allowed_file("mp4", &allowed));
        assert!(!allowed_file("a.", &allowed));
    }

    #[test]
    fn sanitize_strips_paths_and_odd_characters() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("C:\\videos\\clip.MP4"), "clip.mp4");
        assert_eq!(sanitize_filename("  my clip<1>.mp4 "), "my_clip_1_.mp4");
        assert_eq!(sanitize_filename("旅行 视频.mkv"), "旅行_视频.mkv");
        assert_eq!(sanitize_filename("a.b.mp4"), "a_b.mp4");
        assert_eq!(sanitize_filename(".mp4"), "video.mp4");
        assert_eq!(sanitize_filename("noext"), "noext");
        assert_eq!(sanitize_filename("x.m p$4"), "x.mp4");
    }

    #[actix_web::test]
    async fn reserve_unique_skips_taken_names() {
        let dir = tempfile::tempdir().unwrap();
        let (_, name) = reserve_unique(dir.path(), "clip.mp4").await.unwrap();
        assert_eq!(name, "clip.mp4");

        std::fs::write(dir.path().join("clip_1.mp4"), b"x").unwrap();
        let (path, name) = reserve_unique(dir.path(), "clip.mp4").await.unwrap();
        assert_eq!(name, "clip_2.mp4");
        assert_eq!(path, dir.path().join("clip_2.mp4"));
        assert!(path.exists());

        let (_, name) = reserve_unique(dir.path(), "noext").await.unwrap();
        assert_eq!(name, "noext");
        let (_, name) = reserve_unique(dir.path(), "noext").await.unwrap();
        assert_eq!(name, "noext_1");
    }

    #[actix_web::test]
    async fn stage_and_commit_twice_gives_distinct_names() {
        let dir = tempfile::tempdir().unwrap();
        let store = storage(dir.path(), 1024);

        let staged = store
            .stage("alice", "clip.mp4", chunks(&[b"hello ", b"world"]))
            .await
            .unwrap();
        assert_eq!(staged.size, 11);
        let first = store.commit(staged).await.unwrap();

        let staged = store.stage("alice", "clip.mp4", chunks(&[b"again"])).await.unwrap();
        let second = store.commit(staged).await.unwrap();

        assert_eq!(first, "clip.mp4");
        assert_eq!(second, "clip_1.mp4");
        let body = std::fs::read(store.video_path("alice", &first)).unwrap();
        assert_eq!(body, b"hello world");

        // no temporary files left behind
        let leftovers = std::fs::read_dir(store.user_dir("alice"))
            .unwrap()
            .filter(|e| e.as_ref().unwrap().file_name().to_string_lossy().ends_with(".part"))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[actix_web::test]
    async fn oversize_upload_is_rejected_and_cleaned_up() {
        let dir = tempfile::tempdir().unwrap();
        let store = storage(dir.path(), 8);

        let err = store
            .stage("bob", "big.mp4", chunks(&[b"12345", b"67890"]))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::PayloadTooLarge(8)));
        assert_eq!(std::fs::read_dir(store.user_dir("bob")).unwrap().count(), 0);
    }

    #[actix_web::test]
    async fn disallowed_extension_never_touches_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = storage(dir.path(), 1024);

        let err = store
            .stage("carol", "evil.sh", chunks(&[b"#!/bin/sh"]))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(!store.user_dir("carol").exists());
    }

    #[actix_web::test]
    async fn removing_a_missing_file_is_quiet() {
        let dir = tempfile::tempdir().unwrap();
        let store = storage(dir.path(), 1024);
        store.remove("nobody", "ghost.mp4").await;
    }
}
