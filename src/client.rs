//! Submission side of the converter: a selection of files plus the format and
//! quality to request, sent to `POST /convert` in one multipart request.

use std::{
    path::{Path, PathBuf},
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};

use bytes::Bytes;
use log::{error, info};
use reqwest::{
    multipart::{Form, Part},
    StatusCode,
};
use thiserror::Error;

pub const ARCHIVE_NAME: &str = "converted.zip";

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("a conversion is already in progress")]
    Busy,

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server responded with {0}")]
    Status(StatusCode),
}

#[derive(Clone, Debug)]
pub struct SelectedFile {
    pub name: String,
    pub data: Bytes,
}

/// Files picked for conversion plus the requested output settings.
///
/// Files accumulate across additions and are never deduplicated.
#[derive(Clone, Debug)]
pub struct Selection {
    files: Vec<SelectedFile>,
    pub format: String,
    pub quality: u8,
}

impl Default for Selection {
    fn default() -> Self {
        Self {
            files: Vec::new(),
            format: String::from("webp"),
            quality: 80,
        }
    }
}

impl Selection {
    pub fn new(format: impl Into<String>, quality: u8) -> Self {
        Self {
            files: Vec::new(),
            format: format.into(),
            quality,
        }
    }

    pub fn add_bytes(&mut self, name: impl Into<String>, data: impl Into<Bytes>) {
        self.files.push(SelectedFile {
            name: name.into(),
            data: data.into(),
        });
    }

    pub async fn add_path(&mut self, path: &Path) -> std::io::Result<()> {
        let data = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.add_bytes(name, data);
        Ok(())
    }

    pub async fn add_paths<P: AsRef<Path>>(&mut self, paths: &[P]) -> std::io::Result<()> {
        for path in paths {
            self.add_path(path.as_ref()).await?;
        }
        Ok(())
    }

    pub fn remove(&mut self, index: usize) -> Option<SelectedFile> {
        (index < self.files.len()).then(|| self.files.remove(index))
    }

    pub fn clear(&mut self) {
        self.files.clear();
    }

    pub fn files(&self) -> &[SelectedFile] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn total_size(&self) -> usize {
        self.files.iter().map(|file| file.data.len()).sum()
    }

    fn to_form(&self) -> Form {
        let form = self.files.iter().fold(Form::new(), |form, file| {
            form.part(
                "images",
                Part::bytes(file.data.to_vec()).file_name(file.name.clone()),
            )
        });
        form.text("format", self.format.clone())
            .text("quality", self.quality.to_string())
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Nothing was selected, no request was made.
    Skipped,
    Saved(PathBuf),
}

/// Releases the in-flight flag on every exit path.
struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Single-flight client for the conversion endpoint.
#[derive(Debug)]
pub struct ConversionClient {
    http: reqwest::Client,
    endpoint: String,
    busy: AtomicBool,
}

impl ConversionClient {
    pub fn new(server: &str) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            http,
            endpoint: format!("{}/convert", server.trim_end_matches('/')),
            busy: AtomicBool::new(false),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Sends the selection and writes the returned archive to
    /// `destination/converted.zip`. The selection is left as is either way.
    pub async fn convert(
        &self,
        selection: &Selection,
        destination: &Path,
    ) -> Result<Outcome, ClientError> {
        if selection.is_empty() {
            return Ok(Outcome::Skipped);
        }
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(ClientError::Busy);
        }
        let _guard = BusyGuard(&self.busy);

        match self.submit(selection, destination).await {
            Ok(path) => {
                info!("Download started: {}", path.display());
                Ok(Outcome::Saved(path))
            }
            Err(err) => {
                error!("Conversion failed. Try again. ({})", err);
                Err(err)
            }
        }
    }

    async fn submit(
        &self,
        selection: &Selection,
        destination: &Path,
    ) -> Result<PathBuf, ClientError> {
        info!(
            "Submitting {} file(s) ({} bytes) as {} at quality {}",
            selection.len(),
            selection.total_size(),
            selection.format,
            selection.quality
        );

        let response = self
            .http
            .post(&self.endpoint)
            .multipart(selection.to_form())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Status(status));
        }

        let archive = response.bytes().await?;
        let path = destination.join(ARCHIVE_NAME);
        tokio::fs::write(&path, &archive).await?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::Config,
        server::{app, AppState},
        test_support::{read_archive, solid_png},
    };

    async fn spawn_server() -> String {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = axum::Server::from_tcp(listener)
            .unwrap()
            .serve(app(AppState::new(Config::default())).into_make_service());
        tokio::spawn(server);
        format!("http://{}", addr)
    }

    #[test]
    fn selection_accumulates_without_dedup() {
        let mut selection = Selection::default();
        selection.add_bytes("a.png", vec![1, 2, 3]);
        selection.add_bytes("a.png", vec![1, 2, 3]);
        selection.add_bytes("b.png", vec![4]);

        assert_eq!(selection.len(), 3);
        assert_eq!(selection.total_size(), 7);

        let removed = selection.remove(0).unwrap();
        assert_eq!(removed.name, "a.png");
        assert!(selection.remove(5).is_none());
        assert_eq!(selection.len(), 2);

        selection.clear();
        assert!(selection.is_empty());
    }

    #[tokio::test]
    async fn add_path_uses_file_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cat.png");
        std::fs::write(&path, solid_png(3, 3)).unwrap();

        let mut selection = Selection::default();
        selection.add_paths(&[&path, &path]).await.unwrap();
        assert_eq!(selection.len(), 2);
        assert_eq!(selection.files()[1].name, "cat.png");
    }

    #[tokio::test]
    async fn empty_selection_is_a_no_op() {
        let client = ConversionClient::new("http://127.0.0.1:9").unwrap();
        let dir = tempfile::tempdir().unwrap();

        let outcome = client.convert(&Selection::default(), dir.path()).await.unwrap();
        assert_eq!(outcome, Outcome::Skipped);
        assert!(!dir.path().join(ARCHIVE_NAME).exists());
    }

    #[tokio::test]
    async fn saves_archive_on_success() {
        let server = spawn_server().await;
        let client = ConversionClient::new(&format!("{}/", server)).unwrap();
        assert_eq!(client.endpoint(), format!("{}/convert", server));

        let mut selection = Selection::new("webp", 80);
        selection.add_bytes("photo.png", solid_png(10, 10));
        selection.add_bytes("photo.png", solid_png(10, 10));
        let dir = tempfile::tempdir().unwrap();

        let outcome = client.convert(&selection, dir.path()).await.unwrap();
        let path = dir.path().join(ARCHIVE_NAME);
        assert_eq!(outcome, Outcome::Saved(path.clone()));
        assert!(!client.is_busy());

        let entries = read_archive(&std::fs::read(path).unwrap());
        let names: Vec<&str> = entries.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, ["photo.webp", "photo.webp"]);
    }

    #[tokio::test]
    async fn failure_keeps_selection_for_retry() {
        let server = spawn_server().await;
        let client = ConversionClient::new(&server).unwrap();

        let mut selection = Selection::new("webp", 80);
        selection.add_bytes("notes.txt", b"not an image".to_vec());
        let dir = tempfile::tempdir().unwrap();

        let err = client.convert(&selection, dir.path()).await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::Status(status) if status == StatusCode::INTERNAL_SERVER_ERROR
        ));
        assert_eq!(selection.len(), 1);
        assert!(!client.is_busy());
        assert!(!dir.path().join(ARCHIVE_NAME).exists());
    }

    #[tokio::test]
    async fn network_error_is_reported() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = ConversionClient::new(&format!("http://{}", addr)).unwrap();
        let mut selection = Selection::default();
        selection.add_bytes("a.png", solid_png(2, 2));
        let dir = tempfile::tempdir().unwrap();

        let err = client.convert(&selection, dir.path()).await.unwrap_err();
        assert!(matches!(err, ClientError::Http(_)));
        assert!(!client.is_busy());
    }

    #[tokio::test]
    async fn second_convert_while_in_flight_is_rejected() {
        let server = spawn_server().await;
        let client = ConversionClient::new(&server).unwrap();

        let mut selection = Selection::default();
        selection.add_bytes("a.png", solid_png(6, 6));
        let first_dir = tempfile::tempdir().unwrap();
        let second_dir = tempfile::tempdir().unwrap();

        let (first, second) = tokio::join!(
            client.convert(&selection, first_dir.path()),
            client.convert(&selection, second_dir.path()),
        );

        let saved = [&first, &second]
            .iter()
            .filter(|result| matches!(result, Ok(Outcome::Saved(_))))
            .count();
        let rejected = [&first, &second]
            .iter()
            .filter(|result| matches!(result, Err(ClientError::Busy)))
            .count();
        assert_eq!((saved, rejected), (1, 1));
        assert!(!client.is_busy());
    }
}
