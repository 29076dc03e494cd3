//! Local files waiting to be uploaded on the next insert.

use crate::{
    errors::{SaveableError, SaveableResult},
    models::policy::PolicyOverrides,
};
use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tokio::{fs, io::AsyncReadExt};

/// Bytes read from the head of a file to detect its type.
const SNIFF_LEN: u64 = 8192;

/// Extensions preferred over `mime_guess`'s alphabetical first pick.
const PREFERRED_EXTENSIONS: &[(&str, &str)] = &[
    ("image/jpeg", "jpg"),
    ("image/png", "png"),
    ("image/gif", "gif"),
    ("image/svg+xml", "svg"),
    ("text/plain", "txt"),
    ("text/html", "html"),
    ("application/pdf", "pdf"),
    ("application/json", "json"),
    ("audio/mpeg", "mp3"),
    ("video/mp4", "mp4"),
];

/// A local file that passed validation: it exists, is a regular file and
/// could be opened for reading.
///
/// `content_type` is the declared type (or the one implied by the original
/// name) and is sent with the upload. `sniffed_type` comes from the file's
/// leading bytes and drives the extension guess.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedFile {
    temp_path: PathBuf,
    original_name: Option<String>,
    content_type: Option<String>,
    sniffed_type: Option<String>,
}

impl ValidatedFile {
    /// Wrap a file that an upstream validator already accepted, e.g. an
    /// HTTP upload spooled to a temp path under a different name.
    pub fn new(
        temp_path: impl Into<PathBuf>,
        original_name: Option<String>,
        content_type: Option<String>,
    ) -> Self {
        let temp_path = temp_path.into();
        let content_type = content_type.or_else(|| {
            original_name
                .as_deref()
                .and_then(|name| mime_guess::from_path(name).first_raw())
                .map(str::to_string)
        });
        Self {
            temp_path,
            original_name,
            content_type,
            sniffed_type: None,
        }
    }

    /// Validate `path` and use its own file name as the original name.
    pub async fn from_path(path: impl AsRef<Path>) -> SaveableResult<Self> {
        let path = path.as_ref();
        ensure_readable(path).await?;
        let original_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned());
        Self::new(path, original_name, None).sniff_content().await
    }

    /// Detect the content type from the file's leading bytes.
    pub async fn sniff_content(mut self) -> SaveableResult<Self> {
        self.sniffed_type = sniff_content_type(&self.temp_path).await?;
        Ok(self)
    }

    pub fn temp_path(&self) -> &Path {
        &self.temp_path
    }

    pub fn original_name(&self) -> Option<&str> {
        self.original_name.as_deref()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn sniffed_type(&self) -> Option<&str> {
        self.sniffed_type.as_deref()
    }

    /// Extension of the original file name, dot included.
    pub fn original_extension(&self) -> Option<String> {
        let name = self.original_name.as_deref()?;
        let ext = Path::new(name).extension()?.to_str()?;
        (!ext.is_empty()).then(|| format!(".{}", ext))
    }

    /// Best guess from the file contents, falling back to the declared
    /// content type. Dot included.
    pub fn guessed_extension(&self) -> Option<String> {
        self.sniffed_type
            .as_deref()
            .and_then(extension_for_mime)
            .or_else(|| self.content_type.as_deref().and_then(extension_for_mime))
    }

    pub async fn ensure_readable(&self) -> SaveableResult<()> {
        ensure_readable(&self.temp_path).await
    }
}

fn extension_for_mime(content_type: &str) -> Option<String> {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or(content_type)
        .trim()
        .to_ascii_lowercase();

    PREFERRED_EXTENSIONS
        .iter()
        .find(|(mime, _)| *mime == essence)
        .map(|(_, ext)| *ext)
        .or_else(|| mime_guess::get_mime_extensions_str(&essence).and_then(|exts| exts.first().copied()))
        .map(|ext| format!(".{}", ext))
}

/// Magic-number detection first; otherwise UTF-8 without NUL bytes counts as
/// plain text. Empty and unrecognized binary files yield `None`.
async fn sniff_content_type(path: &Path) -> SaveableResult<Option<String>> {
    let unreadable = |err: std::io::Error| {
        SaveableError::validation(format!("file is not readable: {} ({})", path.display(), err))
    };
    let file = fs::File::open(path).await.map_err(unreadable)?;
    let mut head = Vec::with_capacity(SNIFF_LEN as usize);
    file.take(SNIFF_LEN)
        .read_to_end(&mut head)
        .await
        .map_err(unreadable)?;

    if let Some(kind) = infer::get(&head) {
        return Ok(Some(kind.mime_type().to_string()));
    }
    Ok(looks_like_text(&head).then(|| "text/plain".to_string()))
}

fn looks_like_text(head: &[u8]) -> bool {
    if head.is_empty() || head.contains(&0) {
        return false;
    }
    match std::str::from_utf8(head) {
        Ok(_) => true,
        // A multi-byte character cut off at the end of the sniffed window.
        Err(err) => err.error_len().is_none(),
    }
}

async fn ensure_readable(path: &Path) -> SaveableResult<()> {
    let meta = match fs::metadata(path).await {
        Ok(meta) => meta,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            return Err(SaveableError::validation(format!(
                "file does not exist: {}",
                path.display()
            )));
        }
        Err(err) => {
            return Err(SaveableError::validation(format!(
                "cannot stat {}: {}",
                path.display(),
                err
            )));
        }
    };
    if !meta.is_file() {
        return Err(SaveableError::validation(format!(
            "not a regular file: {}",
            path.display()
        )));
    }
    fs::File::open(path).await.map_err(|err| {
        SaveableError::validation(format!("file is not readable: {} ({})", path.display(), err))
    })?;
    Ok(())
}

/// A validated file plus the option overrides given when it was attached.
/// Consumed by the next insert, whether the upload succeeds or not.
#[derive(Debug, Clone)]
pub struct PendingUpload {
    pub file: ValidatedFile,
    pub overrides: PolicyOverrides,
}
