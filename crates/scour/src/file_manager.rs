use anyhow::Result;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};

/// Where input comes from: a file, or standard input for `-` and no argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    Stdin,
    Path(PathBuf),
}

impl Source {
    pub fn from_arg(arg: Option<&str>) -> Self {
        match arg {
            None | Some("-") => Source::Stdin,
            Some(path) => Source::Path(PathBuf::from(path)),
        }
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Source::Stdin => write!(f, "<stdin>"),
            Source::Path(path) => write!(f, "{}", path.display()),
        }
    }
}

pub struct FileManager {
    max_input_bytes: u64,
}

impl FileManager {
    pub fn new(max_input_bytes: u64) -> Self {
        Self { max_input_bytes }
    }

    pub fn max_input_bytes(&self) -> u64 {
        self.max_input_bytes
    }

    pub async fn read(&self, source: &Source) -> Result<String> {
        match source {
            Source::Stdin => self.read_stdin().await,
            Source::Path(path) => self.read_file(path).await,
        }
    }

    pub async fn read_file(&self, path: &Path) -> Result<String> {
        if !path.exists() {
            return Err(anyhow::anyhow!("File not found: {}", path.display()));
        }

        if !path.is_file() {
            return Err(anyhow::anyhow!("Not a regular file: {}", path.display()));
        }

        match fs::metadata(path).await {
            Ok(metadata) => {
                if metadata.len() > self.max_input_bytes {
                    return Err(anyhow::anyhow!(
                        "Input too large ({} bytes, limit {}): {}",
                        metadata.len(),
                        self.max_input_bytes,
                        path.display()
                    ));
                }
            }
            Err(e) => {
                log::warn!("Failed to get file metadata: {}", e);
            }
        }

        let file = fs::File::open(path).await.map_err(|e| {
            let error_msg = match e.kind() {
                std::io::ErrorKind::PermissionDenied => {
                    format!("Permission denied: {}", path.display())
                }
                std::io::ErrorKind::NotFound => {
                    format!("File not found: {}", path.display())
                }
                _ => {
                    format!("Failed to read {}: {}", path.display(), e)
                }
            };
            anyhow::anyhow!(error_msg)
        })?;
        // Metadata may be missing or stale; the read is bounded on its own.
        self.read_bounded(file, &path.display().to_string()).await
    }

    pub async fn read_stdin(&self) -> Result<String> {
        self.read_bounded(tokio::io::stdin(), "<stdin>").await
    }

    async fn read_bounded<R>(&self, reader: R, origin: &str) -> Result<String>
    where
        R: AsyncRead + Unpin,
    {
        let mut buf = Vec::new();
        // One byte past the limit is enough to tell the input is too large.
        let mut limited = reader.take(self.max_input_bytes + 1);
        limited
            .read_to_end(&mut buf)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", origin, e))?;
        self.decode(buf, origin)
    }

    fn decode(&self, buf: Vec<u8>, origin: &str) -> Result<String> {
        if buf.len() as u64 > self.max_input_bytes {
            return Err(anyhow::anyhow!(
                "Input too large (over {} bytes): {}",
                self.max_input_bytes,
                origin
            ));
        }
        let content = String::from_utf8(buf)
            .map_err(|_| anyhow::anyhow!("Input is not valid UTF-8: {}", origin))?;
        self.check_content(&content, origin)?;
        log::info!("Read {} bytes from {}", content.len(), origin);
        Ok(content)
    }

    fn check_content(&self, content: &str, origin: &str) -> Result<()> {
        if content.contains('\0') {
            return Err(anyhow::anyhow!("Input looks like binary data: {}", origin));
        }
        Ok(())
    }

    /// Writes `content` to `path`, keeping a `.bak` copy of a non-empty existing file and
    /// creating missing parent directories.
    pub async fn write_file(&self, path: &Path, content: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                match fs::create_dir_all(parent).await {
                    Ok(_) => {
                        log::info!("Created directory: {}", parent.display());
                    }
                    Err(e) => {
                        return Err(anyhow::anyhow!(
                            "Failed to create directory {}: {}",
                            parent.display(),
                            e
                        ));
                    }
                }
            }
        }

        if path.exists() {
            match fs::metadata(path).await {
                Ok(metadata) => {
                    if metadata.permissions().readonly() {
                        return Err(anyhow::anyhow!(
                            "Target file is read-only: {}",
                            path.display()
                        ));
                    }
                    if metadata.len() > 0 {
                        let backup_path = path.with_extension("bak");
                        if let Err(e) = fs::copy(path, &backup_path).await {
                            log::warn!("Failed to create backup: {}", e);
                        } else {
                            log::info!("Created backup: {}", backup_path.display());
                        }
                    }
                }
                Err(e) => {
                    log::warn!("Failed to check target file metadata: {}", e);
                }
            }
        }

        match fs::write(path, content.as_bytes()).await {
            Ok(_) => {
                log::info!("Wrote {} bytes to {}", content.len(), path.display());
                Ok(())
            }
            Err(e) => {
                let error_msg = match e.kind() {
                    std::io::ErrorKind::PermissionDenied => {
                        format!("Permission denied: {}", path.display())
                    }
                    std::io::ErrorKind::WriteZero => {
                        format!("Disk may be full: {}", path.display())
                    }
                    _ => {
                        format!("Failed to write {}: {}", path.display(), e)
                    }
                };
                Err(anyhow::anyhow!(error_msg))
            }
        }
    }

    pub async fn write_stdout(&self, content: &str) -> Result<()> {
        let mut stdout = tokio::io::stdout();
        stdout.write_all(content.as_bytes()).await?;
        stdout.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    #[test]
    fn test_source_from_arg() {
        assert_eq!(Source::from_arg(None), Source::Stdin);
        assert_eq!(Source::from_arg(Some("-")), Source::Stdin);
        assert_eq!(
            Source::from_arg(Some("in.html")),
            Source::Path(PathBuf::from("in.html"))
        );
        assert_eq!(Source::Stdin.to_string(), "<stdin>");
    }

    #[tokio::test]
    async fn test_read_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        write!(temp_file, "<p>Hello</p>").unwrap();

        let fm = FileManager::new(1024);
        let content = fm
            .read(&Source::Path(temp_file.path().to_path_buf()))
            .await
            .unwrap();
        assert_eq!(content, "<p>Hello</p>");
    }

    #[tokio::test]
    async fn test_read_rejects_missing_and_directories() {
        let temp_dir = TempDir::new().unwrap();
        let fm = FileManager::new(1024);

        let err = fm.read_file(&temp_dir.path().join("nope.html")).await.unwrap_err();
        assert!(err.to_string().contains("File not found"));

        let err = fm.read_file(temp_dir.path()).await.unwrap_err();
        assert!(err.to_string().contains("Not a regular file"));
    }

    #[tokio::test]
    async fn test_read_rejects_large_and_binary_input() {
        let mut large = NamedTempFile::new().unwrap();
        large.write_all(&[b'a'; 2048]).unwrap();
        let fm = FileManager::new(1024);
        let err = fm.read_file(large.path()).await.unwrap_err();
        assert!(err.to_string().contains("Input too large"));

        let mut binary = NamedTempFile::new().unwrap();
        binary.write_all(b"abc\0def").unwrap();
        let err = fm.read_file(binary.path()).await.unwrap_err();
        assert!(err.to_string().contains("binary"));
    }

    #[tokio::test]
    async fn test_bounded_read_stops_past_limit() {
        let fm = FileManager::new(4);
        assert_eq!(fm.read_bounded(&b"abcd"[..], "t").await.unwrap(), "abcd");
        let err = fm.read_bounded(&b"abcdefgh"[..], "t").await.unwrap_err();
        assert!(err.to_string().contains("Input too large"));
    }

    #[test]
    fn test_decode_limits() {
        let fm = FileManager::new(4);
        assert_eq!(fm.decode(b"abcd".to_vec(), "t").unwrap(), "abcd");
        assert!(fm.decode(b"abcde".to_vec(), "t").is_err());
        assert!(fm.decode(vec![0xff, 0xfe], "t").is_err());
    }

    #[tokio::test]
    async fn test_write_creates_dirs_and_backup() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("out").join("clean.html");
        let fm = FileManager::new(1024);

        fm.write_file(&path, "<p>one</p>").await.unwrap();
        assert_eq!(fs::read_to_string(&path).await.unwrap(), "<p>one</p>");
        assert!(!path.with_extension("bak").exists());

        fm.write_file(&path, "<p>two</p>").await.unwrap();
        assert_eq!(fs::read_to_string(&path).await.unwrap(), "<p>two</p>");
        assert_eq!(
            fs::read_to_string(path.with_extension("bak")).await.unwrap(),
            "<p>one</p>"
        );
    }
}
