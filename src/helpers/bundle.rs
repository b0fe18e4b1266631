use flate2::read::GzDecoder;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{ErrorKind, Read, Write};
use std::path::{Component, Path, PathBuf};
use tempfile::TempDir;

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Debug, thiserror::Error)]
pub enum BundleError {
    #[error("invalid bundle: {0}")]
    Invalid(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq)]
pub struct BundleFile {
    /// `/`-separated path inside the webroot
    pub relative_path: String,
    pub path: PathBuf,
    pub content_type: String,
}

/// Unpacked webroot. Removed from disk when dropped.
#[derive(Debug)]
pub struct ExtractedBundle {
    pub dir: TempDir,
    /// Regular files in path order.
    pub files: Vec<BundleFile>,
}

/// `text/html; charset=utf-8` style parameters are dropped.
pub fn content_type_for(path: &str) -> String {
    mime_guess::from_path(path)
        .first()
        .map(|mime| mime.essence_str().to_string())
        .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string())
}

fn invalid<E: std::fmt::Display>(err: E) -> BundleError {
    BundleError::Invalid(err.to_string())
}

fn sanitize(path: &Path) -> Result<String, BundleError> {
    let mut parts = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => parts.push(
                part.to_str()
                    .ok_or_else(|| invalid(format!("non UTF-8 path {:?}", path)))?,
            ),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(invalid(format!("unsafe path {:?}", path)));
            }
        }
    }
    if parts.is_empty() {
        return Err(invalid(format!("empty path {:?}", path)));
    }
    Ok(parts.join("/"))
}

/// Copies one archive entry out. Read failures mean a corrupt archive, write
/// failures are the local disk and stay retryable.
fn copy_entry<R: Read, W: Write>(entry: &mut R, out: &mut W) -> Result<u64, BundleError> {
    let mut buf = [0u8; 64 * 1024];
    let mut written = 0u64;
    loop {
        let n = match entry.read(&mut buf) {
            Ok(0) => return Ok(written),
            Ok(n) => n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(invalid(err)),
        };
        out.write_all(&buf[..n])?;
        written += n as u64;
    }
}

/// Unpacks a `.tar.gz` bundle. Blocking; see [`extract_async`].
pub fn extract(archive_path: &Path) -> Result<ExtractedBundle, BundleError> {
    let archive_file = File::open(archive_path)?;
    let mut archive = tar::Archive::new(GzDecoder::new(archive_file));
    let dir = tempfile::Builder::new().prefix("webroot-").tempdir()?;

    let mut unpacked: BTreeMap<String, PathBuf> = BTreeMap::new();
    for entry in archive.entries().map_err(invalid)? {
        let mut entry = entry.map_err(invalid)?;
        // directories, symlinks and hard links never reach the webroot
        if !entry.header().entry_type().is_file() {
            continue;
        }

        let raw_path = entry.path().map_err(invalid)?.into_owned();
        let relative_path = sanitize(&raw_path)?;
        let destination = dir.path().join(&relative_path);
        if let Some(parent) = destination.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut out = File::create(&destination)?;
        copy_entry(&mut entry, &mut out)?;
        unpacked.insert(relative_path, destination);
    }

    let files = unpacked
        .into_iter()
        .map(|(relative_path, path)| BundleFile {
            content_type: content_type_for(&relative_path),
            relative_path,
            path,
        })
        .collect();

    Ok(ExtractedBundle { dir, files })
}

pub async fn extract_async(archive_path: PathBuf) -> Result<ExtractedBundle, BundleError> {
    tokio::task::spawn_blocking(move || extract(&archive_path))
        .await
        .map_err(|err| BundleError::Io(std::io::Error::new(std::io::ErrorKind::Other, err)))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;

    fn write_bundle(entries: &[(&str, &[u8])]) -> tempfile::NamedTempFile {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let encoder = GzEncoder::new(tmp.reopen().unwrap(), Compression::default());
        let mut builder = tar::Builder::new(encoder);
        for (name, data) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, *data).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap();
        tmp
    }

    #[test]
    fn content_type_strips_parameters() {
        assert_eq!(content_type_for("index.html"), "text/html");
        assert_eq!(content_type_for("css/app.css"), "text/css");
        assert_eq!(content_type_for("logo.png"), "image/png");
        assert_eq!(content_type_for("README"), "application/octet-stream");
        assert_eq!(content_type_for("data.unknownext"), "application/octet-stream");
    }

    #[test]
    fn extract_sorts_and_normalizes_paths() {
        let bundle = write_bundle(&[
            ("./js/app.js", b"console.log(1)"),
            ("index.html", b"<h1>hi</h1>"),
            ("css/app.css", b"body{}"),
        ]);

        let extracted = extract(bundle.path()).unwrap();
        let names: Vec<&str> = extracted
            .files
            .iter()
            .map(|file| file.relative_path.as_str())
            .collect();
        assert_eq!(names, vec!["css/app.css", "index.html", "js/app.js"]);

        let index = &extracted.files[1];
        assert_eq!(index.content_type, "text/html");
        assert_eq!(std::fs::read(&index.path).unwrap(), b"<h1>hi</h1>");
        assert!(index.path.starts_with(extracted.dir.path()));
    }

    #[test]
    fn extract_skips_directories_and_symlinks() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let encoder = GzEncoder::new(tmp.reopen().unwrap(), Compression::default());
        let mut builder = tar::Builder::new(encoder);

        let mut dir = tar::Header::new_gnu();
        dir.set_entry_type(tar::EntryType::Directory);
        dir.set_size(0);
        dir.set_mode(0o755);
        dir.set_cksum();
        builder.append_data(&mut dir, "assets/", std::io::empty()).unwrap();

        let mut link = tar::Header::new_gnu();
        link.set_entry_type(tar::EntryType::Symlink);
        link.set_size(0);
        link.set_mode(0o777);
        link.set_link_name("/etc/passwd").unwrap();
        builder
            .append_data(&mut link, "assets/passwd", std::io::empty())
            .unwrap();

        let mut file = tar::Header::new_gnu();
        file.set_size(2);
        file.set_mode(0o644);
        file.set_cksum();
        builder.append_data(&mut file, "assets/a.txt", &b"ok"[..]).unwrap();
        builder.into_inner().unwrap().finish().unwrap();

        let extracted = extract(tmp.path()).unwrap();
        assert_eq!(extracted.files.len(), 1);
        assert_eq!(extracted.files[0].relative_path, "assets/a.txt");
    }

    #[test]
    fn extract_rejects_path_traversal() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let encoder = GzEncoder::new(tmp.reopen().unwrap(), Compression::default());
        let mut builder = tar::Builder::new(encoder);

        // append_data refuses `..`, so write the name into the header directly
        let mut header = tar::Header::new_old();
        let name = b"../evil.html";
        header.as_old_mut().name[..name.len()].copy_from_slice(name);
        header.set_size(4);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append(&header, &b"evil"[..]).unwrap();
        builder.into_inner().unwrap().finish().unwrap();

        assert!(matches!(extract(tmp.path()), Err(BundleError::Invalid(_))));
    }

    #[test]
    fn extract_rejects_non_gzip_input() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), b"definitely not gzip").unwrap();
        assert!(matches!(extract(tmp.path()), Err(BundleError::Invalid(_))));
    }

    struct FullDisk;

    impl Write for FullDisk {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(ErrorKind::Other, "No space left on device"))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    struct Truncated;

    impl Read for Truncated {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(ErrorKind::UnexpectedEof, "unexpected end of file"))
        }
    }

    #[test]
    fn copy_entry_blames_the_disk_for_write_failures() {
        let result = copy_entry(&mut &b"payload"[..], &mut FullDisk);
        assert!(matches!(result, Err(BundleError::Io(_))));
    }

    #[test]
    fn copy_entry_blames_the_archive_for_read_failures() {
        let mut out = Vec::new();
        assert!(matches!(
            copy_entry(&mut Truncated, &mut out),
            Err(BundleError::Invalid(_))
        ));

        assert_eq!(copy_entry(&mut &b"payload"[..], &mut out).unwrap(), 7);
        assert_eq!(out, b"payload");
    }

    #[tokio::test]
    async fn extract_async_runs_off_the_runtime() {
        let bundle = write_bundle(&[("index.html", b"hi")]);
        let extracted = extract_async(bundle.path().to_path_buf()).await.unwrap();
        assert_eq!(extracted.files.len(), 1);
    }
}
