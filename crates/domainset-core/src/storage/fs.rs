// # Filesystem Storage Driver
//
// Filesystem implementation of StorageDriver.
//
// ## Purpose
//
// Persists each database as raw fetched text inside a data directory, plus
// a single `checkpoints.json`, so the engine can start offline.
//
// ## Crash Safety
//
// - Database writes stream into `<file>.txt.tmp`, then the previous copy is
//   renamed to `<file>.txt.bak`, then the temp file is renamed over the
//   primary. A crash mid-write leaves the previous primary intact.
// - Checkpoints use the same temp-then-rename discipline, so the document on
//   disk is always parseable.
// - A source stream that ends in an error aborts the write: the temp file is
//   removed and neither the primary nor the backup is touched.
//
// ## Layout
//
// ```text
// <data_dir>/checkpoints.json
// <data_dir>/<percent-escaped-name>.txt
// <data_dir>/<percent-escaped-name>.txt.bak
// ```

use async_trait::async_trait;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::error::{Error, DB_NAME_MAX_LEN};
use crate::traits::storage::{AllCheckpoints, ByteStream, StorageDriver};

const FS_PERM_BITS: u32 = 0o644;
const CHECKPOINTS_FILENAME: &str = "checkpoints.json";

/// RFC 3986 unreserved characters stay literal; everything else is escaped.
const FILENAME_ESCAPE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Filesystem-backed [`StorageDriver`] rooted at a data directory.
///
/// The directory is assumed to be owned by a single engine instance;
/// concurrent engines over the same directory are unsupported.
///
/// # Example
///
/// ```rust,no_run
/// use domainset_core::storage::FsStorageDriver;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let driver = FsStorageDriver::new("/var/lib/domainset").await?;
///     # let _ = driver;
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct FsStorageDriver {
    data_dir: PathBuf,
}

impl FsStorageDriver {
    /// Create a driver rooted at `data_dir`.
    ///
    /// The directory must already exist and be a directory; the absolute
    /// path is resolved once and stored.
    pub async fn new<P: AsRef<Path>>(data_dir: P) -> Result<Self, Error> {
        let data_dir = data_dir.as_ref();

        let abs = fs::canonicalize(data_dir).await.map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                Error::storage(format!(
                    "data directory \"{}\" does not exist",
                    data_dir.display()
                ))
            } else {
                Error::storage(format!(
                    "failed to resolve data directory \"{}\": {err}",
                    data_dir.display()
                ))
            }
        })?;

        let meta = fs::metadata(&abs).await.map_err(|err| {
            Error::storage(format!("failed to stat \"{}\": {err}", abs.display()))
        })?;
        if !meta.is_dir() {
            return Err(Error::storage(format!(
                "path \"{}\" is not a directory",
                abs.display()
            )));
        }

        Ok(Self { data_dir: abs })
    }

    /// The filename for a database name, or [`Error::DbNameTooLong`].
    fn db_filename(&self, name: &str) -> Result<String, Error> {
        if name.len() > DB_NAME_MAX_LEN {
            return Err(Error::DbNameTooLong);
        }
        Ok(format!("{}.txt", utf8_percent_encode(name, FILENAME_ESCAPE)))
    }

    /// Stream `input` into `path` via a sibling temp file, then rename over.
    ///
    /// The previous content of `path`, if any, ends up at `backup`.
    async fn replace_file(
        &self,
        path: &Path,
        backup: Option<&Path>,
        mut input: ByteStream,
    ) -> Result<(), Error> {
        let tmp_path = {
            let mut p = path.as_os_str().to_owned();
            p.push(".tmp");
            PathBuf::from(p)
        };

        let mut opts = fs::OpenOptions::new();
        opts.write(true).create(true).truncate(true);
        #[cfg(unix)]
        opts.mode(FS_PERM_BITS);

        let mut file = opts.open(&tmp_path).await.map_err(|err| {
            Error::storage(format!(
                "failed to open temp file \"{}\": {err}",
                tmp_path.display()
            ))
        })?;

        let copied = tokio::io::copy(&mut input, &mut file).await;
        if let Err(err) = copied {
            drop(file);
            let _ = fs::remove_file(&tmp_path).await;
            return Err(Error::storage(format!(
                "failed to copy input to \"{}\": {err}",
                tmp_path.display()
            )));
        }
        file.flush().await.map_err(|err| {
            Error::storage(format!(
                "failed to flush temp file \"{}\": {err}",
                tmp_path.display()
            ))
        })?;
        drop(file);

        if let Some(backup) = backup {
            match fs::try_exists(path).await {
                Ok(true) => {
                    fs::rename(path, backup).await.map_err(|err| {
                        Error::storage(format!(
                            "failed to move \"{}\" to backup \"{}\": {err}",
                            path.display(),
                            backup.display()
                        ))
                    })?;
                }
                Ok(false) => {}
                Err(err) => {
                    return Err(Error::storage(format!(
                        "failed to stat \"{}\": {err}",
                        path.display()
                    )));
                }
            }
        }

        fs::rename(&tmp_path, path).await.map_err(|err| {
            Error::storage(format!(
                "failed to rename \"{}\" to \"{}\": {err}",
                tmp_path.display(),
                path.display()
            ))
        })
    }
}

#[async_trait]
impl StorageDriver for FsStorageDriver {
    async fn write_database(&self, name: &str, input: ByteStream) -> Result<(), Error> {
        let filename = self.db_filename(name)?;
        let file_path = self.data_dir.join(&filename);
        let bak_path = self.data_dir.join(format!("{filename}.bak"));

        self.replace_file(&file_path, Some(&bak_path), input).await
    }

    async fn read_database(&self, name: &str) -> Result<ByteStream, Error> {
        let filename = self.db_filename(name)?;
        let file_path = self.data_dir.join(&filename);

        let file = fs::File::open(&file_path).await.map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                Error::not_found(format!(
                    "no cached database \"{name}\" at \"{}\"",
                    file_path.display()
                ))
            } else {
                Error::storage(format!(
                    "failed to open \"{}\" for database \"{name}\": {err}",
                    file_path.display()
                ))
            }
        })?;

        Ok(Box::new(file))
    }

    async fn write_checkpoints(&self, checkpoints: &AllCheckpoints) -> Result<(), Error> {
        let json = serde_json::to_vec_pretty(checkpoints)?;
        let path = self.data_dir.join(CHECKPOINTS_FILENAME);

        self.replace_file(&path, None, Box::new(std::io::Cursor::new(json)))
            .await
    }

    async fn read_checkpoints(&self) -> Result<AllCheckpoints, Error> {
        let path = self.data_dir.join(CHECKPOINTS_FILENAME);

        let content = fs::read_to_string(&path).await.map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                Error::not_found(format!("no checkpoints at \"{}\"", path.display()))
            } else {
                Error::storage(format!(
                    "failed to read checkpoints from \"{}\": {err}",
                    path.display()
                ))
            }
        })?;

        serde_json::from_str(&content).map_err(|err| {
            Error::storage(format!(
                "failed to parse checkpoints from \"{}\": {err}",
                path.display()
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use tempfile::tempdir;
    use tokio::io::AsyncReadExt;
    use tokio_util::io::StreamReader;

    fn stream_of(content: &str) -> ByteStream {
        Box::new(std::io::Cursor::new(content.as_bytes().to_vec()))
    }

    async fn read_all(mut stream: ByteStream) -> String {
        let mut buf = String::new();
        stream.read_to_string(&mut buf).await.unwrap();
        buf
    }

    #[tokio::test]
    async fn missing_data_dir_rejected() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(FsStorageDriver::new(&missing).await.is_err());
    }

    #[tokio::test]
    async fn non_directory_rejected() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("plain");
        std::fs::write(&file, b"x").unwrap();
        assert!(FsStorageDriver::new(&file).await.is_err());
    }

    #[tokio::test]
    async fn database_write_read_roundtrip() {
        let dir = tempdir().unwrap();
        let driver = FsStorageDriver::new(dir.path()).await.unwrap();

        driver
            .write_database("disposable", stream_of("a.com\nb.com\n"))
            .await
            .unwrap();

        let back = read_all(driver.read_database("disposable").await.unwrap()).await;
        assert_eq!(back, "a.com\nb.com\n");
    }

    #[tokio::test]
    async fn second_write_backs_up_previous() {
        let dir = tempdir().unwrap();
        let driver = FsStorageDriver::new(dir.path()).await.unwrap();

        driver
            .write_database("disposable", stream_of("old.com\n"))
            .await
            .unwrap();
        driver
            .write_database("disposable", stream_of("new.com\n"))
            .await
            .unwrap();

        let primary = std::fs::read_to_string(dir.path().join("disposable.txt")).unwrap();
        let backup = std::fs::read_to_string(dir.path().join("disposable.txt.bak")).unwrap();
        assert_eq!(primary, "new.com\n");
        assert_eq!(backup, "old.com\n");
    }

    #[tokio::test]
    async fn failed_stream_leaves_previous_copy() {
        let dir = tempdir().unwrap();
        let driver = FsStorageDriver::new(dir.path()).await.unwrap();

        driver
            .write_database("disposable", stream_of("old.com\n"))
            .await
            .unwrap();

        // A stream that yields some bytes and then an error.
        let chunks: Vec<std::io::Result<Bytes>> = vec![
            Ok(Bytes::from_static(b"partial.com\n")),
            Err(std::io::Error::other("parse aborted")),
        ];
        let broken: ByteStream = Box::new(StreamReader::new(tokio_stream::iter(chunks)));

        assert!(driver.write_database("disposable", broken).await.is_err());

        let primary = std::fs::read_to_string(dir.path().join("disposable.txt")).unwrap();
        assert_eq!(primary, "old.com\n", "aborted write must not clobber the primary");
        assert!(
            !dir.path().join("disposable.txt.tmp").exists(),
            "temp file should be cleaned up"
        );
    }

    #[tokio::test]
    async fn database_names_are_percent_escaped() {
        let dir = tempdir().unwrap();
        let driver = FsStorageDriver::new(dir.path()).await.unwrap();

        driver
            .write_database("disposable allow/list", stream_of("a.com\n"))
            .await
            .unwrap();

        assert!(dir.path().join("disposable%20allow%2Flist.txt").exists());

        let back = read_all(
            driver
                .read_database("disposable allow/list")
                .await
                .unwrap(),
        )
        .await;
        assert_eq!(back, "a.com\n");
    }

    #[tokio::test]
    async fn overlong_name_rejected() {
        let dir = tempdir().unwrap();
        let driver = FsStorageDriver::new(dir.path()).await.unwrap();

        let name = "x".repeat(DB_NAME_MAX_LEN + 1);
        let err = driver.read_database(&name).await.err().unwrap();
        assert!(matches!(err, Error::DbNameTooLong));
    }

    #[tokio::test]
    async fn missing_database_is_not_found() {
        let dir = tempdir().unwrap();
        let driver = FsStorageDriver::new(dir.path()).await.unwrap();

        let err = driver.read_database("absent").await.err().unwrap();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn checkpoints_roundtrip() {
        let dir = tempdir().unwrap();
        let driver = FsStorageDriver::new(dir.path()).await.unwrap();

        let err = driver.read_checkpoints().await.unwrap_err();
        assert!(err.is_not_found());

        let mut doc = AllCheckpoints::new();
        doc.set("disposable", 1700000000);
        driver.write_checkpoints(&doc).await.unwrap();

        let back = driver.read_checkpoints().await.unwrap();
        assert_eq!(back, doc);

        // Full rewrite on every update.
        let mut doc2 = AllCheckpoints::new();
        doc2.set("other", 1700000001);
        driver.write_checkpoints(&doc2).await.unwrap();
        let back2 = driver.read_checkpoints().await.unwrap();
        assert_eq!(back2, doc2);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn database_file_mode_is_0644() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let driver = FsStorageDriver::new(dir.path()).await.unwrap();

        driver
            .write_database("disposable", stream_of("a.com\n"))
            .await
            .unwrap();

        let mode = std::fs::metadata(dir.path().join("disposable.txt"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o644);
    }
}
