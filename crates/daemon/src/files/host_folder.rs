//! SFTP file-access backend serving a host directory.
//!
//! [`HostFolder`] answers the SFTP operations the protocol server decodes.
//! Every client path is resolved through [`VirtualRoot`], so clients can
//! only reach files beneath the configured root. Unless the root is `/`, the
//! resolved path is also checked after following symlinks, and anything that
//! lands outside the root is refused with permission denied. In read-only
//! mode every operation that would modify the folder fails the same way.

use std::collections::HashMap;
use std::fs::{FileTimes, Permissions};
use std::io::{self, SeekFrom};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::{Duration, UNIX_EPOCH};

use russh_sftp::protocol::{
    Attrs, Data, File, FileAttributes, Handle, Name, OpenFlags, Status, StatusCode, Version,
};
use tokio::fs::{self, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tracing::{debug, warn};

use super::paths::VirtualRoot;

/// Largest read served in one reply.
pub const MAX_READ_LEN: u32 = 256 * 1024;

/// Directory entries returned per `readdir` reply.
const READDIR_BATCH: usize = 100;

enum OpenHandle {
    File { file: fs::File, path: PathBuf },
    Dir { entries: Vec<File>, next: usize },
}

/// SFTP backend rooted at a host directory.
pub struct HostFolder {
    root: VirtualRoot,
    real_root: PathBuf,
    read_only: bool,
    handles: HashMap<String, OpenHandle>,
    next_handle: u64,
}

impl HostFolder {
    /// Creates a backend serving `root`.
    pub fn new(root: impl Into<PathBuf>, read_only: bool) -> Self {
        let root = root.into();
        let real_root = std::fs::canonicalize(&root).unwrap_or_else(|_| root.clone());
        Self {
            root: VirtualRoot::new(root),
            real_root,
            read_only,
            handles: HashMap::new(),
            next_handle: 0,
        }
    }

    /// Returns the number of open file and directory handles.
    pub fn open_handles(&self) -> usize {
        self.handles.len()
    }

    fn insert(&mut self, handle: OpenHandle) -> String {
        let name = format!("{:016x}", self.next_handle);
        self.next_handle += 1;
        self.handles.insert(name.clone(), handle);
        name
    }

    /// Resolves `path` and checks that it stays beneath the root once
    /// symlinks are followed.
    ///
    /// Without `follow` only the parent directory is checked, for operations
    /// that act on a link itself or create a new entry.
    async fn locate(&self, op: &str, path: &str, follow: bool) -> Result<PathBuf, StatusCode> {
        let resolved = self.root.resolve(path);
        if self.real_root == Path::new("/") {
            return Ok(resolved);
        }

        let mut candidate = if follow || resolved == self.root.root() {
            resolved.clone()
        } else {
            resolved
                .parent()
                .map_or_else(|| self.root.root().to_path_buf(), Path::to_path_buf)
        };
        let real = loop {
            match fs::canonicalize(&candidate).await {
                Ok(real) => break real,
                Err(e) if e.kind() == io::ErrorKind::NotFound && candidate != self.root.root() => {
                    // A dangling link could still point anywhere once created.
                    if fs::symlink_metadata(&candidate).await.is_ok() {
                        warn!(op, path, "refused: dangling symlink");
                        return Err(StatusCode::PermissionDenied);
                    }
                    match candidate.parent() {
                        Some(parent) => candidate = parent.to_path_buf(),
                        None => return Err(failed(op, path, e)),
                    }
                }
                Err(e) => return Err(failed(op, path, e)),
            }
        };

        if !real.starts_with(&self.real_root) {
            warn!(op, path, real = %real.display(), "refused: path leaves the served folder");
            return Err(StatusCode::PermissionDenied);
        }
        Ok(resolved)
    }

    fn ensure_writable(&self, op: &str, path: &str) -> Result<(), StatusCode> {
        if self.read_only {
            debug!(op, path, "refused: folder is read-only");
            return Err(StatusCode::PermissionDenied);
        }
        Ok(())
    }

    async fn apply_attrs(&self, path: &Path, attrs: &FileAttributes) -> io::Result<()> {
        if let Some(size) = attrs.size {
            let file = OpenOptions::new().write(true).open(path).await?;
            file.set_len(size).await?;
        }
        if let Some(mode) = attrs.permissions {
            fs::set_permissions(path, Permissions::from_mode(mode & 0o7777)).await?;
        }
        if let (Some(atime), Some(mtime)) = (attrs.atime, attrs.mtime) {
            let times = FileTimes::new()
                .set_accessed(UNIX_EPOCH + Duration::from_secs(atime.into()))
                .set_modified(UNIX_EPOCH + Duration::from_secs(mtime.into()));
            let file = fs::File::open(path).await?.into_std().await;
            tokio::task::spawn_blocking(move || file.set_times(times))
                .await
                .map_err(io::Error::other)??;
        }
        Ok(())
    }
}

fn ok_status(id: u32) -> Status {
    Status {
        id,
        status_code: StatusCode::Ok,
        error_message: "Ok".to_string(),
        language_tag: "en-US".to_string(),
    }
}

/// Maps a filesystem error onto the closest SFTP status code.
pub fn status_for(err: &io::Error) -> StatusCode {
    match err.kind() {
        io::ErrorKind::NotFound => StatusCode::NoSuchFile,
        io::ErrorKind::PermissionDenied => StatusCode::PermissionDenied,
        io::ErrorKind::UnexpectedEof => StatusCode::Eof,
        _ => StatusCode::Failure,
    }
}

fn failed(op: &str, path: &str, err: io::Error) -> StatusCode {
    debug!(op, path, error = %err, "sftp operation failed");
    status_for(&err)
}

fn mutates(flags: OpenFlags) -> bool {
    flags.intersects(
        OpenFlags::WRITE | OpenFlags::APPEND | OpenFlags::CREATE | OpenFlags::TRUNCATE,
    )
}

fn open_options(flags: OpenFlags) -> OpenOptions {
    let mut options = OpenOptions::new();
    options
        .read(flags.contains(OpenFlags::READ) || !mutates(flags))
        .write(flags.contains(OpenFlags::WRITE))
        .append(flags.contains(OpenFlags::APPEND))
        .truncate(flags.contains(OpenFlags::TRUNCATE));
    if flags.contains(OpenFlags::CREATE) {
        if flags.contains(OpenFlags::EXCLUDE) {
            options.create_new(true);
        } else {
            options.create(true);
        }
    }
    options
}

impl russh_sftp::server::Handler for HostFolder {
    type Error = StatusCode;

    fn unimplemented(&self) -> Self::Error {
        StatusCode::OpUnsupported
    }

    async fn init(
        &mut self,
        version: u32,
        extensions: HashMap<String, String>,
    ) -> Result<Version, Self::Error> {
        debug!(version, ?extensions, root = %self.root.root().display(), "sftp init");
        Ok(Version::new())
    }

    async fn open(
        &mut self,
        id: u32,
        filename: String,
        pflags: OpenFlags,
        _attrs: FileAttributes,
    ) -> Result<Handle, Self::Error> {
        debug!(path = %filename, ?pflags, "open");
        if mutates(pflags) {
            self.ensure_writable("open", &filename)?;
        }

        let path = self.locate("open", &filename, true).await?;
        let file = open_options(pflags)
            .open(&path)
            .await
            .map_err(|e| failed("open", &filename, e))?;

        let handle = self.insert(OpenHandle::File { file, path });
        Ok(Handle { id, handle })
    }

    async fn close(&mut self, id: u32, handle: String) -> Result<Status, Self::Error> {
        debug!(handle = %handle, "close");
        match self.handles.remove(&handle) {
            Some(OpenHandle::File { mut file, .. }) => {
                file.flush().await.map_err(|e| failed("close", &handle, e))?;
                Ok(ok_status(id))
            }
            Some(OpenHandle::Dir { .. }) => Ok(ok_status(id)),
            None => Err(StatusCode::Failure),
        }
    }

    async fn read(
        &mut self,
        id: u32,
        handle: String,
        offset: u64,
        len: u32,
    ) -> Result<Data, Self::Error> {
        let Some(OpenHandle::File { file, .. }) = self.handles.get_mut(&handle) else {
            return Err(StatusCode::Failure);
        };

        file.seek(SeekFrom::Start(offset))
            .await
            .map_err(|e| failed("read", &handle, e))?;
        let mut data = vec![0u8; len.min(MAX_READ_LEN) as usize];
        let n = file
            .read(&mut data)
            .await
            .map_err(|e| failed("read", &handle, e))?;
        if n == 0 {
            return Err(StatusCode::Eof);
        }
        data.truncate(n);
        Ok(Data { id, data })
    }

    async fn write(
        &mut self,
        id: u32,
        handle: String,
        offset: u64,
        data: Vec<u8>,
    ) -> Result<Status, Self::Error> {
        self.ensure_writable("write", &handle)?;
        let Some(OpenHandle::File { file, .. }) = self.handles.get_mut(&handle) else {
            return Err(StatusCode::Failure);
        };

        file.seek(SeekFrom::Start(offset))
            .await
            .map_err(|e| failed("write", &handle, e))?;
        file.write_all(&data)
            .await
            .map_err(|e| failed("write", &handle, e))?;
        Ok(ok_status(id))
    }

    async fn lstat(&mut self, id: u32, path: String) -> Result<Attrs, Self::Error> {
        debug!(path = %path, "lstat");
        let metadata = fs::symlink_metadata(self.locate("lstat", &path, false).await?)
            .await
            .map_err(|e| failed("lstat", &path, e))?;
        Ok(Attrs {
            id,
            attrs: FileAttributes::from(&metadata),
        })
    }

    async fn fstat(&mut self, id: u32, handle: String) -> Result<Attrs, Self::Error> {
        let Some(OpenHandle::File { file, .. }) = self.handles.get(&handle) else {
            return Err(StatusCode::Failure);
        };
        let metadata = file
            .metadata()
            .await
            .map_err(|e| failed("fstat", &handle, e))?;
        Ok(Attrs {
            id,
            attrs: FileAttributes::from(&metadata),
        })
    }

    async fn setstat(
        &mut self,
        id: u32,
        path: String,
        attrs: FileAttributes,
    ) -> Result<Status, Self::Error> {
        debug!(path = %path, "setstat");
        self.ensure_writable("setstat", &path)?;
        let resolved = self.locate("setstat", &path, true).await?;
        self.apply_attrs(&resolved, &attrs)
            .await
            .map_err(|e| failed("setstat", &path, e))?;
        Ok(ok_status(id))
    }

    async fn fsetstat(
        &mut self,
        id: u32,
        handle: String,
        attrs: FileAttributes,
    ) -> Result<Status, Self::Error> {
        self.ensure_writable("fsetstat", &handle)?;
        let Some(OpenHandle::File { path, .. }) = self.handles.get(&handle) else {
            return Err(StatusCode::Failure);
        };
        let path = path.clone();
        self.apply_attrs(&path, &attrs)
            .await
            .map_err(|e| failed("fsetstat", &handle, e))?;
        Ok(ok_status(id))
    }

    async fn opendir(&mut self, id: u32, path: String) -> Result<Handle, Self::Error> {
        debug!(path = %path, "opendir");
        let mut dir = fs::read_dir(self.locate("opendir", &path, true).await?)
            .await
            .map_err(|e| failed("opendir", &path, e))?;

        let mut entries = Vec::new();
        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| failed("opendir", &path, e))?
        {
            // Entries that vanish between listing and stat are skipped.
            if let Ok(metadata) = fs::symlink_metadata(entry.path()).await {
                let name = entry.file_name().to_string_lossy().into_owned();
                entries.push(File::new(name, FileAttributes::from(&metadata)));
            }
        }

        let handle = self.insert(OpenHandle::Dir { entries, next: 0 });
        Ok(Handle { id, handle })
    }

    async fn readdir(&mut self, id: u32, handle: String) -> Result<Name, Self::Error> {
        let Some(OpenHandle::Dir { entries, next }) = self.handles.get_mut(&handle) else {
            return Err(StatusCode::Failure);
        };
        if *next >= entries.len() {
            return Err(StatusCode::Eof);
        }

        let end = (*next + READDIR_BATCH).min(entries.len());
        let files = entries[*next..end].to_vec();
        *next = end;
        Ok(Name { id, files })
    }

    async fn remove(&mut self, id: u32, filename: String) -> Result<Status, Self::Error> {
        debug!(path = %filename, "remove");
        self.ensure_writable("remove", &filename)?;
        fs::remove_file(self.locate("remove", &filename, false).await?)
            .await
            .map_err(|e| failed("remove", &filename, e))?;
        Ok(ok_status(id))
    }

    async fn mkdir(
        &mut self,
        id: u32,
        path: String,
        attrs: FileAttributes,
    ) -> Result<Status, Self::Error> {
        debug!(path = %path, "mkdir");
        self.ensure_writable("mkdir", &path)?;
        let resolved = self.locate("mkdir", &path, false).await?;
        fs::create_dir(&resolved)
            .await
            .map_err(|e| failed("mkdir", &path, e))?;
        if let Some(mode) = attrs.permissions {
            fs::set_permissions(&resolved, Permissions::from_mode(mode & 0o7777))
                .await
                .map_err(|e| failed("mkdir", &path, e))?;
        }
        Ok(ok_status(id))
    }

    async fn rmdir(&mut self, id: u32, path: String) -> Result<Status, Self::Error> {
        debug!(path = %path, "rmdir");
        self.ensure_writable("rmdir", &path)?;
        fs::remove_dir(self.locate("rmdir", &path, false).await?)
            .await
            .map_err(|e| failed("rmdir", &path, e))?;
        Ok(ok_status(id))
    }

    async fn realpath(&mut self, id: u32, path: String) -> Result<Name, Self::Error> {
        let resolved = VirtualRoot::normalize(&path);
        debug!(path = %path, resolved = %resolved, "realpath");
        Ok(Name {
            id,
            files: vec![File::dummy(resolved)],
        })
    }

    async fn stat(&mut self, id: u32, path: String) -> Result<Attrs, Self::Error> {
        debug!(path = %path, "stat");
        let metadata = fs::metadata(self.locate("stat", &path, true).await?)
            .await
            .map_err(|e| failed("stat", &path, e))?;
        Ok(Attrs {
            id,
            attrs: FileAttributes::from(&metadata),
        })
    }

    async fn rename(
        &mut self,
        id: u32,
        oldpath: String,
        newpath: String,
    ) -> Result<Status, Self::Error> {
        debug!(from = %oldpath, to = %newpath, "rename");
        self.ensure_writable("rename", &oldpath)?;
        let from = self.locate("rename", &oldpath, false).await?;
        let to = self.locate("rename", &newpath, false).await?;
        fs::rename(from, to)
            .await
            .map_err(|e| failed("rename", &oldpath, e))?;
        Ok(ok_status(id))
    }

    async fn readlink(&mut self, id: u32, path: String) -> Result<Name, Self::Error> {
        debug!(path = %path, "readlink");
        let target = fs::read_link(self.locate("readlink", &path, false).await?)
            .await
            .map_err(|e| failed("readlink", &path, e))?;
        let target = if target.is_absolute() {
            self.root.to_virtual(&target)
        } else {
            target.to_string_lossy().into_owned()
        };
        Ok(Name {
            id,
            files: vec![File::dummy(target)],
        })
    }

    async fn symlink(
        &mut self,
        id: u32,
        linkpath: String,
        targetpath: String,
    ) -> Result<Status, Self::Error> {
        debug!(link = %linkpath, target = %targetpath, "symlink");
        self.ensure_writable("symlink", &linkpath)?;
        let target = if targetpath.starts_with('/') {
            self.root.resolve(&targetpath)
        } else {
            PathBuf::from(&targetpath)
        };
        let link = self.locate("symlink", &linkpath, false).await?;
        fs::symlink(target, link)
            .await
            .map_err(|e| failed("symlink", &linkpath, e))?;
        Ok(ok_status(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use russh_sftp::server::Handler;
    use tempfile::TempDir;

    fn folder(read_only: bool) -> (TempDir, HostFolder) {
        let dir = TempDir::new().unwrap();
        let backend = HostFolder::new(dir.path(), read_only);
        (dir, backend)
    }

    fn write_flags() -> OpenFlags {
        OpenFlags::WRITE | OpenFlags::CREATE | OpenFlags::TRUNCATE
    }

    #[tokio::test]
    async fn test_init_reports_version() {
        let (_dir, mut backend) = folder(false);
        let version = backend.init(3, HashMap::new()).await.unwrap();
        assert_eq!(version.version, Version::new().version);
    }

    #[tokio::test]
    async fn test_write_then_read_back() {
        let (dir, mut backend) = folder(false);

        let handle = backend
            .open(1, "/hello.txt".to_string(), write_flags(), FileAttributes::default())
            .await
            .unwrap()
            .handle;
        backend
            .write(2, handle.clone(), 0, b"hello host".to_vec())
            .await
            .unwrap();
        backend.close(3, handle).await.unwrap();

        assert_eq!(
            std::fs::read(dir.path().join("hello.txt")).unwrap(),
            b"hello host"
        );

        let handle = backend
            .open(4, "hello.txt".to_string(), OpenFlags::READ, FileAttributes::default())
            .await
            .unwrap()
            .handle;
        let data = backend.read(5, handle.clone(), 6, 64).await.unwrap();
        assert_eq!(data.id, 5);
        assert_eq!(data.data, b"host");

        let eof = backend.read(6, handle.clone(), 10, 64).await;
        assert!(matches!(eof, Err(StatusCode::Eof)));
        backend.close(7, handle).await.unwrap();
        assert_eq!(backend.open_handles(), 0);
    }

    #[tokio::test]
    async fn test_open_missing_file() {
        let (_dir, mut backend) = folder(false);
        let result = backend
            .open(1, "/missing".to_string(), OpenFlags::READ, FileAttributes::default())
            .await;
        assert!(matches!(result, Err(StatusCode::NoSuchFile)));
    }

    #[tokio::test]
    async fn test_exclusive_create_fails_on_existing_file() {
        let (dir, mut backend) = folder(false);
        std::fs::write(dir.path().join("taken"), b"x").unwrap();

        let result = backend
            .open(
                1,
                "/taken".to_string(),
                OpenFlags::WRITE | OpenFlags::CREATE | OpenFlags::EXCLUDE,
                FileAttributes::default(),
            )
            .await;
        assert!(matches!(result, Err(StatusCode::Failure)));
    }

    #[tokio::test]
    async fn test_unknown_handle() {
        let (_dir, mut backend) = folder(false);
        assert!(matches!(
            backend.read(1, "nope".to_string(), 0, 10).await,
            Err(StatusCode::Failure)
        ));
        assert!(matches!(
            backend.close(2, "nope".to_string()).await,
            Err(StatusCode::Failure)
        ));
    }

    #[tokio::test]
    async fn test_listing_is_paged_then_eof() {
        let (dir, mut backend) = folder(false);
        for i in 0..(READDIR_BATCH + 5) {
            std::fs::write(dir.path().join(format!("f{i:03}")), b"").unwrap();
        }

        let handle = backend.opendir(1, "/".to_string()).await.unwrap().handle;
        let first = backend.readdir(2, handle.clone()).await.unwrap();
        assert_eq!(first.files.len(), READDIR_BATCH);
        let second = backend.readdir(3, handle.clone()).await.unwrap();
        assert_eq!(second.files.len(), 5);
        assert!(matches!(
            backend.readdir(4, handle.clone()).await,
            Err(StatusCode::Eof)
        ));
        backend.close(5, handle).await.unwrap();
    }

    #[tokio::test]
    async fn test_directory_lifecycle() {
        let (dir, mut backend) = folder(false);

        backend
            .mkdir(1, "/sub".to_string(), FileAttributes::default())
            .await
            .unwrap();
        assert!(dir.path().join("sub").is_dir());

        let attrs = backend.stat(2, "/sub".to_string()).await.unwrap().attrs;
        assert!(attrs.is_dir());

        backend.rmdir(3, "/sub".to_string()).await.unwrap();
        assert!(!dir.path().join("sub").exists());
    }

    #[tokio::test]
    async fn test_rename_and_remove() {
        let (dir, mut backend) = folder(false);
        std::fs::write(dir.path().join("a.txt"), b"data").unwrap();

        backend
            .rename(1, "/a.txt".to_string(), "/b.txt".to_string())
            .await
            .unwrap();
        assert!(dir.path().join("b.txt").exists());

        backend.remove(2, "/b.txt".to_string()).await.unwrap();
        assert!(!dir.path().join("b.txt").exists());

        assert!(matches!(
            backend.remove(3, "/b.txt".to_string()).await,
            Err(StatusCode::NoSuchFile)
        ));
    }

    #[tokio::test]
    async fn test_setstat_truncates_and_sets_mode() {
        let (dir, mut backend) = folder(false);
        let path = dir.path().join("big");
        std::fs::write(&path, vec![7u8; 100]).unwrap();

        let attrs = FileAttributes {
            size: Some(10),
            permissions: Some(0o600),
            ..FileAttributes::default()
        };
        backend.setstat(1, "/big".to_string(), attrs).await.unwrap();

        let metadata = std::fs::metadata(&path).unwrap();
        assert_eq!(metadata.len(), 10);
        assert_eq!(metadata.permissions().mode() & 0o777, 0o600);
    }

    #[tokio::test]
    async fn test_symlink_and_readlink() {
        let (dir, mut backend) = folder(false);
        std::fs::write(dir.path().join("target"), b"t").unwrap();

        backend
            .symlink(1, "/link".to_string(), "/target".to_string())
            .await
            .unwrap();
        let name = backend.readlink(2, "/link".to_string()).await.unwrap();
        assert_eq!(name.files[0].filename, "/target");

        let attrs = backend.lstat(3, "/link".to_string()).await.unwrap().attrs;
        assert!(attrs.is_symlink());
    }

    #[tokio::test]
    async fn test_realpath_stays_virtual() {
        let (_dir, mut backend) = folder(false);
        let name = backend.realpath(1, ".".to_string()).await.unwrap();
        assert_eq!(name.files[0].filename, "/");

        let name = backend.realpath(2, "/a/../../b".to_string()).await.unwrap();
        assert_eq!(name.files[0].filename, "/b");
    }

    #[tokio::test]
    async fn test_paths_cannot_escape_root() {
        let outer = TempDir::new().unwrap();
        let root = outer.path().join("root");
        std::fs::create_dir(&root).unwrap();
        std::fs::write(outer.path().join("secret"), b"s").unwrap();

        let mut backend = HostFolder::new(&root, false);
        let result = backend.stat(1, "/../secret".to_string()).await;
        assert!(matches!(result, Err(StatusCode::NoSuchFile)));
    }

    fn escaping_folder() -> (TempDir, HostFolder) {
        let outer = TempDir::new().unwrap();
        let root = outer.path().join("root");
        let outside = outer.path().join("outside");
        std::fs::create_dir_all(root.join("docs")).unwrap();
        std::fs::create_dir(&outside).unwrap();
        std::fs::write(outside.join("secret"), b"s").unwrap();
        std::fs::write(root.join("docs").join("readme"), b"r").unwrap();
        std::os::unix::fs::symlink(&outside, root.join("escape")).unwrap();
        std::os::unix::fs::symlink(outside.join("secret"), root.join("secret")).unwrap();
        std::os::unix::fs::symlink(outside.join("absent"), root.join("dangling")).unwrap();
        std::os::unix::fs::symlink("docs", root.join("inner")).unwrap();

        let backend = HostFolder::new(&root, false);
        (outer, backend)
    }

    #[tokio::test]
    async fn test_symlinks_out_of_root_are_refused() {
        let (_outer, mut backend) = escaping_folder();

        assert!(matches!(
            backend
                .open(1, "/secret".to_string(), OpenFlags::READ, FileAttributes::default())
                .await,
            Err(StatusCode::PermissionDenied)
        ));
        assert!(matches!(
            backend
                .open(2, "/escape/secret".to_string(), OpenFlags::READ, FileAttributes::default())
                .await,
            Err(StatusCode::PermissionDenied)
        ));
        assert!(matches!(
            backend.stat(3, "/escape".to_string()).await,
            Err(StatusCode::PermissionDenied)
        ));
        assert!(matches!(
            backend.opendir(4, "/escape".to_string()).await,
            Err(StatusCode::PermissionDenied)
        ));
        assert!(matches!(
            backend.lstat(5, "/escape/secret".to_string()).await,
            Err(StatusCode::PermissionDenied)
        ));
        assert_eq!(backend.open_handles(), 0);

        // The links themselves are still visible.
        let attrs = backend.lstat(6, "/escape".to_string()).await.unwrap().attrs;
        assert!(attrs.is_symlink());
    }

    #[tokio::test]
    async fn test_writes_through_escaping_symlinks_are_refused() {
        let (outer, mut backend) = escaping_folder();
        let outside = outer.path().join("outside");

        assert!(matches!(
            backend
                .open(1, "/escape/new".to_string(), write_flags(), FileAttributes::default())
                .await,
            Err(StatusCode::PermissionDenied)
        ));
        assert!(matches!(
            backend
                .open(2, "/dangling".to_string(), write_flags(), FileAttributes::default())
                .await,
            Err(StatusCode::PermissionDenied)
        ));
        assert!(matches!(
            backend
                .mkdir(3, "/escape/dir".to_string(), FileAttributes::default())
                .await,
            Err(StatusCode::PermissionDenied)
        ));
        assert!(matches!(
            backend.remove(4, "/escape/secret".to_string()).await,
            Err(StatusCode::PermissionDenied)
        ));
        assert!(matches!(
            backend
                .rename(5, "/docs/readme".to_string(), "/escape/readme".to_string())
                .await,
            Err(StatusCode::PermissionDenied)
        ));

        assert!(!outside.join("new").exists());
        assert!(!outside.join("absent").exists());
        assert!(!outside.join("dir").exists());
        assert!(!outside.join("readme").exists());
        assert!(outside.join("secret").exists());
    }

    #[tokio::test]
    async fn test_symlinks_within_root_are_followed() {
        let (_outer, mut backend) = escaping_folder();

        let handle = backend
            .open(1, "/inner/readme".to_string(), OpenFlags::READ, FileAttributes::default())
            .await
            .unwrap()
            .handle;
        let data = backend.read(2, handle.clone(), 0, 16).await.unwrap();
        assert_eq!(data.data, b"r");
        backend.close(3, handle).await.unwrap();

        let attrs = backend.stat(4, "/inner".to_string()).await.unwrap().attrs;
        assert!(attrs.is_dir());

        // Removing the link only touches the link.
        backend.remove(5, "/secret".to_string()).await.unwrap();
    }

    #[tokio::test]
    async fn test_read_only_refuses_mutations() {
        let (dir, mut backend) = folder(true);
        std::fs::write(dir.path().join("keep.txt"), b"keep").unwrap();

        assert!(matches!(
            backend
                .open(1, "/new".to_string(), write_flags(), FileAttributes::default())
                .await,
            Err(StatusCode::PermissionDenied)
        ));
        assert!(matches!(
            backend.remove(2, "/keep.txt".to_string()).await,
            Err(StatusCode::PermissionDenied)
        ));
        assert!(matches!(
            backend
                .mkdir(3, "/d".to_string(), FileAttributes::default())
                .await,
            Err(StatusCode::PermissionDenied)
        ));
        assert!(matches!(
            backend
                .rename(4, "/keep.txt".to_string(), "/moved".to_string())
                .await,
            Err(StatusCode::PermissionDenied)
        ));
        assert!(matches!(
            backend
                .setstat(5, "/keep.txt".to_string(), FileAttributes::default())
                .await,
            Err(StatusCode::PermissionDenied)
        ));
        assert!(dir.path().join("keep.txt").exists());
        assert!(!dir.path().join("new").exists());

        let handle = backend
            .open(6, "/keep.txt".to_string(), OpenFlags::READ, FileAttributes::default())
            .await
            .unwrap()
            .handle;
        let data = backend.read(7, handle, 0, 16).await.unwrap();
        assert_eq!(data.data, b"keep");
    }

    #[test]
    fn test_status_for_io_errors() {
        assert!(matches!(
            status_for(&io::Error::from(io::ErrorKind::NotFound)),
            StatusCode::NoSuchFile
        ));
        assert!(matches!(
            status_for(&io::Error::from(io::ErrorKind::PermissionDenied)),
            StatusCode::PermissionDenied
        ));
        assert!(matches!(
            status_for(&io::Error::other("disk on fire")),
            StatusCode::Failure
        ));
    }
}
