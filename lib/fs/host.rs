//! The local disk, through `std::fs` with `nix` for ownership and access checks.

use std::fmt;
use std::fs::{self, File, FileTimes, Metadata, Permissions};
use std::io;
use std::os::unix::fs::{MetadataExt as _, PermissionsExt as _};
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use nix::unistd::{AccessFlags, Gid, Group, Uid, User};
use tracing::{debug, warn};

use crate::fs::attrs::{
    AttrValue, AttributeFamily, BasicAttrs, DosAttrs, FileKey, PosixAttrs, PosixPermissions,
    Principal, split_attribute_name,
};
use crate::fs::error::FsError;
use crate::fs::traits::{AttributeProvider, ByteChannel, FilesystemOps, PathOps};
use crate::fs::{AccessMode, AttributeViews, CopyOptions, OpenFlags, Platform};

/// A path on the host filesystem.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HostPath(PathBuf);

impl HostPath {
    /// Wrap a host path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    /// The underlying host path.
    #[must_use]
    pub fn as_path(&self) -> &Path {
        &self.0
    }
}

impl fmt::Display for HostPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.display().fmt(f)
    }
}

impl PathOps for HostPath {
    fn file_name(&self) -> Option<String> {
        self.0
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
    }

    fn parent(&self) -> Option<Self> {
        self.0
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .map(|parent| Self(parent.to_path_buf()))
    }

    fn resolve(&self, other: &str) -> Self {
        Self(self.0.join(other))
    }

    fn normalize(&self) -> Self {
        let mut out = PathBuf::new();
        for component in self.0.components() {
            match component {
                Component::CurDir => {}
                Component::ParentDir => {
                    let can_pop =
                        matches!(out.components().next_back(), Some(Component::Normal(_)));
                    if can_pop {
                        out.pop();
                    } else if !self.0.is_absolute() {
                        out.push("..");
                    }
                }
                other => out.push(other),
            }
        }
        Self(out)
    }

    fn components(&self) -> Vec<String> {
        self.0
            .components()
            .filter_map(|component| match component {
                Component::Normal(name) => Some(name.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect()
    }

    fn is_absolute(&self) -> bool {
        self.0.is_absolute()
    }

    fn to_uri(&self) -> String {
        let absolute = if self.0.is_absolute() {
            self.0.clone()
        } else {
            std::env::current_dir().map_or_else(|_| self.0.clone(), |cwd| cwd.join(&self.0))
        };
        format!("file://{}", absolute.display())
    }
}

/// The host filesystem.
#[derive(Debug)]
pub struct HostFs {
    open: AtomicBool,
}

impl HostFs {
    /// A handle to the host filesystem.
    #[must_use]
    pub fn new() -> Self {
        Self {
            open: AtomicBool::new(true),
        }
    }
}

impl Default for HostFs {
    fn default() -> Self {
        Self::new()
    }
}

fn already_exists(path: &HostPath) -> io::Error {
    io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!("{path}: already exists"),
    )
}

fn remove_entry(path: &Path) -> io::Result<()> {
    if fs::symlink_metadata(path)?.is_dir() {
        fs::remove_dir(path)
    } else {
        fs::remove_file(path)
    }
}

/// Apply `source`'s times and permission bits to `target`.
fn copy_metadata(source: &fs::Metadata, target: &Path) -> io::Result<()> {
    let times = FileTimes::new()
        .set_accessed(source.accessed()?)
        .set_modified(source.modified()?);
    File::open(target)?.set_times(times)?;
    fs::set_permissions(target, source.permissions())
}

impl FilesystemOps for HostFs {
    type Path = HostPath;

    fn scheme(&self) -> &str {
        "file"
    }

    fn separator(&self) -> &str {
        "/"
    }

    fn path(&self, first: &str, more: &[&str]) -> io::Result<HostPath> {
        let mut path = PathBuf::from(first);
        for name in more {
            path.push(name);
        }
        if path.as_os_str().as_encoded_bytes().contains(&0) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "path contains a NUL byte",
            ));
        }
        Ok(HostPath(path))
    }

    fn root_directories(&self) -> Vec<HostPath> {
        vec![HostPath::new("/")]
    }

    fn supported_views(&self) -> AttributeViews {
        AttributeViews::BASIC | AttributeViews::OWNER | AttributeViews::POSIX | AttributeViews::UNIX
    }

    fn platform(&self) -> Platform {
        Platform::Posix
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    fn close(&self) -> io::Result<()> {
        self.open.store(false, Ordering::Release);
        Ok(())
    }

    fn open(&self, path: &HostPath, flags: OpenFlags) -> io::Result<Box<dyn ByteChannel>> {
        let writable = flags.intersects(OpenFlags::WRITE | OpenFlags::APPEND);
        let file = File::options()
            .read(flags.contains(OpenFlags::READ) || !writable)
            .write(flags.contains(OpenFlags::WRITE))
            .append(flags.contains(OpenFlags::APPEND))
            .create(flags.contains(OpenFlags::CREATE))
            .create_new(flags.contains(OpenFlags::CREATE_NEW))
            .truncate(writable && flags.contains(OpenFlags::TRUNCATE_EXISTING))
            .open(&path.0)?;
        Ok(Box::new(file))
    }

    fn read_dir(&self, dir: &HostPath) -> io::Result<Vec<HostPath>> {
        let mut entries = fs::read_dir(&dir.0)?
            .map(|entry| entry.map(|e| HostPath(e.path())))
            .collect::<io::Result<Vec<_>>>()?;
        entries.sort();
        Ok(entries)
    }

    fn create_dir(&self, dir: &HostPath) -> io::Result<()> {
        fs::create_dir(&dir.0)
    }

    fn create_file(&self, path: &HostPath) -> io::Result<()> {
        File::options()
            .write(true)
            .create_new(true)
            .open(&path.0)
            .map(drop)
    }

    fn delete(&self, path: &HostPath) -> io::Result<()> {
        remove_entry(&path.0)
    }

    fn exists(&self, path: &HostPath) -> bool {
        path.0.exists()
    }

    fn copy(&self, source: &HostPath, target: &HostPath, options: CopyOptions) -> io::Result<()> {
        if options.contains(CopyOptions::ATOMIC_MOVE) {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "atomic move is not a copy option",
            ));
        }
        let meta = fs::metadata(&source.0)?;
        if self.is_same_file(source, target).unwrap_or(false) {
            return Ok(());
        }
        if fs::symlink_metadata(&target.0).is_ok() {
            if !options.contains(CopyOptions::REPLACE_EXISTING) {
                return Err(already_exists(target));
            }
            remove_entry(&target.0)?;
        }

        if meta.is_dir() {
            fs::create_dir(&target.0)?;
        } else {
            fs::copy(&source.0, &target.0)?;
        }
        if options.contains(CopyOptions::COPY_ATTRIBUTES) {
            copy_metadata(&meta, &target.0)?;
        }
        Ok(())
    }

    fn rename(&self, source: &HostPath, target: &HostPath, options: CopyOptions) -> io::Result<()> {
        let atomic = options.contains(CopyOptions::ATOMIC_MOVE);
        if !atomic
            && !options.contains(CopyOptions::REPLACE_EXISTING)
            && fs::symlink_metadata(&target.0).is_ok()
        {
            return Err(already_exists(target));
        }

        match fs::rename(&source.0, &target.0) {
            Err(e) if !atomic && e.raw_os_error() == Some(libc::EXDEV) => {
                debug!(%source, %target, "cross-device move, falling back to copy and delete");
                self.copy(
                    source,
                    target,
                    CopyOptions::COPY_ATTRIBUTES | CopyOptions::REPLACE_EXISTING,
                )?;
                remove_entry(&source.0)
            }
            other => other,
        }
    }

    fn is_same_file(&self, a: &HostPath, b: &HostPath) -> io::Result<bool> {
        if a == b {
            return Ok(true);
        }
        let (ma, mb) = (fs::metadata(&a.0)?, fs::metadata(&b.0)?);
        Ok(ma.dev() == mb.dev() && ma.ino() == mb.ino())
    }

    fn is_hidden(&self, path: &HostPath) -> io::Result<bool> {
        Ok(path.file_name().is_some_and(|name| name.starts_with('.')))
    }

    fn check_access(&self, path: &HostPath, modes: AccessMode) -> io::Result<()> {
        let mut flags = AccessFlags::F_OK;
        if modes.contains(AccessMode::READ) {
            flags |= AccessFlags::R_OK;
        }
        if modes.contains(AccessMode::WRITE) {
            flags |= AccessFlags::W_OK;
        }
        if modes.contains(AccessMode::EXECUTE) {
            flags |= AccessFlags::X_OK;
        }
        nix::unistd::access(path.as_path(), flags).map_err(io::Error::from)
    }
}

fn user_principal(uid: u32) -> Principal {
    match User::from_uid(Uid::from_raw(uid)) {
        Ok(Some(user)) => Principal::with_id(user.name, uid),
        _ => Principal::with_id(uid.to_string(), uid),
    }
}

fn group_principal(gid: u32) -> Principal {
    match Group::from_gid(Gid::from_raw(gid)) {
        Ok(Some(group)) => Principal::with_id(group.name, gid),
        _ => Principal::with_id(gid.to_string(), gid),
    }
}

fn lookup_uid(principal: &Principal) -> io::Result<Uid> {
    if let Some(id) = principal.id {
        return Ok(Uid::from_raw(id));
    }
    match User::from_name(&principal.name).map_err(io::Error::from)? {
        Some(user) => Ok(user.uid),
        None => principal.name.parse().map(Uid::from_raw).map_err(|_| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no such user: {}", principal.name),
            )
        }),
    }
}

fn lookup_gid(principal: &Principal) -> io::Result<Gid> {
    if let Some(id) = principal.id {
        return Ok(Gid::from_raw(id));
    }
    match Group::from_name(&principal.name).map_err(io::Error::from)? {
        Some(group) => Ok(group.gid),
        None => principal.name.parse().map(Gid::from_raw).map_err(|_| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no such group: {}", principal.name),
            )
        }),
    }
}

/// Basic attributes from one `stat` result.
fn basic_from(meta: &Metadata) -> io::Result<BasicAttrs> {
    let file_type = meta.file_type();
    let modified = meta.modified()?;
    Ok(BasicAttrs {
        last_modified_time: modified.into(),
        last_access_time: meta.accessed()?.into(),
        creation_time: meta.created().unwrap_or(modified).into(),
        is_regular_file: file_type.is_file(),
        is_directory: file_type.is_dir(),
        is_symbolic_link: file_type.is_symlink(),
        is_other: !(file_type.is_file() || file_type.is_dir() || file_type.is_symlink()),
        size: meta.len(),
        file_key: Some(FileKey {
            device: meta.dev(),
            inode: meta.ino(),
        }),
    })
}

/// Attribute reads follow symbolic links, like the writes in `set_attribute` do, so a link
/// reports its target's attributes.
impl AttributeProvider for HostFs {
    fn read_basic(&self, path: &HostPath) -> Result<BasicAttrs, FsError> {
        Ok(basic_from(&fs::metadata(&path.0)?)?)
    }

    fn read_dos(&self, _path: &HostPath) -> Result<DosAttrs, FsError> {
        Err(FsError::UnsupportedAttributeFamily(AttributeFamily::Dos))
    }

    fn read_posix(&self, path: &HostPath) -> Result<PosixAttrs, FsError> {
        let meta = fs::metadata(&path.0)?;
        Ok(PosixAttrs {
            basic: basic_from(&meta)?,
            owner: user_principal(meta.uid()),
            group: group_principal(meta.gid()),
            permissions: PosixPermissions::from_mode(meta.mode()),
        })
    }

    fn set_attribute(&self, path: &HostPath, name: &str, value: AttrValue) -> Result<(), FsError> {
        let (view, attr) = split_attribute_name(name);
        match view {
            "basic" | "posix" | "owner" => {}
            "dos" => return Err(FsError::UnsupportedAttributeFamily(AttributeFamily::Dos)),
            _ => return Err(FsError::UnknownAttribute(name.to_owned())),
        }

        let wrong = |expected: &'static str| FsError::InvalidAttributeValue {
            name: name.to_owned(),
            expected,
        };
        let time = || value.as_time().ok_or_else(|| wrong("a file time"));
        let principal = || value.as_principal().ok_or_else(|| wrong("a principal"));

        match (view, attr) {
            ("basic" | "posix", "lastModifiedTime") => {
                let times = FileTimes::new().set_modified(time()?.into());
                File::open(&path.0)?.set_times(times)?;
            }
            ("basic" | "posix", "lastAccessTime") => {
                let times = FileTimes::new().set_accessed(time()?.into());
                File::open(&path.0)?.set_times(times)?;
            }
            ("basic" | "posix", "creationTime") => {
                time()?;
                debug!(%path, "creation time cannot be set on this platform, ignoring");
            }
            ("posix" | "owner", "owner") => {
                let uid = lookup_uid(principal()?)?;
                nix::unistd::chown(path.as_path(), Some(uid), None).map_err(io::Error::from)?;
            }
            ("posix", "group") => {
                let gid = lookup_gid(principal()?)?;
                nix::unistd::chown(path.as_path(), None, Some(gid)).map_err(io::Error::from)?;
            }
            ("posix", "permissions") => {
                let perms = value.as_permissions().ok_or_else(|| wrong("permissions"))?;
                let special = fs::metadata(&path.0)?.mode() & 0o7000;
                fs::set_permissions(&path.0, Permissions::from_mode(special | perms.mode()))?;
            }
            _ => {
                warn!(%path, attribute = name, "unknown attribute");
                return Err(FsError::UnknownAttribute(name.to_owned()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_collapses_dots() {
        let path = HostPath::new("/a/./b/../c");
        assert_eq!(path.normalize(), HostPath::new("/a/c"));

        let relative = HostPath::new("../x/./y/..");
        assert_eq!(relative.normalize(), HostPath::new("../x"));
    }

    #[test]
    fn relative_single_name_has_no_parent() {
        assert_eq!(HostPath::new("file.txt").parent(), None);
        assert_eq!(
            HostPath::new("/tmp/file.txt").parent(),
            Some(HostPath::new("/tmp"))
        );
    }

    #[test]
    fn posix_snapshot_carries_the_same_basic_fields() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.txt");
        std::fs::write(&file, b"hello").unwrap();
        let path = HostPath::new(&file);
        let fs = HostFs::new();

        let posix = fs.read_posix(&path).unwrap();
        assert_eq!(posix.basic, fs.read_basic(&path).unwrap());
        assert_eq!(posix.basic.size, 5);
        assert_eq!(posix.owner.id, Some(Uid::effective().as_raw()));
    }

    #[test]
    fn reads_follow_symbolic_links() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("target.txt");
        std::fs::write(&target, b"hello").unwrap();
        let link = dir.path().join("link");
        std::os::unix::fs::symlink(&target, &link).unwrap();

        let basic = HostFs::new().read_basic(&HostPath::new(&link)).unwrap();
        assert!(basic.is_regular_file);
        assert!(!basic.is_symbolic_link);
        assert_eq!(basic.size, 5);
    }
}
