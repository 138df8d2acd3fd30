//! In-memory filesystem with Windows-, Linux- or macOS-style attribute support.
//!
//! Every flavor keeps a working directory named `work` under its root; relative paths resolve
//! against it. Windows and macOS flavors look names up case-insensitively but remember the case an
//! entry was created with.
//!
//! Timestamp rules: creating an entry sets all three times to now, writing sets the modification
//! time, reading sets the access time. A copy gets fresh times unless asked to copy attributes; a
//! move keeps the entry, and with it every time.

use std::collections::BTreeMap;
use std::fmt;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::ops::Bound;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Mutex, MutexGuard};
use tracing::debug;

use crate::fs::attrs::{
    AttrValue, AttributeFamily, BasicAttrs, DosAttrs, FileKey, FileTime, PosixAttrs,
    PosixPermissions, Principal, split_attribute_name,
};
use crate::fs::error::FsError;
use crate::fs::traits::{AttributeProvider, ByteChannel, FilesystemOps, PathOps};
use crate::fs::{AccessMode, AttributeViews, CopyOptions, OpenFlags, Platform};

const WORK_DIR: &str = "work";
const WINDOWS_DRIVE: &str = "C:";
const WINDOWS_RESERVED: &[char] = &['<', '>', ':', '"', '|', '?', '*'];

/// Which operating system's filesystem conventions to emulate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MemFlavor {
    /// `C:\` root, `\` separator, DOS attributes, case-insensitive names.
    Windows,
    /// `/` root and separator, POSIX attributes.
    Unix,
    /// Like [`Unix`](Self::Unix), with case-insensitive names.
    OsX,
}

impl MemFlavor {
    fn separator(self) -> &'static str {
        match self {
            Self::Windows => "\\",
            Self::Unix | Self::OsX => "/",
        }
    }

    fn separators(self) -> &'static [char] {
        match self {
            Self::Windows => &['\\', '/'],
            Self::Unix | Self::OsX => &['/'],
        }
    }

    fn views(self) -> AttributeViews {
        match self {
            Self::Windows => {
                AttributeViews::BASIC
                    | AttributeViews::OWNER
                    | AttributeViews::DOS
                    | AttributeViews::ACL
                    | AttributeViews::USER
            }
            Self::Unix | Self::OsX => {
                AttributeViews::BASIC
                    | AttributeViews::OWNER
                    | AttributeViews::POSIX
                    | AttributeViews::UNIX
                    | AttributeViews::USER
            }
        }
    }

    fn platform(self) -> Platform {
        match self {
            Self::Windows => Platform::Windows,
            Self::Unix | Self::OsX => Platform::Posix,
        }
    }

    fn canonical(self, name: &str) -> String {
        match self {
            Self::Windows | Self::OsX => name.to_ascii_lowercase(),
            Self::Unix => name.to_owned(),
        }
    }
}

/// A path on a [`MemFs`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MemPath {
    flavor: MemFlavor,
    absolute: bool,
    parts: Vec<String>,
}

impl MemPath {
    fn split(flavor: MemFlavor, raw: &str) -> Self {
        let mut rest = raw;
        let mut absolute = false;

        if flavor == MemFlavor::Windows {
            let bytes = rest.as_bytes();
            if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
                rest = &rest[2..];
                absolute = true;
            }
        }
        if rest.starts_with(flavor.separators()) {
            absolute = true;
        }

        let parts = rest
            .split(flavor.separators())
            .filter(|name| !name.is_empty())
            .map(str::to_owned)
            .collect();
        Self {
            flavor,
            absolute,
            parts,
        }
    }

    fn parse(flavor: MemFlavor, raw: &str) -> io::Result<Self> {
        if flavor == MemFlavor::Windows {
            let bytes = raw.as_bytes();
            if bytes.len() >= 2
                && bytes[1] == b':'
                && !raw[..2].eq_ignore_ascii_case(WINDOWS_DRIVE)
            {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("{raw}: unknown drive"),
                ));
            }
        }

        let path = Self::split(flavor, raw);
        for name in &path.parts {
            let bad = name.contains('\0')
                || (flavor == MemFlavor::Windows && name.contains(WINDOWS_RESERVED));
            if bad {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("{raw}: illegal character in name {name:?}"),
                ));
            }
        }
        Ok(path)
    }

    fn with_parts(&self, parts: Vec<String>) -> Self {
        Self {
            flavor: self.flavor,
            absolute: self.absolute,
            parts,
        }
    }
}

impl fmt::Display for MemPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sep = self.flavor.separator();
        if self.absolute {
            if self.flavor == MemFlavor::Windows {
                f.write_str(WINDOWS_DRIVE)?;
            }
            f.write_str(sep)?;
        }
        f.write_str(&self.parts.join(sep))
    }
}

impl PathOps for MemPath {
    fn file_name(&self) -> Option<String> {
        self.parts.last().cloned()
    }

    fn parent(&self) -> Option<Self> {
        if self.parts.is_empty() || (!self.absolute && self.parts.len() == 1) {
            return None;
        }
        let mut parts = self.parts.clone();
        parts.pop();
        Some(self.with_parts(parts))
    }

    fn resolve(&self, other: &str) -> Self {
        let other = Self::split(self.flavor, other);
        if other.absolute {
            return other;
        }
        let mut parts = self.parts.clone();
        parts.extend(other.parts);
        self.with_parts(parts)
    }

    fn normalize(&self) -> Self {
        let mut parts: Vec<String> = Vec::with_capacity(self.parts.len());
        for name in &self.parts {
            match name.as_str() {
                "." => {}
                ".." => {
                    if parts.last().is_some_and(|last| last != "..") {
                        parts.pop();
                    } else if !self.absolute {
                        parts.push(name.clone());
                    }
                }
                _ => parts.push(name.clone()),
            }
        }
        self.with_parts(parts)
    }

    fn components(&self) -> Vec<String> {
        self.parts.clone()
    }

    fn is_absolute(&self) -> bool {
        self.absolute
    }

    fn to_uri(&self) -> String {
        let mut uri = String::from("mem:///");
        if self.flavor == MemFlavor::Windows {
            uri.push_str(WINDOWS_DRIVE);
            uri.push('/');
        }
        if !self.absolute {
            uri.push_str(WORK_DIR);
            uri.push('/');
        }
        uri.push_str(&self.parts.join("/"));
        uri
    }
}

type Key = Vec<String>;

#[derive(Debug, Clone, Copy, Default)]
struct DosFlags {
    read_only: bool,
    hidden: bool,
    archive: bool,
    system: bool,
}

#[derive(Debug, Clone)]
enum NodeKind {
    File(Vec<u8>),
    Dir,
}

#[derive(Debug, Clone)]
struct Node {
    name: String,
    kind: NodeKind,
    id: u64,
    created: FileTime,
    modified: FileTime,
    accessed: FileTime,
    dos: DosFlags,
    owner: Principal,
    group: Principal,
    permissions: PosixPermissions,
}

impl Node {
    fn new(id: u64, name: String, kind: NodeKind) -> Self {
        let now = FileTime::now();
        let permissions = match kind {
            NodeKind::File(_) => {
                PosixPermissions::OWNER_READ
                    | PosixPermissions::OWNER_WRITE
                    | PosixPermissions::GROUP_READ
                    | PosixPermissions::OTHERS_READ
            }
            NodeKind::Dir => {
                PosixPermissions::OWNER_RWX
                    | PosixPermissions::GROUP_READ
                    | PosixPermissions::GROUP_EXECUTE
                    | PosixPermissions::OTHERS_READ
                    | PosixPermissions::OTHERS_EXECUTE
            }
        };
        Self {
            name,
            kind,
            id,
            created: now,
            modified: now,
            accessed: now,
            dos: DosFlags::default(),
            owner: Principal::named("user"),
            group: Principal::named("group"),
            permissions,
        }
    }

    fn is_dir(&self) -> bool {
        matches!(self.kind, NodeKind::Dir)
    }

    fn basic(&self) -> BasicAttrs {
        let size = match &self.kind {
            NodeKind::File(data) => data.len() as u64,
            NodeKind::Dir => 0,
        };
        BasicAttrs {
            last_modified_time: self.modified,
            last_access_time: self.accessed,
            creation_time: self.created,
            is_regular_file: !self.is_dir(),
            is_directory: self.is_dir(),
            is_symbolic_link: false,
            is_other: false,
            size,
            file_key: Some(FileKey {
                device: 0,
                inode: self.id,
            }),
        }
    }
}

fn not_found(key: &Key) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("/{}: no such file or directory", key.join("/")),
    )
}

#[derive(Debug)]
struct Tree {
    nodes: BTreeMap<Key, Node>,
    next_id: u64,
}

impl Tree {
    fn new(flavor: MemFlavor) -> Self {
        let mut tree = Self {
            nodes: BTreeMap::new(),
            next_id: 1,
        };
        let root = tree.new_node(String::new(), NodeKind::Dir);
        tree.nodes.insert(Vec::new(), root);
        let work = tree.new_node(WORK_DIR.to_owned(), NodeKind::Dir);
        tree.nodes.insert(vec![flavor.canonical(WORK_DIR)], work);
        tree
    }

    fn new_node(&mut self, name: String, kind: NodeKind) -> Node {
        let id = self.next_id;
        self.next_id += 1;
        Node::new(id, name, kind)
    }

    fn node(&self, key: &Key) -> io::Result<&Node> {
        self.nodes.get(key).ok_or_else(|| not_found(key))
    }

    fn node_mut(&mut self, key: &Key) -> io::Result<&mut Node> {
        self.nodes.get_mut(key).ok_or_else(|| not_found(key))
    }

    /// Keys strictly below `dir`, in order.
    fn descendants(&self, dir: &Key) -> Vec<Key> {
        self.nodes
            .range::<Key, _>((Bound::Excluded(dir), Bound::Unbounded))
            .take_while(|(key, _)| key.starts_with(dir))
            .map(|(key, _)| key.clone())
            .collect()
    }

    fn has_children(&self, dir: &Key) -> bool {
        self.nodes
            .range::<Key, _>((Bound::Excluded(dir), Bound::Unbounded))
            .next()
            .is_some_and(|(key, _)| key.starts_with(dir))
    }

    fn require_parent_dir(&self, key: &Key) -> io::Result<()> {
        let Some((_, parent)) = key.split_last() else {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "the root has no parent",
            ));
        };
        let parent = parent.to_vec();
        if self.node(&parent)?.is_dir() {
            Ok(())
        } else {
            Err(io::Error::new(
                io::ErrorKind::NotADirectory,
                format!("/{}: not a directory", parent.join("/")),
            ))
        }
    }

    /// Make room for a copy or move onto `dst`.
    fn clear_target(&mut self, dst: &Key, options: CopyOptions) -> io::Result<()> {
        let Some(existing) = self.nodes.get(dst) else {
            return Ok(());
        };
        if !options.contains(CopyOptions::REPLACE_EXISTING) {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("/{}: already exists", dst.join("/")),
            ));
        }
        if existing.is_dir() && self.has_children(dst) {
            return Err(io::Error::new(
                io::ErrorKind::DirectoryNotEmpty,
                format!("/{}: directory not empty", dst.join("/")),
            ));
        }
        self.nodes.remove(dst);
        Ok(())
    }
}

/// An in-memory filesystem.
///
/// Clones are handles to the same storage.
#[derive(Clone)]
pub struct MemFs {
    flavor: MemFlavor,
    tree: Arc<Mutex<Tree>>,
    open: Arc<AtomicBool>,
}

impl MemFs {
    /// An empty filesystem of the given flavor.
    #[must_use]
    pub fn new(flavor: MemFlavor) -> Self {
        Self {
            flavor,
            tree: Arc::new(Mutex::new(Tree::new(flavor))),
            open: Arc::new(AtomicBool::new(true)),
        }
    }

    /// A Windows-style filesystem with Basic and Dos attributes.
    #[must_use]
    pub fn windows() -> Self {
        Self::new(MemFlavor::Windows)
    }

    /// A Linux-style filesystem with Basic and Posix attributes.
    #[must_use]
    pub fn unix() -> Self {
        Self::new(MemFlavor::Unix)
    }

    /// A macOS-style filesystem with Basic and Posix attributes.
    #[must_use]
    pub fn osx() -> Self {
        Self::new(MemFlavor::OsX)
    }

    /// The emulated conventions.
    #[must_use]
    pub fn flavor(&self) -> MemFlavor {
        self.flavor
    }

    fn lock(&self) -> io::Result<MutexGuard<'_, Tree>> {
        if !self.open.load(Ordering::Acquire) {
            return Err(io::Error::other("filesystem is closed"));
        }
        Ok(self.tree.lock())
    }

    /// The absolute, canonical lookup key for `path`.
    fn key(&self, path: &MemPath) -> Key {
        let mut key = if path.absolute {
            Vec::new()
        } else {
            vec![self.flavor.canonical(WORK_DIR)]
        };
        for name in &path.parts {
            match name.as_str() {
                "." => {}
                ".." => {
                    key.pop();
                }
                _ => key.push(self.flavor.canonical(name)),
            }
        }
        key
    }
}

impl fmt::Debug for MemFs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemFs")
            .field("flavor", &self.flavor)
            .field("open", &self.open.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

/// Largest file a [`MemFs`] holds; writes reaching past it fail with `InvalidInput`.
pub const MAX_FILE_SIZE: usize = 1 << 30;

struct MemChannel {
    tree: Arc<Mutex<Tree>>,
    key: Key,
    pos: u64,
    readable: bool,
    writable: bool,
    append: bool,
}

impl MemChannel {
    fn with_data<T>(
        &self,
        f: impl FnOnce(&mut Node) -> io::Result<T>,
    ) -> io::Result<T> {
        let mut tree = self.tree.lock();
        let node = tree.node_mut(&self.key)?;
        if node.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::IsADirectory,
                "channel refers to a directory",
            ));
        }
        f(node)
    }
}

impl Read for MemChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if !self.readable {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "channel not open for reading",
            ));
        }
        let pos = self.pos;
        let n = self.with_data(|node| {
            let NodeKind::File(data) = &node.kind else {
                return Ok(0);
            };
            let start = usize::try_from(pos).unwrap_or(usize::MAX).min(data.len());
            let n = (data.len() - start).min(buf.len());
            buf[..n].copy_from_slice(&data[start..start + n]);
            node.accessed = FileTime::now();
            Ok(n)
        })?;
        self.pos += n as u64;
        Ok(n)
    }
}

impl Write for MemChannel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !self.writable {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "channel not open for writing",
            ));
        }
        let (append, pos) = (self.append, self.pos);
        let end = self.with_data(|node| {
            let NodeKind::File(data) = &mut node.kind else {
                return Ok(0);
            };
            let too_large = || io::Error::new(io::ErrorKind::InvalidInput, "offset too large");
            let start = if append {
                data.len()
            } else {
                usize::try_from(pos).map_err(|_| too_large())?
            };
            let end = start.checked_add(buf.len()).ok_or_else(too_large)?;
            if end > MAX_FILE_SIZE {
                return Err(too_large());
            }
            if data.len() < end {
                data.resize(end, 0);
            }
            data[start..end].copy_from_slice(buf);
            node.modified = FileTime::now();
            Ok(end)
        })?;
        self.pos = end as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for MemChannel {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let len = self.size()?;
        let target = match pos {
            SeekFrom::Start(n) => i128::from(n),
            SeekFrom::End(delta) => i128::from(len) + i128::from(delta),
            SeekFrom::Current(delta) => i128::from(self.pos) + i128::from(delta),
        };
        self.pos = u64::try_from(target).map_err(|_| {
            io::Error::new(io::ErrorKind::InvalidInput, "seek to a negative offset")
        })?;
        Ok(self.pos)
    }
}

impl ByteChannel for MemChannel {
    fn size(&mut self) -> io::Result<u64> {
        self.with_data(|node| match &node.kind {
            NodeKind::File(data) => Ok(data.len() as u64),
            NodeKind::Dir => Ok(0),
        })
    }
}

impl FilesystemOps for MemFs {
    type Path = MemPath;

    fn scheme(&self) -> &str {
        "mem"
    }

    fn separator(&self) -> &str {
        self.flavor.separator()
    }

    fn path(&self, first: &str, more: &[&str]) -> io::Result<MemPath> {
        let sep = self.flavor.separator();
        let mut raw = first.to_owned();
        for name in more.iter().filter(|name| !name.is_empty()) {
            if !raw.is_empty() {
                raw.push_str(sep);
            }
            raw.push_str(name);
        }
        MemPath::parse(self.flavor, &raw)
    }

    fn root_directories(&self) -> Vec<MemPath> {
        vec![MemPath {
            flavor: self.flavor,
            absolute: true,
            parts: Vec::new(),
        }]
    }

    fn supported_views(&self) -> AttributeViews {
        self.flavor.views()
    }

    fn platform(&self) -> Platform {
        self.flavor.platform()
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    fn close(&self) -> io::Result<()> {
        if self.open.swap(false, Ordering::AcqRel) {
            debug!(flavor = ?self.flavor, "in-memory filesystem closed");
        }
        Ok(())
    }

    fn open(&self, path: &MemPath, flags: OpenFlags) -> io::Result<Box<dyn ByteChannel>> {
        let key = self.key(path);
        let writable = flags.intersects(OpenFlags::WRITE | OpenFlags::APPEND);
        let readable = flags.contains(OpenFlags::READ) || !writable;

        let mut tree = self.lock()?;
        match tree.nodes.get_mut(&key) {
            Some(_) if flags.contains(OpenFlags::CREATE_NEW) => {
                return Err(io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    format!("{path}: already exists"),
                ));
            }
            Some(node) => {
                if node.is_dir() {
                    return Err(io::Error::new(
                        io::ErrorKind::IsADirectory,
                        format!("{path}: is a directory"),
                    ));
                }
                if writable && flags.contains(OpenFlags::TRUNCATE_EXISTING) {
                    node.kind = NodeKind::File(Vec::new());
                    node.modified = FileTime::now();
                }
            }
            None if flags.intersects(OpenFlags::CREATE | OpenFlags::CREATE_NEW) && writable => {
                tree.require_parent_dir(&key)?;
                let name = path.file_name().unwrap_or_default();
                let node = tree.new_node(name, NodeKind::File(Vec::new()));
                tree.nodes.insert(key.clone(), node);
            }
            None => return Err(not_found(&key)),
        }
        drop(tree);

        Ok(Box::new(MemChannel {
            tree: Arc::clone(&self.tree),
            key,
            pos: 0,
            readable,
            writable,
            append: flags.contains(OpenFlags::APPEND),
        }))
    }

    fn read_dir(&self, dir: &MemPath) -> io::Result<Vec<MemPath>> {
        let key = self.key(dir);
        let tree = self.lock()?;
        if !tree.node(&key)?.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::NotADirectory,
                format!("{dir}: not a directory"),
            ));
        }
        let entries = tree
            .descendants(&key)
            .into_iter()
            .filter(|child| child.len() == key.len() + 1)
            .filter_map(|child| tree.nodes.get(&child))
            .map(|node| {
                let mut parts = dir.parts.clone();
                parts.push(node.name.clone());
                dir.with_parts(parts)
            })
            .collect();
        Ok(entries)
    }

    fn create_dir(&self, dir: &MemPath) -> io::Result<()> {
        let key = self.key(dir);
        let mut tree = self.lock()?;
        if tree.nodes.contains_key(&key) {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{dir}: already exists"),
            ));
        }
        tree.require_parent_dir(&key)?;
        let node = tree.new_node(dir.file_name().unwrap_or_default(), NodeKind::Dir);
        tree.nodes.insert(key, node);
        Ok(())
    }

    fn delete(&self, path: &MemPath) -> io::Result<()> {
        let key = self.key(path);
        let mut tree = self.lock()?;
        if key.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "cannot delete the root",
            ));
        }
        if tree.node(&key)?.is_dir() && tree.has_children(&key) {
            return Err(io::Error::new(
                io::ErrorKind::DirectoryNotEmpty,
                format!("{path}: directory not empty"),
            ));
        }
        tree.nodes.remove(&key);
        Ok(())
    }

    fn exists(&self, path: &MemPath) -> bool {
        self.lock()
            .is_ok_and(|tree| tree.nodes.contains_key(&self.key(path)))
    }

    fn copy(&self, source: &MemPath, target: &MemPath, options: CopyOptions) -> io::Result<()> {
        if options.contains(CopyOptions::ATOMIC_MOVE) {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "atomic move is not a copy option",
            ));
        }
        let (src, dst) = (self.key(source), self.key(target));
        let mut tree = self.lock()?;
        let original = tree.node(&src)?.clone();
        if src == dst {
            return Ok(());
        }
        tree.clear_target(&dst, options)?;
        tree.require_parent_dir(&dst)?;

        let kind = match original.kind {
            NodeKind::File(ref data) => NodeKind::File(data.clone()),
            NodeKind::Dir => NodeKind::Dir,
        };
        let mut copied = tree.new_node(target.file_name().unwrap_or_default(), kind);
        if options.contains(CopyOptions::COPY_ATTRIBUTES) {
            copied.created = original.created;
            copied.modified = original.modified;
            copied.accessed = original.accessed;
            copied.dos = original.dos;
            copied.owner = original.owner;
            copied.group = original.group;
            copied.permissions = original.permissions;
        }
        tree.nodes.insert(dst, copied);
        Ok(())
    }

    fn rename(&self, source: &MemPath, target: &MemPath, options: CopyOptions) -> io::Result<()> {
        let (src, dst) = (self.key(source), self.key(target));
        let mut tree = self.lock()?;
        tree.node(&src)?;
        if src.is_empty() {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "cannot move the root"));
        }
        if src != dst {
            if dst.starts_with(&src) {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("cannot move {source} into itself"),
                ));
            }
            tree.clear_target(&dst, options)?;
            tree.require_parent_dir(&dst)?;

            let mut moving = vec![src.clone()];
            moving.extend(tree.descendants(&src));
            for old in moving {
                if let Some(node) = tree.nodes.remove(&old) {
                    let mut new_key = dst.clone();
                    new_key.extend_from_slice(&old[src.len()..]);
                    tree.nodes.insert(new_key, node);
                }
            }
        }
        tree.node_mut(&dst)?.name = target.file_name().unwrap_or_default();
        Ok(())
    }

    fn is_same_file(&self, a: &MemPath, b: &MemPath) -> io::Result<bool> {
        let (ka, kb) = (self.key(a), self.key(b));
        if ka == kb {
            return Ok(true);
        }
        let tree = self.lock()?;
        Ok(tree.node(&ka)?.id == tree.node(&kb)?.id)
    }

    fn is_hidden(&self, path: &MemPath) -> io::Result<bool> {
        match self.flavor.platform() {
            Platform::Windows => Ok(self.lock()?.node(&self.key(path))?.dos.hidden),
            Platform::Posix => Ok(path.file_name().is_some_and(|name| name.starts_with('.'))),
        }
    }

    fn check_access(&self, path: &MemPath, modes: AccessMode) -> io::Result<()> {
        let tree = self.lock()?;
        let node = tree.node(&self.key(path))?;
        let denied = match self.flavor.platform() {
            Platform::Windows => modes.contains(AccessMode::WRITE) && node.dos.read_only,
            Platform::Posix => [
                (AccessMode::READ, PosixPermissions::OWNER_READ),
                (AccessMode::WRITE, PosixPermissions::OWNER_WRITE),
                (AccessMode::EXECUTE, PosixPermissions::OWNER_EXECUTE),
            ]
            .into_iter()
            .any(|(mode, bit)| modes.contains(mode) && !node.permissions.contains(bit)),
        };
        if denied {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("{path}: access denied"),
            ));
        }
        Ok(())
    }
}

impl AttributeProvider for MemFs {
    fn read_basic(&self, path: &MemPath) -> Result<BasicAttrs, FsError> {
        Ok(self.lock()?.node(&self.key(path))?.basic())
    }

    fn read_dos(&self, path: &MemPath) -> Result<DosAttrs, FsError> {
        if !self.flavor.views().contains(AttributeViews::DOS) {
            return Err(FsError::UnsupportedAttributeFamily(AttributeFamily::Dos));
        }
        let tree = self.lock()?;
        let node = tree.node(&self.key(path))?;
        Ok(DosAttrs {
            basic: node.basic(),
            read_only: node.dos.read_only,
            hidden: node.dos.hidden,
            archive: node.dos.archive,
            system: node.dos.system,
        })
    }

    fn read_posix(&self, path: &MemPath) -> Result<PosixAttrs, FsError> {
        if !self.flavor.views().contains(AttributeViews::POSIX) {
            return Err(FsError::UnsupportedAttributeFamily(AttributeFamily::Posix));
        }
        let tree = self.lock()?;
        let node = tree.node(&self.key(path))?;
        Ok(PosixAttrs {
            basic: node.basic(),
            owner: node.owner.clone(),
            group: node.group.clone(),
            permissions: node.permissions,
        })
    }

    fn set_attribute(&self, path: &MemPath, name: &str, value: AttrValue) -> Result<(), FsError> {
        let (view, attr) = split_attribute_name(name);
        let views = self.flavor.views();
        match view {
            "basic" => {}
            "dos" if views.contains(AttributeViews::DOS) => {}
            "posix" if views.contains(AttributeViews::POSIX) => {}
            "owner" if views.contains(AttributeViews::OWNER) => {}
            "dos" => return Err(FsError::UnsupportedAttributeFamily(AttributeFamily::Dos)),
            "posix" => return Err(FsError::UnsupportedAttributeFamily(AttributeFamily::Posix)),
            _ => return Err(FsError::UnknownAttribute(name.to_owned())),
        }

        let wrong = |expected: &'static str| FsError::InvalidAttributeValue {
            name: name.to_owned(),
            expected,
        };
        let time = || value.as_time().ok_or_else(|| wrong("a file time"));
        let flag = || value.as_bool().ok_or_else(|| wrong("a boolean"));
        let principal = || value.as_principal().cloned().ok_or_else(|| wrong("a principal"));

        let mut tree = self.lock()?;
        let node = tree.node_mut(&self.key(path))?;
        match (view, attr) {
            ("basic" | "dos" | "posix", "lastModifiedTime") => node.modified = time()?,
            ("basic" | "dos" | "posix", "lastAccessTime") => node.accessed = time()?,
            ("basic" | "dos" | "posix", "creationTime") => node.created = time()?,
            ("dos", "readonly") => node.dos.read_only = flag()?,
            ("dos", "hidden") => node.dos.hidden = flag()?,
            ("dos", "archive") => node.dos.archive = flag()?,
            ("dos", "system") => node.dos.system = flag()?,
            ("posix" | "owner", "owner") => node.owner = principal()?,
            ("posix", "group") => node.group = principal()?,
            ("posix", "permissions") => {
                node.permissions = value
                    .as_permissions()
                    .ok_or_else(|| wrong("permissions"))?;
            }
            _ => return Err(FsError::UnknownAttribute(name.to_owned())),
        }
        Ok(())
    }
}
