//! Structured attribute snapshots and their flattened name/value form.
//!
//! A snapshot holds one [`AttributeFamily`]'s complete field set, captured by a single backing
//! read. Flattening a snapshot yields an [`AttributeMap`] keyed by the attribute names callers use
//! in queries (`lastModifiedTime`, `dos:hidden`, `posix:owner`, ...).

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bitflags::bitflags;
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::fs::AttributeViews;
use crate::fs::error::FsError;

/// The attribute families a caching path keeps snapshots for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AttributeFamily {
    /// Timestamps, entry kind, size and file key.
    Basic,
    /// Basic plus the DOS flags.
    Dos,
    /// Basic plus owner, group and permission bits.
    Posix,
}

impl AttributeFamily {
    /// Every family, in cache order.
    pub const ALL: [Self; 3] = [Self::Basic, Self::Dos, Self::Posix];

    /// The wildcard selector that names this family's full field set.
    #[must_use]
    pub fn selector(self) -> &'static str {
        match self {
            Self::Basic => "*",
            Self::Dos => "dos:*",
            Self::Posix => "posix:*",
        }
    }

    /// The view name a backing filesystem uses for this family.
    #[must_use]
    pub fn view_name(self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::Dos => "dos",
            Self::Posix => "posix",
        }
    }

    /// The capability flag a backing filesystem must report to serve this family.
    #[must_use]
    pub fn view(self) -> AttributeViews {
        match self {
            Self::Basic => AttributeViews::BASIC,
            Self::Dos => AttributeViews::DOS,
            Self::Posix => AttributeViews::POSIX,
        }
    }

    /// Pick the family an attribute name or selector belongs to.
    ///
    /// A `dos` prefix means Dos, a `posix` prefix means Posix, anything else is Basic. The
    /// optional `basic:` qualifier is ignored.
    #[must_use]
    pub fn for_name(name: &str) -> Self {
        let name = strip_basic(name);
        if name.starts_with("dos") {
            Self::Dos
        } else if name.starts_with("posix") {
            Self::Posix
        } else {
            Self::Basic
        }
    }

    /// Every family whose snapshot carries the field `name` writes.
    ///
    /// Basic fields live in all three snapshots. The `owner:owner` alias writes the Posix owner.
    #[must_use]
    pub fn holding(name: &str) -> &'static [Self] {
        match split_attribute_name(strip_basic(name)) {
            ("basic" | "dos" | "posix", attr) if BASIC_NAMES.contains(&attr) => &Self::ALL,
            ("owner", "owner") => &[Self::Posix],
            _ => match Self::for_name(name) {
                Self::Basic => &[Self::Basic],
                Self::Dos => &[Self::Dos],
                Self::Posix => &[Self::Posix],
            },
        }
    }

    /// The family a write to `name` re-reads in full: the one `name` is qualified with, or the
    /// family the field actually lives in when the qualifier is an alias.
    #[must_use]
    pub fn refreshed_by(name: &str) -> Self {
        let named = Self::for_name(name);
        let holding = Self::holding(name);
        if holding.contains(&named) {
            named
        } else {
            holding.first().copied().unwrap_or(named)
        }
    }

    /// Map a wildcard selector onto its family.
    ///
    /// Returns `None` for selectors that name a single field rather than a whole family.
    #[must_use]
    pub fn from_selector(selector: &str) -> Option<Self> {
        let selector = strip_basic(selector);
        if !selector.contains('*') {
            return None;
        }
        Some(Self::for_name(selector))
    }
}

impl fmt::Display for AttributeFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.view_name())
    }
}

/// Flattened names of the Basic fields, as they appear in every family's map.
const BASIC_NAMES: [&str; 9] = [
    "lastModifiedTime",
    "lastAccessTime",
    "creationTime",
    "regularFile",
    "directory",
    "symbolicLink",
    "other",
    "size",
    "fileKey",
];

/// Strip everything up to and including the first `basic:`.
pub(crate) fn strip_basic(name: &str) -> &str {
    match name.find("basic:") {
        Some(idx) => &name[idx + "basic:".len()..],
        None => name,
    }
}

/// Split a qualified attribute name into `(view, attribute)`, defaulting the view to `basic`.
#[must_use]
pub fn split_attribute_name(name: &str) -> (&str, &str) {
    match name.split_once(':') {
        Some((view, attr)) => (view, attr),
        None => ("basic", name),
    }
}

/// A raw value that could not be parsed into an attribute value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot parse {raw:?} as {expected}")]
pub struct ParseValueError {
    /// The rejected input.
    pub raw: String,
    /// What the input should have looked like.
    pub expected: &'static str,
}

impl ParseValueError {
    fn new(raw: &str, expected: &'static str) -> Self {
        Self {
            raw: raw.to_owned(),
            expected,
        }
    }
}

const NANOS_PER_MILLI: i128 = 1_000_000;

/// A file timestamp with at least millisecond resolution. Pre-epoch values are allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileTime(SystemTime);

impl FileTime {
    /// The current wall-clock time.
    #[must_use]
    pub fn now() -> Self {
        Self(SystemTime::now())
    }

    /// A time `millis` milliseconds from the Unix epoch. Negative values lie before it.
    #[must_use]
    pub fn from_unix_millis(millis: i64) -> Self {
        let offset = Duration::from_millis(millis.unsigned_abs());
        if millis >= 0 {
            Self(UNIX_EPOCH + offset)
        } else {
            Self(UNIX_EPOCH - offset)
        }
    }

    /// Milliseconds from the Unix epoch, truncated toward zero.
    #[must_use]
    pub fn to_unix_millis(self) -> i64 {
        match self.0.duration_since(UNIX_EPOCH) {
            Ok(after) => i64::try_from(after.as_millis()).unwrap_or(i64::MAX),
            Err(before) => i64::try_from(before.duration().as_millis()).map_or(i64::MIN, |ms| -ms),
        }
    }

    /// The underlying system time.
    #[must_use]
    pub fn as_system_time(self) -> SystemTime {
        self.0
    }

    /// This time as a UTC date-time, or `None` outside the range `time` represents.
    #[must_use]
    pub fn to_offset_date_time(self) -> Option<OffsetDateTime> {
        let nanos = i128::from(self.to_unix_millis()) * NANOS_PER_MILLI;
        OffsetDateTime::from_unix_timestamp_nanos(nanos).ok()
    }
}

impl From<SystemTime> for FileTime {
    fn from(value: SystemTime) -> Self {
        Self(value)
    }
}

impl From<FileTime> for SystemTime {
    fn from(value: FileTime) -> Self {
        value.0
    }
}

impl TryFrom<OffsetDateTime> for FileTime {
    type Error = ParseValueError;

    fn try_from(value: OffsetDateTime) -> Result<Self, Self::Error> {
        let millis = value.unix_timestamp_nanos().div_euclid(NANOS_PER_MILLI);
        i64::try_from(millis)
            .map(Self::from_unix_millis)
            .map_err(|_| ParseValueError::new(&value.to_string(), "a time within range"))
    }
}

impl fmt::Display for FileTime {
    /// RFC 3339 in UTC, falling back to epoch milliseconds for years RFC 3339 cannot express.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_offset_date_time().map(|dt| dt.format(&Rfc3339)) {
            Some(Ok(formatted)) => f.write_str(&formatted),
            _ => write!(f, "{}", self.to_unix_millis()),
        }
    }
}

impl FromStr for FileTime {
    type Err = ParseValueError;

    /// Accepts either epoch milliseconds or an RFC 3339 timestamp such as `1970-01-01T19:34:27Z`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        const EXPECTED: &str = "epoch millis or an RFC 3339 time like 1970-01-01T00:00:00Z";

        if let Ok(millis) = s.parse::<i64>() {
            return Ok(Self::from_unix_millis(millis));
        }
        let parsed =
            OffsetDateTime::parse(s, &Rfc3339).map_err(|_| ParseValueError::new(s, EXPECTED))?;
        Self::try_from(parsed)
    }
}

/// A user or group principal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Principal {
    /// The principal's name.
    pub name: String,
    /// The numeric id, when the backing filesystem has one.
    pub id: Option<u32>,
}

impl Principal {
    /// A principal known only by name.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: None,
        }
    }

    /// A principal with both a name and a numeric id.
    #[must_use]
    pub fn with_id(name: impl Into<String>, id: u32) -> Self {
        Self {
            name: name.into(),
            id: Some(id),
        }
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

bitflags! {
    /// The nine POSIX permission bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PosixPermissions: u16 {
        /// Other: execute permission.
        const OTHERS_EXECUTE = 0o001;
        /// Other: write permission.
        const OTHERS_WRITE   = 0o002;
        /// Other: read permission.
        const OTHERS_READ    = 0o004;

        /// Group: execute permission.
        const GROUP_EXECUTE  = 0o010;
        /// Group: write permission.
        const GROUP_WRITE    = 0o020;
        /// Group: read permission.
        const GROUP_READ     = 0o040;

        /// Owner: execute permission.
        const OWNER_EXECUTE  = 0o100;
        /// Owner: write permission.
        const OWNER_WRITE    = 0o200;
        /// Owner: read permission.
        const OWNER_READ     = 0o400;

        /// Other: read, write, and execute.
        const OTHERS_RWX = Self::OTHERS_READ.bits()
            | Self::OTHERS_WRITE.bits()
            | Self::OTHERS_EXECUTE.bits();
        /// Group: read, write, and execute.
        const GROUP_RWX = Self::GROUP_READ.bits()
            | Self::GROUP_WRITE.bits()
            | Self::GROUP_EXECUTE.bits();
        /// Owner: read, write, and execute.
        const OWNER_RWX = Self::OWNER_READ.bits()
            | Self::OWNER_WRITE.bits()
            | Self::OWNER_EXECUTE.bits();
    }
}

impl PosixPermissions {
    /// Extract the permission bits from a `st_mode`, ignoring file type and special bits.
    #[must_use]
    pub fn from_mode(mode: u32) -> Self {
        Self::from_bits_truncate(u16::try_from(mode & 0o777).unwrap_or_default())
    }

    /// The permission bits as a mode value.
    #[must_use]
    pub fn mode(self) -> u32 {
        u32::from(self.bits())
    }
}

const RWX_ORDER: [(PosixPermissions, char); 9] = [
    (PosixPermissions::OWNER_READ, 'r'),
    (PosixPermissions::OWNER_WRITE, 'w'),
    (PosixPermissions::OWNER_EXECUTE, 'x'),
    (PosixPermissions::GROUP_READ, 'r'),
    (PosixPermissions::GROUP_WRITE, 'w'),
    (PosixPermissions::GROUP_EXECUTE, 'x'),
    (PosixPermissions::OTHERS_READ, 'r'),
    (PosixPermissions::OTHERS_WRITE, 'w'),
    (PosixPermissions::OTHERS_EXECUTE, 'x'),
];

impl fmt::Display for PosixPermissions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (bit, ch) in RWX_ORDER {
            let out = if self.contains(bit) { ch } else { '-' };
            fmt::Write::write_char(f, out)?;
        }
        Ok(())
    }
}

impl FromStr for PosixPermissions {
    type Err = ParseValueError;

    /// Accepts `rwxr-x---` style strings or octal modes such as `750`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        const EXPECTED: &str = "permissions like rwxr-x--- or 750";

        if s.len() == 9 && s.chars().all(|c| matches!(c, 'r' | 'w' | 'x' | '-')) {
            let mut perms = Self::empty();
            for ((bit, want), got) in RWX_ORDER.iter().zip(s.chars()) {
                if got == *want {
                    perms |= *bit;
                } else if got != '-' {
                    return Err(ParseValueError::new(s, EXPECTED));
                }
            }
            return Ok(perms);
        }

        let mode = u32::from_str_radix(s, 8).map_err(|_| ParseValueError::new(s, EXPECTED))?;
        if mode > 0o777 {
            return Err(ParseValueError::new(s, EXPECTED));
        }
        Ok(Self::from_mode(mode))
    }
}

/// An opaque identity for a file, stable across renames on the same device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileKey {
    /// Device the file lives on.
    pub device: u64,
    /// Inode (or equivalent) within that device.
    pub inode: u64,
}

impl fmt::Display for FileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(dev={:x},ino={})", self.device, self.inode)
    }
}

/// Basic attributes shared by every family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicAttrs {
    /// Time of last content modification.
    pub last_modified_time: FileTime,
    /// Time of last content access.
    pub last_access_time: FileTime,
    /// Time of creation.
    pub creation_time: FileTime,
    /// The entry is a regular file.
    pub is_regular_file: bool,
    /// The entry is a directory.
    pub is_directory: bool,
    /// The entry is a symbolic link.
    pub is_symbolic_link: bool,
    /// The entry is something else (device, fifo, socket).
    pub is_other: bool,
    /// Size in bytes.
    pub size: u64,
    /// Identity of the file, if the backing filesystem has one.
    pub file_key: Option<FileKey>,
}

/// Basic attributes plus the DOS flags, captured together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DosAttrs {
    /// The basic sub-snapshot from the same read.
    pub basic: BasicAttrs,
    /// Read-only flag.
    pub read_only: bool,
    /// Hidden flag.
    pub hidden: bool,
    /// Archive flag.
    pub archive: bool,
    /// System flag.
    pub system: bool,
}

/// Basic attributes plus ownership and permissions, captured together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PosixAttrs {
    /// The basic sub-snapshot from the same read.
    pub basic: BasicAttrs,
    /// Owning user.
    pub owner: Principal,
    /// Owning group.
    pub group: Principal,
    /// Permission bits.
    pub permissions: PosixPermissions,
}

/// One family's complete attribute set at one point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeSnapshot {
    /// A Basic snapshot.
    Basic(BasicAttrs),
    /// A Dos snapshot.
    Dos(DosAttrs),
    /// A Posix snapshot.
    Posix(PosixAttrs),
}

impl AttributeSnapshot {
    /// The family this snapshot belongs to.
    #[must_use]
    pub fn family(&self) -> AttributeFamily {
        match self {
            Self::Basic(_) => AttributeFamily::Basic,
            Self::Dos(_) => AttributeFamily::Dos,
            Self::Posix(_) => AttributeFamily::Posix,
        }
    }

    /// The basic fields, present in every family.
    #[must_use]
    pub fn basic(&self) -> &BasicAttrs {
        match self {
            Self::Basic(basic) => basic,
            Self::Dos(dos) => &dos.basic,
            Self::Posix(posix) => &posix.basic,
        }
    }

    /// The Dos view of this snapshot, if it is one.
    #[must_use]
    pub fn as_dos(&self) -> Option<&DosAttrs> {
        match self {
            Self::Dos(dos) => Some(dos),
            _ => None,
        }
    }

    /// The Posix view of this snapshot, if it is one.
    #[must_use]
    pub fn as_posix(&self) -> Option<&PosixAttrs> {
        match self {
            Self::Posix(posix) => Some(posix),
            _ => None,
        }
    }

    /// Flatten into a name/value map.
    ///
    /// Basic fields are keyed by their bare names. Dos and Posix fields carry their view prefix.
    #[must_use]
    pub fn to_map(&self) -> AttributeMap {
        let basic = self.basic();
        let mut map = AttributeMap::new();
        map.insert("lastModifiedTime".into(), basic.last_modified_time.into());
        map.insert("lastAccessTime".into(), basic.last_access_time.into());
        map.insert("creationTime".into(), basic.creation_time.into());
        map.insert("regularFile".into(), basic.is_regular_file.into());
        map.insert("directory".into(), basic.is_directory.into());
        map.insert("symbolicLink".into(), basic.is_symbolic_link.into());
        map.insert("other".into(), basic.is_other.into());
        map.insert("size".into(), AttrValue::Size(basic.size));
        map.insert("fileKey".into(), AttrValue::FileKey(basic.file_key));

        match self {
            Self::Basic(_) => {}
            Self::Dos(dos) => {
                map.insert("dos:readonly".into(), dos.read_only.into());
                map.insert("dos:hidden".into(), dos.hidden.into());
                map.insert("dos:archive".into(), dos.archive.into());
                map.insert("dos:system".into(), dos.system.into());
            }
            Self::Posix(posix) => {
                map.insert("posix:owner".into(), posix.owner.clone().into());
                map.insert("posix:group".into(), posix.group.clone().into());
                map.insert("posix:permissions".into(), posix.permissions.into());
            }
        }
        map
    }
}

impl From<BasicAttrs> for AttributeSnapshot {
    fn from(value: BasicAttrs) -> Self {
        Self::Basic(value)
    }
}

impl From<DosAttrs> for AttributeSnapshot {
    fn from(value: DosAttrs) -> Self {
        Self::Dos(value)
    }
}

impl From<PosixAttrs> for AttributeSnapshot {
    fn from(value: PosixAttrs) -> Self {
        Self::Posix(value)
    }
}

/// A single attribute value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrValue {
    /// A timestamp.
    Time(FileTime),
    /// A flag.
    Bool(bool),
    /// A byte count.
    Size(u64),
    /// A file identity, explicitly absent when the backing filesystem has none.
    FileKey(Option<FileKey>),
    /// A user or group.
    Principal(Principal),
    /// Permission bits.
    Permissions(PosixPermissions),
}

impl AttrValue {
    /// The timestamp, if this is one.
    #[must_use]
    pub fn as_time(&self) -> Option<FileTime> {
        match self {
            Self::Time(t) => Some(*t),
            _ => None,
        }
    }

    /// The flag, if this is one.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The byte count, if this is one.
    #[must_use]
    pub fn as_size(&self) -> Option<u64> {
        match self {
            Self::Size(s) => Some(*s),
            _ => None,
        }
    }

    /// The principal, if this is one.
    #[must_use]
    pub fn as_principal(&self) -> Option<&Principal> {
        match self {
            Self::Principal(p) => Some(p),
            _ => None,
        }
    }

    /// The permission bits, if this is one.
    #[must_use]
    pub fn as_permissions(&self) -> Option<PosixPermissions> {
        match self {
            Self::Permissions(p) => Some(*p),
            _ => None,
        }
    }

    /// Parse a raw string into the value type the named attribute takes.
    ///
    /// `name` may be qualified (`dos:hidden`) or bare (`lastModifiedTime`).
    ///
    /// # Errors
    ///
    /// [`FsError::UnknownAttribute`] if `name` is not a settable attribute and
    /// [`FsError::InvalidAttributeValue`] if `raw` does not parse.
    pub fn parse_for_attribute(name: &str, raw: &str) -> Result<Self, FsError> {
        let (view, attr) = split_attribute_name(name);
        let invalid = |err: ParseValueError| FsError::InvalidAttributeValue {
            name: name.to_owned(),
            expected: err.expected,
        };

        match (view, attr) {
            ("basic" | "dos" | "posix", "lastModifiedTime" | "lastAccessTime" | "creationTime") => {
                raw.parse::<FileTime>().map(Self::Time).map_err(invalid)
            }
            ("dos", "readonly" | "hidden" | "archive" | "system") => raw
                .parse::<bool>()
                .map(Self::Bool)
                .map_err(|_| invalid(ParseValueError::new(raw, "true or false"))),
            ("posix", "owner" | "group") => Ok(Self::Principal(Principal::named(raw))),
            ("posix", "permissions") => raw
                .parse::<PosixPermissions>()
                .map(Self::Permissions)
                .map_err(invalid),
            _ => Err(FsError::UnknownAttribute(name.to_owned())),
        }
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Time(t) => t.fmt(f),
            Self::Bool(b) => b.fmt(f),
            Self::Size(s) => s.fmt(f),
            Self::FileKey(Some(key)) => key.fmt(f),
            Self::FileKey(None) => f.write_str("null"),
            Self::Principal(p) => p.fmt(f),
            Self::Permissions(p) => p.fmt(f),
        }
    }
}

impl From<FileTime> for AttrValue {
    fn from(value: FileTime) -> Self {
        Self::Time(value)
    }
}

impl From<bool> for AttrValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<Principal> for AttrValue {
    fn from(value: Principal) -> Self {
        Self::Principal(value)
    }
}

impl From<PosixPermissions> for AttrValue {
    fn from(value: PosixPermissions) -> Self {
        Self::Permissions(value)
    }
}

/// Flattened attributes, keyed by attribute name.
pub type AttributeMap = BTreeMap<String, AttrValue>;

/// A parsed attribute query: either a family wildcard or a single field name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeQuery {
    name: String,
    family: AttributeFamily,
}

impl AttributeQuery {
    /// Normalize `raw` by stripping the `basic:` qualifier and pick its family.
    ///
    /// # Errors
    ///
    /// [`FsError::MalformedAttributeQuery`] for an empty query.
    pub fn parse(raw: &str) -> Result<Self, FsError> {
        let name = strip_basic(raw.trim());
        if name.is_empty() {
            return Err(FsError::MalformedAttributeQuery(raw.to_owned()));
        }
        Ok(Self {
            name: name.to_owned(),
            family: AttributeFamily::for_name(name),
        })
    }

    /// The normalized name, without any `basic:` qualifier.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The family whose snapshot answers this query.
    #[must_use]
    pub fn family(&self) -> AttributeFamily {
        self.family
    }

    /// Whether the query asks for every field of its family.
    #[must_use]
    pub fn is_wildcard(&self) -> bool {
        self.name.contains('*')
    }

    /// Apply the query to a flattened snapshot, returning `None` when nothing matches.
    #[must_use]
    pub fn select(&self, mut map: AttributeMap) -> Option<AttributeMap> {
        if !self.is_wildcard() {
            map.retain(|key, _| *key == self.name);
        }
        (!map.is_empty()).then_some(map)
    }
}
