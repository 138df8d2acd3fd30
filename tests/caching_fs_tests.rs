#![allow(clippy::unwrap_used, missing_docs)]

mod common;

use attr_cache_fs::fs::mem::{MemFlavor, MemFs};
use attr_cache_fs::fs::{
    AttrValue, AttributeFamily, AttributeProvider as _, CopyOptions, FileTime, FilesystemOps as _,
    FsError, PosixPermissions, Principal,
};
use common::{
    CountingFs, Fixture, all_flavors, mem_fixture, posix_flavors, test_date, write_backing,
};

/// 1971-01-01T20:34:27Z.
fn later_date() -> FileTime {
    FileTime::from_unix_millis(31_610_067_000)
}

/// 1969-01-01T18:34:27Z.
fn pre_epoch_date() -> FileTime {
    FileTime::from_unix_millis(-31_469_133_000)
}

/// 2001-01-01T13:11:11Z.
fn concurrent_date() -> FileTime {
    FileTime::from_unix_millis(978_354_671_000)
}

fn time_of(map: &attr_cache_fs::fs::AttributeMap, key: &str) -> FileTime {
    map[key].as_time().unwrap()
}

#[test]
fn reads_each_family_the_backing_supports() {
    let win = mem_fixture(MemFlavor::Windows);
    let path = win.create_hello("testfile.txt");
    let basic = win.fs.read_attributes(&path, AttributeFamily::Basic).unwrap();
    assert_eq!(basic.family(), AttributeFamily::Basic);
    let dos = win.fs.read_attributes(&path, AttributeFamily::Dos).unwrap();
    assert!(dos.as_dos().is_some());

    for flavor in posix_flavors() {
        let fx = mem_fixture(flavor);
        let path = fx.create_hello("testfile.txt");
        let posix = fx.fs.read_attributes(&path, AttributeFamily::Posix).unwrap();
        assert!(posix.as_posix().is_some(), "{flavor:?}");
    }
}

#[test]
fn selector_map_sizes() {
    let cases = [
        (MemFlavor::Windows, "*", 9),
        (MemFlavor::Windows, "dos:*", 13),
        (MemFlavor::Unix, "posix:*", 12),
        (MemFlavor::OsX, "posix:*", 12),
        (MemFlavor::Unix, "basic:*", 9),
    ];
    for (flavor, selector, expected) in cases {
        let fx = mem_fixture(flavor);
        let path = fx.create_hello("testfile.txt");
        let map = fx.fs.read_attributes_map(&path, selector).unwrap();
        assert_eq!(map.len(), expected, "{flavor:?} {selector}");
    }
}

#[test]
fn end_to_end_basic_attributes() {
    for flavor in all_flavors() {
        let fx = mem_fixture(flavor);
        let path = fx.create_hello("testfile.txt");
        fx.set_all_times(&path, test_date());

        let map = fx.fs.read_attributes_map(&path, "*").unwrap();
        assert_eq!(map.len(), 9);
        assert_eq!(time_of(&map, "creationTime"), test_date());
        assert_eq!(time_of(&map, "lastModifiedTime"), test_date());
        assert_eq!(time_of(&map, "lastAccessTime"), test_date());
        assert_eq!(map["regularFile"], AttrValue::Bool(true));
        assert_eq!(map["directory"], AttrValue::Bool(false));
        assert_eq!(map["symbolicLink"], AttrValue::Bool(false));
        assert_eq!(map["other"], AttrValue::Bool(false));
        assert_eq!(map["size"], AttrValue::Size(5));
        assert_eq!(fx.fs.read(&path).unwrap().as_ref(), b"hello");
    }
}

#[test]
fn write_then_read_is_coherent() {
    for flavor in all_flavors() {
        let fx = mem_fixture(flavor);
        let path = fx.create_hello("testfile.txt");

        // Warm the cache first so the write has something to replace.
        fx.fs.read_attributes_map(&path, "*").unwrap();
        fx.set_time(&path, "lastModifiedTime", test_date());

        let map = fx.fs.read_attributes_map(&path, "lastModifiedTime").unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(time_of(&map, "lastModifiedTime"), test_date(), "{flavor:?}");
    }
}

#[test]
fn basic_write_is_seen_through_every_family() {
    for flavor in all_flavors() {
        let fx = mem_fixture(flavor);
        let path = fx.create_hello("testfile.txt");
        let extended = match flavor {
            MemFlavor::Windows => "dos:*",
            MemFlavor::Unix | MemFlavor::OsX => "posix:*",
        };

        fx.fs.read_attributes_map(&path, "*").unwrap();
        fx.fs.read_attributes_map(&path, extended).unwrap();
        fx.set_time(&path, "lastModifiedTime", test_date());

        let basic = fx.fs.read_attributes_map(&path, "*").unwrap();
        assert_eq!(time_of(&basic, "lastModifiedTime"), test_date(), "{flavor:?}");
        let full = fx.fs.read_attributes_map(&path, extended).unwrap();
        assert_eq!(time_of(&full, "lastModifiedTime"), test_date(), "{flavor:?}");
    }
}

#[test]
fn basic_write_refreshes_one_family_and_drops_the_rest() {
    let fx = Fixture::over(CountingFs::new(MemFs::unix()));
    let path = fx.path("testfile.txt", &[]);
    fx.fs.write(&path, b"hello").unwrap();
    fx.fs.read_attributes_map(&path, "*").unwrap();
    fx.fs.read_attributes_map(&path, "posix:*").unwrap();
    assert_eq!(fx.backing.reads(), 2);

    fx.set_time(&path, "lastAccessTime", test_date());
    assert_eq!(fx.backing.reads(), 3, "only the written family is re-read");
    assert_eq!(path.cached_len(), 1);

    let posix = fx.fs.read_attributes_map(&path, "posix:*").unwrap();
    assert_eq!(time_of(&posix, "lastAccessTime"), test_date());
    assert_eq!(fx.backing.reads(), 4);
}

#[test]
fn owner_alias_write_is_seen_through_posix() {
    for flavor in posix_flavors() {
        let fx = mem_fixture(flavor);
        let path = fx.create_hello("testfile.txt");
        let before = fx.fs.read_attributes_map(&path, "posix:owner").unwrap();
        assert_eq!(before["posix:owner"].as_principal().unwrap().to_string(), "user");

        fx.fs
            .set_attribute(&path, "owner:owner", Principal::named("alice").into())
            .unwrap();

        let after = fx.fs.read_attributes_map(&path, "posix:owner").unwrap();
        assert_eq!(
            after["posix:owner"].as_principal().unwrap().to_string(),
            "alice",
            "{flavor:?}"
        );
    }
}

#[test]
fn dos_write_is_coherent_with_the_rest_of_the_family() {
    let fx = mem_fixture(MemFlavor::Windows);
    let path = fx.create_hello("testfile.txt");
    fx.fs.read_attributes_map(&path, "dos:*").unwrap();

    fx.fs
        .set_attribute(&path, "dos:hidden", AttrValue::Bool(true))
        .unwrap();

    let map = fx.fs.read_attributes_map(&path, "dos:*").unwrap();
    assert_eq!(map.len(), 13);
    assert_eq!(map["dos:hidden"], AttrValue::Bool(true));
    assert_eq!(map["dos:readonly"], AttrValue::Bool(false));
    assert_eq!(map["size"], AttrValue::Size(5));
}

#[test]
fn unprefixed_dos_and_posix_names_resolve_as_basic() {
    let win = mem_fixture(MemFlavor::Windows);
    let path = win.create_hello("testfile.txt");
    for name in ["hidden", "readonly"] {
        assert!(
            matches!(
                win.fs.read_attributes_map(&path, name),
                Err(FsError::MalformedAttributeQuery(_))
            ),
            "{name}"
        );
    }

    let unix = mem_fixture(MemFlavor::Unix);
    let path = unix.create_hello("testfile.txt");
    for name in ["owner", "permissions"] {
        assert!(
            matches!(
                unix.fs.read_attributes_map(&path, name),
                Err(FsError::MalformedAttributeQuery(_))
            ),
            "{name}"
        );
    }
    assert_eq!(path.cached_len(), 1, "the Basic family was still read");
}

#[test]
fn posix_owner_group_and_permissions_round_trip() {
    for flavor in posix_flavors() {
        let fx = mem_fixture(flavor);
        let path = fx.create_hello("testfile.txt");
        let permissions = PosixPermissions::OWNER_RWX
            | PosixPermissions::GROUP_READ
            | PosixPermissions::OTHERS_WRITE;

        fx.fs
            .set_attribute(&path, "posix:owner", Principal::named("testUser").into())
            .unwrap();
        fx.fs
            .set_attribute(&path, "posix:group", Principal::named("testGroup").into())
            .unwrap();
        fx.fs
            .set_attribute(&path, "posix:permissions", permissions.into())
            .unwrap();

        let map = fx.fs.read_attributes_map(&path, "posix:*").unwrap();
        assert_eq!(map.len(), 12);
        assert_eq!(map["posix:owner"].as_principal().unwrap().to_string(), "testUser");
        assert_eq!(map["posix:group"].as_principal().unwrap().to_string(), "testGroup");
        assert_eq!(
            map["posix:permissions"].as_permissions().unwrap().to_string(),
            "rwxr---w-"
        );
    }
}

#[test]
fn dos_booleans_read_back_by_single_name() {
    for name in ["dos:readonly", "dos:hidden", "dos:archive", "dos:system"] {
        let fx = mem_fixture(MemFlavor::Windows);
        let path = fx.create_hello("testfile.txt");

        fx.fs.set_attribute(&path, name, AttrValue::Bool(true)).unwrap();
        let map = fx.fs.read_attributes_map(&path, name).unwrap();

        assert_eq!(map.len(), 1, "{name}");
        assert_eq!(map[name], AttrValue::Bool(true), "{name}");
    }
}

#[test]
fn cached_attributes_ignore_concurrent_writes_until_expiry() {
    for flavor in all_flavors() {
        let fx = mem_fixture(flavor);
        let dir = fx.path("temp", &[]);
        fx.fs.create_dir(&dir).unwrap();
        let path = fx.path("temp", &["testfile.txt"]);
        fx.fs.create_file(&path).unwrap();
        fx.fs.write(&path, b"hello").unwrap();

        fx.set_time(&path, "lastModifiedTime", test_date());
        fx.set_time(&path, "lastAccessTime", later_date());
        fx.set_time(&path, "creationTime", pre_epoch_date());

        let raw = fx.backing.path("temp", &["testfile.txt"]).unwrap();
        for name in ["lastModifiedTime", "lastAccessTime", "creationTime"] {
            fx.backing
                .set_attribute(&raw, name, AttrValue::Time(concurrent_date()))
                .unwrap();
        }

        let map = fx.fs.read_attributes_map(&path, "*").unwrap();
        assert_eq!(time_of(&map, "lastModifiedTime"), test_date(), "{flavor:?}");
        assert_eq!(time_of(&map, "lastAccessTime"), later_date(), "{flavor:?}");
        assert_eq!(time_of(&map, "creationTime"), pre_epoch_date(), "{flavor:?}");

        fx.expire();
        let map = fx.fs.read_attributes_map(&path, "*").unwrap();
        assert_eq!(time_of(&map, "lastModifiedTime"), concurrent_date(), "{flavor:?}");
        assert_eq!(time_of(&map, "creationTime"), concurrent_date(), "{flavor:?}");
    }
}

#[test]
fn copy_follows_the_preserve_flag() {
    for flavor in all_flavors() {
        for options in [CopyOptions::REPLACE_EXISTING, CopyOptions::COPY_ATTRIBUTES] {
            let fx = mem_fixture(flavor);
            let source = fx.create_hello("testfile.txt");
            fx.set_all_times(&source, test_date());

            let target = fx.path("testfile2.txt", &[]);
            assert!(!fx.fs.exists(&target).unwrap());

            fx.fs.copy(&source, &target, options).unwrap();

            assert!(fx.fs.exists(&source).unwrap());
            assert_eq!(fx.fs.read(&target).unwrap().as_ref(), b"hello");

            let map = fx.fs.read_attributes_map(&target, "*").unwrap();
            let preserved = options.contains(CopyOptions::COPY_ATTRIBUTES);
            for name in ["creationTime", "lastModifiedTime", "lastAccessTime"] {
                assert_eq!(
                    time_of(&map, name) == test_date(),
                    preserved,
                    "{flavor:?} {options:?} {name}"
                );
            }
        }
    }
}

#[test]
fn move_always_keeps_creation_and_modification_times() {
    let options = [
        CopyOptions::REPLACE_EXISTING,
        CopyOptions::COPY_ATTRIBUTES,
        CopyOptions::ATOMIC_MOVE,
    ];
    for flavor in all_flavors() {
        for option in options {
            let fx = mem_fixture(flavor);
            let source = fx.create_hello("testfile.txt");
            fx.set_all_times(&source, test_date());

            fx.fs.create_dir(&fx.path("temp", &[])).unwrap();
            let target = fx.path("temp", &["testfile2.txt"]);
            assert!(!fx.fs.exists(&target).unwrap());

            fx.fs.rename(&source, &target, option).unwrap();

            assert!(!fx.fs.exists(&source).unwrap());
            // Reading the content touches the access time on the backing file.
            assert_eq!(fx.fs.read(&target).unwrap().as_ref(), b"hello");

            let map = fx.fs.read_attributes_map(&target, "*").unwrap();
            assert_eq!(time_of(&map, "creationTime"), test_date(), "{flavor:?} {option:?}");
            assert_eq!(time_of(&map, "lastModifiedTime"), test_date(), "{flavor:?} {option:?}");
            assert_eq!(
                time_of(&map, "lastAccessTime") == test_date(),
                option == CopyOptions::COPY_ATTRIBUTES,
                "{flavor:?} {option:?}"
            );
        }
    }
}

#[test]
fn windows_hidden_flag_never_hides_directories() {
    let fx = mem_fixture(MemFlavor::Windows);
    let dir = fx.path("temp", &[]);
    fx.fs.create_dir(&dir).unwrap();

    let file = fx.path("temp", &["test1.txt"]);
    fx.fs.create_file(&file).unwrap();
    fx.fs.write(&file, b"hello").unwrap();
    assert!(!fx.fs.is_hidden(&file).unwrap(), "no hidden flag set yet");
    fx.fs
        .set_attribute(&file, "dos:hidden", AttrValue::Bool(true))
        .unwrap();
    assert!(fx.fs.is_hidden(&file).unwrap());

    fx.fs
        .set_attribute(&dir, "dos:hidden", AttrValue::Bool(true))
        .unwrap();
    assert!(!fx.fs.is_hidden(&dir).unwrap());
}

#[test]
fn posix_hidden_means_leading_dot() {
    for flavor in posix_flavors() {
        let fx = mem_fixture(flavor);
        fx.fs.create_dir(&fx.path("temp", &[])).unwrap();

        assert!(fx.fs.is_hidden(&fx.path("temp", &[".test1.txt"])).unwrap());
        assert!(!fx.fs.is_hidden(&fx.path("temp", &["test2.txt"])).unwrap());
    }
}

#[test]
fn repeated_reads_hit_the_cache_until_expiry() {
    let fx = Fixture::over(CountingFs::new(MemFs::unix()));
    let path = fx.path("testfile.txt", &[]);
    fx.fs.write(&path, b"hello").unwrap();

    fx.fs.read_attributes_map(&path, "*").unwrap();
    fx.fs.read_attributes_map(&path, "size").unwrap();
    fx.fs.read_attributes(&path, AttributeFamily::Basic).unwrap();
    assert_eq!(fx.backing.reads(), 1);

    fx.fs.read_attributes_map(&path, "posix:permissions").unwrap();
    assert_eq!(fx.backing.reads(), 2, "each family is fetched once");
    assert_eq!(path.cached_len(), 2);

    fx.expire();
    fx.fs.read_attributes_map(&path, "*").unwrap();
    assert_eq!(fx.backing.reads(), 3);
    assert_eq!(path.cached_len(), 1);
}

#[test]
fn paths_do_not_share_caches() {
    let fx = Fixture::over(CountingFs::new(MemFs::unix()));
    let first = fx.path("testfile.txt", &[]);
    fx.fs.write(&first, b"hello").unwrap();
    let second = fx.path("testfile.txt", &[]);
    assert_eq!(first, second);

    fx.fs.read_attributes_map(&first, "*").unwrap();
    fx.fs.read_attributes_map(&second, "*").unwrap();
    assert_eq!(fx.backing.reads(), 2);
}

#[test]
fn unsupported_family_is_an_error_and_caches_nothing() {
    let fx = mem_fixture(MemFlavor::Unix);
    let path = fx.create_hello("testfile.txt");

    let err = fx.fs.read_attributes(&path, AttributeFamily::Dos).unwrap_err();
    assert!(matches!(err, FsError::UnsupportedAttributeFamily(AttributeFamily::Dos)));
    assert!(matches!(
        fx.fs.read_attributes_map(&path, "dos:*"),
        Err(FsError::UnsupportedAttributeFamily(_))
    ));
    assert_eq!(path.cached_len(), 0);
}

#[test]
fn failing_backing_read_is_retried() {
    let fx = Fixture::over(CountingFs::new(MemFs::windows()));
    let path = fx.path("testfile.txt", &[]);
    fx.fs.write(&path, b"hello").unwrap();

    fx.backing.fail_reads(true);
    assert!(matches!(
        fx.fs.read_attributes_map(&path, "*"),
        Err(FsError::Io(_))
    ));
    assert_eq!(path.cached_len(), 0);

    fx.backing.fail_reads(false);
    let map = fx.fs.read_attributes_map(&path, "*").unwrap();
    assert_eq!(map["size"], AttrValue::Size(5));
    assert_eq!(fx.backing.reads(), 2);
}

#[test]
fn failed_refresh_after_write_drops_the_family() {
    let fx = Fixture::over(CountingFs::new(MemFs::unix()));
    let path = fx.path("testfile.txt", &[]);
    fx.fs.write(&path, b"hello").unwrap();
    fx.fs.read_attributes_map(&path, "*").unwrap();
    assert_eq!(path.cached_len(), 1);

    fx.backing.fail_reads(true);
    let err = fx
        .fs
        .set_attribute(&path, "lastModifiedTime", AttrValue::Time(test_date()))
        .unwrap_err();
    assert!(matches!(err, FsError::Io(_)));
    assert_eq!(path.cached_len(), 0);

    fx.backing.fail_reads(false);
    let map = fx.fs.read_attributes_map(&path, "lastModifiedTime").unwrap();
    assert_eq!(time_of(&map, "lastModifiedTime"), test_date());
}

#[test]
fn unknown_single_name_is_malformed() {
    let fx = mem_fixture(MemFlavor::Unix);
    let path = fx.create_hello("testfile.txt");
    assert!(matches!(
        fx.fs.read_attributes_map(&path, "noSuchAttribute"),
        Err(FsError::MalformedAttributeQuery(_))
    ));
    assert!(matches!(
        fx.fs.read_attributes_map(&path, ""),
        Err(FsError::MalformedAttributeQuery(_))
    ));
}

#[test]
fn paths_from_another_session_are_rejected() {
    let a = mem_fixture(MemFlavor::Unix);
    let b = mem_fixture(MemFlavor::Unix);
    let foreign = b.create_hello("testfile.txt");

    assert!(matches!(
        a.fs.read_attributes_map(&foreign, "*"),
        Err(FsError::InvalidPathKind { .. })
    ));
    assert!(matches!(
        a.fs.set_attribute(&foreign, "lastModifiedTime", AttrValue::Time(test_date())),
        Err(FsError::InvalidPathKind { .. })
    ));
}

#[test]
fn closed_session_rejects_operations() {
    let fx = mem_fixture(MemFlavor::Unix);
    let path = fx.create_hello("testfile.txt");
    fx.fs.close().unwrap();

    assert!(!fx.fs.is_open());
    assert!(matches!(
        fx.fs.read_attributes_map(&path, "*"),
        Err(FsError::Closed(_))
    ));
    assert!(matches!(fx.fs.path("other.txt", &[]), Err(FsError::Closed(_))));
    assert!(!fx.backing.is_open());
}

#[test]
fn read_dir_yields_session_paths() {
    let fx = mem_fixture(MemFlavor::Unix);
    fx.fs.create_dir(&fx.path("temp", &[])).unwrap();
    fx.create_hello("temp/a.txt");
    fx.create_hello("temp/b.txt");

    let entries = fx.fs.read_dir(&fx.path("temp", &[])).unwrap();
    let names: Vec<_> = entries.iter().filter_map(|p| p.file_name()).collect();
    assert_eq!(names, ["a.txt", "b.txt"]);
    for entry in &entries {
        assert_eq!(entry.session(), fx.fs.uri());
        assert_eq!(
            fx.fs.read_attributes_map(entry, "size").unwrap()["size"],
            AttrValue::Size(5)
        );
    }
}

#[test]
fn writes_through_the_backing_stay_hidden_within_a_window() {
    let fx = mem_fixture(MemFlavor::Unix);
    let path = fx.create_hello("testfile.txt");
    assert_eq!(
        fx.fs.read_attributes_map(&path, "size").unwrap()["size"],
        AttrValue::Size(5)
    );

    write_backing(&fx.backing, path.delegate(), b"hello, world");
    assert_eq!(
        fx.fs.read_attributes_map(&path, "size").unwrap()["size"],
        AttrValue::Size(5)
    );

    fx.expire();
    assert_eq!(
        fx.fs.read_attributes_map(&path, "size").unwrap()["size"],
        AttrValue::Size(12)
    );
}
