use hffs::fs::{FilterFs, FsError};
use hffs::index::HashIndex;
use hffs::matcher::MatchPolicy;
use hffs::scanner::{Hasher, HostStore, LocalStore};
use std::ffi::OsString;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::{tempdir, TempDir};

fn sha256(content: &[u8]) -> String {
    Hasher::new().hash_reader(content).unwrap()
}

fn mount(root: &Path, list: &str, policy: MatchPolicy) -> FilterFs {
    FilterFs::new(
        Arc::new(LocalStore::new(root)),
        Arc::new(HashIndex::parse(list).unwrap()),
        policy,
        Hasher::new(),
    )
}

fn listing(filter: &FilterFs, path: &str) -> Vec<OsString> {
    filter
        .readdir(Path::new(path))
        .unwrap()
        .into_iter()
        .map(|e| e.name)
        .collect()
}

/// `/data` with a hash-listed `secret.txt` and an unlisted `public.txt`.
fn secret_and_public() -> (TempDir, String) {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("secret.txt"), b"top secret payload").unwrap();
    fs::write(dir.path().join("public.txt"), b"nothing to see").unwrap();
    let list = format!("{} /data/secret.txt\n", sha256(b"top secret payload"));
    (dir, list)
}

#[test]
fn test_secret_hidden_public_readable() {
    let (dir, list) = secret_and_public();
    let filter = mount(dir.path(), &list, MatchPolicy::File);

    assert_eq!(listing(&filter, "/"), vec![OsString::from("public.txt")]);

    assert!(matches!(
        filter.open(Path::new("/secret.txt"), libc::O_RDONLY),
        Err(FsError::NotFound(_))
    ));
    assert!(matches!(
        filter.attributes(Path::new("/secret.txt")),
        Err(FsError::NotFound(_))
    ));

    let fh = filter.open(Path::new("/public.txt"), libc::O_RDONLY).unwrap();
    let data = filter.read(fh, 4096, 0).unwrap();
    assert_eq!(data, fs::read(dir.path().join("public.txt")).unwrap());
    filter.release(fh).unwrap();
}

#[test]
fn test_empty_hash_list_shows_everything() {
    let (dir, _) = secret_and_public();
    fs::create_dir(dir.path().join("sub")).unwrap();
    fs::write(dir.path().join("sub").join("deep.bin"), [0u8, 1, 2, 3]).unwrap();
    let filter = mount(dir.path(), "", MatchPolicy::None);

    let mut names = listing(&filter, "/");
    names.sort();
    assert_eq!(
        names,
        vec![
            OsString::from("public.txt"),
            OsString::from("secret.txt"),
            OsString::from("sub")
        ]
    );

    for path in ["/public.txt", "/secret.txt", "/sub/deep.bin"] {
        let fh = filter.open(Path::new(path), libc::O_RDONLY).unwrap();
        let host = fs::read(dir.path().join(path.trim_start_matches('/'))).unwrap();
        assert_eq!(filter.read(fh, 1 << 16, 0).unwrap(), host);
        filter.release(fh).unwrap();
    }
}

#[test]
fn test_listing_preserves_host_order() {
    let dir = tempdir().unwrap();
    for i in 0..20 {
        fs::write(dir.path().join(format!("f{i:02}")), format!("content {i}")).unwrap();
    }
    // Hide every third file by content.
    let list: String = (0..20)
        .step_by(3)
        .map(|i| format!("{} /f{i:02}\n", sha256(format!("content {i}").as_bytes())))
        .collect();
    let filter = mount(dir.path(), &list, MatchPolicy::File);

    let host_order = LocalStore::new(dir.path()).read_dir(Path::new("/")).unwrap();
    let expected: Vec<OsString> = host_order
        .into_iter()
        .filter(|name| {
            let index: usize = name.to_str().unwrap()[1..].parse().unwrap();
            index % 3 != 0
        })
        .collect();

    assert_eq!(listing(&filter, "/"), expected);
}

#[test]
fn test_policy_none_hides_any_name() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("renamed.txt"), b"same bytes").unwrap();
    fs::create_dir(dir.path().join("moved")).unwrap();
    fs::write(dir.path().join("moved").join("again.dat"), b"same bytes").unwrap();
    fs::write(dir.path().join("keep.txt"), b"different bytes").unwrap();
    let list = format!("{} /original/name.txt\n", sha256(b"same bytes"));
    let filter = mount(dir.path(), &list, MatchPolicy::None);

    assert_eq!(listing(&filter, "/").len(), 2);
    assert!(listing(&filter, "/moved").is_empty());
    assert!(filter.attributes(Path::new("/keep.txt")).is_ok());
    assert!(filter.attributes(Path::new("/renamed.txt")).is_err());
}

#[test]
fn test_policy_full_path_requires_exact_location() {
    let dir = tempdir().unwrap();
    fs::create_dir(dir.path().join("a")).unwrap();
    fs::create_dir(dir.path().join("b")).unwrap();
    fs::write(dir.path().join("a").join("doc.txt"), b"shared").unwrap();
    fs::write(dir.path().join("b").join("doc.txt"), b"shared").unwrap();
    let list = format!("{} ./a/doc.txt\n", sha256(b"shared"));
    let filter = mount(dir.path(), &list, MatchPolicy::FullPath);

    assert!(listing(&filter, "/a").is_empty());
    assert_eq!(listing(&filter, "/b"), vec![OsString::from("doc.txt")]);
}

#[test]
fn test_policy_file_ignores_directory() {
    let dir = tempdir().unwrap();
    fs::create_dir(dir.path().join("a")).unwrap();
    fs::write(dir.path().join("a").join("doc.txt"), b"shared").unwrap();
    fs::write(dir.path().join("a").join("other.txt"), b"shared").unwrap();
    let list = format!("{} /somewhere/else/doc.txt\n", sha256(b"shared"));
    let filter = mount(dir.path(), &list, MatchPolicy::File);

    assert_eq!(listing(&filter, "/a"), vec![OsString::from("other.txt")]);
}

#[test]
fn test_duplicate_hash_entries_any_path_hides() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("second.txt"), b"dup").unwrap();
    let hash = sha256(b"dup");
    let list = format!("{hash} /first.txt\n{hash} /second.txt\n");
    let filter = mount(dir.path(), &list, MatchPolicy::File);

    assert!(listing(&filter, "/").is_empty());
}

#[test]
fn test_hash_list_case_is_ignored() {
    let (dir, list) = secret_and_public();
    let filter = mount(dir.path(), &list.to_uppercase(), MatchPolicy::None);
    assert_eq!(listing(&filter, "/"), vec![OsString::from("public.txt")]);
}

#[test]
fn test_empty_file_can_be_hidden() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("empty"), b"").unwrap();
    let list = format!("{} /empty\n", sha256(b""));
    let filter = mount(dir.path(), &list, MatchPolicy::File);
    assert!(listing(&filter, "/").is_empty());
}

#[cfg(unix)]
#[test]
fn test_symlinks_are_never_filtered() {
    let (dir, list) = secret_and_public();
    std::os::unix::fs::symlink("secret.txt", dir.path().join("secret.txt.link")).unwrap();
    let filter = mount(dir.path(), &list, MatchPolicy::None);

    let names = listing(&filter, "/");
    assert!(names.contains(&OsString::from("secret.txt.link")));
    assert!(!names.contains(&OsString::from("secret.txt")));
    assert_eq!(
        filter.readlink(Path::new("/secret.txt.link")).unwrap(),
        Path::new("secret.txt")
    );
    let attrs = filter.attributes(Path::new("/secret.txt.link")).unwrap();
    assert!(attrs.file_type().is_symlink());
}

#[cfg(unix)]
#[test]
fn test_metadata_passes_through_unchanged() {
    use filetime::FileTime;
    use std::os::unix::fs::{MetadataExt, PermissionsExt};

    let (dir, list) = secret_and_public();
    let host_path = dir.path().join("public.txt");
    fs::set_permissions(&host_path, fs::Permissions::from_mode(0o640)).unwrap();
    filetime::set_file_mtime(&host_path, FileTime::from_unix_time(1_000_000_000, 0)).unwrap();
    fs::hard_link(&host_path, dir.path().join("public-link.txt")).unwrap();

    let filter = mount(dir.path(), &list, MatchPolicy::File);
    let attrs = filter.attributes(Path::new("/public.txt")).unwrap();
    let host = fs::metadata(&host_path).unwrap();

    assert_eq!(attrs.mode(), host.mode());
    assert_eq!(attrs.mode() & 0o777, 0o640);
    assert_eq!(attrs.mtime(), 1_000_000_000);
    assert_eq!(attrs.nlink(), 2);
    assert_eq!(attrs.uid(), host.uid());
    assert_eq!(attrs.gid(), host.gid());
    assert_eq!(attrs.len(), host.len());
}

#[test]
fn test_large_file_read_in_pieces() {
    let dir = tempdir().unwrap();
    let content: Vec<u8> = (0..300_000u32).map(|i| (i % 253) as u8).collect();
    fs::write(dir.path().join("big.bin"), &content).unwrap();
    let filter = FilterFs::new(
        Arc::new(LocalStore::new(dir.path())),
        Arc::new(HashIndex::default()),
        MatchPolicy::File,
        Hasher::with_chunk_size(4096),
    );

    let fh = filter.open(Path::new("/big.bin"), libc::O_RDONLY).unwrap();
    let mut assembled = Vec::new();
    let mut offset = 0u64;
    loop {
        let piece = filter.read(fh, 65_536, offset).unwrap();
        if piece.is_empty() {
            break;
        }
        offset += piece.len() as u64;
        assembled.extend_from_slice(&piece);
    }
    filter.release(fh).unwrap();
    assert_eq!(assembled, content);
}
