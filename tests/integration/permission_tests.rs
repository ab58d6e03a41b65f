use hffs::cache::{MatchCache, Verdict};
use hffs::fs::{FilterFs, FsError};
use hffs::index::HashIndex;
use hffs::matcher::MatchPolicy;
use hffs::scanner::{HashError, Hasher, HostStore, LocalStore};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::ffi::OsString;
use std::fs::{self, File, Metadata};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::{tempdir, TempDir};

/// Store that injects host errors for chosen paths, independent of the
/// privileges the tests run with.
struct FaultyStore {
    inner: LocalStore,
    open_errors: Mutex<Vec<(PathBuf, io::ErrorKind)>>,
    stat_denied: HashSet<PathBuf>,
    opens: AtomicUsize,
}

impl FaultyStore {
    fn new(root: &Path) -> Self {
        Self {
            inner: LocalStore::new(root),
            open_errors: Mutex::new(Vec::new()),
            stat_denied: HashSet::new(),
            opens: AtomicUsize::new(0),
        }
    }

    fn fail_open(self, path: &str, kind: io::ErrorKind) -> Self {
        self.open_errors.lock().push((PathBuf::from(path), kind));
        self
    }

    fn deny_stat(mut self, path: &str) -> Self {
        self.stat_denied.insert(PathBuf::from(path));
        self
    }

    fn heal(&self) {
        self.open_errors.lock().clear();
    }

    fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

impl HostStore for FaultyStore {
    fn metadata(&self, path: &Path) -> io::Result<Metadata> {
        if self.stat_denied.contains(path) {
            return Err(io::Error::from(io::ErrorKind::PermissionDenied));
        }
        self.inner.metadata(path)
    }

    fn open(&self, path: &Path) -> io::Result<File> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let injected = self
            .open_errors
            .lock()
            .iter()
            .find(|(p, _)| p == path)
            .map(|(_, kind)| *kind);
        match injected {
            Some(kind) => Err(io::Error::from(kind)),
            None => self.inner.open(path),
        }
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<OsString>> {
        self.inner.read_dir(path)
    }

    fn read_link(&self, path: &Path) -> io::Result<PathBuf> {
        self.inner.read_link(path)
    }
}

fn listed_tree() -> (TempDir, Arc<HashIndex>) {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("locked.txt"), b"would match").unwrap();
    fs::write(dir.path().join("open.txt"), b"readable").unwrap();
    let hash = Hasher::new().hash_reader(&b"would match"[..]).unwrap();
    let index = HashIndex::parse(&format!("{hash} /locked.txt\n")).unwrap();
    (dir, Arc::new(index))
}

fn sorted_names(filter: &FilterFs, path: &str) -> Vec<OsString> {
    let mut names: Vec<_> = filter
        .readdir(Path::new(path))
        .unwrap()
        .into_iter()
        .map(|e| e.name)
        .collect();
    names.sort();
    names
}

#[test]
fn test_unreadable_file_is_listed_as_visible() {
    let (dir, index) = listed_tree();
    let store = Arc::new(
        FaultyStore::new(dir.path()).fail_open("/locked.txt", io::ErrorKind::PermissionDenied),
    );
    let filter = FilterFs::new(store.clone(), index, MatchPolicy::None, Hasher::new());

    assert_eq!(
        sorted_names(&filter, "/"),
        vec![OsString::from("locked.txt"), OsString::from("open.txt")]
    );
    let opens_after_listing = store.opens();

    for _ in 0..3 {
        assert!(!filter.cache().is_hidden(Path::new("/locked.txt")).unwrap());
    }
    assert_eq!(store.opens(), opens_after_listing);
    assert_eq!(filter.cache().cached(Path::new("/locked.txt")), Some(Verdict::Visible));

    // Metadata still passes through, but opening fails with the host's error.
    assert!(filter.attributes(Path::new("/locked.txt")).is_ok());
    assert!(matches!(
        filter.open(Path::new("/locked.txt"), libc::O_RDONLY),
        Err(FsError::PermissionDenied(_))
    ));
}

#[test]
fn test_permission_verdict_does_not_change_once_readable() {
    let (dir, index) = listed_tree();
    let store = Arc::new(
        FaultyStore::new(dir.path()).fail_open("/locked.txt", io::ErrorKind::PermissionDenied),
    );
    let cache = MatchCache::new(store.clone(), index, MatchPolicy::File, Hasher::new());

    assert!(!cache.is_hidden(Path::new("/locked.txt")).unwrap());
    store.heal();
    assert!(!cache.is_hidden(Path::new("/locked.txt")).unwrap());
    assert!(!cache.is_hidden(Path::new("/locked.txt")).unwrap());

    assert_eq!(store.opens(), 1);
    assert_eq!(cache.hashes_computed(), 0);
    assert_eq!(cache.cached(Path::new("/locked.txt")), Some(Verdict::Visible));
}

#[test]
fn test_io_error_while_hashing_is_reported_and_retried() {
    let (dir, index) = listed_tree();
    let store = Arc::new(FaultyStore::new(dir.path()).fail_open("/locked.txt", io::ErrorKind::Other));
    let cache = MatchCache::new(store.clone(), index, MatchPolicy::File, Hasher::new());

    let err = cache.is_hidden(Path::new("/locked.txt")).unwrap_err();
    assert!(matches!(err, HashError::Io { ref path, .. } if path == Path::new("/locked.txt")));
    assert_eq!(cache.cached(Path::new("/locked.txt")), None);
    assert_eq!(cache.cached_len(), 0);

    store.heal();
    assert!(cache.is_hidden(Path::new("/locked.txt")).unwrap());
    assert_eq!(store.opens(), 2);
    assert_eq!(cache.hashes_computed(), 1);
}

#[test]
fn test_io_error_while_hashing_fails_the_listing() {
    let (dir, index) = listed_tree();
    let store = Arc::new(FaultyStore::new(dir.path()).fail_open("/open.txt", io::ErrorKind::Other));
    let filter = FilterFs::new(store, index, MatchPolicy::File, Hasher::new());

    assert!(matches!(
        filter.readdir(Path::new("/")),
        Err(FsError::Io { .. })
    ));
}

#[test]
fn test_unstatable_child_is_left_out_of_listing() {
    let (dir, index) = listed_tree();
    fs::create_dir(dir.path().join("sealed")).unwrap();
    fs::write(dir.path().join("sealed").join("inner.txt"), b"inner").unwrap();
    fs::write(dir.path().join("sealed").join("plain.txt"), b"plain").unwrap();
    let store = Arc::new(FaultyStore::new(dir.path()).deny_stat("/sealed/inner.txt"));
    let filter = FilterFs::new(store, index, MatchPolicy::File, Hasher::new());

    assert_eq!(sorted_names(&filter, "/sealed"), vec![OsString::from("plain.txt")]);
    assert_eq!(filter.cache().cached(Path::new("/sealed/inner.txt")), None);
}

#[cfg(unix)]
#[test]
fn test_host_permission_bits_fail_open() {
    use std::os::unix::fs::PermissionsExt;

    let (dir, index) = listed_tree();
    let locked = dir.path().join("locked.txt");
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();
    if File::open(&locked).is_ok() {
        // Permission bits are not enforced with CAP_DAC_OVERRIDE; the
        // injected-error tests above cover this path.
        return;
    }

    let filter = FilterFs::new(
        Arc::new(LocalStore::new(dir.path())),
        index,
        MatchPolicy::None,
        Hasher::new(),
    );
    assert!(sorted_names(&filter, "/").contains(&OsString::from("locked.txt")));

    fs::set_permissions(&locked, fs::Permissions::from_mode(0o644)).unwrap();
    assert!(!filter.cache().is_hidden(Path::new("/locked.txt")).unwrap());
}
