//! `fuser` binding for [`FilterFs`].
//!
//! Translates kernel requests (inode based) into [`FilterFs`] calls (path
//! based) and maps [`FsError`] onto errno replies. Requests that would
//! modify the tree are answered with `EROFS`.

use std::ffi::OsStr;
use std::fs::{FileType as HostFileType, Metadata};
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::{FileTypeExt, MetadataExt};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use fuser::{
    BackgroundSession, FileAttr, FileType, Filesystem, MountOption, ReplyAttr, ReplyCreate,
    ReplyData, ReplyDirectory, ReplyEmpty, ReplyEntry, ReplyOpen, ReplyWrite, Request, TimeOrNow,
};

use super::inode::{InodeTable, ROOT_INO};
use super::{FilterFs, FsError, FsResult};
use crate::config::Config;

/// Kernel-facing wrapper around [`FilterFs`].
#[derive(Debug)]
pub struct FuseAdapter {
    fs: FilterFs,
    inodes: InodeTable,
    ttl: Duration,
}

impl FuseAdapter {
    /// Wrap `fs`, letting the kernel cache attributes and entries for `ttl`.
    #[must_use]
    pub fn new(fs: FilterFs, ttl: Duration) -> Self {
        Self {
            fs,
            inodes: InodeTable::new(),
            ttl,
        }
    }

    fn path(&self, ino: u64) -> FsResult<PathBuf> {
        self.inodes
            .path(ino)
            .map(Path::to_path_buf)
            .ok_or_else(|| FsError::NotFound(PathBuf::from(format!("<inode {ino}>"))))
    }

    fn child_path(&self, parent: u64, name: &OsStr) -> FsResult<PathBuf> {
        Ok(self.path(parent)?.join(name))
    }

    fn entry(&mut self, path: &Path) -> FsResult<FileAttr> {
        let metadata = self.fs.attributes(path)?;
        let ino = self.inodes.lookup(path);
        Ok(file_attr(ino, &metadata))
    }

    fn reply_rejected_entry(result: FsResult<()>, reply: ReplyEntry) {
        reply.error(result.err().unwrap_or(FsError::ReadOnly).errno());
    }

    fn reply_rejected(result: FsResult<()>, reply: ReplyEmpty) {
        match result {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.errno()),
        }
    }
}

impl Filesystem for FuseAdapter {
    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let result = self
            .child_path(parent, name)
            .and_then(|path| self.entry(&path));
        match result {
            Ok(attr) => reply.entry(&self.ttl, &attr, 0),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn forget(&mut self, _req: &Request<'_>, ino: u64, nlookup: u64) {
        if self.inodes.forget(ino, nlookup) {
            log::trace!("forgot inode {}", ino);
        }
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, reply: ReplyAttr) {
        let result = self
            .path(ino)
            .and_then(|path| self.fs.attributes(&path))
            .map(|metadata| file_attr(ino, &metadata));
        match result {
            Ok(attr) => reply.attr(&self.ttl, &attr),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn setattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        mode: Option<u32>,
        uid: Option<u32>,
        gid: Option<u32>,
        _size: Option<u64>,
        _atime: Option<TimeOrNow>,
        _mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        let result = self.path(ino).and_then(|path| {
            if let Some(mode) = mode {
                self.fs.chmod(&path, mode)
            } else if uid.is_some() || gid.is_some() {
                self.fs.chown(&path, uid, gid)
            } else {
                Err(FsError::ReadOnly)
            }
        });
        reply.error(result.err().unwrap_or(FsError::ReadOnly).errno());
    }

    fn readlink(&mut self, _req: &Request<'_>, ino: u64, reply: ReplyData) {
        match self.path(ino).and_then(|path| self.fs.readlink(&path)) {
            Ok(target) => reply.data(target.as_os_str().as_bytes()),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn mknod(
        &mut self,
        _req: &Request<'_>,
        _parent: u64,
        _name: &OsStr,
        _mode: u32,
        _umask: u32,
        _rdev: u32,
        reply: ReplyEntry,
    ) {
        reply.error(FsError::ReadOnly.errno());
    }

    fn mkdir(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        reply: ReplyEntry,
    ) {
        let result = self
            .child_path(parent, name)
            .and_then(|path| self.fs.mkdir(&path, mode));
        Self::reply_rejected_entry(result, reply);
    }

    fn unlink(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let result = self
            .child_path(parent, name)
            .and_then(|path| self.fs.unlink(&path));
        Self::reply_rejected(result, reply);
    }

    fn rmdir(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let result = self
            .child_path(parent, name)
            .and_then(|path| self.fs.rmdir(&path));
        Self::reply_rejected(result, reply);
    }

    fn symlink(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        link_name: &OsStr,
        target: &Path,
        reply: ReplyEntry,
    ) {
        let result = self
            .child_path(parent, link_name)
            .and_then(|path| self.fs.symlink(target, &path));
        Self::reply_rejected_entry(result, reply);
    }

    fn rename(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
        _flags: u32,
        reply: ReplyEmpty,
    ) {
        let result = self.child_path(parent, name).and_then(|from| {
            let to = self.child_path(newparent, newname)?;
            self.fs.rename(&from, &to)
        });
        Self::reply_rejected(result, reply);
    }

    fn link(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        newparent: u64,
        newname: &OsStr,
        reply: ReplyEntry,
    ) {
        let result = self.path(ino).and_then(|target| {
            let link_path = self.child_path(newparent, newname)?;
            self.fs.link(&target, &link_path)
        });
        Self::reply_rejected_entry(result, reply);
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        match self.path(ino).and_then(|path| self.fs.open(&path, flags)) {
            Ok(fh) => reply.opened(fh, 0),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let Ok(offset) = u64::try_from(offset) else {
            reply.error(libc::EINVAL);
            return;
        };
        match self.fs.read(fh, size as usize, offset) {
            Ok(data) => reply.data(&data),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn write(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        _fh: u64,
        _offset: i64,
        _data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        reply.error(FsError::ReadOnly.errno());
    }

    fn release(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        match self.fs.release(fh) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        let path = match self.path(ino) {
            Ok(path) => path,
            Err(e) => return reply.error(e.errno()),
        };
        let entries = match self.fs.readdir(&path) {
            Ok(entries) => entries,
            Err(e) => return reply.error(e.errno()),
        };

        let parent = if ino == ROOT_INO {
            ROOT_INO
        } else {
            self.inodes.parent_of(&path)
        };
        let mut listing = Vec::with_capacity(entries.len() + 2);
        listing.push((ino, FileType::Directory, OsStr::new(".").to_os_string()));
        listing.push((parent, FileType::Directory, OsStr::new("..").to_os_string()));
        for entry in entries {
            let child = self.inodes.get_or_insert(&path.join(&entry.name));
            listing.push((child, file_kind(entry.file_type), entry.name));
        }

        let skip = usize::try_from(offset).unwrap_or(0);
        for (i, (child, kind, name)) in listing.into_iter().enumerate().skip(skip) {
            if reply.add(child, (i + 1) as i64, kind, &name) {
                break;
            }
        }
        reply.ok();
    }

    fn create(
        &mut self,
        _req: &Request<'_>,
        _parent: u64,
        _name: &OsStr,
        _mode: u32,
        _umask: u32,
        _flags: i32,
        reply: ReplyCreate,
    ) {
        reply.error(FsError::ReadOnly.errno());
    }
}

/// Convert host metadata into a FUSE attribute record for `ino`.
#[must_use]
pub fn file_attr(ino: u64, metadata: &Metadata) -> FileAttr {
    FileAttr {
        ino,
        size: metadata.size(),
        blocks: metadata.blocks(),
        atime: unix_time(metadata.atime(), metadata.atime_nsec()),
        mtime: unix_time(metadata.mtime(), metadata.mtime_nsec()),
        ctime: unix_time(metadata.ctime(), metadata.ctime_nsec()),
        crtime: metadata.created().unwrap_or(UNIX_EPOCH),
        kind: file_kind(metadata.file_type()),
        perm: (metadata.mode() & 0o7777) as u16,
        nlink: metadata.nlink() as u32,
        uid: metadata.uid(),
        gid: metadata.gid(),
        rdev: metadata.rdev() as u32,
        blksize: metadata.blksize() as u32,
        flags: 0,
    }
}

/// Map a host file type onto the FUSE file type.
#[must_use]
pub fn file_kind(file_type: HostFileType) -> FileType {
    if file_type.is_dir() {
        FileType::Directory
    } else if file_type.is_symlink() {
        FileType::Symlink
    } else if file_type.is_block_device() {
        FileType::BlockDevice
    } else if file_type.is_char_device() {
        FileType::CharDevice
    } else if file_type.is_fifo() {
        FileType::NamedPipe
    } else if file_type.is_socket() {
        FileType::Socket
    } else {
        FileType::RegularFile
    }
}

fn unix_time(secs: i64, nsecs: i64) -> SystemTime {
    let nanos = Duration::from_nanos(nsecs.clamp(0, 999_999_999) as u64);
    if secs >= 0 {
        UNIX_EPOCH + Duration::from_secs(secs as u64) + nanos
    } else {
        UNIX_EPOCH - Duration::from_secs(secs.unsigned_abs()) + nanos
    }
}

/// Mount options derived from configuration. The mount is always read-only
/// and lets the kernel enforce host permission bits.
#[must_use]
pub fn mount_options(config: &Config) -> Vec<MountOption> {
    let mut options = vec![
        MountOption::RO,
        MountOption::FSName(config.fs_name.clone()),
        MountOption::Subtype("hffs".to_string()),
        MountOption::DefaultPermissions,
    ];
    if config.allow_other {
        options.push(MountOption::AllowOther);
    }
    if config.auto_unmount {
        options.push(MountOption::AutoUnmount);
    }
    options
}

/// Mount `fs` at `mountpoint` on a background thread.
///
/// The filesystem stays mounted until the returned session is dropped or
/// joined, or until it is unmounted externally.
pub fn spawn_mount(fs: FilterFs, mountpoint: &Path, config: &Config) -> io::Result<BackgroundSession> {
    let adapter = FuseAdapter::new(fs, config.attr_ttl());
    log::info!(
        "Mounting at {} (policy {}, ttl {:?})",
        mountpoint.display(),
        adapter.fs.cache().policy(),
        adapter.ttl
    );
    fuser::spawn_mount2(adapter, mountpoint, &mount_options(config))
}
