//! Thin wrappers over the unix calls the standard library does not expose:
//! device nodes, named pipes, device numbers and the user/group database.

use std::ffi::{CStr, CString};
use std::fs::DirBuilder;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::DirBuilderExt;
use std::path::{Component, Path, PathBuf};

use crate::common::DEFAULT_DIR_MODE;

// Scratch size for the reentrant passwd/group lookups.
const LOOKUP_BUFFER_SIZE: usize = 4096;

fn c_path(path: &Path) -> io::Result<CString> {
    CString::new(path.as_os_str().as_bytes())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "path contains a NUL byte"))
}

/// Creates a device node (`kind` is `libc::S_IFCHR` or `libc::S_IFBLK`).
pub fn mknod(path: &Path, kind: libc::mode_t, mode: u32, major: u32, minor: u32) -> io::Result<()> {
    let path = c_path(path)?;
    let dev = makedev(major, minor);
    let rc = unsafe { libc::mknod(path.as_ptr(), kind | (mode as libc::mode_t & 0o777), dev) };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

pub fn mkfifo(path: &Path, mode: u32) -> io::Result<()> {
    let path = c_path(path)?;
    let rc = unsafe { libc::mkfifo(path.as_ptr(), mode as libc::mode_t & 0o777) };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

pub fn makedev(major: u32, minor: u32) -> libc::dev_t {
    libc::makedev(major, minor)
}

/// Splits a raw device number into (major, minor).
pub fn split_dev(dev: u64) -> (u32, u32) {
    let dev = dev as libc::dev_t;
    (libc::major(dev) as u32, libc::minor(dev) as u32)
}

/// Looks up the user name for `uid`. `None` when the database has no entry.
pub fn user_name(uid: u32) -> Option<Vec<u8>> {
    let mut buf = vec![0 as libc::c_char; LOOKUP_BUFFER_SIZE];
    let mut pwd: libc::passwd = unsafe { std::mem::zeroed() };
    let mut result: *mut libc::passwd = std::ptr::null_mut();
    let rc = unsafe { libc::getpwuid_r(uid, &mut pwd, buf.as_mut_ptr(), buf.len(), &mut result) };
    if rc != 0 || result.is_null() || pwd.pw_name.is_null() {
        return None;
    }
    let name = unsafe { CStr::from_ptr(pwd.pw_name) };
    Some(name.to_bytes().to_vec())
}

/// Looks up the group name for `gid`. `None` when the database has no entry.
pub fn group_name(gid: u32) -> Option<Vec<u8>> {
    let mut buf = vec![0 as libc::c_char; LOOKUP_BUFFER_SIZE];
    let mut grp: libc::group = unsafe { std::mem::zeroed() };
    let mut result: *mut libc::group = std::ptr::null_mut();
    let rc = unsafe { libc::getgrgid_r(gid, &mut grp, buf.as_mut_ptr(), buf.len(), &mut result) };
    if rc != 0 || result.is_null() || grp.gr_name.is_null() {
        return None;
    }
    let name = unsafe { CStr::from_ptr(grp.gr_name) };
    Some(name.to_bytes().to_vec())
}

/// Creates `dir` and every missing ancestor, one component at a time.
///
/// "Already exists" is tolerated at every level; any other error is returned together
/// with the component that failed. A `mode` of zero means [`DEFAULT_DIR_MODE`].
pub fn create_dir_recursive(dir: &Path, mode: u32) -> Result<(), (PathBuf, io::Error)> {
    let mode = if mode == 0 { DEFAULT_DIR_MODE } else { mode };
    let mut builder = DirBuilder::new();
    builder.mode(mode);

    let mut current = PathBuf::new();
    for component in dir.components() {
        current.push(component);
        if !matches!(component, Component::Normal(_)) {
            continue;
        }
        match builder.create(&current) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
            Err(e) => return Err((current, e)),
        }
    }
    Ok(())
}
