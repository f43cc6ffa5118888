use lodge_fs::{AtomicWriteOptions, PermissionMode, atomic_write, read, remove_path};
use tempfile::tempdir;

#[test]
fn test_atomic_write_basic() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("wrapper");

    atomic_write(&path, b"#!/bin/sh\nexec true\n", AtomicWriteOptions::new()).unwrap();

    assert!(path.exists());
    assert_eq!(read(&path).unwrap(), b"#!/bin/sh\nexec true\n");
}

#[cfg(unix)]
#[test]
fn test_atomic_write_executable_mode() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempdir().unwrap();
    let path = dir.path().join("launcher");
    let options = AtomicWriteOptions::new().permissions(PermissionMode::Executable);

    atomic_write(&path, b"#!/bin/sh\n", options).unwrap();

    let mode = std::fs::metadata(&path).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o755);
}

#[test]
fn test_remove_after_write() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("app.desktop");
    atomic_write(&path, b"[Desktop Entry]\n", AtomicWriteOptions::new()).unwrap();

    assert!(remove_path(&path).unwrap());
    assert!(!remove_path(&path).unwrap());
}
