//! Integration tests for bwrap command line generation.
//!
//! Every directive is checked for its flag and arguments appearing
//! contiguously in the generated tokens.

use std::io::Write;

use sbox::error::DirectiveError;
use sbox::sandbox::{BubbleWrapper, Namespace};
use tempfile::{NamedTempFile, TempDir};

/// Returns `true` if `needle` appears as a contiguous run in `args`.
fn contains(needle: &[&str], args: &[String]) -> bool {
    args.windows(needle.len()).any(|w| w == needle)
}

#[test]
fn test_filesystem_directives() {
    let mut wrapper = BubbleWrapper::new();
    wrapper.filesystem.add_bind_mount_rw("/srv", "/srv");
    wrapper.filesystem.add_bind_mount_ro("/usr", "/usr");
    wrapper.filesystem.add_bind_mount_dev("/dev/dri", "/dev/dri");
    wrapper.filesystem.add_remount_readonly("/srv");
    wrapper.filesystem.add_proc("/proc");
    wrapper.filesystem.add_devtmpfs("/dev");
    wrapper.filesystem.add_tmpfs("/tmp");
    wrapper.filesystem.add_mqueue("/tmp/sboxmqueue");
    wrapper.filesystem.create_directory("/home/sbox");
    wrapper.filesystem.create_symlink("usr/bin", "/bin");
    wrapper.filesystem.create_file_from_fd(42, "/etc/hostname");

    let args = wrapper.gen_args();
    let expected: [&[&str]; 11] = [
        &["--bind", "/srv", "/srv"],
        &["--ro-bind", "/usr", "/usr"],
        &["--dev-bind", "/dev/dri", "/dev/dri"],
        &["--remount-ro", "/srv"],
        &["--proc", "/proc"],
        &["--dev", "/dev"],
        &["--tmpfs", "/tmp"],
        &["--mqueue", "/tmp/sboxmqueue"],
        &["--dir", "/home/sbox"],
        &["--symlink", "usr/bin", "/bin"],
        &["--file", "42", "/etc/hostname"],
    ];
    for expected in expected {
        assert!(contains(expected, &args), "missing {expected:?} in {args:?}");
    }
}

#[test]
fn test_environment_directives() {
    let mut wrapper = BubbleWrapper::new();
    wrapper.environment.add_unshare(Namespace::All);
    wrapper.environment.add_share_net().unwrap();
    wrapper.environment.set_env("PATH", "/usr/bin:/usr/sbin");
    wrapper.environment.unset_env("HOME");
    wrapper.environment.set_uid(1001).unwrap();
    wrapper.environment.set_gid(1001).unwrap();
    wrapper.environment.set_hostname("localhost").unwrap();

    let args = wrapper.gen_args();
    assert!(contains(&["--unshare-all", "--share-net"], &args));
    assert!(contains(&["--setenv", "PATH", "/usr/bin:/usr/sbin"], &args));
    assert!(contains(&["--unsetenv", "HOME"], &args));
    assert!(contains(&["--uid", "1001", "--gid", "1001"], &args));
    assert!(contains(&["--hostname", "localhost"], &args));
}

#[test]
fn test_uid_without_user_namespace_is_rejected() {
    let mut wrapper = BubbleWrapper::new();
    wrapper.environment.add_unshare(Namespace::Net);

    let result = wrapper.environment.set_uid(1001);

    assert!(matches!(result, Err(DirectiveError::NamespaceRequired { .. })));
    assert!(!wrapper.gen_args().contains(&"--uid".to_string()));
}

#[test]
fn test_unshare_all_after_net_collapses() {
    let mut wrapper = BubbleWrapper::new();
    wrapper.environment.add_unshare(Namespace::Net);
    wrapper.environment.add_unshare(Namespace::All);

    assert_eq!(wrapper.environment.unshares(), &[Namespace::All]);
    assert_eq!(wrapper.gen_args(), vec!["bwrap", "--unshare-all"]);
}

#[test]
fn test_confinement_directives() {
    let mut program = NamedTempFile::new().expect("failed to create temp file");
    program.write_all(b"bpf").unwrap();

    let mut wrapper = BubbleWrapper::new();
    wrapper.confinement.use_new_terminal_session();
    let seccomp = wrapper
        .confinement
        .set_seccomp_rules_from_file(program.path())
        .unwrap();
    let seccomp_arg = seccomp.to_string();
    wrapper.confinement.add_info_fd(42);
    wrapper.confinement.add_block_fd(43);
    wrapper.confinement.set_exec_label("exec_t");
    wrapper.confinement.set_file_label("file_t");

    let args = wrapper.gen_args();
    assert!(contains(&["--new-session"], &args));
    assert!(contains(&["--seccomp", seccomp_arg.as_str()], &args));
    assert!(contains(&["--info-fd", "42"], &args));
    assert!(contains(&["--block-fd", "43"], &args));
    assert!(contains(&["--exec-label", "exec_t"], &args));
    assert!(contains(&["--file-label", "file_t"], &args));
    assert!(wrapper.inheritable_fds().contains(&seccomp));
}

#[test]
fn test_wrapper_directives() {
    let mut wrapper = BubbleWrapper::new();
    wrapper.set_chdir("/home/sbox");
    wrapper.add_sync_fd(42);
    wrapper.use_lock_file("/tmp/sbox.lock");
    wrapper.set_die_with_parent();

    let args = wrapper.gen_args();
    assert!(contains(&["--chdir", "/home/sbox"], &args));
    assert!(contains(&["--sync-fd", "42"], &args));
    assert!(contains(&["--lock-file", "/tmp/sbox.lock"], &args));
    assert_eq!(args.last().map(String::as_str), Some("--die-with-parent"));
}

#[test]
fn test_literal_content_file_is_removed_on_cleanup() {
    let dir = TempDir::new().expect("failed to create temp dir");
    let mut wrapper = BubbleWrapper::new()
        .with_filesystem(sbox::sandbox::FileSystem::new().with_temp_dir(dir.path()));

    let fd = wrapper
        .filesystem
        .create_file_from_contents("hello\n", "/etc/x")
        .unwrap();
    let path = wrapper.filesystem.temp_files()[0].to_path_buf();
    let fd_arg = fd.to_string();

    assert_eq!(std::fs::read_to_string(&path).unwrap(), "hello\n");
    assert!(contains(&["--file", fd_arg.as_str(), "/etc/x"], &wrapper.gen_args()));

    let warnings = wrapper.cleanup();
    assert!(warnings.is_empty());
    assert!(!path.exists());
}

#[test]
fn test_file_from_missing_path_leaves_other_directives() {
    let mut wrapper = BubbleWrapper::new();
    wrapper.filesystem.add_tmpfs("/tmp");

    let result = wrapper
        .filesystem
        .create_file_from_file("/nonexistent/sbox/source", "/etc/x");

    assert!(matches!(result, Err(DirectiveError::FileNotFound { .. })));
    assert_eq!(wrapper.gen_args(), vec!["bwrap", "--tmpfs", "/tmp"]);
}

#[test]
fn test_duplicate_destination_is_a_warning() {
    let mut wrapper = BubbleWrapper::new();
    wrapper.filesystem.add_tmpfs("/tmp");
    wrapper.filesystem.create_directory("/tmp");

    assert_eq!(wrapper.warnings().len(), 1);
    assert!(contains(&["--tmpfs", "/tmp", "--dir", "/tmp"], &wrapper.gen_args()));
}
