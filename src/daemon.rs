//! Daemonization and privilege dropping. Direct port of `original_source/
//! idigna.c`'s `--daemon` branch and `drop_privileges()` onto `libc`, since
//! there is no idiomatic crate in the retrieval pack that does a classic
//! double-fork daemonize (the pack's `libc` usage in `rama-net`/`rama-tcp`/
//! `rama-unix` is the closest precedent for reaching straight to raw
//! syscalls here).

use std::ffi::CString;
use std::io;

use crate::error::Result;

/// Double-forks, detaches from the controlling terminal, and redirects the
/// standard streams to `/dev/null`. Must be called before the `mio::Poll`
/// and any listening sockets are created, matching the original's ordering
/// (daemonize happens during option parsing, before `setup_listen`).
pub fn daemonize() -> Result<()> {
    unsafe {
        match libc::fork() {
            pid if pid < 0 => return Err(last_os_error("fork").into()),
            pid if pid > 0 => std::process::exit(0),
            _ => {}
        }

        if libc::setsid() < 0 {
            return Err(last_os_error("setsid").into());
        }

        libc::signal(libc::SIGCHLD, libc::SIG_IGN);
        libc::signal(libc::SIGHUP, libc::SIG_IGN);

        match libc::fork() {
            pid if pid < 0 => return Err(last_os_error("fork").into()),
            pid if pid > 0 => std::process::exit(0),
            _ => {}
        }

        libc::umask(0);

        let root = CString::new("/").unwrap();
        if libc::chdir(root.as_ptr()) < 0 {
            return Err(last_os_error("chdir").into());
        }

        redirect_std_streams()?;
    }

    Ok(())
}

unsafe fn redirect_std_streams() -> Result<()> {
    let dev_null = CString::new("/dev/null").unwrap();
    let fd = libc::open(dev_null.as_ptr(), libc::O_RDWR);
    if fd < 0 {
        return Err(last_os_error("open /dev/null").into());
    }

    libc::dup2(fd, libc::STDIN_FILENO);
    libc::dup2(fd, libc::STDOUT_FILENO);
    libc::dup2(fd, libc::STDERR_FILENO);

    if fd > libc::STDERR_FILENO {
        libc::close(fd);
    }

    Ok(())
}

/// Drops back to the real (invoking) uid/gid, undoing any setuid/setgid
/// privilege the binary was installed with. Fatal on failure: spec.md §7
/// lists privilege-drop failure as a setup error.
pub fn drop_privileges() -> Result<()> {
    unsafe {
        let uid = libc::getuid();
        let gid = libc::getgid();

        if libc::setresgid(gid, gid, gid) != 0 {
            return Err(last_os_error("setresgid").into());
        }
        if libc::setresuid(uid, uid, uid) != 0 {
            return Err(last_os_error("setresuid").into());
        }
    }

    Ok(())
}

fn last_os_error(what: &str) -> io::Error {
    let err = io::Error::last_os_error();
    io::Error::new(err.kind(), format!("{}: {}", what, err))
}
