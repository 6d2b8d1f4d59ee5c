//! Direct signal delivery to PIDs read from PID files.

use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;

pub use nix::sys::signal::Signal;

/// Sends `signal` to `pid`.
pub fn send_signal(pid: u32, signal: Signal) -> Result<(), Errno> {
    kill(to_pid(pid)?, signal)
}

/// Reports whether `pid` names a live process.
///
/// `EPERM` means the process exists but belongs to someone else, so it
/// counts as alive.
pub fn check_process(pid: u32) -> Result<bool, Errno> {
    if pid == 0 {
        return Ok(false);
    }
    match kill(to_pid(pid)?, None) {
        Ok(()) | Err(Errno::EPERM) => Ok(true),
        Err(Errno::ESRCH | Errno::ECHILD) => Ok(false),
        Err(errno) => Err(errno),
    }
}

fn to_pid(pid: u32) -> Result<Pid, Errno> {
    i32::try_from(pid)
        .ok()
        .filter(|raw| *raw > 0)
        .map(Pid::from_raw)
        .ok_or(Errno::EINVAL)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;

    #[test]
    fn current_process_is_alive() {
        assert_eq!(check_process(std::process::id()), Ok(true));
    }

    #[test]
    fn zero_pid_is_never_alive() {
        assert_eq!(check_process(0), Ok(false));
    }

    #[test]
    fn out_of_range_pid_is_rejected() {
        assert_eq!(send_signal(u32::MAX, Signal::SIGTERM), Err(Errno::EINVAL));
    }

    #[test]
    fn reaped_child_is_dead() {
        let mut child = Command::new("true").spawn().expect("spawn true");
        let pid = child.id();
        child.wait().expect("wait for child");
        assert_eq!(check_process(pid), Ok(false));
    }

    #[test]
    fn terminated_child_stops() {
        let mut child = Command::new("sleep").arg("30").spawn().expect("spawn sleep");
        send_signal(child.id(), Signal::SIGTERM).expect("signal child");
        let status = child.wait().expect("wait for child");
        assert!(!status.success());
    }
}
