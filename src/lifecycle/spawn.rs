//! Launching a server process detached from the caller

use std::ffi::OsStr;
use std::fs::{self, OpenOptions};
use std::path::Path;
use std::process::{Child, Command, Stdio};

use tracing::info;

use super::LifecycleError;

/// Start `program` in its own session with stdio detached
///
/// stdin and stdout go to the null device; stderr (the log stream) is
/// appended to `log_path`. On unix the child calls `setsid`, so it survives
/// the caller's terminal and process group.
pub fn spawn_detached<I, S>(program: &Path, args: I, log_path: &Path) -> Result<Child, LifecycleError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    if let Some(parent) = log_path.parent() {
        fs::create_dir_all(parent)?;
    }
    let log = OpenOptions::new().create(true).append(true).open(log_path)?;

    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::from(log));

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;

        unsafe {
            command.pre_exec(|| {
                if libc::setsid() == -1 {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(())
            });
        }
    }

    let child = command.spawn().map_err(|source| LifecycleError::Spawn {
        program: program.to_path_buf(),
        source,
    })?;
    info!(program = %program.display(), pid = child.id(), "spawned detached server");
    Ok(child)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};
    use tempfile::TempDir;

    #[test]
    fn test_stderr_goes_to_log() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("logs").join("server.log");

        let mut child = spawn_detached(
            Path::new("/bin/sh"),
            ["-c", "echo detached-ok 1>&2"],
            &log,
        )
        .unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while child.try_wait().unwrap().is_none() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        assert!(fs::read_to_string(&log).unwrap().contains("detached-ok"));
    }

    #[test]
    fn test_missing_program_is_spawn_error() {
        let dir = TempDir::new().unwrap();
        let err = spawn_detached(
            &dir.path().join("no-such-binary"),
            Vec::<String>::new(),
            &dir.path().join("server.log"),
        )
        .unwrap_err();
        assert!(matches!(err, LifecycleError::Spawn { .. }));
    }
}
