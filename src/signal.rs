use std::os::unix::process::CommandExt;
use std::process::{Command, Stdio};

use log::warn;

/// Children are never waited on; SIG_IGN on SIGCHLD lets the kernel reap
/// them.
pub fn ignore_child_signals() {
    unsafe {
        libc::signal(libc::SIGCHLD, libc::SIG_IGN);
    }
}

/// Fire-and-forget launch in its own session, detached from our terminal.
pub fn spawn_detached(command: &[String]) {
    let Some((program, arguments)) = command.split_first() else {
        return;
    };

    let mut child = Command::new(program);
    child
        .args(arguments)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());

    unsafe {
        child.pre_exec(|| {
            libc::setsid();
            libc::signal(libc::SIGCHLD, libc::SIG_DFL);
            Ok(())
        });
    }

    if let Err(error) = child.spawn() {
        warn!("failed to spawn {program}: {error}");
    }
}

/// Advisory desktop notification; failures are silent since the helper is
/// optional.
pub fn notify(summary: &str, body: &str) {
    spawn_detached(&[
        "notify-send".to_string(),
        summary.to_string(),
        body.to_string(),
    ]);
}
