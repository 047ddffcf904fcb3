use sysinfo::{Pid, ProcessRefreshKind, System};

/// Check if a process is still alive in the system
///
/// Used as the suppression check before a forced-kill signal: a process
/// that already exited must not be signalled again.
///
/// # Arguments
/// * `pid` - Process ID to check
///
/// # Returns
/// * `true` - Process is alive
/// * `false` - Process has exited
pub fn is_process_alive(pid: u32) -> bool {
    let sys_pid = Pid::from_u32(pid);
    let mut system = System::new();
    system.refresh_processes_specifics(
        sysinfo::ProcessesToUpdate::Some(&[sys_pid]),
        true,
        ProcessRefreshKind::everything(),
    );
    system.process(sys_pid).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_own_process_is_alive() {
        assert!(is_process_alive(std::process::id()));
    }

    #[tokio::test]
    async fn test_exited_process_is_not_alive() {
        let mut child = tokio::process::Command::new("/bin/true")
            .spawn()
            .unwrap();
        let pid = child.id().unwrap();
        let _ = child.wait().await;

        assert!(!is_process_alive(pid));
    }
}
