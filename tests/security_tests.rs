//! Security tests to verify sandbox isolation against a real engine.
//!
//! These tests start real containers and attempt to break out of the
//! limits the sandbox promises. They need a local Docker daemon and are
//! ignored by default: `cargo test -- --ignored`.

use std::time::{Duration, Instant};

use container_sandbox_rs::prelude::*;

/// Helper to create a test sandbox config.
fn test_config() -> SandboxConfig {
    SandboxConfig::builder()
        .runtime(Runtime::Python311)
        .limits(
            ResourceLimits::builder()
                .timeout_secs(5)
                .memory_bytes(64 * 1024 * 1024)
                .max_processes(32)
                .build(),
        )
        .build()
}

/// Test that the canonical end-to-end scenario works.
#[tokio::test]
#[ignore = "requires a running Docker daemon"]
async fn test_print_arithmetic() {
    let interpreter = Interpreter::new(test_config()).await.unwrap();

    let result = interpreter.execute("print(1+1)", "python").await.unwrap();
    assert!(result.stdout_lossy().contains('2'));
    assert_eq!(result.exit_code, 0);
    assert_eq!(result.outcome, ExecutionOutcome::Normal);
    assert!(result.wall_clock_seconds() < 5.0);

    interpreter.dispose().await.unwrap();
}

/// Test that infinite loops are terminated and the session survives.
#[tokio::test]
#[ignore = "requires a running Docker daemon"]
async fn test_infinite_loop_timeout() {
    let config = SandboxConfig::builder()
        .runtime(Runtime::Python311)
        .timeout(Duration::from_secs(2))
        .build();
    let interpreter = Interpreter::new(config).await.unwrap();

    let started = Instant::now();
    let result = interpreter
        .execute("print('start', flush=True)\nwhile True: pass", "python")
        .await
        .unwrap();

    assert_eq!(result.outcome, ExecutionOutcome::TimedOut);
    assert!(started.elapsed() < Duration::from_secs(6));
    assert!(result.stdout_lossy().contains("start"));

    let after = interpreter.execute("print('alive')", "python").await.unwrap();
    assert_eq!(after.stdout_lossy().trim(), "alive");

    interpreter.dispose().await.unwrap();
}

/// Test that a loop ignoring SIGTERM in a detached child is still stopped.
#[tokio::test]
#[ignore = "requires a running Docker daemon"]
async fn test_signal_ignoring_children_are_killed() {
    let config = SandboxConfig::builder()
        .runtime(Runtime::Python311)
        .timeout(Duration::from_secs(2))
        .build();
    let interpreter = Interpreter::new(config).await.unwrap();

    let result = interpreter
        .execute(
            r#"
import os, signal, time
signal.signal(signal.SIGTERM, signal.SIG_IGN)
if os.fork() == 0:
    os.setsid()
    while True:
        time.sleep(1)
while True:
    time.sleep(1)
"#,
            "python",
        )
        .await
        .unwrap();
    assert_eq!(result.outcome, ExecutionOutcome::TimedOut);

    // The container was killed as a whole, so no sleeper survives.
    let ps = interpreter
        .execute(
            "import os\nprint(len([p for p in os.listdir('/proc') if p.isdigit()]))",
            "python",
        )
        .await
        .unwrap();
    let processes: usize = ps.stdout_lossy().trim().parse().unwrap();
    assert!(processes <= 3, "found {processes} processes");

    interpreter.dispose().await.unwrap();
}

/// Test memory exhaustion is reported as OOM, not as a plain failure.
#[tokio::test]
#[ignore = "requires a running Docker daemon"]
async fn test_memory_exhaustion_is_oom() {
    let interpreter = Interpreter::new(test_config()).await.unwrap();

    let result = interpreter
        .execute(
            r#"
data = []
while True:
    data.append(bytearray(16 * 1024 * 1024))
"#,
            "python",
        )
        .await
        .unwrap();

    assert_eq!(result.outcome, ExecutionOutcome::OutOfMemory);
    assert_eq!(result.exit_code, 137);

    interpreter.dispose().await.unwrap();
}

/// Test that fork bombs hit the process ceiling.
#[tokio::test]
#[ignore = "requires a running Docker daemon"]
async fn test_process_limit() {
    let interpreter = Interpreter::new(test_config()).await.unwrap();

    let result = interpreter
        .execute(
            r#"
import os
children = 0
try:
    for _ in range(200):
        if os.fork() == 0:
            import time
            time.sleep(30)
            os._exit(0)
        children += 1
    print('SECURITY_BREACH: spawned', children)
except OSError as e:
    print(f'BLOCKED after {children}: {type(e).__name__}')
"#,
            "python",
        )
        .await
        .unwrap();

    assert!(
        !result.stdout_lossy().contains("SECURITY_BREACH"),
        "process limit should stop the fork loop"
    );

    interpreter.dispose().await.unwrap();
}

/// Test that the host filesystem is not visible.
#[tokio::test]
#[ignore = "requires a running Docker daemon"]
async fn test_host_files_not_visible() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("host-marker.txt");
    std::fs::write(&marker, "host only").unwrap();

    let interpreter = Interpreter::new(test_config()).await.unwrap();
    let code = format!(
        "import os\nprint('SECURITY_BREACH' if os.path.exists({:?}) else 'BLOCKED')",
        marker.display().to_string()
    );
    let result = interpreter.execute(&code, "python").await.unwrap();

    assert!(result.stdout_lossy().contains("BLOCKED"));

    interpreter.dispose().await.unwrap();
}

/// Test that a staged workspace lands under the workdir and nowhere else.
#[tokio::test]
#[ignore = "requires a running Docker daemon"]
async fn test_workspace_is_confined_to_workdir() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("nested")).unwrap();
    std::fs::write(dir.path().join("nested/data.txt"), "payload").unwrap();
    #[cfg(unix)]
    std::os::unix::fs::symlink("/etc/shadow", dir.path().join("shadow")).unwrap();

    let config = SandboxConfig::builder()
        .runtime(Runtime::Python311)
        .workspace_dir(dir.path())
        .build();
    let interpreter = Interpreter::new(config).await.unwrap();

    let result = interpreter
        .execute(
            "import os\nprint(open('/workspace/nested/data.txt').read())\nprint(os.path.exists('/workspace/shadow'))",
            "python",
        )
        .await
        .unwrap();

    let stdout = result.stdout_lossy();
    assert!(stdout.contains("payload"));
    assert!(stdout.contains("False"), "symlinks must not be staged");

    interpreter.dispose().await.unwrap();
}

/// Test that two interpreters never see each other's files.
#[tokio::test]
#[ignore = "requires a running Docker daemon"]
async fn test_interpreters_are_isolated() {
    let first = Interpreter::new(test_config()).await.unwrap();
    let second = Interpreter::new(test_config()).await.unwrap();

    first
        .execute("open('/workspace/secret.txt', 'w').write('mine')", "python")
        .await
        .unwrap();

    let result = second
        .execute(
            "import os\nprint('SECURITY_BREACH' if os.path.exists('/workspace/secret.txt') else 'BLOCKED')",
            "python",
        )
        .await
        .unwrap();
    assert!(result.stdout_lossy().contains("BLOCKED"));

    first.dispose().await.unwrap();
    second.dispose().await.unwrap();
}

/// Test that disposing twice is harmless.
#[tokio::test]
#[ignore = "requires a running Docker daemon"]
async fn test_double_dispose() {
    let interpreter = Interpreter::new(test_config()).await.unwrap();
    interpreter.dispose().await.unwrap();
    interpreter.dispose().await.unwrap();

    let err = interpreter.execute("print(1)", "python").await.unwrap_err();
    assert!(matches!(err, SandboxError::SessionClosed));
}
