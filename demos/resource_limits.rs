//! Example demonstrating the memory, process and time limits.
//!
//! Run with: cargo run --example resource_limits
//!
//! Note: Requires a running Docker daemon.

use std::time::{Duration, Instant};
use container_sandbox_rs::prelude::*;

fn report(name: &str, result: &ExecutionResult) {
    println!("[{}] outcome: {:?}", name, result.outcome);
    println!("[{}] exit_code: {}", name, result.exit_code);
    println!("[{}] wall_clock: {:.2}s", name, result.wall_clock_seconds());
    let stdout = result.stdout_lossy();
    if !stdout.is_empty() {
        println!("[{}] stdout:\n{}", name, stdout.trim_end());
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let limits = ResourceLimits::builder()
        .memory_bytes(64 * 1024 * 1024) // 64MB
        .cpu_share(0.5)
        .max_processes(32)
        .timeout(Duration::from_secs(3))
        .build();
    println!("Limits: {:?}\n", limits);

    let config = SandboxConfig::builder()
        .runtime(Runtime::Python312)
        .limits(limits)
        .build();
    let interpreter = Interpreter::new(config).await?;

    // Timeout: the container is killed and started again
    println!("=== Infinite loop ===");
    let start = Instant::now();
    let result = interpreter
        .execute("print('spinning', flush=True)\nwhile True: pass", "python")
        .await?;
    report("loop", &result);
    println!("returned after {:?}\n", start.elapsed());

    // Memory: the engine OOM-kills the process
    println!("=== Memory exhaustion ===");
    let result = interpreter
        .execute(
            "chunks = []\nwhile True: chunks.append(bytearray(8 * 1024 * 1024))",
            "python",
        )
        .await?;
    report("memory", &result);
    println!();

    // Processes: fork fails once the pids ceiling is reached
    println!("=== Fork loop ===");
    let code = r#"
import os, time
spawned = 0
try:
    for _ in range(100):
        if os.fork() == 0:
            time.sleep(5)
            os._exit(0)
        spawned += 1
except OSError as e:
    print(f"fork refused after {spawned} children: {e}")
"#;
    let result = interpreter.execute(code, "python").await?;
    report("fork", &result);
    println!();

    // The same interpreter is still usable after all of the above
    let result = interpreter.execute("print('still alive')", "python").await?;
    report("after", &result);

    interpreter.dispose().await?;
    Ok(())
}
