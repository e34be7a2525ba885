//! Example of running several interpreters concurrently.
//!
//! Each interpreter owns its own container, so tasks cannot see each
//! other's files. Executions on a single interpreter are serialized.
//!
//! Run with: cargo run --example concurrent_execution
//!
//! Note: Requires a running Docker daemon.

use std::sync::Arc;
use std::time::{Duration, Instant};
use container_sandbox_rs::prelude::*;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    println!("=== Concurrent Execution Example ===\n");

    let config = SandboxConfig::builder()
        .runtime(Runtime::Python311)
        .timeout(Duration::from_secs(10))
        .max_memory(64 * 1024 * 1024)
        .build();

    let tasks = vec![
        (
            "Task 1",
            "print(sum([i**2 for i in range(100)]))",
            "Sum of squares",
        ),
        (
            "Task 2",
            "print(len([x for x in range(1000) if x % 3 == 0]))",
            "Count divisible by 3",
        ),
        (
            "Task 3",
            "print(''.join([chr(65 + i % 26) for i in range(50)]))",
            "Generate letters",
        ),
        (
            "Task 4",
            "print(max([i * (100 - i) for i in range(101)]))",
            "Maximum product",
        ),
    ];

    println!("Starting {} concurrent tasks...\n", tasks.len());
    let start = Instant::now();

    let mut handles = Vec::new();
    for (name, code, description) in tasks {
        let config = config.clone();
        handles.push(tokio::spawn(async move {
            let interpreter = Interpreter::new(config).await?;
            let result = interpreter.execute(code, "python").await;
            interpreter.dispose().await?;
            result.map(|r| (name, description, r))
        }));
    }

    for handle in handles {
        match handle.await {
            Ok(Ok((name, description, result))) => println!(
                "{} ({}): {} [{:.2}s]",
                name,
                description,
                result.stdout_lossy().trim(),
                result.wall_clock_seconds()
            ),
            Ok(Err(e)) => eprintln!("Task failed: {}", e),
            Err(e) => eprintln!("Task panicked: {}", e),
        }
    }
    println!("\nAll isolated tasks finished in {:?}", start.elapsed());

    // One interpreter shared between tasks runs them one at a time
    println!("\n=== Shared interpreter ===");
    let shared = Arc::new(Interpreter::new(config).await?);
    let start = Instant::now();
    let mut handles = Vec::new();
    for i in 0..3 {
        let shared = Arc::clone(&shared);
        handles.push(tokio::spawn(async move {
            let code = format!("open('log.txt', 'a').write('{i}\\n')");
            shared.execute(&code, "python").await
        }));
    }
    for handle in handles {
        if let Ok(Err(e)) = handle.await {
            eprintln!("Task failed: {}", e);
        }
    }
    let result = shared
        .execute("print(sorted(open('log.txt').read().split()))", "python")
        .await?;
    println!("log after serialized writes: {}", result.stdout_lossy().trim());
    println!("finished in {:?}", start.elapsed());

    shared.dispose().await?;
    Ok(())
}
