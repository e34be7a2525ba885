//! Basic example of executing code in a container sandbox.
//!
//! Run with: cargo run --example basic_execution
//!
//! Note: Requires a running Docker daemon. The first run pulls the image.

use std::time::Duration;
use container_sandbox_rs::prelude::*;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Configure the sandbox
    let config = SandboxConfig::builder()
        .runtime(Runtime::Python311)
        .timeout(Duration::from_secs(5))
        .max_memory(128 * 1024 * 1024) // 128MB
        .build();

    println!("Creating interpreter with config: {:?}", config);

    let interpreter = match Interpreter::new(config).await {
        Ok(i) => i,
        Err(e) => {
            eprintln!("Failed to create interpreter: {}", e);
            eprintln!("Make sure the Docker daemon is running and reachable");
            return Err(e);
        }
    };

    // Execute simple arithmetic
    println!("\n=== Test 1: Simple arithmetic ===");
    match interpreter.execute("print(1 + 1)", "python").await {
        Ok(result) => {
            println!("stdout: {}", result.stdout_lossy());
            println!("stderr: {}", result.stderr_lossy());
            println!("exit_code: {}", result.exit_code);
            println!("wall_clock: {:.3}s", result.wall_clock_seconds());
        }
        Err(e) => eprintln!("Error: {}", e),
    }

    // Execute with a loop
    println!("\n=== Test 2: Loop execution ===");
    let code = r#"
for i in range(5):
    print(f"Count: {i}")
"#;
    match interpreter.execute(code, "python").await {
        Ok(result) => {
            println!("stdout:\n{}", result.stdout_lossy());
            println!("exit_code: {}", result.exit_code);
        }
        Err(e) => eprintln!("Error: {}", e),
    }

    // A raised exception is an outcome, not an error
    println!("\n=== Test 3: Python error ===");
    match interpreter
        .execute("raise ValueError('test error')", "python")
        .await
    {
        Ok(result) => {
            println!("stderr:\n{}", result.stderr_lossy());
            println!("exit_code: {}", result.exit_code);
            println!("outcome: {:?}", result.outcome);
        }
        Err(e) => eprintln!("Execution error: {}", e),
    }

    // Files written by one execution are visible to the next
    println!("\n=== Test 4: Shared filesystem ===");
    interpreter
        .execute("open('notes.txt', 'w').write('kept')", "python")
        .await?;
    let result = interpreter
        .execute("print(open('notes.txt').read())", "python")
        .await?;
    println!("stdout: {}", result.stdout_lossy());

    interpreter.dispose().await?;
    Ok(())
}
