//! Example showing which failures are errors and which are outcomes.
//!
//! Run with: cargo run --example error_handling
//!
//! Note: Requires a running Docker daemon for the execution cases.

use std::time::Duration;
use container_sandbox_rs::prelude::*;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Configuration errors are caught before any container exists
    println!("=== Invalid limits ===");
    let bad = SandboxConfig::builder()
        .limits(ResourceLimits::builder().cpu_share(0.0).build())
        .build();
    match Interpreter::new(bad).await {
        Ok(_) => println!("unexpectedly created"),
        Err(e) => println!("error: {} (config error: {})", e, e.is_config_error()),
    }

    println!("\n=== Unknown runtime ===");
    match Interpreter::from_runtime_id("cobol:85", ResourceLimits::default(), None).await {
        Ok(_) => println!("unexpectedly created"),
        Err(e) => println!("error: {}", e),
    }

    println!("\n=== Missing workspace ===");
    let missing = SandboxConfig::builder()
        .workspace_dir("/definitely/not/here")
        .build();
    match Interpreter::new(missing).await {
        Ok(_) => println!("unexpectedly created"),
        Err(e) => println!("error: {}", e),
    }

    let config = SandboxConfig::builder()
        .runtime(Runtime::Node20)
        .timeout(Duration::from_secs(5))
        .build();
    let interpreter = match Interpreter::new(config).await {
        Ok(i) => i,
        Err(e) => {
            eprintln!("\nSkipping execution cases: {}", e);
            return Ok(());
        }
    };

    // A language the runtime does not speak
    println!("\n=== Unsupported language ===");
    match interpreter.execute("print(1)", "python").await {
        Ok(_) => println!("unexpectedly ran"),
        Err(e) => println!("error: {}", e),
    }

    // Code that throws is reported on the result
    println!("\n=== Thrown exception ===");
    let result = interpreter
        .execute("throw new Error('kaboom')", "javascript")
        .await?;
    println!("outcome: {:?}, exit_code: {}", result.outcome, result.exit_code);
    println!("stderr:\n{}", result.stderr_lossy());

    println!("\n=== Explicit exit code ===");
    let result = interpreter.execute("process.exit(42)", "js").await?;
    println!("outcome: {:?}, exit_code: {}", result.outcome, result.exit_code);

    // After dispose the interpreter refuses further work
    interpreter.dispose().await?;
    println!("\n=== After dispose ===");
    match interpreter.execute("console.log(1)", "javascript").await {
        Ok(_) => println!("unexpectedly ran"),
        Err(e) => println!("error: {} (session closed: {})", e, e.is_session_closed()),
    }

    Ok(())
}
