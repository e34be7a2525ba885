//! Example of staging a workspace, uploading files and gating execution.
//!
//! Run with: cargo run --example workspace_and_config
//!
//! Note: Requires a running Docker daemon.

use std::time::Duration;
use container_sandbox_rs::prelude::*;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Build a small project on the host
    let workspace = std::env::temp_dir().join(format!("sandbox-demo-{}", std::process::id()));
    std::fs::create_dir_all(workspace.join("lib"))?;
    std::fs::write(workspace.join("lib/greet.sh"), "greet() { echo \"hello, $1\"; }\n")?;
    std::fs::write(workspace.join("names.txt"), "alice\nbob\n")?;

    let config = SandboxConfig::builder()
        .runtime(Runtime::Bash5)
        .timeout(Duration::from_secs(5))
        .workspace_dir(&workspace)
        .container_workdir("/project")
        .env("GREETING_STYLE", "plain")
        .label("demo", "workspace_and_config")
        .name_prefix("demo")
        .build();

    // Refuse anything that looks like it wants the network
    let interpreter = Interpreter::new(config).await?.with_confirmation(|request| {
        let allowed = !request.source_code.contains("curl");
        if !allowed {
            println!("(declined {} snippet)", request.language);
        }
        allowed
    });

    println!("=== Workspace files ===");
    let result = interpreter
        .execute(
            "source lib/greet.sh\nwhile read n; do greet \"$n\"; done < names.txt\necho \"style=$GREETING_STYLE\"",
            "bash",
        )
        .await?;
    println!("{}", result.stdout_lossy());

    println!("=== Uploaded file ===");
    let path = interpreter
        .upload_file("extra.txt", b"uploaded after start\n")
        .await?;
    let result = interpreter.execute(&format!("cat {path}"), "sh").await?;
    println!("{}: {}", path, result.stdout_lossy().trim());

    println!("\n=== Confirmation hook ===");
    match interpreter.execute("curl https://example.com", "bash").await {
        Ok(_) => println!("unexpectedly ran"),
        Err(e) => println!("error: {}", e),
    }

    interpreter.dispose().await?;
    std::fs::remove_dir_all(&workspace)?;
    Ok(())
}
