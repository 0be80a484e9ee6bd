use stress_test::{stress_test_list, stress_test_scaling, stress_test_text};
pub mod stress_test;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("failed to start runtime: {e}");
            std::process::exit(1);
        }
    };
    if let Err(e) = rt.block_on(async_main()) {
        eprintln!("stress test failed: {e}");
        std::process::exit(1);
    }
}

async fn async_main() -> colab_sdk::Result<()> {
    println!("\n\n╔════════════════════════════════════════════════════════════╗");
    println!("║            COLLABORATIVE STRESS TESTS                      ║");
    println!("╚════════════════════════════════════════════════════════════╝");

    // Test 1: shared list, small scale
    let stats = stress_test_list(4, 100).await?;
    stats.print();

    // Test 2: shared string, small scale
    let stats = stress_test_text(4, 100).await?;
    stats.print();

    // Test 3: shared list, medium scale
    let stats = stress_test_list(10, 500).await?;
    stats.print();

    // Test 4: shared string, medium scale
    let stats = stress_test_text(10, 500).await?;
    stats.print();

    // Test 5: scaling analysis
    stress_test_scaling(20, 4).await?;

    println!("\n✓ All stress tests completed successfully!");
    Ok(())
}
