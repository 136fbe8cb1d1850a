// Thread-pool setup. Units are instrumented in parallel, but half the cores
// stay free for the test runner and monitor that usually share the machine.

use anyhow::Result;

/// Initialize the global rayon thread pool with a controlled worker count.
pub fn init_thread_pool() -> Result<()> {
    let cores = num_cpus::get();
    let workers = std::cmp::max(1, cores / 2);

    rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .build_global()?;

    println!(
        "[probecraft] Initialized thread pool: {} workers (system has {} cores)",
        workers, cores
    );

    Ok(())
}
