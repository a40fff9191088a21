use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;

use symtrans::harness::{
    clear_all_caches, spot_check, trimmed_mean, BenchConfig, CacheSizes, ResultsStore, RunPlan, RunRecord,
};
use symtrans::{allocate_for_mode, release, ExecutionEngine, Result};

fn run(plan: &RunPlan) -> Result<f64> {
    println!("Block size: {}", plan.block);
    println!("Threads: {}\n", plan.threads);

    let store = ResultsStore::new(&plan.results_dir);
    let cache = CacheSizes::default();
    let mut engine = ExecutionEngine::new(plan.mode, plan.threads)?;
    let mut times = Vec::with_capacity(plan.samples);

    for _ in 0..plan.samples {
        if plan.flush {
            clear_all_caches(&cache)?;
        }
        let mut source = allocate_for_mode::<f32>(plan.mode, plan.n)?;
        let destination = allocate_for_mode::<f32>(plan.mode, plan.n)?;
        plan.pattern.fill(&mut source);

        let start = Instant::now();
        let outcome = engine.run(&source, destination, plan.block)?;
        let elapsed = start.elapsed().as_secs_f64();
        println!("Time Elapsed (get time)={elapsed:.12}");

        if let Some(t) = outcome.transposed() {
            for c in spot_check(&source, t).iter().filter(|c| !c.agrees()) {
                eprintln!(
                    "warning: M[{}][{}]={} but T[{}][{}]={}",
                    c.row, c.col, c.source, c.col, c.row, c.transposed
                );
            }
        }

        release(&mut source);
        drop(outcome);

        store.append_sample(&RunRecord::now(
            plan.code.as_str(),
            plan.mode,
            plan.n,
            plan.pattern,
            plan.samples,
            plan.threads,
            elapsed,
        ))?;
        times.push(elapsed);
    }

    let trimmed = trimmed_mean(&times)?;
    for t in &trimmed.kept {
        println!("{t:.12}");
    }

    store.append_average(&RunRecord::now(
        plan.code.as_str(),
        plan.mode,
        plan.n,
        plan.pattern,
        plan.samples,
        plan.threads,
        trimmed.mean,
    ))?;

    Ok(trimmed.mean)
}

fn main() -> ExitCode {
    let config = BenchConfig::parse();

    let plan = match config.validate() {
        Ok(plan) => plan,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };

    match run(&plan) {
        Ok(average) => {
            println!("\n\nFINAL RESULTS WITH:");
            println!("MODE {}", plan.mode);
            println!("Dimension: {}", plan.n);
            println!("Testing: {}", plan.pattern);
            println!("Samples: {}", plan.samples);
            println!("Threads: {}", plan.threads);
            println!("Average Time: {average:.12} secs\n");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
