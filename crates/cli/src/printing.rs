use anyhow::Result;

use crate::commands::run::Report;
use crate::config::{EngineKind, InitialState, MutationSpec, RecombinationSpec, RunConfig};

pub fn print_run_parameters(config: &RunConfig) {
    let population = &config.population;
    println!("🧬 hapsim - Running Simulation");
    println!("============================================");
    let engine = match config.engine {
        EngineKind::Exact => "exact",
        EngineKind::Clone => "clone",
    };
    println!("  • Engine: {engine}");
    let topology = if population.circular { " (circular)" } else { "" };
    println!("  • Loci: {}{topology}", population.loci);
    match population.seed {
        Some(seed) => println!("  • Random Seed: {seed}"),
        None => println!("  • Random Seed: Random"),
    }
    match &config.initial {
        InitialState::Wildtype { size } => println!("  • Initial State: wildtype, N = {size}"),
        InitialState::AlleleFrequencies { size, .. } => {
            println!("  • Initial State: allele frequencies, N = {size}")
        }
        InitialState::Genotypes { counts, .. } => {
            let size: u64 = counts.iter().sum();
            println!("  • Initial State: {} genotypes, N = {size}", counts.len())
        }
    }
    match &config.mutation {
        Some(MutationSpec::Uniform(mu)) => println!("  • Mutation Rate: {mu:.2e}"),
        Some(MutationSpec::Asymmetric { forward, backward }) => {
            println!("  • Mutation Rate: {forward:.2e} (0→1), {backward:.2e} (1→0)")
        }
        Some(MutationSpec::PerLocus(_)) | Some(MutationSpec::Table { .. }) => {
            println!("  • Mutation Rate: per locus")
        }
        None => println!("  • Mutation Rate: 0"),
    }
    println!("  • Outcrossing Rate: {}", population.outcrossing_rate);
    match &config.recombination {
        Some(RecombinationSpec::Uniform(rate)) => {
            let model = population.recombination_model;
            println!("  • Recombination: {model} ({rate:.2e} per interval)")
        }
        _ => println!("  • Recombination: {}", population.recombination_model),
    }
    println!("  • Generations: {} (report every {})", config.generations, config.report_every);
    println!();
    println!(
        "{:>10} {:>10} {:>12} {:>12} {:>10} {:>10} {:>8}",
        "generation", "N", "fitness", "variance", "H_allele", "H_geno", "clones"
    );
}

pub fn print_report(report: &Report, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(report)?);
        return Ok(());
    }
    let clones = report
        .number_of_clones
        .map_or_else(|| "-".to_string(), |n| n.to_string());
    println!(
        "{:>10} {:>10} {:>12.4e} {:>12.4e} {:>10.4} {:>10.4} {:>8}",
        report.generation,
        report.population_size,
        report.fitness.mean,
        report.fitness.variance,
        report.allele_entropy,
        report.genotype_entropy,
        clones
    );
    Ok(())
}
