use std::hash::RandomState;

use clap::Parser;
use clap::ValueEnum;
use quad_hash::HashTable;
use quad_hash::strategy::BuildHasherStrategy;
use quad_hash::strategy::HashStrategy;
use quad_hash::strategy::IntHash;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Strategy {
    /// The shift-xor integer fold
    Int,
    /// std's randomly seeded SipHash
    Sip,
}

#[derive(Parser, Debug)]
struct Args {
    #[arg(short = 'c', long = "target_capacity", default_value_t = 1000)]
    target_capacity: usize,

    /// Fraction of inserted keys to delete afterwards, leaving tombstones.
    #[arg(short = 'd', long = "delete_fraction", default_value_t = 0.0)]
    delete_fraction: f64,

    #[arg(short = 's', long = "strategy", value_enum, default_value_t = Strategy::Sip)]
    strategy: Strategy,
}

fn run<S: HashStrategy<u64>>(args: &Args, strategy: S) {
    println!(
        "Creating HashTable with target capacity: {}",
        args.target_capacity
    );

    let mut table: HashTable<u64, u64, S> =
        HashTable::with_capacity_and_strategy(args.target_capacity, strategy);
    // Keep the tombstones visible in the statistics.
    table.set_compaction(false);

    println!(
        "Actual capacity: {} buckets, {} keys before growth",
        table.capacity(),
        table.upper_bound()
    );
    println!("Filling table with u64 keys...");

    let num_values = table.upper_bound() as u64;
    for key in 0..num_values {
        let (slot, status) = table.put(key).expect("allocation failed");
        assert!(status.is_inserted(), "key already exists in table: {key}");
        table.set_value(slot, key * 2);
    }

    let to_delete = (num_values as f64 * args.delete_fraction.clamp(0.0, 1.0)) as u64;
    for key in 0..to_delete {
        table.remove(&key);
    }

    println!(
        "Inserted {} keys, deleted {}, {} live",
        num_values,
        to_delete,
        table.len()
    );
    println!(
        "Final load factor: {:.2}%",
        (table.len() as f64 / table.capacity().max(1) as f64) * 100.0
    );

    table.probe_histogram().print();
    table.debug_stats().print();
}

fn main() {
    let args = Args::parse();

    match args.strategy {
        Strategy::Int => run(&args, IntHash),
        Strategy::Sip => run(&args, BuildHasherStrategy::new(RandomState::new())),
    }
}
