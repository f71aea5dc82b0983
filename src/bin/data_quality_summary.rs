use clap::Parser;
use healing_cohort_analysis::{cohort::aggregate, header, Visits};
use qu::ick_use::*;
use std::path::PathBuf;

#[derive(Debug, Parser)]
struct Opt {
    dataset: PathBuf,
    /// Also list every ledger entry.
    #[clap(long, short)]
    entries: bool,
}

#[qu::ick]
pub fn main(opt: Opt) -> Result {
    let visits = Visits::load(&opt.dataset)?;
    let aggregation = aggregate(&visits);

    header("Data stats");
    println!("total visits: {}", visits.len());
    println!("rows without identifier: {}", visits.null_identifier_rows().count());
    println!("distinct patients: {}", visits.distinct_patient_count());
    if let Some(date) = visits.iter().filter_map(|v| v.contact_date.valid()).min() {
        println!("earliest contact: {}", date);
    }
    if let Some(date) = visits.iter().filter_map(|v| v.contact_date.valid()).max() {
        println!("latest contact: {}", date);
    }

    header("Healing groups");
    println!("{}", aggregation.cohort.group_table());

    header("Data quality issues");
    println!("{}", aggregation.ledger.summary_table());
    if opt.entries {
        println!("{}", aggregation.ledger.term_table());
    }
    Ok(())
}
