//! Run every study question on a visit extract.
use clap::Parser;
use healing_cohort_analysis::{header, study::StudyReport, ResultExt, Visits};
use qu::ick_use::*;
use std::path::PathBuf;

#[derive(Debug, Parser)]
struct Opt {
    /// The visit extract (CSV).
    dataset: PathBuf,
    /// Print the report as JSON instead of tables.
    #[clap(long)]
    json: bool,
}

#[qu::ick]
fn main(opt: Opt) -> Result {
    let visits = Visits::load(&opt.dataset).print_error()?;
    let report = StudyReport::run(&visits)?;

    if opt.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }
    for (title, table) in report.term_tables() {
        header(&title);
        println!("{}", table);
    }
    Ok(())
}
