use num_format::{Locale, ToFormattedString};
use prettytable::format::consts::FORMAT_NO_LINESEP_WITH_TITLE;
use prettytable::{Cell, Row, Table};

use crate::runner::TestOutcome;

fn speed(outcome: &TestOutcome) -> f64 {
    let secs = outcome.wall_time.as_secs_f64();
    if secs > 0.0 {
        outcome.sim_time_ns / secs
    } else {
        0.0
    }
}

/// End of run table, one row per scenario plus a total.
pub fn summary_table(outcomes: &[TestOutcome]) -> Table {
    let mut table = Table::new();
    table.set_format(*FORMAT_NO_LINESEP_WITH_TITLE);
    table.set_titles(Row::new(
        ["TEST", "RESULT", "CYCLES", "SIM TIME (ns)", "REAL TIME (s)", "SPEED (ns/s)", "SEED"]
            .iter()
            .map(|t| Cell::new(t))
            .collect(),
    ));
    for o in outcomes {
        table.add_row(Row::new(vec![
            Cell::new(&o.name),
            Cell::new(&o.state().to_string().to_uppercase()),
            Cell::new(&o.total_cycles.to_string()),
            Cell::new(&(o.sim_time_ns as u64).to_formatted_string(&Locale::en)),
            Cell::new(&format!("{:.3}", o.wall_time.as_secs_f64())),
            Cell::new(&format!("{:.3}", speed(o))),
            Cell::new(&o.seed.map(|s| s.to_string()).unwrap_or_else(|| "-".to_string())),
        ]));
    }
    let passed = outcomes.iter().filter(|o| o.passed()).count();
    table.add_row(Row::new(vec![
        Cell::new("TOTAL"),
        Cell::new(&format!("{}/{} PASSED", passed, outcomes.len())),
        Cell::new(&outcomes.iter().map(|o| o.total_cycles).sum::<usize>().to_string()),
    ]));
    table
}

pub fn log_summary(outcomes: &[TestOutcome]) {
    for line in summary_table(outcomes).to_string().lines() {
        log::info!("{}", line);
    }
}
