use std::fs::{self, File};
use std::path::{Path, PathBuf};

use junit_report::{Duration, ReportBuilder, TestCaseBuilder, TestSuiteBuilder};

use crate::error::HarnessError;
use crate::runner::{TestOutcome, Verdict};
use crate::TbResult;

/// Writes `<dir>/results.xml` with one test case per outcome.
pub(crate) fn write_results(dir: &Path, suite: &str, outcomes: &[TestOutcome]) -> TbResult<PathBuf> {
    let mut test_cases = Vec::new();
    for o in outcomes {
        let time = Duration::seconds_f64(o.wall_time.as_secs_f64());
        let tc = match &o.verdict {
            Verdict::Passed => TestCaseBuilder::success(&o.name, time),
            Verdict::Failed(_) => TestCaseBuilder::failure(&o.name, time, "failure", &o.message()),
            Verdict::SetupError { .. } | Verdict::Deadlock { .. } => {
                TestCaseBuilder::error(&o.name, time, &o.state().to_string(), &o.message())
            }
        }
        .build();
        test_cases.push(tc);
    }

    let test_suite = TestSuiteBuilder::new(suite).add_testcases(test_cases).build();
    let report = ReportBuilder::new().add_testsuite(test_suite).build();
    fs::create_dir_all(dir)?;
    let path = dir.join("results.xml");
    let file = File::create(&path)?;
    report
        .write_xml(file)
        .map_err(|e| HarnessError::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string())))?;
    Ok(path)
}
