use std::fs;
use std::path::{Path, PathBuf};

use synctb::prelude::*;
use tempfile::TempDir;

const LITERAL_DRIVE: [u64; 10] = [1, 0, 1, 1, 0, 0, 1, 0, 1, 1];
const LITERAL_SAMPLES: [u64; 10] = [0, 1, 0, 1, 1, 0, 0, 1, 0, 1];

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Temp dir with an HDL source declaring `toplevel`.
fn project(toplevel: &str) -> (TempDir, RunnerConfig) {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join(format!("{}.vhd", toplevel));
    fs::write(
        &source,
        format!(
            "library ieee;\nuse ieee.std_logic_1164.all;\n\nentity {} is\n  port (clk, d : in std_logic; q : out std_logic);\nend entity;\n",
            toplevel
        ),
    )
    .unwrap();
    let config = RunnerConfig::new(vec![source], toplevel).build_dir(dir.path().join("sim_build"));
    (dir, config)
}

fn sampled(outcome: &TestOutcome) -> Vec<u64> {
    outcome
        .records
        .iter()
        .map(|r| r.sampled.to_u64().unwrap())
        .collect()
}

#[test]
fn pipelined_register_matches_one_cycle_latency() {
    init_logger();
    let (_dir, config) = project("dff_pipe");
    let scenario = Scenario::new("literal")
        .cycles(10)
        .stimulus(Stimulus::directed(&LITERAL_DRIVE))
        .model(Latency::new(1, 0));

    let outcome = Runner::new(config).run(&scenario);
    assert_eq!(outcome.verdict, Verdict::Passed, "{}", outcome.message());
    assert_eq!(outcome.total_cycles, 10);
    assert_eq!(sampled(&outcome), LITERAL_SAMPLES);
    assert_eq!(outcome.seed, None);
    assert!(outcome.sim_time_ns > 0.0);
}

#[test]
fn zero_latency_register_fails_one_cycle_model_at_cycle_zero() {
    init_logger();
    let (_dir, config) = project("dff");
    let scenario = Scenario::new("mismatch")
        .stimulus(Stimulus::directed(&LITERAL_DRIVE))
        .model(Latency::new(1, 0));

    let outcome = Runner::new(config).run(&scenario);
    assert_eq!(outcome.state(), RunState::Failed);
    assert_eq!(outcome.first_failing_cycle(), Some(0));
    assert_eq!(
        outcome.message(),
        "output dff.q was incorrect on cycle 0: expected '0', observed '1'"
    );
    // fail fast: nothing recorded past the failing cycle
    assert_eq!(outcome.total_cycles, 1);
    assert!(matches!(outcome.into_result(), Err(HarnessError::Assertion(_))));
}

#[test]
fn zero_latency_register_passes_identity_model() {
    init_logger();
    let (_dir, config) = project("dff");
    let scenario = Scenario::new("random").cycles(50).stimulus(Stimulus::random(1234));
    let outcome = Runner::new(config).run(&scenario);
    assert!(outcome.passed(), "{}", outcome.message());
    assert_eq!(outcome.total_cycles, 50);
    assert_eq!(outcome.seed, Some(1234));
}

#[test]
fn same_seed_reproduces_records() {
    init_logger();
    let (_dir, config) = project("dff");
    let runner = Runner::new(config);
    let scenario = Scenario::new("seeded").cycles(32).stimulus(Stimulus::random(42));

    let first = runner.run(&scenario);
    let second = runner.run(&scenario);
    assert!(first.passed());
    assert_eq!(first.records, second.records);
    assert_eq!(first.verdict, second.verdict);
    assert_eq!(first.sim_time_ns, second.sim_time_ns);
}

#[test]
fn unseeded_random_records_its_seed() {
    init_logger();
    let (_dir, config) = project("dff");
    let runner = Runner::new(config);
    let first = runner.run(&Scenario::new("unseeded").cycles(16));
    let seed = first.seed.unwrap();

    let replay = runner.run(&Scenario::new("replay").cycles(16).stimulus(Stimulus::random(seed)));
    assert_eq!(first.records, replay.records);
}

#[test]
fn continue_policy_records_every_cycle() {
    init_logger();
    let (_dir, config) = project("dff");
    let runner = Runner::new(config);
    // identity device against a one cycle model: mismatches on cycles 0, 2 and 4
    let drive = [1, 1, 0, 0, 1];
    let base = Scenario::new("policy")
        .stimulus(Stimulus::directed(&drive))
        .model(Latency::new(1, 0));

    let fail_fast = runner.run(&base);
    assert_eq!(fail_fast.total_cycles, 1);

    let cont = runner.run(&base.clone().policy(FailurePolicy::Continue));
    assert_eq!(cont.total_cycles, 5);
    assert_eq!(cont.first_failing_cycle(), Some(0));
    let failing: Vec<usize> = cont
        .records
        .iter()
        .filter(|r| !r.passed)
        .map(|r| r.cycle)
        .collect();
    assert_eq!(failing, vec![0, 2, 4]);
}

#[test]
fn samples_are_one_period_after_drives() {
    init_logger();
    let (_dir, config) = project("dff_pipe");
    let spec = ClockSpec::new(5, TimeUnit::Ns);
    let scenario = Scenario::new("timing")
        .clock("clk", spec)
        .settle_cycles(2)
        .stimulus(Stimulus::random(3))
        .model(Latency::new(1, 0));

    let outcome = Runner::new(config).run(&scenario);
    assert!(outcome.passed(), "{}", outcome.message());
    let period = spec.period_steps(Precision(TimeUnit::Ps)).unwrap();
    assert_eq!(period, 10_000);
    // first falling edge is at one period, plus two settle cycles
    assert_eq!(outcome.records[0].drive_time, SimTime(3 * period));
    for pair in outcome.records.windows(2) {
        assert_eq!(pair[0].sample_time, pair[1].drive_time);
    }
    for r in &outcome.records {
        assert_eq!(r.sample_time.steps() - r.drive_time.steps(), period);
    }
}

#[test]
fn missing_source_is_setup_error() {
    init_logger();
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("does_not_exist.vhd");
    let config = RunnerConfig::new(vec![missing], "dff").build_dir(dir.path().join("sim_build"));

    let outcome = Runner::new(config).run(&Scenario::new("setup"));
    match &outcome.verdict {
        Verdict::SetupError { status, diagnostic } => {
            assert_eq!(*status, None);
            assert!(diagnostic.contains("does_not_exist.vhd"));
        }
        other => panic!("expected a setup error, got {:?}", other),
    }
    assert_eq!(outcome.total_cycles, 0);
    assert!(matches!(outcome.into_result(), Err(HarnessError::Setup { .. })));
}

#[test]
fn unknown_port_is_setup_error() {
    init_logger();
    let (_dir, config) = project("dff");
    let outcome = Runner::new(config).run(&Scenario::new("ports").ports("d", "dout"));
    assert_eq!(outcome.state(), RunState::SetupError);
    assert!(outcome.message().contains("dff.dout"));
}

#[test]
fn directed_value_wider_than_port_is_setup_error() {
    init_logger();
    let (_dir, config) = project("dff");
    let scenario = Scenario::new("too_wide").stimulus(Stimulus::directed(&[2, 3, 2]));
    let outcome = Runner::new(config).run(&scenario);
    assert_eq!(outcome.state(), RunState::SetupError);
    assert!(outcome.message().contains("2 does not fit the 1 bit port dff.d"));
    assert_eq!(outcome.total_cycles, 0);
}

#[cfg(unix)]
#[test]
fn analysis_exit_status_reaches_the_caller() {
    init_logger();
    let (_dir, config) = project("dff");
    let config = config.toolchain(Toolchain::Command {
        program: "sh".into(),
        args: vec!["-c".into(), "echo 'cannot find entity' >&2; exit 4".into()],
    });
    let outcome = Runner::new(config).run(&Scenario::new("analysis"));
    assert_eq!(
        outcome.verdict,
        Verdict::SetupError {
            status: Some(4),
            diagnostic: "cannot find entity".into()
        }
    );
}

#[test]
fn sim_time_watchdog_reports_deadlock() {
    init_logger();
    let (_dir, config) = project("dff");
    let config = config.watchdog(Watchdog {
        max_sim_time: Some(TimeSpan {
            value: 25,
            unit: TimeUnit::Us,
        }),
        max_wall_ms: None,
    });
    let outcome = Runner::new(config).run(&Scenario::new("slow").cycles(10));
    assert_eq!(outcome.state(), RunState::Deadlock);
    assert!(outcome.message().contains("budget"));
    // the cycle sampled at 20us made it in
    assert_eq!(outcome.total_cycles, 1);
}

/// Identity model that takes real time to evaluate.
#[derive(Clone)]
struct SlowModel;

impl Model for SlowModel {
    fn expect(&mut self, _cycle: usize, driven: &Value) -> Value {
        std::thread::sleep(std::time::Duration::from_millis(5));
        driven.clone()
    }

    fn boxed_clone(&self) -> Box<dyn Model> {
        Box::new(SlowModel)
    }

    fn describe(&self) -> String {
        "slow identity".to_string()
    }
}

#[test]
fn wall_time_watchdog_reports_deadlock() {
    init_logger();
    let (_dir, config) = project("dff");
    let config = config.watchdog(Watchdog {
        max_sim_time: None,
        max_wall_ms: Some(1),
    });
    let scenario = Scenario::new("slow_model").cycles(100).model(SlowModel);
    let outcome = Runner::new(config).run(&scenario);
    assert_eq!(outcome.state(), RunState::Deadlock);
    assert!(outcome.message().contains("real time"));
    assert!(outcome.total_cycles < 100);
}

#[test]
fn runs_are_isolated() {
    init_logger();
    let (_dir, config) = project("dff");
    let scenarios = vec![
        Scenario::new("first_fails")
            .stimulus(Stimulus::directed(&[1, 1]))
            .model(Latency::new(1, 0)),
        Scenario::new("second_passes").stimulus(Stimulus::directed(&[1, 1])),
    ];
    let outcomes = Runner::new(config).run_all(&scenarios);
    assert_eq!(outcomes.len(), 2);
    assert_eq!(outcomes[0].state(), RunState::Failed);
    assert_eq!(outcomes[1].state(), RunState::Passed);
    assert_eq!(outcomes[1].records[0].drive_time, outcomes[0].records[0].drive_time);
}

#[test]
fn custom_registry_drives_wide_ports() {
    init_logger();
    let (_dir, config) = project("dff");
    let mut backend = ModelBackend::default();
    backend
        .registry_mut()
        .register("dff", || Box::new(Register::new(2, 16, 0xbeef)));
    let scenario = Scenario::new("wide")
        .cycles(20)
        .stimulus(Stimulus::random(5))
        .model(Latency::new(1, 0xbeef));
    let outcome = Runner::with_backend(config, backend).run(&scenario);
    assert!(outcome.passed(), "{}", outcome.message());
    assert_eq!(outcome.records[0].sampled.to_u64(), Some(0xbeef));
    assert!(outcome.records.iter().all(|r| r.driven.width() == 16));
}

#[test]
fn writes_waveform_and_junit_artifacts() {
    init_logger();
    let (dir, config) = project("dff_pipe");
    let build: PathBuf = dir.path().join("sim_build");
    let scenario = Scenario::new("traced")
        .stimulus(Stimulus::directed(&LITERAL_DRIVE))
        .model(Latency::new(1, 0));
    let outcome = Runner::new(config.trace(true)).run(&scenario);
    assert!(outcome.passed());

    let vcd = build.join("traced.vcd");
    assert_eq!(outcome.artifacts, vec![vcd.clone()]);
    let text = fs::read_to_string(&vcd).unwrap();
    assert!(text.contains("$enddefinitions $end"));
    assert!(text.contains("dff_pipe"));

    let xml = fs::read_to_string(build.join("results.xml")).unwrap();
    assert!(xml.contains("name=\"traced\""));
}

#[test]
fn junit_can_be_disabled() {
    init_logger();
    let (dir, config) = project("dff");
    let outcome = Runner::new(config.junit(false)).run(&Scenario::new("quiet").cycles(2));
    assert!(outcome.passed());
    assert!(!dir.path().join("sim_build").join("results.xml").exists());
}

fn write_config(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("synctb.toml");
    fs::write(&path, body).unwrap();
    path
}

#[test]
fn runner_from_toml_file() {
    init_logger();
    let (dir, _) = project("dff_pipe");
    let path = write_config(
        dir.path(),
        r#"
            sources = ["dff_pipe.vhd"]
            toplevel = "dff_pipe"
            build_dir = "out"
            precision = "ns"

            [watchdog]
            max_wall_ms = 10000
        "#,
    );
    let config = RunnerConfig::load(&path).unwrap();
    let scenario = Scenario::new("from_toml")
        .stimulus(Stimulus::directed(&LITERAL_DRIVE))
        .model(Latency::new(1, 0));
    let outcome = Runner::new(config).run(&scenario);
    assert!(outcome.passed(), "{}", outcome.message());
    assert_eq!(sampled(&outcome), LITERAL_SAMPLES);
    // ns precision: one 10us period is 10_000 steps
    assert_eq!(outcome.records[0].drive_time, SimTime(10_000));
    assert!(dir.path().join("out").join("results.xml").exists());
}
