use std::path::Path;

use synctb::prelude::*;

fn scenarios() -> Vec<Scenario> {
    vec![
        Scenario::new("directed")
            .stimulus(Stimulus::directed(&[1, 0, 1, 1, 0, 0, 1, 0, 1, 1]))
            .model(Latency::new(1, 0)),
        Scenario::new("random")
            .cycles(1000)
            .stimulus(Stimulus::Random { seed: None })
            .model(Latency::new(1, 0)),
    ]
}

fn main() -> TbResult<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = RunnerConfig::load(&Path::new(env!("CARGO_MANIFEST_DIR")).join("demos/dff/synctb.toml"))?;
    let outcomes = Runner::new(config).run_all(&scenarios());
    for outcome in outcomes {
        outcome.into_result()?;
    }
    Ok(())
}
