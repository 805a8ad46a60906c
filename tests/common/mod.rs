#![allow(dead_code)]

use airq_predictor::classifier::{ForestParams, MaxFeatures};
use airq_predictor::Settings;
use std::io::Write;
use std::path::Path;

/// Raw export where PM2.5 is driven by wind speed: calm air is Bad, a
/// breeze is Moderate, strong wind is Good. 300 usable rows (130/100/70),
/// plus rows that the loader or the gray zone must drop.
pub fn write_raw_dataset(path: &Path) {
    let mut file = std::fs::File::create(path).unwrap();
    writeln!(file, "No,year,month,PM2.5,TEMP,PRES,DEWP,wd,WSPM,station").unwrap();
    for i in 0..300usize {
        let wind = (i % 30) as f64 * 0.5;
        let temp = -10.0 + (i % 50) as f64 * 0.8;
        let dewp = -30.0 + (i % 40) as f64;
        let pres = 995.0 + (i % 45) as f64;
        let pm25 = if wind > 8.0 {
            10.0 + (i % 20) as f64
        } else if wind > 3.0 {
            50.0 + (i % 20) as f64
        } else {
            100.0 + (i % 50) as f64
        };
        writeln!(
            file,
            "{},2014,3,{pm25},{temp},{pres},{dewp},NE,{wind},Dongsi",
            i + 1
        )
        .unwrap();
    }
    // Incomplete rows.
    writeln!(file, "301,2014,3,NA,1.0,1010.0,-5.0,NE,2.0,Dongsi").unwrap();
    writeln!(file, "302,2014,3,20,,1010.0,-5.0,NE,2.0,Dongsi").unwrap();
    // Gray zone rows.
    writeln!(file, "303,2014,3,34,1.0,1010.0,-5.0,NE,9.0,Dongsi").unwrap();
    writeln!(file, "304,2014,3,75,1.0,1010.0,-5.0,NE,4.0,Dongsi").unwrap();
    file.flush().unwrap();
}

/// Defaults with a small, deterministic forest and paths inside `dir`.
pub fn quick_settings(dir: &Path) -> Settings {
    let mut settings = Settings::default();
    settings.paths.dataset = dir.join("dataset.csv");
    settings.paths.raw_dataset = dir.join("raw.csv");
    settings.paths.artifact_dir = dir.join("artifacts");
    settings.forest = ForestParams {
        trees: 20,
        max_depth: 4,
        min_samples_leaf: 1,
        max_features: MaxFeatures::All,
        learning_rate: 0.3,
        jobs: 1,
        ..ForestParams::default()
    };
    settings
}
