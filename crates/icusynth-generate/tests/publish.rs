use std::fs;
use std::path::{Path, PathBuf};

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use icusynth_core::{GeneratorConfig, Value, collect_violations};
use icusynth_generate::variants::format_a::{EXPIRED, schema as clif};
use icusynth_generate::{
    DatasetSummary, GenerateOptions, GenerationEngine, README_FILE, SUMMARY_FILE, Variant,
};

fn temp_out_dir(label: &str) -> PathBuf {
    let mut dir = std::env::temp_dir();
    dir.push(format!("icusynth_generate_{label}_{}", uuid::Uuid::new_v4()));
    fs::create_dir_all(&dir).expect("create temp out dir");
    dir
}

fn small_config(n_patients: usize) -> GeneratorConfig {
    GeneratorConfig {
        n_patients,
        ..GeneratorConfig::default()
    }
}

fn engine(out_dir: &Path, config: GeneratorConfig) -> GenerationEngine {
    GenerationEngine::new(GenerateOptions {
        out_dir: out_dir.to_path_buf(),
        config,
    })
}

fn read_summary(dir: &Path) -> DatasetSummary {
    let contents = fs::read_to_string(dir.join(SUMMARY_FILE)).expect("read summary");
    serde_json::from_str(&contents).expect("parse summary")
}

#[test]
fn same_seed_gives_byte_identical_files() {
    let out_a = temp_out_dir("run_a");
    let out_b = temp_out_dir("run_b");
    let results_a = engine(&out_a, small_config(10))
        .run_all(&Variant::ALL)
        .expect("run A");
    let results_b = engine(&out_b, small_config(10))
        .run_all(&Variant::ALL)
        .expect("run B");

    for (a, b) in results_a.iter().zip(&results_b) {
        assert_eq!(a.summary, b.summary);
        for table in &a.summary.tables {
            let bytes_a = fs::read(a.output_dir.join(&table.file)).expect("read A");
            let bytes_b = fs::read(b.output_dir.join(&table.file)).expect("read B");
            assert_eq!(bytes_a, bytes_b, "{} differs", table.file);
        }
        let summary_a = fs::read(a.output_dir.join(SUMMARY_FILE)).expect("summary A");
        let summary_b = fs::read(b.output_dir.join(SUMMARY_FILE)).expect("summary B");
        assert_eq!(summary_a, summary_b);
    }
    fs::remove_dir_all(&out_a).ok();
    fs::remove_dir_all(&out_b).ok();
}

#[test]
fn different_seeds_change_the_data() {
    let config = small_config(10);
    let first = Variant::FormatB
        .build(&config, &mut ChaCha8Rng::seed_from_u64(1))
        .expect("seed 1");
    let second = Variant::FormatB
        .build(&config, &mut ChaCha8Rng::seed_from_u64(2))
        .expect("seed 2");
    assert_ne!(first.dataset, second.dataset);
}

#[test]
fn every_variant_has_zero_orphans() {
    let config = small_config(25);
    for variant in Variant::ALL {
        let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
        let output = variant.build(&config, &mut rng).expect("build variant");
        let violations = collect_violations(&output.dataset).expect("schemas are consistent");
        assert!(violations.is_empty(), "{variant}: {violations:?}");

        let names: Vec<String> = variant.schemas().into_iter().map(|s| s.name).collect();
        let built: Vec<String> = output
            .dataset
            .tables
            .iter()
            .map(|t| t.name().to_string())
            .collect();
        assert_eq!(names, built);
    }
}

#[test]
fn hospitalizations_end_at_death_inside_the_stay() {
    let config = small_config(120);
    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    let output = Variant::FormatA
        .build(&config, &mut rng)
        .expect("format a");
    let patients = output.dataset.table(clif::PATIENT).expect("patient table");
    let stays = output
        .dataset
        .table(clif::HOSPITALIZATION)
        .expect("hospitalization table");

    for stay in &stays.rows {
        let patient_id = stay.get("patient_id").and_then(Value::as_str);
        let patient = patients
            .rows
            .iter()
            .find(|row| row.get("patient_id").and_then(Value::as_str) == patient_id)
            .expect("owning patient");
        let death = patient.get("death_dttm").and_then(Value::as_timestamp);
        let admit = stay.get("admission_dttm").and_then(Value::as_timestamp).expect("admit");
        let discharge = stay
            .get("discharge_dttm")
            .and_then(Value::as_timestamp)
            .expect("discharge");
        let category = stay.get("discharge_category").and_then(Value::as_str);

        assert!(discharge >= admit);
        if let Some(death) = death.filter(|death| admit <= *death && *death <= discharge) {
            assert_eq!(discharge, death);
            assert_eq!(category, Some(EXPIRED));
        } else {
            assert_ne!(category, Some(EXPIRED));
        }
    }
}

#[test]
fn published_directory_has_tables_summary_and_readme() {
    let out = temp_out_dir("layout");
    let result = engine(&out, small_config(8))
        .run(Variant::FormatC)
        .expect("run format c");

    assert_eq!(result.output_dir, out.join("omop_format"));
    let summary = read_summary(&result.output_dir);
    assert_eq!(summary.variant, "format_c");
    assert_eq!(summary.tables.len(), 6);
    for table in &summary.tables {
        let contents = fs::read_to_string(result.output_dir.join(&table.file)).expect("csv");
        assert_eq!(contents.lines().count() as u64, table.rows + 1);
    }
    let readme = fs::read_to_string(result.output_dir.join(README_FILE)).expect("readme");
    assert!(readme.contains("visit_occurrence"));

    let leftovers: Vec<_> = fs::read_dir(&out)
        .expect("read out dir")
        .filter_map(Result::ok)
        .filter(|entry| entry.file_name().to_string_lossy().starts_with('.'))
        .collect();
    assert!(leftovers.is_empty());
    fs::remove_dir_all(&out).ok();
}

#[test]
fn failed_run_keeps_previous_output() {
    let out = temp_out_dir("failed");
    let first = engine(&out, small_config(6))
        .run(Variant::FormatB)
        .expect("first run");
    let before = fs::read(first.output_dir.join(SUMMARY_FILE)).expect("summary");

    let mut broken = small_config(6);
    broken.format_b.icu_stay_rate = 1.7;
    let err = engine(&out, broken).run(Variant::FormatB);
    assert!(err.is_err());

    let after = fs::read(first.output_dir.join(SUMMARY_FILE)).expect("summary");
    assert_eq!(before, after);
    let entries: Vec<String> = fs::read_dir(&out)
        .expect("read out dir")
        .filter_map(Result::ok)
        .map(|entry| entry.file_name().to_string_lossy().to_string())
        .collect();
    assert_eq!(entries, vec!["mimic_format".to_string()]);
    fs::remove_dir_all(&out).ok();
}
