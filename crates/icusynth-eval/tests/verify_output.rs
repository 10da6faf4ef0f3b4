use std::fs;
use std::path::{Path, PathBuf};

use icusynth_core::GeneratorConfig;
use icusynth_eval::{EvalError, VerificationEngine, VerifyOptions, verify_output_dir};
use icusynth_generate::{GenerateOptions, GenerationEngine, SUMMARY_FILE, Variant};

fn temp_out_dir(label: &str) -> PathBuf {
    let mut dir = std::env::temp_dir();
    dir.push(format!("icusynth_eval_{label}_{}", uuid::Uuid::new_v4()));
    fs::create_dir_all(&dir).expect("create temp out dir");
    dir
}

fn publish(out: &Path, variant: Variant) -> PathBuf {
    let options = GenerateOptions {
        out_dir: out.to_path_buf(),
        config: GeneratorConfig {
            n_patients: 10,
            ..GeneratorConfig::default()
        },
    };
    GenerationEngine::new(options)
        .run(variant)
        .expect("generate variant")
        .output_dir
}

fn lenient(report_dir: &Path) -> VerificationEngine {
    VerificationEngine::new(VerifyOptions {
        strict: false,
        out_dir: Some(report_dir.to_path_buf()),
        ..VerifyOptions::default()
    })
}

/// Point the first diagnosis at an admission that does not exist.
fn orphan_first_diagnosis(dir: &Path) {
    let path = dir.join("diagnoses.csv");
    let mut reader = csv::Reader::from_path(&path).expect("open diagnoses");
    let headers = reader.headers().expect("headers").clone();
    let hadm = headers
        .iter()
        .position(|header| header == "hadm_id")
        .expect("hadm_id column");
    let mut rows: Vec<csv::StringRecord> = reader
        .records()
        .collect::<Result<_, _>>()
        .expect("read rows");
    assert!(!rows.is_empty(), "every admission has a primary diagnosis");

    let tampered: Vec<&str> = rows[0]
        .iter()
        .enumerate()
        .map(|(index, cell)| if index == hadm { "HADM99999999" } else { cell })
        .collect();
    rows[0] = csv::StringRecord::from(tampered);

    let mut writer = csv::Writer::from_path(&path).expect("rewrite diagnoses");
    writer.write_record(&headers).expect("write header");
    for row in &rows {
        writer.write_record(row).expect("write row");
    }
    writer.flush().expect("flush");
}

#[test]
fn freshly_published_variants_verify_clean() {
    let out = temp_out_dir("clean");
    for variant in Variant::ALL {
        let dir = publish(&out, variant);
        let reports = out.join(format!("reports_{}", variant.name()));
        let result = VerificationEngine::new(VerifyOptions {
            out_dir: Some(reports.clone()),
            ..VerifyOptions::default()
        })
        .run(variant, &dir)
        .expect("strict verification passes");

        assert!(result.is_clean(), "{variant}: {:?}", result.violations);
        assert_eq!(result.report.tables.len(), variant.schemas().len());
        for table in &result.report.tables {
            assert_eq!(table.checksum_matches(), Some(true), "{}", table.table);
            assert_eq!(table.rows_expected, Some(table.rows_found));
        }
        assert!(result.report.integrity.foreign_keys.checked > 0);
        assert_eq!(result.report.integrity.total_violations(), 0);
        assert!(result.report_path.starts_with(&reports));
        assert!(result.markdown_path.exists());
        assert!(result.markdown.contains("- status: clean"));
    }
    fs::remove_dir_all(&out).ok();
}

#[test]
fn default_options_write_reports_into_the_dataset_dir() {
    let out = temp_out_dir("default");
    let dir = publish(&out, Variant::FormatC);
    let result = verify_output_dir(Variant::FormatC, &dir).expect("verify");
    assert_eq!(result.report_dir, dir);
    assert!(dir.join("verification.json").exists());
    assert!(dir.join("verification.md").exists());
    fs::remove_dir_all(&out).ok();
}

#[test]
fn tampered_child_row_is_an_orphan_and_a_checksum_mismatch() {
    let out = temp_out_dir("tampered");
    let dir = publish(&out, Variant::FormatB);
    orphan_first_diagnosis(&dir);

    let result = lenient(&out.join("reports"))
        .run(Variant::FormatB, &dir)
        .expect("lenient verification returns the report");
    let codes: Vec<&str> = result.violations.iter().map(|v| v.code.as_str()).collect();
    assert!(codes.contains(&"checksum_mismatch"), "{codes:?}");
    assert!(codes.contains(&"missing_parent"), "{codes:?}");

    let orphan = result
        .violations
        .iter()
        .find(|v| v.code == "missing_parent")
        .expect("orphan violation");
    assert_eq!(orphan.path, "diagnoses");
    assert_eq!(orphan.row_index, Some(0));
    assert_eq!(
        result.report.table("diagnoses").and_then(|t| t.checksum_matches()),
        Some(false)
    );
    assert!(result.markdown.contains("## Top violations"));

    let strict = VerificationEngine::new(VerifyOptions {
        out_dir: Some(out.join("reports")),
        ..VerifyOptions::default()
    })
    .run(Variant::FormatB, &dir);
    assert!(matches!(strict, Err(EvalError::Violations(n)) if n >= 2));
    fs::remove_dir_all(&out).ok();
}

#[test]
fn missing_summary_skips_fingerprints_with_a_warning() {
    let out = temp_out_dir("no_summary");
    let dir = publish(&out, Variant::FormatB);
    fs::remove_file(dir.join(SUMMARY_FILE)).expect("remove summary");

    let result = lenient(&out.join("reports"))
        .run(Variant::FormatB, &dir)
        .expect("verify");
    assert!(result.is_clean(), "{:?}", result.violations);
    assert!(result.report.seed.is_none());
    assert!(
        result
            .report
            .warnings
            .iter()
            .any(|warning| warning.code == "missing_summary")
    );
    assert!(result.report.tables.iter().all(|t| t.rows_expected.is_none()));
    fs::remove_dir_all(&out).ok();
}

#[test]
fn summary_of_another_variant_is_rejected() {
    let out = temp_out_dir("wrong_variant");
    let dir = publish(&out, Variant::FormatC);
    let err = lenient(&out.join("reports"))
        .run(Variant::FormatB, &dir)
        .expect_err("format c summary is not format b");
    assert!(matches!(err, EvalError::InvalidDataset(_)));
    fs::remove_dir_all(&out).ok();
}
