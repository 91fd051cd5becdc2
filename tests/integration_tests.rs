//! Integration tests for the djcurate pipeline
//!
//! These tests run analysis and sequencing end to end over small
//! generated libraries.

use djcurate::cache::AnalysisCache;
use djcurate::config::Settings;
use djcurate::extract::{sidecar_path, ExtractorKind, FeatureExtractor, SignalExtractor};
use djcurate::library::{read_sets_report, DirectoryLibrary, LibraryConnector, LibraryTrack};
use djcurate::pipeline::{self, AnalysisPipeline, PipelineOptions};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Generate a sine wave WAV file for testing
///
/// Creates a mono 16-bit WAV file at the specified path.
fn generate_sine_wav(path: &Path, frequency_hz: f32, amplitude: f32, duration_secs: f32, sample_rate: u32) {
    use std::f32::consts::PI;

    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(path, spec).expect("Failed to create WAV file");

    let num_samples = (duration_secs * sample_rate as f32) as usize;
    for i in 0..num_samples {
        let t = i as f32 / sample_rate as f32;
        let sample = (2.0 * PI * frequency_hz * t).sin() * amplitude;
        let sample_i16 = (sample * 32767.0) as i16;
        writer.write_sample(sample_i16).expect("Failed to write sample");
    }

    writer.finalize().expect("Failed to finalize WAV");
}

/// Short WAV plus a sidecar carrying its features
fn add_track(dir: &Path, name: &str, bpm: f64, key: &str, energy: u8) -> PathBuf {
    fs::create_dir_all(dir).expect("Failed to create collection dir");
    let path = dir.join(format!("{}.wav", name));
    generate_sine_wav(&path, 220.0, 0.3, 0.5, 8000);
    let sidecar = serde_json::json!({
        "title": name,
        "bpm": bpm,
        "bpm_confidence": 0.9,
        "key": key,
        "key_confidence": 0.8,
        "energy": energy,
        "duration_secs": 360.0,
    });
    fs::write(sidecar_path(&path), sidecar.to_string()).expect("Failed to write sidecar");
    path
}

/// Create test settings with progress bars disabled
fn create_test_settings(input: &Path, output: &Path) -> Settings {
    Settings {
        input: input.to_path_buf(),
        output: output.to_path_buf(),
        cache_path: output.join("analysis-cache.json"),
        extractor: ExtractorKind::Sidecar,
        workers: 2,
        show_progress: false, // Disable progress bars in tests
        ..Settings::default()
    }
}

fn house_collection(input: &Path) {
    let house = input.join("house");
    let tracks = [
        ("opener", 122.0, "8A", 45),
        ("groove", 123.0, "8A", 55),
        ("lift", 124.0, "9A", 65),
        ("anthem", 125.0, "9A", 80),
        ("drive", 125.0, "10A", 75),
        ("outro", 124.0, "9A", 50),
    ];
    for (name, bpm, key, energy) in tracks {
        add_track(&house, name, bpm, key, energy);
    }
}

#[test]
fn test_run_writes_sets_report() {
    let input_dir = TempDir::new().expect("Failed to create input temp dir");
    let output_dir = TempDir::new().expect("Failed to create output temp dir");
    house_collection(input_dir.path());

    let settings = create_test_settings(input_dir.path(), output_dir.path());
    let summary = pipeline::run(&settings).expect("Pipeline should succeed");

    assert_eq!(summary.total_tracks(), 6, "Should find 6 files");
    assert_eq!(summary.failed(), 0, "Should have no failures");
    assert_eq!(summary.sets(), 1);

    let house = &summary.collections[0];
    assert_eq!(house.name, "house");
    assert_eq!(house.extracted, 6);
    assert_eq!(house.cached, 0);
    assert_eq!(house.placed, 6);

    let report_path = output_dir.path().join("house.sets.json");
    assert_eq!(house.report.as_deref(), Some(report_path.as_path()));
    let report = read_sets_report(&report_path).expect("Report should parse");
    assert_eq!(report.metadata.collection, "house");
    assert_eq!(report.metadata.set_count, 1);
    assert_eq!(report.metadata.placed_count, 6);
    assert_eq!(report.metadata.incomplete_arc_count, report.outcome.incomplete_arc_count());
    assert_eq!(report.outcome.sets[0].len(), 6);

    // every placed track points back at its audio file
    for track in &report.outcome.sets[0].tracks {
        assert!(track.record.source_path.exists());
        assert_eq!(track.record.fingerprint.len(), 64);
    }
}

#[test]
fn test_second_run_is_served_from_cache() {
    let input_dir = TempDir::new().expect("Failed to create input temp dir");
    let output_dir = TempDir::new().expect("Failed to create output temp dir");
    house_collection(input_dir.path());
    let settings = create_test_settings(input_dir.path(), output_dir.path());

    let first = pipeline::run(&settings).expect("First run should succeed");
    assert!(settings.cache_path.exists(), "Cache file should exist");

    // sidecars are gone, so only the cache can supply the features
    for entry in fs::read_dir(input_dir.path().join("house")).unwrap() {
        let path = entry.unwrap().path();
        if path.to_string_lossy().ends_with(".features.json") {
            fs::remove_file(path).unwrap();
        }
    }

    let second = pipeline::run(&settings).expect("Second run should succeed");
    assert_eq!(second.collections[0].cached, 6);
    assert_eq!(second.collections[0].extracted, 0);
    assert_eq!(second.failed(), 0);

    let report = read_sets_report(&output_dir.path().join("house.sets.json")).unwrap();
    assert_eq!(first.sets(), second.sets());
    assert_eq!(report.outcome.sets[0].len(), 6);
}

#[test]
fn test_bad_file_does_not_stop_the_run() {
    let input_dir = TempDir::new().expect("Failed to create input temp dir");
    let output_dir = TempDir::new().expect("Failed to create output temp dir");
    house_collection(input_dir.path());
    fs::write(input_dir.path().join("house").join("broken.mp3"), b"definitely not audio")
        .expect("Failed to write garbage file");

    let mut settings = create_test_settings(input_dir.path(), output_dir.path());
    settings.extractor = ExtractorKind::Auto;
    let summary = pipeline::run(&settings).expect("Pipeline should succeed despite a bad file");

    assert_eq!(summary.total_tracks(), 7);
    assert_eq!(summary.failed(), 1);
    assert_eq!(summary.collections[0].placed, 6);
    assert!(output_dir.path().join("house.sets.json").exists());
}

#[test]
fn test_collections_are_sequenced_separately() {
    let input_dir = TempDir::new().expect("Failed to create input temp dir");
    let output_dir = TempDir::new().expect("Failed to create output temp dir");
    house_collection(input_dir.path());
    let techno = input_dir.path().join("techno");
    for i in 0..4 {
        add_track(&techno, &format!("warehouse{}", i), 132.0 + i as f64, "5A", 70);
    }

    let summary = pipeline::run(&create_test_settings(input_dir.path(), output_dir.path()))
        .expect("Pipeline should succeed");

    let names: Vec<&str> = summary.collections.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, ["house", "techno"]);
    assert!(output_dir.path().join("house.sets.json").exists());
    assert!(output_dir.path().join("techno.sets.json").exists());

    let techno = read_sets_report(&output_dir.path().join("techno.sets.json")).unwrap();
    let paths: Vec<String> = techno
        .outcome
        .sets
        .iter()
        .flat_map(|s| s.tracks.iter().map(|t| t.record.source_path.to_string_lossy().into_owned()))
        .collect();
    assert_eq!(paths.len(), 4);
    assert!(paths.iter().all(|p| p.contains("techno")));
}

#[test]
fn test_empty_library() {
    let input_dir = TempDir::new().expect("Failed to create input temp dir");
    let output_dir = TempDir::new().expect("Failed to create output temp dir");

    let summary = pipeline::run(&create_test_settings(input_dir.path(), output_dir.path()))
        .expect("Empty library should succeed");

    assert_eq!(summary.total_tracks(), 0);
    assert_eq!(summary.sets(), 0);
    assert!(summary.collections.is_empty());
}

#[test]
fn test_analyze_only_skips_sequencing() {
    let input_dir = TempDir::new().expect("Failed to create input temp dir");
    let output_dir = TempDir::new().expect("Failed to create output temp dir");
    house_collection(input_dir.path());

    let mut settings = create_test_settings(input_dir.path(), output_dir.path());
    settings.analyze_only = true;
    let summary = pipeline::run(&settings).expect("Pipeline should succeed");

    assert_eq!(summary.collections[0].extracted, 6);
    assert_eq!(summary.collections[0].report, None);
    assert!(!output_dir.path().join("house.sets.json").exists());
    assert!(settings.cache_path.exists(), "Analysis should still be cached");
}

#[test]
fn test_signal_extractor_measures_wav() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let loud = dir.path().join("loud.wav");
    let quiet = dir.path().join("quiet.wav");
    generate_sine_wav(&loud, 440.0, 0.8, 3.0, 22050);
    generate_sine_wav(&quiet, 440.0, 0.02, 3.0, 22050);

    let extractor = SignalExtractor::new();
    let measure = |path: &Path| {
        let mut track = LibraryTrack::new(path);
        track.known_bpm = Some(126.0);
        extractor.extract(&track, None).expect("Signal extraction should succeed")
    };

    let loud = measure(&loud);
    let quiet = measure(&quiet);
    assert!((loud.duration_secs - 3.0).abs() < 0.05, "duration {}", loud.duration_secs);
    assert_eq!(loud.bpm, 126.0);
    assert!(loud.lufs.unwrap() > quiet.lufs.unwrap());
    assert!(loud.energy > quiet.energy);
    assert!(loud.dynamic_range_db.unwrap() < 1.0);
}

#[test]
fn test_pipeline_preserves_input_order() {
    let input_dir = TempDir::new().expect("Failed to create input temp dir");
    let cache_dir = TempDir::new().expect("Failed to create cache temp dir");
    house_collection(input_dir.path());

    let library = DirectoryLibrary::new(input_dir.path(), cache_dir.path());
    let mut tracks = library.tracks("house").expect("Collection should list");
    tracks.reverse();

    let cache = AnalysisCache::open(
        cache_dir.path().join("cache.json"),
        djcurate::extract::select(ExtractorKind::Sidecar).versions(),
    );
    let pipeline = AnalysisPipeline::new(
        djcurate::extract::select(ExtractorKind::Sidecar),
        PipelineOptions {
            workers: 4,
            ..PipelineOptions::default()
        },
    );
    let outcome = pipeline.run(&tracks, &cache).expect("Analysis should succeed");

    let analyzed: Vec<&Path> = outcome.analyses.iter().map(|a| a.track.path.as_path()).collect();
    let expected: Vec<&Path> = tracks.iter().map(|t| t.path.as_path()).collect();
    assert_eq!(analyzed, expected);
    assert_eq!(cache.len(), 6);
}
