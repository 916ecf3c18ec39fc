use skyproc_core::error::SkyprocError;
use skyproc_core::pipeline::config::{PipelineConfig, ReplacePolicy};
use tempfile::TempDir;

#[test]
fn test_default_config_round_trips_through_toml() {
    let config = PipelineConfig::default();
    let text = toml::to_string_pretty(&config).unwrap();
    let back: PipelineConfig = toml::from_str(&text).unwrap();
    assert_eq!(back, config);
    assert!(back.validate().is_ok());
}

#[test]
fn test_partial_config_fills_defaults() {
    let text = r#"
        airmass = [1.1, 1.3]

        [run]
        detectors = [1, 2]
        workers = 8

        [ccdproc]
        replace = "median"
        mask_vig = true

        [sciproc]
        coeff_airmass = 0.12
        mask_satellites = false

        [sciproc.background]
        box_size = 64
    "#;
    let config: PipelineConfig = toml::from_str(text).unwrap();

    assert_eq!(config.airmass, Some(vec![1.1, 1.3]));
    assert_eq!(config.run.detectors, vec![1, 2]);
    assert_eq!(config.run.workers, 8);
    assert_eq!(config.ccdproc.replace, ReplacePolicy::Median);
    assert!(config.ccdproc.mask_vig);
    assert_eq!(config.ccdproc.minimum_vig, 0.5);
    assert!(!config.sciproc.mask_satellites);
    assert!(config.sciproc.mask_cosmic_rays);
    assert_eq!(config.sciproc.background.box_size, 64);
    assert_eq!(config.sciproc.background.filter_size, 3);
    assert_eq!(config.sciproc.grow, 1.5);
    assert!(config.validate().is_ok());
}

#[test]
fn test_invalid_values_rejected() {
    let mut config = PipelineConfig::default();
    config.ccdproc.grow = -1.0;
    assert!(matches!(config.validate(), Err(SkyprocError::Configuration(_))));

    let mut config = PipelineConfig::default();
    config.ccdproc.minimum_vig = 1.5;
    assert!(matches!(config.validate(), Err(SkyprocError::Configuration(_))));

    let mut config = PipelineConfig::default();
    config.sciproc.background.box_size = 0;
    assert!(matches!(config.validate(), Err(SkyprocError::Configuration(_))));

    let mut config = PipelineConfig::default();
    config.airmass = Some(vec![1.2, 0.5]);
    assert!(matches!(config.validate(), Err(SkyprocError::Configuration(_))));

    let mut config = PipelineConfig::default();
    config.run.detectors.clear();
    assert!(config.validate().is_err());
}

#[test]
fn test_config_file_is_validated_on_load() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("pipeline.toml");
    std::fs::write(&path, "[sciproc]\ngrow = -2.0\n").unwrap();
    assert!(matches!(
        PipelineConfig::from_toml_file(&path),
        Err(SkyprocError::Configuration(_))
    ));

    std::fs::write(&path, "[sciproc\n").unwrap();
    assert!(matches!(
        PipelineConfig::from_toml_file(&path),
        Err(SkyprocError::ConfigParse(_))
    ));
}

#[test]
fn test_stage_configs_serialize_to_json() {
    let config = PipelineConfig::default();

    let json = serde_json::to_string(&config.sciproc).unwrap();
    let restored: skyproc_core::pipeline::config::SciProcConfig =
        serde_json::from_str(&json).unwrap();
    assert_eq!(restored, config.sciproc);

    let restored: skyproc_core::pipeline::config::CcdProcConfig =
        serde_json::from_str(r#"{"replace": "max"}"#).unwrap();
    assert_eq!(restored.replace, ReplacePolicy::Max);
    assert!(!restored.apply_gain);
}
