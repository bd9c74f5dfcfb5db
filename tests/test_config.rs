//! Comprehensive tests for configuration parsing
//!
//! This file tests the config module including:
//! - Loading the bundled JSON training configs
//! - Parsing every optimizer type and the learning-rate decay block
//! - Handling invalid JSON and missing files
//! - Handling missing optional fields with defaults

use std::io::Write;
use tempfile::NamedTempFile;
use tiny_convnet::config::{load_config, validate_config, OptimizerConfig, TrainingConfig};
use tiny_convnet::{Loss, NetworkError};

fn load_str(contents: &str) -> tiny_convnet::Result<TrainingConfig> {
    let mut file = NamedTempFile::new().expect("failed to create temp file");
    file.write_all(contents.as_bytes())
        .expect("failed to write temp config");
    load_config(file.path().to_str().unwrap())
}

// ============================================================================
// Valid Config Loading Tests
// ============================================================================

mod valid_config_tests {
    use super::*;

    #[test]
    fn test_load_levenberg_marquardt_config() {
        let config = load_config("config/training.json").expect("Failed to load training config");

        assert_eq!(config.minibatch_size, 10);
        assert_eq!(config.epochs, 30);
        assert_eq!(config.workers, 4);
        assert_eq!(config.loss, Loss::Mse);
        assert_eq!(
            config.optimizer,
            OptimizerConfig::LevenbergMarquardt {
                learning_rate: Some(0.00085),
                mu: Some(0.02),
            }
        );

        let optimizer = config.build_optimizer();
        assert!(optimizer.requires_hessian());
        assert_eq!(optimizer.learning_rate(), 0.00085);
    }

    #[test]
    fn test_levenberg_marquardt_schedule_has_floor() {
        let config = load_config("config/training.json").unwrap();
        let mut scheduler = config.build_scheduler().expect("lr_decay is configured");
        for _ in 0..200 {
            scheduler.step();
        }
        assert_eq!(scheduler.get_lr(), 0.00001);
    }

    #[test]
    fn test_load_adam_config() {
        let config = load_config("config/training_adam.json").expect("Failed to load adam config");

        assert_eq!(config.minibatch_size, 32);
        assert_eq!(config.seed, 42);
        assert_eq!(config.loss, Loss::CrossEntropyMulticlass);
        assert!(!config.build_optimizer().requires_hessian());

        let mut scheduler = config.build_scheduler().unwrap();
        let rates: Vec<f32> = (0..6)
            .map(|_| {
                scheduler.step();
                scheduler.get_lr()
            })
            .collect();
        assert_eq!(rates, vec![0.001, 0.001, 0.0005, 0.0005, 0.0005, 0.00025]);
    }

    #[test]
    fn test_momentum_config() {
        let config = load_str(
            r#"{ "optimizer": { "type": "momentum", "learning_rate": 0.05, "mu": 0.8,
                 "weight_decay": 0.0001 } }"#,
        )
        .unwrap();
        let optimizer = config.build_optimizer();
        assert_eq!(optimizer.learning_rate(), 0.05);
        assert!(!optimizer.requires_hessian());
    }

    #[test]
    fn test_missing_optional_fields_use_defaults() {
        let config = load_str("{}").unwrap();
        assert_eq!(config, TrainingConfig::default());
        assert_eq!(config.minibatch_size, 10);
        assert_eq!(config.epochs, 20);
        assert_eq!(config.workers, 1);
        assert!(config.build_scheduler().is_none());
    }
}

// ============================================================================
// Invalid Config Tests
// ============================================================================

mod invalid_config_tests {
    use super::*;

    #[test]
    fn test_invalid_json() {
        let result = load_str(r#"{ "minibatch_size": "#);
        assert!(matches!(result, Err(NetworkError::Json(_))));
    }

    #[test]
    fn test_unknown_loss() {
        let result = load_str(r#"{ "loss": "hinge" }"#);
        assert!(matches!(result, Err(NetworkError::Json(_))));
    }

    #[test]
    fn test_missing_file() {
        let result = load_config("config/does_not_exist.json");
        assert!(matches!(result, Err(NetworkError::Io(_))));
    }

    #[test]
    fn test_zero_workers_rejected() {
        let result = load_str(r#"{ "workers": 0 }"#);
        assert!(matches!(result, Err(NetworkError::InvalidConfig(_))));
    }

    #[test]
    fn test_negative_learning_rate_rejected() {
        let result = load_str(r#"{ "optimizer": { "type": "sgd", "learning_rate": -0.1 } }"#);
        let err = result.unwrap_err();
        assert!(err.to_string().contains("learning_rate"));
    }

    #[test]
    fn test_bad_decay_rejected() {
        assert!(load_str(r#"{ "lr_decay": { "gamma": 1.5 } }"#).is_err());
        assert!(load_str(r#"{ "lr_decay": { "gamma": 0.5, "step_size": 0 } }"#).is_err());
    }

    #[test]
    fn test_momentum_mu_out_of_range() {
        let config = TrainingConfig {
            optimizer: OptimizerConfig::Momentum {
                learning_rate: None,
                mu: Some(1.0),
                weight_decay: None,
            },
            ..TrainingConfig::default()
        };
        assert!(validate_config(&config).is_err());
    }
}
