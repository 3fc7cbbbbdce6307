use std::collections::HashMap;
use std::io::Write;

use tempfile::NamedTempFile;

use super::*;
use crate::errors::ExecutionError;

#[test]
fn test_every_default_profile_renders_a_runnable_command() {
    let registry = LanguageRegistry::with_defaults();
    assert!(!registry.is_empty());

    for profile in registry.list_enabled() {
        let resolved = registry.resolve(&profile.id).unwrap();
        let run = resolved.run_command_line();
        assert!(!run.trim().is_empty(), "{} has empty run command", profile.id);
        assert!(!run.contains(FILE_PLACEHOLDER));
        if let Some(compile) = resolved.compile_command_line() {
            assert!(compile.contains(&resolved.source_file_name()));
        } else {
            assert!(run.contains(&resolved.source_file_name()));
        }
        assert!(resolved.validate().is_ok());
    }
}

#[test]
fn test_python_profile_matches_catalog() {
    let registry = LanguageRegistry::with_defaults();
    let python = registry.resolve("python39").unwrap();
    assert_eq!(python.language, CodeLanguage::Python);
    assert_eq!(python.docker_image, "python:3.9-alpine");
    assert_eq!(python.source_file_name(), "main.py");
    assert_eq!(python.run_command_line(), "python3 main.py");
    assert_eq!(python.timeout_seconds, 10);
    assert_eq!(python.memory_limit_mb, 128);
    assert!(!python.has_compile_step());
}

#[test]
fn test_compiled_language_has_two_steps() {
    let registry = LanguageRegistry::with_defaults();
    let cpp = registry.resolve("cpp17").unwrap();
    assert!(cpp.has_compile_step());
    assert_eq!(
        cpp.compile_command_line().as_deref(),
        Some("g++ -O2 -std=c++17 -o /build/main main.cpp")
    );
    assert_eq!(cpp.run_command_line(), "/build/main");
}

#[test]
fn test_unknown_language_is_unsupported() {
    let registry = LanguageRegistry::with_defaults();
    assert_eq!(
        registry.resolve("cobol85").unwrap_err(),
        ExecutionError::UnsupportedLanguage("cobol85".to_string())
    );
}

#[test]
fn test_duplicate_ids_are_rejected() {
    let python = LanguageRegistry::with_defaults()
        .resolve("python39")
        .unwrap()
        .clone();
    let result = LanguageRegistry::new(vec![python.clone(), python]);
    assert!(matches!(result, Err(ExecutionError::ConfigError(_))));
}

#[test]
fn test_enabled_profile_without_file_placeholder_is_rejected() {
    let mut broken = LanguageRegistry::with_defaults()
        .resolve("node18")
        .unwrap()
        .clone();
    broken.run_command = "node".to_string();
    assert!(LanguageRegistry::new(vec![broken.clone()]).is_err());

    // Disabled entries are not held to the invariant
    broken.is_enabled = false;
    assert!(LanguageRegistry::new(vec![broken]).is_ok());
}

#[test]
fn test_overrides_adjust_limits_and_enablement() {
    let mut overrides = HashMap::new();
    overrides.insert(
        "python39".to_string(),
        LanguageOverride {
            timeout_seconds: Some(3),
            memory_limit_mb: Some(64),
            enabled: None,
        },
    );
    overrides.insert(
        "rust170".to_string(),
        LanguageOverride {
            enabled: Some(false),
            ..Default::default()
        },
    );

    let registry = LanguageRegistry::with_defaults()
        .apply_overrides(&overrides)
        .unwrap();
    let python = registry.resolve("python39").unwrap();
    assert_eq!(python.timeout_seconds, 3);
    assert_eq!(python.memory_limit_mb, 64);
    assert!(registry.resolve("rust170").is_err());
    assert!(registry.list_enabled().iter().all(|p| p.id != "rust170"));
}

#[test]
fn test_fixed_run_command_naming_the_source_file_is_accepted() {
    let mut profile = LanguageRegistry::with_defaults()
        .resolve("python39")
        .unwrap()
        .clone();
    profile.run_command = "python3 main.py".to_string();
    assert!(profile.validate().is_ok());
    assert_eq!(profile.run_command_line(), "python3 main.py");

    profile.run_command = "python3 other.py".to_string();
    assert!(profile.validate().is_err());
}

#[test]
fn test_oversized_memory_override_is_rejected() {
    let mut overrides = HashMap::new();
    overrides.insert(
        "python39".to_string(),
        LanguageOverride {
            memory_limit_mb: Some(u64::MAX),
            ..Default::default()
        },
    );
    let err = LanguageRegistry::with_defaults()
        .apply_overrides(&overrides)
        .unwrap_err();
    assert!(matches!(err, ExecutionError::ConfigError(_)));
}

#[test]
fn test_override_for_unknown_language_fails() {
    let mut overrides = HashMap::new();
    overrides.insert("brainfuck".to_string(), LanguageOverride::default());
    assert!(LanguageRegistry::with_defaults()
        .apply_overrides(&overrides)
        .is_err());
}

#[test]
fn test_find_by_language() {
    let registry = LanguageRegistry::with_defaults();
    assert_eq!(
        registry.find_by_language(CodeLanguage::JavaScript).unwrap().id,
        "node18"
    );
    assert!(registry.find_by_language(CodeLanguage::Kotlin).is_none());
}

#[tokio::test]
async fn test_catalog_from_yaml_file() {
    let yaml = r#"
languages:
  - id: "python311"
    name: "Python 3.11"
    language: "python"
    version: "3.11"
    docker_image: "python:3.11-slim"
    file_extension: ".py"
    run_command: "python {file}"
    timeout_seconds: 30
  - id: "kotlin19"
    name: "Kotlin"
    language: "kotlin"
    version: "1.9"
    docker_image: "zenika/kotlin:1.9"
    file_extension: "kt"
    compile_command: "kotlinc {file} -include-runtime -d /build/main.jar"
    run_command: "java -jar /build/main.jar"
    is_enabled: false
"#;
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(yaml.as_bytes()).unwrap();

    let registry = LanguageRegistry::from_yaml_file(file.path()).await.unwrap();
    assert_eq!(registry.len(), 2);
    assert_eq!(registry.list_enabled().len(), 1);

    let python = registry.resolve("python311").unwrap();
    assert_eq!(python.timeout_seconds, 30);
    assert_eq!(python.memory_limit_mb, 128);
    assert_eq!(python.run_command_line(), "python main.py");
    assert!(registry.resolve("kotlin19").is_err());
}
