use std::{collections::HashMap, path::PathBuf};

use mailgrader::{
    GraderError, Stage,
    config::{Config, PromptConfig},
};

fn prompt() -> PromptConfig {
    PromptConfig::parse(r#"{ "prompt": "Grade this answer out of 10." }"#).expect("valid prompt")
}

fn required_vars() -> HashMap<&'static str, &'static str> {
    HashMap::from([
        ("MAIL_TO_CHECK", "grader@example.com"),
        ("APP_PASSWORD", "app-password"),
        ("MAILS_FILE_PATH", "mails.csv"),
        ("QUESTION_FILE_PATH", "question.csv"),
        ("OPENAI_API_KEY", "sk-test"),
        ("SUPABASE_URL", "https://project.supabase.co/"),
        ("SUPABASE_ANON_KEY", "anon"),
    ])
}

fn load(
    vars: &HashMap<&'static str, &'static str>,
    prompt: PromptConfig,
    require_store: bool,
) -> Result<Config, GraderError> {
    Config::from_lookup(|name| vars.get(name).map(|v| v.to_string()), prompt, require_store)
}

#[test]
fn defaults_are_applied() {
    let config = load(&required_vars(), prompt(), true).expect("valid config");

    assert_eq!(config.mailbox.host, "imap.gmail.com");
    assert_eq!(config.mailbox.port, 993);
    assert_eq!(config.mailbox.folder, "INBOX");
    assert_eq!(config.mailbox.address, "grader@example.com");
    assert_eq!(config.openai.model, "gpt-4");
    assert!((config.openai.temperature - 0.2).abs() < f32::EPSILON);
    assert_eq!(config.openai.api_base, None);
    assert_eq!(config.extension, "py");
    assert_eq!(config.prompt, "Grade this answer out of 10.");
    assert_eq!(config.roster_path, PathBuf::from("mails.csv"));
    assert_eq!(config.record_log, None);

    let store = config.store.expect("store configured");
    assert_eq!(store.rest_endpoint, "https://project.supabase.co/rest/v1");
    assert_eq!(store.collection, "mails_info");
}

#[test]
fn all_missing_variables_are_reported() {
    let mut vars = required_vars();
    vars.remove("APP_PASSWORD");
    vars.remove("OPENAI_API_KEY");
    vars.insert("QUESTION_FILE_PATH", "   ");

    let err = load(&vars, prompt(), true).unwrap_err();
    let GraderError::Configuration(message) = &err else {
        panic!("expected a configuration error, got {err:?}");
    };
    for name in ["APP_PASSWORD", "QUESTION_FILE_PATH", "OPENAI_API_KEY"] {
        assert!(message.contains(name), "{message}");
    }
    assert!(!message.contains("MAIL_TO_CHECK"), "{message}");
    assert!(err.is_fatal());
    assert_eq!(err.stage(), Stage::Init);
}

#[test]
fn errors_map_to_their_stage() {
    let auth = GraderError::Authentication {
        host:   "imap.example.com".into(),
        user:   "grader@example.com".into(),
        reason: "bad credentials".into(),
    };
    assert!(auth.is_fatal());
    assert_eq!(auth.stage(), Stage::Fetching);

    let cases = [
        (
            GraderError::MessageParse {
                message_id: "1".into(),
                reason:     "bad header".into(),
            },
            Stage::Extracting,
        ),
        (GraderError::Backend("timeout".into()), Stage::Grading),
        (GraderError::MalformedReply("no marker".into()), Stage::Grading),
        (GraderError::Persistence("rejected".into()), Stage::Persisting),
    ];
    for (err, stage) in cases {
        assert!(!err.is_fatal(), "{err}");
        assert_eq!(err.stage(), stage, "{err}");
    }
    assert_eq!(Stage::Init.to_string(), "init");
}

#[test]
fn store_is_optional_on_dry_runs() {
    let mut vars = required_vars();
    vars.remove("SUPABASE_URL");
    vars.remove("SUPABASE_ANON_KEY");

    assert!(load(&vars, prompt(), true).is_err());
    let config = load(&vars, prompt(), false).expect("dry run config");
    assert!(config.store.is_none());
}

#[test]
fn prompt_file_overrides_environment() {
    let mut vars = required_vars();
    vars.insert("OPENAI_MODEL", "gpt-4o-mini");
    vars.insert("OPENAI_TEMPERATURE", "0.7");
    vars.insert("IMAP_PORT", "1993");
    vars.insert("MAILS_INFO_FILE_PATH", "mails_info.csv");

    let from_env = load(&vars, prompt(), true).expect("valid config");
    assert_eq!(from_env.openai.model, "gpt-4o-mini");
    assert!((from_env.openai.temperature - 0.7).abs() < f32::EPSILON);
    assert_eq!(from_env.mailbox.port, 1993);
    assert_eq!(from_env.record_log, Some(PathBuf::from("mails_info.csv")));

    let prompt = PromptConfig::parse(
        r#"{ "prompt": "p", "model": "gpt-4.1", "temperature": 0.0, "extension": "java" }"#,
    )
    .expect("valid prompt");
    let config = load(&vars, prompt, true)
        .expect("valid config")
        .with_extension("ipynb")
        .with_record_log("other.csv");

    assert_eq!(config.openai.model, "gpt-4.1");
    assert_eq!(config.openai.temperature, 0.0);
    assert_eq!(config.extension, "ipynb");
    assert_eq!(config.record_log, Some(PathBuf::from("other.csv")));
}

#[test]
fn invalid_values_are_rejected() {
    let mut vars = required_vars();
    vars.insert("IMAP_PORT", "imaps");
    assert!(matches!(
        load(&vars, prompt(), true),
        Err(GraderError::Configuration(_))
    ));

    assert!(PromptConfig::parse(r#"{ "model": "gpt-4" }"#).is_err());
    assert!(PromptConfig::parse("not json").is_err());
}

#[test]
fn secrets_are_not_printed() {
    let config = load(&required_vars(), prompt(), true).expect("valid config");
    let printed = format!("{config:?}");

    assert!(!printed.contains("app-password"), "{printed}");
    assert!(!printed.contains("sk-test"), "{printed}");
    assert!(!printed.contains("anon\""), "{printed}");
    assert!(printed.contains("grader@example.com"));
}
