
use std::{
    fs,
    sync::{Arc, Mutex},
};

use anyhow::{Result, bail};
use mail_support::{reply, submission};
use mailgrader::{
    GraderError, Pipeline, Stage, SubmissionRecord,
    grading::{GradingBackend, GradingClient, build_instruction},
    mailbox::{Allowlist, MessageSource, RawMessage},
    record_log::RecordLog,
    roster::{Question, Table},
    sink::ResultSink,
};
use uuid::Uuid;

/// Answers every instruction with a fixed reply and remembers what it was
/// asked.
#[derive(Clone, Default)]
struct FakeBackend {
    reply:    Option<String>,
    requests: Arc<Mutex<Vec<String>>>,
}

impl FakeBackend {
    fn replying(reply: &str) -> Self {
        Self {
            reply: Some(reply.into()),
            ..Default::default()
        }
    }

    fn failing() -> Self {
        Self::default()
    }

    fn requests(&self) -> Vec<String> {
        self.requests.lock().expect("lock").clone()
    }
}

impl GradingBackend for FakeBackend {
    async fn complete(&self, instruction: String) -> Result<String> {
        self.requests.lock().expect("lock").push(instruction);
        match &self.reply {
            Some(reply) => Ok(reply.clone()),
            None => bail!("connection refused"),
        }
    }
}

/// Keeps persisted records in memory.
#[derive(Default)]
struct MemorySink {
    fail:    bool,
    batches: Mutex<Vec<Vec<SubmissionRecord>>>,
}

impl MemorySink {
    fn stored(&self) -> Vec<SubmissionRecord> {
        self.batches
            .lock()
            .expect("lock")
            .iter()
            .flatten()
            .cloned()
            .collect()
    }

    fn batch_count(&self) -> usize {
        self.batches.lock().expect("lock").len()
    }
}

impl ResultSink for MemorySink {
    async fn persist(&self, records: Vec<SubmissionRecord>) -> Result<usize, GraderError> {
        if self.fail {
            return Err(GraderError::Persistence("store is read-only".into()));
        }
        let count = records.len();
        self.batches.lock().expect("lock").push(records);
        Ok(count)
    }
}

/// A source whose listing fails outright.
struct BrokenSource;

impl MessageSource for BrokenSource {
    fn raw_messages(&mut self) -> Result<Box<dyn Iterator<Item = RawMessage> + '_>> {
        bail!("mailbox went away")
    }
}

const PROMPT: &str = "Grade out of 10 and answer with <grade:N>.";

fn question() -> Question {
    Question {
        question: "Print the number one.".into(),
        session:  "S1".into(),
    }
}

fn pipeline(backend: FakeBackend, sink: MemorySink) -> Pipeline<FakeBackend, MemorySink> {
    Pipeline::builder()
        .grader(GradingClient::new(backend))
        .sink(sink)
        .question(question())
        .prompt(PROMPT)
        .build()
}

fn alice() -> Allowlist {
    Allowlist::new(["alice@example.com"])
}

#[tokio::test]
async fn allowlisted_original_is_graded_and_persisted() {
    let backend = FakeBackend::replying("Correct. <grade:9>");
    let pipeline = pipeline(backend.clone(), MemorySink::default());
    let mut source = vec![
        submission("3", "Bob <bob@example.com>", "S1", "print(1)"),
        reply("2", "Alice <alice@example.com>", "Re: S1"),
        submission("1", "Alice <alice@example.com>", "S1", "print(1)"),
    ];

    let summary = pipeline.run(&mut source, &alice()).await;

    assert_eq!(summary.fetched, 2);
    assert_eq!(summary.excluded, 1);
    assert_eq!(summary.extracted, 1);
    assert_eq!(summary.matched, 1);
    assert_eq!(summary.graded, 1);
    assert_eq!(summary.persisted, 1);
    assert!(summary.is_success(), "{summary:?}");
    assert_eq!(summary.exit_code(), 0);
    assert!(!summary.run_id.is_empty());

    let stored = pipeline.sink().stored();
    assert_eq!(stored.len(), 1);
    let record = &stored[0];
    assert_eq!(record.message_id, "1");
    assert_eq!(record.sender_address, "alice@example.com");
    assert_eq!(record.attachment_count, 1);
    assert!(record.submission_text.contains("print(1)"));
    assert_eq!(record.grading_reply.as_deref(), Some("Correct. <grade:9>"));
    assert_eq!(record.grade, Some(9.0));

    assert_eq!(
        backend.requests(),
        vec![build_instruction(
            PROMPT,
            "Print the number one.",
            "# === File: a.py ===\nprint(1)"
        )]
    );
}

#[tokio::test]
async fn other_sessions_are_stored_ungraded() {
    let backend = FakeBackend::replying("<grade:10>");
    let pipeline = pipeline(backend.clone(), MemorySink::default());
    let mut source = vec![
        submission("2", "alice@example.com", "S2", "print(2)"),
        submission("1", "alice@example.com", "S1", "print(1)"),
    ];

    let summary = pipeline.run(&mut source, &alice()).await;

    assert_eq!(summary.extracted, 2);
    assert_eq!(summary.matched, 1);
    assert_eq!(summary.persisted, 2);
    assert_eq!(backend.requests().len(), 1);

    let stored = pipeline.sink().stored();
    assert_eq!(stored[0].subject, "S2");
    assert_eq!(stored[0].grading_reply, None);
    assert_eq!(stored[0].grade, None);
    assert_eq!(stored[1].grade, Some(10.0));
    assert_eq!(pipeline.sink().batch_count(), 1);
}

#[tokio::test]
async fn malformed_reply_does_not_stop_the_run() {
    let pipeline = pipeline(
        FakeBackend::replying("Looks good to me."),
        MemorySink::default(),
    );
    let mut source = vec![
        submission("2", "alice@example.com", "S1", "print(2)"),
        submission("1", "alice@example.com", "S1", "print(1)"),
    ];

    let summary = pipeline.run(&mut source, &alice()).await;

    assert_eq!(summary.matched, 2);
    assert_eq!(summary.graded, 0);
    assert_eq!(summary.persisted, 2);
    assert_eq!(summary.failures.len(), 2);
    assert!(summary.failures.iter().all(|f| f.stage == Stage::Grading));
    assert_eq!(summary.exit_code(), 1);

    for record in pipeline.sink().stored() {
        assert_eq!(record.grading_reply.as_deref(), Some("Looks good to me."));
        assert_eq!(record.grade, None);
    }
}

#[tokio::test]
async fn backend_failure_is_reported_once() {
    let backend = FakeBackend::failing();
    let pipeline = pipeline(backend.clone(), MemorySink::default());
    let mut source = vec![submission("1", "alice@example.com", "S1", "print(1)")];

    let summary = pipeline.run(&mut source, &alice()).await;

    assert_eq!(backend.requests().len(), 1);
    assert_eq!(summary.failures.len(), 1);
    let failure = &summary.failures[0];
    assert_eq!(failure.message_id, "1");
    assert_eq!(failure.stage, Stage::Grading);
    assert!(failure.error.contains("connection refused"), "{}", failure.error);

    let stored = pipeline.sink().stored();
    assert_eq!(stored[0].grading_reply.as_deref(), Some(""));
    assert_eq!(stored[0].grade, None);
}

#[tokio::test]
async fn sink_failure_is_reported_without_panicking() {
    let sink = MemorySink {
        fail: true,
        ..Default::default()
    };
    let pipeline = pipeline(FakeBackend::replying("<grade:5>"), sink);
    let mut source = vec![submission("1", "alice@example.com", "S1", "print(1)")];

    let summary = pipeline.run(&mut source, &alice()).await;

    assert_eq!(summary.graded, 1);
    assert_eq!(summary.persisted, 0);
    assert!(summary.failures.is_empty());
    let error = summary.persistence_error.as_deref().expect("persistence error");
    assert!(error.contains("read-only"), "{error}");
    assert_eq!(summary.exit_code(), 1);
    assert!(summary.render().contains("not persisted"));
}

#[tokio::test]
async fn empty_batch_is_not_persisted() {
    let pipeline = pipeline(FakeBackend::replying("<grade:5>"), MemorySink::default());
    let mut source = vec![submission("1", "carol@example.com", "S1", "print(1)")];

    let summary = pipeline.run(&mut source, &alice()).await;

    assert_eq!(summary.fetched, 0);
    assert_eq!(pipeline.sink().batch_count(), 0);
    assert!(summary.is_success());
}

#[tokio::test]
async fn unparseable_message_is_skipped() {
    let pipeline = pipeline(FakeBackend::replying("<grade:5>"), MemorySink::default());
    // Valid top-level headers, but the only sub-part opens with a
    // continuation line.
    let broken = concat!(
        "From: Alice <alice@example.com>\r\n",
        "Subject: S1\r\n",
        "Content-Type: multipart/mixed; boundary=\"b\"\r\n",
        "\r\n",
        "--b\r\n",
        " X: y\r\n",
        "Content-Type: text/plain\r\n",
        "\r\n",
        "print(2)\r\n",
        "--b--\r\n",
    );
    let mut source = vec![
        RawMessage::new("2", broken),
        submission("1", "alice@example.com", "S1", "print(1)"),
    ];

    let summary = pipeline.run(&mut source, &alice()).await;

    assert_eq!(summary.fetched, 2);
    assert_eq!(summary.extracted, 1);
    assert_eq!(summary.graded, 1);
    assert_eq!(summary.failures.len(), 1, "{:?}", summary.failures);
    assert_eq!(summary.failures[0].message_id, "2");
    assert_eq!(summary.failures[0].stage, Stage::Extracting);
    assert_eq!(summary.exit_code(), 1);

    let stored = pipeline.sink().stored();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].message_id, "1");
    assert_eq!(stored[0].grade, Some(5.0));
}

#[tokio::test]
async fn listing_failure_is_a_summary_failure() {
    let pipeline = pipeline(FakeBackend::replying("<grade:5>"), MemorySink::default());

    let summary = pipeline.run(&mut BrokenSource, &alice()).await;

    assert_eq!(summary.fetched, 0);
    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.failures[0].stage, Stage::Fetching);
    assert_eq!(pipeline.sink().batch_count(), 0);
}

#[tokio::test]
async fn records_are_appended_to_the_log() {
    let root = std::env::temp_dir().join(format!("mailgrader-pipeline-{}", Uuid::new_v4()));
    fs::create_dir_all(&root).expect("create temp dir");
    let path = root.join("mails_info.csv");

    let pipeline = Pipeline::builder()
        .grader(GradingClient::new(FakeBackend::replying("<grade:7>")))
        .sink(MemorySink::default())
        .question(question())
        .prompt(PROMPT)
        .record_log(RecordLog::new(&path))
        .build();

    for _ in 0..2 {
        let mut source = vec![
            submission("2", "alice@example.com", "S2", "print(2)"),
            submission("1", "alice@example.com", "S1", "print(1)"),
        ];
        let summary = pipeline.run(&mut source, &alice()).await;
        assert_eq!(summary.persisted, 2);
    }

    let table = Table::parse(&fs::read_to_string(&path).expect("read log")).expect("valid csv");
    assert_eq!(table.rows().len(), 2);
    let grade = table.column("grade").expect("grade column");
    assert_eq!(table.values(grade).collect::<Vec<_>>(), vec!["", "7"]);
}

#[tokio::test]
async fn grading_client_swallows_backend_errors() {
    let failing = GradingClient::new(FakeBackend::failing());
    let mut reported = Vec::new();
    let reply = failing
        .grade("q", "code", "p", |e| reported.push(e.to_string()))
        .await;
    assert_eq!(reply, "");
    assert_eq!(reported.len(), 1);
    assert!(reported[0].contains("connection refused"), "{reported:?}");
    assert!(matches!(
        failing.try_grade("q", "code", "p").await,
        Err(GraderError::Backend(_))
    ));

    let backend = FakeBackend::replying("<grade:4>");
    let client = GradingClient::new(backend.clone());
    let reply = client
        .grade("q", "code", "p", |e| panic!("unexpected failure: {e}"))
        .await;
    assert_eq!(reply, "<grade:4>");
    assert_eq!(backend.requests(), vec!["p q code".to_string()]);
}
