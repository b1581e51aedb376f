//! User Story Integration Tests
//!
//! Each test walks one workflow through the public library API with a
//! scripted completion backend, a scripted key prompt and in-memory surfaces.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;

use tailgen::client::{ChatRequest, ClientError, CompletionBackend, StreamEvent};
use tailgen::config::Config;
use tailgen::controller::{FormController, FormState, FormSurface, IgnoreReason, Settings, Submit};
use tailgen::conversation::{Message, Role};
use tailgen::credential::{CredentialPrompt, CREDENTIAL_KEY, MISSING_CREDENTIAL_ALERT};
use tailgen::renderer::{preview_document, PreviewSurface};
use tailgen::store::{KeyValueStore, MemoryStore};

/// Test helper to narrate each story step
struct TestTracer {
    name: String,
}

impl TestTracer {
    fn new(name: &str) -> Self {
        eprintln!("\n╔═══════════════════════════════════════════════════════════════");
        eprintln!("║ USER STORY: {}", name);
        eprintln!("╚═══════════════════════════════════════════════════════════════\n");
        Self { name: name.to_string() }
    }

    fn step(&mut self, description: &str) {
        eprintln!("  → {}", description);
    }

    fn expect(&mut self, condition: bool, description: &str) {
        let status = if condition { "✓" } else { "✗" };
        eprintln!("    {} {}", status, description);
        assert!(condition, "FAILED: {}", description);
    }

    fn done(&self) {
        eprintln!("\n  ✓ Story completed: {}\n", self.name);
    }
}

// ═══════════════════════════════════════════════════════════════
// Fakes
// ═══════════════════════════════════════════════════════════════

/// Accepts one key; streams canned fragments with an optional gap between them
struct Upstream {
    accepted_key: String,
    fragments: Vec<String>,
    gap: Duration,
    validations: Mutex<usize>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl Upstream {
    fn new(accepted_key: &str, fragments: &[&str]) -> Self {
        Self {
            accepted_key: accepted_key.to_string(),
            fragments: fragments.iter().map(|s| s.to_string()).collect(),
            gap: Duration::ZERO,
            validations: Mutex::new(0),
            requests: Mutex::new(vec![]),
        }
    }

    fn with_gap(mut self, gap: Duration) -> Self {
        self.gap = gap;
        self
    }

    fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn validation_count(&self) -> usize {
        *self.validations.lock().unwrap()
    }
}

#[async_trait]
impl CompletionBackend for Upstream {
    async fn validate(&self, credential: &str, _model: &str) -> Result<(), ClientError> {
        *self.validations.lock().unwrap() += 1;
        if credential == self.accepted_key {
            Ok(())
        } else {
            Err(ClientError::Response { status: 401, body: "invalid_api_key".into() })
        }
    }

    async fn stream_chat(
        &self,
        credential: &str,
        request: &ChatRequest,
    ) -> Result<mpsc::Receiver<StreamEvent>, ClientError> {
        if credential != self.accepted_key {
            return Err(ClientError::Response { status: 401, body: "invalid_api_key".into() });
        }
        self.requests.lock().unwrap().push(request.clone());

        let (tx, rx) = mpsc::channel(16);
        let fragments = self.fragments.clone();
        let gap = self.gap;
        tokio::spawn(async move {
            for f in fragments {
                if tx.send(StreamEvent::Token(f)).await.is_err() {
                    return;
                }
                if !gap.is_zero() {
                    tokio::time::sleep(gap).await;
                }
            }
            let _ = tx.send(StreamEvent::Done(Some("stop".into()))).await;
        });
        Ok(rx)
    }
}

struct KeyPrompt {
    answer: Option<String>,
    requests: usize,
    alerts: Vec<String>,
}

impl KeyPrompt {
    fn answering(answer: Option<&str>) -> Self {
        Self { answer: answer.map(String::from), requests: 0, alerts: vec![] }
    }
}

impl CredentialPrompt for KeyPrompt {
    fn request(&mut self) -> Result<Option<String>> {
        self.requests += 1;
        Ok(self.answer.clone())
    }

    fn alert(&mut self, message: &str) {
        self.alerts.push(message.to_string());
    }
}

#[derive(Default)]
struct ListForm {
    turns: Vec<String>,
    enabled: bool,
    resets: usize,
}

impl FormSurface for ListForm {
    fn show_user_turns(&mut self, turns: &[&str]) {
        self.turns = turns.iter().map(|t| format!("You: {}", t)).collect();
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn reset(&mut self) {
        self.resets += 1;
    }
}

/// In-memory iframe: keeps the whole document of every render
#[derive(Default)]
struct Frame {
    documents: Vec<String>,
    rendered_at: Vec<tokio::time::Instant>,
}

impl Frame {
    fn current(&self) -> &str {
        self.documents.last().map(String::as_str).unwrap_or("")
    }
}

impl PreviewSurface for Frame {
    fn render(&mut self, markup: &str) -> Result<()> {
        self.documents.push(preview_document(markup));
        self.rendered_at.push(tokio::time::Instant::now());
        Ok(())
    }
}

type Controller = FormController<Upstream, MemoryStore, KeyPrompt, ListForm>;

fn controller(upstream: Upstream, store: MemoryStore, prompt: KeyPrompt) -> Controller {
    let mut form = ListForm::default();
    form.enabled = true;
    FormController::new(upstream, store, prompt, form, Settings::from(&Config::default()), "SYSTEM".into())
}

const RED_BUTTON: &str = r#"<button class="bg-red-500 text-white p-2 rounded">Click</button>"#;

// ═══════════════════════════════════════════════════════════════
// STORY: Generate a component
// ═══════════════════════════════════════════════════════════════

#[tokio::test]
async fn story_generate_red_button() {
    let mut t = TestTracer::new("Prompt for a red button and see it in the preview");

    t.step("Given a stored, valid API key");
    let upstream = Upstream::new(
        "sk-valid",
        &[r#"<button class="bg-red-500 "#, r#"text-white p-2 rounded">"#, "Click</button>"],
    );
    let store = MemoryStore::with_entry(CREDENTIAL_KEY, "sk-valid");
    let mut c = controller(upstream, store, KeyPrompt::answering(None));
    let mut frame = Frame::default();

    t.step("When the user submits \"a red button\"");
    let text = c.submit_and_wait("a red button", &mut frame).await.unwrap();

    t.expect(text.as_deref() == Some(RED_BUTTON), "Accumulated text is the full button markup");
    t.expect(
        c.conversation().messages()
            == [Message::system("SYSTEM"), Message::user("a red button"), Message::assistant(RED_BUTTON)],
        "Conversation is [system, user, assistant]",
    );
    t.expect(
        c.form().turns == vec!["You: a red button".to_string()],
        "Message list mirrors only the user turn",
    );
    t.expect(
        frame.current().contains(&format!("<body>\n    {}\n  </body>", RED_BUTTON)),
        "Preview body holds exactly the generated markup",
    );
    t.expect(c.state() == FormState::Idle && c.form().enabled, "Form is enabled again");
    t.expect(c.form().resets == 1, "Form was reset");
    t.expect(c.credential_prompt().requests == 0, "No key prompt was shown");

    t.done();
}

#[tokio::test]
async fn story_follow_up_replaces_assistant_message() {
    let mut t = TestTracer::new("A follow-up prompt keeps one assistant message");

    let upstream = Upstream::new("sk-valid", &["<div>v</div>"]);
    let store = MemoryStore::with_entry(CREDENTIAL_KEY, "sk-valid");
    let mut c = controller(upstream, store, KeyPrompt::answering(None));
    let mut frame = Frame::default();

    t.step("Given one finished exchange");
    c.submit_and_wait("a card", &mut frame).await.unwrap();
    let before = c.conversation().messages().len();

    t.step("When the user asks for a change");
    c.submit_and_wait("make it wider", &mut frame).await.unwrap();

    let messages = c.conversation().messages();
    let assistants = messages.iter().filter(|m| m.role == Role::Assistant).count();
    t.expect(assistants == 1, "Exactly one assistant message");
    t.expect(messages.last().map(|m| m.role) == Some(Role::Assistant), "It is the last message");
    t.expect(messages.len() == before + 1, "Old reply replaced, new user turn added");

    let requests = c.backend().requests.lock().unwrap();
    t.expect(
        requests[1].messages.iter().any(|m| m.role == Role::Assistant),
        "Follow-up request includes the previous reply",
    );

    t.done();
}

// ═══════════════════════════════════════════════════════════════
// STORY: Credentials
// ═══════════════════════════════════════════════════════════════

#[tokio::test]
async fn story_rejected_key_is_replaced() {
    let mut t = TestTracer::new("A revoked stored key is replaced after one prompt");

    t.step("Given a stored key the API rejects");
    let upstream = Upstream::new("sk-new", &["<p>ok</p>"]);
    let store = MemoryStore::with_entry(CREDENTIAL_KEY, "sk-revoked");
    let mut c = controller(upstream, store, KeyPrompt::answering(Some("sk-new")));
    let mut frame = Frame::default();

    t.step("When the user submits a prompt");
    let text = c.submit_and_wait("a paragraph", &mut frame).await.unwrap();

    t.expect(c.credential_prompt().requests == 1, "Exactly one prompt dialog");
    t.expect(
        c.store().get(CREDENTIAL_KEY).unwrap().as_deref() == Some("sk-new"),
        "New key overwrote the stored one",
    );
    t.expect(c.backend().validation_count() == 1, "Only the stored key was validated");
    t.expect(text.as_deref() == Some("<p>ok</p>"), "Exchange ran with the new key");

    t.done();
}

#[tokio::test]
async fn story_declining_key_aborts() {
    let mut t = TestTracer::new("Declining to enter a key aborts the submission");

    let upstream = Upstream::new("sk-any", &["<p>never</p>"]);
    let mut c = controller(upstream, MemoryStore::new(), KeyPrompt::answering(Some("")));
    let mut frame = Frame::default();

    t.step("When the user submits with no key and enters nothing");
    let text = c.submit_and_wait("a navbar", &mut frame).await.unwrap();

    t.expect(text.is_none(), "Nothing generated");
    t.expect(
        c.credential_prompt().alerts == vec![MISSING_CREDENTIAL_ALERT.to_string()],
        "The user was told a key is required",
    );
    t.expect(c.backend().request_count() == 0, "No completion request was made");
    t.expect(c.conversation().messages().len() == 1, "Conversation untouched");
    t.expect(frame.documents.is_empty(), "Preview untouched");

    t.done();
}

// ═══════════════════════════════════════════════════════════════
// STORY: Form guards
// ═══════════════════════════════════════════════════════════════

#[tokio::test]
async fn story_blank_prompt_does_nothing() {
    let mut t = TestTracer::new("Blank prompts are ignored");

    let upstream = Upstream::new("sk-valid", &["x"]);
    let store = MemoryStore::with_entry(CREDENTIAL_KEY, "sk-valid");
    let mut c = controller(upstream, store, KeyPrompt::answering(None));

    for blank in ["", "  ", "\t\n"] {
        let outcome = c.submit(blank).await.unwrap();
        t.expect(
            matches!(outcome, Submit::Ignored(IgnoreReason::EmptyPrompt)),
            "Blank submission ignored",
        );
    }
    t.expect(c.backend().validation_count() == 0, "Key was not even checked");
    t.expect(c.backend().request_count() == 0, "No request issued");
    t.expect(c.conversation().messages().len() == 1, "State unchanged");

    t.done();
}

#[tokio::test]
async fn story_resubmit_while_streaming_is_ignored() {
    let mut t = TestTracer::new("Submitting again mid-stream has no effect");

    let upstream = Upstream::new("sk-valid", &["<ul>", "<li>a</li>", "</ul>"]);
    let store = MemoryStore::with_entry(CREDENTIAL_KEY, "sk-valid");
    let mut c = controller(upstream, store, KeyPrompt::answering(None));
    let mut frame = Frame::default();

    t.step("Given an exchange in flight");
    let Submit::Started(mut exchange) = c.submit("a list").await.unwrap() else {
        panic!("exchange did not start");
    };
    t.expect(c.state() == FormState::Busy && !c.form().enabled, "Form is disabled");
    let snapshot = c.conversation().messages().to_vec();

    t.step("When the user submits again");
    let outcome = c.submit("a table").await.unwrap();
    t.expect(matches!(outcome, Submit::Ignored(IgnoreReason::Busy)), "Second submission ignored");
    t.expect(c.backend().request_count() == 1, "No duplicate request");
    t.expect(c.conversation().messages() == snapshot.as_slice(), "No state mutation");

    t.step("When the first stream finishes");
    let text = exchange.run(&mut frame).await.unwrap();
    c.complete(text);
    t.expect(c.state() == FormState::Idle, "Form is idle again");
    t.expect(c.conversation().user_turns() == vec!["a list"], "Only the first prompt was recorded");

    t.done();
}

// ═══════════════════════════════════════════════════════════════
// STORY: Throttled preview
// ═══════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn story_slow_stream_preview_is_throttled() {
    let mut t = TestTracer::new("A slow stream updates the preview about once a second");

    t.step("Given fragments arriving every 300ms for ~6s");
    let fragments: Vec<String> = (0..20).map(|i| format!("<span>{}</span>", i)).collect();
    let refs: Vec<&str> = fragments.iter().map(String::as_str).collect();
    let upstream = Upstream::new("sk-valid", &refs).with_gap(Duration::from_millis(300));
    let store = MemoryStore::with_entry(CREDENTIAL_KEY, "sk-valid");
    let mut c = controller(upstream, store, KeyPrompt::answering(None));
    let mut frame = Frame::default();

    t.step("When the exchange runs");
    let text = c.submit_and_wait("twenty spans", &mut frame).await.unwrap().unwrap();

    let renders = frame.documents.len();
    t.expect(renders >= 3, "Preview updated during streaming");
    t.expect(renders <= 8, "Preview was not rewritten per fragment");
    let spacings: Vec<Duration> = frame.rendered_at.windows(2).map(|w| w[1] - w[0]).collect();
    let (_, leading) = spacings.split_last().unwrap();
    t.expect(
        leading.iter().all(|gap| *gap >= Duration::from_millis(1000)),
        "Renders before the final one are at least a second apart",
    );
    t.expect(
        frame.current() == preview_document(&text),
        "Final preview reflects the last fragment",
    );
    t.expect(text.ends_with("<span>19</span>"), "All fragments accumulated");

    t.done();
}
