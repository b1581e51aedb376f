//! Form controller: the idle/busy state machine around one exchange
//!
//! idle --submit(prompt, credential)--> busy --complete/fail--> idle
//!
//! While busy every submission is ignored. An exchange is started with
//! `submit`, driven with `Exchange::run`, and closed with `complete` or
//! `fail`.

use anyhow::Result;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::client::{ChatRequest, CompletionBackend, Sampling, StreamEvent};
use crate::config::Config;
use crate::conversation::Conversation;
use crate::credential::{self, CredentialPrompt};
use crate::renderer::{PreviewSurface, StreamingRenderer};
use crate::store::KeyValueStore;

/// The input side of the UI
pub trait FormSurface {
    /// Show the user's turns, oldest first
    fn show_user_turns(&mut self, turns: &[&str]);
    fn set_enabled(&mut self, enabled: bool);
    /// Clear the input after a finished exchange
    fn reset(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormState {
    Idle,
    Busy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    Busy,
    EmptyPrompt,
}

pub enum Submit {
    /// Request is in flight; drive it with `Exchange::run`
    Started(Exchange),
    Ignored(IgnoreReason),
    /// No credential was available
    Aborted,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub model: String,
    pub validation_model: String,
    pub sampling: Sampling,
    pub render_interval: Duration,
}

impl From<&Config> for Settings {
    fn from(cfg: &Config) -> Self {
        Self {
            model: cfg.model.clone(),
            validation_model: cfg.validation_model.clone(),
            sampling: cfg.sampling.clone(),
            render_interval: Duration::from_millis(cfg.render_interval_ms),
        }
    }
}

/// One in-flight completion stream
pub struct Exchange {
    events: mpsc::Receiver<StreamEvent>,
    renderer: StreamingRenderer,
}

impl Exchange {
    /// Stream into `surface` until upstream finishes; returns the full text
    pub async fn run<S: PreviewSurface>(&mut self, surface: &mut S) -> Result<String> {
        self.renderer.run(&mut self.events, surface).await
    }
}

pub struct FormController<B, S, P, F> {
    backend: B,
    store: S,
    prompt: P,
    form: F,
    settings: Settings,
    system_prompt: String,
    conversation: Conversation,
    state: FormState,
}

impl<B, S, P, F> FormController<B, S, P, F>
where
    B: CompletionBackend,
    S: KeyValueStore,
    P: CredentialPrompt,
    F: FormSurface,
{
    pub fn new(backend: B, store: S, prompt: P, form: F, settings: Settings, system_prompt: String) -> Self {
        Self {
            backend,
            store,
            prompt,
            form,
            settings,
            conversation: Conversation::new(system_prompt.clone()),
            system_prompt,
            state: FormState::Idle,
        }
    }

    pub fn state(&self) -> FormState {
        self.state
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn credential_prompt(&self) -> &P {
        &self.prompt
    }

    pub fn form(&self) -> &F {
        &self.form
    }

    /// Handle a form submission
    pub async fn submit(&mut self, prompt: &str) -> Result<Submit> {
        if self.state == FormState::Busy {
            tracing::debug!("submission ignored while a request is in flight");
            return Ok(Submit::Ignored(IgnoreReason::Busy));
        }

        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Ok(Submit::Ignored(IgnoreReason::EmptyPrompt));
        }

        let credential = credential::resolve(
            &self.backend,
            &mut self.store,
            &mut self.prompt,
            &self.settings.validation_model,
        )
        .await?;
        let Some(credential) = credential else {
            return Ok(Submit::Aborted);
        };

        self.conversation.push_user(prompt);
        self.form.show_user_turns(&self.conversation.user_turns());

        self.state = FormState::Busy;
        self.form.set_enabled(false);

        let request = ChatRequest::streaming(
            &self.settings.model,
            self.conversation.messages(),
            &self.settings.sampling,
        );
        tracing::info!(model = %request.model, messages = request.messages.len(), "requesting completion");

        match self.backend.stream_chat(&credential, &request).await {
            Ok(events) => Ok(Submit::Started(Exchange {
                events,
                renderer: StreamingRenderer::new(self.settings.render_interval),
            })),
            Err(e) => {
                self.state = FormState::Idle;
                self.form.set_enabled(true);
                Err(e.into())
            }
        }
    }

    /// Commit the finished response and return to idle
    pub fn complete(&mut self, text: String) {
        tracing::info!(bytes = text.len(), "exchange complete");
        self.conversation.commit_assistant(text);
        self.state = FormState::Idle;
        self.form.set_enabled(true);
        self.form.reset();
    }

    /// Abandon the exchange after a stream failure and return to idle.
    /// The partial response is not committed.
    pub fn fail(&mut self, error: &anyhow::Error) {
        tracing::error!(error = %error, "exchange failed");
        self.state = FormState::Idle;
        self.form.set_enabled(true);
    }

    /// Submit, stream into `surface`, and close the exchange.
    ///
    /// Returns the generated text, or `None` if the submission was ignored
    /// or aborted.
    pub async fn submit_and_wait<V: PreviewSurface>(
        &mut self,
        prompt: &str,
        surface: &mut V,
    ) -> Result<Option<String>> {
        let mut exchange = match self.submit(prompt).await? {
            Submit::Started(exchange) => exchange,
            Submit::Ignored(_) | Submit::Aborted => return Ok(None),
        };

        match exchange.run(surface).await {
            Ok(text) => {
                self.complete(text.clone());
                Ok(Some(text))
            }
            Err(e) => {
                self.fail(&e);
                Err(e)
            }
        }
    }

    /// Start over with only the system message. Ignored while busy.
    pub fn reset_conversation(&mut self) -> bool {
        if self.state == FormState::Busy {
            return false;
        }
        self.conversation = Conversation::new(self.system_prompt.clone());
        self.form.show_user_turns(&[]);
        true
    }
}
