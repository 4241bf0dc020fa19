//! Batch execution.
//!
//! [`BatchRunner`] shows the operator what is about to happen, asks for
//! confirmation, and then works through the items one at a time with a fixed
//! pause between them. A failed item is reported and counted; it never stops
//! the batch.

use std::fmt;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::{Error, Result};
use crate::moderation::{IdentityResolver, ModerationApi, ModerationClient};
use crate::observability::{BATCH_FAILED, BATCH_SUCCEEDED};
use crate::render::Renderer;
use crate::session::ChatSession;
use crate::types::{ModerationTarget, WorkItem};
use crate::workload::Workload;

/// Delays below this many seconds risk tripping the server's rate limits.
pub const SAFE_DELAY_SECS: f64 = 1.0;

/// Characters of a message shown in the progress line.
const PREVIEW_CHARS: usize = 60;

/// Asks the operator whether to go ahead.
pub trait Confirm {
    /// Show `prompt` and return true if the operator agreed.
    fn confirm(&mut self, prompt: &str) -> bool;
}

impl<F: FnMut(&str) -> bool> Confirm for F {
    fn confirm(&mut self, prompt: &str) -> bool {
        self(prompt)
    }
}

/// What to do with each item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchAction {
    /// Send each line to chat.
    SendMessages,
    /// Ban each target.
    Ban,
    /// Time out each target for `duration` seconds.
    Timeout {
        /// Timeout length in seconds.
        duration: u32,
    },
}

impl BatchAction {
    fn noun(&self) -> &'static str {
        match self {
            BatchAction::SendMessages => "send",
            BatchAction::Ban => "ban",
            BatchAction::Timeout { .. } => "timeout",
        }
    }
}

/// Outcome of a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Items acted on.
    pub attempted: usize,
    /// Items whose action succeeded.
    pub succeeded: usize,
    /// Items whose action failed.
    pub failed: usize,
    /// Pauses inserted between items.
    pub pauses: usize,
    /// True if the operator interrupted the batch before the end.
    pub interrupted: bool,
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Succeeded: {}\nFailed: {}", self.succeeded, self.failed)
    }
}

/// Runs one batch against a chat session or the moderation endpoint.
#[derive(Debug, Clone)]
pub struct BatchRunner {
    action: BatchAction,
    delay: Duration,
}

impl BatchRunner {
    /// Creates a runner that waits `delay_secs` between items.
    ///
    /// Any non-negative delay is accepted, including ones below
    /// [`SAFE_DELAY_SECS`]; those are only warned about.
    pub fn new(action: BatchAction, delay_secs: f64) -> Result<Self> {
        let delay = Duration::try_from_secs_f64(delay_secs).map_err(|_| {
            Error::validation(
                format!("delay must be a non-negative number of seconds, got {delay_secs}"),
                Some("delay".to_string()),
            )
        })?;
        Ok(Self { action, delay })
    }

    /// The action applied to each item.
    pub fn action(&self) -> BatchAction {
        self.action
    }

    /// The pause between items.
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// True if the delay is short enough to risk rate limiting.
    pub fn is_risky_delay(&self) -> bool {
        self.delay.as_secs_f64() < SAFE_DELAY_SECS
    }

    /// Send every message in `workload` to the session's channel.
    pub async fn run_messages<S, C>(
        &self,
        session: &mut ChatSession<S>,
        workload: &Workload,
        confirm: &mut C,
        renderer: &mut dyn Renderer,
    ) -> Result<BatchReport>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
        C: Confirm + ?Sized,
    {
        if self.action != BatchAction::SendMessages {
            return Err(Error::validation(
                "moderation batches go through the moderation client",
                Some("mode".to_string()),
            ));
        }
        let channel = session.channel().channel.clone();
        if !self.preflight(workload, &channel, confirm, renderer)? {
            return Ok(BatchReport::default());
        }

        let total = workload.len();
        let mut report = BatchReport::default();
        renderer.print_info("\n--- Sending ---\n");
        for (index, item) in workload.items.iter().enumerate() {
            if self.interrupted(&mut report, renderer) {
                break;
            }
            match item {
                WorkItem::Message(text) => {
                    renderer.print_progress(
                        index + 1,
                        total,
                        &format!("Sending: {}", preview(text)),
                    );
                    report.attempted += 1;
                    match session.send_message(text).await {
                        Ok(()) => report.succeeded += 1,
                        Err(err) => {
                            report.failed += 1;
                            renderer.print_error(&format!(
                                "could not send message {}: {err}",
                                index + 1
                            ));
                        }
                    }
                }
                WorkItem::Target(_) => {
                    report.failed += 1;
                    renderer.print_error(&format!("item {} is not a chat message", index + 1));
                }
            }
            self.pause(index, total, &mut report).await;
        }

        if !report.interrupted {
            renderer.print_info("\n--- All messages sent ---\n");
        }
        Ok(report)
    }

    /// Ban or time out every target in `workload`.
    pub async fn run_moderation<H, C>(
        &self,
        client: &ModerationClient<'_, H>,
        workload: &Workload,
        confirm: &mut C,
        renderer: &mut dyn Renderer,
    ) -> Result<BatchReport>
    where
        H: IdentityResolver + ModerationApi,
        C: Confirm + ?Sized,
    {
        if self.action == BatchAction::SendMessages {
            return Err(Error::validation(
                "message batches need a chat session",
                Some("mode".to_string()),
            ));
        }
        let channel = client.channel().channel.clone();
        if !self.preflight(workload, &channel, confirm, renderer)? {
            return Ok(BatchReport::default());
        }

        let total = workload.len();
        let mut report = BatchReport::default();
        renderer.print_info(&format!("\n--- Starting {} ---\n", self.action.noun()));
        for (index, item) in workload.items.iter().enumerate() {
            if self.interrupted(&mut report, renderer) {
                break;
            }
            match item {
                WorkItem::Target(target) => {
                    renderer.print_progress(index + 1, total, &self.describe_target(target));
                    report.attempted += 1;
                    let outcome = self.moderate(client, target).await;
                    self.record(&mut report, target, outcome, renderer);
                }
                WorkItem::Message(_) => {
                    report.failed += 1;
                    renderer.print_error(&format!("item {} is not an account", index + 1));
                }
            }
            self.pause(index, total, &mut report).await;
        }

        renderer.print_info("\n--- Finished ---");
        renderer.print_info(&format!("{report}\n"));
        Ok(report)
    }

    /// Show the batch and ask for confirmation. Returns false when there is
    /// nothing to do; a refusal is [`Error::Abort`].
    fn preflight<C: Confirm + ?Sized>(
        &self,
        workload: &Workload,
        channel: &str,
        confirm: &mut C,
        renderer: &mut dyn Renderer,
    ) -> Result<bool> {
        if workload.is_empty() {
            renderer.print_info("The input file has no usable lines; nothing to do.");
            return Ok(false);
        }

        match self.action {
            BatchAction::SendMessages => {
                renderer.print_info(&format!("\nFound {} messages to send", workload.len()));
            }
            _ => {
                renderer.print_info(&format!(
                    "\nFound {} users to {}",
                    workload.len(),
                    self.action.noun()
                ));
            }
        }
        renderer.print_info(&format!(
            "Delay between actions: {} s",
            self.delay.as_secs_f64()
        ));
        renderer.print_info(&format!("Channel: #{channel}\n"));
        if self.is_risky_delay() {
            renderer.print_warning("a delay under 1 second may trigger rate limits");
        }
        for truncation in &workload.truncated {
            renderer.print_warning(&format!(
                "line {} is too long ({} characters), truncated to 500",
                truncation.line, truncation.length
            ));
        }

        if let BatchAction::Timeout { duration } = self.action {
            renderer.print_info(&format!(
                "Timeout duration: {duration} seconds ({} minutes)\n",
                duration / 60
            ));
        }
        if self.action != BatchAction::SendMessages {
            renderer.print_info("--- Users ---");
            for (index, item) in workload.items.iter().enumerate() {
                if let WorkItem::Target(target) = item {
                    renderer.print_info(&format!("{}. {}", index + 1, with_reason(target)));
                }
            }
            renderer.print_info("-------------\n");
        }

        let prompt = match self.action {
            BatchAction::SendMessages => "Start sending? (y/n): ".to_string(),
            _ => format!("Confirm {} of these users (y/n): ", self.action.noun()),
        };
        if confirm.confirm(&prompt) {
            Ok(true)
        } else {
            renderer.print_info("Cancelled.");
            Err(Error::abort("the operator declined the batch"))
        }
    }

    async fn moderate<H>(
        &self,
        client: &ModerationClient<'_, H>,
        target: &ModerationTarget,
    ) -> Result<()>
    where
        H: IdentityResolver + ModerationApi,
    {
        match self.action {
            BatchAction::Timeout { duration } => {
                client
                    .timeout_user(&target.login, duration, target.reason())
                    .await
            }
            _ => client.ban(&target.login, target.reason()).await,
        }
    }

    fn record(
        &self,
        report: &mut BatchReport,
        target: &ModerationTarget,
        outcome: Result<()>,
        renderer: &mut dyn Renderer,
    ) {
        match outcome {
            Ok(()) => {
                report.succeeded += 1;
                BATCH_SUCCEEDED.click();
                renderer.print_success(&self.describe_success(target));
            }
            Err(err) => {
                report.failed += 1;
                BATCH_FAILED.click();
                if err.is_not_found() {
                    renderer.print_error(&format!("could not find user {}", target.login));
                } else {
                    renderer.print_error(&format!(
                        "{} of {} failed: {err}",
                        self.action.noun(),
                        target.login
                    ));
                }
            }
        }
    }

    fn interrupted(&self, report: &mut BatchReport, renderer: &mut dyn Renderer) -> bool {
        if renderer.should_interrupt() {
            renderer.print_interrupted();
            report.interrupted = true;
        }
        report.interrupted
    }

    /// Sleep between items; never after the last one.
    async fn pause(&self, index: usize, total: usize, report: &mut BatchReport) {
        if index + 1 < total {
            tokio::time::sleep(self.delay).await;
            report.pauses += 1;
        }
    }

    fn describe_target(&self, target: &ModerationTarget) -> String {
        let verb = match self.action {
            BatchAction::Timeout { .. } => "Timeout",
            _ => "Ban",
        };
        format!("{verb}: {}", with_reason(target))
    }

    fn describe_success(&self, target: &ModerationTarget) -> String {
        match self.action {
            BatchAction::Timeout { duration } => {
                format!("Timed out: {} ({duration}s)", target.login)
            }
            _ => format!("Banned: {}", target.login),
        }
    }
}

fn with_reason(target: &ModerationTarget) -> String {
    match target.reason() {
        Some(reason) => format!("{} (reason: {reason})", target.login),
        None => target.login.clone(),
    }
}

fn preview(text: &str) -> String {
    if text.chars().count() > PREVIEW_CHARS {
        let head: String = text.chars().take(PREVIEW_CHARS).collect();
        format!("{head}...")
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::types::{AccountId, BanRequest, ChannelContext};
    use crate::workload::{parse_messages, parse_targets};

    #[derive(Default)]
    struct Captured {
        info: Vec<String>,
        success: Vec<String>,
        warnings: Vec<String>,
        errors: Vec<String>,
        progress: Vec<(usize, usize, String)>,
        interrupt_after: Option<usize>,
    }

    impl Renderer for Captured {
        fn print_info(&mut self, info: &str) {
            self.info.push(info.to_string());
        }
        fn print_success(&mut self, message: &str) {
            self.success.push(message.to_string());
        }
        fn print_warning(&mut self, warning: &str) {
            self.warnings.push(warning.to_string());
        }
        fn print_error(&mut self, error: &str) {
            self.errors.push(error.to_string());
        }
        fn print_progress(&mut self, index: usize, total: usize, text: &str) {
            self.progress.push((index, total, text.to_string()));
        }
        fn should_interrupt(&self) -> bool {
            self.interrupt_after
                .is_some_and(|after| self.progress.len() >= after)
        }
    }

    #[derive(Default)]
    struct FakeHelix {
        ids: HashMap<String, AccountId>,
        calls: AtomicUsize,
        filed: Mutex<Vec<BanRequest>>,
    }

    impl FakeHelix {
        fn with_user(mut self, login: &str, id: &str) -> Self {
            self.ids.insert(login.to_string(), AccountId::new(id));
            self
        }
    }

    #[async_trait::async_trait]
    impl IdentityResolver for FakeHelix {
        async fn resolve(&self, login: &str) -> Option<AccountId> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.ids.get(login).cloned()
        }
    }

    #[async_trait::async_trait]
    impl ModerationApi for FakeHelix {
        async fn create_ban(&self, _: &ChannelContext, request: BanRequest) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.filed.lock().unwrap().push(request);
            Ok(())
        }
    }

    fn channel() -> ChannelContext {
        ChannelContext::new("somechannel", AccountId::new("100"), AccountId::new("200"))
    }

    fn yes(_: &str) -> bool {
        true
    }

    #[test]
    fn negative_delay_is_rejected() {
        assert!(
            BatchRunner::new(BatchAction::Ban, -1.0)
                .unwrap_err()
                .is_validation()
        );
        assert!(BatchRunner::new(BatchAction::Ban, f64::NAN).is_err());
    }

    #[test]
    fn short_delay_is_kept_but_risky() {
        let runner = BatchRunner::new(BatchAction::Ban, 0.2).unwrap();
        assert_eq!(runner.delay(), Duration::from_millis(200));
        assert!(runner.is_risky_delay());
        assert!(!BatchRunner::new(BatchAction::Ban, 1.0).unwrap().is_risky_delay());
    }

    #[test]
    fn preview_is_cut_at_sixty_characters() {
        assert_eq!(preview("short"), "short");
        let long = "a".repeat(61);
        assert_eq!(preview(&long), format!("{}...", "a".repeat(60)));
    }

    #[tokio::test(start_paused = true)]
    async fn moderation_tally_counts_unresolved_as_failed() {
        let helix = FakeHelix::default().with_user("alice", "42");
        let channel = channel();
        let client = ModerationClient::new(&helix, &channel);
        let runner = BatchRunner::new(BatchAction::Ban, 1.5).unwrap();
        let workload = parse_targets("alice|spamming\nghost\n");
        let mut renderer = Captured::default();

        let report = runner
            .run_moderation(&client, &workload, &mut yes, &mut renderer)
            .await
            .unwrap();

        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.pauses, 1);
        assert_eq!(renderer.success, vec!["Banned: alice".to_string()]);
        assert_eq!(renderer.errors, vec!["could not find user ghost".to_string()]);
        assert_eq!(
            renderer.progress[0],
            (1, 2, "Ban: alice (reason: spamming)".to_string())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn timeouts_carry_duration() {
        let helix = FakeHelix::default()
            .with_user("alice", "42")
            .with_user("bob", "43");
        let channel = channel();
        let client = ModerationClient::new(&helix, &channel);
        let runner = BatchRunner::new(BatchAction::Timeout { duration: 300 }, 1.0).unwrap();
        let workload = parse_targets("alice\nbob|caps\n");
        let mut renderer = Captured::default();

        let started = tokio::time::Instant::now();
        let report = runner
            .run_moderation(&client, &workload, &mut yes, &mut renderer)
            .await
            .unwrap();

        assert_eq!(report.succeeded, 2);
        assert_eq!(started.elapsed(), Duration::from_secs(1));
        let filed = helix.filed.lock().unwrap();
        assert!(filed.iter().all(|r| r.duration == Some(300)));
        assert_eq!(filed[1].reason.as_deref(), Some("caps"));
        assert_eq!(renderer.success[0], "Timed out: alice (300s)");
    }

    #[tokio::test(start_paused = true)]
    async fn pauses_are_one_fewer_than_items() {
        for count in 0..4usize {
            let helix = FakeHelix::default();
            let channel = channel();
            let client = ModerationClient::new(&helix, &channel);
            let runner = BatchRunner::new(BatchAction::Ban, 2.0).unwrap();
            let lines: Vec<String> = (0..count).map(|i| format!("user{i}")).collect();
            let workload = parse_targets(&lines.join("\n"));
            let mut renderer = Captured::default();

            let report = runner
                .run_moderation(&client, &workload, &mut yes, &mut renderer)
                .await
                .unwrap();
            assert_eq!(report.pauses, count.saturating_sub(1));
            assert_eq!(report.failed, count);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn declining_performs_no_calls() {
        let helix = FakeHelix::default().with_user("alice", "42");
        let channel = channel();
        let client = ModerationClient::new(&helix, &channel);
        let runner = BatchRunner::new(BatchAction::Ban, 1.5).unwrap();
        let workload = parse_targets("alice\n");
        let mut renderer = Captured::default();
        let mut prompts = Vec::new();
        let mut decline = |prompt: &str| {
            prompts.push(prompt.to_string());
            false
        };

        let err = runner
            .run_moderation(&client, &workload, &mut decline, &mut renderer)
            .await
            .unwrap_err();

        assert!(err.is_abort());
        assert_eq!(prompts, vec!["Confirm ban of these users (y/n): ".to_string()]);
        assert_eq!(helix.calls.load(Ordering::SeqCst), 0);
        assert!(renderer.progress.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn interruption_stops_between_items() {
        let helix = FakeHelix::default()
            .with_user("alice", "42")
            .with_user("bob", "43");
        let channel = channel();
        let client = ModerationClient::new(&helix, &channel);
        let runner = BatchRunner::new(BatchAction::Ban, 1.5).unwrap();
        let workload = parse_targets("alice\nbob\ncarol\n");
        let mut renderer = Captured {
            interrupt_after: Some(1),
            ..Captured::default()
        };

        let report = runner
            .run_moderation(&client, &workload, &mut yes, &mut renderer)
            .await
            .unwrap();

        assert!(report.interrupted);
        assert_eq!(report.attempted, 1);
        assert_eq!(helix.filed.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn sub_second_delay_and_truncation_are_warned() {
        let helix = FakeHelix::default();
        let channel = channel();
        let client = ModerationClient::new(&helix, &channel);
        let runner = BatchRunner::new(BatchAction::Ban, 0.5).unwrap();
        let mut workload = parse_targets("alice\n");
        workload.truncated = parse_messages(&"x".repeat(501)).truncated;
        let mut renderer = Captured::default();

        runner
            .run_moderation(&client, &workload, &mut yes, &mut renderer)
            .await
            .unwrap();
        assert_eq!(renderer.warnings.len(), 2);
        assert!(renderer.warnings[0].contains("under 1 second"));
    }

    #[tokio::test]
    async fn message_runner_refuses_moderation() {
        let helix = FakeHelix::default();
        let channel = channel();
        let client = ModerationClient::new(&helix, &channel);
        let runner = BatchRunner::new(BatchAction::SendMessages, 1.5).unwrap();
        let mut renderer = Captured::default();
        let err = runner
            .run_moderation(&client, &parse_targets("a"), &mut yes, &mut renderer)
            .await
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn moderation_runner_refuses_messages() {
        // No scripted traffic: any write to the session would fail the mock.
        let mut session = ChatSession::joined(tokio_test::io::Builder::new().build(), channel());
        for action in [BatchAction::Ban, BatchAction::Timeout { duration: 60 }] {
            let runner = BatchRunner::new(action, 1.5).unwrap();
            let mut asked = false;
            let mut confirm = |_: &str| {
                asked = true;
                true
            };
            let mut renderer = Captured::default();
            let err = runner
                .run_messages(&mut session, &parse_messages("hello"), &mut confirm, &mut renderer)
                .await
                .unwrap_err();
            assert!(err.is_validation());
            assert!(!asked);
            assert!(renderer.progress.is_empty());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn empty_workload_skips_confirmation() {
        let helix = FakeHelix::default();
        let channel = channel();
        let client = ModerationClient::new(&helix, &channel);
        let runner = BatchRunner::new(BatchAction::Ban, 1.5).unwrap();
        let mut asked = false;
        let mut confirm = |_: &str| {
            asked = true;
            true
        };
        let mut renderer = Captured::default();
        let report = runner
            .run_moderation(&client, &Workload::default(), &mut confirm, &mut renderer)
            .await
            .unwrap();
        assert_eq!(report, BatchReport::default());
        assert!(!asked);
    }
}
