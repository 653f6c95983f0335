//! C9: orchestrator. Drives one client request end to end — route, token,
//! cache check, convert, open the upstream stream, adapt it back to Claude
//! events, and record the outcome. Grounded on the teacher's worker-loop
//! shape: a bounded retry budget around account selection, with the actual
//! byte-shuffling delegated to C7/C8.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use bytes::Bytes;
use futures::StreamExt;
use relaymux_schema::claude::{
    ClaudeMessagesRequest, ClaudeStreamEvent, Delta, MessageDeltaPayload, StopReason, Usage,
};
use relaymux_schema::gemini::GeminiGenerateContentRequest;
use relaymux_thinking::ThoughtSignatureEngine;
use tokio::sync::mpsc;

use crate::adapt::{Adapter, AmazonQAdapter, ClaudePassthroughAdapter, GeminiAdapter, OpenaiAdapter, StreamAdapter};
use crate::cache::{self, CacheCheckResult, PromptCacheSimulator};
use crate::config::CONFIG;
use crate::convert::{self, ThinkingDirective};
use crate::db::{Account, ChannelType, CustomApiFormat, GeminiModelQuota, UsageRecord, UsageTracker};
use crate::error::{GeminiErrorBody, GeminiRateLimit, RelayError};
use crate::pool::AccountPool;
use crate::router::{self, RoutedRequest};
use crate::token::TokenManager;
use crate::tokenizer::{self, OutputTokenCounter};

const AMAZONQ_ENDPOINT: &str = "https://q.us-east-1.amazonaws.com/";
const GEMINI_DEFAULT_ENDPOINT: &str = "https://cloudcode-pa.googleapis.com";
const CHANNEL_BUFFER: usize = 64;

#[derive(Clone)]
pub struct Orchestrator {
    pool: AccountPool,
    tokens: TokenManager,
    cache: Arc<PromptCacheSimulator>,
    usage: UsageTracker,
    http: reqwest::Client,
    signatures: Arc<ThoughtSignatureEngine>,
}

impl Orchestrator {
    pub fn new(
        pool: AccountPool,
        tokens: TokenManager,
        cache: Arc<PromptCacheSimulator>,
        usage: UsageTracker,
        http: reqwest::Client,
        signatures: Arc<ThoughtSignatureEngine>,
    ) -> Self {
        Orchestrator {
            pool,
            tokens,
            cache,
            usage,
            http,
            signatures,
        }
    }

    /// Drives the request to the point where the upstream has accepted it
    /// (status line received) and returns a channel of Claude SSE events.
    /// Retries within `CONFIG.max_retries` attempts cover routing, token,
    /// and upstream-open failures; once streaming has begun, failures are
    /// surfaced as synthetic in-stream events instead (§4.9 "no retry after
    /// a clean 200").
    pub async fn dispatch(
        &self,
        request: ClaudeMessagesRequest,
        pinned_account_id: Option<String>,
    ) -> Result<mpsc::Receiver<ClaudeStreamEvent>, RelayError> {
        let thinking = ThinkingDirective {
            enabled: match &request.thinking {
                Some(cfg) => cfg.enabled(),
                None => CONFIG.thinking_default_enabled,
            },
            budget_tokens: request
                .thinking
                .as_ref()
                .map_or(ThinkingDirective::DEFAULT_BUDGET, |t| {
                    t.budget_tokens(ThinkingDirective::DEFAULT_BUDGET)
                }),
        };

        let mut last_error = RelayError::NoEligibleAccount;
        let attempts = CONFIG.max_retries.max(1);
        let mut excluded: Vec<String> = Vec::new();

        for _ in 0..attempts {
            let routed = match self.route_excluding(&request, pinned_account_id.as_deref(), &excluded).await {
                Ok(routed) => routed,
                Err(err) => {
                    last_error = err;
                    continue;
                }
            };

            let token = match self.tokens.get_valid_token(&routed.account).await {
                Ok(token) => token,
                Err(err) => {
                    let _ = self.pool.record_failure(&routed.account, false).await;
                    last_error = err;
                    continue;
                }
            };

            let estimated_input = tokenizer::estimate_input_tokens(&request);
            let cache_key = cache::cache_key(&request);
            let cache_result = cache_key.map(|key| self.cache.check(key, estimated_input));

            match self
                .open_upstream(&routed, &request, &token, thinking, cache_result)
                .await
            {
                Ok(receiver) => return Ok(receiver),
                Err(OpenOutcome::RateLimited(err)) => {
                    let _ = self.pool.record_failure(&routed.account, true).await;
                    last_error = err;
                    if pinned_account_id.is_none() {
                        excluded.push(routed.account.id.clone());
                    }
                }
                Err(OpenOutcome::Fatal(err)) => {
                    let _ = self.pool.record_failure(&routed.account, false).await;
                    return Err(err);
                }
                Err(OpenOutcome::Retryable(err)) => {
                    let _ = self.pool.record_failure(&routed.account, false).await;
                    last_error = err;
                }
            }
        }

        Err(last_error)
    }

    async fn route_excluding(
        &self,
        request: &ClaudeMessagesRequest,
        pinned_account_id: Option<&str>,
        excluded: &[String],
    ) -> Result<RoutedRequest, RelayError> {
        // `X-Account-ID` pins bypass exclusion entirely (§4.6): a pinned
        // request either uses that account or fails outright.
        if pinned_account_id.is_some() || excluded.is_empty() {
            return router::route(&self.pool, request, pinned_account_id).await;
        }
        for _ in 0..8 {
            let routed = router::route(&self.pool, request, None).await?;
            if !excluded.contains(&routed.account.id) {
                return Ok(routed);
            }
        }
        Err(RelayError::NoEligibleAccount)
    }

    /// Opens the upstream HTTP stream, reads the status line, and either
    /// returns a receiver already fed with `message_start` or classifies
    /// the failure for the retry loop above.
    async fn open_upstream(
        &self,
        routed: &RoutedRequest,
        request: &ClaudeMessagesRequest,
        token: &str,
        thinking: ThinkingDirective,
        cache_result: Option<CacheCheckResult>,
    ) -> Result<mpsc::Receiver<ClaudeStreamEvent>, OpenOutcome> {
        let account = routed.account.clone();
        let target_model = routed.target_model.clone();
        let estimated_input = tokenizer::estimate_input_tokens(request);

        let response = match account.channel {
            ChannelType::AmazonQ => {
                let body = convert::build_amazonq_request(request, account.extension.profile_arn.clone(), thinking);
                self.http
                    .post(AMAZONQ_ENDPOINT)
                    .header("Content-Type", "application/x-amz-json-1.0")
                    .header("X-Amz-Target", "AmazonCodeWhispererStreamingService.GenerateAssistantResponse")
                    .bearer_auth(token)
                    .json(&body)
                    .send()
                    .await
            }
            ChannelType::Gemini => {
                let body: GeminiGenerateContentRequest = convert::build_gemini_request(request, thinking);
                let endpoint = account
                    .extension
                    .custom_api_base_url
                    .clone()
                    .unwrap_or_else(|| GEMINI_DEFAULT_ENDPOINT.to_string());
                let url = format!("{endpoint}/v1internal:streamGenerateContent?alt=sse");
                let mut req = self.http.post(url).bearer_auth(token).json(&body);
                if let Some(project_id) = &account.extension.project_id {
                    req = req.header("x-goog-user-project", project_id.as_str());
                }
                req.send().await
            }
            ChannelType::CustomApi => match account.extension.custom_api_format {
                Some(CustomApiFormat::ClaudeCompatible) => {
                    let is_azure = account.extension.is_azure();
                    let body = convert::build_claude_passthrough_request(request, &target_model, is_azure);
                    let base = custom_api_base(&account);
                    let url = format!("{base}/v1/messages");
                    self.http
                        .post(url)
                        .header("x-api-key", token)
                        .header("anthropic-version", "2023-06-01")
                        .json(&body)
                        .send()
                        .await
                }
                _ => {
                    let body = convert::build_openai_request(request, thinking);
                    let base = custom_api_base(&account);
                    let url = format!("{base}/v1/chat/completions");
                    self.http.post(url).bearer_auth(token).json(&body).send().await
                }
            },
        };

        let response = match response {
            Ok(response) => response,
            Err(err) => return Err(OpenOutcome::Retryable(RelayError::Http(err))),
        };

        let status = response.status();
        if status.as_u16() == 429 {
            if account.channel == ChannelType::Gemini {
                return Err(self.handle_gemini_rate_limit(&account, &target_model, response).await);
            }
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(CONFIG.circuit_breaker_recovery_timeout);
            return Err(OpenOutcome::RateLimited(RelayError::UpstreamRateLimit {
                retry_after_seconds: retry_after,
            }));
        }
        if status.is_server_error() {
            let detail = response.text().await.unwrap_or_default();
            return Err(OpenOutcome::Retryable(RelayError::UpstreamServerError(detail)));
        }
        if status.is_client_error() {
            let detail = response.text().await.unwrap_or_default();
            return Err(OpenOutcome::Fatal(RelayError::UpstreamClientError { status, detail }));
        }

        let message_id = format!("msg_{}", uuid::Uuid::new_v4().simple());
        let adapter = match account.channel {
            ChannelType::AmazonQ => Adapter::AmazonQ(AmazonQAdapter::new(message_id, target_model.clone())),
            ChannelType::Gemini => Adapter::Gemini(GeminiAdapter::new(message_id, target_model.clone(), self.signatures.clone())),
            ChannelType::CustomApi => match account.extension.custom_api_format {
                Some(CustomApiFormat::ClaudeCompatible) => {
                    let (creation, read) = cache_result
                        .map(|r| (r.cache_creation_tokens, r.cache_read_tokens))
                        .unwrap_or((0, 0));
                    Adapter::ClaudePassthrough(ClaudePassthroughAdapter::new(creation, read))
                }
                _ => Adapter::Openai(OpenaiAdapter::new(message_id, target_model.clone())),
            },
        };

        let (tx, rx) = mpsc::channel(CHANNEL_BUFFER);
        let task = StreamTask {
            pool: self.pool.clone(),
            usage: self.usage.clone(),
            account,
            target_model,
            estimated_input,
            cache_result,
            adapter,
            body_stream: response.bytes_stream().boxed(),
            tx,
        };
        tokio::spawn(task.run());
        Ok(rx)
    }

    /// §4.9 failover for Gemini 429s: a daily quota exhaustion marks
    /// `target_model`'s `remaining=0` on the account (so routing's §4.4
    /// eligibility filter skips it until `reset_at`), while an ordinary
    /// per-minute burst just reports a short retry delay.
    async fn handle_gemini_rate_limit(&self, account: &Account, target_model: &str, response: reqwest::Response) -> OpenOutcome {
        let now = chrono::Utc::now();
        let body_text = response.text().await.unwrap_or_default();
        let Ok(body) = serde_json::from_str::<GeminiErrorBody>(&body_text) else {
            return OpenOutcome::RateLimited(RelayError::UpstreamRateLimit {
                retry_after_seconds: CONFIG.circuit_breaker_recovery_timeout,
            });
        };
        match body.classify(now) {
            GeminiRateLimit::QuotaExhausted { reset_at } => {
                let mut extension = account.extension.clone();
                extension
                    .gemini_model_quota
                    .insert(target_model.to_string(), GeminiModelQuota { remaining: 0, reset_at: Some(reset_at) });
                let _ = self.pool.store().update_extension(&account.id, &extension).await;
                let retry_after_seconds = (reset_at - now).num_seconds().max(1) as u64;
                OpenOutcome::RateLimited(RelayError::UpstreamRateLimit { retry_after_seconds })
            }
            GeminiRateLimit::PerMinute { retry_after_seconds } => {
                OpenOutcome::RateLimited(RelayError::UpstreamRateLimit { retry_after_seconds })
            }
        }
    }
}

fn custom_api_base(account: &Account) -> String {
    let base = account
        .extension
        .custom_api_base_url
        .clone()
        .unwrap_or_else(|| CONFIG.base_url.clone().unwrap_or_default());
    base.trim_end_matches('/').to_string()
}

enum OpenOutcome {
    RateLimited(RelayError),
    Retryable(RelayError),
    Fatal(RelayError),
}

/// Owns one upstream byte stream for the lifetime of a single client
/// request: runs the C8 adapter over it, splices in `ping` events during
/// silence, enforces the overall deadline, and performs post-hoc
/// bookkeeping (§4.9 steps 6-8).
struct StreamTask {
    pool: AccountPool,
    usage: UsageTracker,
    account: Account,
    target_model: String,
    estimated_input: u32,
    cache_result: Option<CacheCheckResult>,
    adapter: Adapter,
    body_stream: futures::stream::BoxStream<'static, reqwest::Result<Bytes>>,
    tx: mpsc::Sender<ClaudeStreamEvent>,
}

impl StreamTask {
    async fn run(mut self) {
        let deadline = StdDuration::from_secs(CONFIG.request_deadline_margin_seconds + 30);
        let ping_interval = StdDuration::from_secs(CONFIG.ping_interval_seconds.max(1));

        let outcome = tokio::time::timeout(deadline, self.drive(ping_interval)).await;

        match outcome {
            Ok(StreamOutcome::Clean { output_tokens }) => {
                let _ = self.pool.record_success(&self.account, &self.target_model).await;
                let usage = self.resolved_usage(output_tokens);
                // `ClaudePassthrough` already forwarded the upstream's own
                // terminal `message_delta`/`message_stop`; sending another
                // pair here would duplicate the stream (§4.8d).
                if !matches!(self.adapter, Adapter::ClaudePassthrough(_)) {
                    let events = [
                        ClaudeStreamEvent::MessageDelta {
                            delta: MessageDeltaPayload {
                                stop_reason: Some(self.adapter.stop_reason()),
                                stop_sequence: None,
                            },
                            usage,
                        },
                        ClaudeStreamEvent::MessageStop,
                    ];
                    for event in events {
                        if self.tx.send(event).await.is_err() {
                            break;
                        }
                    }
                }
                self.record_usage(usage).await;
            }
            Ok(StreamOutcome::Aborted) | Err(_) => {
                let _ = self.pool.record_failure(&self.account, false).await;
                // §4.9 step 8: a well-formed ending for the client, not a
                // custom stop reason — `end_turn` is what Anthropic's own
                // clients expect to see on a closed stream.
                let events = [
                    ClaudeStreamEvent::MessageDelta {
                        delta: MessageDeltaPayload {
                            stop_reason: Some(StopReason::EndTurn),
                            stop_sequence: None,
                        },
                        usage: Usage::default(),
                    },
                    ClaudeStreamEvent::MessageStop,
                ];
                for event in events {
                    if self.tx.send(event).await.is_err() {
                        break;
                    }
                }
            }
        }
    }

    async fn drive(&mut self, ping_interval: StdDuration) -> StreamOutcome {
        let mut counter = OutputTokenCounter::default();
        loop {
            let next = tokio::time::timeout(ping_interval, self.body_stream.next()).await;
            match next {
                Ok(Some(Ok(chunk))) => {
                    for event in self.adapter.push(&chunk) {
                        accumulate_text(&event, &mut counter);
                        if self.tx.send(event).await.is_err() {
                            return StreamOutcome::Aborted;
                        }
                    }
                }
                Ok(Some(Err(_))) => return StreamOutcome::Aborted,
                Ok(None) => {
                    for event in self.adapter.finish() {
                        accumulate_text(&event, &mut counter);
                        if self.tx.send(event).await.is_err() {
                            return StreamOutcome::Aborted;
                        }
                    }
                    return StreamOutcome::Clean {
                        output_tokens: counter.total(),
                    };
                }
                Err(_) => {
                    if self.tx.send(ClaudeStreamEvent::Ping).await.is_err() {
                        return StreamOutcome::Aborted;
                    }
                }
            }
        }
    }

    /// §4.9 step 6: prefer the upstream's own reported usage (Gemini/OpenAI)
    /// over the character-based estimate, and inject the C5 cache stats.
    fn resolved_usage(&self, output_tokens: u32) -> Usage {
        let (cache_creation, cache_read) = self
            .cache_result
            .map(|r| (r.cache_creation_tokens, r.cache_read_tokens))
            .unwrap_or((0, 0));
        let (input_tokens, output_tokens) = match self.adapter.usage() {
            Some(real) => (real.input_tokens, real.output_tokens),
            None => (self.estimated_input, output_tokens),
        };
        Usage {
            input_tokens,
            output_tokens,
            cache_creation_input_tokens: (cache_creation > 0).then_some(cache_creation),
            cache_read_input_tokens: (cache_read > 0).then_some(cache_read),
        }
    }

    async fn record_usage(&self, usage: Usage) {
        let record = UsageRecord {
            model: self.target_model.clone(),
            channel: self.account.channel.as_str().to_string(),
            account_id: Some(self.account.id.clone()),
            input_tokens: i64::from(usage.input_tokens),
            output_tokens: i64::from(usage.output_tokens),
            cache_creation_tokens: i64::from(usage.cache_creation_input_tokens.unwrap_or(0)),
            cache_read_tokens: i64::from(usage.cache_read_input_tokens.unwrap_or(0)),
        };
        let _ = self.usage.record(Some(&self.account.id), self.account.channel, &record).await;
    }
}

enum StreamOutcome {
    Clean { output_tokens: u32 },
    Aborted,
}

/// Output-token accounting runs off the already-adapted Claude events
/// rather than raw upstream bytes, so AmazonQ's binary framing and
/// Gemini/OpenAI's JSON envelopes don't inflate the estimate.
fn accumulate_text(event: &ClaudeStreamEvent, counter: &mut OutputTokenCounter) {
    if let ClaudeStreamEvent::ContentBlockDelta { delta, .. } = event {
        match delta {
            Delta::TextDelta { text } | Delta::ThinkingDelta { thinking: text } => counter.push(text),
            Delta::InputJsonDelta { partial_json } => counter.push(partial_json),
            Delta::SignatureDelta { .. } => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn custom_api_base_trims_trailing_slash() {
        let mut account = sample_account();
        account.extension.custom_api_base_url = Some("https://example.com/".into());
        assert_eq!(custom_api_base(&account), "https://example.com");
    }

    fn sample_account() -> Account {
        let now = chrono::Utc::now();
        Account {
            id: "acct-1".into(),
            channel: ChannelType::CustomApi,
            label: "test".into(),
            client_id: String::new(),
            client_secret: String::new(),
            refresh_token: String::new(),
            access_token: None,
            token_expires_at: None,
            extension: crate::db::Extension::default(),
            model_mappings: Vec::new(),
            enabled: true,
            weight: 50,
            rate_limit_per_hour: 20,
            cooldown_until: None,
            last_used_at: None,
            request_count: 0,
            success_count: 0,
            error_count: 0,
            error_streak: 0,
            last_refresh_status: None,
            last_refresh_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}
