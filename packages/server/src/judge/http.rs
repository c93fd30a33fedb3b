use std::time::Duration;

use arena_common::Verdict;
use arena_common::config::JudgeClientConfig;
use arena_common::judge::{
    CaseInput, CaseOutcome, ExecutionReport, ExecutionRequest, outputs_match,
};
use arena_common::retry::calculate_backoff;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use super::{Judge, JudgeError};

const STATUS_IN_QUEUE: i32 = 1;
const STATUS_PROCESSING: i32 = 2;
const STATUS_ACCEPTED: i32 = 3;
const STATUS_WRONG_ANSWER: i32 = 4;
const STATUS_TIME_LIMIT: i32 = 5;
const STATUS_COMPILATION_ERROR: i32 = 6;

const RESULT_FIELDS: &str = "token,status,stdout,stderr,compile_output,message,time,memory";

/// Client for a Judge0-compatible execution API.
///
/// Cases are created in batches of at most `max_batch_size` and each batch is
/// polled until none is queued or processing. Output comparison happens locally,
/// so expected outputs never leave the server.
pub struct HttpJudge {
    client: Client,
    config: JudgeClientConfig,
}

#[derive(Serialize)]
struct BatchCreate<'a> {
    submissions: Vec<CreateSubmission<'a>>,
}

#[derive(Serialize)]
struct CreateSubmission<'a> {
    language_id: i32,
    source_code: &'a str,
    stdin: &'a str,
    /// Seconds.
    cpu_time_limit: f64,
    /// Kilobytes.
    memory_limit: i32,
}

#[derive(Deserialize)]
struct CreatedToken {
    token: Option<String>,
}

#[derive(Deserialize)]
struct BatchStatus {
    submissions: Vec<RemoteSubmission>,
}

#[derive(Deserialize)]
struct RemoteSubmission {
    status: RemoteStatus,
    stdout: Option<String>,
    stderr: Option<String>,
    compile_output: Option<String>,
    message: Option<String>,
    /// Seconds as a decimal string, e.g. "0.012".
    time: Option<String>,
    /// Kilobytes.
    memory: Option<i32>,
}

#[derive(Deserialize)]
struct RemoteStatus {
    id: i32,
}

impl RemoteSubmission {
    fn is_finished(&self) -> bool {
        !matches!(self.status.id, STATUS_IN_QUEUE | STATUS_PROCESSING)
    }
}

impl HttpJudge {
    pub fn new(config: JudgeClientConfig) -> Result<Self, JudgeError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client, config })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/submissions/batch",
            self.config.url.trim_end_matches('/')
        )
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        match (&self.config.api_key, &self.config.api_host) {
            (Some(key), Some(host)) => builder
                .header("X-RapidAPI-Key", key)
                .header("X-RapidAPI-Host", host),
            (Some(key), None) => builder.header("X-Auth-Token", key),
            _ => builder,
        }
    }

    async fn create_batch(
        &self,
        language_id: i32,
        request: &ExecutionRequest,
        cases: &[CaseInput],
    ) -> Result<Vec<String>, JudgeError> {
        let cpu_time_limit = self.config.cpu_time_limit_secs(request.time_limit_ms);
        let memory_limit = self.config.memory_limit_kb(request.memory_limit_kb);
        let body = BatchCreate {
            submissions: cases
                .iter()
                .map(|case| CreateSubmission {
                    language_id,
                    source_code: &request.source,
                    stdin: &case.input,
                    cpu_time_limit,
                    memory_limit,
                })
                .collect(),
        };

        let mut retries = 0u8;
        loop {
            let sent = self
                .authorized(self.client.post(self.endpoint()))
                .query(&[("base64_encoded", "false")])
                .json(&body)
                .send()
                .await;

            let err = match sent {
                Ok(resp) if resp.status().is_success() => {
                    let created: Vec<CreatedToken> = resp.json().await?;
                    if created.len() != cases.len() {
                        return Err(JudgeError::BadResponse(format!(
                            "expected {} tokens, got {}",
                            cases.len(),
                            created.len()
                        )));
                    }
                    return created
                        .into_iter()
                        .map(|c| {
                            c.token.ok_or_else(|| {
                                JudgeError::BadResponse("submission rejected by judge".into())
                            })
                        })
                        .collect();
                }
                Ok(resp) if resp.status().is_server_error() => upstream_error(resp).await,
                Ok(resp) => return Err(upstream_error(resp).await),
                Err(e) => JudgeError::Transport(e),
            };

            if !self.config.retry.should_retry(retries) {
                return Err(err);
            }
            retries += 1;
            let delay = self.config.retry.delay(retries);
            warn!(
                retry = retries,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Judge batch creation failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }

    async fn wait_for(&self, tokens: &[String]) -> Result<Vec<RemoteSubmission>, JudgeError> {
        let joined = tokens.join(",");
        let interval = self.config.poll_interval_ms;

        for poll in 1..=self.config.max_polls {
            let delay = calculate_backoff(poll.min(4) as u8, interval, interval.saturating_mul(4));
            tokio::time::sleep(delay.max(Duration::from_millis(interval))).await;

            let resp = self
                .authorized(self.client.get(self.endpoint()))
                .query(&[
                    ("tokens", joined.as_str()),
                    ("base64_encoded", "false"),
                    ("fields", RESULT_FIELDS),
                ])
                .send()
                .await?;
            if !resp.status().is_success() {
                return Err(upstream_error(resp).await);
            }
            let batch: BatchStatus = resp.json().await?;
            if batch.submissions.len() != tokens.len() {
                return Err(JudgeError::BadResponse(format!(
                    "expected {} results, got {}",
                    tokens.len(),
                    batch.submissions.len()
                )));
            }
            if batch.submissions.iter().all(RemoteSubmission::is_finished) {
                return Ok(batch.submissions);
            }
            debug!(poll, "Judge batch still running");
        }

        Err(JudgeError::Timeout {
            polls: self.config.max_polls,
        })
    }
}

async fn upstream_error(resp: Response) -> JudgeError {
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    JudgeError::Upstream { status, body }
}

fn parse_time_ms(time: Option<&str>) -> Option<i32> {
    let seconds: f64 = time?.parse().ok()?;
    Some((seconds * 1000.0).round() as i32)
}

/// Map a finished remote result to a case verdict.
fn verdict_for(
    remote: &RemoteSubmission,
    expected_output: Option<&str>,
    memory_limit_kb: i32,
) -> Verdict {
    if remote.memory.is_some_and(|m| m > memory_limit_kb) {
        return Verdict::MemoryLimitExceeded;
    }
    match remote.status.id {
        STATUS_ACCEPTED => match expected_output {
            Some(expected) if !outputs_match(remote.stdout.as_deref().unwrap_or(""), expected) => {
                Verdict::WrongAnswer
            }
            _ => Verdict::Accepted,
        },
        STATUS_WRONG_ANSWER => Verdict::WrongAnswer,
        STATUS_TIME_LIMIT => Verdict::TimeLimitExceeded,
        7..=12 => Verdict::RuntimeError,
        _ => Verdict::SystemError,
    }
}

fn build_report(request: &ExecutionRequest, results: Vec<RemoteSubmission>) -> ExecutionReport {
    if let Some(failed) = results
        .iter()
        .find(|r| r.status.id == STATUS_COMPILATION_ERROR)
    {
        let output = failed
            .compile_output
            .clone()
            .or_else(|| failed.message.clone())
            .unwrap_or_default();
        return ExecutionReport::compile_error(output);
    }

    let cases = results
        .into_iter()
        .zip(&request.cases)
        .map(|(remote, case)| CaseOutcome {
            verdict: verdict_for(
                &remote,
                case.expected_output.as_deref(),
                request.memory_limit_kb,
            ),
            time_used: parse_time_ms(remote.time.as_deref()),
            memory_used: remote.memory,
            stdout: remote.stdout,
            stderr: remote.stderr.or(remote.message),
        })
        .collect();

    ExecutionReport {
        compile_error: None,
        cases,
    }
}

#[async_trait]
impl Judge for HttpJudge {
    #[instrument(skip(self, request), fields(language = %request.language, cases = request.cases.len()))]
    async fn execute(&self, request: &ExecutionRequest) -> Result<ExecutionReport, JudgeError> {
        let language_id = self
            .config
            .language_id(&request.language)
            .ok_or_else(|| JudgeError::UnsupportedLanguage(request.language.clone()))?;

        if request.cases.is_empty() {
            return Ok(ExecutionReport::default());
        }

        let batch_size = self.config.max_batch_size.max(1);
        let mut batches = Vec::new();
        for cases in request.cases.chunks(batch_size) {
            batches.push(self.create_batch(language_id, request, cases).await?);
        }
        debug!(batches = batches.len(), "Judge batches created");

        let mut results = Vec::with_capacity(request.cases.len());
        for tokens in &batches {
            results.extend(self.wait_for(tokens).await?);
        }
        Ok(build_report(request, results))
    }
}
