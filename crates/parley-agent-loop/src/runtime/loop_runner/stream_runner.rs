use super::convert::build_request;
use super::outcome::run_finish_result;
use super::prompt::SystemPromptBuilder;
use super::*;
use crate::contracts::{gen_message_id, Message, Part, TerminationReason, ToolCall};
use crate::registry::{DispatchOptions, ToolRegistry};
use crate::runtime::run_context::is_cancelled;
use crate::runtime::streaming::{StreamCollector, StreamOutput};
use async_stream::stream;
use futures::stream::FuturesUnordered;
use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::time::Instant;

/// Run the step loop over `history` and stream its events.
///
/// The stream always starts with `RunStart` and ends with exactly one of
/// `RunFinish` or `Error`. Dropping the stream early releases tool sources
/// through the registry's guard.
pub fn run_loop_stream(
    config: AgentConfig,
    registry: ToolRegistry,
    history: Vec<Message>,
    cancellation_token: Option<RunCancellationToken>,
) -> Pin<Box<dyn Stream<Item = AgentEvent> + Send>> {
    Box::pin(stream! {
        let run_id = uuid::Uuid::now_v7().to_string();
        let message_id = gen_message_id();
        let guard = registry.resource_guard();
        let executor = config.executor();
        let descriptors = registry.descriptors();
        let system_prompt = SystemPromptBuilder::new(config.system_prompt.clone()).build(&descriptors);
        let token = cancellation_token;
        let started_at = Instant::now();

        let mut stats = LoopStats::default();
        // Everything the model produced this turn, replayed into later steps.
        let mut working = Message::assistant(message_id.clone());
        let mut last_text = String::new();

        let span = tracing::info_span!("run", %run_id, model = %config.model);
        tracing::debug!(parent: &span, max_steps = config.max_steps, tools = descriptors.len(), "run started");

        macro_rules! terminate {
            ($error:expr) => {{
                let error: AgentLoopError = $error;
                guard.release().await;
                tracing::warn!(parent: &span, error = %error, steps = stats.steps, "run failed");
                yield AgentEvent::Error { message: error.to_string() };
                return;
            }};
        }

        macro_rules! finish_run {
            ($termination:expr) => {{
                let termination: TerminationReason = $termination;
                guard.release().await;
                stats.duration_ms = started_at.elapsed().as_millis() as u64;
                tracing::info!(
                    parent: &span,
                    termination = ?termination,
                    steps = stats.steps,
                    tool_calls = stats.tool_calls,
                    tool_errors = stats.tool_errors,
                    "run finished"
                );
                yield AgentEvent::RunFinish {
                    run_id: run_id.clone(),
                    result: run_finish_result(&termination, &last_text, &stats),
                    termination,
                };
                return;
            }};
        }

        yield AgentEvent::RunStart { run_id: run_id.clone(), message_id: message_id.clone() };

        loop {
            if is_cancelled(token.as_ref()) {
                finish_run!(TerminationReason::Cancelled);
            }
            // Checked before a step starts so `max_steps = 0` runs nothing.
            if stats.steps >= config.max_steps {
                finish_run!(TerminationReason::stopped_with_detail(
                    "max_steps_reached",
                    format!("stopped after {} steps", stats.steps),
                ));
            }

            stats.steps += 1;
            let step = stats.steps;
            yield AgentEvent::StepStart { step, message_id: message_id.clone() };

            let mut transcript = history.clone();
            if !working.parts.is_empty() {
                transcript.push(working.clone());
            }
            let request = build_request(&system_prompt, &transcript, &descriptors);

            stats.llm_calls += 1;
            let chat_stream = match start_stream_with_retry(&config, executor.as_ref(), request, token.as_ref()).await {
                StreamStart::Started { stream, retries } => {
                    stats.llm_retries += retries;
                    stream
                }
                StreamStart::Cancelled => finish_run!(TerminationReason::Cancelled),
                StreamStart::Failed { error, retries } => {
                    stats.llm_retries += retries;
                    terminate!(error);
                }
            };

            let mut collector = StreamCollector::new();
            let mut chat_stream = chat_stream;
            loop {
                let next = match await_or_cancel(token.as_ref(), chat_stream.next()).await {
                    CancelAware::Cancelled => finish_run!(TerminationReason::Cancelled),
                    CancelAware::Value(next) => next,
                };
                let Some(event) = next else {
                    break;
                };
                match event {
                    Ok(event) => {
                        for output in collector.process(event) {
                            match output {
                                StreamOutput::TextDelta(delta) => {
                                    yield AgentEvent::TextDelta { delta };
                                }
                                StreamOutput::ToolCallStart { id, name } => {
                                    yield AgentEvent::ToolCallStart { id, name };
                                }
                                StreamOutput::ToolCallDelta { id, args_delta } => {
                                    yield AgentEvent::ToolCallDelta { id, args_delta };
                                }
                                StreamOutput::ToolCallArgsReset { id, args_text } => {
                                    yield AgentEvent::ToolCallArgsReset { id, args_text };
                                }
                            }
                        }
                    }
                    Err(e) => terminate!(AgentLoopError::ModelInvocation(e.to_string())),
                }
            }

            let result = collector.finish();
            if !result.text.is_empty() {
                working.parts.push(Part::text(result.text.clone()));
            }
            last_text = result.text.clone();

            if !result.needs_tools() {
                yield AgentEvent::StepFinish { step, tool_calls: Vec::new() };
                finish_run!(TerminationReason::NaturalEnd);
            }

            let calls: Vec<ToolCall> = result.tool_calls;
            stats.tool_calls += calls.len();
            for call in &calls {
                yield AgentEvent::ToolCallReady {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    arguments: call.arguments.clone(),
                };
            }

            // Calls run concurrently; results are emitted as each completes.
            let tool_timeout = config.tool_timeout;
            let mut pending: FuturesUnordered<_> = calls
                .iter()
                .cloned()
                .map(|call| {
                    let registry = registry.clone();
                    let token = token.clone();
                    async move {
                        let options = DispatchOptions {
                            timeout: tool_timeout,
                            cancellation_token: token.as_ref(),
                        };
                        let result = registry.dispatch_call(&call, options).await;
                        (call, result)
                    }
                })
                .collect();

            let mut finished = Vec::with_capacity(calls.len());
            loop {
                let next = match await_or_cancel(token.as_ref(), pending.next()).await {
                    CancelAware::Cancelled => finish_run!(TerminationReason::Cancelled),
                    CancelAware::Value(next) => next,
                };
                let Some((call, result)) = next else {
                    break;
                };
                if result.is_error() {
                    stats.tool_errors += 1;
                }
                tracing::debug!(
                    parent: &span,
                    step,
                    call_id = %call.id,
                    tool = %call.name,
                    success = result.is_success(),
                    "tool call done"
                );
                yield AgentEvent::ToolCallDone { id: call.id.clone(), result: result.clone() };
                finished.push((call, result));
            }

            // Replay in issue order so the next request is deterministic.
            for call in &calls {
                if let Some((_, result)) = finished.iter().find(|(done, _)| done.id == call.id) {
                    working.parts.push(Part::tool_result(
                        call.id.clone(),
                        call.name.clone(),
                        call.arguments.clone(),
                        result.payload(),
                    ));
                }
            }

            yield AgentEvent::StepFinish { step, tool_calls: calls };
        }
    })
}
