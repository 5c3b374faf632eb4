//! Command-line front end.
//!
//! Every subcommand is a thin wrapper over the library API; output is plain
//! text on stdout, logs go to stderr through `tracing`.

use std::io::Write as _;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Subcommand;
use futures::StreamExt;
use serde_json::Value;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use uuid::Uuid;

use crate::agents::{Assistant, AssistantParams, AssistantPatch};
use crate::client::Client;
use crate::config::AppConfig;
use crate::flows::{Execution, ExecutionStatus, FlowRun, Outcome, RunOutcome};
use crate::polling::{ExecutionPoller, PollEvent, PollerConfig};
use crate::stream::{FlowEventStream, FlowExecutionArtifact, ProgressStatus, StreamEvent};
use crate::text::{format_date_label, format_duration, to_normal_case};
use crate::threads::{RunInput, ThreadReconciler, format_answers};

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Browse, run and manage flows
    #[command(subcommand)]
    Flows(FlowsCommand),
    /// Track and manage flow executions
    #[command(subcommand)]
    Executions(ExecutionsCommand),
    /// Agent conversation threads
    #[command(subcommand)]
    Threads(ThreadsCommand),
    /// Custom agents
    #[command(subcommand)]
    Agents(AgentsCommand),
}

#[derive(Subcommand, Debug)]
pub enum FlowsCommand {
    /// List flows
    List {
        #[arg(long, default_value_t = 0)]
        offset: u64,
        #[arg(long, default_value_t = 12)]
        limit: u64,
    },
    /// Show the parameters a flow accepts
    Schema { flow_id: String },
    /// Run a flow, streaming its progress
    Run {
        flow_id: String,
        /// Parameter as NAME=VALUE; repeatable
        #[arg(short = 'p', long = "param", value_parser = parse_key_val)]
        params: Vec<(String, String)>,
        /// Execute synchronously, then track the execution by polling
        #[arg(long)]
        poll: bool,
        /// Server-side timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,
        /// Reuse a run id instead of generating one
        #[arg(long)]
        run_id: Option<String>,
    },
    /// Run history of a flow
    Runs {
        flow_id: String,
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
    /// Details and events of one run
    RunDetails { run_id: String },
    /// Delete a flow, or every flow with --all
    Delete {
        flow_id: Option<String>,
        #[arg(long, conflicts_with = "flow_id")]
        all: bool,
    },
    /// Print the source code of a flow
    Code { flow_id: String },
    /// Print the generated explanation of a flow
    Explain {
        flow_id: String,
        #[arg(long)]
        regenerate: bool,
    },
    /// Compile a flow source file
    Compile {
        path: PathBuf,
        #[arg(long)]
        name: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
pub enum ExecutionsCommand {
    /// Poll an execution until it finishes
    Watch { execution_id: String },
    /// Cancel a running execution
    Cancel { execution_id: String },
    /// Delete an execution record
    Delete { execution_id: String },
    /// List executions
    List {
        /// Only executions of this flow
        #[arg(long)]
        flow: Option<String>,
        #[arg(long, value_parser = parse_status)]
        status: Option<ExecutionStatus>,
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
}

#[derive(Subcommand, Debug)]
pub enum ThreadsCommand {
    /// Conversation history of an agent
    List { assistant_id: String },
    /// Start a new conversation with an agent
    Create { assistant_id: String },
    /// Print the messages of a thread
    State { thread_id: String },
    /// Send a message and stream the agent's reply
    Send {
        thread_id: String,
        assistant_id: String,
        message: String,
        /// Run flows the agent asks for
        #[arg(long)]
        run_flows: bool,
    },
    /// Answer an agent that is waiting for input and stream its reply
    Resume {
        thread_id: String,
        assistant_id: String,
        /// One answer per question, in order
        #[arg(required = true)]
        answers: Vec<String>,
        /// Run flows the agent asks for
        #[arg(long)]
        run_flows: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum AgentsCommand {
    /// List agents
    List,
    /// Show one agent
    Get { assistant_id: String },
    /// Create an agent
    Create {
        name: String,
        #[arg(long)]
        model: String,
        #[arg(long)]
        instructions: String,
        /// Flow the agent may run; repeatable
        #[arg(long = "flow")]
        flows: Vec<String>,
        /// Tool service the agent may use; repeatable
        #[arg(long = "service")]
        services: Vec<String>,
    },
    /// Update an agent; omitted settings are kept
    Update {
        assistant_id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        model: Option<String>,
        #[arg(long)]
        instructions: Option<String>,
        #[arg(long = "flow")]
        flows: Option<Vec<String>>,
        #[arg(long = "service")]
        services: Option<Vec<String>>,
    },
    /// Delete an agent
    Delete { assistant_id: String },
    /// Model presets agents can use
    Presets,
    /// Tool services agents can use
    Services,
}

fn parse_key_val(raw: &str) -> std::result::Result<(String, String), String> {
    raw.split_once('=')
        .map(|(name, value)| (name.trim().to_string(), value.to_string()))
        .ok_or_else(|| format!("expected NAME=VALUE, got `{raw}`"))
}

fn parse_status(raw: &str) -> std::result::Result<ExecutionStatus, String> {
    serde_json::from_value(Value::String(raw.to_lowercase()))
        .map_err(|err| format!("unknown status `{raw}`: {err}"))
}

/// Run one subcommand to completion.
pub async fn run(command: Command, client: &Client, config: &AppConfig) -> Result<()> {
    match command {
        Command::Flows(cmd) => flows(cmd, client, config).await,
        Command::Executions(cmd) => executions(cmd, client, config).await,
        Command::Threads(cmd) => threads(cmd, client, config).await,
        Command::Agents(cmd) => agents(cmd, client).await,
    }
}

// =============================================================================
// Flows
// =============================================================================

async fn flows(cmd: FlowsCommand, client: &Client, config: &AppConfig) -> Result<()> {
    match cmd {
        FlowsCommand::List { offset, limit } => {
            let page = client.flows().list(offset, limit).await?;
            for flow in &page.flows {
                println!("{}  {}", flow.id, to_normal_case(&flow.name));
                if !flow.description.is_empty() {
                    println!("    {}", flow.description);
                }
            }
            println!("{} of {} flows", page.flows.len(), page.total);
        }
        FlowsCommand::Schema { flow_id } => {
            let schema = client.flows().schema(&flow_id).await?;
            println!("{} ({})", to_normal_case(&schema.name), schema.id);
            if !schema.description.is_empty() {
                println!("{}", schema.description);
            }
            for (name, param) in &schema.parameters {
                let required = if param.required { ", required" } else { "" };
                println!("  {name}: {}{required}", param.kind);
                if let Some(description) = &param.description {
                    println!("      {description}");
                }
                if let Some(default) = &param.default {
                    println!("      default: {default}");
                }
            }
        }
        FlowsCommand::Run {
            flow_id,
            params,
            poll,
            timeout,
            run_id,
        } => {
            let schema = client.flows().schema(&flow_id).await?;
            let parameters = schema
                .parameters_from_pairs(params.iter().map(|(k, v)| (k.as_str(), v.as_str())))?;
            let validation = client.flows().validate(&flow_id, &parameters).await?;
            for warning in &validation.warnings {
                eprintln!("warning: {warning}");
            }
            if !validation.is_valid {
                bail!("Validation failed: {}", validation.errors.join(", "));
            }
            let timeout = timeout.unwrap_or(config.streaming.timeout_secs);

            if poll {
                return run_and_poll(client, config, &flow_id, &parameters, timeout).await;
            }
            let run_id = run_id.unwrap_or_else(|| Uuid::new_v4().to_string());
            info!(name: "flow.run.started", flow_id = %flow_id, run_id = %run_id, "Running flow");
            let events = client
                .flows()
                .execute_stream(&flow_id, &parameters, timeout, Some(&run_id));
            print_flow_events(events).await?;
        }
        FlowsCommand::Runs {
            flow_id,
            page,
            limit,
        } => {
            let runs = client.flows().runs(&flow_id, page, limit).await?;
            for run in &runs.runs {
                println!(
                    "{}  {:<9}  {}  {}",
                    run.id,
                    run_label(run),
                    format_date_label(Some(&run.created_at)),
                    format_duration(run.execution_time_ms),
                );
            }
            println!("page {} ({} runs total)", runs.page, runs.total);
        }
        FlowsCommand::RunDetails { run_id } => {
            let run = client.flows().run(&run_id).await?;
            print_run(&run);
        }
        FlowsCommand::Delete { flow_id, all } => {
            let response = match (flow_id, all) {
                (_, true) => client.flows().clear().await?,
                (Some(flow_id), false) => client.flows().delete(&flow_id).await?,
                (None, false) => bail!("pass a flow id or --all"),
            };
            if !response.success {
                bail!("delete failed: {}", response.message);
            }
            println!("{}", response.message);
        }
        FlowsCommand::Code { flow_id } => {
            let code = client.flows().code(&flow_id).await?;
            println!("{}", code.source_code);
        }
        FlowsCommand::Explain {
            flow_id,
            regenerate,
        } => {
            let explanation = if regenerate {
                client.flows().regenerate_explanation(&flow_id).await?
            } else {
                client.flows().explanation(&flow_id).await?
            };
            println!("{}", explanation.explanation);
        }
        FlowsCommand::Compile { path, name } => {
            let code = tokio::fs::read_to_string(&path)
                .await
                .with_context(|| format!("reading {}", path.display()))?;
            let response = client.flows().compile(&code, name.as_deref()).await?;
            for error in &response.errors {
                eprintln!("error: {error}");
            }
            if !response.success {
                bail!("compilation failed");
            }
            println!("compiled {} flow(s)", response.compiled_count);
            for flow in &response.flows {
                println!("  {}  {}", flow.id, flow.name);
            }
        }
    }
    Ok(())
}

async fn print_flow_events(mut events: FlowEventStream) -> Result<()> {
    while let Some(event) = events.next().await {
        match event {
            StreamEvent::Stream(progress) => {
                let mark = match progress.status {
                    ProgressStatus::Success => "ok",
                    ProgressStatus::Failed => "!!",
                };
                println!("[{mark}] {}", progress.message);
            }
            StreamEvent::Complete(done) => {
                let took = format_duration(done.execution_time.map(|s| s * 1000.0));
                if let Some(data) = &done.data {
                    println!("{}", serde_json::to_string_pretty(data)?);
                }
                match done.outcome() {
                    Outcome::Succeeded => println!("Flow completed in {took}"),
                    Outcome::Failed => bail!(
                        "flow failed: {}",
                        done.error.as_deref().unwrap_or("result reported failure")
                    ),
                }
            }
        }
    }
    Ok(())
}

async fn run_and_poll(
    client: &Client,
    config: &AppConfig,
    flow_id: &str,
    parameters: &serde_json::Map<String, Value>,
    timeout: u64,
) -> Result<()> {
    let response = client.flows().execute(flow_id, parameters, timeout).await?;
    if let Some(message) = response.failure_message() {
        warn!(flow_id, error = %message, "Synchronous execution reported failure");
    }
    let latest = client.flows().executions(flow_id, 1, 1).await?;
    let Some(execution) = latest.executions.into_iter().next() else {
        bail!("no execution recorded for flow {flow_id}");
    };
    watch_execution(client, config, execution.id).await
}

fn run_label(run: &FlowRun) -> &'static str {
    match run.outcome() {
        RunOutcome::Running => "running",
        RunOutcome::Succeeded => "completed",
        RunOutcome::Failed => "failed",
    }
}

fn print_run(run: &FlowRun) {
    println!("Run {} of flow {}", run.id, run.flow_id);
    println!(
        "  {}  started {}  took {}",
        run_label(run),
        format_date_label(Some(&run.created_at)),
        format_duration(run.execution_time_ms)
    );
    if let Some(summary) = run.summary() {
        println!("  {summary}");
    }
    if let Some(error) = &run.error {
        println!("  error: {error}");
    }
    for event in run.ordered_events() {
        let mark = match event.payload.status {
            ProgressStatus::Success => "ok",
            ProgressStatus::Failed => "!!",
        };
        println!("  [{mark}] {}", event.payload.message);
    }
}

// =============================================================================
// Executions
// =============================================================================

async fn executions(cmd: ExecutionsCommand, client: &Client, config: &AppConfig) -> Result<()> {
    match cmd {
        ExecutionsCommand::Watch { execution_id } => {
            watch_execution(client, config, execution_id).await?;
        }
        ExecutionsCommand::Cancel { execution_id } => {
            client.executions().cancel(&execution_id).await?;
            println!("Cancellation requested for {execution_id}");
        }
        ExecutionsCommand::Delete { execution_id } => {
            client.executions().delete(&execution_id).await?;
            println!("Deleted execution {execution_id}");
        }
        ExecutionsCommand::List {
            flow,
            status,
            page,
            limit,
        } => {
            let list = match flow {
                Some(flow_id) => client.flows().executions(&flow_id, page, limit).await?,
                None => client.executions().list(page, limit, status).await?,
            };
            for execution in list
                .executions
                .iter()
                .filter(|e| status.is_none_or(|s| e.status == s))
            {
                println!(
                    "{}  {}  {:<9}  {}  {}",
                    execution.id,
                    execution.flow_id,
                    execution.status,
                    format_date_label(execution.created_at.as_deref()),
                    format_duration(execution.execution_time_ms),
                );
            }
            println!("page {} ({} executions total)", list.page, list.total);
        }
    }
    Ok(())
}

async fn watch_execution(client: &Client, config: &AppConfig, execution_id: String) -> Result<()> {
    let mut poller = ExecutionPoller::new(client.clone(), PollerConfig::from(&config.polling));
    let mut events = poller.events();
    poller.set_target(Some(execution_id));

    loop {
        let event = tokio::select! {
            event = events.recv() => event,
            _ = tokio::signal::ctrl_c() => {
                poller.stop();
                println!("Stopped watching");
                return Ok(());
            }
        };
        match event {
            Ok(PollEvent::StatusChanged(status)) => println!("{}", status.message()),
            Ok(PollEvent::Completed(execution)) => return report_execution(&execution),
            Ok(PollEvent::Failed(message)) => bail!(message),
            Err(RecvError::Lagged(skipped)) => warn!(skipped, "Missed poll events"),
            Err(RecvError::Closed) => bail!("poller stopped unexpectedly"),
        }
    }
}

fn report_execution(execution: &Execution) -> Result<()> {
    println!(
        "Execution {} {} in {}",
        execution.id,
        execution.status,
        format_duration(execution.execution_time_ms)
    );
    if let Some(result) = &execution.result {
        println!("{}", serde_json::to_string_pretty(result)?);
    }
    match execution.outcome() {
        Some(Outcome::Failed) => bail!(
            "execution failed: {}",
            execution.error.as_deref().unwrap_or(execution.status.message())
        ),
        _ => Ok(()),
    }
}

// =============================================================================
// Threads
// =============================================================================

async fn threads(cmd: ThreadsCommand, client: &Client, config: &AppConfig) -> Result<()> {
    match cmd {
        ThreadsCommand::List { assistant_id } => {
            let mut threads = ThreadReconciler::new(assistant_id);
            threads.refresh(client).await;
            if let Some(error) = threads.last_error() {
                bail!("failed to load threads: {error}");
            }
            for thread in threads.threads() {
                let updated = thread.updated_at.to_rfc3339();
                println!(
                    "{}  {}  {}",
                    thread.thread_id,
                    format_date_label(Some(&updated)),
                    thread.preview
                );
            }
        }
        ThreadsCommand::Create { assistant_id } => {
            let thread = client.threads().create(&assistant_id).await?;
            println!("{}", thread.thread_id);
        }
        ThreadsCommand::State { thread_id } => {
            let state = client.threads().state(&thread_id).await?;
            for message in &state.values.messages {
                let who = message
                    .kind
                    .as_deref()
                    .or(message.role.as_deref())
                    .unwrap_or("message");
                println!("{who}: {}", message.content.text());
            }
            if state.is_interrupted() {
                println!("(waiting on: {})", state.next.join(", "));
            }
        }
        ThreadsCommand::Send {
            thread_id,
            assistant_id,
            message,
            run_flows,
        } => {
            let input = RunInput::message(message);
            stream_agent_reply(client, config, &thread_id, &assistant_id, &input, run_flows).await?;
        }
        ThreadsCommand::Resume {
            thread_id,
            assistant_id,
            answers,
            run_flows,
        } => {
            let input = RunInput::resume(format_answers(&answers));
            stream_agent_reply(client, config, &thread_id, &assistant_id, &input, run_flows).await?;
        }
    }
    Ok(())
}

async fn stream_agent_reply(
    client: &Client,
    config: &AppConfig,
    thread_id: &str,
    assistant_id: &str,
    input: &RunInput,
    run_flows: bool,
) -> Result<()> {
    let mut parts = client.threads().stream_run(thread_id, assistant_id, input).await?;
    let mut artifacts = Vec::new();
    let mut stdout = std::io::stdout();
    while let Some(part) = parts.next().await {
        let part = part?;
        if part.is_error() {
            bail!("agent run failed: {}", part.data);
        }
        if let Some(text) = part.message_text().filter(|_| part.event == "messages") {
            write!(stdout, "{text}")?;
            stdout.flush()?;
        }
        collect_artifacts(&part.data, &mut artifacts);
    }
    writeln!(stdout)?;

    for artifact in artifacts {
        if !run_flows {
            println!("Agent requested flow {} (run {})", artifact.flow_name, artifact.run_id);
            continue;
        }
        println!("Running {} for the agent", to_normal_case(&artifact.flow_name));
        let events = client
            .flows()
            .execute_artifact(&artifact, config.streaming.timeout_secs);
        print_flow_events(events).await?;
    }
    Ok(())
}

/// Find flow execution requests anywhere in a run update, once per run id.
fn collect_artifacts(value: &Value, found: &mut Vec<FlowExecutionArtifact>) {
    if let Some(artifact) = FlowExecutionArtifact::from_value(value) {
        if !found.iter().any(|a| a.run_id == artifact.run_id) {
            found.push(artifact);
        }
        return;
    }
    match value {
        Value::Array(items) => items.iter().for_each(|v| collect_artifacts(v, found)),
        Value::Object(map) => map.values().for_each(|v| collect_artifacts(v, found)),
        _ => {}
    }
}

// =============================================================================
// Agents
// =============================================================================

async fn agents(cmd: AgentsCommand, client: &Client) -> Result<()> {
    match cmd {
        AgentsCommand::List => {
            for assistant in client.assistants().list().await? {
                print_assistant_line(&assistant);
            }
        }
        AgentsCommand::Get { assistant_id } => {
            let assistant = client.assistants().get(&assistant_id).await?;
            let settings = &assistant.config.configurable;
            print_assistant_line(&assistant);
            println!("  model: {}", settings.model_preset);
            println!("  flows: {}", settings.flow_tool_ids.join(", "));
            println!("  services: {}", settings.gumcp_services.join(", "));
            println!("  instructions:\n{}", settings.instructions);
        }
        AgentsCommand::Create {
            name,
            model,
            instructions,
            flows,
            services,
        } => {
            let params = AssistantParams {
                name,
                model_preset: model,
                instructions,
                flow_tool_ids: flows,
                gumcp_services: services,
            };
            let assistant = client.assistants().create_from_params(params).await?;
            print_assistant_line(&assistant);
        }
        AgentsCommand::Update {
            assistant_id,
            name,
            model,
            instructions,
            flows,
            services,
        } => {
            let patch = AssistantPatch {
                name,
                model_preset: model,
                instructions,
                flow_tool_ids: flows,
                gumcp_services: services,
            };
            let assistant = client
                .assistants()
                .update_from_params(&assistant_id, patch)
                .await?;
            print_assistant_line(&assistant);
        }
        AgentsCommand::Delete { assistant_id } => {
            client.assistants().delete(&assistant_id).await?;
            println!("Deleted {assistant_id}");
        }
        AgentsCommand::Presets => {
            for preset in client.assistants().presets().await? {
                match &preset.description {
                    Some(description) => println!("{}  {}  {description}", preset.id, preset.label()),
                    None => println!("{}  {}", preset.id, preset.label()),
                }
            }
        }
        AgentsCommand::Services => {
            for service in client.assistants().services().await? {
                println!("{service}");
            }
        }
    }
    Ok(())
}

fn print_assistant_line(assistant: &Assistant) {
    let version = assistant
        .version
        .map(|v| format!("v{v}"))
        .unwrap_or_default();
    println!(
        "{}  {}  {}  {version}",
        assistant.assistant_id, assistant.name, assistant.config.configurable.model_preset
    );
}
