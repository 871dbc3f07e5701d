use clap::{Args, Parser, Subcommand};
use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;

use safeguard_tracker::config::TrackerConfig;
use safeguard_tracker::error::ApiError;
use safeguard_tracker::flows::authenticity::AuthenticityFlow;
use safeguard_tracker::flows::claim_research::ClaimResearchFlow;
use safeguard_tracker::flows::geolocation::GeolocationFlow;
use safeguard_tracker::flows::report::ReportFlow;
use safeguard_tracker::flows::reverse_lookup::ReverseLookupFlow;
use safeguard_tracker::flows::trace::TraceFlow;
use safeguard_tracker::flows::{JobFlow, JobKey};
use safeguard_tracker::models::authenticity::AuthenticityRequest;
use safeguard_tracker::models::claim_research::ClaimResearchRequest;
use safeguard_tracker::models::geolocation::GeolocationRequest;
use safeguard_tracker::models::job::{JobKind, JobStatus};
use safeguard_tracker::models::report::{ReportFormat, ReportRequest};
use safeguard_tracker::models::reverse_lookup::ReverseLookupRequest;
use safeguard_tracker::models::trace::TraceRequest;
use safeguard_tracker::services::api::ApiClient;
use safeguard_tracker::telemetry;
use safeguard_tracker::tracking::{
    submit, submit_and_track, ConnectivityMonitor, JobTracker, JobView, Notice, ResultSummary, Severity,
    TrackerEvent, TrackerOptions,
};

/// Completed, partial or no results
const EXIT_OK: u8 = 0;
/// Failed or not found
const EXIT_JOB_FAILED: u8 = 1;
/// Configuration or validation error
const EXIT_USAGE: u8 = 2;
/// Polling halted on a fetch error before the job finished
const EXIT_TRACKING_ERROR: u8 = 3;

#[derive(Parser)]
#[command(name = "sgm", version, about = "Submit and track SafeguardMedia verification jobs")]
struct Cli {
    /// Backend base URL; overrides SGM_API_BASE_URL
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Poll only, even for pipelines with a live step stream
    #[arg(long, global = true)]
    no_stream: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Submit a new job and follow it to a terminal state
    Submit {
        /// Print the resumable results path and exit after submission
        #[arg(long, global = true)]
        no_follow: bool,

        #[command(subcommand)]
        job: JobArgs,
    },
    /// Resume tracking a job from its results query string
    Track {
        /// Pipeline: geolocation, reverse-lookup, social-trace, authenticity, claim-research, report
        kind: JobKind,

        /// Query string from the results path, e.g. "verificationId=v1&mediaId=m1"
        #[arg(long)]
        query: String,
    },
}

#[derive(Subcommand)]
enum JobArgs {
    /// Verify that media was captured where it claims to be
    Geolocation {
        #[arg(long)]
        media_id: String,
        #[arg(long)]
        location: String,
    },
    /// Find earlier appearances of a media item
    ReverseLookup {
        #[arg(long)]
        media_id: String,
        #[arg(long = "engine")]
        engines: Vec<String>,
        #[arg(long)]
        max_results: Option<u32>,
    },
    /// Trace how a media item spread across social platforms
    Trace {
        #[arg(long)]
        media_id: String,
        #[arg(long = "platform")]
        platforms: Vec<String>,
        #[arg(long)]
        depth: Option<u8>,
    },
    /// Verify C2PA content credentials
    Authenticity {
        #[arg(long)]
        media_id: String,
        #[arg(long)]
        deep_scan: bool,
    },
    /// Research a factual claim
    Claim(ClaimArgs),
    /// Compile results into a downloadable report
    Report {
        #[arg(long)]
        title: String,
        #[arg(long = "media-id", required = true)]
        media_ids: Vec<String>,
        #[arg(long, default_value = "pdf")]
        format: ReportFormat,
    },
}

#[derive(Args)]
struct ClaimArgs {
    #[arg(long)]
    claim: String,
    #[arg(long)]
    context: Option<String>,
    #[arg(long)]
    media_id: Option<String>,
}

struct Context {
    api: Arc<ApiClient>,
    options: TrackerOptions,
    connectivity: ConnectivityMonitor,
}

#[tokio::main]
async fn main() -> ExitCode {
    telemetry::init_tracing();
    let cli = Cli::parse();

    let mut config = match TrackerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return ExitCode::from(EXIT_USAGE);
        }
    };
    if let Some(api_url) = cli.api_url {
        config.api_base_url = api_url;
        if let Err(e) = config.validate() {
            eprintln!("Configuration error: {}", e);
            return ExitCode::from(EXIT_USAGE);
        }
    }

    if let Some(addr) = &config.metrics_addr {
        match addr.parse::<SocketAddr>() {
            Ok(addr) => match telemetry::install_exporter(addr) {
                Ok(()) => tracing::info!(%addr, "Serving tracker metrics"),
                Err(e) => tracing::warn!(error = %e, "Failed to start metrics exporter"),
            },
            Err(e) => {
                eprintln!("Configuration error: SGM_METRICS_ADDR: {}", e);
                return ExitCode::from(EXIT_USAGE);
            }
        }
    }

    let api = match ApiClient::from_config(&config) {
        Ok(api) => Arc::new(api),
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return ExitCode::from(EXIT_USAGE);
        }
    };

    let mut options = TrackerOptions::from_config(&config);
    options.use_stream = !cli.no_stream;
    let ctx = Context {
        connectivity: ConnectivityMonitor::probe(api.clone(), config.probe_interval()),
        api,
        options,
    };

    tracing::debug!(api = %ctx.api.base_url(), "sgm ready");

    match cli.command {
        Command::Submit { no_follow, job } => submit_job(&ctx, job, !no_follow).await,
        Command::Track { kind, query } => track_job(&ctx, kind, &query).await,
    }
}

async fn submit_job(ctx: &Context, job: JobArgs, follow: bool) -> ExitCode {
    let api = ctx.api.clone();
    match job {
        JobArgs::Geolocation { media_id, location } => {
            let request = GeolocationRequest {
                media_id,
                claimed_location: location,
            };
            run_submit(ctx, Arc::new(GeolocationFlow::new(api)), request, follow).await
        }
        JobArgs::ReverseLookup {
            media_id,
            engines,
            max_results,
        } => {
            let request = ReverseLookupRequest {
                media_id,
                engines,
                max_results,
            };
            run_submit(ctx, Arc::new(ReverseLookupFlow::new(api)), request, follow).await
        }
        JobArgs::Trace {
            media_id,
            platforms,
            depth,
        } => {
            let request = TraceRequest {
                media_id,
                platforms,
                search_depth: depth,
            };
            run_submit(ctx, Arc::new(TraceFlow::new(api)), request, follow).await
        }
        JobArgs::Authenticity { media_id, deep_scan } => {
            let request = AuthenticityRequest { media_id, deep_scan };
            run_submit(ctx, Arc::new(AuthenticityFlow::new(api)), request, follow).await
        }
        JobArgs::Claim(args) => {
            let request = ClaimResearchRequest {
                claim: args.claim,
                context: args.context,
                media_id: args.media_id,
            };
            run_submit(ctx, Arc::new(ClaimResearchFlow::new(api)), request, follow).await
        }
        JobArgs::Report {
            title,
            media_ids,
            format,
        } => {
            let request = ReportRequest {
                title,
                media_ids,
                format,
            };
            run_submit(ctx, Arc::new(ReportFlow::new(api)), request, follow).await
        }
    }
}

async fn track_job(ctx: &Context, kind: JobKind, query: &str) -> ExitCode {
    let api = ctx.api.clone();
    match kind {
        JobKind::Geolocation => run_track(ctx, Arc::new(GeolocationFlow::new(api)), query).await,
        JobKind::ReverseLookup => run_track(ctx, Arc::new(ReverseLookupFlow::new(api)), query).await,
        JobKind::SocialTrace => run_track(ctx, Arc::new(TraceFlow::new(api)), query).await,
        JobKind::Authenticity => run_track(ctx, Arc::new(AuthenticityFlow::new(api)), query).await,
        JobKind::ClaimResearch => run_track(ctx, Arc::new(ClaimResearchFlow::new(api)), query).await,
        JobKind::Report => run_track(ctx, Arc::new(ReportFlow::new(api)), query).await,
    }
}

async fn run_submit<F: JobFlow>(ctx: &Context, flow: Arc<F>, request: F::Request, follow: bool) -> ExitCode {
    if !follow {
        return match submit(flow.as_ref(), &request).await {
            Ok(submission) => {
                println!("Submitted {} ({})", submission.key, submission.status);
                println!("{}", flow.results_path(&submission.key));
                ExitCode::from(EXIT_OK)
            }
            Err(e) => submit_failed(&e),
        };
    }

    match submit_and_track(flow.clone(), &request, ctx.options.clone(), ctx.connectivity.subscribe()).await {
        Ok((submission, tracker)) => {
            println!("Submitted {}", submission.key);
            if let Some(seconds) = submission.estimated_time {
                println!("Estimated time: about {}s", seconds);
            }
            println!("Resume with: {}", flow.results_path(&submission.key));
            follow_job(tracker).await
        }
        Err(e) => submit_failed(&e),
    }
}

async fn run_track<F: JobFlow>(ctx: &Context, flow: Arc<F>, query: &str) -> ExitCode {
    match F::Key::from_query(query) {
        Some(key) => {
            let tracker = JobTracker::start(flow, key, ctx.options.clone(), ctx.connectivity.subscribe());
            follow_job(tracker).await
        }
        None => {
            eprintln!("The query does not identify a {} job: {}", flow.kind().label(), query);
            ExitCode::from(EXIT_USAGE)
        }
    }
}

fn submit_failed(error: &ApiError) -> ExitCode {
    present_notice(&Notice::SubmitFailed {
        message: error.user_message(),
    });
    match error {
        ApiError::Validation(_) | ApiError::InvalidUrl(_) | ApiError::InvalidSegment(_) => {
            ExitCode::from(EXIT_USAGE)
        }
        _ => ExitCode::from(EXIT_JOB_FAILED),
    }
}

async fn follow_job<R>(mut tracker: JobTracker<R>) -> ExitCode
where
    R: ResultSummary + Clone + Send + Sync + 'static,
{
    let kind = tracker.kind();
    let mut last_status: Option<JobStatus> = None;

    while let Some(event) = tracker.next_event().await {
        match event {
            TrackerEvent::View(view) => match &view {
                JobView::NotFound | JobView::Error { .. } => {
                    print_view(kind, &view);
                    return exit_code(&view);
                }
                JobView::InProgress { status, progress } => {
                    // Only print when something visible changed
                    if last_status != Some(*status) || progress.is_some() {
                        println!("{}", view.headline(kind));
                        last_status = Some(*status);
                    }
                }
                _ => println!("{}", view.headline(kind)),
            },
            TrackerEvent::Step(update) => println!("  - {}", update.step),
            TrackerEvent::Notice(notice) => {
                present_notice(&notice);
                if matches!(notice, Notice::Stale { .. }) {
                    tracker.continue_monitoring();
                }
            }
            TrackerEvent::Finished(view) => {
                print_view(kind, &view);
                return exit_code(&view);
            }
        }
    }
    ExitCode::from(EXIT_JOB_FAILED)
}

fn print_view<R: ResultSummary + Clone>(kind: JobKind, view: &JobView<R>) {
    println!();
    println!("{}", view.headline(kind));
    for line in view.lines() {
        println!("  {}", line);
    }
    let actions = view.action_labels(kind);
    if !actions.is_empty() {
        println!("[{}]", actions.join("] ["));
    }
}

fn present_notice(notice: &Notice) {
    match notice.severity() {
        Severity::Error => tracing::error!(notice = ?notice, "Job notice"),
        Severity::Warning => tracing::warn!(notice = ?notice, "Job notice"),
        Severity::Info | Severity::Success => tracing::info!(notice = ?notice, "Job notice"),
    }
    eprintln!("[{}] {}", notice.severity(), notice.message());
}

fn exit_code<R>(view: &JobView<R>) -> ExitCode {
    match view {
        JobView::Results { .. } | JobView::NoResults => ExitCode::from(EXIT_OK),
        JobView::Error { .. } => ExitCode::from(EXIT_TRACKING_ERROR),
        _ => ExitCode::from(EXIT_JOB_FAILED),
    }
}
