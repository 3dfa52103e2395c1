use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand, ValueEnum};
use miette::IntoDiagnostic;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing_subscriber::EnvFilter;

use vg_records::api::VgHttpClient;
use vg_records::cache::{CacheBuilder, CacheLayout};
use vg_records::catalog;
use vg_records::compare::{self, CompareOptions};
use vg_records::config::{ConfigLoader, ResolvedConfig};
use vg_records::domain::ImageId;
use vg_records::error::VgError;
use vg_records::local::LocalSource;
use vg_records::output::{JsonOutput, ProfileResult};
use vg_records::remote::RemoteSource;
use vg_records::source::{RecordSource, RecordSourceExt};

#[derive(Parser)]
#[command(name = "vg-records")]
#[command(about = "Iterate Visual Genome records remotely or from a local metadata cache")]
#[command(version)]
struct Cli {
    #[arg(long, global = true)]
    config: Option<String>,

    #[arg(long, global = true)]
    data_dir: Option<Utf8PathBuf>,

    #[arg(long, global = true)]
    api_base: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Download and index the metadata bundle if missing")]
    Cache,
    #[command(about = "Show which parts of the local bundle exist")]
    Status,
    #[command(about = "Print every known image id")]
    Ids(IdsArgs),
    #[command(about = "Print records as JSON lines")]
    Records(RecordsArgs),
    #[command(about = "Check that remote and local records agree")]
    Compare(SelectionArgs),
    #[command(about = "Time a full pass over each source")]
    Profile(SelectionArgs),
}

#[derive(Args)]
struct IdsArgs {
    /// Read the persisted list instead of asking the API.
    #[arg(long)]
    local: bool,
}

#[derive(Args, Clone)]
struct SelectionArgs {
    /// Explicit image ids; falls back to the config file, then to all ids.
    #[arg(long, value_delimiter = ',')]
    ids: Vec<ImageId>,

    /// Pick this many random ids instead.
    #[arg(long, conflicts_with = "ids")]
    sample: Option<usize>,

    #[arg(long, requires = "sample")]
    seed: Option<u64>,

    #[arg(long)]
    scene_graphs: bool,

    /// Compare header fields only.
    #[arg(long)]
    headers_only: bool,
}

#[derive(Args)]
struct RecordsArgs {
    #[arg(long, value_enum, default_value_t = SourceKind::Local)]
    source: SourceKind,

    #[arg(long)]
    limit: Option<usize>,

    #[command(flatten)]
    selection: SelectionArgs,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SourceKind {
    Remote,
    Local,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<VgError>() {
            return ExitCode::from(map_exit_code(err));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &VgError) -> u8 {
    match error {
        VgError::MissingRecord(_) | VgError::Mismatch { .. } => 2,
        VgError::SourceUnavailable(_)
        | VgError::ApiStatus { .. }
        | VgError::RecordFetch { .. }
        | VgError::CacheBuild { .. } => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = ConfigLoader::resolve(cli.config.as_deref())?;
    if let Some(data_dir) = cli.data_dir {
        config.data_dir = data_dir;
    }
    if let Some(api_base) = cli.api_base {
        config.api_base = api_base;
    }
    let api = VgHttpClient::new(&config)?;

    match cli.command {
        Commands::Cache => {
            let report = CacheBuilder::new(config.data_dir.clone(), &api).ensure()?;
            JsonOutput::print_cache_report(&report).into_diagnostic()
        }
        Commands::Status => {
            let status = CacheBuilder::new(config.data_dir.clone(), &api).status();
            JsonOutput::print_status(&status).into_diagnostic()
        }
        Commands::Ids(args) => {
            let ids = if args.local {
                let layout = CacheLayout::new(config.data_dir.clone());
                catalog::load_image_ids(&layout.image_ids_path())?
            } else {
                catalog::all_image_ids(&api)?
            };
            JsonOutput::print_ids(&ids).into_diagnostic()
        }
        Commands::Records(args) => run_records(args, &config, &api),
        Commands::Compare(args) => {
            let (remote, local) = build_pair(&args, &config, &api)?;
            let options = CompareOptions {
                check_regions: !args.headers_only,
            };
            let report = compare::compare(&remote, &local, options)?;
            JsonOutput::print_comparison(&report).into_diagnostic()
        }
        Commands::Profile(args) => {
            let (remote, local) = build_pair(&args, &config, &api)?;
            let result = ProfileResult {
                remote: compare::profile(&remote)?,
                local: compare::profile(&local)?,
            };
            JsonOutput::print_profile(&result).into_diagnostic()
        }
    }
}

fn run_records(
    args: RecordsArgs,
    config: &ResolvedConfig,
    api: &VgHttpClient,
) -> miette::Result<()> {
    let ids = select_ids(&args.selection, config, api)?;
    let scene_graphs = args.selection.scene_graphs || config.include_scene_graphs;
    let source: Box<dyn RecordSource + '_> = match args.source {
        SourceKind::Remote => Box::new(RemoteSource::new(api, ids)?.with_scene_graphs(scene_graphs)),
        SourceKind::Local => Box::new(
            LocalSource::new(api, ids, config.data_dir.clone())?.with_scene_graphs(scene_graphs),
        ),
    };

    let limit = args.limit.unwrap_or(usize::MAX);
    for record in source.records().take(limit) {
        JsonOutput::print_record(&record?).into_diagnostic()?;
    }
    Ok(())
}

type SourcePair<'a> = (
    RemoteSource<&'a VgHttpClient>,
    LocalSource<&'a VgHttpClient>,
);

/// Both sources over the same id list. The local side is built first so an
/// unspecified selection resolves from the persisted catalog.
fn build_pair<'a>(
    args: &SelectionArgs,
    config: &ResolvedConfig,
    api: &'a VgHttpClient,
) -> miette::Result<SourcePair<'a>> {
    let scene_graphs = args.scene_graphs || config.include_scene_graphs;
    let ids = select_ids(args, config, api)?;
    let local = LocalSource::new(api, ids, config.data_dir.clone())?.with_scene_graphs(scene_graphs);
    let remote =
        RemoteSource::new(api, Some(local.ids().to_vec()))?.with_scene_graphs(scene_graphs);
    Ok((remote, local))
}

fn select_ids(
    args: &SelectionArgs,
    config: &ResolvedConfig,
    api: &VgHttpClient,
) -> miette::Result<Option<Vec<ImageId>>> {
    if let Some(n) = args.sample {
        let mut rng = match args.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let all = catalog::all_image_ids(api)?;
        return Ok(Some(catalog::sample_ids(&all, n, &mut rng)));
    }
    if !args.ids.is_empty() {
        return Ok(Some(args.ids.clone()));
    }
    Ok(config.ids.clone())
}
