use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use llvm_ir::Module;
use semdiff_core::collaborators::{basic, noop};
use semdiff_core::{ComparatorConfig, ModuleComparator, PatternSet, Verdict};

#[derive(Copy, Clone, Debug, ValueEnum)]
enum OnOff {
    On,
    Off,
}

impl OnOff {
    fn as_bool(self) -> bool {
        matches!(self, OnOff::On)
    }
}

/// Semantic-equivalence comparator for pairs of compiled LLVM IR modules.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Left-hand (old) compiled module.
    left_file: PathBuf,
    /// Right-hand (new) compiled module.
    right_file: PathBuf,

    /// Function to compare. If omitted, every function present under the
    /// same name in both modules is compared.
    #[arg(short, long)]
    name: Option<String>,
    /// Name of the function in the right-hand module, when it differs from
    /// `--name` (e.g. mangled names that changed across versions).
    #[arg(long, requires = "name")]
    right_name: Option<String>,

    /// Comparator-flags configuration file (`[flags]` table, §10.4).
    #[arg(long)]
    config: Option<PathBuf>,
    /// Pattern-catalogue configuration file (§6).
    #[arg(long)]
    patterns: Option<PathBuf>,

    #[arg(long, value_enum)]
    struct_alignment: Option<OnOff>,
    #[arg(long, value_enum)]
    function_splits: Option<OnOff>,
    #[arg(long, value_enum)]
    unused_return_types: Option<OnOff>,
    #[arg(long, value_enum)]
    kernel_prints: Option<OnOff>,
    #[arg(long, value_enum)]
    dead_code: Option<OnOff>,
    #[arg(long, value_enum)]
    numerical_macros: Option<OnOff>,
    #[arg(long, value_enum)]
    type_casts: Option<OnOff>,
    #[arg(long, value_enum)]
    control_flow_only: Option<OnOff>,
}

#[derive(Debug, serde::Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    flags: ComparatorConfig,
}

fn load_comparator_config(args: &Args) -> Result<ComparatorConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading comparator config {}", path.display()))?;
            let file: ConfigFile = toml::from_str(&text)
                .with_context(|| format!("parsing comparator config {}", path.display()))?;
            file.flags
        }
        None => ComparatorConfig::default(),
    };

    macro_rules! apply {
        ($field:ident) => {
            if let Some(v) = args.$field {
                config.$field = v.as_bool();
            }
        };
    }
    apply!(struct_alignment);
    apply!(function_splits);
    apply!(unused_return_types);
    apply!(kernel_prints);
    apply!(dead_code);
    apply!(numerical_macros);
    apply!(type_casts);
    apply!(control_flow_only);

    Ok(config)
}

fn parse_module(path: &Path) -> semdiff_core::Result<Module> {
    Module::from_bc_path(path).map_err(semdiff_core::CompareError::MalformedModule)
}

fn load_module(path: &Path) -> Result<Module> {
    Module::from_bc_path(path).map_err(|reason| anyhow::anyhow!("failed to parse {}: {reason}", path.display()))
}

fn seed_pairs(args: &Args, left: &Module, right: &Module) -> Vec<(String, String)> {
    match (&args.name, &args.right_name) {
        (Some(left_name), Some(right_name)) => vec![(left_name.clone(), right_name.clone())],
        (Some(name), None) => vec![(name.clone(), name.clone())],
        (None, _) => {
            let right_names: BTreeSet<&str> = right.functions.iter().map(|f| f.name.as_str()).collect();
            left.functions
                .iter()
                .map(|f| f.name.as_str())
                .filter(|n| right_names.contains(n))
                .map(|n| (n.to_string(), n.to_string()))
                .collect()
        }
    }
}

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        eprintln!("error: {err:?}");
        std::process::exit(2);
    }
}

fn run() -> Result<()> {
    let args = Args::parse();

    let left_module = load_module(&args.left_file)?;
    let right_module = load_module(&args.right_file)?;

    let config = load_comparator_config(&args)?;

    let patterns = match &args.patterns {
        Some(path) => PatternSet::load(path, parse_module)
            .with_context(|| format!("loading pattern catalogue {}", path.display()))?,
        None => PatternSet::empty(),
    };

    let seeds = seed_pairs(&args, &left_module, &right_module);
    if seeds.is_empty() {
        eprintln!("no function of the same name was found in both modules");
        std::process::exit(3);
    }

    let debug_info = basic::StaticDebugInfo::default();
    let aggregate_index = noop::NoAggregateIndex;
    let mut simplifier = basic::DeadCodeSimplifier::default();
    let mut inliner = basic::SingleBlockInliner::default();

    let mut left_module = left_module;
    let mut right_module = right_module;

    let mut comparator =
        ModuleComparator::new(&config, &patterns, &debug_info, &aggregate_index, &mut simplifier, &mut inliner);

    let outcomes = comparator
        .compare_all(&mut left_module, &mut right_module, &seeds)
        .context("comparing function pairs")?;

    let mut any_diff = false;
    for outcome in &outcomes {
        let verdict_text = match outcome.verdict {
            Verdict::Equal => "equal",
            Verdict::AssumedEqual => "assumed equal (missing definition)",
            Verdict::NotEqual => {
                any_diff = true;
                "DIFFERENT"
            }
        };
        log::info!("{} <-> {}: {}", outcome.left_info.name, outcome.right_info.name, verdict_text);
        println!("{} <-> {}: {}", outcome.left_info.name, outcome.right_info.name, verdict_text);

        for missing in &outcome.missing_defs {
            log::warn!("missing definition: {:?}", missing);
            println!("  missing definition: left={:?} right={:?}", missing.left, missing.right);
        }
        for diff in &outcome.differences {
            println!("  {:?}", diff);
        }
    }

    std::process::exit(if any_diff { 1 } else { 0 });
}
