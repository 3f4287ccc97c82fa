use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::info;

use sylva_cluster::{AgglomerativeClustering, Linkage, UnsupervisedTreeConfig};
use sylva_io::FeatureReader;
use sylva_tree::{
    Dataset, DecisionTree, DecisionTreeConfig, MaxFeatures, PatchConfig, SampleCount,
    SplitCriterion, SplitterKind, TreeKind,
};

#[derive(Parser)]
#[command(name = "sylva")]
#[command(about = "Decision trees with axis-aligned, oblique and patch splits")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// RNG seed for reproducibility
    #[arg(long, default_value_t = 42, global = true)]
    seed: u64,

    /// Enable verbose (debug-level) logging
    #[arg(long, global = true)]
    verbose: bool,

    /// Suppress all output except errors
    #[arg(long, global = true)]
    quiet: bool,

    /// Number of threads for parallel computation (defaults to all cores)
    #[arg(long, global = true)]
    threads: Option<usize>,
}

/// Shared tree growth parameters.
#[derive(Args, Debug, Clone)]
struct TreeArgs {
    /// Split family: "axis", "oblique", or "patch"
    #[arg(long, default_value = "axis")]
    splitter: String,

    /// Average non-zeros per oblique projection (default min(n_features, 1.5))
    #[arg(long)]
    feature_combinations: Option<f64>,

    /// Patch grid height
    #[arg(long, default_value_t = 1)]
    data_height: usize,

    /// Patch grid width (defaults to n_features, a single-row grid)
    #[arg(long)]
    data_width: Option<usize>,

    /// Smallest patch height
    #[arg(long, default_value_t = 1)]
    min_patch_height: usize,

    /// Largest patch height
    #[arg(long, default_value_t = 1)]
    max_patch_height: usize,

    /// Smallest patch width
    #[arg(long, default_value_t = 1)]
    min_patch_width: usize,

    /// Largest patch width
    #[arg(long, default_value_t = 1)]
    max_patch_width: usize,

    /// Maximum tree depth (unlimited if not set)
    #[arg(long)]
    max_depth: Option<usize>,

    /// Minimum samples required to split a node
    #[arg(long, default_value_t = 2)]
    min_samples_split: usize,

    /// Minimum samples required in each leaf
    #[arg(long, default_value_t = 1)]
    min_samples_leaf: usize,

    /// Minimum fraction of total sample weight in each leaf
    #[arg(long, default_value_t = 0.0)]
    min_weight_fraction_leaf: f64,

    /// Candidates per node: "all", "sqrt", "log2", an integer, or a fraction in (0, 1]
    #[arg(long, default_value = "all")]
    max_features: String,

    /// Leaf budget; switches to best-first growth
    #[arg(long)]
    max_leaf_nodes: Option<usize>,

    /// Minimum weighted impurity decrease required to split
    #[arg(long, default_value_t = 0.0)]
    min_impurity_decrease: f64,
}

#[derive(Subcommand)]
enum Command {
    /// Fit a supervised tree on a CSV file and report its structure and training score
    Fit {
        /// Path to the input CSV file
        #[arg(long)]
        data: PathBuf,

        /// Name of the target column
        #[arg(long)]
        target: String,

        /// Split criterion: gini, entropy, squared_error, friedman_mse, absolute_error, poisson
        #[arg(long, default_value = "gini")]
        criterion: String,

        #[command(flatten)]
        tree: TreeArgs,
    },

    /// Fit an unsupervised tree and cluster the samples by leaf affinity
    Cluster {
        /// Path to the input CSV file (every column is a feature)
        #[arg(long)]
        data: PathBuf,

        /// Split criterion: twomeans or fastbic
        #[arg(long, default_value = "twomeans")]
        criterion: String,

        /// Number of clusters
        #[arg(long, default_value_t = 2)]
        n_clusters: usize,

        /// Linkage: "ward", "average", "complete", or "single"
        #[arg(long, default_value = "ward")]
        linkage: String,

        #[command(flatten)]
        tree: TreeArgs,
    },
}

// --- JSON stdout output structs ---

#[derive(Serialize)]
struct FitOutput {
    criterion: &'static str,
    n_samples: usize,
    n_features: usize,
    n_nodes: usize,
    n_leaves: usize,
    depth: usize,
    classes: Option<Vec<String>>,
    training_accuracy: Option<f64>,
    training_mse: Option<f64>,
}

#[derive(Serialize)]
struct ClusterOutput {
    criterion: &'static str,
    n_samples: usize,
    n_leaves: usize,
    depth: usize,
    labels: Option<Vec<usize>>,
    cluster_sizes: Vec<usize>,
}

fn parse_criterion(s: &str) -> Result<SplitCriterion> {
    s.parse::<SplitCriterion>().map_err(anyhow::Error::msg)
}

fn parse_max_features(s: &str) -> Result<MaxFeatures> {
    match s {
        "all" => Ok(MaxFeatures::All),
        "sqrt" => Ok(MaxFeatures::Sqrt),
        "log2" => Ok(MaxFeatures::Log2),
        other => {
            if let Ok(k) = other.parse::<usize>() {
                Ok(MaxFeatures::Fixed(k))
            } else if let Ok(f) = other.parse::<f64>() {
                Ok(MaxFeatures::Fraction(f))
            } else {
                anyhow::bail!(
                    "unknown max_features: {other} (expected all, sqrt, log2, an integer, or a fraction)"
                )
            }
        }
    }
}

fn parse_linkage(s: &str) -> Result<Linkage> {
    match s {
        "ward" => Ok(Linkage::Ward),
        "average" => Ok(Linkage::Average),
        "complete" => Ok(Linkage::Complete),
        "single" => Ok(Linkage::Single),
        other => anyhow::bail!("unknown linkage: {other} (expected ward, average, complete, or single)"),
    }
}

fn build_splitter(args: &TreeArgs) -> Result<SplitterKind> {
    match args.splitter.as_str() {
        "axis" => Ok(SplitterKind::Axis),
        "oblique" => Ok(SplitterKind::Oblique {
            feature_combinations: args.feature_combinations,
        }),
        "patch" => {
            let mut patch = PatchConfig::new()
                .with_patch_height(args.min_patch_height, args.max_patch_height)
                .with_patch_width(args.min_patch_width, args.max_patch_width);
            match args.data_width {
                Some(width) => patch = patch.with_data_shape(args.data_height, width),
                None if args.data_height != 1 => {
                    anyhow::bail!("--data-height requires --data-width")
                }
                None => {}
            }
            Ok(SplitterKind::Patch(patch))
        }
        other => anyhow::bail!("unknown splitter: {other} (expected axis, oblique, or patch)"),
    }
}

fn build_tree_config(args: &TreeArgs, criterion: SplitCriterion, seed: u64) -> Result<DecisionTreeConfig> {
    Ok(DecisionTreeConfig::new()
        .with_criterion(criterion)
        .with_splitter(build_splitter(args)?)
        .with_max_depth(args.max_depth)
        .with_min_samples_split(SampleCount::Count(args.min_samples_split))
        .with_min_samples_leaf(SampleCount::Count(args.min_samples_leaf))
        .with_min_weight_fraction_leaf(args.min_weight_fraction_leaf)
        .with_max_features(parse_max_features(&args.max_features)?)
        .with_max_leaf_nodes(args.max_leaf_nodes)
        .with_min_impurity_decrease(args.min_impurity_decrease)
        .with_seed(seed))
}

/// Fraction of rows whose predicted class matches the label.
fn accuracy(tree: &DecisionTree, rows: &[Vec<f64>], labels: &[usize]) -> Result<f64> {
    let predictions = tree.predict_batch(rows).context("prediction failed")?;
    let correct = predictions
        .iter()
        .zip(labels)
        .filter(|(p, l)| p[0] == **l as f64)
        .count();
    Ok(correct as f64 / labels.len() as f64)
}

fn mean_squared_error(tree: &DecisionTree, rows: &[Vec<f64>], target: &[f64]) -> Result<f64> {
    let predictions = tree.predict_batch(rows).context("prediction failed")?;
    let sum: f64 = predictions
        .iter()
        .zip(target)
        .map(|(p, y)| (p[0] - y).powi(2))
        .sum();
    Ok(sum / target.len() as f64)
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match (cli.verbose, cli.quiet) {
        (true, _) => "debug",
        (_, true) => "error",
        _ => "info",
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Some(threads) = cli.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("failed to configure thread pool")?;
        info!(threads, "thread pool configured");
    }

    match cli.command {
        Command::Fit {
            data,
            target,
            criterion,
            tree,
        } => {
            let criterion = parse_criterion(&criterion)?;
            let table = FeatureReader::new(&data)
                .with_target_column(Some(target.clone()))
                .read()
                .with_context(|| format!("failed to read {}", data.display()))?;
            let column = table
                .target
                .as_ref()
                .with_context(|| format!("target column {target} missing"))?;

            let config = build_tree_config(&tree, criterion, cli.seed)?;
            let (fitted, classes, training_accuracy, training_mse) = match criterion {
                SplitCriterion::Gini | SplitCriterion::Entropy => {
                    let (labels, classes) = column.to_classes();
                    let dataset = Dataset::classification(&table.rows, &labels)
                        .context("invalid classification dataset")?;
                    let fitted = config.fit(&dataset).context("tree fitting failed")?;
                    let acc = accuracy(&fitted, &table.rows, &labels)?;
                    (fitted, Some(classes), Some(acc), None)
                }
                SplitCriterion::TwoMeans | SplitCriterion::FastBic => {
                    anyhow::bail!(
                        "criterion {} is unsupervised; use the cluster subcommand",
                        criterion.name()
                    )
                }
                _ => {
                    let values = column.to_continuous().context("invalid regression target")?;
                    let dataset = Dataset::regression(&table.rows, &values)
                        .context("invalid regression dataset")?;
                    let fitted = config.fit(&dataset).context("tree fitting failed")?;
                    let mse = mean_squared_error(&fitted, &table.rows, &values)?;
                    (fitted, None, None, Some(mse))
                }
            };

            info!(
                n_nodes = fitted.n_nodes(),
                n_leaves = fitted.n_leaves(),
                regression = matches!(fitted.kind(), TreeKind::Regression { .. }),
                "tree fitted"
            );

            let output = FitOutput {
                criterion: criterion.name(),
                n_samples: table.n_samples(),
                n_features: table.n_features(),
                n_nodes: fitted.n_nodes(),
                n_leaves: fitted.n_leaves(),
                depth: fitted.depth(),
                classes,
                training_accuracy,
                training_mse,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }

        Command::Cluster {
            data,
            criterion,
            n_clusters,
            linkage,
            tree,
        } => {
            let criterion = parse_criterion(&criterion)?;
            let table = FeatureReader::new(&data)
                .read()
                .with_context(|| format!("failed to read {}", data.display()))?;
            let dataset = Dataset::unsupervised(&table.rows).context("invalid dataset")?;

            let clustering = AgglomerativeClustering::new()
                .with_n_clusters(n_clusters)
                .with_linkage(parse_linkage(&linkage)?);
            let fitted = UnsupervisedTreeConfig::new()
                .with_tree_config(build_tree_config(&tree, criterion, cli.seed)?)
                .with_clustering(clustering)
                .fit(&dataset)
                .context("unsupervised fitting failed")?;

            let labels: Option<Vec<usize>> = fitted
                .labels()
                .map(|labels| labels.iter().map(|l| l.index()).collect());
            let mut cluster_sizes = vec![0usize; n_clusters];
            for &label in labels.iter().flatten() {
                if let Some(size) = cluster_sizes.get_mut(label) {
                    *size += 1;
                }
            }

            let output = ClusterOutput {
                criterion: criterion.name(),
                n_samples: table.n_samples(),
                n_leaves: fitted.tree().n_leaves(),
                depth: fitted.tree().depth(),
                labels,
                cluster_sizes,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}
