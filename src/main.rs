use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use tamarack_io::TrainingReader;
use tamarack_trees::{ExtraTreesConfig, GridSearch, HyperParams, Model, NumAttr};

#[derive(Parser)]
#[command(name = "tamarack")]
#[command(about = "Extremely randomized trees grower for tabular classification")]
#[command(version)]
struct Cli {
    /// Input training data file, in comma-separated-value format
    #[arg(short = 't', long = "train", value_name = "FILE")]
    train: PathBuf,

    /// Output model file (overwritten)
    #[arg(short = 'm', long = "model", value_name = "FILE")]
    model: PathBuf,

    /// Name of the column that contains the labels (default: last column)
    #[arg(short = 'y', long = "label", value_name = "NAME")]
    label: Option<String>,

    /// Comma-separated, no-spaces list of columns to exclude from the features
    #[arg(short = 'e', long = "exclude", value_name = "NAMES", value_delimiter = ',')]
    exclude: Vec<String>,

    /// Enable hyperparameter optimization, re-checking each combination on
    /// this many random splits; a bigger number reduces bad luck but
    /// multiplies run time linearly
    #[arg(
        short = 'l',
        long = "layers",
        value_name = "N",
        num_args = 0..=1,
        default_missing_value = "3",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    layers: Option<u64>,

    /// Minimum number of examples needed to split; a bigger number reduces
    /// sensitivity (pins this axis during optimization)
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u64).range(1..))]
    nmin: Option<u64>,

    /// Number of attributes considered per split; a smaller number increases
    /// randomness, 0 means ceil(sqrt(num_features))
    #[arg(long, value_name = "K")]
    numattr: Option<u64>,

    /// Number of decision trees to plant in the forest
    #[arg(long, value_name = "M", value_parser = clap::value_parser!(u64).range(1..))]
    numtrees: Option<u64>,

    /// RNG seed for reproducible runs (default: drawn from OS entropy)
    #[arg(long, value_name = "SEED")]
    seed: Option<u64>,

    /// Enable verbose (debug-level) logging
    #[arg(long)]
    verbose: bool,

    /// Suppress all output except errors
    #[arg(long)]
    quiet: bool,
}

fn main() -> Result<()> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            // Usage problems (and --help/--version) print and exit 0.
            err.print()?;
            std::process::exit(0);
        }
    };

    let filter = match (cli.verbose, cli.quiet) {
        (true, _) => "debug",
        (_, true) => "error",
        _ => "info",
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    run(&cli)
}

fn run(cli: &Cli) -> Result<()> {
    let mut reader = TrainingReader::new(&cli.train).with_excluded(cli.exclude.iter().cloned());
    if let Some(name) = &cli.label {
        reader = reader.with_label_column(name.clone());
    }
    let examples = reader.read()?;
    if cli.label.is_none() {
        info!(
            label = examples.label_name(),
            "assuming label column is the last column"
        );
    }

    let seed = cli.seed.unwrap_or_else(rand::random);
    info!(seed, "rng seeded");

    let sqrt_attrs = NumAttr::Sqrt.resolve(examples.n_features())?;
    let pinned_numattr = cli
        .numattr
        .map(|k| if k == 0 { sqrt_attrs } else { k as usize });

    let (forest, best, layers) = match cli.layers {
        Some(layers) => {
            let mut search = GridSearch::new(layers as usize)?.with_seed(seed);
            if let Some(m) = cli.numtrees {
                search = search.pin_num_trees(m as usize);
            }
            if let Some(v) = cli.nmin {
                search = search.pin_n_min(v as usize);
            }
            if let Some(k) = pinned_numattr {
                search = search.pin_num_attr(k);
            }
            let result = search.run(&examples)?;
            println!(
                "best result: numtrees = {}, nmin = {}, numattr = {}, accuracy = {}",
                result.best.num_trees, result.best.n_min, result.best.num_attr,
                result.best_accuracy
            );
            (result.forest, result.best, layers as usize)
        }
        None => {
            let params = HyperParams {
                num_trees: cli.numtrees.map_or(10, |m| m as usize),
                n_min: cli.nmin.map_or(4, |v| v as usize),
                num_attr: pinned_numattr.unwrap_or(sqrt_attrs),
            };
            info!(
                numtrees = params.num_trees,
                nmin = params.n_min,
                numattr = params.num_attr,
                "growing forest with fixed parameters"
            );
            let forest = ExtraTreesConfig::new(params.num_trees)?
                .with_n_min(params.n_min)
                .with_num_attr(NumAttr::Fixed(params.num_attr))
                .with_seed(seed)
                .fit(&examples)?;

            let single_tree = forest.tree_accuracy(0, &examples)?;
            let whole_forest = forest.accuracy(&examples)?;
            info!(single_tree, whole_forest, "training-set accuracy");
            (forest, params, 1)
        }
    };

    let model = Model {
        label_name: examples.label_name().to_string(),
        excluded_names: examples.excluded_names().to_vec(),
        feature_names: examples.feature_names().to_vec(),
        n_min: best.n_min,
        num_attr: best.num_attr,
        optimization_layers: layers,
        forest,
    };
    model.save(&cli.model)?;
    info!(
        path = %cli.model.display(),
        n_trees = model.forest.n_trees(),
        "model written"
    );

    Ok(())
}
