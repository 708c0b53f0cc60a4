//! Subcommands and their execution.

use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing::info;

use storefront_auth::Principal;
use storefront_catalog::CategoryPath;
use storefront_core::CategoryId;
use storefront_infra::import::csv_template;
use storefront_infra::{CatalogStore, CategoryTree, Config, PriceAggregator, ProductImporter};

/// Storefront - catalog import and category reporting.
#[derive(Parser, Debug)]
#[command(name = "storefront")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// CSV file imported before the command runs. Without DATABASE_URL the
    /// store lives only for this process, so this is how reports get data.
    #[arg(long, global = true)]
    pub seed: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Import products from a CSV file or a JSON list
    Import(ImportArgs),

    /// Print the CSV header expected by `import`
    CsvTemplate,

    /// Average product price of a category and everything below it
    AvgPrice(CategoryArg),

    /// List a category and everything below it
    Descendants(CategoryArg),
}

#[derive(Args, Debug)]
pub struct ImportArgs {
    /// File to import
    pub file: PathBuf,

    #[arg(long, value_enum, default_value_t = ImportFormat::Csv)]
    pub format: ImportFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ImportFormat {
    Csv,
    Json,
}

/// Category selector: by id or by path.
#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
pub struct CategoryArg {
    #[arg(long)]
    pub id: Option<CategoryId>,

    /// e.g. "All Products > Bakery"
    #[arg(long)]
    pub path: Option<String>,
}

pub async fn execute<S>(store: S, config: &Config, cli: Cli) -> anyhow::Result<()>
where
    S: CatalogStore + Clone + 'static,
{
    let tree = CategoryTree::new(store.clone()).with_max_attempts(config.category_upsert_retries);
    let importer = ProductImporter::new(store.clone(), tree.clone());
    let operator = Principal::staff();

    if let Some(seed) = &cli.seed {
        let report = importer.import_csv(&operator, open(seed)?).await?;
        info!(
            created = report.created_ids.len(),
            rejected = report.errors.len(),
            "seed catalog imported"
        );
    }

    match cli.command {
        Command::Import(args) => {
            let report = match args.format {
                ImportFormat::Csv => importer.import_csv(&operator, open(&args.file)?).await?,
                ImportFormat::Json => {
                    let body = std::fs::read_to_string(&args.file)
                        .with_context(|| format!("reading {}", args.file.display()))?;
                    importer.import_json(&operator, &body).await?
                }
            };
            print_json(&report)
        }
        Command::CsvTemplate => {
            print!("{}", csv_template());
            Ok(())
        }
        Command::AvgPrice(selector) => {
            let id = resolve_category(&tree, &selector).await?;
            let report = PriceAggregator::new(store).average_price_report(id).await?;
            print_json(&report)
        }
        Command::Descendants(selector) => {
            let id = resolve_category(&tree, &selector).await?;
            print_json(&tree.descendants(id).await?)
        }
    }
}

async fn resolve_category<S: CatalogStore>(
    tree: &CategoryTree<S>,
    selector: &CategoryArg,
) -> anyhow::Result<CategoryId> {
    match (&selector.id, &selector.path) {
        (Some(id), _) => Ok(tree.get_category(*id).await?.id),
        (None, Some(raw)) => {
            let path = CategoryPath::parse(raw)?;
            match tree.find_path(&path).await? {
                Some(category) => Ok(category.id),
                None => bail!("no category at path '{path}'"),
            }
        }
        (None, None) => bail!("either --id or --path is required"),
    }
}

fn open(path: &Path) -> anyhow::Result<File> {
    File::open(path).with_context(|| format!("opening {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn category_selector_is_exclusive() {
        let parsed = Cli::try_parse_from(["storefront", "avg-price", "--path", "A > B"]).unwrap();
        assert!(matches!(parsed.command, Command::AvgPrice(CategoryArg { path: Some(_), .. })));

        let id = CategoryId::new().to_string();
        assert!(
            Cli::try_parse_from(["storefront", "descendants", "--id", id.as_str(), "--path", "A"])
                .is_err()
        );
        assert!(Cli::try_parse_from(["storefront", "descendants"]).is_err());
    }

    #[test]
    fn import_defaults_to_csv() {
        let parsed = Cli::try_parse_from(["storefront", "import", "products.csv"]).unwrap();
        match parsed.command {
            Command::Import(args) => assert_eq!(args.format, ImportFormat::Csv),
            other => panic!("unexpected command {other:?}"),
        }
    }
}
